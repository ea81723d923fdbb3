use std::collections::BTreeMap;

use super::version::SemVer;

/// Refresh one table from the server snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub table: String,
    pub local: SemVer,
    pub remote: SemVer,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub tasks: Vec<DownloadTask>,
    /// Server tables with no local registration.
    pub ignored: Vec<String>,
}

/// One download per registered table whose local version is behind the
/// server's. Tables the server does not report are left alone.
pub fn build_plan<'a>(
    registered: impl IntoIterator<Item = &'a str>,
    local: &BTreeMap<String, SemVer>,
    server: &BTreeMap<String, SemVer>,
) -> SyncPlan {
    let registered: Vec<&str> = registered.into_iter().collect();
    let mut plan = SyncPlan::default();

    for (table, remote) in server {
        if !registered.contains(&table.as_str()) {
            plan.ignored.push(table.clone());
            continue;
        }
        let local = local.get(table).copied().unwrap_or(SemVer::ZERO);
        if local < *remote {
            plan.tasks.push(DownloadTask {
                table: table.clone(),
                local,
                remote: *remote,
            });
        }
    }
    plan
}
