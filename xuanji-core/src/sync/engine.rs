//! Sync orchestration.
//!
//! A run moves through [`SyncPhase`]s, observable via [`SyncEngine::subscribe`]:
//!
//! ```text
//! Idle -> CheckingConnectivity -> Failed
//!                              -> Planning -> Executing -> Finalizing -> Completed
//!                                                                     -> PartiallyFailed
//! ```
//!
//! Only one run executes at a time. Each table-level unit of work commits in
//! its own transaction, so an abandoned run leaves whatever it had committed.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use super::client::RemoteClient;
use super::error::SyncError;
use super::plan::{build_plan, DownloadTask};
use super::protocol::RemoteChange;
use super::result::{SyncKind, SyncPhase, SyncResult, SyncStats};
use super::status::{self, SyncStatus};
use super::tables::SyncTables;
use crate::cache::CacheLayer;
use crate::changelog::{self, ChangeType, PendingChange};
use crate::config::{ConflictPolicy, SyncSettings};
use crate::store::{Row, Select, Store, Value};

enum Applied {
    Written,
    Conflict,
    Skipped,
}

pub struct SyncEngine {
    store: Store,
    cache: CacheLayer,
    client: RemoteClient,
    tables: SyncTables,
    settings: SyncSettings,
    run_lock: Mutex<()>,
    phase: watch::Sender<SyncPhase>,
}

impl SyncEngine {
    pub fn new(
        store: Store,
        cache: CacheLayer,
        client: RemoteClient,
        tables: SyncTables,
        settings: SyncSettings,
    ) -> Self {
        let (phase, _) = watch::channel(SyncPhase::Idle);
        Self {
            store,
            cache,
            client,
            tables,
            settings,
            run_lock: Mutex::new(()),
            phase,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncPhase> {
        self.phase.subscribe()
    }

    pub fn phase(&self) -> SyncPhase {
        *self.phase.borrow()
    }

    pub fn tables(&self) -> &SyncTables {
        &self.tables
    }

    pub fn client(&self) -> &RemoteClient {
        &self.client
    }

    fn set_phase(&self, phase: SyncPhase) {
        debug!(%phase, "sync phase");
        self.phase.send_replace(phase);
    }

    /// Status of every registered table, defaulting those never synced.
    pub async fn status(&self) -> Result<Vec<SyncStatus>, SyncError> {
        let mut stored = status::load_all(&self.store).await?;
        Ok(self
            .tables
            .names()
            .map(|name| stored.remove(name).unwrap_or_else(|| SyncStatus::new(name)))
            .collect())
    }

    async fn begin(&self, kind: SyncKind) -> Result<tokio::sync::MutexGuard<'_, ()>, SyncError> {
        let guard = self.run_lock.try_lock().map_err(|_| {
            debug!(%kind, "sync requested while another run is active");
            SyncError::AlreadyRunning
        })?;

        info!(%kind, server = %self.client.server_url(), "starting sync");
        self.set_phase(SyncPhase::CheckingConnectivity);
        if let Err(e) = self.client.check_health().await {
            warn!(%kind, error = %e, "server unreachable, aborting sync");
            self.set_phase(SyncPhase::Failed);
            return Err(e);
        }
        Ok(guard)
    }

    fn abort(&self, kind: SyncKind, err: SyncError) -> SyncError {
        warn!(%kind, error = %err, "sync aborted");
        self.set_phase(SyncPhase::Failed);
        err
    }

    fn finish(&self, kind: SyncKind, started: Instant, stats: SyncStats) -> SyncResult {
        self.set_phase(SyncPhase::Finalizing);
        for table in &stats.modified_tables {
            self.cache.invalidate_table(table);
        }
        let expired = self.cache.clear_expired();
        if expired > 0 {
            debug!(expired, "cleared expired cache entries");
        }

        let success = stats.error_count() == 0;
        let phase = if success {
            SyncPhase::Completed
        } else {
            SyncPhase::PartiallyFailed
        };
        self.set_phase(phase);

        let result = SyncResult {
            kind,
            success,
            phase,
            duration: started.elapsed(),
            stats,
            completed_at: Utc::now(),
        };
        if success {
            info!(%result, "sync finished");
        } else {
            warn!(%result, "sync finished with errors");
        }
        result
    }

    /// Refreshes every registered table whose local version is behind the
    /// server's.
    pub async fn full_sync(&self) -> Result<SyncResult, SyncError> {
        let kind = SyncKind::Full;
        let _guard = self.begin(kind).await?;
        let started = Instant::now();
        let mut stats = SyncStats::default();

        self.set_phase(SyncPhase::Planning);
        let server = match self.client.fetch_versions().await {
            Ok(versions) => versions,
            Err(e) => return Err(self.abort(kind, e)),
        };
        let local: BTreeMap<_, _> = match status::load_all(&self.store).await {
            Ok(all) => all
                .into_iter()
                .map(|(table, s)| (table, s.sync_version))
                .collect(),
            Err(e) => return Err(self.abort(kind, e.into())),
        };

        let plan = build_plan(self.tables.names(), &local, &server);
        for table in &plan.ignored {
            debug!(table = %table, "server table is not registered locally, ignoring");
        }
        stats.tasks_planned = plan.tasks.len();
        info!(tasks = plan.tasks.len(), "sync plan ready");

        self.set_phase(SyncPhase::Executing);
        for task in &plan.tasks {
            match self.download(task).await {
                Ok(written) => {
                    stats.downloaded += written;
                    stats.applied += written;
                    if written > 0 {
                        stats.modified_tables.insert(task.table.clone());
                    }
                    info!(table = %task.table, from = %task.local, to = %task.remote, records = written, "table synced");
                }
                Err(e) => {
                    warn!(table = %task.table, error = %e, "table download failed");
                    stats.tasks_failed += 1;
                    if let Err(e) = status::record_failure(&self.store, &task.table).await {
                        warn!(table = %task.table, error = %e, "failed to record sync failure");
                    }
                }
            }
        }

        Ok(self.finish(kind, started, stats))
    }

    /// Downloads one table and commits its rows together with the new version.
    async fn download(&self, task: &DownloadTask) -> Result<usize, SyncError> {
        let table = self
            .tables
            .get(&task.table)
            .ok_or_else(|| SyncError::UnknownTable(task.table.clone()))?;

        let (version, rows) = match self.client.download_table(&task.table, &task.local).await? {
            // Current as of the advertised version.
            None => (task.remote, Vec::new()),
            Some(snapshot) => {
                let rows = snapshot
                    .records
                    .into_iter()
                    .map(|record| table.decode_record(record).map(|(_, row)| row))
                    .collect::<Result<Vec<Row>, _>>()
                    .map_err(|e| SyncError::Protocol(format!("{}: {}", task.table, e)))?;
                (snapshot.version, rows)
            }
        };

        let name = table.name();
        let written = self
            .store
            .transaction(move |tx| {
                Box::pin(async move {
                    let written = tx.batch_insert(name, &rows).await?;
                    status::mark_version(tx, name, version).await?;
                    Ok(written)
                })
            })
            .await?;
        Ok(written)
    }

    /// Uploads pending local changes, then downloads and applies remote
    /// changes since the last cursor.
    pub async fn incremental_sync(&self) -> Result<SyncResult, SyncError> {
        let kind = SyncKind::Incremental;
        let _guard = self.begin(kind).await?;
        let started = Instant::now();
        let mut stats = SyncStats::default();
        let mut failed_tables = BTreeSet::new();

        self.set_phase(SyncPhase::Planning);
        let pending = match changelog::pending(&self.store, self.settings.change_batch_limit).await
        {
            Ok(pending) => pending,
            Err(e) => return Err(self.abort(kind, e.into())),
        };
        let cursor = match self.cursor().await {
            Ok(cursor) => cursor,
            Err(e) => return Err(self.abort(kind, e)),
        };
        let mut groups: BTreeMap<String, Vec<PendingChange>> = BTreeMap::new();
        for change in pending {
            groups.entry(change.table_name.clone()).or_default().push(change);
        }
        stats.tasks_planned = groups.len();

        self.set_phase(SyncPhase::Executing);
        for (table, changes) in &groups {
            let uploaded = self.upload_changes(table, changes, &mut stats).await;
            if uploaded < changes.len() {
                failed_tables.insert(table.clone());
            }
        }

        let requested_at = Utc::now();
        let downloaded = match self.client.fetch_changes(cursor).await {
            Ok(changes) => Some(changes),
            Err(e) => {
                warn!(error = %e, "failed to download remote changes");
                stats.errors += 1;
                None
            }
        };

        if let Some(changes) = &downloaded {
            stats.downloaded = changes.len();
            for change in changes {
                match self.apply(change).await {
                    Ok(Applied::Written) => {
                        stats.applied += 1;
                        stats.modified_tables.insert(change.table_name.clone());
                    }
                    Ok(Applied::Conflict) => {
                        debug!(table = %change.table_name, id = %change.record_id, "kept local pending change");
                        stats.conflicts += 1;
                    }
                    Ok(Applied::Skipped) => {}
                    Err(e) => {
                        warn!(table = %change.table_name, id = %change.record_id, error = %e, "failed to apply remote change");
                        stats.errors += 1;
                        failed_tables.insert(change.table_name.clone());
                    }
                }
            }
        }

        // The cursor advances even past changes that failed to apply.
        let synced_at = downloaded.as_ref().map(|_| requested_at);
        let tracked: Vec<&'static str> = self.tables.tracked().collect();
        for table in tracked {
            let failed = failed_tables.contains(table) || downloaded.is_none();
            let refreshed = match changelog::count_pending(&self.store, table).await {
                Ok(pending) => status::refresh(&self.store, table, pending, failed, synced_at).await,
                Err(e) => Err(e),
            };
            if let Err(e) = refreshed {
                warn!(table, error = %e, "failed to update sync status");
                stats.errors += 1;
            }
        }

        let cutoff = Utc::now() - self.settings.synced_retention();
        match changelog::purge_synced(&self.store, cutoff).await {
            Ok(purged) if purged > 0 => {
                debug!(purged, "purged acknowledged changes past retention");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "failed to purge synced changes"),
        }

        Ok(self.finish(kind, started, stats))
    }

    /// Oldest `last_sync_time` across change-tracked tables. `None` if any
    /// of them has never been synced.
    async fn cursor(&self) -> Result<Option<DateTime<Utc>>, SyncError> {
        let mut cursor: Option<DateTime<Utc>> = None;
        for table in self.tables.tracked() {
            match status::load(&self.store, table).await?.last_sync_time {
                None => return Ok(None),
                Some(at) => cursor = Some(cursor.map_or(at, |c| c.min(at))),
            }
        }
        Ok(cursor)
    }

    /// Uploads one table's changes in fixed-size batches. Returns how many
    /// were acknowledged and marked synced.
    async fn upload_changes(
        &self,
        table: &str,
        changes: &[PendingChange],
        stats: &mut SyncStats,
    ) -> usize {
        let mut acknowledged = 0;
        for batch in changes.chunks(self.settings.upload_batch_size.max(1)) {
            let payload: Vec<RemoteChange> = batch.iter().map(RemoteChange::from).collect();
            if let Err(e) = self.client.upload_changes(table, payload).await {
                warn!(table, batch = batch.len(), error = %e, "change upload failed, will retry next run");
                stats.errors += 1;
                continue;
            }

            let ids: Vec<i64> = batch.iter().map(|c| c.id).collect();
            match changelog::mark_synced(&self.store, &ids).await {
                Ok(_) => {
                    acknowledged += batch.len();
                    stats.uploaded += batch.len();
                }
                Err(e) => {
                    // Re-uploaded next run; the remote treats it as an upsert.
                    warn!(table, error = %e, "failed to mark changes synced");
                    stats.errors += 1;
                }
            }
        }
        debug!(table, acknowledged, total = changes.len(), "uploaded changes");
        acknowledged
    }

    /// Applies one remote change in its own transaction.
    async fn apply(&self, change: &RemoteChange) -> Result<Applied, SyncError> {
        let Some(table) = self.tables.get(&change.table_name) else {
            debug!(table = %change.table_name, "change for unregistered table, ignoring");
            return Ok(Applied::Skipped);
        };

        let name = table.name();
        let record_id = change.record_id.clone();
        let guard_local = self.settings.conflict_policy == ConflictPolicy::KeepLocalPending
            && table.tracks_changes();

        let write = match change.change_type {
            ChangeType::Insert | ChangeType::Update => {
                let (_, row) = table
                    .decode_record(change.record_data.clone())
                    .map_err(|e| SyncError::Protocol(format!("{}/{}: {}", name, record_id, e)))?;
                Write::Upsert(row)
            }
            ChangeType::Delete => {
                let key = table.key_value(&record_id).ok_or_else(|| {
                    SyncError::Protocol(format!("{}: invalid record id '{}'", name, record_id))
                })?;
                Write::Delete(format!("{} = ?", table.id_column()), key)
            }
        };

        let applied = self
            .store
            .transaction(move |tx| {
                Box::pin(async move {
                    if guard_local && changelog::has_pending(tx, name, &record_id).await? {
                        return Ok(Applied::Conflict);
                    }
                    match write {
                        Write::Upsert(row) => {
                            tx.insert(name, &row).await?;
                        }
                        Write::Delete(filter, key) => {
                            tx.delete(name, &filter, &[key]).await?;
                        }
                    }
                    Ok(Applied::Written)
                })
            })
            .await?;
        Ok(applied)
    }

    /// Uploads every local row of `table` as full records.
    pub async fn push_table(&self, table: &str) -> Result<SyncResult, SyncError> {
        let kind = SyncKind::Push;
        let binding = self
            .tables
            .get(table)
            .cloned()
            .ok_or_else(|| SyncError::UnknownTable(table.to_string()))?;
        let _guard = self.begin(kind).await?;
        let started = Instant::now();
        let mut stats = SyncStats::default();

        self.set_phase(SyncPhase::Planning);
        let select = Select::from(binding.name()).order_by(binding.id_column());
        let rows = match self.store.query(&select).await {
            Ok(rows) => rows,
            Err(e) => return Err(self.abort(kind, e.into())),
        };
        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            match binding.encode_row(row) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(table, error = %e, "skipping unreadable row");
                    stats.errors += 1;
                }
            }
        }
        stats.tasks_planned = records.len().div_ceil(self.settings.upload_batch_size.max(1));

        self.set_phase(SyncPhase::Executing);
        for batch in records.chunks(self.settings.upload_batch_size.max(1)) {
            match self.client.upload_records(table, batch.to_vec()).await {
                Ok(()) => stats.uploaded += batch.len(),
                Err(e) => {
                    warn!(table, batch = batch.len(), error = %e, "record upload failed");
                    stats.tasks_failed += 1;
                }
            }
        }

        Ok(self.finish(kind, started, stats))
    }
}

enum Write {
    Upsert(Row),
    Delete(String, Value),
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("server_url", &self.client.server_url())
            .field("tables", &self.tables)
            .field("phase", &self.phase())
            .finish()
    }
}
