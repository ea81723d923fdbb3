use std::fmt;

use sha2::{Digest, Sha256};

/// What part of a table a cache entry covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyScope {
    /// A single row, by id.
    Entity(String),
    /// A derived result (list, page, count) identified by a fingerprint.
    Query(String),
}

/// Composite cache key: owning table plus scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    table: String,
    scope: KeyScope,
}

impl CacheKey {
    pub fn entity(table: impl Into<String>, id: impl fmt::Display) -> Self {
        Self {
            table: table.into(),
            scope: KeyScope::Entity(id.to_string()),
        }
    }

    pub fn query(table: impl Into<String>, fingerprint: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            scope: KeyScope::Query(fingerprint.into()),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn scope(&self) -> &KeyScope {
        &self.scope
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            KeyScope::Entity(id) => write!(f, "{}#{}", self.table, id),
            KeyScope::Query(fp) => write!(f, "{}?{}", self.table, fp),
        }
    }
}

/// Stable short hash of the given parts, for keying filters and orderings.
pub fn fingerprint<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_ref().as_bytes());
        // Separator so ["ab", "c"] and ["a", "bc"] differ.
        hasher.update([0u8]);
    }
    let digest = hasher.finalize();
    digest[..8].iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(CacheKey::entity("cases", "abc").to_string(), "cases#abc");
        assert_eq!(CacheKey::query("cases", "page:1").to_string(), "cases?page:1");
    }

    #[test]
    fn test_fingerprint_is_stable_and_separated() {
        assert_eq!(fingerprint(["a", "b"]), fingerprint(["a", "b"]));
        assert_ne!(fingerprint(["ab", "c"]), fingerprint(["a", "bc"]));
        assert_eq!(fingerprint(["x"]).len(), 16);
    }

    #[test]
    fn test_entity_and_query_keys_differ() {
        assert_ne!(CacheKey::entity("t", "1"), CacheKey::query("t", "1"));
        assert!(matches!(CacheKey::entity("t", 1).scope(), KeyScope::Entity(id) if id == "1"));
    }
}
