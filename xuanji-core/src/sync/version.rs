use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("empty version string")]
    Empty,
    #[error("version '{0}' has more than three components")]
    TooManyComponents(String),
    #[error("invalid version component '{component}' in '{version}'")]
    InvalidComponent { version: String, component: String },
}

/// A `major.minor.patch` table version.
///
/// Components compare numerically, most significant first. Missing trailing
/// components parse as 0, so `1.2` equals `1.2.0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SemVer {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl SemVer {
    pub const ZERO: SemVer = SemVer::new(0, 0, 0);

    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self { major, minor, patch }
    }
}

impl FromStr for SemVer {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
        if trimmed.is_empty() {
            return Err(VersionError::Empty);
        }

        let mut parts = [0u64; 3];
        for (i, component) in trimmed.split('.').enumerate() {
            if i >= parts.len() {
                return Err(VersionError::TooManyComponents(s.to_string()));
            }
            parts[i] = component
                .parse()
                .map_err(|_| VersionError::InvalidComponent {
                    version: s.to_string(),
                    component: component.to_string(),
                })?;
        }
        Ok(SemVer::new(parts[0], parts[1], parts[2]))
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl TryFrom<String> for SemVer {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SemVer> for String {
    fn from(value: SemVer) -> Self {
        value.to_string()
    }
}

/// Compares two version strings.
pub fn compare(a: &str, b: &str) -> Result<Ordering, VersionError> {
    Ok(a.parse::<SemVer>()?.cmp(&b.parse::<SemVer>()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_not_lexicographic() {
        assert_eq!(compare("1.2.0", "1.10.0").unwrap(), Ordering::Less);
        assert_eq!(compare("2.0.0", "1.99.99").unwrap(), Ordering::Greater);
    }

    #[test]
    fn test_missing_components_are_zero() {
        assert_eq!(compare("1.2", "1.2.0").unwrap(), Ordering::Equal);
        assert_eq!("3".parse::<SemVer>().unwrap(), SemVer::new(3, 0, 0));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!("".parse::<SemVer>(), Err(VersionError::Empty));
        assert!(matches!(
            "1.x.0".parse::<SemVer>(),
            Err(VersionError::InvalidComponent { .. })
        ));
        assert!(matches!(
            "1.2.3.4".parse::<SemVer>(),
            Err(VersionError::TooManyComponents(_))
        ));
    }

    #[test]
    fn test_v_prefix_and_display() {
        let v: SemVer = "v1.1.0".parse().unwrap();
        assert_eq!(v.to_string(), "1.1.0");
    }

    #[test]
    fn test_serde_as_string() {
        let v: SemVer = serde_json::from_str("\"1.10\"").unwrap();
        assert_eq!(v, SemVer::new(1, 10, 0));
        assert_eq!(serde_json::to_string(&v).unwrap(), "\"1.10.0\"");
        assert!(serde_json::from_str::<SemVer>("\"bad\"").is_err());
    }
}
