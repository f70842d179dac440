// Validated database version strings

use std::fmt;
use std::str::FromStr;

use regex::Regex;

use crate::error::HostdbError;

lazy_static::lazy_static! {
    static ref VERSION_PATTERN: Regex = Regex::new(r"^[0-9]+\.[0-9]+\.[0-9]+$").unwrap();
}

/// A `major.minor.patch` version. Only values of this type reach paths, URLs
/// and subprocess arguments.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionSpec(String);

impl VersionSpec {
    pub fn parse(raw: &str) -> Result<Self, HostdbError> {
        if VERSION_PATTERN.is_match(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(HostdbError::InvalidArgument(format!(
                "invalid version '{}': expected MAJOR.MINOR.PATCH (e.g. 8.4.3)",
                raw
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric components, for ordering version listings.
    pub fn components(&self) -> [u64; 3] {
        let mut parts = [0u64; 3];
        for (slot, part) in parts.iter_mut().zip(self.0.split('.')) {
            *slot = part.parse().unwrap_or(u64::MAX);
        }
        parts
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for VersionSpec {
    type Err = HostdbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_numeric_triplets() {
        for ok in ["0.0.0", "8.4.3", "11.4.5", "17.2.10", "2024.1.100"] {
            assert!(VersionSpec::parse(ok).is_ok(), "rejected {}", ok);
        }
    }

    #[test]
    fn test_rejects_everything_else() {
        for bad in [
            "",
            "8.4",
            "8.4.3.1",
            "v8.4.3",
            "8.4.3-rc1",
            "8.4.x",
            "8.4.3 ",
            " 8.4.3",
            "8.4.3;rm -rf /",
            "../../8.4.3",
            "8.4.3\n",
        ] {
            assert!(VersionSpec::parse(bad).is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_components_order_numerically() {
        let a = VersionSpec::parse("8.10.0").unwrap();
        let b = VersionSpec::parse("8.9.12").unwrap();
        assert!(a.components() > b.components());
    }
}
