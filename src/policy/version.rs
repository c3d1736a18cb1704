//! Dotted-numeric version comparison for the forced-update gate.

use std::cmp::Ordering;
use std::str::FromStr;

/// A dotted-numeric version like `1.2.3`. Missing components compare as 0,
/// so `1.2` == `1.2.0`. Non-numeric trailing characters in a component are
/// ignored (`3-beta` reads as `3`).
#[derive(Debug, Clone)]
pub struct Version(Vec<u64>);

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl FromStr for Version {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .trim()
            .split('.')
            .map(|part| {
                let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
                digits.parse().unwrap_or(0)
            })
            .collect();
        Ok(Self(parts))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.0.len().max(other.0.len());
        for i in 0..len {
            let a = self.0.get(i).copied().unwrap_or(0);
            let b = other.0.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => {}
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Parse a version string. Never fails; malformed components read as 0.
#[must_use]
pub fn parse(s: &str) -> Version {
    s.parse().unwrap_or(Version(Vec::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_ordering() {
        assert!(parse("1.0.0") < parse("1.0.1"));
        assert!(parse("1.9.0") < parse("1.10.0"));
        assert!(parse("2.0.0") > parse("1.99.99"));
    }

    #[test]
    fn test_missing_components_compare_as_zero() {
        assert_eq!(parse("1.2"), parse("1.2.0"));
        assert!(parse("1.2") < parse("1.2.1"));
    }

    #[test]
    fn test_non_numeric_suffix_ignored() {
        assert_eq!(parse("1.2.3-beta"), parse("1.2.3"));
    }

    #[test]
    fn test_zero_sentinel_compares_lowest() {
        assert!(parse("0.0.0") <= parse("0.1.0"));
        assert!(parse("0.0.0") <= parse("0.0.0"));
    }
}
