//! Protocol version parsing and ordering.

use super::CapabilityError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Dotted protocol version.
///
/// Versions carry three numeric segments and an optional fourth qualifier
/// segment (`0.10.0` or `0.10.0.Final`). Ordering is total: numeric segments
/// compare numerically, and a version without a qualifier sorts before the
/// same version with one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProtocolVersion {
    major: u32,
    minor: u32,
    micro: u32,
    qualifier: Option<String>,
}

impl ProtocolVersion {
    /// Protocol release `0.9.0`.
    pub const V0_9_0: Self = Self::new(0, 9, 0);

    /// Protocol release `0.10.0`.
    pub const V0_10_0: Self = Self::new(0, 10, 0);

    /// Version advertised by this build.
    pub const CURRENT: Self = Self::V0_10_0;

    /// Every release this build remains compatible with, oldest first.
    pub const KNOWN_RELEASES: [Self; 2] = [Self::V0_9_0, Self::V0_10_0];

    /// Creates a version without a qualifier.
    #[must_use]
    pub const fn new(major: u32, minor: u32, micro: u32) -> Self {
        Self {
            major,
            minor,
            micro,
            qualifier: None,
        }
    }

    /// Parses a dotted version string.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::InvalidVersion`] when the value does not
    /// have three numeric segments followed by at most one non-empty
    /// qualifier.
    pub fn parse(value: &str) -> Result<Self, CapabilityError> {
        let trimmed = value.trim();
        let invalid = || CapabilityError::InvalidVersion(value.to_owned());
        let mut segments = trimmed.split('.');

        let major = parse_numeric(segments.next()).ok_or_else(invalid)?;
        let minor = parse_numeric(segments.next()).ok_or_else(invalid)?;
        let micro = parse_numeric(segments.next()).ok_or_else(invalid)?;
        let qualifier = match segments.next() {
            None => None,
            Some(segment) if !segment.is_empty() => Some(segment.to_owned()),
            Some(_) => return Err(invalid()),
        };
        if segments.next().is_some() {
            return Err(invalid());
        }

        Ok(Self {
            major,
            minor,
            micro,
            qualifier,
        })
    }

    /// Returns whether this version is one of the releases this build knows.
    #[must_use]
    pub fn is_known(&self) -> bool {
        Self::KNOWN_RELEASES.contains(self)
    }

    /// Returns the qualifier segment, if any.
    #[must_use]
    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }
}

fn parse_numeric(segment: Option<&str>) -> Option<u32> {
    let digits = segment?;
    if digits.is_empty() || !digits.chars().all(|character| character.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

impl Ord for ProtocolVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.micro)
            .cmp(&(other.major, other.minor, other.micro))
            .then_with(|| self.qualifier.cmp(&other.qualifier))
    }
}

impl PartialOrd for ProtocolVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}.{}.{}", self.major, self.minor, self.micro)?;
        if let Some(qualifier) = &self.qualifier {
            write!(formatter, ".{qualifier}")?;
        }
        Ok(())
    }
}

impl FromStr for ProtocolVersion {
    type Err = CapabilityError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for ProtocolVersion {
    type Error = CapabilityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ProtocolVersion> for String {
    fn from(version: ProtocolVersion) -> Self {
        version.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("0.9.0", ProtocolVersion::V0_9_0)]
    #[case("0.10.0", ProtocolVersion::V0_10_0)]
    #[case(" 0.10.0 ", ProtocolVersion::V0_10_0)]
    fn parses_known_releases(#[case] input: &str, #[case] expected: ProtocolVersion) {
        let parsed = ProtocolVersion::parse(input).expect("version should parse");
        assert_eq!(parsed, expected);
        assert!(parsed.is_known());
    }

    #[rstest]
    #[case("")]
    #[case("0.10")]
    #[case("0.10.x")]
    #[case("0..0")]
    #[case("0.10.0.")]
    #[case("0.10.0.Final.extra")]
    #[case("-1.0.0")]
    fn rejects_malformed_versions(#[case] input: &str) {
        assert_eq!(
            ProtocolVersion::parse(input),
            Err(CapabilityError::InvalidVersion(input.to_owned()))
        );
    }

    #[test]
    fn numeric_segments_compare_numerically() {
        assert!(ProtocolVersion::V0_9_0 < ProtocolVersion::V0_10_0);
        assert!(ProtocolVersion::new(1, 0, 0) > ProtocolVersion::V0_10_0);
    }

    #[test]
    fn qualified_version_sorts_after_bare_version() {
        let qualified = ProtocolVersion::parse("0.10.0.Final").expect("version should parse");
        assert!(qualified > ProtocolVersion::V0_10_0);
        assert!(qualified < ProtocolVersion::new(0, 10, 1));
        assert_eq!(qualified.qualifier(), Some("Final"));
        assert_eq!(qualified.to_string(), "0.10.0.Final");
        assert!(!qualified.is_known());
    }

    #[test]
    fn known_releases_are_sorted_and_end_with_current() {
        let releases = ProtocolVersion::KNOWN_RELEASES;
        assert!(releases.windows(2).all(|pair| matches!(pair, [a, b] if a < b)));
        assert_eq!(releases.last(), Some(&ProtocolVersion::CURRENT));
    }

    #[test]
    fn serializes_as_dotted_string() {
        let json = serde_json::to_string(&ProtocolVersion::CURRENT).expect("serialize");
        assert_eq!(json, "\"0.10.0\"");
        let parsed: ProtocolVersion = serde_json::from_str("\"0.9.0\"").expect("deserialize");
        assert_eq!(parsed, ProtocolVersion::V0_9_0);
    }
}
