//! Service version value type
//!
//! Versions are `v{major}.{minor}.{patch}`. A version with patch 0 is
//! production-grade; non-zero patches are development builds on top of
//! the production point release of their minor line.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;

/// Immutable three-component version
///
/// Field order matters: the derived `Ord` compares major, then minor, then patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

/// Parse a single numeric component of a version string
pub(crate) fn parse_component(text: &str, component: &str) -> Result<u64, ParseError> {
    if component.starts_with('-') && component[1..].chars().all(|c| c.is_ascii_digit()) {
        return Err(ParseError::Negative {
            text: text.to_string(),
        });
    }
    if component.is_empty() || !component.chars().all(|c| c.is_ascii_digit()) {
        return Err(ParseError::InvalidComponent {
            text: text.to_string(),
            component: component.to_string(),
        });
    }
    component
        .parse::<u64>()
        .map_err(|_| ParseError::InvalidComponent {
            text: text.to_string(),
            component: component.to_string(),
        })
}

/// Split `["v"]A[.B[.C]]` into its numeric components (1 to 3 of them)
pub(crate) fn parse_components(text: &str) -> Result<Vec<u64>, ParseError> {
    let stripped = text.strip_prefix('v').unwrap_or(text);
    if stripped.is_empty() {
        return Err(ParseError::Empty);
    }

    let parts: Vec<&str> = stripped.split('.').collect();
    if parts.len() > 3 {
        return Err(ParseError::TooManyParts {
            text: text.to_string(),
        });
    }

    parts
        .into_iter()
        .map(|part| parse_component(text, part))
        .collect()
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// First version ever produced for a service
    pub const fn initial() -> Self {
        Self::new(1, 0, 0)
    }

    /// Parse `["v"]MAJOR[.MINOR[.PATCH]]`, missing trailing components default to 0
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let components = parse_components(text)?;
        Ok(Self {
            major: components[0],
            minor: components.get(1).copied().unwrap_or(0),
            patch: components.get(2).copied().unwrap_or(0),
        })
    }

    /// Production-grade versions have a zero patch component
    pub fn is_production(&self) -> bool {
        self.patch == 0
    }

    /// True if `next` is exactly one legal increment away from `self`
    pub fn may_be_next(&self, next: &Version) -> bool {
        if self.major == next.major {
            if self.minor == next.minor {
                return self.patch.checked_add(1) == Some(next.patch);
            }
            return self.minor.checked_add(1) == Some(next.minor) && next.patch == 0;
        }
        self.major.checked_add(1) == Some(next.major) && next.minor == 0 && next.patch == 0
    }

    pub fn next_patch(&self) -> Result<Self, ParseError> {
        let patch = self.patch.checked_add(1).ok_or_else(|| self.overflow())?;
        Ok(Self::new(self.major, self.minor, patch))
    }

    pub fn next_minor(&self) -> Result<Self, ParseError> {
        let minor = self.minor.checked_add(1).ok_or_else(|| self.overflow())?;
        Ok(Self::new(self.major, minor, 0))
    }

    pub fn next_major(&self) -> Result<Self, ParseError> {
        let major = self.major.checked_add(1).ok_or_else(|| self.overflow())?;
        Ok(Self::new(major, 0, 0))
    }

    fn overflow(&self) -> ParseError {
        ParseError::Overflow {
            text: self.to_string(),
        }
    }
}

/// Succession check where a missing predecessor allows anything to come first
pub fn may_be_next(from: Option<&Version>, to: &Version) -> bool {
    match from {
        None => true,
        Some(from) => from.may_be_next(to),
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Version::parse(&text).map_err(serde::de::Error::custom)
    }
}
