//! Version constraints
//!
//! A constraint is written with the same grammar as a version; the
//! precision of the text decides how wide the accepted range is:
//!
//! | text     | accepted range         |
//! |----------|------------------------|
//! | `v1`     | `[v1.0.0, v2.0.0)`     |
//! | `v1.2`   | `[v1.2.0, v1.2.1)`     |
//! | `v1.2.3` | `[v1.2.3, v1.2.4)`     |
//!
//! Parsed constraints keep the text they were written with so that lock
//! files round-trip byte for byte. `*` stands for any version; the
//! computed forms (plain ranges and the major/minor-only wrappers) have
//! no textual form and refuse to serialize.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use super::version::{parse_components, Version};
use crate::error::ParseError;

/// Predicate over versions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// `lower <= v < upper`
    Ranged { lower: Version, upper: Version },
    /// Wraps another constraint and remembers its source text
    Annotated {
        inner: Box<Constraint>,
        text: String,
    },
    /// Inner constraint restricted to `vX.0.0` versions
    MajorOnly(Box<Constraint>),
    /// Inner constraint restricted to production-grade versions
    MinorOnly(Box<Constraint>),
    Any,
}

impl Constraint {
    pub fn ranged(lower: Version, upper: Version) -> Self {
        Self::Ranged { lower, upper }
    }

    pub fn major_only(inner: Constraint) -> Self {
        Self::MajorOnly(Box::new(inner))
    }

    pub fn minor_only(inner: Constraint) -> Self {
        Self::MinorOnly(Box::new(inner))
    }

    /// Every version of one major series
    pub fn major_series(major: u64) -> Result<Self, ParseError> {
        let lower = Version::new(major, 0, 0);
        Ok(Self::ranged(lower, lower.next_major()?))
    }

    pub fn parse(text: &str) -> Result<Self, ParseError> {
        if text == ANY {
            return Ok(Self::Any);
        }

        let components = parse_components(text)?;
        let (lower, upper) = match components.as_slice() {
            [major] => {
                let lower = Version::new(*major, 0, 0);
                (lower, lower.next_major().map_err(|_| overflow(text))?)
            }
            [major, minor] => (
                Version::new(*major, *minor, 0),
                Version::new(*major, *minor, 1),
            ),
            [major, minor, patch] => {
                let lower = Version::new(*major, *minor, *patch);
                (lower, lower.next_patch().map_err(|_| overflow(text))?)
            }
            _ => {
                return Err(ParseError::TooManyParts {
                    text: text.to_string(),
                })
            }
        };

        Ok(Self::Annotated {
            inner: Box::new(Self::ranged(lower, upper)),
            text: text.to_string(),
        })
    }

    pub fn fits(&self, version: &Version) -> bool {
        match self {
            Self::Ranged { lower, upper } => version >= lower && version < upper,
            Self::Annotated { inner, .. } => inner.fits(version),
            Self::MajorOnly(inner) => {
                version.minor == 0 && version.patch == 0 && inner.fits(version)
            }
            Self::MinorOnly(inner) => version.patch == 0 && inner.fits(version),
            Self::Any => true,
        }
    }

    /// Human-readable description of the underlying range
    pub fn detailed(&self) -> String {
        match self {
            Self::Annotated { inner, .. } => inner.detailed(),
            Self::Any => "(any version)".to_string(),
            other => other.to_string(),
        }
    }

    /// True when the constraint accepts more than one minor line of a major series
    ///
    /// Such dependencies are addressed through the service identifier rather
    /// than a pinned revision.
    pub fn spans_major_series(&self) -> bool {
        match self {
            Self::Ranged { lower, upper } => upper.major > lower.major,
            Self::Annotated { inner, .. } => inner.spans_major_series(),
            Self::MajorOnly(_) | Self::MinorOnly(_) | Self::Any => false,
        }
    }
}

/// Textual form of [`Constraint::Any`]
const ANY: &str = "*";

fn overflow(text: &str) -> ParseError {
    ParseError::Overflow {
        text: text.to_string(),
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ranged { lower, upper } => write!(f, "(>={}, <{})", lower, upper),
            Self::Annotated { text, .. } => f.write_str(text),
            Self::MajorOnly(inner) => write!(f, "[major-only {}]", inner),
            Self::MinorOnly(inner) => write!(f, "[minor-only {}]", inner),
            Self::Any => f.write_str("(*)"),
        }
    }
}

impl FromStr for Constraint {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Constraint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Annotated { text, .. } => serializer.serialize_str(text),
            Self::Any => serializer.serialize_str(ANY),
            other => Err(serde::ser::Error::custom(ParseError::Unrepresentable {
                text: other.to_string(),
            })),
        }
    }
}

impl<'de> Deserialize<'de> for Constraint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Constraint::parse(&text).map_err(serde::de::Error::custom)
    }
}
