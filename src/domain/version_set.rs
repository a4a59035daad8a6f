//! Queries over the set of published versions of one service

use super::constraint::Constraint;
use super::version::Version;
use crate::error::ConsistencyError;

/// All versions ever published (tagged) for a service
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionSet {
    versions: Vec<Version>,
}

impl VersionSet {
    pub fn new(versions: Vec<Version>) -> Self {
        Self { versions }
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn contains(&self, version: &Version) -> bool {
        self.versions.contains(version)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Version> {
        self.versions.iter()
    }

    /// Highest version satisfying the constraint
    pub fn latest(&self, constraint: &Constraint) -> Option<Version> {
        self.versions
            .iter()
            .filter(|v| constraint.fits(v))
            .max()
            .copied()
    }

    /// Highest production-grade version
    pub fn latest_production(&self) -> Option<Version> {
        self.versions
            .iter()
            .filter(|v| v.is_production())
            .max()
            .copied()
    }

    /// Highest major component, 0 for an empty set
    pub fn latest_major(&self) -> u64 {
        self.versions.iter().map(|v| v.major).max().unwrap_or(0)
    }

    /// Sort ascending and check every adjacent pair is a legal increment
    ///
    /// A gap means tags were created or deleted by hand.
    pub fn validate(&mut self) -> Result<(), ConsistencyError> {
        self.versions.sort();
        for pair in self.versions.windows(2) {
            if !pair[0].may_be_next(&pair[1]) {
                return Err(ConsistencyError::BrokenSuccession {
                    from: pair[0],
                    to: pair[1],
                });
            }
        }
        Ok(())
    }
}

impl From<Vec<Version>> for VersionSet {
    fn from(versions: Vec<Version>) -> Self {
        Self::new(versions)
    }
}

impl FromIterator<Version> for VersionSet {
    fn from_iter<I: IntoIterator<Item = Version>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
