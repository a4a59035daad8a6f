//! Traffic split computation for canary deploys
//!
//! Production-grade versions are promoted with the configured percentages;
//! patch releases are dark-launched at 0% next to whatever is routed today.

use std::collections::BTreeMap;

use super::naming::{parse_traffic_tag, traffic_tag};
use super::project::ProjectConfig;
use super::version::{may_be_next, Version};
use super::version_set::VersionSet;
use crate::error::{DeployError, ParseError};

/// One routed revision of a service
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrafficEntry {
    pub tag: Option<String>,
    pub revision_name: Option<String>,
    pub configuration_name: Option<String>,
    /// Route to whatever revision the next template update produces
    pub latest_revision: Option<bool>,
    pub percent: Option<i64>,
    pub url: Option<String>,
}

impl TrafficEntry {
    /// Entry for the revision about to be created
    pub fn new_revision(version: &Version, percent: i64) -> Self {
        Self {
            tag: Some(traffic_tag(version)),
            latest_revision: Some(true),
            percent: Some(percent),
            ..Default::default()
        }
    }

    /// Version of this entry, read back from its tag
    pub fn version(&self, major: u64) -> Result<Version, ParseError> {
        match self.tag.as_deref().filter(|tag| !tag.is_empty()) {
            Some(tag) => parse_traffic_tag(tag, major),
            None => Err(ParseError::UntaggedRevision {
                revision: self
                    .revision_name
                    .clone()
                    .unwrap_or_else(|| "(unnamed)".to_string()),
            }),
        }
    }

    /// Same revision with a new percentage; drops read-only status fields
    fn routed_at(&self, percent: Option<i64>) -> Self {
        Self {
            tag: self.tag.clone(),
            revision_name: self.revision_name.clone(),
            configuration_name: self.configuration_name.clone(),
            latest_revision: self.latest_revision.filter(|latest| !latest),
            percent,
            url: None,
        }
    }
}

/// Compute the full traffic list for deploying the config's current version
///
/// Entries already carrying the new revision's tag are superseded by it.
pub fn plan_traffic(
    config: &ProjectConfig,
    existing: &[TrafficEntry],
) -> Result<Vec<TrafficEntry>, DeployError> {
    let current = config.current_version()?;
    let new_tag = traffic_tag(&current);
    let others = existing
        .iter()
        .filter(|entry| entry.tag.as_deref() != Some(new_tag.as_str()));

    if !current.is_production() {
        let mut traffic = vec![TrafficEntry::new_revision(&current, 0)];
        traffic.extend(others.map(|entry| entry.routed_at(entry.percent)));
        return Ok(traffic);
    }

    let targets: BTreeMap<Version, i64> = config.traffic_targets()?;
    let mut traffic = vec![TrafficEntry::new_revision(
        &current,
        targets.get(&current).copied().unwrap_or(0),
    )];

    let mut routed = Vec::new();
    for entry in others {
        let version = entry.version(current.major)?;
        routed.push(version);
        traffic.push(entry.routed_at(Some(targets.get(&version).copied().unwrap_or(0))));
    }

    let latest = VersionSet::new(routed).latest_production();
    if !may_be_next(latest.as_ref(), &current) {
        return Err(DeployError::OrderingViolation {
            routed: latest,
            promoting: current,
        });
    }

    Ok(traffic)
}
