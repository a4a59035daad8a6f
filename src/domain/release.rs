//! Release stage machine
//!
//! Decides the version a sync pass produces. The decision is split in two
//! around the breaking-change check, which needs I/O:
//!
//! 1. [`ReleaseStageMachine::begin`] handles bootstrap, base adoption and
//!    the tentative production bump.
//! 2. The caller compares the API against the base snapshot.
//! 3. [`ReleaseStageMachine::finish`] escalates on breaking changes and
//!    resolves the final version for the stage.

use super::constraint::Constraint;
use super::project::{ProjectConfig, Stage};
use super::version::Version;
use super::version_set::VersionSet;
use crate::error::{CadenceError, ConsistencyError, ResolutionError};

/// Result of comparing the working API with the base snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakingChanges {
    Detected,
    None,
}

/// Outcome of the first half of a sync pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStep {
    /// Nothing published yet; the config now holds v1.0.0 / major
    Bootstrapped,
    /// The API must be checked against this base before finishing
    CheckAgainst(Version),
}

/// Final decision of a sync pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseDecision {
    pub version: Version,
    pub stage: Stage,
    /// Breaking changes forced the stage to major
    pub escalated: bool,
    /// Base cannot be directly followed by the new major (someone else bumped it first)
    pub concurrent_major: bool,
}

/// Computes the next version of a service from its published versions
pub struct ReleaseStageMachine<'a> {
    published: &'a VersionSet,
}

impl<'a> ReleaseStageMachine<'a> {
    pub fn new(published: &'a VersionSet) -> Self {
        Self { published }
    }

    pub fn begin(&self, config: &mut ProjectConfig) -> Result<SyncStep, CadenceError> {
        if self.published.is_empty() {
            config.current_version = Some(Version::initial());
            config.stage = Stage::Major;
            return Ok(SyncStep::Bootstrapped);
        }

        if config.base_version.is_none() {
            config.base_version = config
                .current_version
                .or_else(|| self.published.latest(&Constraint::Any));
        }
        let mut base = config
            .base_version
            .ok_or_else(|| ConsistencyError::NoCurrentVersion {
                service: config.name.clone(),
            })?;

        if config.stage == Stage::Production {
            let series = Constraint::minor_only(Constraint::major_series(base.major)?);
            base = self
                .published
                .latest(&series)
                .ok_or(ResolutionError::NoProductionVersion { major: base.major })?;
            config.base_version = Some(base);
            config.current_version = Some(base.next_minor()?);
        }

        if !self.published.contains(&base) {
            return Err(ConsistencyError::MissingTag { version: base }.into());
        }

        Ok(SyncStep::CheckAgainst(base))
    }

    pub fn finish(
        &self,
        config: &mut ProjectConfig,
        breaking: BreakingChanges,
    ) -> Result<ReleaseDecision, CadenceError> {
        let base = config
            .base_version
            .ok_or_else(|| ConsistencyError::NoCurrentVersion {
                service: config.name.clone(),
            })?;

        let escalated = breaking == BreakingChanges::Detected && config.stage != Stage::Major;
        if breaking == BreakingChanges::Detected {
            config.stage = Stage::Major;
        }

        let mut concurrent_major = false;
        let version = match config.stage {
            Stage::Major => {
                let next = Version::new(self.published.latest_major(), 0, 0).next_major()?;
                concurrent_major = !base.may_be_next(&next);
                next
            }
            Stage::Production => config.current_version()?,
            Stage::Development => {
                let window = Constraint::ranged(base, base.next_minor()?);
                self.published
                    .latest(&window)
                    .ok_or_else(|| ResolutionError::NoMatchingVersion {
                        dependency: config.name.clone(),
                        constraint: window.to_string(),
                    })?
                    .next_patch()?
            }
        };

        config.current_version = Some(version);
        Ok(ReleaseDecision {
            version,
            stage: config.stage,
            escalated,
            concurrent_major,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseError;

    fn v(text: &str) -> Version {
        Version::parse(text).unwrap()
    }

    fn published(texts: &[&str]) -> VersionSet {
        texts.iter().map(|t| v(t)).collect()
    }

    fn config(stage: Stage, base: Option<&str>, current: Option<&str>) -> ProjectConfig {
        let mut config = ProjectConfig::new("billing");
        config.stage = stage;
        config.base_version = base.map(v);
        config.current_version = current.map(v);
        config
    }

    fn run(
        versions: &VersionSet,
        config: &mut ProjectConfig,
        breaking: BreakingChanges,
    ) -> ReleaseDecision {
        let machine = ReleaseStageMachine::new(versions);
        match machine.begin(config).unwrap() {
            SyncStep::CheckAgainst(_) => machine.finish(config, breaking).unwrap(),
            SyncStep::Bootstrapped => panic!("unexpected bootstrap"),
        }
    }

    #[test]
    fn test_bootstrap_on_empty_set() {
        let versions = VersionSet::default();
        let mut cfg = config(Stage::Development, None, None);
        let step = ReleaseStageMachine::new(&versions).begin(&mut cfg).unwrap();
        assert_eq!(step, SyncStep::Bootstrapped);
        assert_eq!(cfg.current_version, Some(v("v1.0.0")));
        assert_eq!(cfg.stage, Stage::Major);
    }

    #[test]
    fn test_production_promotion() {
        let versions = published(&["v1.0.0", "v1.1.0", "v1.2.0"]);
        let mut cfg = config(Stage::Production, Some("v1.2.0"), Some("v1.2.0"));
        let decision = run(&versions, &mut cfg, BreakingChanges::None);
        assert_eq!(decision.version, v("v1.3.0"));
        assert_eq!(decision.stage, Stage::Production);
        assert_eq!(cfg.base_version, Some(v("v1.2.0")));
        assert!(!decision.escalated);
    }

    #[test]
    fn test_production_rebases_on_latest_production_point() {
        let versions = published(&["v1.0.0", "v1.0.1", "v1.1.0", "v1.1.1", "v1.1.2"]);
        let mut cfg = config(Stage::Production, Some("v1.0.0"), Some("v1.1.3"));
        let decision = run(&versions, &mut cfg, BreakingChanges::None);
        assert_eq!(cfg.base_version, Some(v("v1.1.0")));
        assert_eq!(decision.version, v("v1.2.0"));
    }

    #[test]
    fn test_breaking_change_escalates_to_major() {
        let versions = published(&["v1.0.0", "v1.1.0"]);
        let mut cfg = config(Stage::Production, Some("v1.1.0"), Some("v1.1.0"));
        let decision = run(&versions, &mut cfg, BreakingChanges::Detected);
        assert_eq!(decision.version, v("v2.0.0"));
        assert_eq!(decision.stage, Stage::Major);
        assert!(decision.escalated);
        assert!(!decision.concurrent_major);
    }

    #[test]
    fn test_major_detects_concurrent_bump() {
        let versions = published(&["v1.0.0", "v1.1.0", "v2.0.0"]);
        let mut cfg = config(Stage::Major, Some("v1.1.0"), Some("v1.1.0"));
        let decision = run(&versions, &mut cfg, BreakingChanges::None);
        assert_eq!(decision.version, v("v3.0.0"));
        assert!(decision.concurrent_major);
    }

    #[test]
    fn test_development_bumps_patch_in_window() {
        let versions = published(&["v1.0.0", "v1.1.0", "v1.1.1", "v1.1.2"]);
        let mut cfg = config(Stage::Development, Some("v1.1.0"), Some("v1.1.2"));
        let decision = run(&versions, &mut cfg, BreakingChanges::None);
        assert_eq!(decision.version, v("v1.1.3"));
        assert_eq!(decision.stage, Stage::Development);
    }

    #[test]
    fn test_development_window_excludes_next_minor() {
        let versions = published(&["v1.0.0", "v1.0.1", "v1.1.0"]);
        let mut cfg = config(Stage::Development, Some("v1.0.0"), Some("v1.0.1"));
        let decision = run(&versions, &mut cfg, BreakingChanges::None);
        assert_eq!(decision.version, v("v1.0.2"));
    }

    #[test]
    fn test_base_adopted_from_current() {
        let versions = published(&["v1.0.0"]);
        let mut cfg = config(Stage::Development, None, Some("v1.0.0"));
        let decision = run(&versions, &mut cfg, BreakingChanges::None);
        assert_eq!(cfg.base_version, Some(v("v1.0.0")));
        assert_eq!(decision.version, v("v1.0.1"));
    }

    #[test]
    fn test_missing_base_tag_is_fatal() {
        let versions = published(&["v1.0.0", "v1.1.0"]);
        let mut cfg = config(Stage::Development, Some("v1.0.5"), Some("v1.0.6"));
        let err = ReleaseStageMachine::new(&versions)
            .begin(&mut cfg)
            .unwrap_err();
        assert!(matches!(
            err,
            CadenceError::Consistency(ConsistencyError::MissingTag { .. })
        ));
    }

    #[test]
    fn test_production_without_production_point_fails() {
        let versions = published(&["v1.0.0"]);
        let mut cfg = config(Stage::Production, Some("v2.0.0"), Some("v2.0.0"));
        let err = ReleaseStageMachine::new(&versions)
            .begin(&mut cfg)
            .unwrap_err();
        assert!(matches!(
            err,
            CadenceError::Resolution(ResolutionError::NoProductionVersion { major: 2 })
        ));
    }

    #[test]
    fn test_bumps_past_component_limit_fail() {
        let top = "v18446744073709551615.0.0";
        let versions = published(&[top]);

        let mut cfg = config(Stage::Major, Some(top), Some(top));
        let machine = ReleaseStageMachine::new(&versions);
        assert_eq!(machine.begin(&mut cfg).unwrap(), SyncStep::CheckAgainst(v(top)));
        assert!(matches!(
            machine.finish(&mut cfg, BreakingChanges::None),
            Err(CadenceError::Parse(ParseError::Overflow { .. }))
        ));

        let mut cfg = config(Stage::Production, Some(top), Some(top));
        assert!(matches!(
            machine.begin(&mut cfg),
            Err(CadenceError::Parse(ParseError::Overflow { .. }))
        ));
    }
}
