//! Naming rules for services and their cluster-side identifiers
//!
//! Service names are lowercase words joined by single hyphens
//! (`billing`, `order-history`). Cluster identifiers embed the version:
//!
//! - service:  `{service}-v{major}`
//! - revision: `v{minor}-{patch}-{service}-v{major}`
//! - traffic tag: `v{minor}-{patch}`
//!
//! Revision identifiers are parsed positionally: the first two and the
//! last hyphen-separated parts carry the version, everything in between
//! is the service name. This only works because service names never
//! contain empty segments or a segment shaped like `v{digits}` at the end.

use regex::Regex;
use std::sync::OnceLock;

use super::constraint::Constraint;
use super::version::{parse_component, Version};
use crate::error::ParseError;

const DELIMITER: &str = "-";

/// Key under which secret values are stored in their cluster secret
pub const SECRET_KEY: &str = "cadence-secret";

/// Prefix of the git tags marking published versions
pub const TAG_PREFIX: &str = "cadence-";

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z](-?[a-z0-9]+)*$").expect("static regex is valid"))
}

/// Check a service or secret name against the naming grammar
pub fn is_valid_name(name: &str) -> bool {
    name_pattern().is_match(name)
}

pub fn validate_name(name: &str) -> Result<(), ParseError> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(ParseError::InvalidName {
            name: name.to_string(),
        })
    }
}

/// Cluster object name for a major series of a service
pub fn service_identifier(service: &str, version: &Version) -> String {
    format!("{}-v{}", service, version.major)
}

/// Cluster name of the revision serving exactly `version`
pub fn revision_identifier(service: &str, version: &Version) -> String {
    format!(
        "v{}-{}-{}-v{}",
        version.minor, version.patch, service, version.major
    )
}

/// Name of the coordination resource guarding deploys of a major series
pub fn lock_resource_name(service: &str, version: &Version) -> String {
    format!("cadence-lock-{}", service_identifier(service, version))
}

/// Image pull secret holding registry credentials of a service
pub fn registry_secret_name(service: &str) -> String {
    format!("cadence-reg-{}", service)
}

/// Traffic tag of a revision within its major series
pub fn traffic_tag(version: &Version) -> String {
    format!("v{}-{}", version.minor, version.patch)
}

/// Parse `v{minor}-{patch}` back into a version of the given major series
pub fn parse_traffic_tag(tag: &str, major: u64) -> Result<Version, ParseError> {
    let malformed = || ParseError::MalformedTag {
        tag: tag.to_string(),
    };

    let rest = tag.strip_prefix('v').ok_or_else(malformed)?;
    let (minor, patch) = rest.split_once(DELIMITER).ok_or_else(malformed)?;
    let minor = parse_component(tag, minor).map_err(|_| malformed())?;
    let patch = parse_component(tag, patch).map_err(|_| malformed())?;

    Ok(Version::new(major, minor, patch))
}

/// Split a revision identifier into service name and version
pub fn parse_revision_identifier(revision: &str) -> Result<(String, Version), ParseError> {
    let malformed = |reason: &str| ParseError::MalformedRevision {
        revision: revision.to_string(),
        reason: reason.to_string(),
    };

    let parts: Vec<&str> = revision.split(DELIMITER).collect();
    if parts.len() < 4 {
        return Err(malformed("too few parts"));
    }

    let minor = parts[0]
        .strip_prefix('v')
        .ok_or_else(|| malformed("wrong minor version format"))?;
    let minor = parse_component(revision, minor).map_err(|_| malformed("wrong minor version"))?;
    let patch =
        parse_component(revision, parts[1]).map_err(|_| malformed("wrong patch version"))?;

    let major = parts[parts.len() - 1]
        .strip_prefix('v')
        .ok_or_else(|| malformed("wrong major version format"))?;
    let major = parse_component(revision, major).map_err(|_| malformed("wrong major version"))?;

    let name = parts[2..parts.len() - 1].join(DELIMITER);
    Ok((name, Version::new(major, minor, patch)))
}

fn env_name(prefix: &[&str], name: &str) -> String {
    prefix
        .iter()
        .copied()
        .chain(name.split(DELIMITER))
        .map(|part| part.to_uppercase())
        .collect::<Vec<_>>()
        .join("_")
}

/// Environment variable carrying the host of a dependency
pub fn service_env(name: &str) -> String {
    env_name(&["cadence", "service"], name)
}

/// Environment variable carrying the value of a secret
pub fn secret_env(name: &str) -> String {
    env_name(&["cadence", "secret"], name)
}

/// Git tag marking a published version
pub fn version_tag(version: &Version) -> String {
    format!("{}{}", TAG_PREFIX, version)
}

/// Version published by a git tag, if the tag is one of ours
pub fn parse_version_tag(tag: &str) -> Option<Result<Version, ParseError>> {
    tag.strip_prefix(TAG_PREFIX).map(Version::parse)
}

/// In-cluster host a dependent service uses to reach `version` of `service`
///
/// Constraints spanning a whole major series follow the routed service,
/// narrower ones pin the exact revision.
pub fn internal_host(
    service: &str,
    version: &Version,
    constraint: &Constraint,
    namespace: &str,
) -> String {
    let path = if constraint.spans_major_series() {
        service_identifier(service, version)
    } else {
        revision_identifier(service, version)
    };
    format!("{}.{}.svc.cluster.local", path, namespace)
}

pub fn secret_mount_path(name: &str) -> String {
    format!("/etc/cadence/secret/{}", name)
}

pub fn secret_volume_name(name: &str) -> String {
    format!("cadence-secret-mount-{}", name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_grammar() {
        assert!(!is_valid_name(""));
        assert!(is_valid_name("coolstuff"));
        assert!(is_valid_name("cool-stuff"));
        assert!(!is_valid_name("1coolname"));
        assert!(is_valid_name("coolname1"));
        assert!(!is_valid_name("coolname!"));
        assert!(!is_valid_name("cool--name"));
        assert!(!is_valid_name("-coolname"));
        assert!(!is_valid_name("coolname-"));
        assert!(!is_valid_name("Coolname"));
        assert!(!is_valid_name("COOLNAME"));
        assert!(is_valid_name("a"));
    }

    #[test]
    fn test_identifiers() {
        let version = Version::new(2, 3, 1);
        assert_eq!(service_identifier("billing", &version), "billing-v2");
        assert_eq!(revision_identifier("billing", &version), "v3-1-billing-v2");
        assert_eq!(traffic_tag(&version), "v3-1");
        assert_eq!(
            lock_resource_name("billing", &version),
            "cadence-lock-billing-v2"
        );
    }

    #[test]
    fn test_parse_traffic_tag() {
        assert_eq!(parse_traffic_tag("v3-1", 2).unwrap(), Version::new(2, 3, 1));
        assert!(parse_traffic_tag("3-1", 2).is_err());
        assert!(parse_traffic_tag("v3", 2).is_err());
        assert!(parse_traffic_tag("v3-x", 2).is_err());
        assert!(parse_traffic_tag("latest", 2).is_err());
    }

    #[test]
    fn test_parse_revision_identifier() {
        let (name, version) = parse_revision_identifier("v3-1-billing-v2").unwrap();
        assert_eq!(name, "billing");
        assert_eq!(version, Version::new(2, 3, 1));

        let (name, _) = parse_revision_identifier("v0-4-order-history-v1").unwrap();
        assert_eq!(name, "order-history");

        assert!(parse_revision_identifier("billing-v2").is_err());
        assert!(parse_revision_identifier("3-1-billing-v2").is_err());
        assert!(parse_revision_identifier("v3-1-billing-2").is_err());
    }

    #[test]
    fn test_revision_round_trip() {
        let version = Version::new(5, 0, 12);
        let id = revision_identifier("user-profile", &version);
        assert_eq!(
            parse_revision_identifier(&id).unwrap(),
            ("user-profile".to_string(), version)
        );
    }

    #[test]
    fn test_env_projections() {
        assert_eq!(service_env("order-history"), "CADENCE_SERVICE_ORDER_HISTORY");
        assert_eq!(secret_env("db-password"), "CADENCE_SECRET_DB_PASSWORD");
        assert_eq!(secret_mount_path("db"), "/etc/cadence/secret/db");
    }

    #[test]
    fn test_version_tags() {
        let version = Version::new(1, 2, 3);
        assert_eq!(version_tag(&version), "cadence-v1.2.3");
        assert_eq!(parse_version_tag("cadence-v1.2.3"), Some(Ok(version)));
        assert_eq!(parse_version_tag("release-1.2.3"), None);
        assert!(matches!(parse_version_tag("cadence-vx"), Some(Err(_))));
    }

    #[test]
    fn test_internal_host() {
        let version = Version::new(2, 3, 1);
        let whole_major = Constraint::parse("v2").unwrap();
        let pinned = Constraint::parse("v2.3").unwrap();
        assert_eq!(
            internal_host("billing", &version, &whole_major, "prod"),
            "billing-v2.prod.svc.cluster.local"
        );
        assert_eq!(
            internal_host("billing", &version, &pinned, "prod"),
            "v3-1-billing-v2.prod.svc.cluster.local"
        );
    }
}
