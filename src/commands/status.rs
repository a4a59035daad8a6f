//! Status command for showing the routed revisions of a major series
//!
//! Reads the routing state of `{service}-v{major}` and lists each routed
//! revision with its host and traffic share.

use anyhow::Result;
use colored::Colorize;

use super::{ClusterArgs, Workspace};
use crate::domain::naming::{parse_revision_identifier, service_identifier};
use crate::domain::Version;
use crate::error::ClusterError;
use crate::infrastructure::{create_client, KnativeRouting, KnativeService, RoutingApi};
use crate::ui;

/// One routed revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionStatus {
    pub version: Version,
    pub host: String,
    pub percent: i64,
}

/// Routing summary of one major series
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub main_host: Option<String>,
    pub revisions: Vec<RevisionStatus>,
}

impl StatusReport {
    /// Build the report from the observed state of a service
    ///
    /// Versions are read from the first label of each revision host
    /// (`v{minor}-{patch}-{service}-v{major}`), falling back to the
    /// traffic tag when the revision has no URL yet.
    pub fn from_service(service: &KnativeService, major: u64) -> Result<Self> {
        let main_host = service
            .status
            .as_ref()
            .and_then(|status| status.url.as_deref())
            .map(|url| url_host(url).to_string());

        let mut revisions = Vec::new();
        for entry in service.routed_traffic() {
            let host = entry.url.as_deref().map(url_host).unwrap_or_default();
            let version = match host.split('.').next().filter(|label| !label.is_empty()) {
                Some(label) => parse_revision_identifier(label)?.1,
                None => entry.version(major)?,
            };
            revisions.push(RevisionStatus {
                version,
                host: host.to_string(),
                percent: entry.percent.unwrap_or(0),
            });
        }

        Ok(Self {
            main_host,
            revisions,
        })
    }
}

/// Host part of a URL, without scheme and path
fn url_host(url: &str) -> &str {
    let rest = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    rest.split('/').next().unwrap_or(rest)
}

pub async fn execute(workspace: &Workspace, cluster: ClusterArgs, major: Option<u64>) -> Result<()> {
    let config = workspace.files.require_lock()?;
    let major = match major {
        Some(major) => major,
        None => config.current_version()?.major,
    };
    let namespace = workspace.namespace(cluster.namespace);
    let name = service_identifier(&config.name, &Version::new(major, 0, 0));

    let client = create_client(cluster.kubeconfig.as_deref()).await?;
    let routing = KnativeRouting::new(client, &namespace);
    let service = routing
        .get(&name)
        .await?
        .ok_or_else(|| ClusterError::NotFound {
            kind: "Service".to_string(),
            name: name.clone(),
            namespace: namespace.clone(),
        })?;

    let report = StatusReport::from_service(&service, major)?;
    print_report(&config.name, major, &report);
    Ok(())
}

fn print_report(service: &str, major: u64, report: &StatusReport) {
    println!("Service {}, major version {}", service.bold(), major);
    println!();
    println!(
        "Main host: {}",
        report.main_host.as_deref().unwrap_or("(not ready)")
    );
    println!();

    let width = report
        .revisions
        .iter()
        .map(|revision| revision.host.len())
        .max()
        .unwrap_or(0)
        .max(4);
    println!(
        "{}",
        format!("{:<10} {:<width$} {:>7}", "VERSION", "HOST", "TRAFFIC", width = width).bold()
    );
    for revision in &report.revisions {
        println!(
            "{:<10} {:<width$} {:>6}% {}",
            revision.version.to_string(),
            revision.host,
            revision.percent,
            ui::traffic_bar(revision.percent),
            width = width
        );
    }
}
