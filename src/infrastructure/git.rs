//! Git operations
//!
//! Published versions live in git as annotated `cadence-v{M}.{m}.{p}` tags.
//! The working repository is the source of truth for the service's own
//! versions; dependency checkouts in the cache use the same client.
//! Everything goes through the system `git` binary.

use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

use crate::domain::naming::{parse_version_tag, version_tag, TAG_PREFIX};
use crate::domain::{Version, VersionSet};
use crate::error::{CadenceError, GitError};
use crate::tools::{get_tool_path, tools};

const TAG_MESSAGE: &str = "Auto-generated with cadence";

/// Release-relevant view of the working repository
#[allow(async_fn_in_trait)]
pub trait SourceOfTruth {
    /// Paths with uncommitted or untracked changes
    async fn dirty_paths(&self) -> Result<Vec<String>, GitError>;

    /// Whether HEAD carries a version tag
    async fn is_frozen(&self) -> Result<bool, CadenceError>;

    /// Tag HEAD with `version`; the tree must be clean
    async fn freeze(&self, version: &Version) -> Result<(), GitError>;

    /// Whether `version` is published as an annotated tag
    async fn has_version(&self, version: &Version) -> Result<bool, GitError>;

    async fn versions(&self) -> Result<VersionSet, CadenceError>;
}

/// Client for git operations
#[derive(Debug, Clone)]
pub struct GitClient {
    /// Working directory for git commands
    working_dir: PathBuf,
}

impl GitClient {
    /// Create a git client for a specific directory
    pub fn in_dir(path: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: path.into(),
        }
    }

    /// Open an existing repository
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, GitError> {
        let client = Self::in_dir(path);
        client
            .run(&["rev-parse", "--git-dir"])
            .await
            .map_err(|_| GitError::NotARepository {
                path: client.working_dir.display().to_string(),
            })?;
        Ok(client)
    }

    pub fn path(&self) -> &Path {
        &self.working_dir
    }

    /// Run git with `args` and return stdout without trailing whitespace
    async fn run(&self, args: &[&str]) -> Result<String, GitError> {
        run_git(Some(&self.working_dir), args).await
    }

    /// Clone `remote` into `target`
    pub async fn clone_from(remote: &str, target: &Path) -> Result<Self, GitError> {
        let target_text = target.display().to_string();
        run_git(None, &["clone", "--quiet", remote, &target_text]).await?;
        Ok(Self::in_dir(target))
    }

    /// Fetch new commits and tags from the default remote
    pub async fn fetch(&self) -> Result<(), GitError> {
        self.run(&["fetch", "--quiet", "--tags", "--force"]).await?;
        Ok(())
    }

    /// Check out the commit a version tag points at (detached HEAD)
    pub async fn checkout_version(&self, version: &Version) -> Result<(), GitError> {
        let reference = format!("refs/tags/{}", version_tag(version));
        self.run(&["checkout", "--quiet", "--force", &reference])
            .await?;
        Ok(())
    }

    /// Annotated version tags, optionally restricted to those pointing at HEAD
    async fn version_tags(&self, points_at_head: bool) -> Result<Vec<String>, GitError> {
        let pattern = format!("refs/tags/{}*", TAG_PREFIX);
        let mut args = vec!["for-each-ref", "--format=%(objecttype) %(refname:short)"];
        if points_at_head {
            args.push("--points-at=HEAD");
        }
        args.push(pattern.as_str());

        let output = self.run(&args).await?;
        Ok(output
            .lines()
            .filter_map(|line| line.split_once(' '))
            .filter(|(kind, _)| *kind == "tag")
            .map(|(_, name)| name.to_string())
            .collect())
    }
}

async fn run_git(dir: Option<&Path>, args: &[&str]) -> Result<String, GitError> {
    let git = get_tool_path(tools::GIT);
    let mut cmd = Command::new(&git);
    cmd.args(args);
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }

    let command = format!("git {}", args.join(" "));
    debug!("Running {}", command);

    let output = cmd.output().await.map_err(|e| GitError::CommandFailed {
        command: command.clone(),
        message: e.to_string(),
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(GitError::CommandFailed {
            command,
            message: stderr.trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
}

/// Paths named by `git status --porcelain` output
fn porcelain_paths(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| line.len() > 3)
        .map(|line| line[3..].to_string())
        .collect()
}

impl SourceOfTruth for GitClient {
    async fn dirty_paths(&self) -> Result<Vec<String>, GitError> {
        let output = self
            .run(&["status", "--porcelain", "--untracked-files=all"])
            .await?;
        Ok(porcelain_paths(&output))
    }

    async fn is_frozen(&self) -> Result<bool, CadenceError> {
        for tag in self.version_tags(true).await? {
            if let Some(parsed) = parse_version_tag(&tag) {
                parsed?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn freeze(&self, version: &Version) -> Result<(), GitError> {
        let paths = self.dirty_paths().await?;
        if !paths.is_empty() {
            return Err(GitError::NotCommitted { paths });
        }

        let tag = version_tag(version);
        if self.has_version(version).await? {
            return Err(GitError::TagExists { tag });
        }

        self.run(&["tag", "--annotate", &tag, "--message", TAG_MESSAGE])
            .await?;
        info!(tag = %tag, "Tagged HEAD");
        Ok(())
    }

    async fn has_version(&self, version: &Version) -> Result<bool, GitError> {
        let reference = format!("refs/tags/{}", version_tag(version));
        match self.run(&["cat-file", "-t", &reference]).await {
            Ok(kind) => Ok(kind == "tag"),
            Err(GitError::CommandFailed { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn versions(&self) -> Result<VersionSet, CadenceError> {
        let mut versions = Vec::new();
        for tag in self.version_tags(false).await? {
            if let Some(parsed) = parse_version_tag(&tag) {
                versions.push(parsed?);
            }
        }
        Ok(VersionSet::new(versions))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Fresh repository with one commit, or None when git is unavailable
    pub(crate) async fn init_repo(dir: &Path) -> Option<GitClient> {
        let client = GitClient::in_dir(dir);
        if client.run(&["init", "--quiet"]).await.is_err() {
            return None;
        }
        client.run(&["config", "user.email", "ci@example.com"]).await.ok()?;
        client.run(&["config", "user.name", "CI"]).await.ok()?;
        client.run(&["config", "commit.gpgsign", "false"]).await.ok()?;
        client.run(&["config", "tag.gpgsign", "false"]).await.ok()?;
        std::fs::write(dir.join("README.md"), "service\n").ok()?;
        commit_all(&client, "initial").await?;
        Some(client)
    }

    pub(crate) async fn commit_all(client: &GitClient, message: &str) -> Option<()> {
        client.run(&["add", "--all"]).await.ok()?;
        client.run(&["commit", "--quiet", "-m", message]).await.ok()?;
        Some(())
    }

    #[test]
    fn test_porcelain_paths() {
        let output = " M src/main.rs\n?? notes.txt\nA  api/service.proto";
        assert_eq!(
            porcelain_paths(output),
            vec!["src/main.rs", "notes.txt", "api/service.proto"]
        );
        assert!(porcelain_paths("").is_empty());
    }

    #[tokio::test]
    async fn test_freeze_and_query_versions() {
        let dir = tempfile::tempdir().unwrap();
        let Some(git) = init_repo(dir.path()).await else {
            return;
        };

        assert!(git.versions().await.unwrap().is_empty());
        assert!(!git.is_frozen().await.unwrap());

        let version = Version::new(1, 0, 0);
        git.freeze(&version).await.unwrap();

        assert!(git.is_frozen().await.unwrap());
        assert!(git.has_version(&version).await.unwrap());
        assert!(!git.has_version(&Version::new(1, 0, 1)).await.unwrap());
        assert!(git.versions().await.unwrap().contains(&version));

        assert!(matches!(
            git.freeze(&version).await,
            Err(GitError::TagExists { .. })
        ));
    }

    #[tokio::test]
    async fn test_freeze_rejects_dirty_tree() {
        let dir = tempfile::tempdir().unwrap();
        let Some(git) = init_repo(dir.path()).await else {
            return;
        };

        std::fs::write(dir.path().join("scratch.txt"), "wip").unwrap();
        match git.freeze(&Version::new(1, 0, 0)).await {
            Err(GitError::NotCommitted { paths }) => assert_eq!(paths, vec!["scratch.txt"]),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_lightweight_tags_are_not_versions() {
        let dir = tempfile::tempdir().unwrap();
        let Some(git) = init_repo(dir.path()).await else {
            return;
        };

        git.run(&["tag", "cadence-v1.0.0"]).await.unwrap();
        assert!(git.versions().await.unwrap().is_empty());
        assert!(!git.has_version(&Version::new(1, 0, 0)).await.unwrap());
    }

    #[tokio::test]
    async fn test_open_rejects_plain_directory() {
        let dir = tempfile::tempdir().unwrap();
        if GitClient::open(dir.path()).await.is_ok() {
            // Inside an enclosing repository; nothing to assert
            return;
        }
        assert!(matches!(
            GitClient::open(dir.path()).await,
            Err(GitError::NotARepository { .. })
        ));
    }
}
