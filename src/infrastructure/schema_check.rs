//! API breaking-change detection with `buf`
//!
//! The service's protobuf API lives under `api/`. It is compared against
//! the same directory at the base version's tag in the local repository.

use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, info};

use crate::domain::naming::version_tag;
use crate::domain::{BreakingChanges, Version};
use crate::error::SchemaCheckError;
use crate::tools::{get_tool_path, tools};

/// Exit code `buf breaking` uses to report incompatible changes
const BREAKING_EXIT_CODE: i32 = 100;

#[allow(async_fn_in_trait)]
pub trait BreakingChangeChecker {
    /// Compare the working API with the snapshot published as `base`
    async fn check(&self, base: &Version) -> Result<BreakingChanges, SchemaCheckError>;
}

/// Runs `buf breaking` against a tag of the project repository
pub struct BufChecker {
    project_dir: PathBuf,
}

impl BufChecker {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
        }
    }

    fn args(&self, base: &Version) -> Vec<String> {
        let git_dir = self.project_dir.join(".git");
        vec![
            "breaking".to_string(),
            self.project_dir.join("api").display().to_string(),
            "--against".to_string(),
            format!(
                "{}#tag={},subdir=api",
                git_dir.display(),
                version_tag(base)
            ),
        ]
    }
}

/// Map the exit status of `buf breaking` to a result
fn interpret(
    tool: &str,
    code: Option<i32>,
    stderr: &str,
) -> Result<BreakingChanges, SchemaCheckError> {
    match code {
        Some(0) => Ok(BreakingChanges::None),
        Some(BREAKING_EXIT_CODE) => Ok(BreakingChanges::Detected),
        _ => Err(SchemaCheckError::ToolFailed {
            tool: tool.to_string(),
            code,
            stderr: stderr.trim().to_string(),
        }),
    }
}

impl BreakingChangeChecker for BufChecker {
    async fn check(&self, base: &Version) -> Result<BreakingChanges, SchemaCheckError> {
        let buf = get_tool_path(tools::BUF);
        let args = self.args(base);
        debug!("Running {} {}", buf, args.join(" "));

        let output = Command::new(&buf)
            .args(&args)
            .current_dir(&self.project_dir)
            .output()
            .await
            .map_err(|e| SchemaCheckError::Spawn {
                tool: buf.clone(),
                message: e.to_string(),
            })?;

        let result = interpret(
            &buf,
            output.status.code(),
            &String::from_utf8_lossy(&output.stderr),
        )?;
        match result {
            BreakingChanges::Detected => {
                info!(base = %base, "Breaking changes detected against base version")
            }
            BreakingChanges::None => info!(base = %base, "No breaking changes found"),
        }
        Ok(result)
    }
}
