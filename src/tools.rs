//! External binaries cadence shells out to
//!
//! `git` drives tags and dependency checkouts, `buf` compares the API
//! against the base snapshot. Each binary can be pinned with a
//! `{TOOL}_BIN` variable (`GIT_BIN`, `BUF_BIN`); otherwise the bare name
//! is looked up on PATH.

use std::env;

/// Binary to run for `tool`, honoring the `{TOOL}_BIN` override
pub fn get_tool_path(tool: &str) -> String {
    env::var(tool_env_var(tool)).unwrap_or_else(|_| tool.to_string())
}

/// Override variable for a tool; hyphens become underscores
fn tool_env_var(tool: &str) -> String {
    format!("{}_BIN", tool.to_uppercase().replace('-', "_"))
}

pub mod tools {
    pub const GIT: &str = "git";
    pub const BUF: &str = "buf";
}
