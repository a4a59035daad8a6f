//! Env command - prints the variable a service reads to reach a dependency

use anyhow::Result;
use std::path::Path;

use super::Workspace;
use crate::config::ProjectFiles;
use crate::domain::naming::{service_env, validate_name};

/// Print the host variable for `name`, or for this project's own service
///
/// Only the default case needs a project; an explicit name works anywhere.
pub fn execute(cwd: Option<&Path>, local: bool, name: Option<String>) -> Result<()> {
    let name = match name {
        Some(name) => name,
        None => locked_name(&Workspace::open(cwd, local)?.files)?,
    };
    println!("{}", dependency_variable(&name)?);
    Ok(())
}

/// Variable carrying the in-cluster host of service `name`
pub fn dependency_variable(name: &str) -> Result<String> {
    validate_name(name)?;
    Ok(service_env(name))
}

fn locked_name(files: &ProjectFiles) -> Result<String> {
    Ok(files.require_lock()?.name)
}
