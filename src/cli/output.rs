//! CLI output: error mapping from domain errors to the CLI surface.

use crate::error::VfsError;

/// Map domain errors to a string for CLI output.
pub fn map_error(e: &VfsError) -> String {
    match e {
        VfsError::AccessDenied(_) | VfsError::Configuration(_) => e.to_string(),
        VfsError::NotFound(what) => format!("Nothing found: {}", what),
        other => format!("dbafs: {}", other),
    }
}
