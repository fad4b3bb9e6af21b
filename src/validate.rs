use std::fs;
use std::path::Path;

use crate::error::PipelineError;

/// Existence plus non-zero size, nothing content-aware. "Non-empty" is the
/// liveness signal this engine trusts from external tools whose internal
/// correctness it does not own.
pub fn is_nonempty_file(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file() && m.len() > 0).unwrap_or(false)
}

/// Checks every required output in order and fails on the first path that
/// is missing or empty, naming it so the operator can be pointed at the
/// stage's log output.
pub fn validate_outputs(paths: &[std::path::PathBuf]) -> Result<(), PipelineError> {
    for path in paths {
        if !is_nonempty_file(path) {
            return Err(PipelineError::MissingOutput { path: path.clone() });
        }
    }
    Ok(())
}

/// Pre-run variant for operator-supplied inputs.
pub fn require_nonempty_input(path: &Path, what: &str) -> Result<(), PipelineError> {
    if is_nonempty_file(path) {
        Ok(())
    } else {
        Err(PipelineError::Prerequisite(format!(
            "{what} {} is missing or empty",
            path.display()
        )))
    }
}
