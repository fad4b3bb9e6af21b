use std::path::PathBuf;

use thiserror::Error;

/// Fatal error classes surfaced to the operator. Everything here exits the
/// process with status 1; there is no in-process retry.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A required external binary or input file is unusable before any
    /// stage has run.
    #[error("missing prerequisite: {0}")]
    Prerequisite(String),

    /// CLI input that parsed but is not acceptable: bad thread count,
    /// reserved flags inside custom option strings, invalid flag
    /// combinations.
    #[error("invalid option: {0}")]
    OptionValidation(String),

    /// A stage's required output file is absent or zero-length after the
    /// external tool reported success. Execution failures themselves are
    /// reported by the executor with the tool and log path attached.
    #[error("expected output {path} is missing or empty")]
    MissingOutput { path: PathBuf },
}
