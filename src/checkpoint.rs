use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};

/// Append-only record of completed stages, one `<index> <name>` line per
/// stage, kept next to the run logs. Only the final line is authoritative:
/// the file may grow across interrupted invocations or be truncated by an
/// operator, and the last write always wins. The engine never rewrites or
/// deletes it; re-running from scratch means removing the file out of band.
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Index of the last stage recorded as complete. 0 means no stage has
    /// completed and the pipeline starts from stage 1.
    pub fn resume_point(&self) -> Result<usize> {
        if !self.path.exists() {
            return Ok(0);
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read checkpoint {}", self.path.display()))?;
        let Some(last) = content.lines().rev().find(|line| !line.trim().is_empty()) else {
            return Ok(0);
        };
        let index_token = last.split_whitespace().next().unwrap_or_default();
        let index: usize = index_token.parse().with_context(|| {
            format!(
                "malformed checkpoint line '{last}' in {}",
                self.path.display()
            )
        })?;
        Ok(index)
    }

    /// Durably records one completed stage. Flush-and-sync before
    /// returning: a crash right after this call must still resume past the
    /// stage, and a crash right before it must re-attempt the stage.
    pub fn append(&self, index: usize, name: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open checkpoint {}", self.path.display()))?;
        writeln!(file, "{index} {name}")
            .with_context(|| format!("failed to append checkpoint {}", self.path.display()))?;
        file.flush()?;
        file.sync_all()
            .with_context(|| format!("failed to sync checkpoint {}", self.path.display()))?;
        Ok(())
    }
}
