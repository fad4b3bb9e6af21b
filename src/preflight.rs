use std::env;
use std::path::{Path, PathBuf};

use crate::context::RunContext;
use crate::error::PipelineError;
use crate::validate::require_nonempty_input;

pub const CONVERTER_BIN: &str = "fasta2phylip";
pub const RAXML_BIN: &str = "raxmlHPC";
pub const RAXML_PTHREADS_BIN: &str = "raxmlHPC-PTHREADS";
pub const ROOTER_BIN: &str = "treeroot";
pub const ANNOTATOR_BIN: &str = "subannotate";
pub const RECURRENCE_BIN: &str = "recurscan";

/// Resolved paths for every external binary this invocation can reach.
/// Resolution happens once, before stage 1, so a missing tool surfaces
/// immediately instead of mid-run. The annotator and recurrence helper are
/// skipped in abbreviated mode.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub converter: PathBuf,
    pub raxml: PathBuf,
    pub rooter: PathBuf,
    pub annotator: Option<PathBuf>,
    pub recurrence: Option<PathBuf>,
}

impl Toolchain {
    pub fn resolve(ctx: &RunContext) -> Result<Self, PipelineError> {
        let raxml_bin = raxml_binary_name(ctx.threads);
        let converter = require_tool(CONVERTER_BIN)?;
        let raxml = require_tool(raxml_bin)?;
        let rooter = require_tool(ROOTER_BIN)?;
        let (annotator, recurrence) = if ctx.abbreviated {
            (None, None)
        } else {
            (
                Some(require_tool(ANNOTATOR_BIN)?),
                Some(require_tool(RECURRENCE_BIN)?),
            )
        };
        Ok(Self {
            converter,
            raxml,
            rooter,
            annotator,
            recurrence,
        })
    }
}

/// One thread keeps the plain binary with no thread flag; more selects the
/// pthreads build.
pub fn raxml_binary_name(threads: u32) -> &'static str {
    if threads > 1 { RAXML_PTHREADS_BIN } else { RAXML_BIN }
}

/// Operator-supplied files checked before any stage runs.
pub fn check_inputs(ctx: &RunContext) -> Result<(), PipelineError> {
    require_nonempty_input(&ctx.input, "input sequence file")?;
    if !ctx.abbreviated {
        let gene_table = ctx.gene_table.as_ref().expect("gene table set in full mode");
        require_nonempty_input(gene_table, "gene table")?;
    }
    Ok(())
}

fn require_tool(name: &str) -> Result<PathBuf, PipelineError> {
    find_on_path(name).ok_or_else(|| {
        PipelineError::Prerequisite(format!("required tool '{name}' not found on PATH"))
    })
}

/// Plain PATH scan; a hit must be a regular, executable file.
pub fn find_on_path(name: &str) -> Option<PathBuf> {
    let path_var = env::var_os("PATH")?;
    for dir in env::split_paths(&path_var) {
        let candidate = dir.join(name);
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
