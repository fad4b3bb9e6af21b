use std::fmt;
use std::path::{Path, PathBuf};

use crate::context::{OUTGROUP_LABEL, RunContext};
use crate::error::PipelineError;
use crate::preflight::Toolchain;

/// Flags the engine itself renders for tree search; custom option strings
/// may not contain them. They control output naming, working paths, and
/// threading.
pub const RESERVED_TREE_FLAGS: [&str; 4] = ["-s", "-n", "-w", "-T"];

/// Ancestral reconstruction additionally pins the analysis mode.
pub const RESERVED_ASR_FLAGS: [&str; 5] = ["-s", "-n", "-w", "-T", "-f"];

pub const DEFAULT_TREE_OPTIONS: &str = "-m GTRGAMMA -# 10 -p 12345";
pub const DEFAULT_ASR_OPTIONS: &str = "-m GTRGAMMA -p 12345";

/// A fully rendered external command: resolved program path plus argument
/// vector. Built only through the per-tool constructors below so every
/// legal invocation shape is enumerated in one place.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ToolInvocation {
    fn new(program: &Path) -> Self {
        Self {
            program: program.to_path_buf(),
            args: Vec::new(),
        }
    }

    fn arg(mut self, value: impl Into<String>) -> Self {
        self.args.push(value.into());
        self
    }

    fn path_arg(mut self, value: PathBuf) -> Self {
        self.args.push(value.display().to_string());
        self
    }

    fn args_from(mut self, values: &[String]) -> Self {
        self.args.extend(values.iter().cloned());
        self
    }
}

impl fmt::Display for ToolInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Splits an operator-supplied option string on whitespace and rejects any
/// token that matches a reserved flag.
///
/// The match is token equality, so it cannot tell a flag apart from an
/// option *value* that happens to spell the same text (`-p -T` would be
/// rejected on the `-T`). Failing closed on such values is accepted
/// behavior.
pub fn split_user_options(raw: &str, reserved: &[&str]) -> Result<Vec<String>, PipelineError> {
    let tokens: Vec<String> = raw.split_whitespace().map(str::to_string).collect();
    for token in &tokens {
        if reserved.contains(&token.as_str()) {
            return Err(PipelineError::OptionValidation(format!(
                "custom option string contains reserved flag '{token}'"
            )));
        }
    }
    Ok(tokens)
}

fn default_options(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

/// `fasta2phylip <input> <stage dir>` — writes `alignment_names` and the
/// RAxML/PAML phylip matrices into the stage directory.
pub fn converter(tools: &Toolchain, ctx: &RunContext) -> ToolInvocation {
    ToolInvocation::new(&tools.converter)
        .path_arg(ctx.input.clone())
        .path_arg(ctx.stage_dir(1))
}

/// RAxML tree search. The thread flag is appended only for the
/// multi-threaded binary variant.
pub fn tree_search(tools: &Toolchain, ctx: &RunContext) -> ToolInvocation {
    let mut invocation = ToolInvocation::new(&tools.raxml)
        .arg("-s")
        .path_arg(ctx.raxml_alignment())
        .arg("-n")
        .arg("RECON")
        .arg("-w")
        .path_arg(ctx.stage_dir(2));
    invocation = match &ctx.tree_options {
        Some(custom) => invocation.args_from(custom),
        None => invocation.args_from(&default_options(DEFAULT_TREE_OPTIONS)),
    };
    with_thread_flag(invocation, ctx)
}

/// `treeroot <tree> <outgroup> <output>` — reroots on the first sample.
pub fn reroot(tools: &Toolchain, ctx: &RunContext) -> ToolInvocation {
    ToolInvocation::new(&tools.rooter)
        .path_arg(ctx.best_tree())
        .arg(OUTGROUP_LABEL)
        .path_arg(ctx.rooted_tree())
}

/// RAxML marginal ancestral-state reconstruction (`-f A`) over the reduced
/// alignment and the rooted tree.
pub fn ancestral(tools: &Toolchain, ctx: &RunContext) -> ToolInvocation {
    let mut invocation = ToolInvocation::new(&tools.raxml)
        .arg("-f")
        .arg("A")
        .arg("-s")
        .path_arg(ctx.reduced_alignment())
        .arg("-t")
        .path_arg(ctx.rooted_tree())
        .arg("-n")
        .arg("ASR")
        .arg("-w")
        .path_arg(ctx.stage_dir(4));
    invocation = match &ctx.asr_options {
        Some(custom) => invocation.args_from(custom),
        None => invocation.args_from(&default_options(DEFAULT_ASR_OPTIONS)),
    };
    with_thread_flag(invocation, ctx)
}

/// `subannotate` — per-branch substitution tables plus an annotated tree.
pub fn annotate(tools: &Toolchain, ctx: &RunContext) -> ToolInvocation {
    ToolInvocation::new(tools.annotator.as_ref().expect("annotator resolved"))
        .arg("-t")
        .path_arg(ctx.asr_tree())
        .arg("-a")
        .path_arg(ctx.asr_states())
        .arg("-s")
        .path_arg(ctx.paml_alignment())
        .arg("-n")
        .path_arg(ctx.alignment_names())
        .arg("-o")
        .path_arg(ctx.stage_dir(5))
}

/// `recurscan` — gene-coordinate remapping and recurrence reports.
pub fn recurrence(tools: &Toolchain, ctx: &RunContext) -> ToolInvocation {
    ToolInvocation::new(tools.recurrence.as_ref().expect("recurrence tool resolved"))
        .arg("-g")
        .path_arg(ctx.gene_table.clone().expect("gene table present"))
        .arg("-s")
        .path_arg(ctx.substitutions())
        .arg("-o")
        .path_arg(ctx.stage_dir(6))
}

fn with_thread_flag(invocation: ToolInvocation, ctx: &RunContext) -> ToolInvocation {
    if ctx.threads > 1 {
        invocation.arg("-T").arg(ctx.threads.to_string())
    } else {
        invocation
    }
}
