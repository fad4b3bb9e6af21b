use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, prelude::*};
use treeflow::RunContext;
use treeflow::exec::RunLog;
use treeflow::pipeline::PipelineDriver;
use treeflow::preflight::{self, Toolchain};

/// Checkpointed driver for the six-stage tree-substitution analysis
/// pipeline (alignment, tree inference, rooting, ancestral reconstruction,
/// substitution annotation, recurrence detection).
///
/// Required-ness of most flags is enforced after parsing so every operator
/// error exits with status 1.
#[derive(Parser)]
#[command(
    name = "treeflow",
    about = "Resumable driver for the RAxML substitution-annotation pipeline",
    disable_version_flag = true
)]
struct Cli {
    /// Input sequence file (FASTA)
    #[arg(short = 'i', value_name = "FASTA")]
    input: Option<PathBuf>,

    /// Output directory root
    #[arg(short = 'o', value_name = "DIR")]
    output: Option<PathBuf>,

    /// Gene table; required unless running abbreviated (-f)
    #[arg(short = 'g', value_name = "TABLE")]
    gene_table: Option<PathBuf>,

    /// CPU/thread count for the tree engine
    #[arg(short = 't', value_name = "N", default_value = "1")]
    threads: String,

    /// Custom tree-search options (reserved flags rejected)
    #[arg(short = 'r', value_name = "OPTS", allow_hyphen_values = true)]
    tree_options: Option<String>,

    /// Custom ancestral-reconstruction options (reserved flags rejected)
    #[arg(short = 'a', value_name = "OPTS", allow_hyphen_values = true)]
    asr_options: Option<String>,

    /// Abbreviated mode: stop after tree rooting (stages 1-3)
    #[arg(short = 'f')]
    abbreviated: bool,

    /// Print version and exit
    #[arg(short = 'v', long = "version")]
    version: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.version {
        println!("treeflow {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    configure_tracing()?;

    let ctx = RunContext::new(
        cli.input,
        cli.output,
        cli.gene_table,
        &cli.threads,
        cli.tree_options.as_deref(),
        cli.asr_options.as_deref(),
        cli.abbreviated,
    )?;

    preflight::check_inputs(&ctx)?;
    let tools = Toolchain::resolve(&ctx)?;

    for dir in [ctx.output_root.clone(), ctx.final_dir(), ctx.logs_dir()] {
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create directory {}", dir.display()))?;
    }

    let log = RunLog::create(&ctx.logs_dir())?;
    info!(log = %log.path().display(), "run log created");

    let driver = PipelineDriver::new(&ctx, &tools);
    driver.run(&log)?;

    info!(output = %ctx.final_dir().display(), "pipeline complete");
    log.message("pipeline complete");
    Ok(())
}

fn configure_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|err| anyhow!(err.to_string()))
}
