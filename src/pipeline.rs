use std::fs;

use anyhow::{Context, Result};
use tracing::info;

use crate::checkpoint::CheckpointStore;
use crate::context::RunContext;
use crate::exec::RunLog;
use crate::preflight::Toolchain;
use crate::stages::{Stage, pipeline_stages};
use crate::validate::validate_outputs;

/// Single-threaded, strictly sequential state machine over the fixed stage
/// list. Per stage: execute, validate required outputs, append checkpoint.
/// The first failure anywhere aborts the run; re-invocation resumes after
/// the last checkpointed stage.
pub struct PipelineDriver<'a> {
    ctx: &'a RunContext,
    tools: &'a Toolchain,
    stages: Vec<Box<dyn Stage>>,
    checkpoints: CheckpointStore,
}

impl<'a> PipelineDriver<'a> {
    pub fn new(ctx: &'a RunContext, tools: &'a Toolchain) -> Self {
        Self {
            ctx,
            tools,
            stages: pipeline_stages(ctx.abbreviated),
            checkpoints: CheckpointStore::new(ctx.checkpoint_path()),
        }
    }

    pub fn run(&self, log: &RunLog) -> Result<()> {
        let resume = self.checkpoints.resume_point()?;
        if resume >= self.ctx.last_stage() {
            let line = format!("all {} stages already checkpointed, nothing to do", resume);
            info!("{line}");
            log.message(&line);
            return Ok(());
        }
        if resume > 0 {
            let line = format!("resuming after completed stage {resume}");
            info!("{line}");
            log.message(&line);
        }

        for stage in &self.stages {
            if stage.index() <= resume {
                continue;
            }
            let line = format!(
                "stage {}/{} ({}) starting",
                stage.index(),
                self.ctx.last_stage(),
                stage.name()
            );
            info!("{line}");
            log.message(&line);

            let stage_dir = self.ctx.stage_dir(stage.index());
            fs::create_dir_all(&stage_dir).with_context(|| {
                format!("failed to create stage directory {}", stage_dir.display())
            })?;

            stage
                .run(self.ctx, self.tools, log)
                .with_context(|| failure_note(stage.as_ref(), log))?;
            validate_outputs(&stage.required_outputs(self.ctx))
                .with_context(|| failure_note(stage.as_ref(), log))?;

            // Only now is the stage allowed to count as done.
            self.checkpoints.append(stage.index(), stage.name())?;

            let line = format!("stage {} ({}) completed", stage.index(), stage.name());
            info!("{line}");
            log.message(&line);
        }

        Ok(())
    }
}

fn failure_note(stage: &dyn Stage, log: &RunLog) -> String {
    format!(
        "stage {} ({}) failed; see {}",
        stage.index(),
        stage.name(),
        log.path().display()
    )
}
