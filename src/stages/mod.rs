use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::info;

use crate::context::RunContext;
use crate::exec::{RunLog, run_tool};
use crate::preflight::Toolchain;
use crate::tools;

/// One checkpointed unit of pipeline work: a single external-tool
/// invocation plus whatever small deterministic post-processing belongs to
/// the same contract. Success is judged by the driver against
/// `required_outputs`, never inside `run`.
pub trait Stage: Send + Sync {
    /// 1-based position in the fixed pipeline order.
    fn index(&self) -> usize;
    fn name(&self) -> &'static str;
    /// Files that must exist and be non-empty for this stage to count as
    /// complete.
    fn required_outputs(&self, ctx: &RunContext) -> Vec<PathBuf>;
    fn run(&self, ctx: &RunContext, tools: &Toolchain, log: &RunLog) -> Result<()>;
}

/// The fixed stage list. Abbreviated mode truncates after tree rooting;
/// the decision is made here, once, and never re-evaluated mid-run.
pub fn pipeline_stages(abbreviated: bool) -> Vec<Box<dyn Stage>> {
    let mut stages: Vec<Box<dyn Stage>> = vec![
        Box::new(Alignment),
        Box::new(TreeInference),
        Box::new(TreeRooting),
    ];
    if !abbreviated {
        stages.push(Box::new(AncestralReconstruction));
        stages.push(Box::new(SubstitutionAnnotation));
        stages.push(Box::new(RecurrenceDetection));
    }
    stages
}

struct Alignment;

impl Stage for Alignment {
    fn index(&self) -> usize {
        1
    }

    fn name(&self) -> &'static str {
        "alignment"
    }

    fn required_outputs(&self, ctx: &RunContext) -> Vec<PathBuf> {
        vec![
            ctx.alignment_names(),
            ctx.raxml_alignment(),
            ctx.paml_alignment(),
        ]
    }

    fn run(&self, ctx: &RunContext, tools: &Toolchain, log: &RunLog) -> Result<()> {
        run_tool(&tools::converter(tools, ctx), log)
    }
}

struct TreeInference;

impl Stage for TreeInference {
    fn index(&self) -> usize {
        2
    }

    fn name(&self) -> &'static str {
        "tree_inference"
    }

    fn required_outputs(&self, ctx: &RunContext) -> Vec<PathBuf> {
        // The support tree and the reduced alignment are conditional
        // artifacts, so neither is required here.
        vec![ctx.best_tree()]
    }

    fn run(&self, ctx: &RunContext, tools: &Toolchain, log: &RunLog) -> Result<()> {
        run_tool(&tools::tree_search(tools, ctx), log)?;

        // Bootstrap-support tree only exists when the options asked for
        // bootstrapping. Publish it with original sample names restored.
        let support = ctx.support_tree();
        if support.is_file() {
            let names = read_sample_names(&ctx.alignment_names())?;
            let published = ctx.final_file("support_tree.nwk");
            relabel_tree_file(&support, &published, &names)?;
            info!(tree = %published.display(), "published relabeled support tree");
            log.message(&format!(
                "support tree published to {}",
                published.display()
            ));
        }
        Ok(())
    }
}

struct TreeRooting;

impl Stage for TreeRooting {
    fn index(&self) -> usize {
        3
    }

    fn name(&self) -> &'static str {
        "tree_rooting"
    }

    fn required_outputs(&self, ctx: &RunContext) -> Vec<PathBuf> {
        vec![ctx.rooted_tree(), ctx.final_file("rooted_tree.nwk")]
    }

    fn run(&self, ctx: &RunContext, tools: &Toolchain, log: &RunLog) -> Result<()> {
        run_tool(&tools::reroot(tools, ctx), log)?;
        let names = read_sample_names(&ctx.alignment_names())?;
        relabel_tree_file(
            &ctx.rooted_tree(),
            &ctx.final_file("rooted_tree.nwk"),
            &names,
        )
    }
}

struct AncestralReconstruction;

impl Stage for AncestralReconstruction {
    fn index(&self) -> usize {
        4
    }

    fn name(&self) -> &'static str {
        "ancestral_reconstruction"
    }

    fn required_outputs(&self, ctx: &RunContext) -> Vec<PathBuf> {
        vec![ctx.asr_states(), ctx.asr_tree()]
    }

    fn run(&self, ctx: &RunContext, tools: &Toolchain, log: &RunLog) -> Result<()> {
        run_tool(&tools::ancestral(tools, ctx), log)
    }
}

struct SubstitutionAnnotation;

impl Stage for SubstitutionAnnotation {
    fn index(&self) -> usize {
        5
    }

    fn name(&self) -> &'static str {
        "substitution_annotation"
    }

    fn required_outputs(&self, ctx: &RunContext) -> Vec<PathBuf> {
        vec![
            ctx.substitutions(),
            ctx.annotated_tree(),
            ctx.final_file("substitutions.tsv"),
            ctx.final_file("annotated_tree.nwk"),
        ]
    }

    fn run(&self, ctx: &RunContext, tools: &Toolchain, log: &RunLog) -> Result<()> {
        run_tool(&tools::annotate(tools, ctx), log)?;
        publish(&ctx.substitutions(), &ctx.final_file("substitutions.tsv"))?;
        publish(&ctx.annotated_tree(), &ctx.final_file("annotated_tree.nwk"))
    }
}

struct RecurrenceDetection;

impl Stage for RecurrenceDetection {
    fn index(&self) -> usize {
        6
    }

    fn name(&self) -> &'static str {
        "recurrence_detection"
    }

    fn required_outputs(&self, ctx: &RunContext) -> Vec<PathBuf> {
        vec![
            ctx.all_substitutions_tree(),
            ctx.recurrent_substitutions_tree(),
            ctx.final_file("all_substitutions.nwk"),
            ctx.final_file("recurrent_substitutions.nwk"),
        ]
    }

    fn run(&self, ctx: &RunContext, tools: &Toolchain, log: &RunLog) -> Result<()> {
        run_tool(&tools::recurrence(tools, ctx), log)?;
        publish(
            &ctx.all_substitutions_tree(),
            &ctx.final_file("all_substitutions.nwk"),
        )?;
        publish(
            &ctx.recurrent_substitutions_tree(),
            &ctx.final_file("recurrent_substitutions.nwk"),
        )
    }
}

fn publish(src: &Path, dest: &Path) -> Result<()> {
    fs::copy(src, dest)
        .with_context(|| format!("failed to copy {} to {}", src.display(), dest.display()))?;
    Ok(())
}

/// Sample names in converter order: line N names the sequence behind leaf
/// label `seq_N`.
pub fn read_sample_names(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read sample names {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Rewrites every `seq_N` leaf token in a newick string to the Nth
/// original sample name. Pure, order-preserving text substitution; the
/// tree topology is untouched. A placeholder with no matching name is an
/// error rather than a silent passthrough.
pub fn relabel_placeholders(tree: &str, names: &[String]) -> Result<String> {
    let mut out = String::with_capacity(tree.len());
    let mut rest = tree;
    while let Some(pos) = rest.find("seq_") {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];

        // Token must start at a label boundary: "myseq_2" is a real name.
        let at_boundary = out
            .chars()
            .last()
            .is_none_or(|c| !(c.is_ascii_alphanumeric() || c == '_'));
        let digits: String = rest["seq_".len()..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if !at_boundary || digits.is_empty() {
            out.push_str("seq_");
            rest = &rest["seq_".len()..];
            continue;
        }

        let index: usize = digits
            .parse()
            .with_context(|| format!("placeholder seq_{digits} index out of range"))?;
        let name = index
            .checked_sub(1)
            .and_then(|i| names.get(i))
            .ok_or_else(|| anyhow!("placeholder seq_{index} has no matching sample name"))?;
        out.push_str(name);
        rest = &rest["seq_".len() + digits.len()..];
    }
    out.push_str(rest);
    Ok(out)
}

fn relabel_tree_file(src: &Path, dest: &Path, names: &[String]) -> Result<()> {
    let tree = fs::read_to_string(src)
        .with_context(|| format!("failed to read tree {}", src.display()))?;
    let relabeled = relabel_placeholders(&tree, names)?;
    fs::write(dest, relabeled)
        .with_context(|| format!("failed to write relabeled tree {}", dest.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn full_pipeline_has_six_contiguous_stages() {
        let stages = pipeline_stages(false);
        let indices: Vec<usize> = stages.iter().map(|s| s.index()).collect();
        assert_eq!(indices, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn abbreviated_pipeline_stops_after_rooting() {
        let stages = pipeline_stages(true);
        let indices: Vec<usize> = stages.iter().map(|s| s.index()).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert_eq!(stages.last().unwrap().name(), "tree_rooting");
    }

    #[test]
    fn relabels_each_placeholder_by_position() {
        let tree = "(seq_1:0.1,(seq_2:0.2,seq_3:0.3));";
        let relabeled =
            relabel_placeholders(tree, &names(&["ref", "patient_a", "patient_b"])).unwrap();
        assert_eq!(relabeled, "(ref:0.1,(patient_a:0.2,patient_b:0.3));");
    }

    #[test]
    fn distinguishes_seq_1_from_seq_10() {
        let sample_names: Vec<String> = (1..=10).map(|i| format!("s{i:02}")).collect();
        let relabeled = relabel_placeholders("(seq_1,seq_10);", &sample_names).unwrap();
        assert_eq!(relabeled, "(s01,s10);");
    }

    #[test]
    fn leaves_lookalike_labels_alone() {
        let relabeled = relabel_placeholders("(myseq_2,seq_1);", &names(&["ref"])).unwrap();
        assert_eq!(relabeled, "(myseq_2,ref);");
    }

    #[test]
    fn bare_prefix_without_digits_passes_through() {
        let relabeled = relabel_placeholders("(seq_x,seq_1);", &names(&["ref"])).unwrap();
        assert_eq!(relabeled, "(seq_x,ref);");
    }

    #[test]
    fn unmatched_placeholder_is_an_error() {
        assert!(relabel_placeholders("(seq_5);", &names(&["only"])).is_err());
        assert!(relabel_placeholders("(seq_0);", &names(&["only"])).is_err());
    }
}
