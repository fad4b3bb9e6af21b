use std::env;
use std::path::PathBuf;

use crate::error::PipelineError;
use crate::tools::{RESERVED_ASR_FLAGS, RESERVED_TREE_FLAGS, split_user_options};

/// Numbered stage directories under the output root, in pipeline order.
pub const STAGE_DIRS: [&str; 6] = [
    "01_alignment",
    "02_tree",
    "03_rooting",
    "04_ancestral",
    "05_substitutions",
    "06_recurrence",
];

pub const FINAL_DIR: &str = "final";
pub const LOGS_DIR: &str = "logs";
pub const CHECKPOINT_FILE: &str = "checkpoint";

/// Leaf labels the converter assigns are `seq_1`, `seq_2`, ... in input
/// order; the first sample doubles as the rooting outgroup.
pub const OUTGROUP_LABEL: &str = "seq_1";

/// Immutable configuration for one pipeline invocation. Built once from
/// CLI input and handed by reference to every component; nothing reads
/// ambient process-wide state after this exists.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub input: PathBuf,
    pub output_root: PathBuf,
    pub gene_table: Option<PathBuf>,
    pub threads: u32,
    /// Custom tree-search options, already tokenized and screened for
    /// reserved flags. `None` means use the built-in defaults.
    pub tree_options: Option<Vec<String>>,
    /// Custom ancestral-reconstruction options, same treatment.
    pub asr_options: Option<Vec<String>>,
    /// Abbreviated mode stops the pipeline after tree rooting.
    pub abbreviated: bool,
}

impl RunContext {
    /// Validates raw CLI values and builds the context. All user errors
    /// come back as `PipelineError` so the process exits 1 rather than
    /// with an argument-parser status.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        input: Option<PathBuf>,
        output: Option<PathBuf>,
        gene_table: Option<PathBuf>,
        threads: &str,
        tree_options: Option<&str>,
        asr_options: Option<&str>,
        abbreviated: bool,
    ) -> Result<Self, PipelineError> {
        let input = input.ok_or_else(|| {
            PipelineError::OptionValidation("input sequence file (-i) is required".into())
        })?;
        let output = output.ok_or_else(|| {
            PipelineError::OptionValidation("output directory (-o) is required".into())
        })?;
        if gene_table.is_none() && !abbreviated {
            return Err(PipelineError::OptionValidation(
                "gene table (-g) is required unless abbreviated mode (-f) is set".into(),
            ));
        }

        let threads: u32 = threads.parse().map_err(|_| {
            PipelineError::OptionValidation(format!("thread count '{threads}' is not an integer"))
        })?;
        if threads == 0 {
            return Err(PipelineError::OptionValidation(
                "thread count must be a positive integer".into(),
            ));
        }

        let tree_options = tree_options
            .map(|raw| split_user_options(raw, &RESERVED_TREE_FLAGS))
            .transpose()?;
        let asr_options = asr_options
            .map(|raw| split_user_options(raw, &RESERVED_ASR_FLAGS))
            .transpose()?;

        Ok(Self {
            input,
            output_root: absolutize(output),
            gene_table,
            threads,
            tree_options,
            asr_options,
            abbreviated,
        })
    }

    /// Last stage index for this run mode.
    pub fn last_stage(&self) -> usize {
        if self.abbreviated { 3 } else { 6 }
    }

    pub fn stage_dir(&self, index: usize) -> PathBuf {
        self.output_root.join(STAGE_DIRS[index - 1])
    }

    pub fn final_dir(&self) -> PathBuf {
        self.output_root.join(FINAL_DIR)
    }

    pub fn final_file(&self, name: &str) -> PathBuf {
        self.final_dir().join(name)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.output_root.join(LOGS_DIR)
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.logs_dir().join(CHECKPOINT_FILE)
    }

    /// One original sample name per line; line N maps to leaf `seq_N`.
    pub fn alignment_names(&self) -> PathBuf {
        self.stage_dir(1).join("alignment_names")
    }

    pub fn raxml_alignment(&self) -> PathBuf {
        self.stage_dir(1).join("alignment.raxml.phylip")
    }

    pub fn paml_alignment(&self) -> PathBuf {
        self.stage_dir(1).join("alignment.paml.phylip")
    }

    pub fn best_tree(&self) -> PathBuf {
        self.stage_dir(2).join("RAxML_bestTree.RECON")
    }

    /// Bootstrap-support tree. Only present when the tree-search options
    /// requested bootstrapping, so never part of required outputs.
    pub fn support_tree(&self) -> PathBuf {
        self.stage_dir(2).join("RAxML_bipartitions.RECON")
    }

    /// The alignment downstream stages should treat as "reduced". RAxML
    /// only writes the `.reduced` file when it actually removed columns;
    /// when it did not, the original alignment *is* the reduced one and is
    /// aliased rather than copied.
    pub fn reduced_alignment(&self) -> PathBuf {
        let reduced = self.stage_dir(2).join("alignment.raxml.phylip.reduced");
        if reduced.is_file() {
            reduced
        } else {
            self.raxml_alignment()
        }
    }

    pub fn rooted_tree(&self) -> PathBuf {
        self.stage_dir(3).join("RAxML_bestTree.RECON.rooted")
    }

    pub fn asr_states(&self) -> PathBuf {
        self.stage_dir(4).join("RAxML_marginalAncestralStates.ASR")
    }

    pub fn asr_tree(&self) -> PathBuf {
        self.stage_dir(4).join("RAxML_nodeLabelledRootedTree.ASR")
    }

    pub fn substitutions(&self) -> PathBuf {
        self.stage_dir(5).join("substitutions.tsv")
    }

    pub fn annotated_tree(&self) -> PathBuf {
        self.stage_dir(5).join("annotated_tree.nwk")
    }

    pub fn all_substitutions_tree(&self) -> PathBuf {
        self.stage_dir(6).join("all_substitutions.nwk")
    }

    pub fn recurrent_substitutions_tree(&self) -> PathBuf {
        self.stage_dir(6).join("recurrent_substitutions.nwk")
    }
}

fn absolutize(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    fn context(out: PathBuf) -> RunContext {
        RunContext::new(
            Some(PathBuf::from("in.fasta")),
            Some(out),
            Some(PathBuf::from("genes.tsv")),
            "1",
            None,
            None,
            false,
        )
        .unwrap()
    }

    #[test]
    fn gene_table_required_in_full_mode() {
        let err = RunContext::new(
            Some(PathBuf::from("in.fasta")),
            Some(PathBuf::from("out")),
            None,
            "1",
            None,
            None,
            false,
        )
        .unwrap_err();
        assert!(err.to_string().contains("-g"));
    }

    #[test]
    fn gene_table_optional_in_abbreviated_mode() {
        let ctx = RunContext::new(
            Some(PathBuf::from("in.fasta")),
            Some(PathBuf::from("out")),
            None,
            "2",
            None,
            None,
            true,
        )
        .unwrap();
        assert_eq!(ctx.last_stage(), 3);
        assert_eq!(ctx.threads, 2);
    }

    #[test]
    fn rejects_bad_thread_counts() {
        for bad in ["0", "-3", "two", ""] {
            let err = RunContext::new(
                Some(PathBuf::from("in.fasta")),
                Some(PathBuf::from("out")),
                None,
                bad,
                None,
                None,
                true,
            )
            .unwrap_err();
            assert!(matches!(err, PipelineError::OptionValidation(_)), "{bad}");
        }
    }

    #[test]
    fn rejects_reserved_custom_flags() {
        let err = RunContext::new(
            Some(PathBuf::from("in.fasta")),
            Some(PathBuf::from("out")),
            None,
            "1",
            Some("-m GTRCAT -w /tmp"),
            None,
            true,
        )
        .unwrap_err();
        assert!(err.to_string().contains("-w"));
    }

    #[test]
    fn reduced_alignment_aliases_original_when_absent() {
        let temp = tempdir().unwrap();
        let ctx = context(temp.path().to_path_buf());
        assert_eq!(ctx.reduced_alignment(), ctx.raxml_alignment());

        let reduced = ctx.stage_dir(2).join("alignment.raxml.phylip.reduced");
        fs::create_dir_all(ctx.stage_dir(2)).unwrap();
        fs::write(&reduced, "1 4\nseq_1 ACGT\n").unwrap();
        assert_eq!(ctx.reduced_alignment(), reduced);
    }
}
