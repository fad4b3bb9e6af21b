use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::thread;

use anyhow::{Context, Result, bail};
use chrono::Local;

use crate::tools::ToolInvocation;

/// Per-invocation transcript under `logs/`, created fresh with a
/// timestamped name. External tool output and driver status lines are
/// appended here in addition to reaching the terminal.
#[derive(Debug)]
pub struct RunLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl RunLog {
    pub fn create(logs_dir: &Path) -> Result<Self> {
        fs::create_dir_all(logs_dir)
            .with_context(|| format!("failed to create log directory {}", logs_dir.display()))?;
        let name = format!("run_{}.log", Local::now().format("%Y%m%d_%H%M%S"));
        let path = logs_dir.join(name);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to create run log {}", path.display()))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Driver-level status line. Best effort: a full log disk must not
    /// take down a run whose real outputs are landing fine.
    pub fn message(&self, line: &str) {
        self.write_line(&format!("[treeflow] {line}"));
    }

    fn write_line(&self, line: &str) {
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{line}");
            let _ = file.flush();
        }
    }
}

/// Launches one external tool and blocks until it exits, teeing stdout and
/// stderr line-by-line to the terminal and the run log. Lines are flushed
/// as they arrive so long-running tool progress stays visible live.
pub fn run_tool(invocation: &ToolInvocation, log: &RunLog) -> Result<()> {
    log.message(&format!("exec: {invocation}"));
    let mut child = Command::new(&invocation.program)
        .args(&invocation.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to launch '{}'", invocation.program.display()))?;

    let stdout = child.stdout.take().expect("stdout piped");
    let stderr = child.stderr.take().expect("stderr piped");
    thread::scope(|scope| {
        scope.spawn(|| tee(stdout, log, false));
        scope.spawn(|| tee(stderr, log, true));
    });

    let status = child
        .wait()
        .with_context(|| format!("failed waiting for '{}'", invocation.program.display()))?;
    if !status.success() {
        bail!(
            "'{}' exited with {status}; see {}",
            invocation.program.display(),
            log.path().display()
        );
    }
    Ok(())
}

fn tee(source: impl Read, log: &RunLog, to_stderr: bool) {
    let reader = BufReader::new(source);
    for line in reader.lines() {
        let Ok(line) = line else { break };
        if to_stderr {
            eprintln!("{line}");
        } else {
            println!("{line}");
        }
        log.write_line(&line);
    }
}
