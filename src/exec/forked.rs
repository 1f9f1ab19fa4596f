// src/exec/forked.rs

//! Full builds by an external build tool run through the shell.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::process::Command;
use tracing::{info, warn};

use crate::errors::{DevLoopError, Result};
use crate::exec::backend::BuildExecutor;
use crate::exec::capture::{LineTarget, OutputFlags, join_readers, spawn_line_reader};
use crate::output::{BuildOutput, CapturedOutput, Stream};

/// Build a shell command appropriate for the platform.
pub(crate) fn shell_command(command_line: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(command_line);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(command_line);
        c
    }
}

/// Runs the configured build command in the project directory.
#[derive(Debug, Clone)]
pub struct ForkedBuildExecutor {
    command: String,
    clean_command: Option<String>,
    clean_dirs: Vec<PathBuf>,
    env: Vec<(String, String)>,
}

impl ForkedBuildExecutor {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            clean_command: None,
            clean_dirs: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Command used for clean builds instead of `command`.
    pub fn with_clean_command(mut self, command: impl Into<String>) -> Self {
        self.clean_command = Some(command.into());
        self
    }

    /// Directories emptied before a clean build when no clean command is set.
    pub fn with_clean_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.clean_dirs = dirs;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    async fn run(&self, clean: bool, project_dir: &Path, output: &BuildOutput) -> Result<()> {
        let command_line = match (&self.clean_command, clean) {
            (Some(clean_command), true) => clean_command.as_str(),
            (None, true) => {
                for dir in &self.clean_dirs {
                    output.out(&format!("Cleaning {}", dir.display()));
                    crate::fs::clean_dir(dir)?;
                }
                self.command.as_str()
            }
            (_, false) => self.command.as_str(),
        };

        info!(cmd = %command_line, dir = ?project_dir, clean, "starting forked build");

        let mut cmd = shell_command(command_line);
        cmd.current_dir(project_dir)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning build command '{}'", command_line))?;

        let target = LineTarget {
            label: "build".to_string(),
            output: output.clone(),
            captured: CapturedOutput::default(),
            flags: Arc::new(OutputFlags::default()),
        };
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_line_reader(stdout, Stream::Stdout, target.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_line_reader(stderr, Stream::Stderr, target));
        }

        let status = child
            .wait()
            .await
            .with_context(|| format!("waiting for build command '{}'", command_line))?;
        join_readers(readers, Duration::from_secs(1)).await;

        if status.success() {
            info!(cmd = %command_line, "forked build succeeded");
            Ok(())
        } else {
            let code = status.code().unwrap_or(-1);
            warn!(cmd = %command_line, exit_code = code, "forked build failed");
            Err(DevLoopError::BuildFailed(format!(
                "'{}' exited with status {}",
                command_line, code
            )))
        }
    }
}

impl BuildExecutor for ForkedBuildExecutor {
    fn execute<'a>(
        &'a self,
        clean: bool,
        project_dir: &'a Path,
        output: &'a BuildOutput,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.run(clean, project_dir, output))
    }
}
