// src/exec/project_executor.rs

//! Supervision of the application launched from a built project.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::{DevLoopError, Result};
use crate::exec::capture::{LineTarget, OutputFlags, join_readers, spawn_line_reader};
use crate::output::{BuildOutput, CapturedOutput, Stream};
use crate::project::Project;

/// How long each stop attempt waits for the process to exit.
pub const STOP_POLL_TIMEOUT: Duration = Duration::from_secs(1);

pub const DEFAULT_GRACEFUL_RETRIES: u32 = 3;

/// Program, arguments, working directory and extra environment of a child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub current_dir: PathBuf,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<OsString>, current_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: current_dir.into(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// `java <jvm_args> -cp <classpath> <main_class> <app_args>` in the
    /// project's root directory.
    pub fn java(java: impl Into<OsString>, project: &Project) -> Result<Self> {
        let classpath = std::env::join_paths(project.classpath())
            .map_err(|e| DevLoopError::ConfigError(format!("invalid classpath entry: {}", e)))?;
        Ok(Self::new(java, project.root_dir())
            .args(project.jvm_args())
            .arg("-cp")
            .arg(classpath)
            .arg(project.main_class())
            .args(project.app_args()))
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .current_dir(&self.current_dir)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        cmd
    }
}

/// A single supervised child process.
///
/// Output is forwarded to the sinks given at construction and kept in a
/// capture buffer that is reset on every [`start`](Self::start).
#[derive(Debug)]
pub struct ProjectExecutor {
    spec: CommandSpec,
    output: BuildOutput,
    graceful_retries: u32,
    child: Option<Child>,
    pid: Option<u32>,
    exit_status: Option<ExitStatus>,
    captured: CapturedOutput,
    flags: Arc<OutputFlags>,
    readers: Vec<JoinHandle<()>>,
}

impl ProjectExecutor {
    pub fn new(spec: CommandSpec, output: BuildOutput) -> Self {
        Self {
            spec,
            output,
            graceful_retries: DEFAULT_GRACEFUL_RETRIES,
            child: None,
            pid: None,
            exit_status: None,
            captured: CapturedOutput::default(),
            flags: Arc::new(OutputFlags::default()),
            readers: Vec::new(),
        }
    }

    /// Executor for `java ... <main_class>` of `project`.
    pub fn java(java: impl Into<OsString>, project: &Project, output: BuildOutput) -> Result<Self> {
        Ok(Self::new(CommandSpec::java(java, project)?, output))
    }

    /// SIGTERM attempts before escalating to SIGKILL.
    pub fn with_graceful_retries(mut self, retries: u32) -> Self {
        self.graceful_retries = retries;
        self
    }

    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    pub fn current_dir(&self) -> &Path {
        &self.spec.current_dir
    }

    /// Spawn the child. Fails if it is already running.
    pub fn start(&mut self) -> Result<u32> {
        if self.is_running() {
            return Err(anyhow!("process {:?} is already running", self.pid).into());
        }

        self.captured = CapturedOutput::default();
        self.flags = Arc::new(OutputFlags::default());
        self.exit_status = None;

        let mut cmd = self.spec.command();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning {:?}", self.spec.program))?;
        let pid = child
            .id()
            .ok_or_else(|| anyhow!("spawned process exited before reporting a pid"))?;

        let label = format!("{}[{}]", self.spec.program.to_string_lossy(), pid);
        let target = LineTarget {
            label,
            output: self.output.clone(),
            captured: self.captured.clone(),
            flags: Arc::clone(&self.flags),
        };
        self.readers.clear();
        if let Some(stdout) = child.stdout.take() {
            self.readers
                .push(spawn_line_reader(stdout, Stream::Stdout, target.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            self.readers.push(spawn_line_reader(stderr, Stream::Stderr, target));
        }

        info!(pid, program = ?self.spec.program, dir = ?self.spec.current_dir, "started process");
        self.child = Some(child);
        self.pid = Some(pid);
        Ok(pid)
    }

    /// True while the child has not exited. Records the exit status when it has.
    pub fn is_running(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                self.record_exit(status);
                false
            }
            Err(e) => {
                warn!(pid = ?self.pid, error = %e, "failed to poll process; treating as exited");
                self.child = None;
                false
            }
        }
    }

    /// Exit code of the last run, once it has exited. `None` while running,
    /// before the first start, or when the process died from a signal.
    pub fn exit_code(&mut self) -> Option<i32> {
        if self.is_running() {
            return None;
        }
        self.exit_status.and_then(|s| s.code())
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn has_stdout(&self) -> bool {
        self.flags.has_stdout()
    }

    pub fn has_stderr(&self) -> bool {
        self.flags.has_stderr()
    }

    /// Lines written by the current (or last) run, in arrival order.
    pub fn captured_lines(&self) -> Vec<(Stream, String)> {
        self.captured.lines()
    }

    pub fn captured(&self) -> &CapturedOutput {
        &self.captured
    }

    /// Exit status of a child that has exited, once its output has been
    /// fully read. `None` while it is still running or before the first start.
    pub async fn reap(&mut self) -> Option<ExitStatus> {
        if self.is_running() {
            return None;
        }
        self.drain_readers().await;
        self.exit_status
    }

    /// Wait up to `timeout` for the child to exit on its own.
    pub async fn wait_for_exit(&mut self, timeout: Duration) -> Result<Option<ExitStatus>> {
        let Some(child) = self.child.as_mut() else {
            return Ok(self.exit_status);
        };
        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => {
                let status = status.context("waiting for process exit")?;
                self.record_exit(status);
                self.drain_readers().await;
                Ok(Some(status))
            }
            Err(_) => Ok(None),
        }
    }

    /// Stop the child: SIGTERM up to `graceful_retries` times, each followed
    /// by a bounded wait, then SIGKILL and one last wait.
    ///
    /// A no-op when nothing is running. Fails with
    /// [`DevLoopError::ProcessStop`] if the process survives SIGKILL.
    pub async fn stop(&mut self) -> Result<()> {
        if !self.is_running() {
            self.drain_readers().await;
            return Ok(());
        }
        let Some(pid) = self.pid else {
            return Ok(());
        };

        for attempt in 1..=self.graceful_retries {
            debug!(pid, attempt, "sending terminate signal");
            if let Some(child) = self.child.as_mut() {
                terminate(child, pid)?;
            }
            if self.wait_for_exit(STOP_POLL_TIMEOUT).await?.is_some() {
                info!(pid, attempt, "process stopped");
                return Ok(());
            }
        }

        warn!(pid, retries = self.graceful_retries, "process ignored terminate; killing");
        if let Some(child) = self.child.as_mut() {
            if let Err(e) = child.start_kill() {
                debug!(pid, error = %e, "kill failed");
            }
        }
        if self.wait_for_exit(STOP_POLL_TIMEOUT).await?.is_some() {
            info!(pid, "process killed");
            return Ok(());
        }

        Err(DevLoopError::ProcessStop {
            pid,
            attempts: self.graceful_retries + 1,
        })
    }

    fn record_exit(&mut self, status: ExitStatus) {
        info!(pid = ?self.pid, exit_code = ?status.code(), success = status.success(), "process exited");
        self.exit_status = Some(status);
        self.child = None;
    }

    async fn drain_readers(&mut self) {
        let readers = std::mem::take(&mut self.readers);
        join_readers(readers, STOP_POLL_TIMEOUT).await;
    }
}

#[cfg(unix)]
fn terminate(_child: &mut Child, pid: u32) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(anyhow!("sending SIGTERM to {}: {}", pid, e).into()),
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child, _pid: u32) -> Result<()> {
    child.start_kill()?;
    Ok(())
}
