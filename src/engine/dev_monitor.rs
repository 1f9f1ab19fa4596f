// src/engine/dev_monitor.rs

//! The monitor used by the `devloop` binary.
//!
//! Prints one status line per transition, runs the built application, and
//! applies the consecutive-failure budgets:
//!
//! - a non-skipped build stops the application first;
//! - `on_ready` starts it when it is not running;
//! - at the end of each cycle a running application keeps the loop polling,
//!   while an exited one is classified (non-zero exit or anything on stderr
//!   is a failure) and the loop waits for the next change;
//! - an exhausted budget ends the loop.

use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use tracing::{info, warn};

use crate::errors::{DevLoopError, Result};
use crate::exec::{CommandSpec, ProjectExecutor};
use crate::output::BuildOutput;
use crate::project::Project;
use crate::types::{BuildType, ChangeType, NextAction};

use super::monitor::{BuildMonitor, MonitorFuture};
use super::policy::{FailureKind, FailurePolicy, Verdict};

/// Turns a built project into the command that runs it.
pub type Launcher = Arc<dyn Fn(&Project) -> Result<CommandSpec> + Send + Sync>;

/// What the current cycle has established so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleOutcome {
    Pending,
    Built(BuildType),
    BuildFailed(FailureKind, Verdict),
    AppStartFailed(Verdict),
}

pub struct DevLoopMonitor {
    launcher: Launcher,
    graceful_retries: u32,
    poll_interval: Duration,
    policy: FailurePolicy,
    status: BuildOutput,
    app_output: BuildOutput,
    app: Option<ProjectExecutor>,
    outcome: CycleOutcome,
}

impl std::fmt::Debug for DevLoopMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevLoopMonitor")
            .field("policy", &self.policy)
            .field("app", &self.app)
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}

impl DevLoopMonitor {
    /// Monitor that launches `java` with the project's classpath.
    pub fn new(java: impl Into<String>, policy: FailurePolicy) -> Self {
        let java = java.into();
        let launcher: Launcher = Arc::new(move |project: &Project| CommandSpec::java(&java, project));
        Self {
            launcher,
            graceful_retries: crate::exec::project_executor::DEFAULT_GRACEFUL_RETRIES,
            poll_interval: Duration::from_millis(200),
            policy,
            status: BuildOutput::console(),
            app_output: BuildOutput::console(),
            app: None,
            outcome: CycleOutcome::Pending,
        }
    }

    /// Replace how the application command is derived from a project.
    pub fn with_launcher<F>(mut self, launcher: F) -> Self
    where
        F: Fn(&Project) -> Result<CommandSpec> + Send + Sync + 'static,
    {
        self.launcher = Arc::new(launcher);
        self
    }

    pub fn with_graceful_retries(mut self, retries: u32) -> Self {
        self.graceful_retries = retries;
        self
    }

    /// Delay returned from `on_ready`, i.e. how often a running app is checked.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Where status lines go.
    pub fn with_status_output(mut self, output: BuildOutput) -> Self {
        self.status = output;
        self
    }

    /// Where the application's own output goes.
    pub fn with_app_output(mut self, output: BuildOutput) -> Self {
        self.app_output = output;
        self
    }

    pub fn policy(&self) -> &FailurePolicy {
        &self.policy
    }

    pub fn app(&self) -> Option<&ProjectExecutor> {
        self.app.as_ref()
    }

    async fn stop_app(&mut self) -> Result<()> {
        if let Some(mut app) = self.app.take() {
            if app.is_running() {
                self.status.out(&format!("{}", "stopping application".yellow()));
            }
            app.stop().await?;
        }
        Ok(())
    }

    fn start_app(&mut self, cycle: u64, project: &Project) {
        let started = (self.launcher)(project).and_then(|spec| {
            let mut app = ProjectExecutor::new(spec, self.app_output.clone())
                .with_graceful_retries(self.graceful_retries);
            app.start().map(|pid| (app, pid))
        });
        match started {
            Ok((app, pid)) => {
                info!(cycle, pid, project = %project.name(), "application started");
                self.status.out(&format!(
                    "{} {} (pid {})",
                    "started".green(),
                    project.main_class(),
                    pid
                ));
                self.app = Some(app);
            }
            Err(e) => {
                warn!(cycle, error = %e, "failed to start application");
                self.status.err(&format!("{}", format!("failed to start application: {}", e).red()));
                let verdict = self.policy.record_failure(FailureKind::Application);
                self.outcome = CycleOutcome::AppStartFailed(verdict);
            }
        }
    }

    /// Classify an exited application; `None` while it is still running.
    async fn check_app(&mut self) -> Option<NextAction> {
        let app = self.app.as_mut()?;
        let Some(status) = app.reap().await else {
            if self.outcome == CycleOutcome::Built(BuildType::Skipped) {
                // Survived a whole poll interval.
                self.policy.record_success(FailureKind::Application);
            }
            return None;
        };

        let code = status.code();
        let wrote_stderr = app.has_stderr();
        self.app = None;

        if code == Some(0) && !wrote_stderr {
            self.policy.record_success(FailureKind::Application);
            self.status.out(&format!("{}", "application exited".cyan()));
            return Some(NextAction::WaitForChange);
        }

        let reason = match code {
            Some(0) => "application wrote to stderr".to_string(),
            Some(code) => format!("application exited with status {}", code),
            None => "application terminated by a signal".to_string(),
        };
        self.status.err(&format!("{}", reason.red()));
        let verdict = self.policy.record_failure(FailureKind::Application);
        Some(self.after_failure(FailureKind::Application, verdict))
    }

    fn after_failure(&self, kind: FailureKind, verdict: Verdict) -> NextAction {
        if verdict.is_exhausted() {
            self.status.err(&format!(
                "{}",
                format!("exiting, max {} failures reached", kind).red().bold()
            ));
            NextAction::Exit
        } else {
            NextAction::WaitForChange
        }
    }
}

impl BuildMonitor for DevLoopMonitor {
    fn on_started(&mut self) {
        self.status.out(&format!("{}", "devloop started".bold()));
    }

    fn on_cycle_start(&mut self, _cycle: u64) {
        self.outcome = CycleOutcome::Pending;
    }

    fn on_changed(&mut self, cycle: u64, change: ChangeType) {
        info!(cycle, %change, "change detected");
        self.status.out(&format!("{} {}", "changed:".yellow(), change));
    }

    fn on_build_start(&mut self, cycle: u64, build_type: BuildType) -> MonitorFuture<'_, ()> {
        Box::pin(async move {
            if build_type == BuildType::Skipped {
                return Ok(());
            }
            self.stop_app().await?;
            self.status.out(&format!("{} ({}, cycle {})", "building".cyan(), build_type, cycle));
            Ok(())
        })
    }

    fn on_build_success(&mut self, _cycle: u64, build_type: BuildType) {
        self.outcome = CycleOutcome::Built(build_type);
        match build_type {
            BuildType::Skipped => {}
            BuildType::Incremental => {
                self.policy.record_success(FailureKind::IncrementalBuild);
                self.status.out(&format!("{}", "build succeeded (incremental)".green()));
            }
            full => {
                self.policy.record_success(FailureKind::FullBuild);
                self.status.out(&format!("{}", format!("build succeeded ({})", full).green()));
            }
        }
    }

    fn on_build_fail<'a>(
        &'a mut self,
        cycle: u64,
        build_type: BuildType,
        error: &'a DevLoopError,
    ) -> MonitorFuture<'a, ()> {
        Box::pin(async move {
            let kind = if build_type == BuildType::Incremental {
                FailureKind::IncrementalBuild
            } else {
                FailureKind::FullBuild
            };
            let verdict = self.policy.record_failure(kind);
            warn!(cycle, %build_type, ?verdict, error = %error, "build failed");
            self.status.err(&format!("{}", format!("build failed: {}", error).red()));
            self.outcome = CycleOutcome::BuildFailed(kind, verdict);
            self.stop_app().await
        })
    }

    fn on_ready<'a>(&'a mut self, cycle: u64, project: &'a Project) -> MonitorFuture<'a, Duration> {
        Box::pin(async move {
            if self.app.is_none() {
                self.start_app(cycle, project);
            }
            Ok(self.poll_interval)
        })
    }

    fn on_cycle_end(&mut self, _cycle: u64) -> MonitorFuture<'_, NextAction> {
        Box::pin(async move {
            let action = match self.outcome {
                CycleOutcome::BuildFailed(kind, verdict) => self.after_failure(kind, verdict),
                CycleOutcome::AppStartFailed(verdict) => {
                    self.after_failure(FailureKind::Application, verdict)
                }
                CycleOutcome::Built(_) | CycleOutcome::Pending => {
                    self.check_app().await.unwrap_or(NextAction::Continue)
                }
            };
            Ok(action)
        })
    }

    fn on_stopped(&mut self) -> MonitorFuture<'_, ()> {
        Box::pin(async move {
            let result = self.stop_app().await;
            self.status.out(&format!("{}", "devloop stopped".bold()));
            result
        })
    }
}
