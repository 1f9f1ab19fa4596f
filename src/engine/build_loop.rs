// src/engine/build_loop.rs

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use anyhow::anyhow;
use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::errors::{DevLoopError, Result};
use crate::fs::ExcludeSet;
use crate::output::BuildOutput;
use crate::project::{Project, ProjectSupplier};
use crate::types::{BuildType, ChangeType, TieBreak};

use super::core::{AfterCycle, BuildPlan, LoopCore, LoopState, Observation};
use super::monitor::BuildMonitor;

/// Knobs of the build loop itself.
#[derive(Debug, Clone)]
pub struct LoopOptions {
    /// Clean the output directories before the first build.
    pub initial_clean: bool,
    /// Interval between checks while waiting for a change.
    pub poll_interval: Duration,
    /// Stop after this many cycles.
    pub max_cycles: Option<u64>,
    /// Globs ignored while waiting for a change without a project.
    pub exclude: Vec<String>,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            initial_clean: false,
            poll_interval: Duration::from_millis(200),
            max_cycles: None,
            exclude: Vec::new(),
        }
    }
}

/// State shared between the loop task and its handle.
#[derive(Debug)]
struct Shared {
    stop_requested: AtomicBool,
    stopped: AtomicBool,
    cycle: AtomicU64,
    wake: Notify,
    state: watch::Sender<LoopState>,
}

impl Shared {
    fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: LoopState) {
        self.state.send_replace(state);
    }

    /// Sleep for `duration` unless a stop is requested first. Returns false
    /// when woken by a stop request.
    async fn sleep(&self, duration: Duration) -> bool {
        if self.stop_requested() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => !self.stop_requested(),
            _ = self.wake.notified() => false,
        }
    }
}

/// Drives a project through build cycles, reporting to a [`BuildMonitor`].
///
/// The semantics live in [`LoopCore`]; this shell performs the IO: file
/// scans, builds through the [`ProjectSupplier`] and the project, monitor
/// calls and sleeps.
pub struct BuildLoop<S: ProjectSupplier, M: BuildMonitor> {
    supplier: S,
    monitor: M,
    options: LoopOptions,
    root_dir: PathBuf,
    output: BuildOutput,
}

impl<S: ProjectSupplier, M: BuildMonitor> fmt::Debug for BuildLoop<S, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildLoop")
            .field("root_dir", &self.root_dir)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<S, M> BuildLoop<S, M>
where
    S: ProjectSupplier + 'static,
    M: BuildMonitor + 'static,
{
    pub fn new(
        supplier: S,
        monitor: M,
        root_dir: impl Into<PathBuf>,
        options: LoopOptions,
        output: BuildOutput,
    ) -> Self {
        Self {
            supplier,
            monitor,
            options,
            root_dir: root_dir.into(),
            output,
        }
    }

    /// Spawn the loop on the current runtime.
    pub fn start(self) -> BuildLoopHandle {
        let (state_tx, state_rx) = watch::channel(LoopState::Starting);
        let shared = Arc::new(Shared {
            stop_requested: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            cycle: AtomicU64::new(0),
            wake: Notify::new(),
            state: state_tx,
        });

        let task = tokio::spawn(self.run(Arc::clone(&shared)));
        BuildLoopHandle {
            shared,
            state_rx,
            task: Mutex::new(Some(task)),
        }
    }

    /// Run the loop to completion on the current task.
    async fn run(mut self, shared: Arc<Shared>) -> Result<()> {
        let mut core = LoopCore::new(self.options.initial_clean, self.options.max_cycles);
        info!(root = ?self.root_dir, "build loop started");
        self.monitor.on_started();

        let result = self.cycles(&mut core, &shared).await;
        match &result {
            Ok(()) => core.stopped(),
            Err(e) => {
                warn!(error = %e, "build loop failed");
                core.failed();
            }
        }

        let stopped = self.monitor.on_stopped().await;
        if let Err(e) = &stopped {
            warn!(error = %e, "monitor failed while stopping");
            core.failed();
        }

        shared.stopped.store(true, Ordering::SeqCst);
        shared.set_state(core.state());
        info!(state = %core.state(), cycles = core.cycle(), "build loop exited");
        result.and(stopped)
    }

    async fn cycles(&mut self, core: &mut LoopCore, shared: &Shared) -> Result<()> {
        let mut project: Option<Project> = None;

        while !shared.stop_requested() {
            let cycle = core.begin_cycle();
            shared.cycle.store(cycle, Ordering::SeqCst);
            shared.set_state(core.state());
            self.monitor.on_cycle_start(cycle);

            let observation = observe(project.as_ref());
            let plan = core.plan(observation);
            shared.set_state(core.state());
            debug!(cycle, change = %plan.change, plan = ?plan.plan, "planned cycle");
            if plan.change != ChangeType::None {
                self.monitor.on_changed(cycle, plan.change);
            }

            let started_as = plan.plan.build_type();
            self.monitor.on_build_start(cycle, started_as).await?;

            // Edits made while a full build runs must still wake the wait
            // that follows a failure.
            let build_started = SystemTime::now();
            match self.build(plan.plan, &mut project).await {
                Ok(build_type) => {
                    info!(cycle, %build_type, "build succeeded");
                    core.build_succeeded();
                    shared.set_state(core.state());
                    self.monitor.on_build_success(cycle, build_type);
                }
                Err(e) => {
                    warn!(cycle, build_type = %started_as, error = %e, "build failed");
                    core.build_failed();
                    if plan.plan.is_full() {
                        project = None;
                    }
                    self.monitor.on_build_fail(cycle, started_as, &e).await?;
                }
            }

            let mut delay = self.options.poll_interval;
            if core.state() == LoopState::Ready {
                let Some(ready) = project.as_ref() else {
                    return Err(anyhow!("build succeeded without a project").into());
                };
                delay = self.monitor.on_ready(cycle, ready).await?;
                core.ready_done();
            }
            shared.set_state(core.state());

            let action = self.monitor.on_cycle_end(cycle).await?;
            match core.cycle_ended(action) {
                AfterCycle::Stop => {
                    debug!(cycle, ?action, "stopping after cycle");
                    break;
                }
                AfterCycle::Sleep => {
                    shared.sleep(delay).await;
                }
                AfterCycle::WaitForChange => {
                    shared.set_state(core.state());
                    let target = match project.as_ref() {
                        Some(project) => WaitTarget::Project(project),
                        None => WaitTarget::Tree {
                            since: build_started,
                            ignored: self.supplier.output_dirs(),
                        },
                    };
                    wait_for_change(&self.root_dir, &self.options, target, shared).await?;
                }
            }
        }
        Ok(())
    }

    async fn build(&mut self, plan: BuildPlan, project: &mut Option<Project>) -> Result<BuildType> {
        match plan {
            BuildPlan::Setup { clean } => {
                let (fresh, build_type) = self.supplier.new_project(clean, true, &self.output).await?;
                *project = Some(fresh);
                Ok(build_type)
            }
            BuildPlan::Full => {
                *project = None;
                let (fresh, build_type) = self.supplier.new_project(false, false, &self.output).await?;
                *project = Some(fresh);
                Ok(build_type)
            }
            BuildPlan::Incremental => {
                let Some(project) = project.as_mut() else {
                    return Err(anyhow!("incremental build without a project").into());
                };
                let changes = project.commit_source_changes()?;
                project.incremental_build(&changes, &self.output).await?;
                Ok(BuildType::Incremental)
            }
            BuildPlan::Skip => Ok(BuildType::Skipped),
        }
    }
}

/// What [`wait_for_change`] polls.
enum WaitTarget<'a> {
    /// Descriptors and source roots of a built project.
    Project(&'a Project),
    /// Any file under the root newer than `since`, outside `ignored`.
    Tree { since: SystemTime, ignored: Vec<PathBuf> },
}

/// Poll until something changes or a stop is requested.
///
/// Hidden directories and excluded globs never count as a change.
async fn wait_for_change(
    root_dir: &Path,
    options: &LoopOptions,
    target: WaitTarget<'_>,
    shared: &Shared,
) -> Result<()> {
    let poll = options.poll_interval;
    match target {
        WaitTarget::Project(project) => {
            debug!(project = %project.name(), "waiting for a project change");
            while shared.sleep(poll).await {
                let observation = observe(Some(project));
                if observation.build_files_changed || observation.sources_changed {
                    debug!(?observation, "change detected");
                    return Ok(());
                }
            }
        }
        WaitTarget::Tree { since, ignored } => {
            let index = ExcludeSet::new(root_dir, &options.exclude)?
                .with_dirs(ignored)
                .index();
            debug!(root = ?root_dir, "waiting for any change under the project root");
            loop {
                if let Some(time) = index.changed_since(Some(since), TieBreak::First)? {
                    debug!(?time, "change detected");
                    return Ok(());
                }
                if !shared.sleep(poll).await {
                    break;
                }
            }
        }
    }
    Ok(())
}

/// What changed in `project` since its last commit. Scan errors count as a
/// build file change so the next cycle rebuilds from scratch.
fn observe(project: Option<&Project>) -> Observation {
    let Some(project) = project else {
        return Observation::default();
    };
    if project.have_build_files_changed() {
        return Observation {
            build_files_changed: true,
            sources_changed: false,
        };
    }
    match project.source_changes() {
        Ok(changes) => Observation {
            build_files_changed: false,
            sources_changed: !changes.is_empty(),
        },
        Err(e) => {
            warn!(error = %e, "failed to scan sources; forcing a full build");
            Observation {
                build_files_changed: true,
                sources_changed: false,
            }
        }
    }
}

/// Control handle for a running [`BuildLoop`].
#[derive(Debug)]
pub struct BuildLoopHandle {
    shared: Arc<Shared>,
    state_rx: watch::Receiver<LoopState>,
    task: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl BuildLoopHandle {
    /// Ask the loop to stop after the current step. Interrupts sleeps and waits.
    pub fn request_stop(&self) {
        if !self.shared.stop_requested.swap(true, Ordering::SeqCst) {
            info!("stop requested");
        }
        self.shared.wake.notify_one();
    }

    /// Request a stop and wait up to `timeout` for it. Safe to call repeatedly.
    pub async fn stop(&self, timeout: Duration) -> Result<()> {
        self.request_stop();
        self.wait_for_stopped(timeout).await
    }

    /// Wait up to `timeout` for the loop to finish.
    ///
    /// Returns the loop's own error to the first caller that observes the
    /// exit; later calls return `Ok`. Fails with
    /// [`DevLoopError::StopTimeout`] when the loop is still running.
    pub async fn wait_for_stopped(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut guard = match tokio::time::timeout_at(deadline, self.task.lock()).await {
            Ok(guard) => guard,
            Err(_) => return Err(DevLoopError::StopTimeout(timeout)),
        };
        let Some(task) = guard.as_mut() else {
            return Ok(());
        };
        match tokio::time::timeout_at(deadline, task).await {
            Err(_) => Err(DevLoopError::StopTimeout(timeout)),
            Ok(joined) => {
                *guard = None;
                joined.map_err(|e| anyhow!("build loop task panicked or was cancelled: {}", e))?
            }
        }
    }

    /// Wait for the loop to finish, however long it takes.
    pub async fn wait(&self) -> Result<()> {
        let mut guard = self.task.lock().await;
        let Some(task) = guard.take() else {
            return Ok(());
        };
        task.await
            .map_err(|e| anyhow!("build loop task panicked or was cancelled: {}", e))?
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
    }

    pub fn cycle(&self) -> u64 {
        self.shared.cycle.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> LoopState {
        *self.state_rx.borrow()
    }

    /// Receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<LoopState> {
        self.state_rx.clone()
    }
}
