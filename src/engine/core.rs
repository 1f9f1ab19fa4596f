// src/engine/core.rs

//! Pure core of the build loop.
//!
//! [`LoopCore`] decides what each cycle builds and what happens after it,
//! from observations handed in by the async shell
//! ([`BuildLoop`](crate::engine::BuildLoop)). It performs no IO and owns no
//! project, so every transition can be unit tested directly.

use std::fmt;

use crate::types::{BuildType, ChangeType, NextAction};

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopState {
    Starting,
    DetectChange,
    Build,
    Ready,
    CycleEnd,
    Waiting,
    Stopped,
    Failed,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoopState::Starting => "starting",
            LoopState::DetectChange => "detect-change",
            LoopState::Build => "build",
            LoopState::Ready => "ready",
            LoopState::CycleEnd => "cycle-end",
            LoopState::Waiting => "waiting",
            LoopState::Stopped => "stopped",
            LoopState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What the shell saw on disk at the start of a cycle. Only meaningful when
/// a project exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Observation {
    pub build_files_changed: bool,
    pub sources_changed: bool,
}

/// The build a cycle performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPlan {
    /// First build of the session; may be skipped when up to date.
    Setup { clean: bool },
    /// Full rebuild that replaces the project.
    Full,
    /// Incremental build of the committed source changes.
    Incremental,
    /// Nothing to build.
    Skip,
}

impl BuildPlan {
    /// Build type reported when the build starts. A full build reports the
    /// type actually performed on success.
    pub fn build_type(self) -> BuildType {
        match self {
            BuildPlan::Setup { clean: true } => BuildType::CleanComplete,
            BuildPlan::Setup { clean: false } | BuildPlan::Full => BuildType::Complete,
            BuildPlan::Incremental => BuildType::Incremental,
            BuildPlan::Skip => BuildType::Skipped,
        }
    }

    pub fn is_full(self) -> bool {
        matches!(self, BuildPlan::Setup { .. } | BuildPlan::Full)
    }
}

/// Decision for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CyclePlan {
    pub cycle: u64,
    pub change: ChangeType,
    pub plan: BuildPlan,
}

/// What the shell does once a cycle has ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterCycle {
    /// Sleep for the delay returned by `on_ready`, then start the next cycle.
    Sleep,
    /// Poll until something changes, then start the next cycle.
    WaitForChange,
    Stop,
}

#[derive(Debug, Clone)]
pub struct LoopCore {
    state: LoopState,
    cycle: u64,
    initial_clean: bool,
    max_cycles: Option<u64>,
    has_project: bool,
    setup_attempted: bool,
    current: Option<CyclePlan>,
}

impl LoopCore {
    pub fn new(initial_clean: bool, max_cycles: Option<u64>) -> Self {
        Self {
            state: LoopState::Starting,
            cycle: 0,
            initial_clean,
            max_cycles,
            has_project: false,
            setup_attempted: false,
            current: None,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Number of the current (or last) cycle; zero before the first.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn has_project(&self) -> bool {
        self.has_project
    }

    pub fn current(&self) -> Option<CyclePlan> {
        self.current
    }

    /// Start a new cycle and return its number.
    pub fn begin_cycle(&mut self) -> u64 {
        self.cycle += 1;
        self.state = LoopState::DetectChange;
        self.current = None;
        self.cycle
    }

    /// Decide what this cycle builds.
    pub fn plan(&mut self, observation: Observation) -> CyclePlan {
        let (change, plan) = if !self.has_project {
            if self.setup_attempted {
                (ChangeType::BuildFile, BuildPlan::Full)
            } else {
                self.setup_attempted = true;
                (
                    ChangeType::None,
                    BuildPlan::Setup {
                        clean: self.initial_clean,
                    },
                )
            }
        } else if observation.build_files_changed {
            (ChangeType::BuildFile, BuildPlan::Full)
        } else if observation.sources_changed {
            (ChangeType::SourceFile, BuildPlan::Incremental)
        } else {
            (ChangeType::None, BuildPlan::Skip)
        };

        let decided = CyclePlan {
            cycle: self.cycle,
            change,
            plan,
        };
        self.state = LoopState::Build;
        self.current = Some(decided);
        decided
    }

    /// Record a successful (or skipped) build. The shell calls `on_ready` next.
    pub fn build_succeeded(&mut self) {
        if self.current.is_some_and(|c| c.plan.is_full()) {
            self.has_project = true;
        }
        self.state = LoopState::Ready;
    }

    /// Record a failed build. A failed full build drops the project.
    pub fn build_failed(&mut self) {
        if self.current.is_some_and(|c| c.plan.is_full()) {
            self.has_project = false;
        }
        self.state = LoopState::CycleEnd;
    }

    /// `on_ready` has returned.
    pub fn ready_done(&mut self) {
        self.state = LoopState::CycleEnd;
    }

    /// Translate the monitor's decision into the shell's next move.
    pub fn cycle_ended(&mut self, action: NextAction) -> AfterCycle {
        let reached_max = self.max_cycles.is_some_and(|max| self.cycle >= max);
        let after = match action {
            NextAction::Exit => AfterCycle::Stop,
            _ if reached_max => AfterCycle::Stop,
            NextAction::Continue => AfterCycle::Sleep,
            NextAction::WaitForChange => AfterCycle::WaitForChange,
        };
        if after == AfterCycle::WaitForChange {
            self.state = LoopState::Waiting;
        }
        after
    }

    pub fn stopped(&mut self) {
        self.state = LoopState::Stopped;
    }

    pub fn failed(&mut self) {
        self.state = LoopState::Failed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changed(build_files: bool, sources: bool) -> Observation {
        Observation {
            build_files_changed: build_files,
            sources_changed: sources,
        }
    }

    #[test]
    fn first_cycle_is_setup_with_configured_clean() {
        let mut core = LoopCore::new(true, None);
        assert_eq!(core.state(), LoopState::Starting);
        assert_eq!(core.begin_cycle(), 1);

        let plan = core.plan(Observation::default());
        assert_eq!(plan.plan, BuildPlan::Setup { clean: true });
        assert_eq!(plan.change, ChangeType::None);
        assert_eq!(plan.plan.build_type(), BuildType::CleanComplete);
        assert_eq!(core.state(), LoopState::Build);
    }

    #[test]
    fn project_cycles_prefer_build_files_over_sources() {
        let mut core = LoopCore::new(false, None);
        core.begin_cycle();
        core.plan(Observation::default());
        core.build_succeeded();
        assert!(core.has_project());

        core.begin_cycle();
        let p = core.plan(changed(true, true));
        assert_eq!((p.change, p.plan), (ChangeType::BuildFile, BuildPlan::Full));
        core.build_succeeded();

        core.begin_cycle();
        let p = core.plan(changed(false, true));
        assert_eq!((p.change, p.plan), (ChangeType::SourceFile, BuildPlan::Incremental));
        core.build_succeeded();

        core.begin_cycle();
        let p = core.plan(changed(false, false));
        assert_eq!((p.change, p.plan), (ChangeType::None, BuildPlan::Skip));
        assert_eq!(p.plan.build_type(), BuildType::Skipped);
    }

    #[test]
    fn failed_full_build_drops_project_and_next_cycle_rebuilds() {
        let mut core = LoopCore::new(false, None);
        core.begin_cycle();
        core.plan(Observation::default());
        core.build_failed();
        assert!(!core.has_project());
        assert_eq!(core.state(), LoopState::CycleEnd);

        core.begin_cycle();
        let p = core.plan(changed(false, true));
        assert_eq!((p.change, p.plan), (ChangeType::BuildFile, BuildPlan::Full));
    }

    #[test]
    fn failed_incremental_keeps_project() {
        let mut core = LoopCore::new(false, None);
        core.begin_cycle();
        core.plan(Observation::default());
        core.build_succeeded();

        core.begin_cycle();
        core.plan(changed(false, true));
        core.build_failed();
        assert!(core.has_project());
    }

    #[test]
    fn cycle_end_honours_action_and_max_cycles() {
        let mut core = LoopCore::new(false, Some(2));
        core.begin_cycle();
        assert_eq!(core.cycle_ended(NextAction::Continue), AfterCycle::Sleep);
        assert_eq!(core.cycle_ended(NextAction::WaitForChange), AfterCycle::WaitForChange);
        assert_eq!(core.state(), LoopState::Waiting);
        assert_eq!(core.cycle_ended(NextAction::Exit), AfterCycle::Stop);

        core.begin_cycle();
        assert_eq!(core.cycle_ended(NextAction::Continue), AfterCycle::Stop);
    }
}
