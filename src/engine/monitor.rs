// src/engine/monitor.rs

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::errors::{DevLoopError, Result};
use crate::project::Project;
use crate::types::{BuildType, ChangeType, NextAction};

/// Boxed future returned by the asynchronous monitor callbacks.
pub type MonitorFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Callbacks the build loop invokes as it moves through a cycle.
///
/// Synchronous callbacks only observe. The asynchronous ones may act (stop
/// or start the application) and steer the loop through their return
/// values. An `Err` from any of them fails the loop; `on_stopped` still runs.
pub trait BuildMonitor: Send {
    fn on_started(&mut self) {}

    fn on_cycle_start(&mut self, cycle: u64) {
        let _ = cycle;
    }

    /// A change other than [`ChangeType::None`] was detected.
    fn on_changed(&mut self, cycle: u64, change: ChangeType) {
        let _ = (cycle, change);
    }

    /// Called before every build, including skipped ones.
    fn on_build_start(&mut self, cycle: u64, build_type: BuildType) -> MonitorFuture<'_, ()>;

    fn on_build_success(&mut self, cycle: u64, build_type: BuildType) {
        let _ = (cycle, build_type);
    }

    fn on_build_fail<'a>(
        &'a mut self,
        cycle: u64,
        build_type: BuildType,
        error: &'a DevLoopError,
    ) -> MonitorFuture<'a, ()>;

    /// The project is built. Returns the delay to sleep if the cycle ends
    /// with [`NextAction::Continue`].
    fn on_ready<'a>(&'a mut self, cycle: u64, project: &'a Project) -> MonitorFuture<'a, Duration>;

    fn on_cycle_end(&mut self, cycle: u64) -> MonitorFuture<'_, NextAction>;

    fn on_stopped(&mut self) -> MonitorFuture<'_, ()>;
}
