use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use devloop::engine::{BuildMonitor, MonitorFuture};
use devloop::errors::DevLoopError;
use devloop::project::Project;
use devloop::types::{BuildType, ChangeType, NextAction};

/// One monitor callback as seen by [`RecordingMonitor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    Started,
    CycleStart(u64),
    Changed(u64, ChangeType),
    BuildStart(u64, BuildType),
    BuildSuccess(u64, BuildType),
    BuildFail(u64, BuildType, String),
    Ready(u64),
    CycleEnd(u64, NextAction),
    Stopped,
}

/// Shared, clonable record of monitor events.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<MonitorEvent>>>,
}

impl EventLog {
    fn push(&self, event: MonitorEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub fn snapshot(&self) -> Vec<MonitorEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn contains(&self, event: &MonitorEvent) -> bool {
        self.events.lock().unwrap().contains(event)
    }

    pub fn count<P>(&self, pred: P) -> usize
    where
        P: Fn(&MonitorEvent) -> bool,
    {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }

    /// Build types of successful builds, in order.
    pub fn successes(&self) -> Vec<BuildType> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                MonitorEvent::BuildSuccess(_, t) => Some(*t),
                _ => None,
            })
            .collect()
    }

    /// Poll until some recorded event matches `pred`. Returns false on timeout.
    pub async fn wait_for<P>(&self, pred: P, timeout: Duration) -> bool
    where
        P: Fn(&MonitorEvent) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.events.lock().unwrap().iter().any(&pred) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// A monitor that records every callback and steers the loop with a fixed
/// [`NextAction`].
#[derive(Debug)]
pub struct RecordingMonitor {
    log: EventLog,
    action: NextAction,
    ready_delay: Duration,
    build_start_delay: Duration,
    fail_build_start_at: Option<u64>,
    fail_on_stop: bool,
}

impl RecordingMonitor {
    pub fn new() -> Self {
        Self {
            log: EventLog::default(),
            action: NextAction::WaitForChange,
            ready_delay: Duration::from_millis(10),
            build_start_delay: Duration::ZERO,
            fail_build_start_at: None,
            fail_on_stop: false,
        }
    }

    pub fn log(&self) -> EventLog {
        self.log.clone()
    }

    /// Action returned from every `on_cycle_end`.
    pub fn with_action(mut self, action: NextAction) -> Self {
        self.action = action;
        self
    }

    pub fn with_ready_delay(mut self, delay: Duration) -> Self {
        self.ready_delay = delay;
        self
    }

    /// Block inside `on_build_start` for `delay`, e.g. to outlast a stop timeout.
    pub fn with_build_start_delay(mut self, delay: Duration) -> Self {
        self.build_start_delay = delay;
        self
    }

    /// Return an error from `on_build_start` in the given cycle.
    pub fn failing_build_start(mut self, cycle: u64) -> Self {
        self.fail_build_start_at = Some(cycle);
        self
    }

    pub fn failing_stop(mut self) -> Self {
        self.fail_on_stop = true;
        self
    }
}

impl Default for RecordingMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildMonitor for RecordingMonitor {
    fn on_started(&mut self) {
        self.log.push(MonitorEvent::Started);
    }

    fn on_cycle_start(&mut self, cycle: u64) {
        self.log.push(MonitorEvent::CycleStart(cycle));
    }

    fn on_changed(&mut self, cycle: u64, change: ChangeType) {
        self.log.push(MonitorEvent::Changed(cycle, change));
    }

    fn on_build_start(&mut self, cycle: u64, build_type: BuildType) -> MonitorFuture<'_, ()> {
        Box::pin(async move {
            self.log.push(MonitorEvent::BuildStart(cycle, build_type));
            if !self.build_start_delay.is_zero() {
                tokio::time::sleep(self.build_start_delay).await;
            }
            if self.fail_build_start_at == Some(cycle) {
                return Err(DevLoopError::Other(anyhow!("monitor refused cycle {cycle}")));
            }
            Ok(())
        })
    }

    fn on_build_success(&mut self, cycle: u64, build_type: BuildType) {
        self.log.push(MonitorEvent::BuildSuccess(cycle, build_type));
    }

    fn on_build_fail<'a>(
        &'a mut self,
        cycle: u64,
        build_type: BuildType,
        error: &'a DevLoopError,
    ) -> MonitorFuture<'a, ()> {
        Box::pin(async move {
            self.log
                .push(MonitorEvent::BuildFail(cycle, build_type, error.to_string()));
            Ok(())
        })
    }

    fn on_ready<'a>(&'a mut self, cycle: u64, _project: &'a Project) -> MonitorFuture<'a, Duration> {
        Box::pin(async move {
            self.log.push(MonitorEvent::Ready(cycle));
            Ok(self.ready_delay)
        })
    }

    fn on_cycle_end(&mut self, cycle: u64) -> MonitorFuture<'_, NextAction> {
        Box::pin(async move {
            self.log.push(MonitorEvent::CycleEnd(cycle, self.action));
            Ok(self.action)
        })
    }

    fn on_stopped(&mut self) -> MonitorFuture<'_, ()> {
        Box::pin(async move {
            self.log.push(MonitorEvent::Stopped);
            if self.fail_on_stop {
                return Err(DevLoopError::Other(anyhow!("monitor failed to stop")));
            }
            Ok(())
        })
    }
}
