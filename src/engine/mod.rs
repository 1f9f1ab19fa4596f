// src/engine/mod.rs

//! Orchestration engine for devloop.
//!
//! - [`core`]: the pure state machine deciding what each cycle builds.
//! - [`build_loop`]: the async shell performing scans, builds and waits.
//! - [`monitor`]: the callback trait the loop reports to.
//! - [`policy`]: consecutive-failure budgets.
//! - [`dev_monitor`]: the monitor that supervises the built application.

pub mod build_loop;
pub mod core;
pub mod dev_monitor;
pub mod monitor;
pub mod policy;

pub use build_loop::{BuildLoop, BuildLoopHandle, LoopOptions};
pub use core::{AfterCycle, BuildPlan, CyclePlan, LoopCore, LoopState, Observation};
pub use dev_monitor::DevLoopMonitor;
pub use monitor::{BuildMonitor, MonitorFuture};
pub use policy::{FailureKind, FailurePolicy, Verdict};
