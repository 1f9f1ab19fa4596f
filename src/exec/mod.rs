// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`backend`] provides the `BuildExecutor` trait used for full builds;
//!   tests replace it with a fake implementation.
//! - [`forked`] runs the configured build tool through the shell.
//! - [`project_executor`] launches and supervises the built application.
//! - [`capture`] drains child pipes into sinks and capture buffers.

pub mod backend;
pub mod capture;
pub mod forked;
pub mod project_executor;

pub use backend::BuildExecutor;
pub use forked::ForkedBuildExecutor;
pub use project_executor::{CommandSpec, ProjectExecutor};
