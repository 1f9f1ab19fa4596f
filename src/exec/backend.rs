// src/exec/backend.rs

//! Pluggable full-build backend.
//!
//! The project supplier talks to a `BuildExecutor` instead of spawning the
//! build tool itself. Production uses [`ForkedBuildExecutor`]; tests provide
//! their own implementation that writes outputs directly.
//!
//! [`ForkedBuildExecutor`]: crate::exec::ForkedBuildExecutor

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use crate::errors::Result;
use crate::output::BuildOutput;

pub trait BuildExecutor: Send + Sync {
    /// Run a full build of the project rooted at `project_dir`, cleaning
    /// first when `clean` is set. Output lines go to `output`.
    fn execute<'a>(
        &'a self,
        clean: bool,
        project_dir: &'a Path,
        output: &'a BuildOutput,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}
