// src/project/component.rs

use tracing::debug;

use crate::errors::{DevLoopError, Result};
use crate::output::BuildOutput;
use crate::project::step::{BuildStep, StepContext};
use crate::project::{BuildRoot, Changes};

/// One source root, one output root, and the step that turns the first into
/// the second.
#[derive(Debug, Clone)]
pub struct BuildComponent {
    source_root: BuildRoot,
    output_root: BuildRoot,
    step: BuildStep,
}

impl BuildComponent {
    /// Fails if the roots' types don't match what `step` reads and writes.
    pub fn new(source_root: BuildRoot, output_root: BuildRoot, step: BuildStep) -> Result<Self> {
        if source_root.root_type() != step.input_type() {
            return Err(DevLoopError::ConfigError(format!(
                "{} expects a {} source root, got {} at {:?}",
                step.name(),
                step.input_type(),
                source_root.root_type(),
                source_root.path()
            )));
        }
        if output_root.root_type() != step.output_type() {
            return Err(DevLoopError::ConfigError(format!(
                "{} expects a {} output root, got {} at {:?}",
                step.name(),
                step.output_type(),
                output_root.root_type(),
                output_root.path()
            )));
        }
        Ok(Self {
            source_root,
            output_root,
            step,
        })
    }

    pub fn source_root(&self) -> &BuildRoot {
        &self.source_root
    }

    pub fn output_root(&self) -> &BuildRoot {
        &self.output_root
    }

    pub fn step(&self) -> &BuildStep {
        &self.step
    }

    /// Uncommitted changes of the source root.
    pub fn changes(&self) -> Result<Changes> {
        self.source_root.changes()
    }

    /// Commit the source root snapshot.
    pub fn update_source(&mut self) -> Result<Changes> {
        self.source_root.update()
    }

    /// Commit the output root snapshot.
    pub fn update_output(&mut self) -> Result<Changes> {
        self.output_root.update()
    }

    /// Run the step over `changes`; a no-op when there are none.
    pub async fn incremental_build(
        &self,
        changes: &Changes,
        classpath: &[std::path::PathBuf],
        compiler_flags: &[String],
        output: &BuildOutput,
    ) -> Result<usize> {
        if changes.is_empty() {
            return Ok(0);
        }
        debug!(
            step = self.step.name(),
            root = ?self.source_root.path(),
            changes = changes.len(),
            "incremental build of component"
        );
        let ctx = StepContext {
            source_root: &self.source_root,
            output_dir: self.output_root.path(),
            classpath,
            compiler_flags,
            output,
        };
        self.step.incremental_build(changes, &ctx).await
    }

    /// Run the step over every file of the source root.
    pub async fn full_build(
        &self,
        classpath: &[std::path::PathBuf],
        compiler_flags: &[String],
        output: &BuildOutput,
    ) -> Result<usize> {
        let ctx = StepContext {
            source_root: &self.source_root,
            output_dir: self.output_root.path(),
            classpath,
            compiler_flags,
            output,
        };
        self.step.full_build(&ctx).await
    }
}
