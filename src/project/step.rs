// src/project/step.rs

//! Build steps: the unit of work a component runs over its changes.
//!
//! Steps are a closed set, so they are an enum rather than trait objects.
//! Each variant declares which root types it reads and writes; a
//! [`BuildComponent`](crate::project::BuildComponent) refuses roots that do
//! not match.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, warn};

use crate::errors::{DevLoopError, Result};
use crate::output::BuildOutput;
use crate::project::compiler::{CompileRequest, DiagnosticKind, JavaCompiler};
use crate::project::{BuildRoot, Changes};
use crate::types::BuildRootType;

/// What a step needs from its component and project.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub source_root: &'a BuildRoot,
    pub output_dir: &'a Path,
    pub classpath: &'a [PathBuf],
    pub compiler_flags: &'a [String],
    pub output: &'a BuildOutput,
}

#[derive(Clone)]
pub enum BuildStep {
    CompileSources(CompileSources),
    CopyResources(CopyResources),
}

impl fmt::Debug for BuildStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl BuildStep {
    pub fn compile(compiler: Arc<dyn JavaCompiler>) -> Self {
        BuildStep::CompileSources(CompileSources { compiler })
    }

    pub fn copy_resources() -> Self {
        BuildStep::CopyResources(CopyResources)
    }

    pub fn name(&self) -> &'static str {
        match self {
            BuildStep::CompileSources(_) => "compile-sources",
            BuildStep::CopyResources(_) => "copy-resources",
        }
    }

    /// Root type this step consumes.
    pub fn input_type(&self) -> BuildRootType {
        match self {
            BuildStep::CompileSources(_) => BuildRootType::JavaSources,
            BuildStep::CopyResources(_) => BuildRootType::Resources,
        }
    }

    /// Root type this step produces.
    pub fn output_type(&self) -> BuildRootType {
        match self {
            BuildStep::CompileSources(_) => BuildRootType::JavaClasses,
            BuildStep::CopyResources(_) => BuildRootType::Resources,
        }
    }

    /// Process one root's changes. Returns the number of files processed.
    pub async fn incremental_build(&self, changes: &Changes, ctx: &StepContext<'_>) -> Result<usize> {
        match self {
            BuildStep::CompileSources(step) => step.incremental_build(changes, ctx).await,
            BuildStep::CopyResources(step) => step.incremental_build(changes, ctx),
        }
    }

    /// Process every file of the source root.
    pub async fn full_build(&self, ctx: &StepContext<'_>) -> Result<usize> {
        match self {
            BuildStep::CompileSources(step) => {
                let sources = current_files(ctx)?;
                step.compile(sources, ctx).await
            }
            BuildStep::CopyResources(step) => {
                let files = current_files(ctx)?;
                step.copy(&files, ctx)
            }
        }
    }
}

/// Compiles Java sources through a [`JavaCompiler`].
#[derive(Clone)]
pub struct CompileSources {
    compiler: Arc<dyn JavaCompiler>,
}

impl CompileSources {
    async fn incremental_build(&self, changes: &Changes, ctx: &StepContext<'_>) -> Result<usize> {
        if !changes.removed().is_empty() {
            for removed in changes.removed() {
                delete_class_files(removed, ctx)?;
            }
            // A removed type can break any other source; rebuild them all.
            let sources = current_files(ctx)?;
            debug!(
                removed = changes.removed().len(),
                sources = sources.len(),
                "source removed; recompiling entire source root"
            );
            return self.compile(sources, ctx).await;
        }

        let sources: Vec<PathBuf> = changes.added_or_modified().cloned().collect();
        self.compile(sources, ctx).await
    }

    async fn compile(&self, mut sources: Vec<PathBuf>, ctx: &StepContext<'_>) -> Result<usize> {
        if sources.is_empty() {
            return Ok(0);
        }
        sources.sort();
        sources.dedup();

        fs::create_dir_all(ctx.output_dir)
            .with_context(|| format!("creating output dir {:?}", ctx.output_dir))?;

        let count = sources.len();
        ctx.output.out(&format!(
            "Compiling {} source file{} to {}",
            count,
            if count == 1 { "" } else { "s" },
            ctx.output_dir.display()
        ));

        let request = CompileRequest {
            sources,
            classpath: ctx.classpath.to_vec(),
            flags: ctx.compiler_flags.to_vec(),
            output_dir: ctx.output_dir.to_path_buf(),
        };
        let outcome = self.compiler.compile(request).await?;

        for diagnostic in &outcome.diagnostics {
            match diagnostic.kind {
                DiagnosticKind::Error | DiagnosticKind::Warning => ctx.output.err(&diagnostic.to_string()),
                DiagnosticKind::Note => ctx.output.out(&diagnostic.to_string()),
            }
        }

        if !outcome.success {
            return Err(DevLoopError::CompilationFailed {
                errors: outcome.error_count().max(1),
            });
        }
        Ok(count)
    }
}

/// Mirrors resource files into the output directory.
#[derive(Debug, Clone, Copy)]
pub struct CopyResources;

impl CopyResources {
    fn incremental_build(&self, changes: &Changes, ctx: &StepContext<'_>) -> Result<usize> {
        for removed in changes.removed() {
            if let Some(target) = mirror_path(removed, ctx) {
                if crate::fs::remove_file_if_exists(&target)? {
                    debug!(target = ?target, "removed resource");
                }
            }
        }
        let files: Vec<PathBuf> = changes.added_or_modified().cloned().collect();
        let copied = self.copy(&files, ctx)?;
        Ok(copied + changes.removed().len())
    }

    fn copy(&self, files: &[PathBuf], ctx: &StepContext<'_>) -> Result<usize> {
        if files.is_empty() {
            return Ok(0);
        }
        ctx.output.out(&format!(
            "Copying {} resource{} to {}",
            files.len(),
            if files.len() == 1 { "" } else { "s" },
            ctx.output_dir.display()
        ));

        let mut copied = 0;
        for file in files {
            if let Some(target) = mirror_path(file, ctx) {
                crate::fs::copy_file(file, &target)?;
                copied += 1;
            }
        }
        Ok(copied)
    }
}

/// Fresh scan of the source root, not the (possibly stale) snapshot.
fn current_files(ctx: &StepContext<'_>) -> Result<Vec<PathBuf>> {
    Ok(ctx
        .source_root
        .index()
        .entries()?
        .into_iter()
        .map(|(path, _)| path)
        .collect())
}

/// Path under the output dir mirroring `source` under the source root.
fn mirror_path(source: &Path, ctx: &StepContext<'_>) -> Option<PathBuf> {
    match source.strip_prefix(ctx.source_root.path()) {
        Ok(rel) => Some(ctx.output_dir.join(rel)),
        Err(_) => {
            warn!(
                file = ?source,
                root = ?ctx.source_root.path(),
                "file is outside its source root; skipping"
            );
            None
        }
    }
}

/// Delete `Name.class` and nested `Name$*.class` for a removed `Name.java`.
fn delete_class_files(source: &Path, ctx: &StepContext<'_>) -> Result<()> {
    let Some(mirror) = mirror_path(source, ctx) else {
        return Ok(());
    };
    let Some(stem) = mirror.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
        return Ok(());
    };
    let Some(dir) = mirror.parent() else {
        return Ok(());
    };

    crate::fs::remove_file_if_exists(&dir.join(format!("{stem}.class")))?;

    if dir.is_dir() {
        let nested_prefix = format!("{stem}$");
        for entry in fs::read_dir(dir).with_context(|| format!("reading dir {:?}", dir))? {
            let path = entry?.path();
            let is_nested = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&nested_prefix) && n.ends_with(".class"));
            if is_nested {
                crate::fs::remove_file_if_exists(&path)?;
            }
        }
    }
    debug!(source = ?source, "deleted class files of removed source");
    Ok(())
}
