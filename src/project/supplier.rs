// src/project/supplier.rs

//! Full builds and the [`Project`] derived from them.
//!
//! The loop asks a [`ProjectSupplier`] for a fresh project on startup and
//! whenever a build descriptor changes. The production supplier,
//! [`LayoutProjectSupplier`], reads the project layout from `Devloop.toml`
//! (re-reading it on every call, since the file is itself a descriptor) and
//! performs the full build either in-process or through a
//! [`BuildExecutor`].

use std::fmt;
use std::fs;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::config::{ComponentKind, ConfigFile, load_and_validate};
use crate::errors::Result;
use crate::exec::{BuildExecutor, ForkedBuildExecutor};
use crate::output::BuildOutput;
use crate::project::compiler::{JavaCompiler, JavacCompiler};
use crate::project::{BuildComponent, BuildRoot, BuildStep, Project};
use crate::types::{BuildRootType, BuildType};

pub trait ProjectSupplier: Send {
    /// Produce a project after a full build.
    ///
    /// With `allow_skip`, an up-to-date project that has built successfully
    /// before is returned without building, as [`BuildType::Skipped`].
    fn new_project<'a>(
        &'a mut self,
        clean: bool,
        allow_skip: bool,
        output: &'a BuildOutput,
    ) -> Pin<Box<dyn Future<Output = Result<(Project, BuildType)>> + Send + 'a>>;

    /// Directories the full build writes to. Ignored while waiting for a
    /// change after a failed build.
    fn output_dirs(&self) -> Vec<PathBuf> {
        Vec::new()
    }
}

/// Supplies projects described by a [`ConfigFile`].
pub struct LayoutProjectSupplier {
    config: ConfigFile,
    reload_from: Option<PathBuf>,
    compiler: Arc<dyn JavaCompiler>,
    compiler_overridden: bool,
    executor: Option<Arc<dyn BuildExecutor>>,
    executor_overridden: bool,
}

impl fmt::Debug for LayoutProjectSupplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayoutProjectSupplier")
            .field("project", &self.config.project.name)
            .field("root_dir", &self.config.root_dir)
            .field("reload_from", &self.reload_from)
            .field("forked", &self.executor.is_some())
            .finish_non_exhaustive()
    }
}

impl LayoutProjectSupplier {
    pub fn new(config: ConfigFile) -> Self {
        let compiler = default_compiler(&config);
        let executor = default_executor(&config);
        Self {
            config,
            reload_from: None,
            compiler,
            compiler_overridden: false,
            executor,
            executor_overridden: false,
        }
    }

    /// Load `path` now and re-read it before every build.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let config = load_and_validate(&path)?;
        let mut supplier = Self::new(config);
        supplier.reload_from = Some(path);
        Ok(supplier)
    }

    pub fn with_compiler(mut self, compiler: Arc<dyn JavaCompiler>) -> Self {
        self.compiler = compiler;
        self.compiler_overridden = true;
        self
    }

    /// Use `executor` for full builds instead of the configured command.
    pub fn with_executor(mut self, executor: Arc<dyn BuildExecutor>) -> Self {
        self.executor = Some(executor);
        self.executor_overridden = true;
        self
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Re-read the config (when loaded from a file) and derive the project
    /// without building it.
    pub fn load_project(&mut self) -> Result<Project> {
        self.reload()?;
        self.create_project()
    }

    fn reload(&mut self) -> Result<()> {
        let Some(path) = &self.reload_from else {
            return Ok(());
        };
        self.config = load_and_validate(path)?;
        if !self.compiler_overridden {
            self.compiler = default_compiler(&self.config);
        }
        if !self.executor_overridden {
            self.executor = default_executor(&self.config);
        }
        debug!(path = ?path, "reloaded project layout");
        Ok(())
    }

    fn create_project(&self) -> Result<Project> {
        let cfg = &self.config;
        for dir in cfg.output_dirs() {
            fs::create_dir_all(&dir).with_context(|| format!("creating output dir {:?}", dir))?;
        }

        let mut builder = Project::builder(&cfg.project.name, &cfg.root_dir)
            .main_class(&cfg.project.main_class);
        for path in cfg.build_file_paths() {
            builder = builder.build_file(path);
        }
        for path in cfg.dependency_paths() {
            builder = builder.dependency(path);
        }
        for flag in &cfg.project.compiler_flags {
            builder = builder.compiler_flag(flag);
        }
        for arg in &cfg.project.jvm_args {
            builder = builder.jvm_arg(arg);
        }
        for arg in &cfg.project.app_args {
            builder = builder.app_arg(arg);
        }

        for component in &cfg.components {
            let (source_type, output_type, step) = match component.kind {
                ComponentKind::Compile => (
                    BuildRootType::JavaSources,
                    BuildRootType::JavaClasses,
                    BuildStep::compile(Arc::clone(&self.compiler)),
                ),
                ComponentKind::Copy => (
                    BuildRootType::Resources,
                    BuildRootType::Resources,
                    BuildStep::copy_resources(),
                ),
            };
            let source = BuildRoot::create(source_type, cfg.resolve(&component.source))?;
            let output = BuildRoot::create(output_type, cfg.resolve(&component.output))?;
            builder = builder.component(BuildComponent::new(source, output, step)?);
        }

        builder.build()
    }

    async fn supply(
        &mut self,
        clean: bool,
        allow_skip: bool,
        output: &BuildOutput,
    ) -> Result<(Project, BuildType)> {
        self.reload()?;
        let mut project = self.create_project()?;

        if allow_skip && !clean && project.config().last_successful_build().is_some() {
            if project.is_build_up_to_date()? {
                info!(project = %project.name(), "project is up to date; skipping full build");
                output.out(&format!("Project {} is up to date", project.name()));
                return Ok((project, BuildType::Skipped));
            }
            debug!(project = %project.name(), "project is stale; building");
        }

        let build_type = match (self.executor.is_some(), clean) {
            (_, true) => BuildType::CleanComplete,
            (true, false) => BuildType::ForkedComplete,
            (false, false) => BuildType::Complete,
        };
        info!(project = %project.name(), %build_type, "starting full build");

        let result = match &self.executor {
            Some(executor) => {
                match executor.execute(clean, &self.config.root_dir, output).await {
                    // The build tool rewrote the outputs; rescan.
                    Ok(()) => self.create_project().map(|p| project = p),
                    Err(e) => Err(e),
                }
            }
            None => project.full_build(clean, output).await.map(|_| ()),
        };

        if let Err(e) = result {
            if let Err(clear_err) = project.config_mut().clear_success() {
                warn!(error = %clear_err, "failed to clear last success marker");
            }
            return Err(e);
        }

        project.record_build_success(build_type)?;
        info!(project = %project.name(), %build_type, "full build succeeded");
        Ok((project, build_type))
    }
}

impl ProjectSupplier for LayoutProjectSupplier {
    fn new_project<'a>(
        &'a mut self,
        clean: bool,
        allow_skip: bool,
        output: &'a BuildOutput,
    ) -> Pin<Box<dyn Future<Output = Result<(Project, BuildType)>> + Send + 'a>> {
        Box::pin(self.supply(clean, allow_skip, output))
    }

    fn output_dirs(&self) -> Vec<PathBuf> {
        self.config.output_dirs()
    }
}

fn default_compiler(config: &ConfigFile) -> Arc<dyn JavaCompiler> {
    Arc::new(JavacCompiler::new(&config.build.javac))
}

fn default_executor(config: &ConfigFile) -> Option<Arc<dyn BuildExecutor>> {
    let command = config.build.command.as_ref()?;
    let mut executor = ForkedBuildExecutor::new(command).with_clean_dirs(config.output_dirs());
    if let Some(clean_command) = &config.build.clean_command {
        executor = executor.with_clean_command(clean_command);
    }
    Some(Arc::new(executor))
}
