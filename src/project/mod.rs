// src/project/mod.rs

//! The project model the build loop operates on.
//!
//! - [`build_file`] / [`build_root`]: timestamped snapshots and their diffs.
//! - [`step`] / [`component`]: what gets built from which root into which.
//! - [`compiler`]: the Java compiler collaborator.
//! - [`state`]: persisted per-project state (`.devloop/state.toml`).
//! - [`supplier`]: derives a [`Project`] after a full (or skipped) build.

pub mod build_file;
pub mod build_root;
pub mod compiler;
pub mod component;
pub mod state;
pub mod step;
pub mod supplier;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, info, warn};

use crate::errors::{DevLoopError, Result};
use crate::fs::FileTimestampIndex;
use crate::output::BuildOutput;
use crate::types::{BuildRootType, BuildType};

pub use build_file::BuildFile;
pub use build_root::{BuildRoot, Changes};
pub use component::BuildComponent;
pub use state::ProjectConfig;
pub use step::BuildStep;
pub use supplier::{LayoutProjectSupplier, ProjectSupplier};

/// A buildable project: descriptors, components, dependencies and how to
/// launch it.
#[derive(Debug)]
pub struct Project {
    name: String,
    build_type: BuildType,
    root_dir: PathBuf,
    build_files: Vec<BuildFile>,
    dependency_paths: Vec<PathBuf>,
    dependencies: Vec<BuildFile>,
    classpath: Vec<PathBuf>,
    compiler_flags: Vec<String>,
    components: Vec<BuildComponent>,
    main_class: String,
    jvm_args: Vec<String>,
    app_args: Vec<String>,
    config: ProjectConfig,
}

impl Project {
    pub fn builder(name: impl Into<String>, root_dir: impl Into<PathBuf>) -> ProjectBuilder {
        ProjectBuilder::new(name, root_dir)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// How this project instance was produced.
    pub fn build_type(&self) -> BuildType {
        self.build_type
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn build_files(&self) -> &[BuildFile] {
        &self.build_files
    }

    pub fn dependency_paths(&self) -> &[PathBuf] {
        &self.dependency_paths
    }

    /// Resolved dependency archives.
    pub fn dependencies(&self) -> &[BuildFile] {
        &self.dependencies
    }

    /// Output roots followed by dependency archives, without duplicates.
    pub fn classpath(&self) -> &[PathBuf] {
        &self.classpath
    }

    pub fn compiler_flags(&self) -> &[String] {
        &self.compiler_flags
    }

    pub fn components(&self) -> &[BuildComponent] {
        &self.components
    }

    pub fn main_class(&self) -> &str {
        &self.main_class
    }

    pub fn jvm_args(&self) -> &[String] {
        &self.jvm_args
    }

    pub fn app_args(&self) -> &[String] {
        &self.app_args
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ProjectConfig {
        &mut self.config
    }

    /// True iff no source (descriptor or component source file) is strictly
    /// newer than the newest binary (output file or dependency archive).
    pub fn is_build_up_to_date(&self) -> Result<bool> {
        let Some(source_time) = self.source_files_changed_time()? else {
            return Ok(true);
        };
        let Some(binary_time) = self.binary_files_changed_time()? else {
            return Ok(false);
        };
        let up_to_date = source_time <= binary_time;
        debug!(?source_time, ?binary_time, up_to_date, "checked build freshness");
        Ok(up_to_date)
    }

    /// Newest timestamp across descriptors and component source roots.
    pub fn source_files_changed_time(&self) -> Result<Option<SystemTime>> {
        let mut latest = self.build_files_changed_time()?;
        for component in &self.components {
            latest = latest.max(component.source_root().index().latest()?);
        }
        Ok(latest)
    }

    /// Newest timestamp across the build descriptors.
    pub fn build_files_changed_time(&self) -> Result<Option<SystemTime>> {
        let mut latest = None;
        for file in &self.build_files {
            if let Ok(time) = crate::fs::modified(file.path()) {
                latest = latest.max(Some(time));
            }
        }
        Ok(latest)
    }

    /// Newest timestamp across output roots and dependency archives.
    pub fn binary_files_changed_time(&self) -> Result<Option<SystemTime>> {
        let mut latest = None;
        for component in &self.components {
            latest = latest.max(component.output_root().index().latest()?);
        }
        for dep in &self.dependencies {
            if let Ok(time) = crate::fs::modified(dep.path()) {
                latest = latest.max(Some(time));
            }
        }
        Ok(latest)
    }

    /// True if any descriptor is newer than its snapshot or has been removed.
    pub fn have_build_files_changed(&self) -> bool {
        self.build_files.iter().any(BuildFile::has_changed)
    }

    /// Uncommitted, non-empty source changes per component.
    pub fn source_changes(&self) -> Result<Vec<Changes>> {
        let mut out = Vec::new();
        for component in &self.components {
            let changes = component.changes()?;
            if !changes.is_empty() {
                out.push(changes);
            }
        }
        Ok(out)
    }

    /// Commit every source root and return the non-empty changes.
    ///
    /// After this, the same edits are no longer reported by
    /// [`source_changes`](Self::source_changes), whatever the outcome of the
    /// build that consumes them.
    pub fn commit_source_changes(&mut self) -> Result<Vec<Changes>> {
        let mut out = Vec::new();
        for component in &mut self.components {
            let changes = component.update_source()?;
            if !changes.is_empty() {
                out.push(changes);
            }
        }
        Ok(out)
    }

    /// Run the owning component's step for each set of changes.
    ///
    /// Stops at the first failing step. Files already written by earlier
    /// steps stay in place. On success the output snapshots are refreshed
    /// and the success marker is persisted.
    pub async fn incremental_build(&mut self, changes: &[Changes], output: &BuildOutput) -> Result<usize> {
        let mut processed = 0;

        for change in changes.iter().filter(|c| !c.is_empty()) {
            let mut owners = self.components.iter().filter(|c| {
                c.source_root().root_type() == change.root_type()
                    && c.source_root().path() == change.root_path()
            });
            let Some(first) = owners.next() else {
                return Err(DevLoopError::BuildFailed(format!(
                    "no component owns changed root {:?}",
                    change.root_path()
                )));
            };
            for component in std::iter::once(first).chain(owners) {
                processed += component
                    .incremental_build(change, &self.classpath, &self.compiler_flags, output)
                    .await?;
            }
        }

        for component in &mut self.components {
            component.update_output()?;
        }
        self.config.record_success(BuildType::Incremental, SystemTime::now())?;
        info!(project = %self.name, processed, "incremental build succeeded");
        Ok(processed)
    }

    /// Build everything with the project's own steps.
    ///
    /// With `clean`, every output directory is emptied first. Does not
    /// persist the success marker; callers record the build type they report.
    pub async fn full_build(&mut self, clean: bool, output: &BuildOutput) -> Result<usize> {
        if clean {
            let mut seen = HashSet::new();
            for component in &self.components {
                let dir = component.output_root().path();
                if seen.insert(dir.to_path_buf()) {
                    output.out(&format!("Cleaning {}", dir.display()));
                    crate::fs::clean_dir(dir)?;
                }
            }
        }

        let mut processed = 0;
        for component in &self.components {
            processed += component
                .full_build(&self.classpath, &self.compiler_flags, output)
                .await?;
        }

        for component in &mut self.components {
            component.update_source()?;
            component.update_output()?;
        }
        Ok(processed)
    }

    /// Persist a successful build of the given type.
    pub fn record_build_success(&mut self, build_type: BuildType) -> Result<()> {
        self.build_type = build_type;
        let classpath = std::env::join_paths(&self.classpath).map_err(|e| {
            DevLoopError::ConfigError(format!("classpath of project {}: {}", self.name, e))
        })?;
        self.config.set_classpath(classpath.to_string_lossy());
        self.config.record_success(build_type, SystemTime::now())
    }

    /// Resolve `paths` into dependency archives and recompute the classpath.
    ///
    /// Directories expand to the `*.jar` / `*.zip` files under them; plain
    /// files are kept; missing paths are skipped with a warning.
    pub fn update_dependencies(&mut self, paths: Vec<PathBuf>) -> Result<()> {
        let mut dependencies = Vec::new();
        for path in &paths {
            if path.is_dir() {
                let mut archives = FileTimestampIndex::new(path)
                    .with_file_filter(|p| BuildRootType::Dependencies.accepts(p))
                    .entries()?;
                archives.sort();
                for (file, time) in archives {
                    dependencies.push(BuildFile::new(file, BuildRootType::Dependencies, time));
                }
            } else if path.is_file() {
                dependencies.push(BuildFile::from_path(path, BuildRootType::Dependencies)?);
            } else {
                warn!(path = ?path, "dependency path does not exist; skipping");
            }
        }

        let outputs = self
            .components
            .iter()
            .map(|c| c.output_root().path().to_path_buf());
        let archives = dependencies.iter().map(|d| d.path().to_path_buf());
        self.classpath = ordered_unique(outputs.chain(archives));
        self.dependency_paths = paths;
        self.dependencies = dependencies;

        debug!(
            project = %self.name,
            classpath = self.classpath.len(),
            dependencies = self.dependencies.len(),
            "updated dependencies"
        );
        Ok(())
    }
}

/// Keep the first occurrence of each entry, in order.
fn ordered_unique(items: impl IntoIterator<Item = PathBuf>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

/// Collects the pieces of a [`Project`] and validates them.
#[derive(Debug)]
pub struct ProjectBuilder {
    name: String,
    root_dir: PathBuf,
    build_type: BuildType,
    build_files: Vec<PathBuf>,
    dependency_paths: Vec<PathBuf>,
    components: Vec<BuildComponent>,
    compiler_flags: Vec<String>,
    main_class: String,
    jvm_args: Vec<String>,
    app_args: Vec<String>,
    config: Option<ProjectConfig>,
}

impl ProjectBuilder {
    pub fn new(name: impl Into<String>, root_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root_dir: root_dir.into(),
            build_type: BuildType::Skipped,
            build_files: Vec::new(),
            dependency_paths: Vec::new(),
            components: Vec::new(),
            compiler_flags: Vec::new(),
            main_class: String::new(),
            jvm_args: Vec::new(),
            app_args: Vec::new(),
            config: None,
        }
    }

    pub fn build_type(mut self, build_type: BuildType) -> Self {
        self.build_type = build_type;
        self
    }

    pub fn build_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.build_files.push(path.into());
        self
    }

    pub fn dependency(mut self, path: impl Into<PathBuf>) -> Self {
        self.dependency_paths.push(path.into());
        self
    }

    pub fn component(mut self, component: BuildComponent) -> Self {
        self.components.push(component);
        self
    }

    pub fn compiler_flag(mut self, flag: impl Into<String>) -> Self {
        self.compiler_flags.push(flag.into());
        self
    }

    pub fn main_class(mut self, main_class: impl Into<String>) -> Self {
        self.main_class = main_class.into();
        self
    }

    pub fn jvm_arg(mut self, arg: impl Into<String>) -> Self {
        self.jvm_args.push(arg.into());
        self
    }

    pub fn app_arg(mut self, arg: impl Into<String>) -> Self {
        self.app_args.push(arg.into());
        self
    }

    pub fn config(mut self, config: ProjectConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Result<Project> {
        if self.name.trim().is_empty() {
            return Err(DevLoopError::ConfigError("project name must not be empty".to_string()));
        }
        if self.build_files.is_empty() {
            return Err(DevLoopError::ConfigError(format!(
                "project '{}' has no build files",
                self.name
            )));
        }
        if self.dependency_paths.is_empty() {
            return Err(DevLoopError::ConfigError(format!(
                "project '{}' has no dependencies",
                self.name
            )));
        }
        if self.components.is_empty() {
            return Err(DevLoopError::ConfigError(format!(
                "project '{}' has no build components",
                self.name
            )));
        }
        if self.main_class.trim().is_empty() {
            return Err(DevLoopError::ConfigError(format!(
                "project '{}' has no main class",
                self.name
            )));
        }

        let build_files = self
            .build_files
            .iter()
            .map(|p| BuildFile::from_path(p, BuildRootType::Project))
            .collect::<Result<Vec<_>>>()?;

        let config = match self.config {
            Some(config) => config,
            None => ProjectConfig::load(&self.root_dir)?,
        };

        let mut project = Project {
            name: self.name,
            build_type: self.build_type,
            root_dir: self.root_dir,
            build_files,
            dependency_paths: Vec::new(),
            dependencies: Vec::new(),
            classpath: Vec::new(),
            compiler_flags: self.compiler_flags,
            components: self.components,
            main_class: self.main_class,
            jvm_args: self.jvm_args,
            app_args: self.app_args,
            config,
        };
        project.update_dependencies(self.dependency_paths)?;
        Ok(project)
    }
}
