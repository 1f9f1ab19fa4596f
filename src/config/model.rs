// src/config/model.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration as read from `Devloop.toml`.
///
/// ```toml
/// [project]
/// name = "quickstart"
/// build_files = ["pom.xml"]
/// main_class = "io.example.Main"
/// dependencies = ["target/libs"]
///
/// [[component]]
/// kind = "compile"
/// source = "src/main/java"
/// output = "target/classes"
///
/// [loop]
/// poll_interval = "200ms"
/// ```
///
/// `[build]`, `[loop]` and `[executor]` are optional and have defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    pub project: RawProjectSection,

    #[serde(default)]
    pub component: Vec<ComponentConfig>,

    #[serde(default)]
    pub build: BuildSection,

    #[serde(default, rename = "loop")]
    pub loop_: RawLoopSection,

    #[serde(default)]
    pub executor: ExecutorSection,
}

/// `[project]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawProjectSection {
    pub name: String,

    /// Build descriptors; a change to any of them forces a full build.
    #[serde(default)]
    pub build_files: Vec<PathBuf>,

    #[serde(default)]
    pub main_class: String,

    /// Directories (scanned for `*.jar` / `*.zip`) or archive files.
    #[serde(default)]
    pub dependencies: Vec<PathBuf>,

    #[serde(default)]
    pub compiler_flags: Vec<String>,

    #[serde(default)]
    pub jvm_args: Vec<String>,

    #[serde(default)]
    pub app_args: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    /// `*.java` sources compiled to `*.class` files.
    Compile,
    /// Resources mirrored as-is.
    Copy,
}

/// One `[[component]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ComponentConfig {
    pub kind: ComponentKind,
    pub source: PathBuf,
    pub output: PathBuf,
}

/// `[build]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildSection {
    /// Shell command for a forked full build. Absent means the full build
    /// runs in-process through the components.
    #[serde(default)]
    pub command: Option<String>,

    /// Shell command for a clean forked build. Falls back to emptying the
    /// output directories and running `command`.
    #[serde(default)]
    pub clean_command: Option<String>,

    #[serde(default = "default_javac")]
    pub javac: String,

    #[serde(default = "default_java")]
    pub java: String,
}

fn default_javac() -> String {
    "javac".to_string()
}

fn default_java() -> String {
    "java".to_string()
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            command: None,
            clean_command: None,
            javac: default_javac(),
            java: default_java(),
        }
    }
}

/// `[loop]` section as written; durations are still strings.
#[derive(Debug, Clone, Deserialize)]
pub struct RawLoopSection {
    #[serde(default)]
    pub clean: bool,

    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,

    #[serde(default = "default_max_build_failures")]
    pub max_build_failures: u32,

    #[serde(default = "default_max_incremental_failures")]
    pub max_incremental_failures: u32,

    #[serde(default = "default_max_app_failures")]
    pub max_app_failures: u32,

    /// Globs (relative to the project root) ignored while waiting for a
    /// change without a project.
    #[serde(default)]
    pub exclude: Vec<String>,
}

fn default_poll_interval() -> String {
    "200ms".to_string()
}

fn default_max_build_failures() -> u32 {
    3
}

fn default_max_incremental_failures() -> u32 {
    10
}

fn default_max_app_failures() -> u32 {
    3
}

impl Default for RawLoopSection {
    fn default() -> Self {
        Self {
            clean: false,
            poll_interval: default_poll_interval(),
            max_build_failures: default_max_build_failures(),
            max_incremental_failures: default_max_incremental_failures(),
            max_app_failures: default_max_app_failures(),
            exclude: Vec::new(),
        }
    }
}

/// `[executor]` section.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ExecutorSection {
    /// SIGTERM attempts before escalating to SIGKILL.
    #[serde(default = "default_graceful_retries")]
    pub graceful_retries: u32,
}

fn default_graceful_retries() -> u32 {
    3
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            graceful_retries: default_graceful_retries(),
        }
    }
}

/// Validated `[loop]` settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopSection {
    pub clean: bool,
    pub poll_interval: Duration,
    pub max_build_failures: u32,
    pub max_incremental_failures: u32,
    pub max_app_failures: u32,
    pub exclude: Vec<String>,
}

impl Default for LoopSection {
    fn default() -> Self {
        Self {
            clean: false,
            poll_interval: Duration::from_millis(200),
            max_build_failures: default_max_build_failures(),
            max_incremental_failures: default_max_incremental_failures(),
            max_app_failures: default_max_app_failures(),
            exclude: Vec::new(),
        }
    }
}

/// Validated configuration.
///
/// Paths are kept as written; [`ConfigFile::resolve`] anchors them at
/// `root_dir`, the directory containing the config file.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub root_dir: PathBuf,

    /// The file this configuration was read from, if any. It is tracked as
    /// a build descriptor.
    pub source: Option<PathBuf>,

    pub project: RawProjectSection,
    pub components: Vec<ComponentConfig>,
    pub build: BuildSection,
    pub loop_: LoopSection,
    pub executor: ExecutorSection,
}

impl ConfigFile {
    /// Constructor used by validation once invariants hold.
    pub(crate) fn new_unchecked(
        project: RawProjectSection,
        components: Vec<ComponentConfig>,
        build: BuildSection,
        loop_: LoopSection,
        executor: ExecutorSection,
    ) -> Self {
        Self {
            root_dir: PathBuf::from("."),
            source: None,
            project,
            components,
            build,
            loop_,
            executor,
        }
    }

    /// Anchor the configuration at `root_dir` and remember where it was read from.
    pub fn with_source(mut self, root_dir: impl Into<PathBuf>, source: impl Into<PathBuf>) -> Self {
        self.root_dir = root_dir.into();
        self.source = Some(source.into());
        self
    }

    /// `path` if absolute, otherwise `root_dir/path`.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root_dir.join(path)
        }
    }

    /// Every build descriptor, including the config file itself.
    pub fn build_file_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .project
            .build_files
            .iter()
            .map(|p| self.resolve(p))
            .collect();
        if let Some(source) = &self.source {
            if !paths.contains(source) {
                paths.push(source.clone());
            }
        }
        paths
    }

    pub fn dependency_paths(&self) -> Vec<PathBuf> {
        self.project
            .dependencies
            .iter()
            .map(|p| self.resolve(p))
            .collect()
    }

    /// Output directories of every component, in declaration order.
    pub fn output_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = Vec::new();
        for component in &self.components {
            let dir = self.resolve(&component.output);
            if !dirs.contains(&dir) {
                dirs.push(dir);
            }
        }
        dirs
    }
}
