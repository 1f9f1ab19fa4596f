use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

/// What kind of build action a cycle took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildType {
    /// Nothing needed building.
    Skipped,
    /// Only changed sources/resources were processed.
    Incremental,
    /// Full build through the project's own build steps.
    Complete,
    /// Full build by the external build tool.
    ForkedComplete,
    /// Full build preceded by a clean of every output directory.
    CleanComplete,
}

impl BuildType {
    /// True for every kind of full build.
    pub fn is_full(self) -> bool {
        matches!(
            self,
            BuildType::Complete | BuildType::ForkedComplete | BuildType::CleanComplete
        )
    }
}

impl fmt::Display for BuildType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BuildType::Skipped => "skipped",
            BuildType::Incremental => "incremental",
            BuildType::Complete => "complete",
            BuildType::ForkedComplete => "forked complete",
            BuildType::CleanComplete => "clean complete",
        };
        f.write_str(s)
    }
}

impl FromStr for BuildType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "skipped" => Ok(BuildType::Skipped),
            "incremental" => Ok(BuildType::Incremental),
            "complete" => Ok(BuildType::Complete),
            "forked complete" => Ok(BuildType::ForkedComplete),
            "clean complete" => Ok(BuildType::CleanComplete),
            other => Err(format!("invalid build type: {other}")),
        }
    }
}

/// Coarse classification of what changed in a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeType {
    None,
    BuildFile,
    SourceFile,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeType::None => "none",
            ChangeType::BuildFile => "build file",
            ChangeType::SourceFile => "source file",
        };
        f.write_str(s)
    }
}

/// Decision returned by a monitor at the end of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
    /// Start the next cycle after the delay returned by `on_ready`.
    Continue,
    /// Poll until some file changes, then start the next cycle.
    WaitForChange,
    /// Stop the loop.
    Exit,
}

/// Which timestamp `changed_since` reports when several files qualify.
///
/// - `Latest`: the newest matching timestamp across the whole tree.
/// - `First`: whatever match the directory walk reaches first. Callers can
///   only rely on *some* file having changed, not on which one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieBreak {
    First,
    #[default]
    Latest,
}

/// Kind of directory tracked by a build root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildRootType {
    Project,
    JavaSources,
    JavaClasses,
    Resources,
    Dependencies,
}

impl BuildRootType {
    /// Whether a file belongs to a root of this type.
    pub fn accepts(self, path: &Path) -> bool {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match self {
            BuildRootType::JavaSources => ext == "java",
            BuildRootType::JavaClasses => ext == "class",
            BuildRootType::Dependencies => ext == "jar" || ext == "zip",
            BuildRootType::Resources | BuildRootType::Project => true,
        }
    }
}

impl fmt::Display for BuildRootType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BuildRootType::Project => "project",
            BuildRootType::JavaSources => "java sources",
            BuildRootType::JavaClasses => "java classes",
            BuildRootType::Resources => "resources",
            BuildRootType::Dependencies => "dependencies",
        };
        f.write_str(s)
    }
}
