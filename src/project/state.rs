// src/project/state.rs

//! Persisted per-project state, stored as TOML.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::Result;
use crate::types::BuildType;

/// Relative path (from the project root) to the state file.
pub const STATE_FILE_PATH: &str = ".devloop/state.toml";

/// On-disk shape of the state file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct StateFile {
    /// Millis since the epoch.
    #[serde(rename = "last.success.time", default, skip_serializing_if = "Option::is_none")]
    last_success_time: Option<u64>,

    #[serde(rename = "last.build.type", default, skip_serializing_if = "Option::is_none")]
    last_build_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    classpath: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectConfig {
    path: PathBuf,
    state: StateFile,
}

impl ProjectConfig {
    /// Load the state of the project rooted at `project_dir`; a missing file
    /// is an empty store.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let path = project_dir.join(STATE_FILE_PATH);
        let state = if path.exists() {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("reading state file {:?}", path))?;
            toml::from_str(&text)?
        } else {
            StateFile::default()
        };
        Ok(Self { path, state })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// When the last build (full or incremental) succeeded.
    pub fn last_successful_build(&self) -> Option<SystemTime> {
        let millis = self.state.last_success_time?;
        Some(UNIX_EPOCH + Duration::from_millis(millis))
    }

    pub fn last_build_type(&self) -> Option<BuildType> {
        self.state.last_build_type.as_deref()?.parse().ok()
    }

    pub fn classpath(&self) -> Option<&str> {
        self.state.classpath.as_deref()
    }

    pub fn set_classpath(&mut self, classpath: impl Into<String>) {
        self.state.classpath = Some(classpath.into());
    }

    /// Record a successful build and write the file.
    pub fn record_success(&mut self, build_type: BuildType, at: SystemTime) -> Result<()> {
        let millis = at.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        self.state.last_success_time = Some(u64::try_from(millis).unwrap_or(u64::MAX));
        self.state.last_build_type = Some(build_type.to_string());
        self.store()
    }

    /// Forget the last success so the next start performs a full build.
    pub fn clear_success(&mut self) -> Result<()> {
        if self.state.last_success_time.take().is_some() {
            self.store()?;
        }
        Ok(())
    }

    /// Write the state next to its final location, then rename it into place.
    pub fn store(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating state directory {:?}", parent))?;
        }
        let text = toml::to_string(&self.state).context("serializing project state")?;
        let tmp = self.path.with_extension("toml.tmp");
        fs::write(&tmp, text).with_context(|| format!("writing state file {:?}", tmp))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing state file {:?}", self.path))?;
        debug!(path = ?self.path, "stored project state");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_is_empty_and_success_persists() {
        let dir = tempdir().unwrap();
        let mut cfg = ProjectConfig::load(dir.path()).unwrap();
        assert_eq!(cfg.last_successful_build(), None);

        let at = UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);
        cfg.record_success(BuildType::Incremental, at).unwrap();

        let reloaded = ProjectConfig::load(dir.path()).unwrap();
        assert_eq!(reloaded.last_successful_build(), Some(at));
        assert_eq!(reloaded.last_build_type(), Some(BuildType::Incremental));
        assert!(dir.path().join(STATE_FILE_PATH).is_file());
        assert!(!dir.path().join(".devloop/state.toml.tmp").exists());
    }

    #[test]
    fn file_is_toml_with_dotted_keys() {
        let dir = tempdir().unwrap();
        let mut cfg = ProjectConfig::load(dir.path()).unwrap();
        cfg.set_classpath("/a b/c.jar:/d.jar");
        cfg.record_success(BuildType::ForkedComplete, UNIX_EPOCH + Duration::from_millis(42))
            .unwrap();

        let text = fs::read_to_string(dir.path().join(STATE_FILE_PATH)).unwrap();
        let table: toml::Table = toml::from_str(&text).unwrap();
        assert_eq!(table["last.success.time"].as_integer(), Some(42));
        assert_eq!(table["classpath"].as_str(), Some("/a b/c.jar:/d.jar"));

        let reloaded = ProjectConfig::load(dir.path()).unwrap();
        assert_eq!(reloaded.classpath(), Some("/a b/c.jar:/d.jar"));
        assert_eq!(reloaded.last_build_type(), Some(BuildType::ForkedComplete));

        let mut cleared = reloaded.clone();
        cleared.clear_success().unwrap();
        let reloaded = ProjectConfig::load(dir.path()).unwrap();
        assert_eq!(reloaded.last_successful_build(), None);
        assert_eq!(reloaded.classpath(), Some("/a b/c.jar:/d.jar"));
    }

    #[test]
    fn corrupt_state_is_a_parse_error() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".devloop")).unwrap();
        fs::write(dir.path().join(STATE_FILE_PATH), "last.success.time 12\n").unwrap();
        assert!(matches!(
            ProjectConfig::load(dir.path()),
            Err(crate::errors::DevLoopError::TomlError(_))
        ));
    }
}
