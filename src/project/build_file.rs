// src/project/build_file.rs

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::errors::Result;
use crate::types::BuildRootType;

/// Snapshot of a tracked file: where it is, what kind of root it belongs to,
/// and its last-modified time at scan time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFile {
    path: PathBuf,
    root_type: BuildRootType,
    last_modified: SystemTime,
}

impl BuildFile {
    pub fn new(path: impl Into<PathBuf>, root_type: BuildRootType, last_modified: SystemTime) -> Self {
        Self {
            path: path.into(),
            root_type,
            last_modified,
        }
    }

    /// Stat `path` now.
    pub fn from_path(path: impl Into<PathBuf>, root_type: BuildRootType) -> Result<Self> {
        let path = path.into();
        let last_modified = crate::fs::modified(&path)?;
        Ok(Self::new(path, root_type, last_modified))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn root_type(&self) -> BuildRootType {
        self.root_type
    }

    pub fn last_modified(&self) -> SystemTime {
        self.last_modified
    }

    /// True if the file on disk is newer than this snapshot, or is gone.
    pub fn has_changed(&self) -> bool {
        match crate::fs::modified(&self.path) {
            Ok(now) => now > self.last_modified,
            Err(_) => true,
        }
    }
}
