// src/fs/timestamps.rs

//! Timestamp queries over a directory tree.
//!
//! A [`FileTimestampIndex`] walks a tree with two predicates: a directory
//! filter that prunes whole subtrees (e.g. build output) and a file filter
//! that selects which files count. The same tree can therefore be scanned for
//! "did a source change" while ignoring compiled output, and separately for
//! "when did the binaries last change".

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use walkdir::WalkDir;

use crate::errors::{DevLoopError, Result};
use crate::types::TieBreak;

/// Shared path predicate.
pub type PathFilter = Arc<dyn Fn(&Path) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct FileTimestampIndex {
    root: PathBuf,
    dir_filter: PathFilter,
    file_filter: PathFilter,
}

impl fmt::Debug for FileTimestampIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileTimestampIndex")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl FileTimestampIndex {
    /// Index every file under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            dir_filter: Arc::new(|_| true),
            file_filter: Arc::new(|_| true),
        }
    }

    /// Only descend into directories for which `filter` returns true.
    ///
    /// Never applied to the root itself.
    pub fn with_dir_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Path) -> bool + Send + Sync + 'static,
    {
        self.dir_filter = Arc::new(filter);
        self
    }

    /// Only consider files for which `filter` returns true.
    pub fn with_file_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Path) -> bool + Send + Sync + 'static,
    {
        self.file_filter = Arc::new(filter);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All accepted files with their last-modified time.
    pub fn entries(&self) -> Result<Vec<(PathBuf, SystemTime)>> {
        let mut out = Vec::new();
        self.walk(|path, time| {
            out.push((path.to_path_buf(), time));
            true
        })?;
        Ok(out)
    }

    /// The timestamp of an accepted file strictly newer than `baseline`.
    ///
    /// With `baseline == None` every file qualifies. Returns `None` when no
    /// file qualifies.
    pub fn changed_since(
        &self,
        baseline: Option<SystemTime>,
        tie_break: TieBreak,
    ) -> Result<Option<SystemTime>> {
        let mut found: Option<SystemTime> = None;

        self.walk(|_, time| {
            let newer = baseline.is_none_or(|b| time > b);
            if !newer {
                return true;
            }
            match tie_break {
                TieBreak::First => {
                    found = Some(time);
                    false
                }
                TieBreak::Latest => {
                    if found.is_none_or(|current| time > current) {
                        found = Some(time);
                    }
                    true
                }
            }
        })?;

        Ok(found)
    }

    /// Newest timestamp in the tree.
    pub fn latest(&self) -> Result<Option<SystemTime>> {
        self.changed_since(None, TieBreak::Latest)
    }

    /// Walk accepted files; `visit` returns false to stop early.
    fn walk<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(&Path, SystemTime) -> bool,
    {
        if !self.root.exists() {
            return Ok(());
        }
        if !self.root.is_dir() {
            return Err(DevLoopError::NotADirectory(self.root.clone()));
        }

        let dir_filter = Arc::clone(&self.dir_filter);
        let walker = WalkDir::new(&self.root)
            .follow_links(true)
            .into_iter()
            .filter_entry(move |e| e.depth() == 0 || !e.file_type().is_dir() || dir_filter(e.path()));

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                // Files vanishing mid-walk are expected while editors save.
                Err(e) if e.io_error().is_some_and(|io| io.kind() == std::io::ErrorKind::NotFound) => {
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if !entry.file_type().is_file() || !(self.file_filter)(entry.path()) {
                continue;
            }
            let time = match entry.metadata() {
                Ok(meta) => meta.modified()?,
                Err(e) if e.io_error().is_some_and(|io| io.kind() == std::io::ErrorKind::NotFound) => {
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if !visit(entry.path(), time) {
                break;
            }
        }
        Ok(())
    }
}
