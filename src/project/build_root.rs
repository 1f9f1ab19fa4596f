// src/project/build_root.rs

//! Snapshot-and-diff tracking for one root directory.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::Context;
use tracing::debug;

use crate::errors::{DevLoopError, Result};
use crate::fs::FileTimestampIndex;
use crate::project::BuildFile;
use crate::types::BuildRootType;

/// Files of a root keyed by absolute path.
pub type Snapshot = BTreeMap<PathBuf, BuildFile>;

/// Delta between two snapshots of the same root.
///
/// Every path ends up in at most one of `added`, `modified`, `removed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Changes {
    root_type: BuildRootType,
    root_path: PathBuf,
    added: BTreeSet<PathBuf>,
    modified: BTreeSet<PathBuf>,
    removed: BTreeSet<PathBuf>,
}

impl Changes {
    /// Diff `old` against `new`.
    ///
    /// - in `new` only: added
    /// - in both, strictly newer in `new`: modified
    /// - in `old` only: removed
    pub fn between(
        root_type: BuildRootType,
        root_path: impl Into<PathBuf>,
        old: &Snapshot,
        new: &Snapshot,
    ) -> Self {
        let mut added = BTreeSet::new();
        let mut modified = BTreeSet::new();
        let mut removed = BTreeSet::new();

        for (path, file) in new {
            match old.get(path) {
                None => {
                    added.insert(path.clone());
                }
                Some(prev) if file.last_modified() > prev.last_modified() => {
                    modified.insert(path.clone());
                }
                Some(_) => {}
            }
        }
        for path in old.keys() {
            if !new.contains_key(path) {
                removed.insert(path.clone());
            }
        }

        Self {
            root_type,
            root_path: root_path.into(),
            added,
            modified,
            removed,
        }
    }

    pub fn root_type(&self) -> BuildRootType {
        self.root_type
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn added(&self) -> &BTreeSet<PathBuf> {
        &self.added
    }

    pub fn modified(&self) -> &BTreeSet<PathBuf> {
        &self.modified
    }

    pub fn removed(&self) -> &BTreeSet<PathBuf> {
        &self.removed
    }

    /// Added and modified paths, in path order.
    pub fn added_or_modified(&self) -> impl Iterator<Item = &PathBuf> {
        self.added.iter().chain(self.modified.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }
}

/// A root directory and the current snapshot of the files it tracks.
#[derive(Debug, Clone)]
pub struct BuildRoot {
    root_type: BuildRootType,
    path: PathBuf,
    files: Snapshot,
}

impl BuildRoot {
    /// Validate `path` and take the baseline snapshot.
    pub fn create(root_type: BuildRootType, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(DevLoopError::NotADirectory(path.to_path_buf()));
        }
        let path = path
            .canonicalize()
            .with_context(|| format!("canonicalizing {:?}", path))?;

        let files = scan(root_type, &path)?;
        debug!(root = ?path, %root_type, files = files.len(), "created build root");

        Ok(Self {
            root_type,
            path,
            files,
        })
    }

    pub fn root_type(&self) -> BuildRootType {
        self.root_type
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current snapshot.
    pub fn list(&self) -> impl Iterator<Item = &BuildFile> {
        self.files.values()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    /// Re-scan and diff against the current snapshot without committing.
    pub fn changes(&self) -> Result<Changes> {
        let fresh = scan(self.root_type, &self.path)?;
        Ok(Changes::between(self.root_type, &self.path, &self.files, &fresh))
    }

    /// Re-scan, diff, and make the new scan the current snapshot.
    pub fn update(&mut self) -> Result<Changes> {
        let fresh = scan(self.root_type, &self.path)?;
        let changes = Changes::between(self.root_type, &self.path, &self.files, &fresh);
        if !changes.is_empty() {
            debug!(
                root = ?self.path,
                added = changes.added().len(),
                modified = changes.modified().len(),
                removed = changes.removed().len(),
                "committed build root snapshot"
            );
        }
        self.files = fresh;
        Ok(changes)
    }

    /// Newest timestamp in the current snapshot.
    pub fn latest_timestamp(&self) -> Option<SystemTime> {
        self.files.values().map(BuildFile::last_modified).max()
    }

    /// Timestamp index over the directory this root tracks, with the root's
    /// own filters.
    pub fn index(&self) -> FileTimestampIndex {
        index_for(self.root_type, &self.path)
    }
}

fn index_for(root_type: BuildRootType, path: &Path) -> FileTimestampIndex {
    FileTimestampIndex::new(path)
        .with_dir_filter(|p| !crate::fs::is_hidden(p))
        .with_file_filter(move |p| root_type.accepts(p))
}

fn scan(root_type: BuildRootType, path: &Path) -> Result<Snapshot> {
    let entries = index_for(root_type, path).entries()?;
    Ok(entries
        .into_iter()
        .map(|(p, time)| (p.clone(), BuildFile::new(p, root_type, time)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::time::Duration;
    use tempfile::tempdir;

    fn touch_at(path: &Path, time: SystemTime) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        if !path.exists() {
            fs::write(path, b"class X {}").unwrap();
        }
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    #[test]
    fn create_rejects_non_directories() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("f.java");
        fs::write(&file, b"").unwrap();

        assert!(matches!(
            BuildRoot::create(BuildRootType::JavaSources, &file),
            Err(DevLoopError::NotADirectory(_))
        ));
        assert!(matches!(
            BuildRoot::create(BuildRootType::JavaSources, dir.path().join("missing")),
            Err(DevLoopError::NotADirectory(_))
        ));
    }

    #[test]
    fn scan_applies_root_type_filter_and_skips_hidden_dirs() {
        let dir = tempdir().unwrap();
        let t = SystemTime::now() - Duration::from_secs(100);
        touch_at(&dir.path().join("a/A.java"), t);
        touch_at(&dir.path().join("a/readme.txt"), t);
        touch_at(&dir.path().join(".cache/C.java"), t);

        let root = BuildRoot::create(BuildRootType::JavaSources, dir.path()).unwrap();
        let names: Vec<_> = root
            .list()
            .map(|f| f.path().file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["A.java"]);
    }

    #[test]
    fn changes_do_not_commit_but_update_does() {
        let dir = tempdir().unwrap();
        let t = SystemTime::now() - Duration::from_secs(100);
        touch_at(&dir.path().join("A.java"), t);
        touch_at(&dir.path().join("B.java"), t);

        let mut root = BuildRoot::create(BuildRootType::JavaSources, dir.path()).unwrap();
        assert!(root.changes().unwrap().is_empty());
        assert!(root.changes().unwrap().is_empty());

        touch_at(&dir.path().join("A.java"), t + Duration::from_secs(5));
        touch_at(&dir.path().join("C.java"), t);
        fs::remove_file(dir.path().join("B.java")).unwrap();

        let first = root.changes().unwrap();
        let second = root.changes().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);

        let base = root.path().to_path_buf();
        assert!(first.modified().contains(&base.join("A.java")));
        assert!(first.added().contains(&base.join("C.java")));
        assert!(first.removed().contains(&base.join("B.java")));

        let committed = root.update().unwrap();
        assert_eq!(committed, first);
        assert!(root.changes().unwrap().is_empty());
        assert_eq!(root.len(), 2);
    }

    #[test]
    fn older_timestamp_is_not_a_modification() {
        let dir = tempdir().unwrap();
        let t = SystemTime::now() - Duration::from_secs(100);
        touch_at(&dir.path().join("A.java"), t);
        let root = BuildRoot::create(BuildRootType::JavaSources, dir.path()).unwrap();

        touch_at(&dir.path().join("A.java"), t - Duration::from_secs(50));
        assert!(root.changes().unwrap().is_empty());
    }
}
