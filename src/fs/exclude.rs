// src/fs/exclude.rs

//! Glob-based exclusion of paths under a project root.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::errors::Result;
use crate::fs::{FileTimestampIndex, is_hidden};

/// Compiled exclude patterns, matched against paths relative to `root`,
/// plus whole directories excluded by prefix.
#[derive(Clone)]
pub struct ExcludeSet {
    root: PathBuf,
    set: Option<GlobSet>,
    dirs: Vec<PathBuf>,
}

impl fmt::Debug for ExcludeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExcludeSet")
            .field("root", &self.root)
            .field("dirs", &self.dirs)
            .finish_non_exhaustive()
    }
}

impl ExcludeSet {
    pub fn new(root: impl Into<PathBuf>, patterns: &[String]) -> Result<Self> {
        let set = if patterns.is_empty() {
            None
        } else {
            Some(build_globset(patterns)?)
        };
        Ok(Self {
            root: root.into(),
            set,
            dirs: Vec::new(),
        })
    }

    /// Also exclude everything under `dirs`.
    pub fn with_dirs(mut self, dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        self.dirs.extend(dirs);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// True if `path` lies under an excluded directory, or under the root
    /// and matches a pattern.
    pub fn is_excluded(&self, path: &Path) -> bool {
        if self.dirs.iter().any(|dir| path.starts_with(dir)) {
            return true;
        }
        let Some(set) = &self.set else {
            return false;
        };
        relative_str(&self.root, path).is_some_and(|rel| set.is_match(rel))
    }

    /// Index of the root that skips hidden directories and excluded paths.
    pub fn index(&self) -> FileTimestampIndex {
        let dirs = Arc::new(self.clone());
        let files = Arc::clone(&dirs);
        FileTimestampIndex::new(&self.root)
            .with_dir_filter(move |p| !is_hidden(p) && !dirs.is_excluded(p))
            .with_file_filter(move |p| !files.is_excluded(p))
    }
}

/// Build a GlobSet from simple string patterns.
fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build().context("building exclude globset")?)
}

/// `path` relative to `root`, with forward slashes.
///
/// Falls back to comparing canonical forms when a plain prefix strip fails
/// (symlinked temp dirs, `/private/var` on macOS).
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(rel.to_string_lossy().replace('\\', "/"));
    }
    if let (Ok(root_canon), Ok(path_canon)) = (root.canonicalize(), path.canonicalize()) {
        if let Ok(rel) = path_canon.strip_prefix(&root_canon) {
            return Some(rel.to_string_lossy().replace('\\', "/"));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn excludes_relative_matches_only() {
        let set = ExcludeSet::new("/p", &["target/**".to_string(), "*.log".to_string()]).unwrap();
        assert!(set.is_excluded(Path::new("/p/target/classes/A.class")));
        assert!(set.is_excluded(Path::new("/p/build.log")));
        assert!(!set.is_excluded(Path::new("/p/src/A.java")));
        assert!(!set.is_excluded(Path::new("/elsewhere/target/x")));
    }

    #[test]
    fn index_skips_hidden_and_excluded() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        for rel in ["src/A.java", "target/classes/A.class", ".devloop/state", "pom.xml"] {
            let path = root.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, b"x").unwrap();
        }

        let set = ExcludeSet::new(root, &["target/**".to_string()]).unwrap();
        let mut seen: Vec<_> = set
            .index()
            .entries()
            .unwrap()
            .into_iter()
            .map(|(p, _)| relative_str(root, &p).unwrap())
            .collect();
        seen.sort();
        assert_eq!(seen, vec!["pom.xml", "src/A.java"]);
    }

    #[test]
    fn excluded_dirs_match_by_prefix() {
        let set = ExcludeSet::new("/p", &[])
            .unwrap()
            .with_dirs([PathBuf::from("/p/target/classes")]);
        assert!(set.is_excluded(Path::new("/p/target/classes")));
        assert!(set.is_excluded(Path::new("/p/target/classes/io/A.class")));
        assert!(!set.is_excluded(Path::new("/p/target/classes-old/A.class")));
        assert!(!set.is_excluded(Path::new("/p/src/A.java")));
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        assert!(ExcludeSet::new("/p", &["a[".to_string()]).is_err());
    }
}
