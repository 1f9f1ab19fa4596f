// src/fs/mod.rs

//! Small filesystem helpers shared by build roots and build steps.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::SystemTime;

use anyhow::Context;

use crate::errors::Result;

pub mod exclude;
pub mod timestamps;

pub use exclude::ExcludeSet;
pub use timestamps::FileTimestampIndex;

/// Last-modified time of a file.
pub fn modified(path: &Path) -> Result<SystemTime> {
    let meta = fs::metadata(path).with_context(|| format!("reading metadata of {:?}", path))?;
    let time = meta
        .modified()
        .with_context(|| format!("reading mtime of {:?}", path))?;
    Ok(time)
}

/// Copy `src` to `dst` byte-for-byte, creating missing parent directories.
pub fn copy_file(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating dir {:?}", parent))?;
    }
    fs::copy(src, dst).with_context(|| format!("copying {:?} to {:?}", src, dst))?;
    Ok(())
}

/// Remove a file, treating an already-absent file as success.
///
/// Returns whether a file was actually removed.
pub fn remove_file_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(anyhow::Error::new(e)
            .context(format!("removing file {:?}", path))
            .into()),
    }
}

/// Remove everything inside `dir` but keep the directory itself.
///
/// A missing directory is created empty.
pub fn clean_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        for entry in fs::read_dir(dir).with_context(|| format!("reading dir {:?}", dir))? {
            let path = entry?.path();
            if path.is_dir() {
                fs::remove_dir_all(&path).with_context(|| format!("removing dir {:?}", path))?;
            } else {
                fs::remove_file(&path).with_context(|| format!("removing file {:?}", path))?;
            }
        }
    } else {
        fs::create_dir_all(dir).with_context(|| format!("creating dir {:?}", dir))?;
    }
    Ok(())
}

/// Hidden entries start with a dot (`.git`, `.devloop`, ...).
pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.') && n != "." && n != "..")
}
