// src/errors.rs

//! Crate-wide error aliases and helpers.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DevLoopError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Not a directory: {0:?}")]
    NotADirectory(PathBuf),

    #[error("Directory walk error: {0}")]
    WalkError(#[from] walkdir::Error),

    #[error("Compilation failed with {errors} error(s)")]
    CompilationFailed { errors: usize },

    #[error("Build failed: {0}")]
    BuildFailed(String),

    #[error("Process {pid} still alive after {attempts} stop attempts")]
    ProcessStop { pid: u32, attempts: u32 },

    #[error("Build loop did not stop within {0:?}")]
    StopTimeout(Duration),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DevLoopError>;
