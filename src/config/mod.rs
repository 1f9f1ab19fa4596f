// src/config/mod.rs

//! Configuration loading and validation for devloop.
//!
//! - `model.rs`: the TOML-backed data model.
//! - `loader.rs`: read a config file from disk.
//! - `validate.rs`: `TryFrom<RawConfigFile>` plus duration parsing.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    BuildSection, ComponentConfig, ComponentKind, ConfigFile, ExecutorSection, LoopSection,
    RawConfigFile,
};
pub use validate::parse_duration;
