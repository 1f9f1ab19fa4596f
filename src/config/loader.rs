// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Read and deserialize a config file without semantic validation.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    parse_str(&contents)
}

pub fn parse_str(contents: &str) -> Result<RawConfigFile> {
    let config: RawConfigFile = toml::from_str(contents)?;
    Ok(config)
}

/// Load, validate, and anchor a config file at its parent directory.
///
/// The returned configuration tracks `path` itself as a build descriptor.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let raw_config = load_from_path(path)?;
    let config = ConfigFile::try_from(raw_config)?;

    let source = fs::canonicalize(path)?;
    let root_dir = config_root_dir(&source);
    Ok(config.with_source(root_dir, source))
}

/// `Devloop.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Devloop.toml")
}

/// Directory the config's relative paths are anchored at.
pub fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::ComponentKind;
    use crate::errors::DevLoopError;
    use std::time::Duration;

    const MINIMAL: &str = r#"
[project]
name = "quickstart"
build_files = ["pom.xml"]
main_class = "io.example.Main"
dependencies = ["lib"]

[[component]]
kind = "compile"
source = "src/main/java"
output = "target/classes"
"#;

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = ConfigFile::try_from(parse_str(MINIMAL).unwrap()).unwrap();
        assert_eq!(cfg.project.name, "quickstart");
        assert_eq!(cfg.components[0].kind, ComponentKind::Compile);
        assert_eq!(cfg.build.javac, "javac");
        assert!(cfg.build.command.is_none());
        assert_eq!(cfg.loop_.poll_interval, Duration::from_millis(200));
        assert_eq!(cfg.loop_.max_build_failures, 3);
        assert_eq!(cfg.loop_.max_incremental_failures, 10);
        assert_eq!(cfg.loop_.max_app_failures, 3);
        assert_eq!(cfg.executor.graceful_retries, 3);
    }

    #[test]
    fn zero_budget_is_rejected() {
        let text = format!("{MINIMAL}\n[loop]\nmax_app_failures = 0\n");
        let err = ConfigFile::try_from(parse_str(&text).unwrap()).unwrap_err();
        assert!(matches!(err, DevLoopError::ConfigError(msg) if msg.contains("max_app_failures")));
    }

    #[test]
    fn unknown_component_kind_fails_to_parse() {
        let text = MINIMAL.replace("kind = \"compile\"", "kind = \"link\"");
        assert!(matches!(parse_str(&text), Err(DevLoopError::TomlError(_))));
    }

    #[test]
    fn config_file_is_a_build_file_and_paths_are_anchored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Devloop.toml");
        fs::write(&path, MINIMAL).unwrap();

        let cfg = load_and_validate(&path).unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        assert_eq!(cfg.root_dir, root);
        assert_eq!(
            cfg.build_file_paths(),
            vec![root.join("pom.xml"), root.join("Devloop.toml")]
        );
        assert_eq!(cfg.dependency_paths(), vec![root.join("lib")]);
        assert_eq!(cfg.output_dirs(), vec![root.join("target/classes")]);
    }

    #[test]
    fn root_dir_of_bare_file_name_is_cwd() {
        assert_eq!(config_root_dir(Path::new("Devloop.toml")), PathBuf::from("."));
    }
}
