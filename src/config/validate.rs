// src/config/validate.rs

use std::time::Duration;

use globset::Glob;

use crate::config::model::{ConfigFile, LoopSection, RawConfigFile, RawLoopSection};
use crate::errors::{DevLoopError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::DevLoopError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        let loop_ = validate_loop_section(&raw.loop_)?;
        Ok(ConfigFile::new_unchecked(
            raw.project,
            raw.component,
            raw.build,
            loop_,
            raw.executor,
        ))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_components(cfg)?;
    validate_project_section(cfg)?;
    validate_build_section(cfg)?;
    Ok(())
}

fn ensure_has_components(cfg: &RawConfigFile) -> Result<()> {
    if cfg.component.is_empty() {
        return Err(DevLoopError::ConfigError(
            "config must contain at least one [[component]] section".to_string(),
        ));
    }
    for (idx, component) in cfg.component.iter().enumerate() {
        if component.source.as_os_str().is_empty() || component.output.as_os_str().is_empty() {
            return Err(DevLoopError::ConfigError(format!(
                "[[component]] #{} must set both `source` and `output`",
                idx + 1
            )));
        }
    }
    Ok(())
}

fn validate_project_section(cfg: &RawConfigFile) -> Result<()> {
    let project = &cfg.project;
    if project.name.trim().is_empty() {
        return Err(DevLoopError::ConfigError(
            "[project].name must not be empty".to_string(),
        ));
    }
    if project.main_class.trim().is_empty() {
        return Err(DevLoopError::ConfigError(format!(
            "project '{}' must set [project].main_class",
            project.name
        )));
    }
    if project.build_files.is_empty() {
        return Err(DevLoopError::ConfigError(format!(
            "project '{}' must list at least one entry in [project].build_files",
            project.name
        )));
    }
    if project.dependencies.is_empty() {
        return Err(DevLoopError::ConfigError(format!(
            "project '{}' must list at least one entry in [project].dependencies",
            project.name
        )));
    }
    Ok(())
}

fn validate_build_section(cfg: &RawConfigFile) -> Result<()> {
    let build = &cfg.build;
    if build.command.as_deref().is_some_and(|c| c.trim().is_empty()) {
        return Err(DevLoopError::ConfigError(
            "[build].command must not be empty when set".to_string(),
        ));
    }
    if build.clean_command.is_some() && build.command.is_none() {
        return Err(DevLoopError::ConfigError(
            "[build].clean_command requires [build].command".to_string(),
        ));
    }
    if build.javac.trim().is_empty() || build.java.trim().is_empty() {
        return Err(DevLoopError::ConfigError(
            "[build].javac and [build].java must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_loop_section(raw: &RawLoopSection) -> Result<LoopSection> {
    let poll_interval = parse_duration(&raw.poll_interval).map_err(|e| {
        DevLoopError::ConfigError(format!("[loop].poll_interval: {}", e))
    })?;
    if poll_interval.is_zero() {
        return Err(DevLoopError::ConfigError(
            "[loop].poll_interval must be greater than zero".to_string(),
        ));
    }

    for (key, value) in [
        ("max_build_failures", raw.max_build_failures),
        ("max_incremental_failures", raw.max_incremental_failures),
        ("max_app_failures", raw.max_app_failures),
    ] {
        if value == 0 {
            return Err(DevLoopError::ConfigError(format!(
                "[loop].{} must be >= 1 (got 0)",
                key
            )));
        }
    }

    for pattern in &raw.exclude {
        Glob::new(pattern).map_err(|e| {
            DevLoopError::ConfigError(format!("invalid [loop].exclude glob '{}': {}", pattern, e))
        })?;
    }

    Ok(LoopSection {
        clean: raw.clean,
        poll_interval,
        max_build_failures: raw.max_build_failures,
        max_incremental_failures: raw.max_incremental_failures,
        max_app_failures: raw.max_app_failures,
        exclude: raw.exclude.clone(),
    })
}

/// Parse a simple duration string like `"250ms"`, `"3s"`, `"1m"` or `"2h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}
