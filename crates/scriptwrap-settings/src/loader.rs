//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`EngineSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `SCRIPTWRAP_*` environment variable overrides
//! 4. [`EngineSettings::validate`]
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{EngineSettings, MAX_CALL_DEPTH_LIMIT};

/// Environment variable naming an explicit settings file.
pub const SETTINGS_PATH_ENV: &str = "SCRIPTWRAP_SETTINGS";

/// Resolve the settings file path.
///
/// `$SCRIPTWRAP_SETTINGS` when set, else `~/.scriptwrap/settings.json`.
pub fn settings_path() -> PathBuf {
    if let Some(path) = std::env::var_os(SETTINGS_PATH_ENV).filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".scriptwrap").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<EngineSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<EngineSettings> {
    let defaults = serde_json::to_value(EngineSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: EngineSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate();
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `SCRIPTWRAP_*` environment overrides.
pub fn apply_env_overrides(settings: &mut EngineSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`. Invalid values are logged and
/// ignored.
pub fn apply_overrides(settings: &mut EngineSettings, lookup: impl Fn(&str) -> Option<String>) {
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = read("SCRIPTWRAP_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read("SCRIPTWRAP_LOG_BINDINGS") {
        match parse_bool(&v) {
            Some(b) => settings.logging.log_bindings = b,
            None => tracing::warn!(key = "SCRIPTWRAP_LOG_BINDINGS", value = %v, "invalid boolean env var, ignoring"),
        }
    }
    if let Some(v) = read("SCRIPTWRAP_LOG_JSON") {
        match parse_bool(&v) {
            Some(b) => settings.logging.json = b,
            None => tracing::warn!(key = "SCRIPTWRAP_LOG_JSON", value = %v, "invalid boolean env var, ignoring"),
        }
    }
    if let Some(v) = read("SCRIPTWRAP_MAX_CALL_DEPTH") {
        match parse_usize_range(&v, 1, MAX_CALL_DEPTH_LIMIT) {
            Some(n) => settings.script.max_call_depth = n,
            None => tracing::warn!(key = "SCRIPTWRAP_MAX_CALL_DEPTH", value = %v, "invalid usize env var, ignoring"),
        }
    }
    if let Some(v) = read("SCRIPTWRAP_UNIT_PREFIX") {
        settings.script.unit_name_prefix = v;
    }
}

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `usize` within `min..=max`.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}
