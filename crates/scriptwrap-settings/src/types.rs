//! Settings type definitions.
//!
//! All types use camelCase JSON names and `#[serde(default)]`, so a settings
//! file only needs the fields it changes.

use serde::{Deserialize, Serialize};

/// Largest accepted `script.maxCallDepth`.
///
/// Runs that exhaust their native stack budget first stop earlier with a
/// stack error.
pub const MAX_CALL_DEPTH_LIMIT: usize = 10_000;

/// Root settings for the hook engine.
///
/// ```json
/// {
///   "logging": { "level": "debug", "logBindings": true },
///   "script": { "maxCallDepth": 128 }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    /// Diagnostics output.
    pub logging: LoggingSettings,
    /// Script compilation and execution.
    pub script: ScriptSettings,
}

impl EngineSettings {
    /// Correct out-of-range values, warning about each correction.
    ///
    /// Called automatically during loading.
    pub fn validate(&mut self) {
        let depth = self.script.max_call_depth;
        if !(1..=MAX_CALL_DEPTH_LIMIT).contains(&depth) {
            let clamped = depth.clamp(1, MAX_CALL_DEPTH_LIMIT);
            tracing::warn!("maxCallDepth out of range ({depth}), clamped to {clamped}");
            self.script.max_call_depth = clamped;
        }

        let prefix = &self.script.unit_name_prefix;
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            tracing::warn!(prefix = %prefix, "invalid unitNamePrefix, using default");
            self.script.unit_name_prefix = ScriptSettings::default().unit_name_prefix;
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub level: String,
    /// Log every binding passed to a script at debug level.
    pub log_bindings: bool,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_bindings: false,
            json: false,
        }
    }
}

/// Script compilation and execution settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScriptSettings {
    /// Maximum depth of nested function calls within one script run.
    pub max_call_depth: usize,
    /// Prefix of compiled unit names (`<prefix>_<hookId>_v<version>`).
    pub unit_name_prefix: String,
}

impl Default for ScriptSettings {
    fn default() -> Self {
        Self {
            max_call_depth: 64,
            unit_name_prefix: "ScriptBuildWrapper".to_string(),
        }
    }
}
