//! Persisted job-definition form.
//!
//! Only the source and the mode survive a reload:
//!
//! ```json
//! { "type": "script-build-wrapper", "source": "...", "mode": "SETUP" }
//! ```
//!
//! Loading recompiles immediately, so a stored script that no longer
//! compiles fails the load instead of the first build.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::compiler::ScriptEngine;
use crate::errors::{ConfigError, HookError};
use crate::facade::ScriptHook;

/// Value of the `type` tag.
pub const HOOK_TYPE: &str = "script-build-wrapper";

/// Serialized hook configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedHook {
    /// Always [`HOOK_TYPE`].
    #[serde(rename = "type")]
    pub kind: String,
    /// Script source.
    pub source: String,
    /// Phase filter name, validated on load.
    pub mode: String,
}

impl PersistedHook {
    /// Persisted form of `source` filtered by `mode`.
    pub fn new(source: impl Into<String>, mode: impl Into<String>) -> Self {
        Self {
            kind: HOOK_TYPE.to_string(),
            source: source.into(),
            mode: mode.into(),
        }
    }
}

impl ScriptHook {
    /// Rebuild a hook from its persisted form on `engine`.
    pub fn from_persisted(
        engine: Arc<dyn ScriptEngine>,
        persisted: &PersistedHook,
    ) -> Result<Self, HookError> {
        if persisted.kind != HOOK_TYPE {
            return Err(ConfigError::Persisted(format!(
                "unexpected type '{}', expected '{HOOK_TYPE}'",
                persisted.kind
            ))
            .into());
        }
        Self::with_engine(engine, &persisted.source, &persisted.mode)
    }

    /// The persisted form of the current configuration.
    pub fn to_persisted(&self) -> PersistedHook {
        PersistedHook::new(self.source().as_ref(), self.mode().as_str())
    }
}

/// Parse and compile a hook from JSON.
pub fn load_hook_json(engine: Arc<dyn ScriptEngine>, json: &str) -> Result<ScriptHook, HookError> {
    let persisted: PersistedHook =
        serde_json::from_str(json).map_err(|e| ConfigError::Persisted(e.to_string()))?;
    ScriptHook::from_persisted(engine, &persisted)
}

/// Serialize a hook to pretty-printed JSON.
pub fn save_hook_json(hook: &ScriptHook) -> Result<String, HookError> {
    serde_json::to_string_pretty(&hook.to_persisted())
        .map_err(|e| ConfigError::Persisted(e.to_string()).into())
}
