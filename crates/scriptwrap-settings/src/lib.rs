//! # scriptwrap-settings
//!
//! Layered settings for the hook engine.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`EngineSettings::default()`]
//! 2. **User file**: `~/.scriptwrap/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `SCRIPTWRAP_*` overrides (highest priority)
//!
//! [`get_settings`] loads once and caches; [`init_settings`] and
//! [`reload_settings_from_path`] swap the cached value.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::*;

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

static SETTINGS: RwLock<Option<Arc<EngineSettings>>> = RwLock::new(None);

/// Get the global settings.
///
/// The first call loads from [`settings_path`] with env overrides, falling
/// back to defaults when loading fails. The returned `Arc` is a consistent
/// snapshot even if another thread reloads meanwhile.
pub fn get_settings() -> Arc<EngineSettings> {
    if let Some(settings) = SETTINGS.read().as_ref() {
        return Arc::clone(settings);
    }

    let mut guard = SETTINGS.write();
    if let Some(settings) = guard.as_ref() {
        return Arc::clone(settings);
    }

    let settings = Arc::new(load_settings().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load settings, using defaults");
        EngineSettings::default()
    }));
    *guard = Some(Arc::clone(&settings));
    settings
}

/// Replace the global settings with `settings`.
pub fn init_settings(settings: EngineSettings) {
    *SETTINGS.write() = Some(Arc::new(settings));
}

/// Reload the global settings from `path`, falling back to defaults when
/// the file cannot be loaded.
pub fn reload_settings_from_path(path: &Path) {
    let new = Arc::new(load_settings_from_path(path).unwrap_or_else(|e| {
        tracing::warn!(error = %e, ?path, "failed to reload settings, falling back to defaults");
        EngineSettings::default()
    }));
    *SETTINGS.write() = Some(new);
    tracing::info!(?path, "settings reloaded from disk");
}

#[cfg(test)]
pub(crate) fn reset_settings() {
    *SETTINGS.write() = None;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tests touching the global must hold this lock.
    static SETTINGS_MUTEX: parking_lot::Mutex<()> = parking_lot::Mutex::new(());

    #[test]
    fn init_settings_sets_custom_value() {
        let _lock = SETTINGS_MUTEX.lock();
        reset_settings();
        let mut custom = EngineSettings::default();
        custom.script.max_call_depth = 7;
        init_settings(custom);
        assert_eq!(get_settings().script.max_call_depth, 7);
        reset_settings();
    }

    #[test]
    fn snapshots_survive_replacement() {
        let _lock = SETTINGS_MUTEX.lock();
        reset_settings();
        init_settings(EngineSettings::default());
        let snapshot = get_settings();

        let mut next = EngineSettings::default();
        next.logging.level = "trace".into();
        init_settings(next);

        assert_eq!(snapshot.logging.level, "info");
        assert_eq!(get_settings().logging.level, "trace");
        reset_settings();
    }

    #[test]
    fn reload_reads_file() {
        let _lock = SETTINGS_MUTEX.lock();
        reset_settings();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"script": {"unitNamePrefix": "Reloaded"}}"#).unwrap();

        reload_settings_from_path(&path);
        assert_eq!(get_settings().script.unit_name_prefix, "Reloaded");

        reload_settings_from_path(Path::new("/nonexistent/settings.json"));
        assert_eq!(get_settings().script.unit_name_prefix, "ScriptBuildWrapper");
        reset_settings();
    }
}
