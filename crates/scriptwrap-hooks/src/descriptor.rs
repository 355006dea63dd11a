//! Metadata for configuration forms. No behavior hangs off it.

use serde::Serialize;

use crate::phase::Phase;

/// Name shown for the hook in job configuration.
pub const DISPLAY_NAME: &str = "Script Build Wrapper";

/// One selectable phase filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModeOption {
    /// Persisted value.
    pub value: Phase,
    /// Form label.
    pub label: &'static str,
}

/// Every selectable phase filter, `ALL` last.
pub fn mode_values() -> Vec<ModeOption> {
    Phase::all()
        .iter()
        .map(|&value| ModeOption {
            value,
            label: value.label(),
        })
        .collect()
}

/// Filter preselected for new hooks.
pub fn default_mode() -> Phase {
    Phase::Setup
}

/// Whether `value` should render as selected, given the stored `config`
/// (absent for a new hook) and the form `default`.
pub fn is_selected(value: Phase, config: Option<Phase>, default: Option<Phase>) -> bool {
    match config {
        Some(config) => value == config,
        None => Some(value) == default,
    }
}

/// Hooks can be attached to any project.
pub fn is_applicable(_project: &str) -> bool {
    true
}
