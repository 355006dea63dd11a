//! Hook error types.

use scriptwrap_lang::{CompileError, RuntimeError};
use thiserror::Error;

use crate::phase::Phase;

/// Errors surfaced by the hook engine.
///
/// Configuration and compile errors happen at construction or reload and
/// leave no hook behind. Execution errors are fatal to one facade call only.
#[derive(Debug, Error)]
pub enum HookError {
    /// The hook configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The script source does not compile.
    #[error("script does not compile: {0}")]
    Compile(#[from] CompileError),

    /// The script raised while running.
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

/// Invalid hook configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The mode string is not a known [`Phase`] name.
    #[error("unknown phase '{0}'")]
    UnknownPhase(String),

    /// The script source is empty or whitespace.
    #[error("script source is empty")]
    EmptySource,

    /// A caller requested execution for the `ALL` wildcard.
    #[error("phase ALL is a filter, not an execution phase")]
    WildcardRequested,

    /// The persisted form could not be read or written.
    #[error("invalid persisted hook: {0}")]
    Persisted(String),
}

/// A script run failed.
#[derive(Debug, Error)]
#[error("script execution failed in phase {phase}: {source}")]
pub struct ExecutionError {
    /// Phase that was executing.
    pub phase: Phase,
    /// The underlying runtime failure.
    pub source: RuntimeError,
}

/// Releasing a compiled unit failed. Logged, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to unload '{unit}': {message}")]
pub struct CleanupError {
    /// Name of the unit being released.
    pub unit: String,
    /// Reason reported by the engine.
    pub message: String,
}

impl HookError {
    /// The phase of an execution error, if this is one.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Self::Execution(e) => Some(e.phase),
            _ => None,
        }
    }
}
