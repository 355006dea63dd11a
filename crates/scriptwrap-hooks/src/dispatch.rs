//! Applicability checks, script runs and result validation.
//!
//! [`HookState`] holds the installed unit behind an atomically swapped
//! `Arc`. [`HookState::execute`] snapshots it once per call, so a run keeps
//! using the unit it started with even if the hook is reconfigured
//! meanwhile.

use std::sync::Arc;

use parking_lot::RwLock;
use scriptwrap_lang::{Bindings, Value, ValueType};
use tracing::{debug, error, instrument, warn};

use crate::compiler::{ScriptEngine, UnitHandle};
use crate::context::{self, ContainerView};
use crate::errors::{ConfigError, ExecutionError, HookError};
use crate::phase::Phase;

/// A script's value, tagged with whether it had the expected type.
#[derive(Debug, Clone)]
pub struct ScriptResult {
    /// What the script produced; may be `null`.
    pub value: Value,
    /// `false` when an expected type was given and a non-null value did
    /// not satisfy it.
    pub type_matched: bool,
}

impl ScriptResult {
    /// The value, if it is non-null and had the expected type.
    pub fn usable(&self) -> Option<&Value> {
        (self.type_matched && !self.value.is_null()).then_some(&self.value)
    }
}

/// Outcome of asking the dispatcher to run a phase.
#[derive(Debug, Clone)]
pub enum Dispatch {
    /// The configured filter does not cover the phase; the script did not run.
    NotApplicable,
    /// The script ran.
    Ran(ScriptResult),
}

impl Dispatch {
    /// Whether the script ran.
    pub fn ran(&self) -> bool {
        matches!(self, Self::Ran(_))
    }

    /// The run's result, if the script ran.
    pub fn result(&self) -> Option<&ScriptResult> {
        match self {
            Self::Ran(result) => Some(result),
            Self::NotApplicable => None,
        }
    }

    /// The non-null, type-matched value, if any.
    pub fn into_usable(self) -> Option<Value> {
        match self {
            Self::Ran(result) if result.usable().is_some() => Some(result.value),
            _ => None,
        }
    }
}

/// One installed configuration: source, filter and compiled unit.
#[derive(Debug)]
pub(crate) struct Installed {
    pub(crate) source: Arc<str>,
    pub(crate) phase: Phase,
    pub(crate) unit: UnitHandle,
}

impl Installed {
    fn container_view(&self) -> ContainerView {
        ContainerView::new(
            Arc::clone(&self.source),
            self.phase,
            self.unit.version(),
            self.unit.name(),
        )
    }
}

/// State shared by a hook and the environments it hands out.
#[derive(Debug)]
pub(crate) struct HookState {
    pub(crate) id: u64,
    pub(crate) unit_prefix: String,
    pub(crate) engine: Arc<dyn ScriptEngine>,
    pub(crate) installed: RwLock<Arc<Installed>>,
    pub(crate) log_bindings: bool,
}

impl HookState {
    /// Consistent view of the current installation.
    pub(crate) fn snapshot(&self) -> Arc<Installed> {
        Arc::clone(&self.installed.read())
    }

    /// Run the script for `phase` if the configured filter covers it.
    #[instrument(skip_all, fields(hook = self.id, phase = %phase))]
    pub(crate) fn execute(
        &self,
        phase: Phase,
        inputs: Bindings,
        expected: Option<ValueType>,
    ) -> Result<Dispatch, HookError> {
        if !phase.is_concrete() {
            return Err(ConfigError::WildcardRequested.into());
        }

        let installed = self.snapshot();
        if !installed.phase.matches(phase) {
            return Ok(Dispatch::NotApplicable);
        }

        let mut bindings = context::build_context(phase, inputs, installed.container_view());
        debug!(unit = %installed.unit.name(), "executing script");
        if self.log_bindings {
            for (name, value) in &bindings {
                debug!(name = %name, kind = %value.kind(), value = ?value, "script binding");
            }
        }

        let mut runnable = installed.unit.instantiate();
        let value = runnable.run(&mut bindings).map_err(|source| {
            error!(unit = %installed.unit.name(), error = %source, "script execution failed");
            ExecutionError { phase, source }
        })?;
        debug!(kind = %value.kind(), "script finished");

        let type_matched = match expected {
            Some(expected) if !value.is_null() => {
                let matched = expected.accepts(&value);
                if !matched {
                    warn!(
                        expected = %expected,
                        actual = %value.kind(),
                        "incompatible result type"
                    );
                }
                matched
            }
            _ => true,
        };

        Ok(Dispatch::Ran(ScriptResult {
            value,
            type_matched,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::InterpretedEngine;
    use assert_matches::assert_matches;
    use scriptwrap_core::logging::capture_logs;
    use tracing::Level;

    fn state(source: &str, phase: Phase) -> HookState {
        let engine: Arc<dyn ScriptEngine> = Arc::new(InterpretedEngine::default());
        let unit = UnitHandle::compile(&engine, "T_1_v1", source, 1).unwrap();
        HookState {
            id: 1,
            unit_prefix: "T".into(),
            engine,
            installed: RwLock::new(Arc::new(Installed {
                source: Arc::from(source),
                phase,
                unit,
            })),
            log_bindings: false,
        }
    }

    #[test]
    fn not_applicable_does_not_run() {
        let (logs, _guard) = capture_logs();
        let state = state("fail('should not run')", Phase::Setup);
        let dispatch = state.execute(Phase::TearDown, Bindings::new(), None).unwrap();
        assert_matches!(dispatch, Dispatch::NotApplicable);
        assert!(!logs.has_message("executing script"));
    }

    #[test]
    fn wildcard_request_is_rejected() {
        let state = state("true", Phase::All);
        let err = state.execute(Phase::All, Bindings::new(), None).unwrap_err();
        assert_matches!(err, HookError::Config(ConfigError::WildcardRequested));
    }

    #[test]
    fn null_result_is_distinct_from_not_applicable() {
        let state = state("null", Phase::All);
        let dispatch = state.execute(Phase::Setup, Bindings::new(), Some(ValueType::Bool)).unwrap();
        assert!(dispatch.ran());
        let result = dispatch.result().unwrap();
        assert!(result.value.is_null());
        assert!(result.type_matched);
        assert!(result.usable().is_none());
    }

    #[test]
    fn scripts_see_phase_and_container() {
        let state = state("\"${phase}:${container.mode}:${container.version}\"", Phase::All);
        let dispatch = state.execute(Phase::BuildVariables, Bindings::new(), None).unwrap();
        assert_eq!(
            dispatch.into_usable(),
            Some(Value::from("BUILD_VARIABLES:ALL:1"))
        );
    }

    #[test]
    fn type_mismatch_warns_and_returns_value() {
        let (logs, _guard) = capture_logs();
        let state = state("'yes'", Phase::TearDown);
        let dispatch = state
            .execute(Phase::TearDown, Bindings::new(), Some(ValueType::Bool))
            .unwrap();
        let result = dispatch.result().unwrap();
        assert_eq!(result.value, Value::from("yes"));
        assert!(!result.type_matched);
        assert!(logs.has_event(Level::WARN, "incompatible result type"));
        let warning = &logs.at_level(Level::WARN)[0];
        assert_eq!(warning.field("expected"), Some("bool"));
        assert_eq!(warning.field("actual"), Some("string"));
    }

    #[test]
    fn run_errors_carry_the_phase() {
        let (logs, _guard) = capture_logs();
        let state = state("let x = 1\nfail('broken')", Phase::All);
        let err = state
            .execute(Phase::DecorateLogger, Bindings::new(), None)
            .unwrap_err();
        assert_matches!(
            err,
            HookError::Execution(ExecutionError { phase: Phase::DecorateLogger, ref source })
                if source.line() == 2
        );
        assert_eq!(logs.count_at_level(Level::ERROR), 1);
    }

    #[test]
    fn bindings_are_logged_when_enabled() {
        let (logs, _guard) = capture_logs();
        let mut state = state("1", Phase::All);
        state.log_bindings = true;
        let inputs = Bindings::from([("answer".to_string(), Value::Int(42))]);
        let _ = state.execute(Phase::Setup, inputs, None).unwrap();

        let bindings: Vec<_> = logs
            .events()
            .into_iter()
            .filter(|e| e.message == "script binding")
            .collect();
        assert_eq!(bindings.len(), 3);
        assert!(bindings.iter().any(|e| e.field("name") == Some("answer")));
    }

    #[test]
    fn every_call_gets_fresh_locals() {
        let state = state("let local = 0\nlocal += 1\nlocal", Phase::All);
        for _ in 0..3 {
            let dispatch = state
                .execute(Phase::Setup, Bindings::new(), Some(ValueType::Int))
                .unwrap();
            assert_eq!(dispatch.into_usable(), Some(Value::Int(1)));
        }
    }
}
