//! Turning source text into runnable units.
//!
//! The engine is a trait seam: [`ScriptEngine`] compiles named units and
//! keeps a table of what it has loaded, [`CompiledScript`] is the immutable
//! shared artifact, and [`RunnableScript`] is the per-call instance created
//! from it. [`InterpretedEngine`] implements all three on top of
//! `scriptwrap-lang`.
//!
//! Units are released through [`UnitHandle`]: dropping the last handle
//! unloads the unit from its engine. Hooks keep their installed handle behind
//! an `Arc`, so a unit outlives any reconfiguration for as long as an
//! in-flight run still holds it.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use scriptwrap_lang::{Bindings, CompileError, Interpreter, Program, RunOptions, RuntimeError, Value};
use scriptwrap_settings::EngineSettings;
use tracing::{debug, warn};

use crate::errors::CleanupError;

/// Compiles and unloads named script units.
pub trait ScriptEngine: Send + Sync + fmt::Debug {
    /// Compile `source` into a unit registered under `name`.
    fn compile(&self, name: &str, source: &str) -> Result<Arc<dyn CompiledScript>, CompileError>;

    /// Release the unit registered under `name`.
    fn unload(&self, name: &str) -> Result<(), CleanupError>;

    /// Names of currently loaded units, sorted.
    fn loaded_units(&self) -> Vec<String>;
}

/// An immutable compiled unit. Safe to share between concurrent runs.
pub trait CompiledScript: Send + Sync + fmt::Debug {
    /// Unit name given at compile time.
    fn name(&self) -> &str;

    /// Create a fresh runnable instance with its own local state.
    fn instantiate(&self) -> Box<dyn RunnableScript>;
}

/// One runnable instance of a compiled unit.
pub trait RunnableScript: Send {
    /// Run to completion against `bindings`, returning the script's value.
    fn run(&mut self, bindings: &mut Bindings) -> Result<Value, RuntimeError>;
}

/// [`ScriptEngine`] backed by the `scriptwrap-lang` interpreter.
#[derive(Debug, Default)]
pub struct InterpretedEngine {
    options: RunOptions,
    loaded: Mutex<BTreeSet<String>>,
}

impl InterpretedEngine {
    /// Create an engine whose units run with `options`.
    pub fn new(options: RunOptions) -> Self {
        Self {
            options,
            loaded: Mutex::new(BTreeSet::new()),
        }
    }

    /// Create an engine configured from `settings`.
    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self::new(RunOptions {
            max_call_depth: settings.script.max_call_depth,
            ..RunOptions::default()
        })
    }

    /// The process-wide engine, configured from the global settings on first
    /// use.
    pub fn shared() -> Arc<dyn ScriptEngine> {
        static SHARED: OnceLock<Arc<InterpretedEngine>> = OnceLock::new();
        let engine = SHARED.get_or_init(|| {
            Arc::new(Self::from_settings(&scriptwrap_settings::get_settings()))
        });
        Arc::clone(engine) as Arc<dyn ScriptEngine>
    }
}

impl ScriptEngine for InterpretedEngine {
    fn compile(&self, name: &str, source: &str) -> Result<Arc<dyn CompiledScript>, CompileError> {
        let program = scriptwrap_lang::compile(name, source)?;
        debug!(
            unit = name,
            statements = program.statement_count(),
            functions = program.function_names().len(),
            "compiled script unit"
        );
        if !self.loaded.lock().insert(name.to_string()) {
            warn!(unit = name, "unit name already loaded, replacing");
        }
        Ok(Arc::new(InterpretedUnit {
            name: name.to_string(),
            program: Arc::new(program),
            options: self.options,
        }))
    }

    fn unload(&self, name: &str) -> Result<(), CleanupError> {
        if self.loaded.lock().remove(name) {
            Ok(())
        } else {
            Err(CleanupError {
                unit: name.to_string(),
                message: "unit is not loaded".to_string(),
            })
        }
    }

    fn loaded_units(&self) -> Vec<String> {
        self.loaded.lock().iter().cloned().collect()
    }
}

#[derive(Debug)]
struct InterpretedUnit {
    name: String,
    program: Arc<Program>,
    options: RunOptions,
}

impl CompiledScript for InterpretedUnit {
    fn name(&self) -> &str {
        &self.name
    }

    fn instantiate(&self) -> Box<dyn RunnableScript> {
        Box::new(InterpretedRun(Interpreter::new(
            Arc::clone(&self.program),
            self.options,
        )))
    }
}

struct InterpretedRun(Interpreter);

impl RunnableScript for InterpretedRun {
    fn run(&mut self, bindings: &mut Bindings) -> Result<Value, RuntimeError> {
        self.0.run(bindings)
    }
}

/// Owning handle to an installed unit.
///
/// Unloads the unit from its engine on drop. An unload failure is logged as
/// a cleanup warning and otherwise ignored.
pub struct UnitHandle {
    unit: Arc<dyn CompiledScript>,
    engine: Arc<dyn ScriptEngine>,
    version: u64,
}

impl UnitHandle {
    /// Compile `source` as `name` on `engine` and take ownership of the
    /// result.
    pub fn compile(
        engine: &Arc<dyn ScriptEngine>,
        name: &str,
        source: &str,
        version: u64,
    ) -> Result<Self, CompileError> {
        let unit = engine.compile(name, source)?;
        Ok(Self {
            unit,
            engine: Arc::clone(engine),
            version,
        })
    }

    /// Unit name.
    pub fn name(&self) -> &str {
        self.unit.name()
    }

    /// Install version of this unit within its hook.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Fresh runnable instance.
    pub fn instantiate(&self) -> Box<dyn RunnableScript> {
        self.unit.instantiate()
    }
}

impl fmt::Debug for UnitHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitHandle")
            .field("name", &self.unit.name())
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl Drop for UnitHandle {
    fn drop(&mut self) {
        match self.engine.unload(self.unit.name()) {
            Ok(()) => debug!(unit = %self.unit.name(), version = self.version, "unloaded script unit"),
            Err(e) => warn!(unit = %self.unit.name(), error = %e, "script unit cleanup failed"),
        }
    }
}

/// Unit name for version `version` of hook `hook_id`.
pub fn unit_name(prefix: &str, hook_id: u64, version: u64) -> String {
    format!("{prefix}_{hook_id}_v{version}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use scriptwrap_core::logging::capture_logs;
    use tracing::Level;

    fn engine() -> Arc<dyn ScriptEngine> {
        Arc::new(InterpretedEngine::default())
    }

    #[test]
    fn compile_registers_unit() {
        let engine = engine();
        let unit = engine.compile("U_1_v1", "1 + 1").unwrap();
        assert_eq!(unit.name(), "U_1_v1");
        assert_eq!(engine.loaded_units(), vec!["U_1_v1".to_string()]);
    }

    #[test]
    fn compile_error_registers_nothing() {
        let engine = engine();
        let err = engine.compile("U_1_v1", "if (").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(engine.loaded_units().is_empty());
    }

    #[test]
    fn instances_do_not_share_state() {
        let engine = engine();
        let unit = engine.compile("U", "let n = 0\nn += 1\nn").unwrap();
        let mut first = unit.instantiate();
        let mut second = unit.instantiate();
        assert_eq!(first.run(&mut Bindings::new()).unwrap(), Value::Int(1));
        assert_eq!(second.run(&mut Bindings::new()).unwrap(), Value::Int(1));
        assert_eq!(first.run(&mut Bindings::new()).unwrap(), Value::Int(1));
    }

    #[test]
    fn unload_unknown_unit_fails() {
        let engine = engine();
        assert_matches!(engine.unload("missing"), Err(CleanupError { unit, .. }) if unit == "missing");
    }

    #[test]
    fn handle_drop_unloads() {
        let engine = engine();
        let handle = UnitHandle::compile(&engine, "H_1_v1", "true", 1).unwrap();
        assert_eq!(handle.version(), 1);
        assert_eq!(engine.loaded_units().len(), 1);
        drop(handle);
        assert!(engine.loaded_units().is_empty());
    }

    #[test]
    fn handle_drop_logs_cleanup_failure() {
        let (logs, _guard) = capture_logs();
        let engine = engine();
        let handle = UnitHandle::compile(&engine, "H_1_v1", "true", 1).unwrap();
        engine.unload("H_1_v1").unwrap();
        drop(handle);
        assert!(logs.has_event(Level::WARN, "script unit cleanup failed"));
        let warning = &logs.at_level(Level::WARN)[0];
        assert_eq!(warning.field("unit"), Some("H_1_v1"));
    }

    #[test]
    fn call_depth_comes_from_settings() {
        let mut settings = EngineSettings::default();
        settings.script.max_call_depth = 3;
        let engine = InterpretedEngine::from_settings(&settings);
        let unit = engine
            .compile("deep", "fn down(n) { if (n == 0) { return 0 }\n down(n - 1) }\ndown(10)")
            .unwrap();
        let err = unit.instantiate().run(&mut Bindings::new()).unwrap_err();
        assert_matches!(err, RuntimeError::CallDepth { limit: 3, .. });
    }

    #[test]
    fn deepest_configurable_recursion_fails_cleanly_on_a_small_thread() {
        let mut settings = EngineSettings::default();
        settings.script.max_call_depth = scriptwrap_settings::MAX_CALL_DEPTH_LIMIT;
        settings.validate();
        assert_eq!(settings.script.max_call_depth, scriptwrap_settings::MAX_CALL_DEPTH_LIMIT);

        let engine = InterpretedEngine::from_settings(&settings);
        let unit = engine.compile("runaway", "fn f(n) { f(n + 1) }\nf(0)").unwrap();
        let err = std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(move || unit.instantiate().run(&mut Bindings::new()))
            .unwrap()
            .join()
            .unwrap()
            .unwrap_err();
        assert_matches!(
            err,
            RuntimeError::CallDepth { .. } | RuntimeError::StackExhausted { .. }
        );
    }

    #[test]
    fn unit_names_are_versioned() {
        assert_eq!(unit_name("ScriptBuildWrapper", 4, 2), "ScriptBuildWrapper_4_v2");
    }
}
