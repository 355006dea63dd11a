//! The hook configuration and the entry points the orchestrator calls.
//!
//! A [`ScriptHook`] owns one compiled unit at a time. Construction and every
//! reload compile eagerly and fail without side effects; a successful
//! reload swaps the installed unit atomically and releases the previous one
//! once no run holds it.
//!
//! | entry point | phase | default |
//! |---|---|---|
//! | [`ScriptHook::set_up`] | `SETUP` | default [`HookEnvironment`] |
//! | [`ScriptHook::decorate_launcher`] | `DECORATE_LAUNCHER` | launcher unchanged |
//! | [`ScriptHook::decorate_logger`] | `DECORATE_LOGGER` | logger unchanged |
//! | [`ScriptHook::make_build_variables`] | `BUILD_VARIABLES` | map unchanged |
//! | [`Environment::tear_down`](crate::Environment::tear_down) | `TEAR_DOWN` | `true` |
//! | [`Environment::contribute_vars`](crate::Environment::contribute_vars) | `ENVIRONMENT_VARIABLES` | map unchanged |

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use scriptwrap_lang::{Bindings, Value, ValueType};
use scriptwrap_settings::EngineSettings;
use tracing::{debug, info, trace};

use crate::collaborators::{
    Build, BuildListener, BuildObject, EnvVars, Launcher, LauncherObject, ListenerObject, LogSink,
    LoggerObject,
};
use crate::compiler::{InterpretedEngine, ScriptEngine, UnitHandle, unit_name};
use crate::context;
use crate::dispatch::{Dispatch, HookState, Installed};
use crate::environment::{EnvironmentSpec, HookEnvironment};
use crate::errors::{ConfigError, HookError};
use crate::phase::Phase;

static NEXT_HOOK_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn build_input(build: &Arc<dyn Build>) -> (String, Value) {
    ("build".to_string(), Value::object(BuildObject(Arc::clone(build))))
}

pub(crate) fn launcher_input(launcher: &Arc<dyn Launcher>) -> (String, Value) {
    (
        "launcher".to_string(),
        Value::object(LauncherObject(Arc::clone(launcher))),
    )
}

fn listener_input(listener: &Arc<dyn BuildListener>) -> (String, Value) {
    (
        "listener".to_string(),
        Value::object(ListenerObject(Arc::clone(listener))),
    )
}

/// A script attached to a build job.
pub struct ScriptHook {
    state: Arc<HookState>,
    /// Version the next install gets. Held across compile and swap so
    /// installs happen one at a time, in version order.
    next_version: Mutex<u64>,
}

impl ScriptHook {
    /// Compile `source` for the `mode` filter on the shared engine with the
    /// global settings.
    pub fn new(source: &str, mode: &str) -> Result<Self, HookError> {
        Self::with_engine(InterpretedEngine::shared(), source, mode)
    }

    /// Compile on `engine` with the global settings.
    pub fn with_engine(
        engine: Arc<dyn ScriptEngine>,
        source: &str,
        mode: &str,
    ) -> Result<Self, HookError> {
        Self::with_settings(engine, &scriptwrap_settings::get_settings(), source, mode)
    }

    /// Compile on `engine`, taking the unit prefix and binding logging from
    /// `settings`.
    pub fn with_settings(
        engine: Arc<dyn ScriptEngine>,
        settings: &EngineSettings,
        source: &str,
        mode: &str,
    ) -> Result<Self, HookError> {
        let phase: Phase = mode.parse()?;
        let id = NEXT_HOOK_ID.fetch_add(1, Ordering::Relaxed);
        let prefix = settings.script.unit_name_prefix.clone();
        let installed = install(&engine, &prefix, id, 1, source, phase)?;
        info!(hook = id, mode = %phase, unit = %installed.unit.name(), "script hook configured");

        Ok(Self {
            state: Arc::new(HookState {
                id,
                unit_prefix: prefix,
                engine,
                installed: RwLock::new(Arc::new(installed)),
                log_bindings: settings.logging.log_bindings,
            }),
            next_version: Mutex::new(2),
        })
    }

    /// Process-unique hook id, part of every unit name.
    pub fn id(&self) -> u64 {
        self.state.id
    }

    /// Current script source.
    pub fn source(&self) -> Arc<str> {
        Arc::clone(&self.state.snapshot().source)
    }

    /// Current phase filter.
    pub fn mode(&self) -> Phase {
        self.state.snapshot().phase
    }

    /// Version of the installed unit; 1 after construction.
    pub fn version(&self) -> u64 {
        self.state.snapshot().unit.version()
    }

    /// Name of the installed unit.
    pub fn unit_name(&self) -> String {
        self.state.snapshot().unit.name().to_string()
    }

    /// Replace source and filter.
    ///
    /// On error the current configuration stays installed.
    pub fn reconfigure(&self, source: &str, mode: &str) -> Result<(), HookError> {
        let phase: Phase = mode.parse()?;
        self.replace(source, phase)
    }

    /// Recompile the current source, as a reload from storage does.
    pub fn reload(&self) -> Result<(), HookError> {
        let current = self.state.snapshot();
        let source = Arc::clone(&current.source);
        let phase = current.phase;
        drop(current);
        self.replace(&source, phase)
    }

    fn replace(&self, source: &str, phase: Phase) -> Result<(), HookError> {
        let mut next_version = self.next_version.lock();
        let version = *next_version;
        *next_version += 1;
        let installed = install(
            &self.state.engine,
            &self.state.unit_prefix,
            self.state.id,
            version,
            source,
            phase,
        )?;
        let unit = installed.unit.name().to_string();
        let previous = std::mem::replace(&mut *self.state.installed.write(), Arc::new(installed));
        debug!(
            hook = self.state.id,
            unit = %unit,
            previous = %previous.unit.name(),
            in_flight = Arc::strong_count(&previous) - 1,
            "script hook reinstalled"
        );
        drop(next_version);
        drop(previous);
        Ok(())
    }

    /// Run the script for `phase` directly.
    ///
    /// The facade methods are built on this. Orchestrators that assemble
    /// their own inputs can call it directly.
    pub fn execute(
        &self,
        phase: Phase,
        inputs: Bindings,
        expected: Option<ValueType>,
    ) -> Result<Dispatch, HookError> {
        self.state.execute(phase, inputs, expected)
    }

    /// `SETUP`: produce the environment for this build.
    pub fn set_up(
        &self,
        build: &Arc<dyn Build>,
        launcher: &Arc<dyn Launcher>,
        listener: &Arc<dyn BuildListener>,
    ) -> Result<HookEnvironment, HookError> {
        trace!(build = %build.display_name(), "set_up");
        let inputs = Bindings::from([
            build_input(build),
            launcher_input(launcher),
            listener_input(listener),
        ]);
        let spec = self
            .execute(Phase::Setup, inputs, Some(ValueType::Host("Environment")))?
            .into_usable()
            .and_then(|value| value.downcast_ref::<EnvironmentSpec>().cloned());
        if spec.is_none() {
            debug!("using default environment");
        }
        Ok(HookEnvironment::new(
            Arc::clone(&self.state),
            Arc::clone(build),
            Arc::clone(launcher),
            Arc::clone(listener),
            spec,
        ))
    }

    /// `DECORATE_LAUNCHER`: the launcher to run build steps with.
    pub fn decorate_launcher(
        &self,
        build: &Arc<dyn Build>,
        launcher: &Arc<dyn Launcher>,
        listener: &Arc<dyn BuildListener>,
    ) -> Result<Arc<dyn Launcher>, HookError> {
        trace!(build = %build.display_name(), "decorate_launcher");
        let inputs = Bindings::from([
            build_input(build),
            launcher_input(launcher),
            listener_input(listener),
        ]);
        let decorated = self
            .execute(Phase::DecorateLauncher, inputs, Some(ValueType::Host("Launcher")))?
            .into_usable()
            .and_then(|value| value.downcast_ref::<LauncherObject>().map(|l| Arc::clone(&l.0)));
        Ok(decorated.unwrap_or_else(|| Arc::clone(launcher)))
    }

    /// `DECORATE_LOGGER`: the stream the build log is written to.
    pub fn decorate_logger(
        &self,
        build: &Arc<dyn Build>,
        logger: &Arc<dyn LogSink>,
    ) -> Result<Arc<dyn LogSink>, HookError> {
        trace!(build = %build.display_name(), "decorate_logger");
        let inputs = Bindings::from([
            build_input(build),
            ("logger".to_string(), Value::object(LoggerObject(Arc::clone(logger)))),
        ]);
        let decorated = self
            .execute(Phase::DecorateLogger, inputs, Some(ValueType::Host("Logger")))?
            .into_usable()
            .and_then(|value| value.downcast_ref::<LoggerObject>().map(|l| Arc::clone(&l.0)));
        Ok(decorated.unwrap_or_else(|| Arc::clone(logger)))
    }

    /// `BUILD_VARIABLES`: let the script edit `vars` in place.
    pub fn make_build_variables(
        &self,
        build: &Arc<dyn Build>,
        vars: &mut EnvVars,
    ) -> Result<(), HookError> {
        trace!(build = %build.display_name(), "make_build_variables");
        let map = context::vars_value(vars);
        let inputs = Bindings::from([build_input(build), ("vars".to_string(), map.clone())]);
        let outcome = self.execute(Phase::BuildVariables, inputs, None);
        if !matches!(outcome, Ok(Dispatch::NotApplicable)) {
            context::write_back(&map, vars);
        }
        outcome.map(|_| ())
    }
}

fn install(
    engine: &Arc<dyn ScriptEngine>,
    prefix: &str,
    hook_id: u64,
    version: u64,
    source: &str,
    phase: Phase,
) -> Result<Installed, HookError> {
    if source.trim().is_empty() {
        return Err(ConfigError::EmptySource.into());
    }
    let name = unit_name(prefix, hook_id, version);
    let unit = UnitHandle::compile(engine, &name, source, version)?;
    Ok(Installed {
        source: Arc::from(source),
        phase,
        unit,
    })
}

impl fmt::Debug for ScriptHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let installed = self.state.snapshot();
        f.debug_struct("ScriptHook")
            .field("id", &self.state.id)
            .field("mode", &installed.phase)
            .field("unit", &installed.unit.name())
            .finish_non_exhaustive()
    }
}
