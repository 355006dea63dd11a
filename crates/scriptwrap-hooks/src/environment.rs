//! The per-build environment returned by setup.
//!
//! [`HookEnvironment`] captures the build, launcher and listener given to
//! `set_up` and re-enters the dispatcher for `TEAR_DOWN` and
//! `ENVIRONMENT_VARIABLES`. A `SETUP` script can also return an
//! [`EnvironmentSpec`] (built with `container.environment(vars)`) whose
//! static variables are contributed before the script runs.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use scriptwrap_lang::{Bindings, HostError, HostObject, Value, ValueType};
use tracing::{debug, trace, warn};

use crate::collaborators::{Build, BuildListener, EnvVars, Launcher};
use crate::context;
use crate::dispatch::{Dispatch, HookState};
use crate::errors::HookError;
use crate::facade::{build_input, launcher_input};
use crate::phase::Phase;

/// What the orchestrator calls after setup.
pub trait Environment: Send + Sync + fmt::Debug {
    /// Finish the build. `Ok(false)` reports a failed teardown.
    fn tear_down(
        &self,
        build: &Arc<dyn Build>,
        listener: &Arc<dyn BuildListener>,
    ) -> Result<bool, HookError>;

    /// Add this environment's variables to `env`.
    fn contribute_vars(&self, build: &Arc<dyn Build>, env: &mut EnvVars) -> Result<(), HookError>;
}

/// Environment description produced by a `SETUP` script.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentSpec {
    vars: EnvVars,
}

impl EnvironmentSpec {
    /// Spec contributing `vars`.
    pub fn new(vars: EnvVars) -> Self {
        Self { vars }
    }

    /// Static variables to contribute.
    pub fn vars(&self) -> &EnvVars {
        &self.vars
    }
}

impl HostObject for EnvironmentSpec {
    fn type_name(&self) -> &'static str {
        "Environment"
    }

    fn get_property(&self, name: &str) -> Result<Value, HostError> {
        match name {
            "vars" => Ok(context::vars_value(&self.vars)),
            _ => Err(HostError::no_property(self.type_name(), name)),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The environment handed out by [`ScriptHook::set_up`](crate::ScriptHook::set_up).
///
/// Holds the hook state, so the compiled unit stays loaded until both the
/// hook and every outstanding environment are gone.
pub struct HookEnvironment {
    state: Arc<HookState>,
    build: Arc<dyn Build>,
    launcher: Arc<dyn Launcher>,
    listener: Arc<dyn BuildListener>,
    spec: Option<EnvironmentSpec>,
}

impl HookEnvironment {
    pub(crate) fn new(
        state: Arc<HookState>,
        build: Arc<dyn Build>,
        launcher: Arc<dyn Launcher>,
        listener: Arc<dyn BuildListener>,
        spec: Option<EnvironmentSpec>,
    ) -> Self {
        Self {
            state,
            build,
            launcher,
            listener,
            spec,
        }
    }

    /// Whether the setup script produced this environment.
    pub fn is_script_provided(&self) -> bool {
        self.spec.is_some()
    }

    /// The listener captured at setup.
    pub fn listener(&self) -> &Arc<dyn BuildListener> {
        &self.listener
    }

    fn check_build(&self, build: &Arc<dyn Build>) {
        if !Arc::ptr_eq(build, &self.build) && build.display_name() != self.build.display_name() {
            warn!(
                captured = %self.build.display_name(),
                given = %build.display_name(),
                "environment called for a different build, using the captured one"
            );
        }
    }
}

impl Environment for HookEnvironment {
    fn tear_down(
        &self,
        build: &Arc<dyn Build>,
        _listener: &Arc<dyn BuildListener>,
    ) -> Result<bool, HookError> {
        trace!(build = %self.build.display_name(), "tear_down");
        self.check_build(build);

        let inputs = Bindings::from([
            build_input(&self.build),
            launcher_input(&self.launcher),
        ]);
        let dispatch = self
            .state
            .execute(Phase::TearDown, inputs, Some(ValueType::Bool))?;
        Ok(dispatch
            .into_usable()
            .and_then(|value| value.as_bool())
            .unwrap_or(true))
    }

    fn contribute_vars(&self, build: &Arc<dyn Build>, env: &mut EnvVars) -> Result<(), HookError> {
        trace!(build = %self.build.display_name(), "contribute_vars");
        self.check_build(build);

        if let Some(spec) = &self.spec {
            debug!(count = spec.vars.len(), "contributing static environment variables");
            env.extend(spec.vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        let vars = context::vars_value(env);
        let inputs = Bindings::from([build_input(&self.build), ("vars".to_string(), vars.clone())]);
        let outcome = self.state.execute(Phase::EnvironmentVariables, inputs, None);
        if !matches!(outcome, Ok(Dispatch::NotApplicable)) {
            context::write_back(&vars, env);
        }
        outcome.map(|_| ())
    }
}

impl fmt::Debug for HookEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookEnvironment")
            .field("hook", &self.state.id)
            .field("build", &self.build.display_name())
            .field("launcher", &self.launcher.name())
            .field("script_provided", &self.is_script_provided())
            .finish_non_exhaustive()
    }
}
