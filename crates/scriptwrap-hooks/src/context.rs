//! Execution context assembly.
//!
//! Every script run gets a fresh [`Bindings`] map built here: the phase
//! inputs supplied by the facade plus two implicit entries, `phase` (the
//! active phase name) and `container` (a read-only [`ContainerView`] of the
//! hook configuration).

use std::any::Any;
use std::sync::Arc;

use scriptwrap_lang::{Bindings, HostError, HostObject, Value};

use crate::collaborators::EnvVars;
use crate::environment::EnvironmentSpec;
use crate::phase::Phase;

/// Binding name of the active phase.
pub const PHASE_BINDING: &str = "phase";

/// Binding name of the hook's own configuration.
pub const CONTAINER_BINDING: &str = "container";

/// Read-only snapshot of the hook configuration a run belongs to.
#[derive(Debug, Clone)]
pub struct ContainerView {
    source: Arc<str>,
    mode: Phase,
    version: u64,
    unit: String,
}

impl ContainerView {
    pub(crate) fn new(source: Arc<str>, mode: Phase, version: u64, unit: impl Into<String>) -> Self {
        Self {
            source,
            mode,
            version,
            unit: unit.into(),
        }
    }

    /// The configured phase filter.
    pub fn mode(&self) -> Phase {
        self.mode
    }

    /// Name of the compiled unit executing.
    pub fn unit(&self) -> &str {
        &self.unit
    }
}

impl HostObject for ContainerView {
    fn type_name(&self) -> &'static str {
        "Container"
    }

    fn get_property(&self, name: &str) -> Result<Value, HostError> {
        match name {
            "source" => Ok(Value::Str(Arc::clone(&self.source))),
            "mode" => Ok(Value::from(self.mode.as_str())),
            "version" => i64::try_from(self.version)
                .map(Value::Int)
                .map_err(|_| HostError::new("version out of range")),
            "unit" => Ok(Value::from(self.unit.as_str())),
            _ => Err(HostError::no_property(self.type_name(), name)),
        }
    }

    fn call_method(&self, name: &str, args: Vec<Value>) -> Result<Value, HostError> {
        match (name, args.as_slice()) {
            ("environment", []) => Ok(Value::object(EnvironmentSpec::default())),
            ("environment", [Value::Map(entries)]) => {
                let vars = entries
                    .lock()
                    .iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| (k.clone(), v.to_string()))
                    .collect();
                Ok(Value::object(EnvironmentSpec::new(vars)))
            }
            ("environment", _) => Err(HostError::bad_args(self.type_name(), name, "() or (map)")),
            _ => Err(HostError::no_method(self.type_name(), name)),
        }
    }

    fn describe(&self) -> String {
        format!("{}[mode={}]", self.unit, self.mode)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Assemble the bindings for one run of `phase`.
///
/// The implicit entries win over inputs of the same name.
pub fn build_context(phase: Phase, inputs: Bindings, container: ContainerView) -> Bindings {
    let mut bindings = inputs;
    let _ = bindings.insert(PHASE_BINDING.to_string(), Value::from(phase.as_str()));
    let _ = bindings.insert(CONTAINER_BINDING.to_string(), Value::object(container));
    bindings
}

/// Script-side copy of an environment variable map.
pub(crate) fn vars_value(vars: &EnvVars) -> Value {
    Value::map(
        vars.iter()
            .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
            .collect(),
    )
}

/// Copy a script-mutated map back into `vars`.
///
/// Non-string values are stored in their rendered form; `null` removes the
/// key.
pub(crate) fn write_back(value: &Value, vars: &mut EnvVars) {
    if let Value::Map(entries) = value {
        *vars = entries
            .lock()
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn view() -> ContainerView {
        ContainerView::new(Arc::from("true"), Phase::All, 3, "ScriptBuildWrapper_1_v3")
    }

    #[test]
    fn implicit_entries_are_added() {
        let inputs = Bindings::from([("build".to_string(), Value::Int(1))]);
        let bindings = build_context(Phase::TearDown, inputs, view());
        assert_eq!(bindings["phase"], Value::from("TEAR_DOWN"));
        assert_eq!(bindings["build"], Value::Int(1));
        assert!(bindings["container"].downcast_ref::<ContainerView>().is_some());
    }

    #[test]
    fn implicit_entries_override_inputs() {
        let inputs = Bindings::from([("phase".to_string(), Value::from("bogus"))]);
        let bindings = build_context(Phase::Setup, inputs, view());
        assert_eq!(bindings["phase"], Value::from("SETUP"));
    }

    #[test]
    fn container_is_read_only() {
        let view = view();
        assert_eq!(view.get_property("mode").unwrap(), Value::from("ALL"));
        assert_eq!(view.get_property("version").unwrap(), Value::Int(3));
        assert_eq!(view.get_property("source").unwrap(), Value::from("true"));
        assert!(view.set_property("source", Value::from("x")).is_err());
    }

    #[test]
    fn container_builds_environments() {
        let vars = Value::map(BTreeMap::from([
            ("A".to_string(), Value::Int(1)),
            ("B".to_string(), Value::Null),
        ]));
        let env = view().call_method("environment", vec![vars]).unwrap();
        let spec = env.downcast_ref::<EnvironmentSpec>().unwrap();
        assert_eq!(spec.vars(), &EnvVars::from([("A".to_string(), "1".to_string())]));
        assert!(view().call_method("environment", vec![Value::Int(1)]).is_err());
    }

    #[test]
    fn write_back_stringifies_and_drops_nulls() {
        let original = EnvVars::from([("KEEP".to_string(), "1".to_string())]);
        let value = vars_value(&original);
        if let Value::Map(entries) = &value {
            let mut entries = entries.lock();
            let _ = entries.insert("N".to_string(), Value::Int(5));
            let _ = entries.insert("KEEP".to_string(), Value::Null);
        }
        let mut vars = original;
        write_back(&value, &mut vars);
        assert_eq!(vars, EnvVars::from([("N".to_string(), "5".to_string())]));
    }
}
