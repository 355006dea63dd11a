//! Orchestrator collaborators and their script-visible wrappers.
//!
//! The orchestrator hands the hook a build, a launcher, a listener and log
//! sinks as trait objects. Scripts see them through the host-object
//! wrappers defined here:
//!
//! | binding | type name | surface |
//! |---|---|---|
//! | `build` | `Build` | `number`, `project`, `name`, `workspace` |
//! | `launcher` | `Launcher` | `name`, `decorate_by_prefix(args)`, `prepare(cmd)` |
//! | `listener` | `BuildListener` | `logger`, `log(msg)`, `error(msg)` |
//! | `logger` | `Logger` | `println(msg)`, `with_prefix(p)` |

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;

use scriptwrap_lang::{HostError, HostObject, Value};

use crate::local::{PrefixedLauncher, PrefixedSink};

/// Environment variables exchanged with the orchestrator.
pub type EnvVars = BTreeMap<String, String>;

/// The build being executed.
pub trait Build: Send + Sync + fmt::Debug {
    /// Owning project (job) name.
    fn project(&self) -> &str;

    /// Build number within the project.
    fn number(&self) -> u64;

    /// Display name, `project #number` by default.
    fn display_name(&self) -> String {
        format!("{} #{}", self.project(), self.number())
    }

    /// Workspace directory, when one is allocated.
    fn workspace(&self) -> Option<&Path> {
        None
    }
}

/// Starts build step processes.
pub trait Launcher: Send + Sync + fmt::Debug {
    /// Short description used in logs.
    fn name(&self) -> String;

    /// The command line this launcher would execute for `command`.
    fn prepare(&self, command: Vec<String>) -> Vec<String>;
}

/// A line-oriented log output.
pub trait LogSink: Send + Sync + fmt::Debug {
    /// Write one line.
    fn write_line(&self, line: &str) -> io::Result<()>;
}

/// Receives build progress and owns the build log.
pub trait BuildListener: Send + Sync + fmt::Debug {
    /// The build log.
    fn logger(&self) -> Arc<dyn LogSink>;

    /// Report an error to the build log.
    fn error(&self, message: &str) -> io::Result<()> {
        self.logger().write_line(&format!("ERROR: {message}"))
    }
}

fn text_arg<'a>(type_name: &str, method: &str, args: &'a [Value]) -> Result<&'a str, HostError> {
    match args {
        [Value::Str(s)] => Ok(s),
        _ => Err(HostError::bad_args(type_name, method, "(string)")),
    }
}

fn string_list(type_name: &str, method: &str, args: &[Value]) -> Result<Vec<String>, HostError> {
    match args {
        [Value::List(items)] => Ok(items.lock().iter().map(ToString::to_string).collect()),
        [Value::Str(s)] => Ok(s.split_whitespace().map(str::to_string).collect()),
        _ => Err(HostError::bad_args(type_name, method, "(list) or (string)")),
    }
}

fn io_failure(err: &io::Error) -> HostError {
    HostError::new(format!("log write failed: {err}"))
}

/// Script view of a [`Build`].
#[derive(Debug)]
pub struct BuildObject(pub Arc<dyn Build>);

impl HostObject for BuildObject {
    fn type_name(&self) -> &'static str {
        "Build"
    }

    fn get_property(&self, name: &str) -> Result<Value, HostError> {
        match name {
            "number" => i64::try_from(self.0.number())
                .map(Value::Int)
                .map_err(|_| HostError::new("build number out of range")),
            "project" => Ok(Value::from(self.0.project())),
            "name" => Ok(Value::string(self.0.display_name())),
            "workspace" => Ok(self
                .0
                .workspace()
                .map_or(Value::Null, |p| Value::string(p.display().to_string()))),
            _ => Err(HostError::no_property(self.type_name(), name)),
        }
    }

    fn describe(&self) -> String {
        self.0.display_name()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Script view of a [`Launcher`]. Returning one from a
/// `DECORATE_LAUNCHER` script replaces the build's launcher.
#[derive(Debug)]
pub struct LauncherObject(pub Arc<dyn Launcher>);

impl HostObject for LauncherObject {
    fn type_name(&self) -> &'static str {
        "Launcher"
    }

    fn get_property(&self, name: &str) -> Result<Value, HostError> {
        match name {
            "name" => Ok(Value::string(self.0.name())),
            _ => Err(HostError::no_property(self.type_name(), name)),
        }
    }

    fn call_method(&self, name: &str, args: Vec<Value>) -> Result<Value, HostError> {
        match name {
            "decorate_by_prefix" => {
                let prefix = string_list(self.type_name(), name, &args)?;
                let decorated = PrefixedLauncher::new(Arc::clone(&self.0), prefix);
                Ok(Value::object(LauncherObject(Arc::new(decorated))))
            }
            "prepare" => {
                let command = string_list(self.type_name(), name, &args)?;
                Ok(Value::list(
                    self.0.prepare(command).into_iter().map(Value::string).collect(),
                ))
            }
            _ => Err(HostError::no_method(self.type_name(), name)),
        }
    }

    fn describe(&self) -> String {
        self.0.name()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Script view of a [`BuildListener`].
#[derive(Debug)]
pub struct ListenerObject(pub Arc<dyn BuildListener>);

impl HostObject for ListenerObject {
    fn type_name(&self) -> &'static str {
        "BuildListener"
    }

    fn get_property(&self, name: &str) -> Result<Value, HostError> {
        match name {
            "logger" => Ok(Value::object(LoggerObject(self.0.logger()))),
            _ => Err(HostError::no_property(self.type_name(), name)),
        }
    }

    fn call_method(&self, name: &str, args: Vec<Value>) -> Result<Value, HostError> {
        match name {
            "log" => {
                let message = text_arg(self.type_name(), name, &args)?;
                self.0.logger().write_line(message).map_err(|e| io_failure(&e))?;
                Ok(Value::Null)
            }
            "error" => {
                let message = text_arg(self.type_name(), name, &args)?;
                self.0.error(message).map_err(|e| io_failure(&e))?;
                Ok(Value::Null)
            }
            _ => Err(HostError::no_method(self.type_name(), name)),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Script view of a [`LogSink`]. Returning one from a `DECORATE_LOGGER`
/// script replaces the build log stream.
#[derive(Debug)]
pub struct LoggerObject(pub Arc<dyn LogSink>);

impl HostObject for LoggerObject {
    fn type_name(&self) -> &'static str {
        "Logger"
    }

    fn call_method(&self, name: &str, args: Vec<Value>) -> Result<Value, HostError> {
        match name {
            "println" => {
                let line = match args.as_slice() {
                    [] => String::new(),
                    [value] => value.to_string(),
                    _ => return Err(HostError::bad_args(self.type_name(), name, "() or (value)")),
                };
                self.0.write_line(&line).map_err(|e| io_failure(&e))?;
                Ok(Value::Null)
            }
            "with_prefix" => {
                let prefix = text_arg(self.type_name(), name, &args)?;
                let sink = PrefixedSink::new(Arc::clone(&self.0), prefix);
                Ok(Value::object(LoggerObject(Arc::new(sink))))
            }
            _ => Err(HostError::no_method(self.type_name(), name)),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
