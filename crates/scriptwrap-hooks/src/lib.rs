//! # scriptwrap-hooks
//!
//! Script hook engine for build jobs.
//!
//! A job carries one block of script text and a [`Phase`] filter. The
//! orchestrator calls the [`ScriptHook`] entry points at each lifecycle
//! point; the script runs when the filter covers that phase, and every entry
//! point falls back to a default when the script produces nothing usable.
//!
//! ## Execution Model
//!
//! - **Compile once**: source is compiled eagerly at construction and on
//!   every reload. The installed unit is swapped atomically; the previous one
//!   is unloaded when its last in-flight run finishes.
//! - **Fresh state per call**: each call builds a new binding map and a new
//!   runnable instance, so concurrent builds never share script locals.
//! - **Soft result typing**: a result of the wrong type is logged as a
//!   warning and handed back with `type_matched = false`; the entry point
//!   then uses its default.
//! - **Fail-closed on script errors**: a script that raises fails the call
//!   with [`ExecutionError`] carrying the phase.
//!
//! ## Bindings
//!
//! Every run sees `phase` and `container` plus the phase inputs:
//!
//! | phase | inputs | expected result |
//! |---|---|---|
//! | `SETUP` | `build`, `launcher`, `listener` | `Environment` |
//! | `TEAR_DOWN` | `build`, `launcher` | bool |
//! | `DECORATE_LAUNCHER` | `build`, `launcher`, `listener` | `Launcher` |
//! | `DECORATE_LOGGER` | `build`, `logger` | `Logger` |
//! | `BUILD_VARIABLES` | `build`, `vars` | none |
//! | `ENVIRONMENT_VARIABLES` | `build`, `vars` | none |

#![deny(unsafe_code)]

pub mod collaborators;
pub mod compiler;
pub mod context;
pub mod descriptor;
pub mod dispatch;
pub mod environment;
pub mod errors;
pub mod facade;
pub mod local;
pub mod persistence;
pub mod phase;

pub use collaborators::{Build, BuildListener, EnvVars, Launcher, LogSink};
pub use compiler::{CompiledScript, InterpretedEngine, RunnableScript, ScriptEngine, UnitHandle};
pub use dispatch::{Dispatch, ScriptResult};
pub use environment::{Environment, EnvironmentSpec, HookEnvironment};
pub use errors::{CleanupError, ConfigError, ExecutionError, HookError};
pub use facade::ScriptHook;
pub use persistence::{PersistedHook, load_hook_json, save_hook_json};
pub use phase::Phase;
