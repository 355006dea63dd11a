//! # scriptwrap-lang
//!
//! A small, dynamically-typed, Groovy-flavoured language for build hook
//! scripts.
//!
//! ```text
//! fn tag(n) { return "build-${n}" }
//!
//! if (phase == 'BUILD_VARIABLES') {
//!     vars['TAG'] = tag(build.number)
//! }
//! ```
//!
//! - [`compile`] turns source text into an immutable [`Program`]
//! - [`Interpreter`] runs a program against a mutable [`Bindings`] map
//! - [`Value`] is the dynamic value type; lists and maps are shared references
//! - [`HostObject`] is the seam through which embedders expose their own
//!   objects (properties, indexing, methods)

#![deny(unsafe_code)]

mod ast;
mod builtins;
pub mod errors;
mod interpreter;
mod lexer;
mod parser;
pub mod value;

pub use ast::Program;
pub use errors::{CompileError, HostError, RuntimeError};
pub use interpreter::{Bindings, DEFAULT_STACK_BUDGET, Interpreter, RunOptions};
pub use parser::compile;
pub use value::{
    HostObject, ListRef, MapRef, MAX_LIST_LEN, MAX_STRING_LEN, Value, ValueKind, ValueType,
};
