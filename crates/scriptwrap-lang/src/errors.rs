//! Error types for compiling and running scripts.

use thiserror::Error;

/// A script failed to compile.
///
/// Carries the 1-based position of the offending token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at line {line}, column {column}")]
pub struct CompileError {
    /// 1-based line.
    pub line: usize,
    /// 1-based column.
    pub column: usize,
    /// What went wrong.
    pub message: String,
}

impl CompileError {
    pub(crate) fn new(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
        }
    }
}

/// A script failed while running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// Evaluation failed (type error, unknown name, host failure, ...).
    #[error("{message} (line {line})")]
    Eval {
        /// Description of the failure.
        message: String,
        /// Line of the failing expression.
        line: usize,
    },

    /// The script raised an error itself with `throw` or `fail(...)`.
    #[error("script raised: {message} (line {line})")]
    Raised {
        /// Rendered thrown value.
        message: String,
        /// Line of the `throw`.
        line: usize,
    },

    /// Recursion went deeper than the configured limit.
    #[error("maximum call depth of {limit} exceeded (line {line})")]
    CallDepth {
        /// Configured limit.
        limit: usize,
        /// Line of the call that overflowed.
        line: usize,
    },

    /// Recursion used up the native stack allotted to one run before
    /// reaching the configured call depth.
    #[error("script recursion exhausted the stack at call depth {depth} (line {line})")]
    StackExhausted {
        /// Call depth reached.
        depth: usize,
        /// Line of the call that was refused.
        line: usize,
    },
}

impl RuntimeError {
    pub(crate) fn eval(line: usize, message: impl Into<String>) -> Self {
        Self::Eval {
            message: message.into(),
            line,
        }
    }

    /// Line the error was raised on.
    pub fn line(&self) -> usize {
        match self {
            Self::Eval { line, .. }
            | Self::Raised { line, .. }
            | Self::CallDepth { line, .. }
            | Self::StackExhausted { line, .. } => *line,
        }
    }
}

/// Failure reported by a [`HostObject`](crate::value::HostObject).
///
/// The interpreter attaches the script line and turns it into
/// [`RuntimeError::Eval`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HostError(pub String);

impl HostError {
    /// Arbitrary host failure.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    /// Unknown property on a host type.
    pub fn no_property(type_name: &str, name: &str) -> Self {
        Self(format!("{type_name} has no property '{name}'"))
    }

    /// Assignment to a property the host does not allow writing.
    pub fn read_only(type_name: &str, name: &str) -> Self {
        Self(format!("property '{name}' of {type_name} is read-only"))
    }

    /// Unknown method on a host type.
    pub fn no_method(type_name: &str, name: &str) -> Self {
        Self(format!("{type_name} has no method '{name}'"))
    }

    /// Wrong argument count or types.
    pub fn bad_args(type_name: &str, method: &str, expected: &str) -> Self {
        Self(format!("{type_name}.{method} expects {expected}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_error_display_includes_location() {
        let err = CompileError::new(3, 14, "expected ')'");
        assert_eq!(err.to_string(), "expected ')' at line 3, column 14");
    }

    #[test]
    fn runtime_error_line() {
        assert_eq!(RuntimeError::eval(7, "boom").line(), 7);
        let raised = RuntimeError::Raised {
            message: "nope".into(),
            line: 2,
        };
        assert_eq!(raised.line(), 2);
        assert_eq!(raised.to_string(), "script raised: nope (line 2)");
    }

    #[test]
    fn host_error_helpers() {
        assert_eq!(
            HostError::no_property("Build", "foo").to_string(),
            "Build has no property 'foo'"
        );
        assert_eq!(
            HostError::no_method("Launcher", "bar").to_string(),
            "Launcher has no method 'bar'"
        );
        assert!(
            HostError::bad_args("Map", "put", "(key, value)")
                .to_string()
                .contains("Map.put")
        );
    }
}
