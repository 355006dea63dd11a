//! Tree-walking evaluator.
//!
//! Name resolution: locals of the current function frame (innermost block
//! first), then the binding context. Assigning to a name that is not a
//! local writes the binding context, which is how scripts hand values back
//! to the embedder.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::trace;

use crate::ast::{
    AssignOp, BinaryOp, Expr, ExprKind, Function, MapKey, Program, Segment, Stmt, StmtKind,
    UnaryOp,
};
use crate::builtins;
use crate::errors::RuntimeError;
use crate::value::{MAX_LIST_LEN, MAX_STRING_LEN, Value};

/// Named variables visible to a script run. Mutations made by the script
/// are visible to the caller after the run.
pub type Bindings = BTreeMap<String, Value>;

/// Limits applied to a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Maximum depth of nested user-function calls.
    pub max_call_depth: usize,
    /// Native stack, in bytes, a run may use below its entry point before
    /// further calls are refused. Keeps deep recursion from overflowing the
    /// host thread's stack whatever `max_call_depth` is.
    pub stack_budget: usize,
}

/// Default [`RunOptions::stack_budget`]: half of the 2 MiB Rust gives
/// spawned threads.
pub const DEFAULT_STACK_BUDGET: usize = 1024 * 1024;

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_call_depth: 64,
            stack_budget: DEFAULT_STACK_BUDGET,
        }
    }
}

/// Approximate address of the caller's stack frame.
#[inline(never)]
fn stack_position() -> usize {
    let marker = 0_u8;
    std::ptr::addr_of!(marker) as usize
}

enum Flow {
    Normal(Value),
    Return(Value),
    Break,
    Continue,
}

type Scope = HashMap<String, Value>;

/// Runs one [`Program`].
///
/// Cheap to create; make a new one per run. An interpreter holds the local
/// variable frames of the run in progress.
pub struct Interpreter {
    program: Arc<Program>,
    options: RunOptions,
    frames: Vec<Vec<Scope>>,
    stack_base: usize,
}

impl Interpreter {
    /// New interpreter for `program`.
    pub fn new(program: Arc<Program>, options: RunOptions) -> Self {
        Self {
            program,
            options,
            frames: Vec::new(),
            stack_base: 0,
        }
    }

    /// Run the program against `bindings`.
    ///
    /// Returns the value of the top-level `return`, or else the value of the
    /// last statement executed.
    pub fn run(&mut self, bindings: &mut Bindings) -> Result<Value, RuntimeError> {
        let program = Arc::clone(&self.program);
        self.frames = vec![vec![Scope::new()]];
        self.stack_base = stack_position();
        trace!(script = %program.name, "run start");
        let flow = self.exec_block(&program.body, bindings);
        self.frames.clear();
        match flow? {
            Flow::Normal(value) | Flow::Return(value) => Ok(value),
            Flow::Break | Flow::Continue => Ok(Value::Null),
        }
    }

    // ── Variables ───────────────────────────────────────────────────────

    fn scopes(&mut self) -> &mut Vec<Scope> {
        if self.frames.is_empty() {
            self.frames.push(vec![Scope::new()]);
        }
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    fn lookup(&mut self, name: &str, bindings: &Bindings, line: usize) -> Result<Value, RuntimeError> {
        for scope in self.scopes().iter().rev() {
            if let Some(value) = scope.get(name) {
                return Ok(value.clone());
            }
        }
        bindings
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::eval(line, format!("undefined variable '{name}'")))
    }

    fn store(&mut self, name: &str, value: Value, bindings: &mut Bindings) {
        for scope in self.scopes().iter_mut().rev() {
            if let Some(slot) = scope.get_mut(name) {
                *slot = value;
                return;
            }
        }
        let _ = bindings.insert(name.to_string(), value);
    }

    fn declare(&mut self, name: &str, value: Value) {
        if let Some(scope) = self.scopes().last_mut() {
            let _ = scope.insert(name.to_string(), value);
        }
    }

    // ── Statements ──────────────────────────────────────────────────────

    fn exec_block(&mut self, stmts: &[Stmt], bindings: &mut Bindings) -> Result<Flow, RuntimeError> {
        let mut last = Value::Null;
        for stmt in stmts {
            match self.exec(stmt, bindings)? {
                Flow::Normal(value) => last = value,
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal(last))
    }

    fn exec_scoped(&mut self, stmts: &[Stmt], bindings: &mut Bindings) -> Result<Flow, RuntimeError> {
        self.scopes().push(Scope::new());
        let flow = self.exec_block(stmts, bindings);
        let _ = self.scopes().pop();
        flow
    }

    fn exec(&mut self, stmt: &Stmt, bindings: &mut Bindings) -> Result<Flow, RuntimeError> {
        let line = stmt.line;
        Ok(match &stmt.kind {
            StmtKind::Expr(expr) => Flow::Normal(self.eval(expr, bindings)?),
            StmtKind::Let(name, init) => {
                let value = match init {
                    Some(expr) => self.eval(expr, bindings)?,
                    None => Value::Null,
                };
                self.declare(name, value);
                Flow::Normal(Value::Null)
            }
            StmtKind::Assign(target, op, value) => {
                Flow::Normal(self.assign(target, *op, value, bindings)?)
            }
            StmtKind::If(cond, then, otherwise) => {
                if self.eval(cond, bindings)?.is_truthy() {
                    self.exec_scoped(then, bindings)?
                } else if let Some(otherwise) = otherwise {
                    self.exec_scoped(otherwise, bindings)?
                } else {
                    Flow::Normal(Value::Null)
                }
            }
            StmtKind::While(cond, body) => {
                while self.eval(cond, bindings)?.is_truthy() {
                    match self.exec_scoped(body, bindings)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal(_) | Flow::Continue => {}
                    }
                }
                Flow::Normal(Value::Null)
            }
            StmtKind::For(var, iterable, body) => {
                let items = self.iteration_items(iterable, bindings)?;
                for item in items {
                    self.scopes().push(Scope::from([(var.clone(), item)]));
                    let flow = self.exec_block(body, bindings);
                    let _ = self.scopes().pop();
                    match flow? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal(_) | Flow::Continue => {}
                    }
                }
                Flow::Normal(Value::Null)
            }
            StmtKind::Block(stmts) => self.exec_scoped(stmts, bindings)?,
            StmtKind::Return(expr) => Flow::Return(match expr {
                Some(expr) => self.eval(expr, bindings)?,
                None => Value::Null,
            }),
            StmtKind::Break => Flow::Break,
            StmtKind::Continue => Flow::Continue,
            StmtKind::Throw(expr) => {
                let value = self.eval(expr, bindings)?;
                return Err(RuntimeError::Raised {
                    message: value.to_string(),
                    line,
                });
            }
        })
    }

    fn iteration_items(&mut self, iterable: &Expr, bindings: &mut Bindings) -> Result<Vec<Value>, RuntimeError> {
        Ok(match self.eval(iterable, bindings)? {
            Value::List(items) => items.lock().clone(),
            Value::Map(entries) => entries.lock().keys().map(|k| Value::string(k.as_str())).collect(),
            Value::Str(s) => s.chars().map(|c| Value::string(c.to_string())).collect(),
            Value::Null => Vec::new(),
            other => {
                return Err(RuntimeError::eval(
                    iterable.line,
                    format!("cannot iterate over {}", other.kind()),
                ));
            }
        })
    }

    fn assign(
        &mut self,
        target: &Expr,
        op: AssignOp,
        value: &Expr,
        bindings: &mut Bindings,
    ) -> Result<Value, RuntimeError> {
        let line = target.line;
        let combine = |current: Value, operand: Value| match op {
            AssignOp::Set => Ok(operand),
            AssignOp::Add => binary(BinaryOp::Add, &current, &operand, line),
            AssignOp::Sub => binary(BinaryOp::Sub, &current, &operand, line),
        };
        match &target.kind {
            ExprKind::Name(name) => {
                let operand = self.eval(value, bindings)?;
                let current = if op == AssignOp::Set {
                    Value::Null
                } else {
                    self.lookup(name, bindings, line)?
                };
                let new = combine(current, operand)?;
                self.store(name, new.clone(), bindings);
                Ok(new)
            }
            ExprKind::Property(object, name) => {
                let object = self.eval(object, bindings)?;
                let operand = self.eval(value, bindings)?;
                let current = if op == AssignOp::Set {
                    Value::Null
                } else {
                    get_property(&object, name, line)?
                };
                let new = combine(current, operand)?;
                set_property(&object, name, new.clone(), line)?;
                Ok(new)
            }
            ExprKind::Index(object, index) => {
                let object = self.eval(object, bindings)?;
                let index = self.eval(index, bindings)?;
                let operand = self.eval(value, bindings)?;
                let current = if op == AssignOp::Set {
                    Value::Null
                } else {
                    get_index(&object, &index, line)?
                };
                let new = combine(current, operand)?;
                set_index(&object, &index, new.clone(), line)?;
                Ok(new)
            }
            _ => Err(RuntimeError::eval(line, "invalid assignment target")),
        }
    }

    // ── Expressions ─────────────────────────────────────────────────────

    fn eval(&mut self, expr: &Expr, bindings: &mut Bindings) -> Result<Value, RuntimeError> {
        let line = expr.line;
        match &expr.kind {
            ExprKind::Literal(value) => Ok(value.clone()),
            ExprKind::Name(name) => self.lookup(name, bindings, line),
            ExprKind::Template(segments) => {
                let mut out = String::new();
                for segment in segments {
                    match segment {
                        Segment::Lit(text) => out.push_str(text),
                        Segment::Code(expr) => out.push_str(&self.eval(expr, bindings)?.to_string()),
                    }
                    if out.len() > MAX_STRING_LEN {
                        return Err(string_too_large(line));
                    }
                }
                Ok(Value::string(out))
            }
            ExprKind::List(items) => {
                let items = items
                    .iter()
                    .map(|item| self.eval(item, bindings))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::list(items))
            }
            ExprKind::Map(entries) => {
                let mut map = BTreeMap::new();
                for (key, value) in entries {
                    let key = match key {
                        MapKey::Fixed(key) => key.clone(),
                        MapKey::Computed(expr) => map_key(&self.eval(expr, bindings)?, expr.line)?,
                    };
                    let value = self.eval(value, bindings)?;
                    let _ = map.insert(key, value);
                }
                Ok(Value::map(map))
            }
            ExprKind::Unary(op, operand) => {
                let value = self.eval(operand, bindings)?;
                match (*op, value) {
                    (UnaryOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
                    (UnaryOp::Neg, Value::Int(n)) => n
                        .checked_neg()
                        .map(Value::Int)
                        .ok_or_else(|| RuntimeError::eval(line, "integer overflow")),
                    (UnaryOp::Neg, Value::Float(x)) => Ok(Value::Float(-x)),
                    (UnaryOp::Neg, other) => Err(RuntimeError::eval(
                        line,
                        format!("cannot negate {}", other.kind()),
                    )),
                }
            }
            ExprKind::Binary(op, left, right) => {
                let left = self.eval(left, bindings)?;
                let right = self.eval(right, bindings)?;
                binary(*op, &left, &right, line)
            }
            ExprKind::And(left, right) => {
                let ok = self.eval(left, bindings)?.is_truthy() && self.eval(right, bindings)?.is_truthy();
                Ok(Value::Bool(ok))
            }
            ExprKind::Or(left, right) => {
                let ok = self.eval(left, bindings)?.is_truthy() || self.eval(right, bindings)?.is_truthy();
                Ok(Value::Bool(ok))
            }
            ExprKind::Ternary(cond, then, otherwise) => {
                if self.eval(cond, bindings)?.is_truthy() {
                    self.eval(then, bindings)
                } else {
                    self.eval(otherwise, bindings)
                }
            }
            ExprKind::Property(object, name) => {
                let object = self.eval(object, bindings)?;
                get_property(&object, name, line)
            }
            ExprKind::Index(object, index) => {
                let object = self.eval(object, bindings)?;
                let index = self.eval(index, bindings)?;
                get_index(&object, &index, line)
            }
            ExprKind::Call(name, args) => {
                let args = self.eval_args(args, bindings)?;
                let function = self.program.functions.get(name).cloned();
                match function {
                    Some(function) => self.call(&function, args, bindings, line),
                    None => builtins::call_function(&self.program.name, name, args, line),
                }
            }
            ExprKind::Method(receiver, name, args) => {
                let receiver = self.eval(receiver, bindings)?;
                let args = self.eval_args(args, bindings)?;
                builtins::call_method(&receiver, name, args, line)
            }
        }
    }

    fn eval_args(&mut self, args: &[Expr], bindings: &mut Bindings) -> Result<Vec<Value>, RuntimeError> {
        args.iter().map(|arg| self.eval(arg, bindings)).collect()
    }

    fn call(
        &mut self,
        function: &Function,
        args: Vec<Value>,
        bindings: &mut Bindings,
        line: usize,
    ) -> Result<Value, RuntimeError> {
        if function.params.len() != args.len() {
            return Err(RuntimeError::eval(
                line,
                format!(
                    "function '{}' expects {} argument(s), got {}",
                    function.name,
                    function.params.len(),
                    args.len()
                ),
            ));
        }
        if self.frames.len() > self.options.max_call_depth {
            return Err(RuntimeError::CallDepth {
                limit: self.options.max_call_depth,
                line,
            });
        }
        if self.stack_base.abs_diff(stack_position()) > self.options.stack_budget {
            return Err(RuntimeError::StackExhausted {
                depth: self.frames.len(),
                line,
            });
        }
        let scope: Scope = function.params.iter().cloned().zip(args).collect();
        self.frames.push(vec![scope]);
        let flow = self.exec_block(&function.body, bindings);
        let _ = self.frames.pop();
        match flow? {
            Flow::Normal(value) | Flow::Return(value) => Ok(value),
            Flow::Break | Flow::Continue => Ok(Value::Null),
        }
    }
}

// ── Value operations ────────────────────────────────────────────────────

fn map_key(key: &Value, line: usize) -> Result<String, RuntimeError> {
    match key {
        Value::Str(s) => Ok(s.to_string()),
        Value::Int(_) | Value::Bool(_) => Ok(key.to_string()),
        other => Err(RuntimeError::eval(
            line,
            format!("map keys must be strings, got {}", other.kind()),
        )),
    }
}

fn list_position(len: usize, index: i64) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let index = if index < 0 { len + index } else { index };
    if (0..len).contains(&index) {
        usize::try_from(index).ok()
    } else {
        None
    }
}

fn get_property(object: &Value, name: &str, line: usize) -> Result<Value, RuntimeError> {
    match object {
        Value::Map(entries) => Ok(entries.lock().get(name).cloned().unwrap_or_default()),
        Value::Object(host) => host
            .get_property(name)
            .map_err(|e| RuntimeError::eval(line, e.to_string())),
        other => Err(RuntimeError::eval(
            line,
            format!("cannot read property '{name}' of {}", other.kind()),
        )),
    }
}

fn set_property(object: &Value, name: &str, value: Value, line: usize) -> Result<(), RuntimeError> {
    match object {
        Value::Map(entries) => {
            let _ = entries.lock().insert(name.to_string(), value);
            Ok(())
        }
        Value::Object(host) => host
            .set_property(name, value)
            .map_err(|e| RuntimeError::eval(line, e.to_string())),
        other => Err(RuntimeError::eval(
            line,
            format!("cannot set property '{name}' on {}", other.kind()),
        )),
    }
}

fn get_index(object: &Value, index: &Value, line: usize) -> Result<Value, RuntimeError> {
    match (object, index) {
        (Value::List(items), Value::Int(i)) => {
            let items = items.lock();
            list_position(items.len(), *i)
                .and_then(|pos| items.get(pos).cloned())
                .ok_or_else(|| {
                    RuntimeError::eval(
                        line,
                        format!("list index {i} out of range (size {})", items.len()),
                    )
                })
        }
        (Value::Map(entries), key) => {
            let key = map_key(key, line)?;
            Ok(entries.lock().get(&key).cloned().unwrap_or_default())
        }
        (Value::Str(s), Value::Int(i)) => {
            let chars: Vec<char> = s.chars().collect();
            list_position(chars.len(), *i)
                .map(|pos| Value::string(chars[pos].to_string()))
                .ok_or_else(|| {
                    RuntimeError::eval(
                        line,
                        format!("string index {i} out of range (length {})", chars.len()),
                    )
                })
        }
        (Value::Object(host), key) => host
            .get_index(key)
            .map_err(|e| RuntimeError::eval(line, e.to_string())),
        (other, key) => Err(RuntimeError::eval(
            line,
            format!("cannot index {} with {}", other.kind(), key.kind()),
        )),
    }
}

fn set_index(object: &Value, index: &Value, value: Value, line: usize) -> Result<(), RuntimeError> {
    match (object, index) {
        (Value::List(items), Value::Int(i)) => {
            let mut items = items.lock();
            let len = items.len();
            match list_position(len, *i) {
                Some(pos) => {
                    items[pos] = value;
                    Ok(())
                }
                None => Err(RuntimeError::eval(
                    line,
                    format!("list index {i} out of range (size {len})"),
                )),
            }
        }
        (Value::Map(entries), key) => {
            let key = map_key(key, line)?;
            let _ = entries.lock().insert(key, value);
            Ok(())
        }
        (Value::Object(host), key) => host
            .set_index(key, value)
            .map_err(|e| RuntimeError::eval(line, e.to_string())),
        (other, key) => Err(RuntimeError::eval(
            line,
            format!("cannot assign to {} index of {}", key.kind(), other.kind()),
        )),
    }
}

#[allow(clippy::cast_precision_loss)]
fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Int(n) => Some(*n as f64),
        Value::Float(x) => Some(*x),
        _ => None,
    }
}

fn overflow(line: usize) -> RuntimeError {
    RuntimeError::eval(line, "integer overflow")
}

pub(crate) fn string_too_large(line: usize) -> RuntimeError {
    RuntimeError::eval(line, format!("string too large (limit {MAX_STRING_LEN} bytes)"))
}

pub(crate) fn list_too_large(line: usize) -> RuntimeError {
    RuntimeError::eval(line, format!("list too large (limit {MAX_LIST_LEN} elements)"))
}

fn checked_string(s: String, line: usize) -> Result<Value, RuntimeError> {
    if s.len() > MAX_STRING_LEN {
        return Err(string_too_large(line));
    }
    Ok(Value::string(s))
}

#[allow(clippy::float_cmp)]
pub(crate) fn binary(op: BinaryOp, left: &Value, right: &Value, line: usize) -> Result<Value, RuntimeError> {
    use Value::{Float, Int, List, Map, Str};

    let mismatch = || {
        RuntimeError::eval(
            line,
            format!(
                "unsupported operand types for {}: {} and {}",
                op.symbol(),
                left.kind(),
                right.kind()
            ),
        )
    };

    match op {
        BinaryOp::Eq => return Ok(Value::Bool(left == right)),
        BinaryOp::NotEq => return Ok(Value::Bool(left != right)),
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            let ordering = match (left, right) {
                (Str(a), Str(b)) => a.cmp(b),
                (Int(a), Int(b)) => a.cmp(b),
                _ => match (as_float(left), as_float(right)) {
                    (Some(a), Some(b)) => a.partial_cmp(&b).ok_or_else(mismatch)?,
                    _ => return Err(mismatch()),
                },
            };
            let result = match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::LtEq => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            };
            return Ok(Value::Bool(result));
        }
        _ => {}
    }

    match (op, left, right) {
        (BinaryOp::Add, Str(a), b) => checked_string(format!("{a}{b}"), line),
        (BinaryOp::Add, a, Str(b)) => checked_string(format!("{a}{b}"), line),
        (BinaryOp::Add, List(a), List(b)) => {
            let mut items = a.lock().clone();
            let tail = b.lock().clone();
            if items.len() + tail.len() > MAX_LIST_LEN {
                return Err(list_too_large(line));
            }
            items.extend(tail);
            Ok(Value::list(items))
        }
        (BinaryOp::Add, Map(a), Map(b)) => {
            let mut entries = a.lock().clone();
            let tail = b.lock().clone();
            entries.extend(tail);
            Ok(Value::map(entries))
        }
        (BinaryOp::Sub, List(a), List(b)) => {
            let remove = b.lock().clone();
            let items = a.lock().clone();
            Ok(Value::list(
                items.into_iter().filter(|v| !remove.contains(v)).collect(),
            ))
        }
        (BinaryOp::Mul, Str(s), Int(n)) => {
            let n = usize::try_from(*n)
                .map_err(|_| RuntimeError::eval(line, format!("negative repeat count {n}")))?;
            match s.len().checked_mul(n) {
                Some(len) if len <= MAX_STRING_LEN => Ok(Value::string(s.repeat(n))),
                _ => Err(string_too_large(line)),
            }
        }
        (BinaryOp::Add, Int(a), Int(b)) => a.checked_add(*b).map(Int).ok_or_else(|| overflow(line)),
        (BinaryOp::Sub, Int(a), Int(b)) => a.checked_sub(*b).map(Int).ok_or_else(|| overflow(line)),
        (BinaryOp::Mul, Int(a), Int(b)) => a.checked_mul(*b).map(Int).ok_or_else(|| overflow(line)),
        (BinaryOp::Div | BinaryOp::Rem, Int(_), Int(0)) => {
            Err(RuntimeError::eval(line, "division by zero"))
        }
        (BinaryOp::Div, Int(a), Int(b)) => {
            if a.checked_rem(*b) == Some(0) {
                a.checked_div(*b).map(Int).ok_or_else(|| overflow(line))
            } else {
                let (a, b) = (as_float(left).unwrap_or_default(), as_float(right).unwrap_or_default());
                Ok(Float(a / b))
            }
        }
        (BinaryOp::Rem, Int(a), Int(b)) => a.checked_rem(*b).map(Int).ok_or_else(|| overflow(line)),
        _ => {
            let (Some(a), Some(b)) = (as_float(left), as_float(right)) else {
                return Err(mismatch());
            };
            match op {
                BinaryOp::Add => Ok(Float(a + b)),
                BinaryOp::Sub => Ok(Float(a - b)),
                BinaryOp::Mul => Ok(Float(a * b)),
                BinaryOp::Div if b == 0.0 => Err(RuntimeError::eval(line, "division by zero")),
                BinaryOp::Div => Ok(Float(a / b)),
                BinaryOp::Rem if b == 0.0 => Err(RuntimeError::eval(line, "division by zero")),
                BinaryOp::Rem => Ok(Float(a % b)),
                _ => Err(mismatch()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::compile;
    use assert_matches::assert_matches;

    fn run_with(source: &str, bindings: &mut Bindings) -> Result<Value, RuntimeError> {
        let program = Arc::new(compile("test", source).unwrap());
        Interpreter::new(program, RunOptions::default()).run(bindings)
    }

    fn run(source: &str) -> Value {
        run_with(source, &mut Bindings::new()).unwrap()
    }

    fn run_err(source: &str) -> RuntimeError {
        run_with(source, &mut Bindings::new()).unwrap_err()
    }

    // ── Arithmetic ──────────────────────────────────────────────────────

    #[test]
    fn integer_arithmetic() {
        assert_eq!(run("1 + 2 * 3 - 4"), Value::Int(3));
        assert_eq!(run("7 % 3"), Value::Int(1));
        assert_eq!(run("8 / 2"), Value::Int(4));
        assert_eq!(run("7 / 2"), Value::Float(3.5));
        assert_eq!(run("-(2 + 3)"), Value::Int(-5));
    }

    #[test]
    fn mixed_numbers_widen_to_float() {
        assert_eq!(run("1 + 0.5"), Value::Float(1.5));
        assert_eq!(run("2.0 * 3"), Value::Float(6.0));
    }

    #[test]
    fn overflow_and_division_by_zero_are_errors() {
        assert!(run_err("9223372036854775807 + 1").to_string().contains("overflow"));
        assert!(run_err("1 / 0").to_string().contains("division by zero"));
        assert!(run_err("1.5 % 0").to_string().contains("division by zero"));
    }

    #[test]
    fn string_concatenation_and_repeat() {
        assert_eq!(run("'a' + 1 + true"), Value::from("a1true"));
        assert_eq!(run("1 + 'a'"), Value::from("1a"));
        assert_eq!(run("'ab' * 3"), Value::from("ababab"));
    }

    #[test]
    fn string_repeat_is_bounded() {
        let err = run_err("'ab' * 4611686018427387904");
        assert!(err.to_string().contains("string too large"), "{err}");
        assert!(run_err("'ab' * 9223372036854775807").to_string().contains("string too large"));
        assert!(run_err("'ab' * -1").to_string().contains("negative repeat count"));
        assert_eq!(run("'' * 9223372036854775807"), Value::from(""));
    }

    #[test]
    fn string_growth_stops_at_the_limit() {
        let err = run_err("let s = 'x' * 1048576\nwhile true { s = s + s }");
        assert!(err.to_string().contains("string too large"));
        let err = run_err("let s = 'x' * 1048576\nwhile true { s = \"${s}${s}\" }");
        assert!(err.to_string().contains("string too large"));
        let err = run_err("let l = range(1048576)\nl + [1]");
        assert!(err.to_string().contains("list too large"));
    }

    #[test]
    fn self_containing_list_difference_terminates() {
        let (tx, rx) = std::sync::mpsc::channel();
        let _ = std::thread::spawn(move || {
            let outcome = run_with("let a = [1]\na.push(a)\na - [[2]]", &mut Bindings::new())
                .map(|v| v.to_string());
            let _ = tx.send(outcome);
        });
        let outcome = rx.recv_timeout(std::time::Duration::from_secs(10)).unwrap();
        assert!(outcome.unwrap().starts_with("[1, [1, "));
    }

    #[test]
    fn collection_operators() {
        assert_eq!(run("[1, 2] + [3]").to_string(), "[1, 2, 3]");
        assert_eq!(run("[1, 2, 3, 2] - [2]").to_string(), "[1, 3]");
        assert_eq!(run("[a: 1] + [b: 2, a: 3]").to_string(), "[a:3, b:2]");
    }

    #[test]
    fn comparisons() {
        assert_eq!(run("1 < 2 && 2 <= 2 && 3 > 2.5 && 'b' >= 'a'"), Value::Bool(true));
        assert_eq!(run("[1, [2]] == [1, [2]]"), Value::Bool(true));
        assert_eq!(run("1 == '1'"), Value::Bool(false));
        assert!(run_err("1 < 'a'").to_string().contains("unsupported operand types for <"));
    }

    #[test]
    fn logic_short_circuits() {
        // `missing` is never evaluated.
        assert_eq!(run("false && missing"), Value::Bool(false));
        assert_eq!(run("true || missing"), Value::Bool(true));
        assert_eq!(run("!null"), Value::Bool(true));
        assert_eq!(run("'' ? 1 : 2"), Value::Int(2));
    }

    // ── Variables and bindings ──────────────────────────────────────────

    #[test]
    fn unresolved_assignment_writes_bindings() {
        let mut bindings = Bindings::new();
        let _ = bindings.insert("input".into(), Value::Int(20));
        let _ = run_with("let local = 1\nresult = input + local + 1", &mut bindings).unwrap();
        assert_eq!(bindings.get("result"), Some(&Value::Int(22)));
        assert!(!bindings.contains_key("local"));
    }

    #[test]
    fn undefined_variable_reports_line() {
        let err = run_err("let a = 1\n\nb + a");
        assert_matches!(err, RuntimeError::Eval { line: 3, ref message } if message.contains("'b'"));
    }

    #[test]
    fn block_scopes_shadow_and_restore() {
        assert_eq!(
            run("let x = 1\nif true { let x = 2; x += 1 }\nx"),
            Value::Int(1)
        );
        assert_eq!(run("let x = 1\nif true { x = 5 }\nx"), Value::Int(5));
    }

    #[test]
    fn compound_assignment_on_targets() {
        let mut bindings = Bindings::new();
        let _ = bindings.insert("vars".into(), Value::map(BTreeMap::new()));
        let _ = run_with(
            "vars['n'] = 1\nvars['n'] += 2\nvars.s = 'a'\nvars.s += 'b'\nlet l = [5]\nl[0] -= 1\nvars.l = l",
            &mut bindings,
        )
        .unwrap();
        assert_eq!(bindings["vars"].to_string(), "[l:[4], n:3, s:ab]");
    }

    #[test]
    fn collections_are_shared_references() {
        let mut bindings = Bindings::new();
        let list = Value::list(vec![]);
        let _ = bindings.insert("items".into(), list.clone());
        let _ = run_with("items.push(1)\nlet alias = items\nalias.push(2)", &mut bindings).unwrap();
        assert_eq!(list.to_string(), "[1, 2]");
    }

    // ── Control flow ────────────────────────────────────────────────────

    #[test]
    fn script_value_is_return_or_last_statement() {
        assert_eq!(run("1\n2"), Value::Int(2));
        assert_eq!(run("return 3\n4"), Value::Int(3));
        assert_eq!(run("if (false) { 1 }"), Value::Null);
        assert_eq!(run("if (true) { 'yes' } else { 'no' }"), Value::from("yes"));
        assert_eq!(run(""), Value::Null);
    }

    #[test]
    fn loops_with_break_and_continue() {
        let source = "
            let total = 0
            for i in range(10) {
                if i % 2 == 0 { continue }
                if i > 7 { break }
                total += i
            }
            let n = 0
            while true { n += 1; if n == 3 { break } }
            [total, n]
        ";
        assert_eq!(run(source).to_string(), "[16, 3]");
    }

    #[test]
    fn for_over_maps_and_strings() {
        assert_eq!(run("let out = ''\nfor k in [b: 1, a: 2] { out += k }\nout"), Value::from("ab"));
        assert_eq!(run("let n = 0\nfor c in 'héllo' { n += 1 }\nn"), Value::Int(5));
        assert_eq!(run("for x in null { fail('never') }\n'done'"), Value::from("done"));
        assert!(run_err("for x in 5 {}").to_string().contains("cannot iterate over int"));
    }

    #[test]
    fn throw_raises_with_rendered_value() {
        let err = run_err("\nthrow 'bad ' + 42");
        assert_eq!(
            err,
            RuntimeError::Raised {
                message: "bad 42".into(),
                line: 2
            }
        );
    }

    // ── Functions ───────────────────────────────────────────────────────

    #[test]
    fn functions_see_params_and_bindings_but_not_script_locals() {
        let mut bindings = Bindings::new();
        let _ = bindings.insert("base".into(), Value::Int(100));
        let value = run_with(
            "fn add(x) { return base + x }\nlet hidden = 1\nadd(5)",
            &mut bindings,
        )
        .unwrap();
        assert_eq!(value, Value::Int(105));

        let err = run_err("fn peek() { hidden }\nlet hidden = 1\npeek()");
        assert!(err.to_string().contains("undefined variable 'hidden'"));
    }

    #[test]
    fn recursion_and_implicit_return() {
        let source = "fn fact(n) { if n <= 1 { 1 } else { n * fact(n - 1) } }\nfact(10)";
        assert_eq!(run(source), Value::Int(3_628_800));
    }

    #[test]
    fn call_depth_is_bounded() {
        let program = Arc::new(compile("deep", "fn f(n) { f(n + 1) }\nf(0)").unwrap());
        let err = Interpreter::new(program, RunOptions { max_call_depth: 10, ..RunOptions::default() })
            .run(&mut Bindings::new())
            .unwrap_err();
        assert_matches!(err, RuntimeError::CallDepth { limit: 10, line: 1 });
    }

    #[test]
    fn recursion_stops_at_the_stack_budget() {
        let program = Arc::new(compile("deep", "fn f(n) { f(n + 1) }\nf(0)").unwrap());
        let options = RunOptions {
            max_call_depth: usize::MAX,
            stack_budget: 64 * 1024,
        };
        let err = std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(move || Interpreter::new(program, options).run(&mut Bindings::new()))
            .unwrap()
            .join()
            .unwrap()
            .unwrap_err();
        assert_matches!(err, RuntimeError::StackExhausted { depth, line: 1 } if depth > 1);
    }

    #[test]
    fn wrong_arity_is_an_error() {
        let err = run_err("fn f(a, b) { a }\nf(1)");
        assert!(err.to_string().contains("expects 2 argument(s), got 1"));
    }

    #[test]
    fn user_functions_shadow_builtins() {
        assert_eq!(run("fn len(x) { 'mine' }\nlen([1])"), Value::from("mine"));
    }

    // ── Indexing and templates ──────────────────────────────────────────

    #[test]
    fn indexing() {
        assert_eq!(run("[1, 2, 3][-1]"), Value::Int(3));
        assert_eq!(run("'abc'[1]"), Value::from("b"));
        assert_eq!(run("[a: 1]['missing']"), Value::Null);
        assert_eq!(run("[a: [b: 2]].a.b"), Value::Int(2));
        assert!(run_err("[1][3]").to_string().contains("out of range (size 1)"));
        assert!(run_err("null.x").to_string().contains("of null"));
    }

    #[test]
    fn templates_render_values() {
        let mut bindings = Bindings::new();
        let _ = bindings.insert(
            "build".into(),
            Value::map(BTreeMap::from([("number".to_string(), Value::Int(7))])),
        );
        let value = run_with(r##""#${build.number}: ${[1, 2]} $build.number""##, &mut bindings).unwrap();
        assert_eq!(value, Value::from("#7: [1, 2] 7"));
    }

    #[test]
    fn list_literals_are_fresh_per_evaluation() {
        let source = "fn make() { [] }\nlet a = make()\nlet b = make()\na.push(1)\nb.len()";
        assert_eq!(run(source), Value::Int(0));
    }

    #[test]
    fn interpreter_is_reusable_across_runs() {
        let program = Arc::new(compile("again", "count = count + 1").unwrap());
        let mut interpreter = Interpreter::new(program, RunOptions::default());
        let mut bindings = Bindings::from([("count".to_string(), Value::Int(0))]);
        let _ = interpreter.run(&mut bindings).unwrap();
        let _ = interpreter.run(&mut bindings).unwrap();
        assert_eq!(bindings["count"], Value::Int(2));
    }
}
