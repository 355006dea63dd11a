//! Syntax tree produced by the parser.

use std::collections::HashMap;
use std::sync::Arc;

use crate::value::Value;

#[derive(Debug, Clone)]
pub(crate) struct Expr {
    pub kind: ExprKind,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub(crate) enum ExprKind {
    /// Scalar literal (never a list or map, those are built fresh per
    /// evaluation).
    Literal(Value),
    Template(Vec<Segment>),
    Name(String),
    List(Vec<Expr>),
    Map(Vec<(MapKey, Expr)>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Property(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    Method(Box<Expr>, String, Vec<Expr>),
}

#[derive(Debug, Clone)]
pub(crate) enum Segment {
    Lit(String),
    Code(Expr),
}

#[derive(Debug, Clone)]
pub(crate) enum MapKey {
    Fixed(String),
    Computed(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AssignOp {
    Set,
    Add,
    Sub,
}

#[derive(Debug, Clone)]
pub(crate) struct Stmt {
    pub kind: StmtKind,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub(crate) enum StmtKind {
    Let(String, Option<Expr>),
    Assign(Expr, AssignOp, Expr),
    Expr(Expr),
    If(Expr, Vec<Stmt>, Option<Vec<Stmt>>),
    While(Expr, Vec<Stmt>),
    For(String, Expr, Vec<Stmt>),
    Block(Vec<Stmt>),
    Return(Option<Expr>),
    Break,
    Continue,
    Throw(Expr),
}

#[derive(Debug)]
pub(crate) struct Function {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
}

/// A compiled script.
///
/// Immutable once built; share it behind an `Arc` and run it any number of
/// times, concurrently, through fresh [`Interpreter`](crate::Interpreter)s.
#[derive(Debug)]
pub struct Program {
    pub(crate) name: String,
    pub(crate) body: Vec<Stmt>,
    pub(crate) functions: HashMap<String, Arc<Function>>,
}

impl Program {
    /// Name given at compile time, used in diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of the top-level functions the script declares, sorted.
    pub fn function_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of top-level statements, excluding function declarations.
    pub fn statement_count(&self) -> usize {
        self.body.len()
    }
}
