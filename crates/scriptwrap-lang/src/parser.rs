//! Recursive-descent parser.
//!
//! Statements end at an optional `;`. Expression precedence, loosest first:
//! ternary, `||`, `&&`, equality, comparison, `+ -`, `* / %`, unary `! -`,
//! then postfix property, index and method access.

use std::collections::HashMap;
use std::mem::discriminant;
use std::sync::Arc;

use crate::ast::{
    AssignOp, BinaryOp, Expr, ExprKind, Function, MapKey, Program, Segment, Stmt, StmtKind,
    UnaryOp,
};
use crate::errors::CompileError;
use crate::lexer::{Lexer, TemplatePart, Token, TokenKind};
use crate::value::Value;

/// Deepest nesting of blocks and parenthesized expressions accepted.
const MAX_NESTING: usize = 64;

/// Compile `source` into a [`Program`] named `name`.
///
/// Total over all inputs: malformed text yields a [`CompileError`] with the
/// position of the first problem, never a panic.
pub fn compile(name: &str, source: &str) -> Result<Program, CompileError> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser::new(tokens);
    let (body, functions) = parser.program()?;
    Ok(Program {
        name: name.to_string(),
        body,
        functions,
    })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    loop_depth: usize,
    nesting: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            loop_depth: 0,
            nesting: 0,
        }
    }

    // ── Token cursor ────────────────────────────────────────────────────

    fn peek(&self) -> &Token {
        // The lexer always terminates the stream with Eof.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_next(&self) -> &TokenKind {
        &self.tokens[(self.pos + 1).min(self.tokens.len() - 1)].kind
    }

    fn previous_line(&self) -> usize {
        self.tokens[self.pos.saturating_sub(1)].line
    }

    fn at(&self, kind: &TokenKind) -> bool {
        discriminant(&self.peek().kind) == discriminant(kind)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            let _ = self.advance();
            true
        } else {
            false
        }
    }

    fn error_here(&self, message: impl Into<String>) -> CompileError {
        let token = self.peek();
        CompileError::new(token.line, token.column, message)
    }

    fn expected(&self, what: &str) -> CompileError {
        let found = self.peek().kind.describe();
        self.error_here(format!("expected {what}, found {found}"))
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<Token, CompileError> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.expected(what))
        }
    }

    fn ident(&mut self, what: &str) -> Result<String, CompileError> {
        match &self.peek().kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                let _ = self.advance();
                Ok(name)
            }
            _ => Err(self.expected(what)),
        }
    }

    // ── Statements ──────────────────────────────────────────────────────

    fn program(&mut self) -> Result<(Vec<Stmt>, HashMap<String, Arc<Function>>), CompileError> {
        let mut body = Vec::new();
        let mut functions = HashMap::new();
        while !self.at(&TokenKind::Eof) {
            if self.eat(&TokenKind::Semi) {
                continue;
            }
            if self.at(&TokenKind::Fn) {
                let token = self.peek().clone();
                let function = self.function()?;
                if functions.contains_key(&function.name) {
                    return Err(CompileError::new(
                        token.line,
                        token.column,
                        format!("function '{}' is already declared", function.name),
                    ));
                }
                let _ = functions.insert(function.name.clone(), Arc::new(function));
                continue;
            }
            body.push(self.statement()?);
        }
        Ok((body, functions))
    }

    fn function(&mut self) -> Result<Function, CompileError> {
        let _ = self.expect(&TokenKind::Fn, "'fn'")?;
        let name = self.ident("function name")?;
        let _ = self.expect(&TokenKind::LParen, "'('")?;
        let mut params: Vec<String> = Vec::new();
        while !self.at(&TokenKind::RParen) {
            let param_token = self.peek().clone();
            let param = self.ident("parameter name")?;
            if params.contains(&param) {
                return Err(CompileError::new(
                    param_token.line,
                    param_token.column,
                    format!("duplicate parameter '{param}'"),
                ));
            }
            params.push(param);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let _ = self.expect(&TokenKind::RParen, "')'")?;

        let saved_loops = std::mem::replace(&mut self.loop_depth, 0);
        let body = self.block();
        self.loop_depth = saved_loops;

        Ok(Function {
            name,
            params,
            body: body?,
        })
    }

    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, CompileError>,
    ) -> Result<T, CompileError> {
        if self.nesting >= MAX_NESTING {
            return Err(self.error_here("script is nested too deeply"));
        }
        self.nesting += 1;
        let result = parse(self);
        self.nesting -= 1;
        result
    }

    fn block(&mut self) -> Result<Vec<Stmt>, CompileError> {
        self.nested(Self::block_inner)
    }

    fn block_inner(&mut self) -> Result<Vec<Stmt>, CompileError> {
        let _ = self.expect(&TokenKind::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        loop {
            if self.eat(&TokenKind::RBrace) {
                return Ok(stmts);
            }
            if self.at(&TokenKind::Eof) {
                return Err(self.expected("'}'"));
            }
            if self.eat(&TokenKind::Semi) {
                continue;
            }
            stmts.push(self.statement()?);
        }
    }

    /// Body of `if`/`while`/`for`: a braced block or a single statement.
    fn body(&mut self) -> Result<Vec<Stmt>, CompileError> {
        if self.at(&TokenKind::LBrace) {
            self.block()
        } else {
            Ok(vec![self.statement()?])
        }
    }

    fn loop_body(&mut self) -> Result<Vec<Stmt>, CompileError> {
        self.loop_depth += 1;
        let body = self.body();
        self.loop_depth -= 1;
        body
    }

    fn statement(&mut self) -> Result<Stmt, CompileError> {
        let token = self.peek().clone();
        let line = token.line;
        let kind = match token.kind {
            TokenKind::Fn => {
                return Err(self.error_here("functions can only be declared at the top level"));
            }
            TokenKind::Let => {
                let _ = self.advance();
                let name = self.ident("variable name")?;
                let init = if self.eat(&TokenKind::Assign) {
                    Some(self.expression()?)
                } else {
                    None
                };
                StmtKind::Let(name, init)
            }
            TokenKind::If => return self.if_statement(),
            TokenKind::While => {
                let _ = self.advance();
                let cond = self.expression()?;
                let body = self.loop_body()?;
                StmtKind::While(cond, body)
            }
            TokenKind::For => {
                let _ = self.advance();
                let parenthesized = self.at(&TokenKind::LParen)
                    && matches!(self.tokens.get(self.pos + 2), Some(t) if t.kind == TokenKind::In);
                if parenthesized {
                    let _ = self.advance();
                }
                let var = self.ident("loop variable")?;
                let _ = self.expect(&TokenKind::In, "'in'")?;
                let iterable = self.expression()?;
                if parenthesized {
                    let _ = self.expect(&TokenKind::RParen, "')'")?;
                }
                let body = self.loop_body()?;
                StmtKind::For(var, iterable, body)
            }
            TokenKind::LBrace => StmtKind::Block(self.block()?),
            TokenKind::Return => {
                let _ = self.advance();
                let ends = self.at(&TokenKind::Semi)
                    || self.at(&TokenKind::RBrace)
                    || self.at(&TokenKind::Eof);
                StmtKind::Return(if ends { None } else { Some(self.expression()?) })
            }
            TokenKind::Break | TokenKind::Continue => {
                if self.loop_depth == 0 {
                    return Err(self.error_here(format!(
                        "{} outside of a loop",
                        token.kind.describe().trim_matches('\'')
                    )));
                }
                let _ = self.advance();
                if token.kind == TokenKind::Break {
                    StmtKind::Break
                } else {
                    StmtKind::Continue
                }
            }
            TokenKind::Throw => {
                let _ = self.advance();
                StmtKind::Throw(self.expression()?)
            }
            _ => {
                let expr = self.expression()?;
                let op = match self.peek().kind {
                    TokenKind::Assign => Some(AssignOp::Set),
                    TokenKind::PlusAssign => Some(AssignOp::Add),
                    TokenKind::MinusAssign => Some(AssignOp::Sub),
                    _ => None,
                };
                match op {
                    Some(op) => {
                        if !matches!(
                            expr.kind,
                            ExprKind::Name(_) | ExprKind::Property(..) | ExprKind::Index(..)
                        ) {
                            return Err(self.error_here("invalid assignment target"));
                        }
                        let _ = self.advance();
                        let value = self.expression()?;
                        StmtKind::Assign(expr, op, value)
                    }
                    None => StmtKind::Expr(expr),
                }
            }
        };
        let _ = self.eat(&TokenKind::Semi);
        Ok(Stmt { kind, line })
    }

    fn if_statement(&mut self) -> Result<Stmt, CompileError> {
        let line = self.expect(&TokenKind::If, "'if'")?.line;
        let cond = self.expression()?;
        let then = self.body()?;
        let otherwise = if self.eat(&TokenKind::Else) {
            if self.at(&TokenKind::If) {
                Some(vec![self.if_statement()?])
            } else {
                Some(self.body()?)
            }
        } else {
            None
        };
        Ok(Stmt {
            kind: StmtKind::If(cond, then, otherwise),
            line,
        })
    }

    // ── Expressions ─────────────────────────────────────────────────────

    fn expression(&mut self) -> Result<Expr, CompileError> {
        self.nested(Self::ternary)
    }

    fn ternary(&mut self) -> Result<Expr, CompileError> {
        let cond = self.or()?;
        if !self.eat(&TokenKind::Question) {
            return Ok(cond);
        }
        let then = self.expression()?;
        let _ = self.expect(&TokenKind::Colon, "':' in conditional expression")?;
        let otherwise = self.expression()?;
        let line = cond.line;
        Ok(Expr {
            kind: ExprKind::Ternary(Box::new(cond), Box::new(then), Box::new(otherwise)),
            line,
        })
    }

    fn or(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.and()?;
        while self.eat(&TokenKind::OrOr) {
            let right = self.and()?;
            let line = left.line;
            left = Expr {
                kind: ExprKind::Or(Box::new(left), Box::new(right)),
                line,
            };
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.binary_level(0)?;
        while self.eat(&TokenKind::AndAnd) {
            let right = self.binary_level(0)?;
            let line = left.line;
            left = Expr {
                kind: ExprKind::And(Box::new(left), Box::new(right)),
                line,
            };
        }
        Ok(left)
    }

    /// Left-associative binary operators, one precedence level per index.
    fn binary_level(&mut self, level: usize) -> Result<Expr, CompileError> {
        if level == 4 {
            return self.unary();
        }
        let mut left = self.binary_level(level + 1)?;
        loop {
            let op = match (level, &self.peek().kind) {
                (0, TokenKind::EqEq) => BinaryOp::Eq,
                (0, TokenKind::NotEq) => BinaryOp::NotEq,
                (1, TokenKind::Lt) => BinaryOp::Lt,
                (1, TokenKind::LtEq) => BinaryOp::LtEq,
                (1, TokenKind::Gt) => BinaryOp::Gt,
                (1, TokenKind::GtEq) => BinaryOp::GtEq,
                (2, TokenKind::Plus) => BinaryOp::Add,
                (2, TokenKind::Minus) => BinaryOp::Sub,
                (3, TokenKind::Star) => BinaryOp::Mul,
                (3, TokenKind::Slash) => BinaryOp::Div,
                (3, TokenKind::Percent) => BinaryOp::Rem,
                _ => return Ok(left),
            };
            let _ = self.advance();
            let right = self.binary_level(level + 1)?;
            let line = left.line;
            left = Expr {
                kind: ExprKind::Binary(op, Box::new(left), Box::new(right)),
                line,
            };
        }
    }

    fn unary(&mut self) -> Result<Expr, CompileError> {
        let mut ops = Vec::new();
        loop {
            let op = match self.peek().kind {
                TokenKind::Bang => UnaryOp::Not,
                TokenKind::Minus => UnaryOp::Neg,
                _ => break,
            };
            if ops.len() >= MAX_NESTING {
                return Err(self.error_here("script is nested too deeply"));
            }
            ops.push((op, self.advance().line));
        }
        let mut expr = self.postfix()?;
        for (op, line) in ops.into_iter().rev() {
            expr = Expr {
                kind: ExprKind::Unary(op, Box::new(expr)),
                line,
            };
        }
        Ok(expr)
    }

    fn postfix(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&TokenKind::Dot) {
                let name = self.ident("property or method name")?;
                let line = expr.line;
                expr = if self.eat(&TokenKind::LParen) {
                    let args = self.arguments()?;
                    Expr {
                        kind: ExprKind::Method(Box::new(expr), name, args),
                        line,
                    }
                } else {
                    Expr {
                        kind: ExprKind::Property(Box::new(expr), name),
                        line,
                    }
                };
            } else if self.at(&TokenKind::LBracket) && self.peek().line == self.previous_line() {
                let _ = self.advance();
                let index = self.expression()?;
                let _ = self.expect(&TokenKind::RBracket, "']'")?;
                let line = expr.line;
                expr = Expr {
                    kind: ExprKind::Index(Box::new(expr), Box::new(index)),
                    line,
                };
            } else if self.at(&TokenKind::LParen) && self.peek().line == self.previous_line() {
                return Err(self.error_here("only named functions can be called"));
            } else {
                return Ok(expr);
            }
        }
    }

    /// Arguments after an already consumed `(`.
    fn arguments(&mut self) -> Result<Vec<Expr>, CompileError> {
        let mut args = Vec::new();
        while !self.at(&TokenKind::RParen) {
            args.push(self.expression()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let _ = self.expect(&TokenKind::RParen, "')'")?;
        Ok(args)
    }

    fn primary(&mut self) -> Result<Expr, CompileError> {
        let token = self.peek().clone();
        let line = token.line;
        let literal = |value: Value| Expr {
            kind: ExprKind::Literal(value),
            line,
        };
        let expr = match token.kind {
            TokenKind::Null => literal(Value::Null),
            TokenKind::True => literal(Value::Bool(true)),
            TokenKind::False => literal(Value::Bool(false)),
            TokenKind::Int(n) => literal(Value::Int(n)),
            TokenKind::Float(x) => literal(Value::Float(x)),
            TokenKind::Str(s) => literal(Value::string(s)),
            TokenKind::Template(parts) => {
                let _ = self.advance();
                return Ok(Expr {
                    kind: ExprKind::Template(template_segments(parts)?),
                    line,
                });
            }
            TokenKind::Ident(name) => {
                let _ = self.advance();
                if self.eat(&TokenKind::LParen) {
                    let args = self.arguments()?;
                    return Ok(Expr {
                        kind: ExprKind::Call(name, args),
                        line,
                    });
                }
                return Ok(Expr {
                    kind: ExprKind::Name(name),
                    line,
                });
            }
            TokenKind::LParen => {
                let _ = self.advance();
                let inner = self.expression()?;
                let _ = self.expect(&TokenKind::RParen, "')'")?;
                return Ok(inner);
            }
            TokenKind::LBracket => return self.list_or_map(),
            _ => return Err(self.expected("expression")),
        };
        let _ = self.advance();
        Ok(expr)
    }

    fn fixed_map_key(&self) -> Option<String> {
        if *self.peek_next() != TokenKind::Colon {
            return None;
        }
        match &self.peek().kind {
            TokenKind::Ident(s) | TokenKind::Str(s) => Some(s.clone()),
            TokenKind::Int(n) => Some(n.to_string()),
            TokenKind::True => Some("true".to_string()),
            TokenKind::False => Some("false".to_string()),
            _ => None,
        }
    }

    fn list_or_map(&mut self) -> Result<Expr, CompileError> {
        let line = self.expect(&TokenKind::LBracket, "'['")?.line;
        if self.at(&TokenKind::Colon) && *self.peek_next() == TokenKind::RBracket {
            let _ = self.advance();
            let _ = self.advance();
            return Ok(Expr {
                kind: ExprKind::Map(Vec::new()),
                line,
            });
        }
        if self.eat(&TokenKind::RBracket) {
            return Ok(Expr {
                kind: ExprKind::List(Vec::new()),
                line,
            });
        }

        let mut items = Vec::new();
        let mut entries = Vec::new();
        let mut is_map = None;
        loop {
            if self.at(&TokenKind::RBracket) {
                break;
            }
            let key = if let Some(key) = self.fixed_map_key() {
                let _ = self.advance();
                Some(MapKey::Fixed(key))
            } else {
                let expr = self.expression()?;
                if self.at(&TokenKind::Colon) {
                    Some(MapKey::Computed(expr))
                } else {
                    items.push(expr);
                    None
                }
            };
            let entry_is_map = key.is_some();
            if *is_map.get_or_insert(entry_is_map) != entry_is_map {
                return Err(self.error_here("cannot mix list items and map entries"));
            }
            if let Some(key) = key {
                let _ = self.expect(&TokenKind::Colon, "':'")?;
                entries.push((key, self.expression()?));
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let _ = self.expect(&TokenKind::RBracket, "']'")?;
        let kind = if is_map == Some(true) {
            ExprKind::Map(entries)
        } else {
            ExprKind::List(items)
        };
        Ok(Expr { kind, line })
    }
}

fn template_segments(parts: Vec<TemplatePart>) -> Result<Vec<Segment>, CompileError> {
    parts
        .into_iter()
        .map(|part| match part {
            TemplatePart::Lit(text) => Ok(Segment::Lit(text)),
            TemplatePart::Code {
                source,
                line,
                column,
            } => {
                let tokens = Lexer::at(&source, line, column).tokenize()?;
                let mut parser = Parser::new(tokens);
                let expr = parser.expression()?;
                if !parser.at(&TokenKind::Eof) {
                    return Err(parser.expected("'}' to close interpolation"));
                }
                Ok(Segment::Code(expr))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn parse(source: &str) -> Program {
        compile("test", source).unwrap()
    }

    fn parse_err(source: &str) -> CompileError {
        compile("test", source).unwrap_err()
    }

    fn only_expr(source: &str) -> Expr {
        let program = parse(source);
        assert_eq!(program.body.len(), 1);
        match &program.body[0].kind {
            StmtKind::Expr(expr) => expr.clone(),
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    // ── Expressions ─────────────────────────────────────────────────────

    #[test]
    fn precedence_binds_multiplication_tighter() {
        let expr = only_expr("1 + 2 * 3");
        assert_matches!(
            expr.kind,
            ExprKind::Binary(BinaryOp::Add, _, right)
                if matches!(right.kind, ExprKind::Binary(BinaryOp::Mul, _, _))
        );
    }

    #[test]
    fn subtraction_is_left_associative() {
        let expr = only_expr("10 - 4 - 3");
        assert_matches!(
            expr.kind,
            ExprKind::Binary(BinaryOp::Sub, left, _)
                if matches!(left.kind, ExprKind::Binary(BinaryOp::Sub, _, _))
        );
    }

    #[test]
    fn ternary_and_logic() {
        let expr = only_expr("a && b || c ? 1 : 2");
        assert_matches!(expr.kind, ExprKind::Ternary(cond, _, _)
            if matches!(cond.kind, ExprKind::Or(..)));
    }

    #[test]
    fn postfix_chains() {
        let expr = only_expr("build.project.name[0].upper()");
        assert_matches!(expr.kind, ExprKind::Method(_, ref m, ref args) if m == "upper" && args.is_empty());
    }

    #[test]
    fn map_and_list_literals() {
        assert_matches!(only_expr("[:]").kind, ExprKind::Map(ref e) if e.is_empty());
        assert_matches!(only_expr("[]").kind, ExprKind::List(ref e) if e.is_empty());
        assert_matches!(only_expr("[1, 2, 3,]").kind, ExprKind::List(ref e) if e.len() == 3);
        assert_matches!(
            only_expr("[a: 1, 'b c': 2, 3: x, (k): v]").kind,
            ExprKind::Map(ref e) if e.len() == 4
        );
    }

    #[test]
    fn mixing_list_and_map_is_rejected() {
        let err = parse_err("[1, a: 2]");
        assert!(err.message.contains("mix"));
    }

    #[test]
    fn template_expressions_are_parsed() {
        let expr = only_expr(r#""n=${a + 1} p=$b.c""#);
        let ExprKind::Template(segments) = expr.kind else {
            panic!("expected template");
        };
        assert_eq!(segments.len(), 4);
        assert_matches!(&segments[1], Segment::Code(e) if matches!(e.kind, ExprKind::Binary(BinaryOp::Add, _, _)));
        assert_matches!(&segments[3], Segment::Code(e) if matches!(e.kind, ExprKind::Property(_, ref p) if p == "c"));
    }

    #[test]
    fn template_errors_point_into_the_string() {
        let err = parse_err("x = 1\ny = \"a ${1 +} b\"");
        assert_eq!(err.line, 2);
        assert!(err.column > 5, "column {} should be inside the string", err.column);
    }

    // ── Statements ──────────────────────────────────────────────────────

    #[test]
    fn statements_with_and_without_semicolons() {
        let program = parse("let a = 1; a += 2\nvars['x'] = a; build.result = 'ok'");
        assert_eq!(program.statement_count(), 4);
        assert_matches!(program.body[1].kind, StmtKind::Assign(_, AssignOp::Add, _));
        assert_matches!(program.body[2].kind, StmtKind::Assign(ref t, AssignOp::Set, _)
            if matches!(t.kind, ExprKind::Index(..)));
    }

    #[test]
    fn if_else_chain() {
        let program = parse("if (a) { 1 } else if b { 2 } else 3");
        let StmtKind::If(_, _, Some(otherwise)) = &program.body[0].kind else {
            panic!("expected if/else");
        };
        assert_matches!(otherwise[0].kind, StmtKind::If(_, _, Some(_)));
    }

    #[test]
    fn for_loop_forms() {
        assert_matches!(parse("for (x in xs) { x }").body[0].kind, StmtKind::For(ref v, _, _) if v == "x");
        assert_matches!(parse("for x in range(3) println(x)").body[0].kind, StmtKind::For(..));
    }

    #[test]
    fn return_without_value() {
        let program = parse("if (x) { return }\nreturn 5");
        assert_matches!(program.body[1].kind, StmtKind::Return(Some(_)));
        let StmtKind::If(_, then, _) = &program.body[0].kind else {
            panic!("expected if");
        };
        assert_matches!(then[0].kind, StmtKind::Return(None));
    }

    #[test]
    fn functions_are_collected() {
        let program = parse("fn b() { 1 }\nfn a(x, y) { return x + y }\na(1, 2)");
        assert_eq!(program.function_names(), vec!["a", "b"]);
        assert_eq!(program.statement_count(), 1);
        assert_eq!(program.functions["a"].params, vec!["x", "y"]);
    }

    // ── Errors ──────────────────────────────────────────────────────────

    #[test]
    fn missing_paren_reports_position() {
        let err = parse_err("println(1, 2");
        assert_eq!(err.message, "expected ')', found end of script");
        assert_eq!((err.line, err.column), (1, 13));
    }

    #[test]
    fn break_outside_loop() {
        assert!(parse_err("break").message.contains("outside of a loop"));
        assert!(parse_err("while true { fn_call() }\ncontinue").message.contains("continue"));
        let _ = parse("while true { if x { break } }");
    }

    #[test]
    fn break_does_not_leak_into_functions() {
        let err = parse_err("while true { 1 }\nfn f() { break }");
        assert!(err.message.contains("outside of a loop"));
    }

    #[test]
    fn nested_and_duplicate_functions() {
        assert!(parse_err("fn f() { fn g() {} }").message.contains("top level"));
        assert!(parse_err("if x { fn g() {} }").message.contains("top level"));
        assert!(parse_err("fn f() {}\nfn f() {}").message.contains("already declared"));
        assert!(parse_err("fn f(a, a) {}").message.contains("duplicate parameter"));
    }

    #[test]
    fn invalid_assignment_target() {
        let err = parse_err("1 + 2 = 3");
        assert_eq!(err.message, "invalid assignment target");
        assert!(parse_err("f() = 1").message.contains("invalid assignment"));
    }

    #[test]
    fn calling_a_non_name_is_rejected() {
        assert!(parse_err("(a)(1)").message.contains("named functions"));
    }

    #[test]
    fn unclosed_block() {
        let err = parse_err("if x {\n  1\n");
        assert!(err.message.contains("'}'"));
        assert_eq!(err.line, 3);
    }

    #[test]
    fn deep_nesting_is_a_compile_error() {
        let source = format!("{}1{}", "(".repeat(500), ")".repeat(500));
        assert!(parse_err(&source).message.contains("nested too deeply"));
        let blocks = format!("{}{}", "{".repeat(500), "}".repeat(500));
        assert!(parse_err(&blocks).message.contains("nested too deeply"));
        assert!(parse_err(&"!".repeat(500)).message.contains("nested too deeply"));
        let _ = parse(&format!("{}1{}", "(".repeat(20), ")".repeat(20)));
    }

    #[test]
    fn empty_source_is_an_empty_program() {
        let program = parse("  // nothing\n");
        assert_eq!(program.statement_count(), 0);
        assert_eq!(program.name(), "test");
    }
}
