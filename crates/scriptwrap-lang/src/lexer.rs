//! Tokenizer.
//!
//! Turns source text into [`Token`]s with 1-based line/column positions.
//! Double-quoted strings containing `${expr}` or `$name` become
//! [`TokenKind::Template`] tokens whose embedded expressions are parsed
//! later; single-quoted strings are always literal.

use crate::errors::CompileError;

/// A lexical token.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

/// Piece of an interpolated string.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TemplatePart {
    Lit(String),
    Code {
        source: String,
        line: usize,
        column: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Int(i64),
    Float(f64),
    Str(String),
    Template(Vec<TemplatePart>),
    Ident(String),

    Let,
    Fn,
    If,
    Else,
    While,
    For,
    In,
    Return,
    Break,
    Continue,
    Throw,
    True,
    False,
    Null,

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Colon,
    Semi,
    Question,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Assign,
    PlusAssign,
    MinusAssign,
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    AndAnd,
    OrOr,

    Eof,
}

impl TokenKind {
    /// Short rendering for "expected X, found Y" messages.
    pub fn describe(&self) -> String {
        match self {
            Self::Int(n) => format!("integer {n}"),
            Self::Float(x) => format!("number {x}"),
            Self::Str(_) | Self::Template(_) => "string".to_string(),
            Self::Ident(name) => format!("'{name}'"),
            Self::Eof => "end of script".to_string(),
            other => format!("'{}'", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Self::Let => "let",
            Self::Fn => "fn",
            Self::If => "if",
            Self::Else => "else",
            Self::While => "while",
            Self::For => "for",
            Self::In => "in",
            Self::Return => "return",
            Self::Break => "break",
            Self::Continue => "continue",
            Self::Throw => "throw",
            Self::True => "true",
            Self::False => "false",
            Self::Null => "null",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::Comma => ",",
            Self::Dot => ".",
            Self::Colon => ":",
            Self::Semi => ";",
            Self::Question => "?",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::Percent => "%",
            Self::Bang => "!",
            Self::Assign => "=",
            Self::PlusAssign => "+=",
            Self::MinusAssign => "-=",
            Self::EqEq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::AndAnd => "&&",
            Self::OrOr => "||",
            Self::Int(_)
            | Self::Float(_)
            | Self::Str(_)
            | Self::Template(_)
            | Self::Ident(_)
            | Self::Eof => "",
        }
    }
}

fn keyword(word: &str) -> Option<TokenKind> {
    Some(match word {
        "let" => TokenKind::Let,
        "fn" => TokenKind::Fn,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "for" => TokenKind::For,
        "in" => TokenKind::In,
        "return" => TokenKind::Return,
        "break" => TokenKind::Break,
        "continue" => TokenKind::Continue,
        "throw" => TokenKind::Throw,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "null" => TokenKind::Null,
        _ => return None,
    })
}

pub(crate) struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self::at(source, 1, 1)
    }

    /// Lexer whose positions start at `line`/`column`; used for the code
    /// embedded in string templates.
    pub fn at(source: &str, line: usize, column: usize) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line,
            column,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, CompileError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;
            let (line, column) = (self.line, self.column);
            let Some(c) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    line,
                    column,
                });
                return Ok(tokens);
            };
            let kind = match c {
                '0'..='9' => self.number()?,
                '"' => self.double_quoted()?,
                '\'' => self.single_quoted()?,
                c if c == '_' || c.is_alphabetic() => {
                    let word = self.word();
                    keyword(&word).unwrap_or(TokenKind::Ident(word))
                }
                _ => self.punct()?,
            };
            tokens.push(Token { kind, line, column });
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::new(self.line, self.column, message)
    }

    fn skip_trivia(&mut self) -> Result<(), CompileError> {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(c), _) if c.is_whitespace() => {
                    let _ = self.bump();
                }
                (Some('/'), Some('/')) => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        let _ = self.bump();
                    }
                }
                (Some('#'), Some('!')) if self.pos == 0 => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                (Some('/'), Some('*')) => {
                    let (line, column) = (self.line, self.column);
                    let _ = self.bump();
                    let _ = self.bump();
                    loop {
                        match (self.peek(), self.peek_at(1)) {
                            (Some('*'), Some('/')) => {
                                let _ = self.bump();
                                let _ = self.bump();
                                break;
                            }
                            (Some(_), _) => {
                                let _ = self.bump();
                            }
                            (None, _) => {
                                return Err(CompileError::new(
                                    line,
                                    column,
                                    "unterminated block comment",
                                ));
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn word(&mut self) -> String {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if c == '_' || c.is_alphanumeric() {
                word.push(c);
                let _ = self.bump();
            } else {
                break;
            }
        }
        word
    }

    fn number(&mut self) -> Result<TokenKind, CompileError> {
        let (line, column) = (self.line, self.column);
        let mut digits = String::new();
        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                digits.push(c);
            } else if c == '_' {
                // digit separator
            } else if c == '.'
                && !is_float
                && self.peek_at(1).is_some_and(|n| n.is_ascii_digit())
            {
                is_float = true;
                digits.push(c);
            } else {
                break;
            }
            let _ = self.bump();
        }
        if self.peek().is_some_and(|c| c == '_' || c.is_alphabetic()) {
            return Err(self.error("invalid character in number literal"));
        }
        if is_float {
            digits
                .parse::<f64>()
                .map(TokenKind::Float)
                .map_err(|_| CompileError::new(line, column, "invalid number literal"))
        } else {
            digits
                .parse::<i64>()
                .map(TokenKind::Int)
                .map_err(|_| CompileError::new(line, column, "integer literal out of range"))
        }
    }

    fn escape(&mut self, quote: char) -> Result<char, CompileError> {
        let Some(c) = self.bump() else {
            return Err(self.error("unterminated string"));
        };
        Ok(match c {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            '\\' => '\\',
            '$' => '$',
            c if c == quote => c,
            other => return Err(self.error(format!("unknown escape '\\{other}'"))),
        })
    }

    fn single_quoted(&mut self) -> Result<TokenKind, CompileError> {
        let (line, column) = (self.line, self.column);
        let _ = self.bump();
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('\'') => return Ok(TokenKind::Str(text)),
                Some('\\') => text.push(self.escape('\'')?),
                Some(c) => text.push(c),
                None => return Err(CompileError::new(line, column, "unterminated string")),
            }
        }
    }

    fn double_quoted(&mut self) -> Result<TokenKind, CompileError> {
        let (line, column) = (self.line, self.column);
        let _ = self.bump();
        let mut parts = Vec::new();
        let mut text = String::new();
        loop {
            match self.peek() {
                None => return Err(CompileError::new(line, column, "unterminated string")),
                Some('"') => {
                    let _ = self.bump();
                    break;
                }
                Some('\\') => {
                    let _ = self.bump();
                    text.push(self.escape('"')?);
                }
                Some('$') if self.peek_at(1) == Some('{') => {
                    if !text.is_empty() {
                        parts.push(TemplatePart::Lit(std::mem::take(&mut text)));
                    }
                    parts.push(self.braced_code()?);
                }
                Some('$') if self.peek_at(1).is_some_and(|c| c == '_' || c.is_alphabetic()) => {
                    if !text.is_empty() {
                        parts.push(TemplatePart::Lit(std::mem::take(&mut text)));
                    }
                    parts.push(self.dotted_path());
                }
                Some(c) => {
                    text.push(c);
                    let _ = self.bump();
                }
            }
        }
        if parts.is_empty() {
            return Ok(TokenKind::Str(text));
        }
        if !text.is_empty() {
            parts.push(TemplatePart::Lit(text));
        }
        Ok(TokenKind::Template(parts))
    }

    /// `${ ... }` inside a double-quoted string. Nested braces and quoted
    /// strings inside the expression are skipped over.
    fn braced_code(&mut self) -> Result<TemplatePart, CompileError> {
        let (line, column) = (self.line, self.column);
        let _ = self.bump();
        let _ = self.bump();
        let (code_line, code_column) = (self.line, self.column);
        let mut depth = 0usize;
        let mut source = String::new();
        let mut quote: Option<char> = None;
        loop {
            let Some(c) = self.bump() else {
                return Err(CompileError::new(line, column, "unterminated '${' in string"));
            };
            match quote {
                Some(q) => {
                    if c == '\\' {
                        source.push(c);
                        if let Some(next) = self.bump() {
                            source.push(next);
                        }
                        continue;
                    }
                    if c == q {
                        quote = None;
                    }
                }
                None => match c {
                    '\'' | '"' => quote = Some(c),
                    '{' => depth += 1,
                    '}' if depth == 0 => break,
                    '}' => depth -= 1,
                    _ => {}
                },
            }
            source.push(c);
        }
        if source.trim().is_empty() {
            return Err(CompileError::new(line, column, "empty '${}' in string"));
        }
        Ok(TemplatePart::Code {
            source,
            line: code_line,
            column: code_column,
        })
    }

    /// `$name` or `$name.prop.prop` inside a double-quoted string.
    fn dotted_path(&mut self) -> TemplatePart {
        let _ = self.bump();
        let (line, column) = (self.line, self.column);
        let mut source = self.word();
        while self.peek() == Some('.')
            && self.peek_at(1).is_some_and(|c| c == '_' || c.is_alphabetic())
        {
            let _ = self.bump();
            source.push('.');
            source.push_str(&self.word());
        }
        TemplatePart::Code {
            source,
            line,
            column,
        }
    }

    fn punct(&mut self) -> Result<TokenKind, CompileError> {
        let c = self.bump().unwrap_or('\0');
        let next = self.peek();
        let two = |lexer: &mut Self, kind: TokenKind| {
            let _ = lexer.bump();
            kind
        };
        Ok(match (c, next) {
            ('=', Some('=')) => two(self, TokenKind::EqEq),
            ('!', Some('=')) => two(self, TokenKind::NotEq),
            ('<', Some('=')) => two(self, TokenKind::LtEq),
            ('>', Some('=')) => two(self, TokenKind::GtEq),
            ('+', Some('=')) => two(self, TokenKind::PlusAssign),
            ('-', Some('=')) => two(self, TokenKind::MinusAssign),
            ('&', Some('&')) => two(self, TokenKind::AndAnd),
            ('|', Some('|')) => two(self, TokenKind::OrOr),
            ('=', _) => TokenKind::Assign,
            ('!', _) => TokenKind::Bang,
            ('<', _) => TokenKind::Lt,
            ('>', _) => TokenKind::Gt,
            ('+', _) => TokenKind::Plus,
            ('-', _) => TokenKind::Minus,
            ('*', _) => TokenKind::Star,
            ('/', _) => TokenKind::Slash,
            ('%', _) => TokenKind::Percent,
            ('(', _) => TokenKind::LParen,
            (')', _) => TokenKind::RParen,
            ('{', _) => TokenKind::LBrace,
            ('}', _) => TokenKind::RBrace,
            ('[', _) => TokenKind::LBracket,
            (']', _) => TokenKind::RBracket,
            (',', _) => TokenKind::Comma,
            ('.', _) => TokenKind::Dot,
            (':', _) => TokenKind::Colon,
            (';', _) => TokenKind::Semi,
            ('?', _) => TokenKind::Question,
            (other, _) => {
                return Err(CompileError::new(
                    self.line,
                    self.column.saturating_sub(1).max(1),
                    format!("unexpected character '{other}'"),
                ));
            }
        })
    }
}
