//! Type cost evaluation for LLVM-style type descriptors.
//!
//! A descriptor is parsed into a [`TypeExpr`] by a small recursive-descent
//! parser and then costed. The cost approximates how many bytes must be
//! marshalled to move a value of that type across a compartment boundary.
//!
//! ```text
//! type   := base suffix*
//! suffix := '*' | '(' params? ')'
//! base   := iN | float-name | 'void' | 'opaque' | 'ptr' | %name
//!         | '[' INT 'x' type ']' | '<' INT 'x' type '>'
//!         | '{' (type (',' type)*)? '}'
//!         | '(' type ')' '(' params? ')'
//! params := param (',' param)*
//! param  := type | '...'
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Deepest nesting of arrays, structs and function types a descriptor may use.
pub const MAX_TYPE_DEPTH: usize = 64;

/// Failure to match a descriptor against the type grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeCostError {
    #[error("Malformed type descriptor `{descriptor}` at offset {offset}: {reason}")]
    Malformed { descriptor: String, offset: usize, reason: String },
}

/// Parsed form of a type descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeExpr {
    /// Integer or floating point value of the given bit width.
    Scalar { bits: u32 },
    /// `void`, named/opaque structs and other types whose size is unknown.
    Opaque,
    /// Fixed-size array or vector.
    Array { len: u64, element: Box<TypeExpr> },
    /// Literal struct.
    Struct { fields: Vec<TypeExpr> },
    /// Callback: one pointer whose cost follows its signature.
    Function { ret: Box<TypeExpr>, params: Vec<TypeExpr> },
    /// `levels` pointer markers applied to `pointee`.
    Pointer { levels: u32, pointee: Box<TypeExpr> },
}

impl TypeExpr {
    /// Estimated byte cost of this type given the cost of one pointer level.
    pub fn cost(&self, pointer_unit_cost: u64) -> u64 {
        match self {
            TypeExpr::Scalar { bits } => u64::from(bits.div_ceil(8).max(1)),
            TypeExpr::Opaque => 0,
            TypeExpr::Array { len, element } => len.saturating_mul(element.cost(pointer_unit_cost)),
            TypeExpr::Struct { fields } => {
                fields.iter().fold(0u64, |acc, f| acc.saturating_add(f.cost(pointer_unit_cost)))
            }
            TypeExpr::Function { ret, params } => {
                let signature = params
                    .iter()
                    .fold(ret.cost(pointer_unit_cost), |acc, p| {
                        acc.saturating_add(p.cost(pointer_unit_cost))
                    });
                pointer_unit_cost.saturating_mul(signature)
            }
            TypeExpr::Pointer { levels, pointee } => {
                let per_level = match pointee.as_ref() {
                    TypeExpr::Opaque => pointer_unit_cost,
                    other => pointer_unit_cost.saturating_mul(other.cost(pointer_unit_cost)),
                };
                u64::from(*levels).saturating_mul(per_level)
            }
        }
    }

    fn add_pointer_level(self) -> TypeExpr {
        match self {
            TypeExpr::Pointer { levels, pointee } => {
                TypeExpr::Pointer { levels: levels + 1, pointee }
            }
            other => TypeExpr::Pointer { levels: 1, pointee: Box::new(other) },
        }
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Scalar { bits } => write!(f, "i{bits}"),
            TypeExpr::Opaque => write!(f, "opaque"),
            TypeExpr::Array { len, element } => write!(f, "[{len} x {element}]"),
            TypeExpr::Struct { fields } => {
                write!(f, "{{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{field}")?;
                }
                write!(f, "}}")
            }
            TypeExpr::Function { ret, params } => {
                write!(f, "({ret})(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ")")
            }
            TypeExpr::Pointer { levels, pointee } => {
                write!(f, "{pointee}")?;
                for _ in 0..*levels {
                    write!(f, "*")?;
                }
                Ok(())
            }
        }
    }
}

/// Evaluator bound to a pointer unit cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCostEvaluator {
    pub pointer_unit_cost: u64,
}

impl TypeCostEvaluator {
    pub fn new(pointer_unit_cost: u64) -> Self {
        Self { pointer_unit_cost }
    }

    pub fn cost(&self, descriptor: &str) -> Result<u64, TypeCostError> {
        type_cost(descriptor, self.pointer_unit_cost)
    }
}

/// Parse and cost a descriptor in one step.
pub fn type_cost(descriptor: &str, pointer_unit_cost: u64) -> Result<u64, TypeCostError> {
    Ok(parse_type(descriptor)?.cost(pointer_unit_cost))
}

/// Parse a descriptor into a [`TypeExpr`].
pub fn parse_type(descriptor: &str) -> Result<TypeExpr, TypeCostError> {
    let tokens = tokenize(descriptor)?;
    let mut parser = Parser { descriptor, tokens, pos: 0, depth: 0 };
    let ty = parser.parse_type()?;
    if let Some(tok) = parser.peek() {
        return Err(parser.error_at(tok.offset, format!("unexpected trailing `{}`", tok.kind)));
    }
    Ok(ty)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind {
    Star,
    LBracket,
    RBracket,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LAngle,
    RAngle,
    Comma,
    Ellipsis,
    Int(u64),
    Ident(String),
    Named(String),
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Star => write!(f, "*"),
            TokenKind::LBracket => write!(f, "["),
            TokenKind::RBracket => write!(f, "]"),
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::LBrace => write!(f, "{{"),
            TokenKind::RBrace => write!(f, "}}"),
            TokenKind::LAngle => write!(f, "<"),
            TokenKind::RAngle => write!(f, ">"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Ellipsis => write!(f, "..."),
            TokenKind::Int(n) => write!(f, "{n}"),
            TokenKind::Ident(s) => write!(f, "{s}"),
            TokenKind::Named(s) => write!(f, "%{s}"),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    offset: usize,
}

fn malformed(descriptor: &str, offset: usize, reason: impl Into<String>) -> TypeCostError {
    TypeCostError::Malformed { descriptor: descriptor.to_string(), offset, reason: reason.into() }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$' | '-')
}

fn tokenize(descriptor: &str) -> Result<Vec<Token>, TypeCostError> {
    let mut tokens = Vec::new();
    let mut chars = descriptor.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        let single = match c {
            '*' => Some(TokenKind::Star),
            '[' => Some(TokenKind::LBracket),
            ']' => Some(TokenKind::RBracket),
            '(' => Some(TokenKind::LParen),
            ')' => Some(TokenKind::RParen),
            '{' => Some(TokenKind::LBrace),
            '}' => Some(TokenKind::RBrace),
            '<' => Some(TokenKind::LAngle),
            '>' => Some(TokenKind::RAngle),
            ',' => Some(TokenKind::Comma),
            _ => None,
        };
        if let Some(kind) = single {
            chars.next();
            tokens.push(Token { kind, offset });
            continue;
        }

        if c.is_whitespace() {
            chars.next();
        } else if c == '.' {
            let dots: String = descriptor[offset..].chars().take(3).collect();
            if dots != "..." {
                return Err(malformed(descriptor, offset, "stray `.`"));
            }
            for _ in 0..3 {
                chars.next();
            }
            tokens.push(Token { kind: TokenKind::Ellipsis, offset });
        } else if c.is_ascii_digit() {
            let mut end = offset;
            while let Some(&(i, d)) = chars.peek() {
                if !d.is_ascii_digit() {
                    break;
                }
                end = i + d.len_utf8();
                chars.next();
            }
            let value = descriptor[offset..end]
                .parse::<u64>()
                .map_err(|e| malformed(descriptor, offset, format!("bad integer: {e}")))?;
            tokens.push(Token { kind: TokenKind::Int(value), offset });
        } else if c == '%' || c == '@' {
            chars.next();
            let start = offset + 1;
            let mut end = start;
            while let Some(&(i, d)) = chars.peek() {
                if !is_name_char(d) {
                    break;
                }
                end = i + d.len_utf8();
                chars.next();
            }
            if end == start {
                return Err(malformed(descriptor, offset, "empty type name"));
            }
            tokens.push(Token { kind: TokenKind::Named(descriptor[start..end].to_string()), offset });
        } else if c.is_ascii_alphabetic() || c == '_' {
            let mut end = offset;
            while let Some(&(i, d)) = chars.peek() {
                if !(d.is_ascii_alphanumeric() || d == '_') {
                    break;
                }
                end = i + d.len_utf8();
                chars.next();
            }
            tokens.push(Token { kind: TokenKind::Ident(descriptor[offset..end].to_string()), offset });
        } else {
            return Err(malformed(descriptor, offset, format!("unexpected character `{c}`")));
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    descriptor: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    /// Type constructors currently open around the cursor.
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn end_offset(&self) -> usize {
        self.descriptor.len()
    }

    fn error_at(&self, offset: usize, reason: impl Into<String>) -> TypeCostError {
        malformed(self.descriptor, offset, reason)
    }

    fn next(&mut self) -> Result<Token, TypeCostError> {
        let tok = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| self.error_at(self.end_offset(), "unexpected end of descriptor"))?;
        self.pos += 1;
        Ok(tok)
    }

    fn expect(&mut self, expected: TokenKind) -> Result<(), TypeCostError> {
        let tok = self.next()?;
        if tok.kind == expected {
            Ok(())
        } else {
            Err(self.error_at(tok.offset, format!("expected `{expected}`, found `{}`", tok.kind)))
        }
    }

    fn descend(&mut self) -> Result<(), TypeCostError> {
        self.depth += 1;
        if self.depth > MAX_TYPE_DEPTH {
            let offset = self.peek().map_or(self.end_offset(), |t| t.offset);
            return Err(self.error_at(offset, "type nesting too deep"));
        }
        Ok(())
    }

    fn parse_type(&mut self) -> Result<TypeExpr, TypeCostError> {
        let outer = self.depth;
        let ty = self.parse_suffixed();
        self.depth = outer;
        ty
    }

    fn parse_suffixed(&mut self) -> Result<TypeExpr, TypeCostError> {
        self.descend()?;
        let mut ty = self.parse_base()?;
        // Set after an LLVM-style `ret (params)`: the next `*` is the
        // function pointer itself, not an extra level.
        let mut bare_function = false;

        loop {
            match self.peek_kind() {
                Some(TokenKind::Star) => {
                    self.pos += 1;
                    if bare_function {
                        bare_function = false;
                    } else {
                        ty = ty.add_pointer_level();
                    }
                }
                Some(TokenKind::LParen) => {
                    // Each suffix wraps `ty` one level deeper.
                    self.descend()?;
                    self.pos += 1;
                    let params = self.parse_params(TokenKind::RParen)?;
                    ty = TypeExpr::Function { ret: Box::new(ty), params };
                    bare_function = true;
                }
                _ => break,
            }
        }

        Ok(ty)
    }

    fn parse_base(&mut self) -> Result<TypeExpr, TypeCostError> {
        let tok = self.next()?;
        match tok.kind {
            TokenKind::Ident(name) => self.named_base(&name, tok.offset),
            TokenKind::Named(_) => Ok(TypeExpr::Opaque),
            TokenKind::LBracket => self.parse_sequence(TokenKind::RBracket),
            TokenKind::LAngle => self.parse_sequence(TokenKind::RAngle),
            TokenKind::LBrace => {
                let fields = self.parse_list(TokenKind::RBrace, false)?;
                Ok(TypeExpr::Struct { fields })
            }
            TokenKind::LParen => {
                let ret = self.parse_type()?;
                self.expect(TokenKind::RParen)?;
                self.expect(TokenKind::LParen)?;
                let params = self.parse_params(TokenKind::RParen)?;
                Ok(TypeExpr::Function { ret: Box::new(ret), params })
            }
            other => Err(self.error_at(tok.offset, format!("expected a type, found `{other}`"))),
        }
    }

    fn named_base(&self, name: &str, offset: usize) -> Result<TypeExpr, TypeCostError> {
        let bits = match name {
            "void" | "opaque" | "label" | "metadata" | "token" => return Ok(TypeExpr::Opaque),
            "ptr" => {
                return Ok(TypeExpr::Pointer { levels: 1, pointee: Box::new(TypeExpr::Opaque) })
            }
            "half" | "bfloat" => 16,
            "float" => 32,
            "double" => 64,
            "x86_fp80" => 80,
            "fp128" | "ppc_fp128" => 128,
            _ => {
                let width = name
                    .strip_prefix('i')
                    .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
                    .and_then(|digits| digits.parse::<u32>().ok())
                    .ok_or_else(|| self.error_at(offset, format!("unknown type `{name}`")))?;
                if width == 0 {
                    return Err(self.error_at(offset, "integer width must be at least 1"));
                }
                width
            }
        };
        Ok(TypeExpr::Scalar { bits })
    }

    /// `K x T` followed by `close`; the opening bracket is already consumed.
    fn parse_sequence(&mut self, close: TokenKind) -> Result<TypeExpr, TypeCostError> {
        let len_tok = self.next()?;
        let len = match len_tok.kind {
            TokenKind::Int(n) => n,
            other => {
                return Err(self.error_at(len_tok.offset, format!("expected length, found `{other}`")))
            }
        };
        let x_tok = self.next()?;
        if x_tok.kind != TokenKind::Ident("x".to_string()) {
            return Err(self.error_at(x_tok.offset, format!("expected `x`, found `{}`", x_tok.kind)));
        }
        let element = self.parse_type()?;
        self.expect(close)?;
        Ok(TypeExpr::Array { len, element: Box::new(element) })
    }

    fn parse_params(&mut self, close: TokenKind) -> Result<Vec<TypeExpr>, TypeCostError> {
        self.parse_list(close, true)
    }

    fn parse_list(
        &mut self,
        close: TokenKind,
        allow_varargs: bool,
    ) -> Result<Vec<TypeExpr>, TypeCostError> {
        let mut items = Vec::new();
        if self.peek_kind() == Some(&close) {
            self.pos += 1;
            return Ok(items);
        }

        loop {
            if allow_varargs && self.peek_kind() == Some(&TokenKind::Ellipsis) {
                self.pos += 1;
                self.expect(close)?;
                return Ok(items);
            }
            items.push(self.parse_type()?);
            let tok = self.next()?;
            if tok.kind == close {
                return Ok(items);
            }
            if tok.kind != TokenKind::Comma {
                return Err(self.error_at(
                    tok.offset,
                    format!("expected `,` or `{close}`, found `{}`", tok.kind),
                ));
            }
        }
    }
}
