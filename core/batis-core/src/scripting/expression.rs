//! Test expressions for conditional fragments
//!
//! Grammar (lowest precedence first):
//!
//! ```text
//! or      := and (("or" | "||") and)*
//! and     := unary (("and" | "&&") unary)*
//! unary   := ("not" | "!") unary | compare
//! compare := primary (op primary)?        op: == != < <= > >= eq neq lt lte gt gte
//! primary := literal | path | "(" or ")" | "-" number
//! ```
//!
//! Expressions are parsed once when the fragment tree is built and
//! evaluated against a [`DynamicContext`] on every render.

use crate::error::{BatisError, BatisResult};
use crate::scripting::context::DynamicContext;
use crate::value::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Path(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare {
        left: Box<Expr>,
        op: CompareOp,
        right: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Op(CompareOp),
    And,
    Or,
    Not,
    Minus,
    LParen,
    RParen,
}

/// A parsed test expression.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    root: Expr,
}

impl Expression {
    pub fn parse(source: &str) -> BatisResult<Self> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            source,
            tokens,
            pos: 0,
        };
        let root = parser.parse_or()?;
        if parser.pos < parser.tokens.len() {
            return Err(parser.error(format!(
                "unexpected token {:?}",
                parser.tokens[parser.pos]
            )));
        }
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates to a value.
    pub fn evaluate(&self, ctx: &DynamicContext) -> BatisResult<Value> {
        self.eval(&self.root, ctx)
    }

    /// Evaluates and applies truthiness.
    pub fn evaluate_bool(&self, ctx: &DynamicContext) -> BatisResult<bool> {
        Ok(self.evaluate(ctx)?.is_truthy())
    }

    fn eval(&self, expr: &Expr, ctx: &DynamicContext) -> BatisResult<Value> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Path(path) => Ok(ctx.resolve(path)),
            Expr::Not(inner) => Ok(Value::Bool(!self.eval(inner, ctx)?.is_truthy())),
            Expr::And(l, r) => {
                if !self.eval(l, ctx)?.is_truthy() {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.eval(r, ctx)?.is_truthy()))
            }
            Expr::Or(l, r) => {
                if self.eval(l, ctx)?.is_truthy() {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.eval(r, ctx)?.is_truthy()))
            }
            Expr::Compare { left, op, right } => {
                let l = self.eval(left, ctx)?;
                let r = self.eval(right, ctx)?;
                self.compare(&l, *op, &r).map(Value::Bool)
            }
        }
    }

    fn compare(&self, left: &Value, op: CompareOp, right: &Value) -> BatisResult<bool> {
        match op {
            CompareOp::Eq => Ok(loose_eq(left, right)),
            CompareOp::NotEq => Ok(!loose_eq(left, right)),
            _ => {
                // null never orders against anything
                if left.is_null() || right.is_null() {
                    return Ok(false);
                }
                let ordering = order(left, right).ok_or_else(|| BatisError::Expression {
                    expression: self.source.clone(),
                    message: format!("cannot compare {left} with {right}"),
                })?;
                Ok(match op {
                    CompareOp::Lt => ordering == Ordering::Less,
                    CompareOp::LtEq => ordering != Ordering::Greater,
                    CompareOp::Gt => ordering == Ordering::Greater,
                    CompareOp::GtEq => ordering != Ordering::Less,
                    CompareOp::Eq => ordering == Ordering::Equal,
                    CompareOp::NotEq => ordering != Ordering::Equal,
                })
            }
        }
    }
}

fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) => l == r,
        _ => left == right,
    }
}

fn order(left: &Value, right: &Value) -> Option<Ordering> {
    if let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) {
        return l.partial_cmp(&r);
    }
    match (left, right) {
        (Value::Text(l), Value::Text(r)) => Some(l.cmp(r)),
        (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
        _ => None,
    }
}

fn tokenize(source: &str) -> BatisResult<Vec<Token>> {
    let err = |message: String| BatisError::Expression {
        expression: source.to_string(),
        message,
    };
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '=' | '!' | '<' | '>' => {
                let next = chars.get(i + 1).copied();
                let (token, width) = match (c, next) {
                    ('=', Some('=')) => (Token::Op(CompareOp::Eq), 2),
                    ('!', Some('=')) => (Token::Op(CompareOp::NotEq), 2),
                    ('<', Some('=')) => (Token::Op(CompareOp::LtEq), 2),
                    ('>', Some('=')) => (Token::Op(CompareOp::GtEq), 2),
                    ('<', _) => (Token::Op(CompareOp::Lt), 1),
                    ('>', _) => (Token::Op(CompareOp::Gt), 1),
                    ('!', _) => (Token::Not, 1),
                    _ => return Err(err(format!("unexpected '=' at offset {i}"))),
                };
                tokens.push(token);
                i += width;
            }
            '&' | '|' => {
                if chars.get(i + 1) != Some(&c) {
                    return Err(err(format!("expected '{c}{c}' at offset {i}")));
                }
                tokens.push(if c == '&' { Token::And } else { Token::Or });
                i += 2;
            }
            '\'' | '"' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(err("unterminated string literal".to_string())),
                        Some('\\') => {
                            if let Some(escaped) = chars.get(i + 1) {
                                text.push(*escaped);
                            }
                            i += 2;
                        }
                        Some(ch) if *ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            text.push(*ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(text));
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                if literal.contains('.') {
                    let f = literal
                        .parse::<f64>()
                        .map_err(|_| err(format!("invalid number '{literal}'")))?;
                    tokens.push(Token::Float(f));
                } else {
                    let n = literal
                        .parse::<i64>()
                        .map_err(|_| err(format!("invalid number '{literal}'")))?;
                    tokens.push(Token::Int(n));
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "eq" => Token::Op(CompareOp::Eq),
                    "neq" => Token::Op(CompareOp::NotEq),
                    "lt" => Token::Op(CompareOp::Lt),
                    "lte" => Token::Op(CompareOp::LtEq),
                    "gt" => Token::Op(CompareOp::Gt),
                    "gte" => Token::Op(CompareOp::GtEq),
                    _ => Token::Ident(word),
                });
            }
            other => return Err(err(format!("unexpected character '{other}' at offset {i}"))),
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, message: String) -> BatisError {
        BatisError::Expression {
            expression: self.source.to_string(),
            message,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn parse_or(&mut self) -> BatisResult<Expr> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> BatisResult<Expr> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> BatisResult<Expr> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> BatisResult<Expr> {
        let left = self.parse_primary()?;
        if let Some(Token::Op(op)) = self.peek() {
            let op = *op;
            self.pos += 1;
            let right = self.parse_primary()?;
            return Ok(Expr::Compare {
                left: Box::new(left),
                op,
                right: Box::new(right),
            });
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> BatisResult<Expr> {
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(self.error("expected ')'".to_string())),
                }
            }
            Some(Token::Minus) => match self.next() {
                Some(Token::Int(n)) => Ok(Expr::Literal(Value::Int(-n))),
                Some(Token::Float(f)) => Ok(Expr::Literal(Value::Float(-f))),
                _ => Err(self.error("expected a number after '-'".to_string())),
            },
            Some(Token::Int(n)) => Ok(Expr::Literal(Value::Int(n))),
            Some(Token::Float(f)) => Ok(Expr::Literal(Value::Float(f))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::Text(s))),
            Some(Token::Ident(word)) => Ok(match word.as_str() {
                "null" => Expr::Literal(Value::Null),
                "true" => Expr::Literal(Value::Bool(true)),
                "false" => Expr::Literal(Value::Bool(false)),
                _ => Expr::Path(word),
            }),
            Some(other) => Err(self.error(format!("unexpected token {other:?}"))),
            None => Err(self.error("unexpected end of input".to_string())),
        }
    }
}
