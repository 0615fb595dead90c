//! Query filter expressions
//!
//! The `{expr}` refinement of a multi-result query is a small expression
//! evaluated once per match. It is compiled at bind time using precedence
//! climbing, so malformed filters are configuration errors.
//!
//! Operands: integer literals, quoted strings, `i` (match index), `n` /
//! `o.length` (number of matches), `v` (the match itself) and `v.name` (a
//! named value of the match, read through the host). Operators, lowest
//! precedence first:
//! `||`, `&&`, `== != === !==`, `< <= > >=`, `+ -`, `* / %`, unary `! -`.

use crate::types::{ObtError, Result, Value};
use std::cmp::Ordering;

/// Compiled filter expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(i64),
    Str(String),
    Index,
    Count,
    /// `v` (`None`) or `v.name`
    Item(Option<String>),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinOp {
    fn precedence(self) -> u8 {
        match self {
            BinOp::Or => 1,
            BinOp::And => 2,
            BinOp::Eq | BinOp::Ne => 3,
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => 4,
            BinOp::Add | BinOp::Sub => 5,
            BinOp::Mul | BinOp::Div | BinOp::Mod => 6,
        }
    }
}

/// Evaluated operand
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Int(i64),
    Text(String),
}

impl Operand {
    fn from_value(value: Option<Value>) -> Self {
        match value {
            Some(Value::Str(s)) => Operand::Text(s),
            Some(v) if v.is_truthy() => Operand::Int(v.as_i64().unwrap_or(1)),
            _ => Operand::Int(0),
        }
    }

    fn bool(b: bool) -> Self {
        Operand::Int(b as i64)
    }

    /// Numeric view; text that is not a number has none
    pub fn num(&self) -> Option<i64> {
        match self {
            Operand::Int(v) => Some(*v),
            Operand::Text(s) => s.trim().parse().ok(),
        }
    }

    fn int(&self) -> i64 {
        self.num().unwrap_or(0)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Operand::Int(v) => *v != 0,
            Operand::Text(s) => !s.is_empty(),
        }
    }

    /// Two texts compare as strings, anything else numerically
    fn compare(&self, other: &Operand) -> Option<Ordering> {
        match (self, other) {
            (Operand::Text(a), Operand::Text(b)) => Some(a.cmp(b)),
            _ => Some(self.num()?.cmp(&other.num()?)),
        }
    }
}

/// Signature of the value reader behind `v` and `v.name`
pub type ValueReader<'a> = &'a dyn Fn(Option<&str>) -> Option<Value>;

/// The match a filter is evaluated for
#[derive(Clone, Copy)]
pub struct Match<'a> {
    pub index: usize,
    pub count: usize,
    value: Option<ValueReader<'a>>,
}

impl<'a> Match<'a> {
    /// Position only; `v` reads as absent
    pub fn at(index: usize, count: usize) -> Self {
        Self {
            index,
            count,
            value: None,
        }
    }

    pub fn with_value(mut self, value: ValueReader<'a>) -> Self {
        self.value = Some(value);
        self
    }

    fn read(&self, name: Option<&str>) -> Option<Value> {
        self.value.and_then(|read| read(name))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(i64),
    Str(String),
    Ident(String),
    Op(BinOp),
    Bang,
    LParen,
    RParen,
}

impl Expr {
    /// Compile filter text (the part between the braces)
    pub fn compile(text: &str) -> Result<Expr> {
        let tokens = tokenize(text)?;
        let mut parser = ExprParser {
            text,
            tokens,
            pos: 0,
        };
        let expr = parser.binary(0)?;
        if parser.pos != parser.tokens.len() {
            return Err(parser.error("trailing input"));
        }
        Ok(expr)
    }

    /// Evaluate for one match
    pub fn eval(&self, at: &Match<'_>) -> Operand {
        match self {
            Expr::Num(v) => Operand::Int(*v),
            Expr::Str(s) => Operand::Text(s.clone()),
            Expr::Index => Operand::Int(at.index as i64),
            Expr::Count => Operand::Int(at.count as i64),
            Expr::Item(name) => Operand::from_value(at.read(name.as_deref())),
            Expr::Not(e) => Operand::bool(!e.eval(at).is_truthy()),
            Expr::Neg(e) => Operand::Int(e.eval(at).int().wrapping_neg()),
            Expr::Binary(op, l, r) => {
                let a = l.eval(at);
                // short-circuit like the source language
                match op {
                    BinOp::Or if a.is_truthy() => return Operand::bool(true),
                    BinOp::And if !a.is_truthy() => return Operand::bool(false),
                    _ => {}
                }
                let b = r.eval(at);
                let ord = a.compare(&b);
                match op {
                    BinOp::Or | BinOp::And => Operand::bool(b.is_truthy()),
                    BinOp::Eq => Operand::bool(ord == Some(Ordering::Equal)),
                    BinOp::Ne => Operand::bool(ord != Some(Ordering::Equal)),
                    BinOp::Lt => Operand::bool(ord == Some(Ordering::Less)),
                    BinOp::Le => Operand::bool(matches!(ord, Some(Ordering::Less | Ordering::Equal))),
                    BinOp::Gt => Operand::bool(ord == Some(Ordering::Greater)),
                    BinOp::Ge => Operand::bool(matches!(ord, Some(Ordering::Greater | Ordering::Equal))),
                    BinOp::Add => Operand::Int(a.int().wrapping_add(b.int())),
                    BinOp::Sub => Operand::Int(a.int().wrapping_sub(b.int())),
                    BinOp::Mul => Operand::Int(a.int().wrapping_mul(b.int())),
                    BinOp::Div => Operand::Int(a.int().checked_div(b.int()).unwrap_or(0)),
                    BinOp::Mod => Operand::Int(a.int().checked_rem(b.int()).unwrap_or(0)),
                }
            }
        }
    }

    /// True if the match is kept
    pub fn keeps(&self, at: &Match<'_>) -> bool {
        self.eval(at).is_truthy()
    }
}

fn tokenize(text: &str) -> Result<Vec<Token>> {
    let err = |reason: String| ObtError::InvalidFilter {
        text: text.to_string(),
        reason,
    };
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        let third = chars.get(i + 2).copied();

        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            let digits: String = chars[start..i].iter().collect();
            let v = digits.parse().map_err(|_| err(format!("number `{}` out of range", digits)))?;
            tokens.push(Token::Num(v));
            continue;
        }
        if c == '\'' || c == '"' {
            let mut text = String::new();
            i += 1;
            loop {
                match chars.get(i) {
                    None => return Err(err("unterminated string".to_string())),
                    Some(&q) if q == c => break,
                    Some(&'\\') => {
                        i += 1;
                        text.extend(chars.get(i));
                    }
                    Some(&other) => text.push(other),
                }
                i += 1;
            }
            tokens.push(Token::Str(text));
            i += 1;
            continue;
        }
        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
            continue;
        }
        let (token, width) = match (c, next) {
            ('|', Some('|')) => (Token::Op(BinOp::Or), 2),
            ('&', Some('&')) => (Token::Op(BinOp::And), 2),
            ('=', Some('=')) if third == Some('=') => (Token::Op(BinOp::Eq), 3),
            ('=', Some('=')) => (Token::Op(BinOp::Eq), 2),
            ('!', Some('=')) if third == Some('=') => (Token::Op(BinOp::Ne), 3),
            ('!', Some('=')) => (Token::Op(BinOp::Ne), 2),
            ('<', Some('=')) => (Token::Op(BinOp::Le), 2),
            ('>', Some('=')) => (Token::Op(BinOp::Ge), 2),
            ('<', _) => (Token::Op(BinOp::Lt), 1),
            ('>', _) => (Token::Op(BinOp::Gt), 1),
            ('+', _) => (Token::Op(BinOp::Add), 1),
            ('-', _) => (Token::Op(BinOp::Sub), 1),
            ('*', _) => (Token::Op(BinOp::Mul), 1),
            ('/', _) => (Token::Op(BinOp::Div), 1),
            ('%', _) => (Token::Op(BinOp::Mod), 1),
            ('!', _) => (Token::Bang, 1),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            _ => return Err(err(format!("unexpected character `{}`", c))),
        };
        tokens.push(token);
        i += width;
    }
    Ok(tokens)
}

struct ExprParser<'a> {
    text: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> ExprParser<'a> {
    fn error(&self, reason: impl Into<String>) -> ObtError {
        ObtError::InvalidFilter {
            text: self.text.to_string(),
            reason: reason.into(),
        }
    }

    fn binary(&mut self, min_prec: u8) -> Result<Expr> {
        let mut lhs = self.unary()?;

        while let Some(Token::Op(op)) = self.tokens.get(self.pos).cloned() {
            let prec = op.precedence();
            if prec <= min_prec {
                break;
            }
            self.pos += 1;
            let rhs = self.binary(prec)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr> {
        match self.tokens.get(self.pos).cloned() {
            Some(Token::Bang) => {
                self.pos += 1;
                Ok(Expr::Not(Box::new(self.unary()?)))
            }
            Some(Token::Op(BinOp::Sub)) => {
                self.pos += 1;
                Ok(Expr::Neg(Box::new(self.unary()?)))
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Expr> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| self.error("unexpected end of expression"))?;
        self.pos += 1;

        match token {
            Token::Num(v) => Ok(Expr::Num(v)),
            Token::Str(s) => Ok(Expr::Str(s)),
            Token::Ident(name) => match name.as_str() {
                "i" => Ok(Expr::Index),
                "n" | "o.length" => Ok(Expr::Count),
                "v" => Ok(Expr::Item(None)),
                other => match other.strip_prefix("v.") {
                    Some(field) if !field.is_empty() && !field.contains('.') => {
                        Ok(Expr::Item(Some(field.to_string())))
                    }
                    _ => Err(self.error(format!("unknown identifier `{}`", other))),
                },
            },
            Token::LParen => {
                let inner = self.binary(0)?;
                match self.tokens.get(self.pos) {
                    Some(Token::RParen) => {
                        self.pos += 1;
                        Ok(inner)
                    }
                    _ => Err(self.error("missing `)`")),
                }
            }
            other => Err(self.error(format!("unexpected token {:?}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kept(expr: &str, count: usize) -> Vec<usize> {
        let e = Expr::compile(expr).unwrap();
        (0..count).filter(|&i| e.keeps(&Match::at(i, count))).collect()
    }

    fn int(expr: &str, index: usize) -> i64 {
        match Expr::compile(expr).unwrap().eval(&Match::at(index, 0)) {
            Operand::Int(v) => v,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_index_predicates() {
        assert_eq!(kept("i<3", 6), vec![0, 1, 2]);
        assert_eq!(kept("i % 2 == 0", 5), vec![0, 2, 4]);
        assert_eq!(kept("i >= n - 2", 5), vec![3, 4]);
        assert_eq!(kept("i == 0 || i === o.length - 1", 4), vec![0, 3]);
        assert_eq!(kept("!(i > 1) && i != 0", 4), vec![1]);
        assert_eq!(kept("i <\n\t 2", 4), vec![0, 1]);
    }

    #[test]
    fn test_precedence() {
        assert_eq!(int("1 + 2 * 3", 0), 7);
        assert_eq!(int("(1 + 2) * 3", 0), 9);
        assert_eq!(int("10 - 3 - 2", 0), 5);
        assert_eq!(int("-i + 4", 1), 3);
    }

    #[test]
    fn test_division_by_zero_is_false() {
        assert_eq!(int("4 / (i - i)", 2), 0);
        assert_eq!(int("4 % 0", 0), 0);
    }

    #[test]
    fn test_item_values() {
        let colors = ["red", "blue", "red", ""];
        let sizes = [3, 12, 7, 0];
        let e = Expr::compile("v.color == 'red' && v.size > 5").unwrap();
        let f = Expr::compile("v.color && v").unwrap();

        let (mut both, mut colored) = (Vec::new(), Vec::new());
        for i in 0..colors.len() {
            let read = |name: Option<&str>| match name {
                None => Some(Value::Int(i as i64 + 1)),
                Some("color") => Some(Value::from(colors[i])),
                Some("size") => Some(Value::Int(sizes[i])),
                Some(_) => None,
            };
            let at = Match::at(i, colors.len()).with_value(&read);
            if e.keeps(&at) {
                both.push(i);
            }
            if f.keeps(&at) {
                colored.push(i);
            }
        }
        assert_eq!(both, vec![2]);
        assert_eq!(colored, vec![0, 1, 2]);
    }

    #[test]
    fn test_mixed_comparisons() {
        let read = |name: Option<&str>| match name {
            Some("n") => Some(Value::from("12")),
            Some("word") => Some(Value::from("abc")),
            _ => None,
        };
        let at = Match::at(0, 1).with_value(&read);
        let holds = |expr: &str| Expr::compile(expr).unwrap().keeps(&at);

        assert!(holds("v.n == 12"));
        assert!(holds("v.n > 9"));
        assert!(!holds("v.word == 0"));
        assert!(holds("v.word != 0"));
        assert!(holds("v.word < \"abd\""));
        assert!(!holds("v.missing"));
        assert!(!holds("v"));
    }

    #[test]
    fn test_compile_errors() {
        assert!(Expr::compile("v.a.b == 3").is_err());
        assert!(Expr::compile("w == 3").is_err());
        assert!(Expr::compile("v.x == 'open").is_err());
        assert!(Expr::compile("i <").is_err());
        assert!(Expr::compile("(i < 3").is_err());
        assert!(Expr::compile("i < 3 )").is_err());
        assert!(Expr::compile("i # 3").is_err());
    }
}
