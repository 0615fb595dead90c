//! Argument literal lists
//!
//! Parses the text between the parentheses of a call, e.g.
//! `1, 'two', [3, 4], {five: 5}, _2`, into frozen template values. The last
//! argument may be a flow sentinel (`_`, `_1` ... `_9`) asking the cell to
//! splice live stack values into the arguments.

use crate::types::{ObtError, Result, Value};
use std::collections::BTreeMap;

/// Frozen argument template of one call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Template {
    /// Literal arguments, in order
    pub args: Vec<Value>,
    /// Flow extraction count: `Some(0)` for `_`, `Some(k)` for `_k`
    pub rest: Option<usize>,
}

/// One parsed argument: a literal or a flow sentinel
#[derive(Debug, Clone, PartialEq)]
enum Arg {
    Lit(Value),
    Flow(usize, String),
}

/// Parse an argument list (without the surrounding parentheses)
pub fn parse_args(text: &str) -> Result<Template> {
    let mut reader = Reader::new(text);
    let mut parsed = Vec::new();

    reader.skip_ws();
    while !reader.at_end() {
        parsed.push(reader.arg()?);
        reader.skip_ws();
        match reader.peek() {
            Some(',') => {
                reader.bump();
                reader.skip_ws();
            }
            None => break,
            Some(c) => return Err(reader.error(format!("unexpected `{}`", c))),
        }
    }

    let mut template = Template::default();
    let last = parsed.len().saturating_sub(1);

    for (i, arg) in parsed.into_iter().enumerate() {
        match arg {
            Arg::Lit(v) => template.args.push(v),
            Arg::Flow(n, _) if i == last => template.rest = Some(n),
            Arg::Flow(_, name) => return Err(ObtError::MisplacedSentinel(name)),
        }
    }
    Ok(template)
}

struct Reader<'a> {
    src: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            chars: src.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, reason: impl Into<String>) -> ObtError {
        ObtError::InvalidArgs {
            text: self.src.to_string(),
            reason: reason.into(),
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, want: char) -> Result<()> {
        self.skip_ws();
        match self.bump() {
            Some(c) if c == want => Ok(()),
            Some(c) => Err(self.error(format!("expected `{}`, found `{}`", want, c))),
            None => Err(self.error(format!("expected `{}`, found end of input", want))),
        }
    }

    fn arg(&mut self) -> Result<Arg> {
        let start = self.pos;
        if let Some(word) = self.word() {
            if let Some(n) = sentinel(&word) {
                return Ok(Arg::Flow(n, word));
            }
            self.pos = start;
        }
        self.value().map(Arg::Lit)
    }

    fn value(&mut self) -> Result<Value> {
        self.skip_ws();
        match self.peek() {
            None => Err(self.error("expected a value")),
            Some('[') => self.list(),
            Some('{') => self.map(),
            Some(q @ ('\'' | '"' | '`')) => {
                self.bump();
                self.string(q).map(Value::Str)
            }
            Some(c) if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => self.number(),
            Some(_) => {
                let word = self
                    .word()
                    .ok_or_else(|| self.error(format!("unexpected `{}`", self.chars[self.pos])))?;
                match word.as_str() {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    "null" => Ok(Value::Null),
                    "undefined" => Ok(Value::Nil),
                    "NaN" => Ok(Value::Float(f64::NAN)),
                    "Infinity" => Ok(Value::Float(f64::INFINITY)),
                    other => Err(self.error(format!("unknown identifier `{}`", other))),
                }
            }
        }
    }

    fn word(&mut self) -> Option<String> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$')
        {
            self.pos += 1;
        }
        if self.pos == start || self.chars[start].is_ascii_digit() {
            self.pos = start;
            return None;
        }
        Some(self.chars[start..self.pos].iter().collect())
    }

    fn number(&mut self) -> Result<Value> {
        let start = self.pos;
        let mut sign = 1.0;
        match self.peek() {
            Some('-') => {
                sign = -1.0;
                self.pos += 1;
            }
            Some('+') => self.pos += 1,
            _ => {}
        }
        if self.peek() == Some('I') {
            return match self.word().as_deref() {
                Some("Infinity") => Ok(Value::Float(sign * f64::INFINITY)),
                _ => Err(self.error("malformed number")),
            };
        }
        if self.peek() == Some('0') && matches!(self.chars.get(self.pos + 1), Some('x' | 'X')) {
            self.pos += 2;
            let digits_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.pos += 1;
            }
            let digits: String = self.chars[digits_start..self.pos].iter().collect();
            let v = i64::from_str_radix(&digits, 16).map_err(|e| self.error(e.to_string()))?;
            return Ok(Value::Int(if sign < 0.0 { -v } else { v }));
        }

        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' => {}
                '.' => is_float = true,
                'e' | 'E' => {
                    is_float = true;
                    if matches!(self.chars.get(self.pos + 1), Some('+' | '-')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        if is_float {
            text.parse::<f64>()
                .map(Value::Float)
                .map_err(|_| self.error(format!("malformed number `{}`", text)))
        } else {
            text.parse::<i64>()
                .map(Value::Int)
                .map_err(|_| self.error(format!("malformed number `{}`", text)))
        }
    }

    fn string(&mut self, quote: char) -> Result<String> {
        let mut out = String::new();
        loop {
            let c = self
                .bump()
                .ok_or_else(|| self.error("unterminated string"))?;
            if c == quote {
                return Ok(out);
            }
            if c != '\\' {
                out.push(c);
                continue;
            }
            let esc = self
                .bump()
                .ok_or_else(|| self.error("unterminated escape"))?;
            match esc {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                '0' => out.push('\0'),
                'u' => {
                    let hex: String = (0..4).filter_map(|_| self.bump()).collect();
                    let ch = u32::from_str_radix(&hex, 16)
                        .ok()
                        .and_then(char::from_u32)
                        .ok_or_else(|| self.error(format!("bad unicode escape `{}`", hex)))?;
                    out.push(ch);
                }
                other => out.push(other),
            }
        }
    }

    fn list(&mut self) -> Result<Value> {
        self.expect('[')?;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(']') {
                self.bump();
                return Ok(Value::List(items));
            }
            items.push(self.value()?);
            self.skip_ws();
            match self.bump() {
                Some(',') => {}
                Some(']') => return Ok(Value::List(items)),
                _ => return Err(self.error("expected `,` or `]` in array")),
            }
        }
    }

    fn map(&mut self) -> Result<Value> {
        self.expect('{')?;
        let mut map = BTreeMap::new();
        loop {
            self.skip_ws();
            let key = match self.peek() {
                Some('}') => {
                    self.bump();
                    return Ok(Value::Map(map));
                }
                Some(q @ ('\'' | '"' | '`')) => {
                    self.bump();
                    self.string(q)?
                }
                _ => self
                    .word()
                    .or_else(|| self.digits())
                    .ok_or_else(|| self.error("expected an object key"))?,
            };
            self.expect(':')?;
            let value = self.value()?;
            map.insert(key, value);
            self.skip_ws();
            match self.bump() {
                Some(',') => {}
                Some('}') => return Ok(Value::Map(map)),
                _ => return Err(self.error("expected `,` or `}` in object")),
            }
        }
    }

    fn digits(&mut self) -> Option<String> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        (self.pos > start).then(|| self.chars[start..self.pos].iter().collect())
    }
}

/// Flow sentinel value: `_` is 0, `_1`..`_9` are 1..9
fn sentinel(word: &str) -> Option<usize> {
    match word.as_bytes() {
        [b'_'] => Some(0),
        [b'_', d @ b'1'..=b'9'] => Some((d - b'0') as usize),
        _ => None,
    }
}
