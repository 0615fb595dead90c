//! Guarded single-character splitter
//!
//! Splits attribute text on one delimiter character while keeping quoted
//! strings and, when configured, `()`, `[]` and `{}` spans intact. The
//! splitter itself is an immutable description; all scanning state lives in
//! the [`Split`] iterator, so independent splits never influence each other.

/// A span kind whose content is never split
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// `'...'`, `"..."` and `` `...` `` with backslash escapes
    Quote,
    /// `(...)`, the argument list of a call
    Call,
    /// `[...]`
    Square,
    /// `{...}`
    Brace,
}

impl Guard {
    fn pair(self) -> Option<(char, char)> {
        match self {
            Guard::Quote => None,
            Guard::Call => Some(('(', ')')),
            Guard::Square => Some(('[', ']')),
            Guard::Brace => Some(('{', '}')),
        }
    }
}

/// Splitter configuration: one delimiter plus the guarded span kinds
#[derive(Debug, Clone)]
pub struct Spliter {
    sep: char,
    guards: Vec<Guard>,
}

impl Spliter {
    /// Create a splitter with no guards
    pub fn new(sep: char) -> Self {
        Self {
            sep,
            guards: Vec::new(),
        }
    }

    /// Builder method: add a guarded span kind
    pub fn guard(mut self, guard: Guard) -> Self {
        if !self.guards.contains(&guard) {
            self.guards.push(guard);
        }
        self
    }

    /// Split on every unguarded delimiter
    pub fn split<'a>(&self, text: &'a str) -> Split<'a> {
        self.splitn(text, usize::MAX)
    }

    /// Split at most `max` times; the remainder is yielded as the last segment
    pub fn splitn<'a>(&self, text: &'a str, max: usize) -> Split<'a> {
        Split {
            text,
            pos: 0,
            sep: self.sep,
            quotes: self.guards.contains(&Guard::Quote),
            pairs: self.guards.iter().filter_map(|g| g.pair()).collect(),
            depth: vec![0; self.guards.len()],
            quote: None,
            escaped: false,
            left: max,
            trailing: false,
            done: false,
        }
    }
}

/// Lazy iterator over the segments of one split
pub struct Split<'a> {
    text: &'a str,
    pos: usize,
    sep: char,
    quotes: bool,
    pairs: Vec<(char, char)>,
    depth: Vec<usize>,
    quote: Option<char>,
    escaped: bool,
    left: usize,
    trailing: bool,
    done: bool,
}

impl<'a> Split<'a> {
    /// Feed one character to the guard state; true if it is inside a guarded span
    fn inside(&mut self, ch: char) -> bool {
        if let Some(q) = self.quote {
            if self.escaped {
                self.escaped = false;
            } else if ch == '\\' {
                self.escaped = true;
            } else if ch == q {
                self.quote = None;
            }
            return true;
        }
        if self.quotes && matches!(ch, '"' | '\'' | '`') {
            self.quote = Some(ch);
            return true;
        }
        let mut guarded = false;
        for (i, (open, close)) in self.pairs.iter().enumerate() {
            if ch == *open {
                self.depth[i] += 1;
                return true;
            }
            if ch == *close && self.depth[i] > 0 {
                self.depth[i] -= 1;
                return true;
            }
            guarded |= self.depth[i] > 0;
        }
        guarded
    }
}

impl<'a> Iterator for Split<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.done {
            return None;
        }
        let rest = &self.text[self.pos..];

        if rest.is_empty() {
            self.done = true;
            // "a;" yields a trailing empty segment, "" yields nothing
            return if self.trailing { Some(rest) } else { None };
        }
        if self.left == 0 {
            self.done = true;
            return Some(rest);
        }
        for (off, ch) in rest.char_indices() {
            if !self.inside(ch) && ch == self.sep {
                let seg = &rest[..off];
                self.pos += off + ch.len_utf8();
                self.left -= 1;
                self.trailing = true;
                return Some(seg);
            }
        }
        self.pos = self.text.len();
        self.done = true;
        Some(rest)
    }
}
