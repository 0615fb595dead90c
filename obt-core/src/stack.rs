//! Per-chain data stack
//!
//! A chain owns exactly one [`Stack`] with two regions:
//! - `buffer`: ordinary results, consumed from the end (LIFO)
//! - `staging`: values explicitly reserved for the next instruction,
//!   consumed from the front (FIFO)
//!
//! Staging is always consulted before the buffer when a cell materializes its
//! declared arity.

use crate::types::Value;

#[derive(Debug, Clone, Default)]
pub struct Stack {
    buffer: Vec<Value>,
    staging: Vec<Value>,
}

impl Stack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the items a cell declared via its arity
    ///
    /// - `0`: drain all of staging, never touch the buffer
    /// - `n`: staging first (up to n items), else the top n buffer items
    /// - `-n`: staging only (up to n items)
    ///
    /// A request for more than one item always yields a list, possibly short.
    pub fn data(&mut self, n: isize) -> Option<Value> {
        if n == 0 {
            let mut all: Vec<Value> = self.staging.drain(..).collect();
            return match all.len() {
                0 => None,
                1 => all.pop().and_then(Value::present),
                _ => Some(Value::List(all)),
            };
        }
        if !self.staging.is_empty() {
            let want = n.unsigned_abs();
            if want == 1 {
                return self.staging.remove(0).present();
            }
            let take = want.min(self.staging.len());
            return Some(Value::List(self.staging.drain(..take).collect()));
        }
        if n == 1 {
            return self.buffer.pop().and_then(Value::present);
        }
        if n > 1 {
            return Some(Value::List(self.pops(n as usize)));
        }
        None
    }

    /// Append values to the buffer end; `Nil` is skipped
    pub fn push<I>(&mut self, values: I)
    where
        I: IntoIterator<Item = Value>,
    {
        self.buffer.extend(values.into_iter().filter(|v| !v.is_nil()));
    }

    /// Push one explicit `Nil` placeholder
    pub fn undefined(&mut self) {
        self.buffer.push(Value::Nil);
    }

    /// Copy of the top `n` buffer items (bottom to top)
    pub fn tops(&self, n: usize) -> Vec<Value> {
        let start = self.buffer.len().saturating_sub(n);
        self.buffer[start..].to_vec()
    }

    /// Copy of a buffer range; negative indices count from the end
    pub fn slice(&self, beg: isize, end: Option<isize>) -> Vec<Value> {
        let len = self.buffer.len();
        let beg = resolve(beg, len);
        let end = end.map_or(len, |e| resolve(e, len));
        if beg >= end {
            return Vec::new();
        }
        self.buffer[beg..end].to_vec()
    }

    pub fn pop(&mut self) -> Option<Value> {
        self.buffer.pop()
    }

    /// Remove the top `n` buffer items, keeping their order
    pub fn pops(&mut self, n: usize) -> Vec<Value> {
        let start = self.buffer.len().saturating_sub(n);
        self.buffer.split_off(start)
    }

    /// Clear both regions (start of a trigger cycle)
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.staging.clear();
    }

    /// Stage the buffer top; an empty buffer stages `Nil`
    pub fn tpop(&mut self) {
        let v = self.buffer.pop().unwrap_or_default();
        self.staging.push(v);
    }

    /// Stage the top `n` items; counts below 2 are ignored
    pub fn tpops(&mut self, n: usize) {
        if n > 1 {
            let moved = self.pops(n);
            self.staging.extend(moved);
        }
    }

    /// Stage the buffer bottom; an empty buffer stages `Nil`
    pub fn tshift(&mut self) {
        let v = if self.buffer.is_empty() {
            Value::Nil
        } else {
            self.buffer.remove(0)
        };
        self.staging.push(v);
    }

    /// Stage the bottom `n` items; counts below 2 are ignored
    pub fn tshifts(&mut self, n: usize) {
        if n > 1 {
            let take = n.min(self.buffer.len());
            self.staging.extend(self.buffer.drain(..take));
        }
    }

    /// Stage copies of arbitrary buffer positions
    ///
    /// Out-of-range positions stage a `Nil` for their slot.
    pub fn tindex(&mut self, ns: &[isize]) {
        let len = self.buffer.len() as isize;
        for &i in ns {
            let at = if i < 0 { len + i } else { i };
            let v = if (0..len).contains(&at) {
                self.buffer[at as usize].clone()
            } else {
                Value::Nil
            };
            self.staging.push(v);
        }
    }

    /// Read-only view of the buffer
    pub fn buffer(&self) -> &[Value] {
        &self.buffer
    }

    /// Read-only view of the staging queue
    pub fn staging(&self) -> &[Value] {
        &self.staging
    }
}

fn resolve(i: isize, len: usize) -> usize {
    if i < 0 {
        len.saturating_sub(i.unsigned_abs())
    } else {
        (i as usize).min(len)
    }
}
