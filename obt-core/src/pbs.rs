//! Instruction tables
//!
//! Instructions are plain Rust closures registered by name. Each carries the
//! bind-time metadata the builder needs: how many stack items to materialize
//! into `evo.data` ([`Extent`]) and whether the closure receives the chain's
//! [`Stack`] (expressed by the closure signature).

use crate::evo::Evo;
use crate::stack::Stack;
use crate::types::{ObtError, Phase, Result, Value};
use futures::future::{self, FutureExt, LocalBoxFuture};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

/// Future returned by an asynchronous instruction
pub type PendingValue = LocalBoxFuture<'static, std::result::Result<Option<Value>, Rejection>>;

/// Deliberate abort of a firing
///
/// A rejection stops the rest of the chain. Its message, if any, is routed
/// to the diagnostic sink by prefix (`err:`, `warn:`, `info:`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rejection {
    pub message: Option<String>,
}

impl Rejection {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }

    /// Abort without a message
    pub fn silent() -> Self {
        Self::default()
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(msg) => write!(f, "rejected: {}", msg),
            None => write!(f, "rejected"),
        }
    }
}

/// Result of one instruction invocation
pub enum Ret {
    /// Finished synchronously; a present value is pushed for the next cell
    Done(Option<Value>),
    /// The rest of the chain waits for this future
    Pending(PendingValue),
}

impl Ret {
    pub fn none() -> Self {
        Ret::Done(None)
    }

    pub fn value(v: impl Into<Value>) -> Self {
        Ret::Done(Some(v.into()))
    }

    pub fn pending<F>(fut: F) -> Self
    where
        F: Future<Output = std::result::Result<Option<Value>, Rejection>> + 'static,
    {
        Ret::Pending(fut.boxed_local())
    }

    /// Abort the firing with a routed message
    pub fn reject(message: impl Into<String>) -> Self {
        Ret::Pending(future::ready(Err(Rejection::new(message))).boxed_local())
    }

    /// Abort the firing silently
    pub fn abort() -> Self {
        Ret::Pending(future::ready(Err(Rejection::silent())).boxed_local())
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Ret::Pending(_))
    }
}

impl fmt::Debug for Ret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ret::Done(v) => f.debug_tuple("Done").field(v).finish(),
            Ret::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

pub type PlainFn = dyn Fn(&mut Evo, Vec<Value>) -> Result<Ret>;
pub type AccessFn = dyn Fn(&mut Evo, &mut Stack, Vec<Value>) -> Result<Ret>;

/// How an instruction is invoked
#[derive(Clone)]
pub enum Method {
    /// Context and arguments only
    Plain(Rc<PlainFn>),
    /// Context, the chain's stack and arguments
    Access(Rc<AccessFn>),
    /// Cut the chain before the invoking cell
    Prune,
}

/// Declared auto-arity of an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extent {
    /// Drain and flatten all staged items
    All,
    /// Exactly `n` items, staging first then the buffer
    Take(usize),
    /// Up to `n` staged items, never the buffer
    Optional(usize),
}

impl Extent {
    /// Signed count understood by [`Stack::data`]
    pub fn count(self) -> isize {
        match self {
            Extent::All => 0,
            Extent::Take(n) => n as isize,
            Extent::Optional(n) => -(n as isize),
        }
    }
}

/// A named operation plus its bind-time metadata
#[derive(Clone)]
pub struct Instruction {
    method: Method,
    extent: Option<Extent>,
}

impl Instruction {
    /// Instruction that never sees the stack
    pub fn plain<F>(f: F) -> Self
    where
        F: Fn(&mut Evo, Vec<Value>) -> Result<Ret> + 'static,
    {
        Self {
            method: Method::Plain(Rc::new(f)),
            extent: None,
        }
    }

    /// Privileged instruction that receives the stack
    pub fn access<F>(f: F) -> Self
    where
        F: Fn(&mut Evo, &mut Stack, Vec<Value>) -> Result<Ret> + 'static,
    {
        Self {
            method: Method::Access(Rc::new(f)),
            extent: None,
        }
    }

    /// The chain-truncation control
    pub fn prune() -> Self {
        Self {
            method: Method::Prune,
            extent: None,
        }
    }

    /// Builder method: declare the auto-arity
    pub fn with_extent(mut self, extent: Extent) -> Self {
        self.extent = Some(extent);
        self
    }

    pub fn extent(&self) -> Option<Extent> {
        self.extent
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn is_access(&self) -> bool {
        matches!(self.method, Method::Access(_))
    }

    /// True if the builder must wire the previous cell
    pub fn needs_prev(&self) -> bool {
        matches!(self.method, Method::Prune)
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.method {
            Method::Plain(_) => "plain",
            Method::Access(_) => "access",
            Method::Prune => "prune",
        };
        f.debug_struct("Instruction")
            .field("kind", &kind)
            .field("extent", &self.extent)
            .finish()
    }
}

#[derive(Debug, Clone)]
enum Entry {
    Leaf(Rc<Instruction>),
    Table(InstructionTable),
}

/// Name → instruction map; nested tables give dotted names
#[derive(Debug, Clone, Default)]
pub struct InstructionTable {
    entries: BTreeMap<String, Entry>,
}

impl InstructionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instruction; an existing name is an error
    pub fn register(&mut self, name: &str, instruction: Instruction) -> Result<()> {
        if self.entries.contains_key(name) {
            return Err(ObtError::DuplicateInstruction(name.to_string()));
        }
        self.entries
            .insert(name.to_string(), Entry::Leaf(Rc::new(instruction)));
        Ok(())
    }

    /// Builder method: add or replace an instruction
    pub fn with(mut self, name: &str, instruction: Instruction) -> Self {
        self.entries
            .insert(name.to_string(), Entry::Leaf(Rc::new(instruction)));
        self
    }

    /// Attach a sub-table reachable as `name.xxx`
    pub fn nest(&mut self, name: &str, table: InstructionTable) -> Result<()> {
        if self.entries.contains_key(name) {
            return Err(ObtError::DuplicateInstruction(name.to_string()));
        }
        self.entries.insert(name.to_string(), Entry::Table(table));
        Ok(())
    }

    /// Copy every entry of `other` into this table
    pub fn merge(&mut self, other: &InstructionTable) -> Result<()> {
        for (name, entry) in &other.entries {
            if self.entries.contains_key(name) {
                return Err(ObtError::DuplicateInstruction(name.clone()));
            }
            self.entries.insert(name.clone(), entry.clone());
        }
        Ok(())
    }

    /// Look up a (possibly dotted) name
    pub fn get(&self, path: &str) -> Option<Rc<Instruction>> {
        let mut table = self;
        let mut parts = path.split('.').peekable();

        while let Some(part) = parts.next() {
            match (table.entries.get(part)?, parts.peek()) {
                (Entry::Leaf(ins), None) => return Some(Rc::clone(ins)),
                (Entry::Table(sub), Some(_)) => table = sub,
                _ => return None,
            }
        }
        None
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// All leaf names, dotted, sorted
    pub fn names(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (name, entry) in &self.entries {
            match entry {
                Entry::Leaf(_) => out.push(name.clone()),
                Entry::Table(sub) => {
                    out.extend(sub.names().into_iter().map(|n| format!("{}.{}", name, n)))
                }
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The four instruction tables handed to the builder
#[derive(Debug, Clone, Default)]
pub struct Pbs {
    pub on: InstructionTable,
    pub by: InstructionTable,
    pub update: InstructionTable,
    pub next: InstructionTable,
}

impl Pbs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, phase: Phase) -> &InstructionTable {
        match phase {
            Phase::On => &self.on,
            Phase::By => &self.by,
            Phase::Update => &self.update,
            Phase::Next => &self.next,
        }
    }

    /// Resolve a name against one phase table
    pub fn resolve(&self, phase: Phase, name: &str) -> Result<Rc<Instruction>> {
        self.table(phase)
            .get(name)
            .ok_or_else(|| ObtError::UnknownInstruction {
                phase,
                name: name.to_string(),
            })
    }
}
