//! Cells, chains and the execution model
//!
//! A [`Chain`] owns its cells in an arena (`Vec<Cell>`); `next` links are
//! indices, so `prune` is an index rewrite. Firing a chain runs cells on the
//! caller's stack until one returns a pending result; the remainder then runs
//! inside a [`Continuation`] the host has to drive.

use crate::evo::{Event, Evo};
use crate::host::{DiagnosticSink, NodeFinder};
use crate::parser::{Evn, Query, CURRENT_TOKEN, TARGET_TOKEN};
use crate::pbs::{Instruction, Method, PendingValue, Rejection, Ret};
use crate::stack::Stack;
use crate::types::{ObtError, Result, Value};
use futures::future::{FutureExt, LocalBoxFuture};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// What a cell runs
#[derive(Clone)]
pub(crate) enum Op {
    /// Head of every chain; carries nothing but the initial value
    Start,
    Call(Rc<Instruction>),
    Query(Query),
}

/// One bound instruction invocation
#[derive(Clone)]
pub struct Cell {
    op: Op,
    label: String,
    args: Vec<Value>,
    want: Option<isize>,
    rest: Option<usize>,
    update: bool,
    next: std::cell::Cell<Option<usize>>,
    prev: Option<usize>,
}

impl Cell {
    fn new(op: Op, label: impl Into<String>) -> Self {
        Self {
            op,
            label: label.into(),
            args: Vec::new(),
            want: None,
            rest: None,
            update: false,
            next: std::cell::Cell::new(None),
            prev: None,
        }
    }

    /// Cell running a resolved instruction
    pub(crate) fn call(
        instruction: Rc<Instruction>,
        label: &str,
        args: Vec<Value>,
        rest: Option<usize>,
    ) -> Self {
        let want = instruction.extent().map(|e| e.count());
        Self {
            args,
            rest,
            want,
            ..Self::new(Op::Call(instruction), label)
        }
    }

    /// Update cell: always materializes exactly one item
    pub(crate) fn update(instruction: Rc<Instruction>, label: &str, args: Vec<Value>) -> Self {
        Self {
            args,
            want: Some(1),
            update: true,
            ..Self::new(Op::Call(instruction), label)
        }
    }

    /// Target lookup cell: consumes at most one staged item
    pub(crate) fn query(query: Query) -> Self {
        let label = if query.single {
            query.selector.clone()
        } else {
            format!("({})", query.selector)
        };
        Self {
            want: Some(-1),
            ..Self::new(Op::Query(query), label)
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn next(&self) -> Option<usize> {
        self.next.get()
    }

    fn needs_prev(&self) -> bool {
        matches!(&self.op, Op::Call(ins) if ins.needs_prev())
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("label", &self.label)
            .field("want", &self.want)
            .field("rest", &self.rest)
            .field("next", &self.next.get())
            .finish()
    }
}

/// Completed firing: terminal value plus the final context
#[derive(Debug, Clone)]
pub struct Outcome {
    pub value: Option<Value>,
    pub evo: Evo,
}

/// Remainder of a suspended firing; `None` if it was aborted
pub type Continuation = LocalBoxFuture<'static, Option<Outcome>>;

/// Result of [`Chain::handle_event`]
pub enum Fired {
    Done(Outcome),
    Suspended(Continuation),
}

impl Fired {
    /// Outcome of a firing that completed synchronously
    pub fn done(self) -> Option<Outcome> {
        match self {
            Fired::Done(outcome) => Some(outcome),
            Fired::Suspended(_) => None,
        }
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, Fired::Suspended(_))
    }
}

impl fmt::Debug for Fired {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fired::Done(outcome) => f.debug_tuple("Done").field(outcome).finish(),
            Fired::Suspended(_) => f.write_str("Suspended(..)"),
        }
    }
}

enum Step {
    Done(Option<Value>),
    Pending(PendingValue, Option<usize>),
}

/// A compiled chain: head cell plus the cells appended to it
pub struct Chain {
    cells: Vec<Cell>,
    stack: RefCell<Stack>,
    evns: Vec<Evn>,
    extra: Option<Value>,
    finder: Rc<dyn NodeFinder>,
    sink: Rc<dyn DiagnosticSink>,
}

impl Chain {
    pub(crate) fn new(evns: Vec<Evn>, finder: Rc<dyn NodeFinder>, sink: Rc<dyn DiagnosticSink>) -> Self {
        let label = evns
            .iter()
            .map(|e| e.name.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            cells: vec![Cell::new(Op::Start, label)],
            stack: RefCell::new(Stack::new()),
            evns,
            extra: None,
            finder,
            sink,
        }
    }

    /// Link a cell after the current last one
    pub(crate) fn append(&mut self, mut cell: Cell) {
        let last = self.cells.len() - 1;
        if cell.needs_prev() {
            cell.prev = Some(last);
        }
        self.cells[last].next.set(Some(self.cells.len()));
        self.cells.push(cell);
    }

    /// Copy of this chain with a fresh stack and an initial head value
    pub fn rebind(&self, init: Option<Value>) -> Rc<Chain> {
        Rc::new(Chain {
            cells: self.cells.clone(),
            stack: RefCell::new(Stack::new()),
            evns: self.evns.clone(),
            extra: init.or_else(|| self.extra.clone()),
            finder: Rc::clone(&self.finder),
            sink: Rc::clone(&self.sink),
        })
    }

    /// Events this chain was compiled for
    pub fn evns(&self) -> &[Evn] {
        &self.evns
    }

    /// Number of cells, head included
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.len() <= 1
    }

    /// Labels of the cells currently reachable from the head
    pub fn labels(&self) -> Vec<String> {
        let mut out = Vec::new();
        let mut at = self.cells[0].next();
        while let Some(i) = at {
            out.push(self.cells[i].label.clone());
            at = self.cells[i].next();
        }
        out
    }

    /// Snapshot of the stack buffer (empty while a firing holds it)
    pub fn buffer(&self) -> Vec<Value> {
        self.stack
            .try_borrow()
            .map(|s| s.buffer().to_vec())
            .unwrap_or_default()
    }

    /// Fire the chain
    ///
    /// Resets the stack, then runs cells until the end of the chain or the
    /// first pending result. A synchronous instruction error propagates as
    /// `Err`; firing while the stack is in use is [`ObtError::Busy`].
    pub fn handle_event(self: &Rc<Self>, event: Event, mut evo: Evo) -> Result<Fired> {
        log::trace!("fire `{}` on {:?}", event.name, evo.current);
        evo.target = Some(event.target);
        evo.event = Some(event);

        let step = {
            let mut stack = self.stack.try_borrow_mut().map_err(|_| ObtError::Busy)?;
            stack.reset();
            self.run_from(0, self.extra.clone(), &mut evo, &mut stack)?
        };

        Ok(match step {
            Step::Done(value) => Fired::Done(Outcome { value, evo }),
            Step::Pending(fut, next) => Fired::Suspended(Rc::clone(self).resume(fut, next, evo)),
        })
    }

    fn run_from(
        &self,
        start: usize,
        incoming: Option<Value>,
        evo: &mut Evo,
        stack: &mut Stack,
    ) -> Result<Step> {
        let mut at = start;
        let mut value = incoming;

        loop {
            let cell = &self.cells[at];
            let ret = self.invoke(cell, evo, stack, value.take())?;
            let next = cell.next.get();

            match (ret, next) {
                (Ret::Pending(fut), next) => return Ok(Step::Pending(fut, next)),
                (Ret::Done(v), None) => return Ok(Step::Done(v)),
                (Ret::Done(v), Some(i)) => {
                    value = v;
                    at = i;
                }
            }
        }
    }

    fn invoke(&self, cell: &Cell, evo: &mut Evo, stack: &mut Stack, incoming: Option<Value>) -> Result<Ret> {
        if let Some(v) = incoming {
            stack.push([v]);
        }
        let mut args = cell.args.clone();
        match cell.rest {
            Some(0) => match stack.pop() {
                Some(Value::List(items)) => args.extend(items),
                Some(v) => args.push(v),
                None => {}
            },
            Some(k) => args.extend(stack.pops(k)),
            None => {}
        }
        evo.data = cell.want.and_then(|n| stack.data(n));
        log::trace!("cell `{}` data={:?} args={:?}", cell.label, evo.data, args);

        let ret = match &cell.op {
            Op::Start => Ret::none(),
            Op::Query(query) => {
                self.lookup(query, evo);
                Ret::none()
            }
            Op::Call(ins) => match ins.method() {
                Method::Plain(f) => f(evo, args)?,
                Method::Access(f) => f(evo, stack, args)?,
                Method::Prune => {
                    if let Some(prev) = cell.prev {
                        self.cells[prev].next.set(None);
                    }
                    Ret::none()
                }
            },
        };

        match ret {
            Ret::Done(Some(v)) if cell.update => {
                evo.updated = Some(v);
                Ok(Ret::none())
            }
            ret => Ok(ret),
        }
    }

    fn lookup(&self, query: &Query, evo: &mut Evo) {
        let start = evo.data.as_ref().and_then(Value::as_node).or(evo.delegate);
        let selector = query.selector.as_str();

        let found = match selector {
            TARGET_TOKEN => evo.target.map(Value::Node),
            CURRENT_TOKEN => evo.current.map(Value::Node),
            "" => start.map(Value::Node),
            sel if query.single => self.finder.find_one(sel, start).map(Value::Node),
            sel => {
                let mut all = self.finder.find_all(sel, start);
                if let Some(filter) = &query.filter {
                    all = filter.apply_with(all, |&node, name| match name {
                        Some(name) => self.finder.value(node, name),
                        None => Some(Value::Node(node)),
                    });
                }
                Some(Value::List(all.into_iter().map(Value::Node).collect()))
            }
        };
        log::trace!("query `{}` from {:?} found {:?}", selector, start, found);

        evo.primary = found.clone();
        evo.updated = found;
    }

    fn resume(self: Rc<Self>, fut: PendingValue, next: Option<usize>, evo: Evo) -> Continuation {
        async move {
            let mut evo = evo;
            let mut fut = fut;
            let mut next = next;

            loop {
                let value = match fut.await {
                    Ok(v) => v,
                    Err(rejection) => {
                        self.sink.reject(&rejection);
                        return None;
                    }
                };
                let Some(at) = next else {
                    return Some(Outcome { value, evo });
                };

                let step = match self.stack.try_borrow_mut() {
                    Ok(mut stack) => self.run_from(at, value, &mut evo, &mut stack),
                    Err(_) => Err(ObtError::Busy),
                };
                match step {
                    Ok(Step::Done(value)) => return Some(Outcome { value, evo }),
                    Ok(Step::Pending(f, n)) => {
                        fut = f;
                        next = n;
                    }
                    Err(e) => {
                        self.sink.reject(&Rejection::new(format!("err: {}", e)));
                        return None;
                    }
                }
            }
        }
        .boxed_local()
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("evns", &self.evns)
            .field("cells", &self.cells)
            .finish()
    }
}
