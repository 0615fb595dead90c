//! Event record and per-firing execution context

use crate::types::{NodeId, Timestamp, Value};
use chrono::Utc;
use std::cell::Cell;
use std::rc::Rc;

/// An event as delivered by the host
///
/// Clones share the default-prevented and propagation flags, so the host can
/// keep one copy and inspect what the chain decided.
#[derive(Debug, Clone)]
pub struct Event {
    pub name: String,
    /// Node the event originated on
    pub target: NodeId,
    pub timestamp: Timestamp,
    pub detail: Option<Value>,
    prevented: Rc<Cell<bool>>,
    stopped: Rc<Cell<bool>>,
}

impl Event {
    pub fn new(name: impl Into<String>, target: NodeId) -> Self {
        Self {
            name: name.into(),
            target,
            timestamp: Utc::now(),
            detail: None,
            prevented: Rc::new(Cell::new(false)),
            stopped: Rc::new(Cell::new(false)),
        }
    }

    /// Builder method: attach a detail payload
    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn prevent_default(&self) {
        self.prevented.set(true);
    }

    pub fn default_prevented(&self) -> bool {
        self.prevented.get()
    }

    pub fn stop_propagation(&self) {
        self.stopped.set(true);
    }

    pub fn propagation_stopped(&self) -> bool {
        self.stopped.get()
    }
}

/// Execution context of one firing
#[derive(Debug, Clone, Default)]
pub struct Evo {
    pub event: Option<Event>,
    /// Original event target
    pub target: Option<NodeId>,
    /// Node the listener is bound on
    pub current: Option<NodeId>,
    /// Node matched by a delegated selector (else the current node)
    pub delegate: Option<NodeId>,
    /// Items materialized for the running instruction
    pub data: Option<Value>,
    /// Target found by the To query
    pub primary: Option<Value>,
    /// Target the update instructions act on
    pub updated: Option<Value>,
    /// Free-form note for diagnostics
    pub entry: Option<String>,
}

impl Evo {
    /// Context for a listener on `current` matched through `delegate`
    pub fn new(current: NodeId, delegate: NodeId) -> Self {
        Self {
            current: Some(current),
            delegate: Some(delegate),
            ..Self::default()
        }
    }

    pub fn prevent_default(&self) {
        if let Some(ev) = &self.event {
            ev.prevent_default();
        }
    }

    pub fn stop_propagation(&self) {
        if let Some(ev) = &self.event {
            ev.stop_propagation();
        }
    }
}
