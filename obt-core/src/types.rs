//! Core types for the OBT chain compiler
//!
//! This module defines the dynamic [`Value`] carried through chains, the node
//! handle used to talk to the host, and the library error type. Everything here
//! is host-agnostic: the library never owns a node tree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Timestamp type used for event records
pub type Timestamp = DateTime<Utc>;

/// Result type for library operations
pub type Result<T> = std::result::Result<T, ObtError>;

/// Opaque handle to a host node (element, document, window...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Instruction table a descriptor is resolved against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    On,
    By,
    Update,
    Next,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::On => write!(f, "on"),
            Phase::By => write!(f, "by"),
            Phase::Update => write!(f, "update"),
            Phase::Next => write!(f, "next"),
        }
    }
}

/// Errors raised while parsing, binding or running chains
#[derive(Debug, thiserror::Error)]
pub enum ObtError {
    #[error("Invalid event definition: {0}")]
    InvalidEvent(String),

    #[error("Invalid call definition: {0}")]
    InvalidCall(String),

    #[error("Invalid argument list `{text}`: {reason}")]
    InvalidArgs { text: String, reason: String },

    #[error("Flow sentinel `{0}` is only allowed as the last argument")]
    MisplacedSentinel(String),

    #[error("Invalid query definition: {0}")]
    InvalidQuery(String),

    #[error("Invalid filter expression `{text}`: {reason}")]
    InvalidFilter { text: String, reason: String },

    #[error("Invalid update definition: {0}")]
    InvalidUpdate(String),

    #[error("Instruction `{name}` is not in the {phase} table")]
    UnknownInstruction { phase: Phase, name: String },

    #[error("Instruction `{0}` is already registered")]
    DuplicateInstruction(String),

    #[error("A chain is already stored for event `{event}` on node {node}")]
    DuplicateStore { node: NodeId, event: String },

    #[error("No chain stored on node {0}")]
    NoStoredChain(NodeId),

    #[error("Chain is already running (re-entrant firing)")]
    Busy,

    #[error("Instruction failed: {0}")]
    Instruction(String),
}

impl ObtError {
    /// True for errors raised while compiling or binding a chain
    pub fn is_config_error(&self) -> bool {
        !matches!(self, ObtError::Busy | ObtError::Instruction(_))
    }
}

/// Dynamic value passed between instructions
///
/// `Nil` is the explicit placeholder ("undefined"); ordinary pushes drop it,
/// only [`crate::stack::Stack::undefined`] and the staging mutators put it on
/// the stack.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    #[serde(skip_deserializing)]
    Nil,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Node(NodeId),
}

impl Value {
    /// Truthiness following the loose rules of the attribute language
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(v) => *v != 0,
            Value::Float(v) => *v != 0.0 && !v.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::List(_) | Value::Map(_) | Value::Node(_) => true,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Numeric view (strings are parsed, booleans map to 0/1)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Float(v) if v.is_finite() => Some(*v as i64),
            Value::Bool(b) => Some(*b as i64),
            Value::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            Value::Node(id) => Some(*id),
            _ => None,
        }
    }

    /// Node handles held by this value (a node or a list of nodes)
    pub fn nodes(&self) -> Vec<NodeId> {
        match self {
            Value::Node(id) => vec![*id],
            Value::List(items) => items.iter().filter_map(Value::as_node).collect(),
            _ => Vec::new(),
        }
    }

    /// Convert an extracted single value into an optional one (`Nil` is absent)
    pub fn present(self) -> Option<Value> {
        match self {
            Value::Nil => None,
            v => Some(v),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Str(s) => write!(f, "{}", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}:{}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Node(id) => write!(f, "{}", id),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<NodeId> for Value {
    fn from(v: NodeId) -> Self {
        Value::Node(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}
