//! Host collaborator traits
//!
//! The library never owns a node tree or an event loop. Everything it needs
//! from the host is reached through these traits.

use crate::chain::Chain;
use crate::pbs::Rejection;
use crate::types::{NodeId, Value};
use std::rc::Rc;

/// Selector lookup used by To queries
pub trait NodeFinder {
    /// First node matching `selector` under `start` (whole tree if `None`)
    fn find_one(&self, selector: &str, start: Option<NodeId>) -> Option<NodeId>;

    /// All nodes matching `selector` under `start`, in tree order
    fn find_all(&self, selector: &str, start: Option<NodeId>) -> Vec<NodeId>;

    /// Named value of `node`, read by `v.name` in query filters
    fn value(&self, _node: NodeId, _name: &str) -> Option<Value> {
        None
    }
}

/// Event registration surface of the host
pub trait EventHub {
    /// Register `chain` as a listener for `event` on `node`
    fn listen(
        &self,
        node: NodeId,
        event: &str,
        selector: Option<&str>,
        once: bool,
        chain: Rc<Chain>,
    );

    /// All chains of `node` are bound; the host fires `event` on it
    fn built(&self, node: NodeId, event: &str);
}

/// Receiver of chain rejections
pub trait DiagnosticSink {
    fn reject(&self, rejection: &Rejection);
}

/// Routes rejection messages to the `log` facade by prefix
///
/// `err:` → error, `warn:` → warn, `info:` → info. Unprefixed and empty
/// messages are plain aborts and are dropped.
#[derive(Debug, Clone, Copy)]
pub struct LogSink {
    enabled: bool,
}

impl LogSink {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Level and text a message would be logged with
    pub fn route(message: &str) -> Option<(log::Level, &str)> {
        let routes = [
            ("err:", log::Level::Error),
            ("warn:", log::Level::Warn),
            ("info:", log::Level::Info),
        ];
        routes.iter().find_map(|(prefix, level)| {
            message
                .strip_prefix(prefix)
                .map(|rest| (*level, rest.trim()))
        })
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new(true)
    }
}

impl DiagnosticSink for LogSink {
    fn reject(&self, rejection: &Rejection) {
        if !self.enabled {
            return;
        }
        let Some(message) = rejection.message.as_deref() else {
            return;
        };
        if let Some((level, text)) = Self::route(message) {
            log::log!(level, "{}", text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_by_prefix() {
        assert_eq!(LogSink::route("err: boom"), Some((log::Level::Error, "boom")));
        assert_eq!(LogSink::route("warn:x"), Some((log::Level::Warn, "x")));
        assert_eq!(LogSink::route("info: ok"), Some((log::Level::Info, "ok")));
        assert_eq!(LogSink::route("plain abort"), None);
        assert_eq!(LogSink::route(""), None);
    }
}
