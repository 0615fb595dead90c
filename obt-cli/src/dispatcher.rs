//! Event dispatch over the in-memory document
//!
//! Implements [`EventHub`]: keeps the registered listeners, delivers events
//! from the target up through its ancestors, and drives suspended chains on a
//! single-threaded [`LocalPool`].

use crate::document::Document;
use crate::selector::Selector;
use futures::executor::{LocalPool, LocalSpawner};
use futures::task::LocalSpawnExt;
use obt_core::{Chain, Event, EventHub, Evo, Fired, NodeId, Value};
use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;

struct Listener {
    node: NodeId,
    event: String,
    selector: Option<String>,
    once: bool,
    chain: Rc<Chain>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FireStatus {
    /// Still waiting on a suspended instruction
    Pending,
    Done,
    /// Rejected or failed after suspension
    Aborted,
    Failed(String),
}

/// One listener invocation
#[derive(Debug, Clone, Serialize)]
pub struct FireRecord {
    pub event: String,
    pub target: NodeId,
    /// Node the listener is bound on
    pub current: NodeId,
    pub delegate: NodeId,
    pub status: FireStatus,
    pub value: Option<Value>,
}

pub struct Dispatcher {
    doc: Rc<RefCell<Document>>,
    listeners: RefCell<Vec<Listener>>,
    pool: RefCell<LocalPool>,
    spawner: LocalSpawner,
    records: Rc<RefCell<Vec<FireRecord>>>,
}

impl Dispatcher {
    pub fn new(doc: Rc<RefCell<Document>>) -> Self {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        Self {
            doc,
            listeners: RefCell::new(Vec::new()),
            pool: RefCell::new(pool),
            spawner,
            records: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    /// Snapshot of every invocation so far
    pub fn records(&self) -> Vec<FireRecord> {
        self.records.borrow().clone()
    }

    /// Deliver `name` at `target`, bubbling unless `bubbles` is false
    ///
    /// Returns the event so the caller can inspect its flags.
    pub fn dispatch(&self, name: &str, target: NodeId, detail: Option<Value>, bubbles: bool) -> Event {
        let mut event = Event::new(name, target);
        if let Some(detail) = detail {
            event = event.with_detail(detail);
        }

        let path = self.doc.borrow().path(target);
        let hops = if bubbles { path.len() } else { 1 };
        log::debug!("Dispatch `{}` at {} ({} hops)", name, target, hops);

        for &current in path.iter().take(hops) {
            for (chain, delegate) in self.matching(name, current, &path) {
                self.fire(chain, event.clone(), current, delegate);
            }
            if event.propagation_stopped() {
                log::debug!("Propagation of `{}` stopped at {}", name, current);
                break;
            }
        }
        event
    }

    /// Run suspended chains until none can make progress
    pub fn run_until_stalled(&self) {
        self.pool.borrow_mut().run_until_stalled();
    }

    /// Listeners on `current` for `name`, with the node each one is delegated to
    ///
    /// Single-fire listeners are removed as they match.
    fn matching(&self, name: &str, current: NodeId, path: &[NodeId]) -> Vec<(Rc<Chain>, NodeId)> {
        let doc = self.doc.borrow();
        // nodes between the target and `current`, innermost first
        let inner: Vec<NodeId> = path.iter().copied().take_while(|&n| n != current).collect();

        let mut out = Vec::new();
        self.listeners.borrow_mut().retain(|l| {
            if l.node != current || l.event != name {
                return true;
            }
            let delegate = match &l.selector {
                None => Some(current),
                Some(sel) => match Selector::parse(sel) {
                    Ok(sel) => inner.iter().copied().find(|&n| doc.matches(n, &sel)),
                    Err(e) => {
                        log::warn!("Listener for `{}` on {}: {}", name, current, e);
                        None
                    }
                },
            };
            match delegate {
                Some(delegate) => {
                    out.push((Rc::clone(&l.chain), delegate));
                    !l.once
                }
                None => true,
            }
        });
        out
    }

    fn fire(&self, chain: Rc<Chain>, event: Event, current: NodeId, delegate: NodeId) {
        let slot = {
            let mut records = self.records.borrow_mut();
            records.push(FireRecord {
                event: event.name.clone(),
                target: event.target,
                current,
                delegate,
                status: FireStatus::Pending,
                value: None,
            });
            records.len() - 1
        };

        let finished = match chain.handle_event(event, Evo::new(current, delegate)) {
            Ok(Fired::Done(outcome)) => Some((FireStatus::Done, outcome.value)),
            Ok(Fired::Suspended(continuation)) => {
                let records = Rc::clone(&self.records);
                let task = async move {
                    let (status, value) = match continuation.await {
                        Some(outcome) => (FireStatus::Done, outcome.value),
                        None => (FireStatus::Aborted, None),
                    };
                    if let Some(record) = records.borrow_mut().get_mut(slot) {
                        record.status = status;
                        record.value = value;
                    }
                };
                match self.spawner.spawn_local(task) {
                    Ok(()) => None,
                    Err(e) => Some((FireStatus::Failed(e.to_string()), None)),
                }
            }
            Err(e) => {
                log::error!("Chain on {} failed: {}", current, e);
                Some((FireStatus::Failed(e.to_string()), None))
            }
        };

        if let Some((status, value)) = finished {
            if let Some(record) = self.records.borrow_mut().get_mut(slot) {
                record.status = status;
                record.value = value;
            }
        }
    }
}

impl EventHub for Dispatcher {
    fn listen(&self, node: NodeId, event: &str, selector: Option<&str>, once: bool, chain: Rc<Chain>) {
        self.listeners.borrow_mut().push(Listener {
            node,
            event: event.to_string(),
            selector: selector.map(String::from),
            once,
            chain,
        });
    }

    fn built(&self, node: NodeId, event: &str) {
        self.dispatch(event, node, None, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocFinder;
    use crate::library;
    use obt_core::{Builder, BuilderConfig, ChainStore, NodeFinder, ObtAttrs};

    struct Scene {
        doc: Rc<RefCell<Document>>,
        hub: Dispatcher,
        builder: Builder,
        store: ChainStore,
    }

    impl Scene {
        fn new() -> Self {
            let doc = Rc::new(RefCell::new(Document::new()));
            let finder: Rc<dyn NodeFinder> = Rc::new(DocFinder::new(Rc::clone(&doc)));
            let builder = Builder::new(library::pbs(&doc).unwrap(), finder, BuilderConfig::new());
            Self {
                hub: Dispatcher::new(Rc::clone(&doc)),
                doc,
                builder,
                store: ChainStore::new(),
            }
        }

        fn node(&self, tag: &str, parent: Option<NodeId>, class: &str) -> NodeId {
            let mut doc = self.doc.borrow_mut();
            let id = doc.create(tag, parent);
            if !class.is_empty() {
                doc.node_mut(id).unwrap().add_class(class);
            }
            id
        }

        fn build(&mut self, node: NodeId, attrs: ObtAttrs) {
            self.builder.build(node, &attrs, &self.hub, &mut self.store).unwrap();
        }
    }

    #[test]
    fn test_bubbling_reaches_ancestors() {
        let mut s = Scene::new();
        let outer = s.node("div", None, "");
        let inner = s.node("span", Some(outer), "");
        s.build(outer, ObtAttrs::new("click|push(1)"));

        s.hub.dispatch("click", inner, None, true);
        let records = s.hub.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].current, outer);
        assert_eq!(records[0].target, inner);
    }

    #[test]
    fn test_delegated_listener() {
        let mut s = Scene::new();
        let list = s.node("ul", None, "");
        let item = s.node("li", Some(list), "item");
        let other = s.node("li", Some(list), "");
        s.build(list, ObtAttrs::new("click(.item)|attr('id')"));

        s.hub.dispatch("click", other, None, true);
        assert!(s.hub.records().is_empty());

        s.hub.dispatch("click", item, None, true);
        let records = s.hub.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].delegate, item);
    }

    #[test]
    fn test_once_listener_fires_once() {
        let mut s = Scene::new();
        let n = s.node("button", None, "");
        s.build(n, ObtAttrs::new("^click|push(1)"));
        assert_eq!(s.hub.listener_count(), 1);

        s.hub.dispatch("click", n, None, true);
        s.hub.dispatch("click", n, None, true);
        assert_eq!(s.hub.records().len(), 1);
        assert_eq!(s.hub.listener_count(), 0);
    }

    #[test]
    fn test_stop_propagation() {
        let mut s = Scene::new();
        let outer = s.node("div", None, "");
        let inner = s.node("p", Some(outer), "");
        s.build(outer, ObtAttrs::new("click|push(1)"));
        s.build(inner, ObtAttrs::new("click|stop"));

        let event = s.hub.dispatch("click", inner, None, true);
        assert!(event.propagation_stopped());
        assert_eq!(s.hub.records().len(), 1);
    }

    #[test]
    fn test_suspended_firing_completes_on_pool() {
        let mut s = Scene::new();
        let n = s.node("div", None, "");
        s.build(n, ObtAttrs::new("click|push(2) defer add(3)").with_to("=|text"));

        s.hub.dispatch("click", n, None, true);
        assert_eq!(s.hub.records()[0].status, FireStatus::Pending);

        s.hub.run_until_stalled();
        let record = &s.hub.records()[0];
        assert_eq!(record.status, FireStatus::Done);
        assert_eq!(s.doc.borrow().node(n).unwrap().text, "5");
    }

    #[test]
    fn test_done_event_is_fired_after_build() {
        let mut s = Scene::new();
        let n = s.node("div", None, "");
        s.build(n, ObtAttrs::new("obted|push('ready')").with_to("=|text"));

        assert_eq!(s.doc.borrow().node(n).unwrap().text, "ready");
        assert_eq!(s.hub.records()[0].status, FireStatus::Done);
    }

    #[test]
    fn test_rejection_after_suspend_is_aborted() {
        let mut s = Scene::new();
        let n = s.node("div", None, "");
        s.build(n, ObtAttrs::new("click|fail('nope')"));

        s.hub.dispatch("click", n, None, true);
        s.hub.run_until_stalled();
        assert_eq!(s.hub.records()[0].status, FireStatus::Aborted);
    }
}
