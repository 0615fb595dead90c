//! Event binder and deferred chain store
//!
//! A compiled chain is either registered with the host as a listener, or,
//! for `@event` descriptors, kept in a [`ChainStore`] until it is explicitly
//! re-bound with [`bind_stored`].

use crate::chain::Chain;
use crate::host::EventHub;
use crate::types::{NodeId, ObtError, Result, Value};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// How many listeners and stored entries one bind produced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BindCount {
    pub bound: usize,
    pub stored: usize,
}

/// Chains saved for later binding, keyed by node and event name
#[derive(Debug, Default)]
pub struct ChainStore {
    chains: HashMap<(NodeId, String), Rc<Chain>>,
}

impl ChainStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a chain; a second chain under the same key is an error
    pub fn insert(&mut self, node: NodeId, event: &str, chain: Rc<Chain>) -> Result<()> {
        let key = (node, event.to_string());
        if self.chains.contains_key(&key) {
            return Err(ObtError::DuplicateStore {
                node,
                event: event.to_string(),
            });
        }
        self.chains.insert(key, chain);
        Ok(())
    }

    pub fn get(&self, node: NodeId, event: &str) -> Option<Rc<Chain>> {
        self.chains.get(&(node, event.to_string())).cloned()
    }

    pub fn remove(&mut self, node: NodeId, event: &str) -> Option<Rc<Chain>> {
        self.chains.remove(&(node, event.to_string()))
    }

    /// Event names stored on `node`, sorted
    pub fn names(&self, node: NodeId) -> Vec<String> {
        let mut names: Vec<String> = self
            .chains
            .keys()
            .filter(|(n, _)| *n == node)
            .map(|(_, e)| e.clone())
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}

/// Bind or store `chain` for each of its events on `node`
///
/// Store keys are checked up front: a `DuplicateStore` error leaves no
/// listener registered and nothing stored.
pub fn bind(
    hub: &dyn EventHub,
    store: &mut ChainStore,
    node: NodeId,
    chain: &Rc<Chain>,
) -> Result<BindCount> {
    let mut names = HashSet::new();
    for evn in chain.evns().iter().filter(|e| e.store) {
        if store.get(node, &evn.name).is_some() || !names.insert(evn.name.as_str()) {
            return Err(ObtError::DuplicateStore {
                node,
                event: evn.name.clone(),
            });
        }
    }

    let mut count = BindCount::default();
    for evn in chain.evns() {
        if evn.store {
            store.insert(node, &evn.name, Rc::clone(chain))?;
            count.stored += 1;
            log::debug!("Stored chain for `{}` on {}", evn.name, node);
        } else {
            hub.listen(
                node,
                &evn.name,
                evn.selector.as_deref(),
                evn.once,
                Rc::clone(chain),
            );
            count.bound += 1;
            log::debug!("Bound chain for `{}` on {}", evn.name, node);
        }
    }
    Ok(count)
}

/// Options for re-binding stored chains
#[derive(Debug, Clone, Default)]
pub struct RebindOptions {
    /// Event names to re-bind; empty means every name stored on the source
    pub names: Vec<String>,
    /// Delegated selector for the new listeners
    pub selector: Option<String>,
    pub once: bool,
    /// Value pushed on the stack before the first instruction
    pub init: Option<Value>,
}

impl RebindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: only re-bind these event names
    pub fn with_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Builder method: delegate the new listeners
    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    /// Builder method: single-fire listeners
    pub fn with_once(mut self, once: bool) -> Self {
        self.once = once;
        self
    }

    /// Builder method: initial stack value
    pub fn with_init(mut self, init: Value) -> Self {
        self.init = Some(init);
        self
    }
}

/// Re-bind chains stored on `src` as listeners on `to`
///
/// Each listener gets its own copy of the chain (fresh stack). Returns the
/// number of listeners registered.
pub fn bind_stored(
    hub: &dyn EventHub,
    store: &ChainStore,
    src: NodeId,
    to: NodeId,
    opts: &RebindOptions,
) -> Result<usize> {
    let names = if opts.names.is_empty() {
        store.names(src)
    } else {
        opts.names.clone()
    };
    if names.is_empty() {
        return Err(ObtError::NoStoredChain(src));
    }

    for name in &names {
        let chain = store
            .get(src, name)
            .ok_or(ObtError::NoStoredChain(src))?;
        hub.listen(
            to,
            name,
            opts.selector.as_deref(),
            opts.once,
            chain.rebind(opts.init.clone()),
        );
        log::debug!("Re-bound stored `{}` from {} to {}", name, src, to);
    }
    Ok(names.len())
}
