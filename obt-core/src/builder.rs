//! Chain builder
//!
//! Resolves parsed descriptors against the instruction tables and links the
//! resulting cells into a [`Chain`]. [`Builder::build`] runs the whole
//! pipeline for one node: split → parse → chain → bind.

use crate::binder::{self, ChainStore};
use crate::chain::{Cell, Chain};
use crate::config::BuilderConfig;
use crate::host::{DiagnosticSink, EventHub, LogSink, NodeFinder};
use crate::parser::{self, Call, Evn, Group, ToParts};
use crate::pbs::Pbs;
use crate::types::{NodeId, ObtError, Phase, Result};
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// Raw On/By/To attribute text of one node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObtAttrs {
    #[serde(default)]
    pub on: String,
    #[serde(default)]
    pub by: String,
    #[serde(default)]
    pub to: String,
}

impl ObtAttrs {
    pub fn new(on: impl Into<String>) -> Self {
        Self {
            on: on.into(),
            ..Self::default()
        }
    }

    /// Builder method: set the By text
    pub fn with_by(mut self, by: impl Into<String>) -> Self {
        self.by = by.into();
        self
    }

    /// Builder method: set the To text
    pub fn with_to(mut self, to: impl Into<String>) -> Self {
        self.to = to.into();
        self
    }
}

/// A group skipped by a lenient build
#[derive(Debug)]
pub struct GroupError {
    pub index: usize,
    pub on: String,
    pub error: ObtError,
}

/// What one [`Builder::build`] call produced
#[derive(Debug)]
pub struct BuildSummary {
    pub node: NodeId,
    /// Chains compiled
    pub chains: usize,
    /// Listeners registered with the hub
    pub bound: usize,
    /// Entries added to the chain store
    pub stored: usize,
    /// Groups skipped (lenient mode only)
    pub errors: Vec<GroupError>,
}

impl BuildSummary {
    fn new(node: NodeId) -> Self {
        Self {
            node,
            chains: 0,
            bound: 0,
            stored: 0,
            errors: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Compiles descriptor groups into chains
pub struct Builder {
    pbs: Pbs,
    finder: Rc<dyn NodeFinder>,
    sink: Rc<dyn DiagnosticSink>,
    config: BuilderConfig,
}

impl Builder {
    /// Create a builder; rejections go to a [`LogSink`] honoring `config.debug`
    pub fn new(pbs: Pbs, finder: Rc<dyn NodeFinder>, config: BuilderConfig) -> Self {
        Self {
            pbs,
            finder,
            sink: Rc::new(LogSink::new(config.debug)),
            config,
        }
    }

    /// Builder method: route rejections to a custom sink
    pub fn with_sink(mut self, sink: Rc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    pub fn pbs(&self) -> &Pbs {
        &self.pbs
    }

    /// Link one chain from already parsed descriptors
    pub fn chain(
        &self,
        evns: Vec<Evn>,
        on: &[Call],
        by: &[Call],
        to: Option<&ToParts>,
    ) -> Result<Rc<Chain>> {
        let mut chain = Chain::new(evns, Rc::clone(&self.finder), Rc::clone(&self.sink));

        for call in on {
            chain.append(self.call_cell(Phase::On, call)?);
        }
        for call in by {
            chain.append(self.call_cell(Phase::By, call)?);
        }
        if let Some(to) = to {
            chain.append(Cell::query(to.query.clone()));

            for update in &to.updates {
                let ins = self.pbs.resolve(Phase::Update, &update.name)?;
                chain.append(Cell::update(ins, &update.name, update.args.clone()));
            }
            for call in &to.calls {
                chain.append(self.call_cell(Phase::Next, call)?);
            }
        }
        Ok(Rc::new(chain))
    }

    /// Parse and link one descriptor group
    pub fn compile(&self, group: &Group) -> Result<Rc<Chain>> {
        let (evns, on) = parser::parse_on(&group.on)?;
        let by = parser::parse_by(&group.by)?;
        let to = parser::parse_to(&group.to)?;

        let chain = self.chain(evns, &on, &by, to.as_ref())?;
        log::debug!("Compiled `{}` into {} cells", group.on, chain.len());
        Ok(chain)
    }

    /// Compile and bind every group of a node, then signal the hub
    ///
    /// In strict mode the first configuration error is returned; otherwise
    /// failing groups are logged, recorded in the summary and skipped.
    pub fn build(
        &self,
        node: NodeId,
        attrs: &ObtAttrs,
        hub: &dyn EventHub,
        store: &mut ChainStore,
    ) -> Result<BuildSummary> {
        let mut summary = BuildSummary::new(node);

        for (index, group) in parser::groups(&attrs.on, &attrs.by, &attrs.to)
            .into_iter()
            .enumerate()
        {
            let result = self
                .compile(&group)
                .and_then(|chain| binder::bind(hub, store, node, &chain));

            match result {
                Ok(count) => {
                    summary.chains += 1;
                    summary.bound += count.bound;
                    summary.stored += count.stored;
                }
                Err(error) if self.config.strict => return Err(error),
                Err(error) => {
                    log::error!("Skipping group {} `{}` on {}: {}", index, group.on, node, error);
                    summary.errors.push(GroupError {
                        index,
                        on: group.on,
                        error,
                    });
                }
            }
        }

        hub.built(node, &self.config.done_event);
        log::debug!(
            "Built {}: {} chains, {} bound, {} stored",
            node,
            summary.chains,
            summary.bound,
            summary.stored
        );
        Ok(summary)
    }

    fn call_cell(&self, phase: Phase, call: &Call) -> Result<Cell> {
        let ins = self.pbs.resolve(phase, &call.name)?;
        Ok(Cell::call(ins, &call.name, call.args.clone(), call.rest))
    }
}
