//! Scene execution
//!
//! Builds every node of a scene on a fresh document, applies the re-binds,
//! fires the configured events and collects the report.

use crate::config::{FireConfig, NodeConfig, RebindConfig, Scene};
use crate::dispatcher::Dispatcher;
use crate::document::{DocFinder, Document};
use crate::library;
use crate::report::Report;
use anyhow::{anyhow, Context, Result};
use obt_core::{bind_stored, BuildSummary, Builder, ChainStore, NodeFinder, NodeId, ObtAttrs, RebindOptions};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub struct Session {
    doc: Rc<RefCell<Document>>,
    hub: Dispatcher,
    builder: Builder,
    store: ChainStore,
    ids: HashMap<String, NodeId>,
    builds: Vec<BuildSummary>,
}

impl Session {
    pub fn new(scene: &Scene) -> Result<Self> {
        let doc = Rc::new(RefCell::new(Document::new()));
        let pbs = library::pbs(&doc).context("Failed to assemble instruction tables")?;
        let finder: Rc<dyn NodeFinder> = Rc::new(DocFinder::new(Rc::clone(&doc)));

        Ok(Self {
            hub: Dispatcher::new(Rc::clone(&doc)),
            builder: Builder::new(pbs, finder, scene.builder.clone()),
            doc,
            store: ChainStore::new(),
            ids: HashMap::new(),
            builds: Vec::new(),
        })
    }

    /// Run a whole scene: create, build, re-bind, fire, settle
    pub fn run(scene: &Scene) -> Result<Report> {
        let mut session = Self::new(scene)?;
        for node in &scene.nodes {
            session.create(node)?;
        }
        for node in &scene.nodes {
            session.build(node)?;
        }
        for rebind in &scene.rebinds {
            session.rebind(rebind)?;
        }
        log::debug!("{} listeners registered", session.hub.listener_count());
        for fire in &scene.fires {
            session.fire(fire)?;
        }
        Ok(session.finish())
    }

    /// Add a node to the document (attributes only, no chains yet)
    pub fn create(&mut self, cfg: &NodeConfig) -> Result<NodeId> {
        let parent = cfg.parent.as_deref().map(|p| self.lookup(p)).transpose()?;
        let mut doc = self.doc.borrow_mut();
        let id = doc.create(&cfg.tag, parent);
        let node = doc
            .node_mut(id)
            .ok_or_else(|| anyhow!("Node `{}` vanished after creation", cfg.id))?;

        node.set_attr("id", &cfg.id);
        cfg.class.split_whitespace().for_each(|c| node.add_class(c));
        for (k, v) in &cfg.attrs {
            node.set_attr(k, v);
        }
        node.text = cfg.text.clone();

        self.ids.insert(cfg.id.clone(), id);
        log::debug!("Created `{}` as {}", cfg.id, id);
        Ok(id)
    }

    /// Compile and bind the OBT attributes of a created node
    pub fn build(&mut self, cfg: &NodeConfig) -> Result<()> {
        if cfg.on.trim().is_empty() {
            return Ok(());
        }
        let node = self.lookup(&cfg.id)?;
        let attrs = ObtAttrs::new(cfg.on.as_str())
            .with_by(cfg.by.as_str())
            .with_to(cfg.to.as_str());

        let summary = self
            .builder
            .build(node, &attrs, &self.hub, &mut self.store)
            .with_context(|| format!("Failed to build node `{}`", cfg.id))?;
        log::info!(
            "Built `{}`: {} chains ({} bound, {} stored)",
            cfg.id,
            summary.chains,
            summary.bound,
            summary.stored
        );
        self.builds.push(summary);
        Ok(())
    }

    pub fn rebind(&mut self, cfg: &RebindConfig) -> Result<usize> {
        let src = self.lookup(&cfg.from)?;
        let to = self.lookup(&cfg.to)?;

        let mut opts = RebindOptions::new()
            .with_names(cfg.events.iter().cloned())
            .with_once(cfg.once);
        if let Some(sel) = &cfg.selector {
            opts = opts.with_selector(sel.as_str());
        }
        if let Some(init) = &cfg.init {
            opts = opts.with_init(init.clone());
        }

        let count = bind_stored(&self.hub, &self.store, src, to, &opts)
            .with_context(|| format!("Failed to re-bind `{}` to `{}`", cfg.from, cfg.to))?;
        log::info!("Re-bound {} chains from `{}` to `{}`", count, cfg.from, cfg.to);
        Ok(count)
    }

    pub fn fire(&mut self, cfg: &FireConfig) -> Result<()> {
        let target = self.lookup(&cfg.node)?;
        let event = self
            .hub
            .dispatch(cfg.event.trim(), target, cfg.detail.clone(), cfg.bubbles);
        if event.default_prevented() {
            log::debug!("Default action of `{}` on `{}` prevented", cfg.event, cfg.node);
        }
        self.hub.run_until_stalled();
        Ok(())
    }

    /// Drain remaining continuations and snapshot the document
    pub fn finish(self) -> Report {
        self.hub.run_until_stalled();
        Report::new(&self.doc.borrow(), &self.builds, &self.hub.records())
    }

    fn lookup(&self, id: &str) -> Result<NodeId> {
        self.ids
            .get(id)
            .copied()
            .ok_or_else(|| anyhow!("Unknown node `{}`", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::FireStatus;
    use obt_core::Value;

    fn scene(text: &str) -> Scene {
        let scene: Scene = toml::from_str(text).unwrap();
        crate::config::validate(&scene).unwrap();
        scene
    }

    #[test]
    fn test_counter_scene() {
        let report = Session::run(&scene(
            r#"
            [[node]]
            id = "out"
            on = "click|push(2,3) add(4)"
            to = "=|text"

            [[fire]]
            node = "out"
            event = "click"
            "#,
        ))
        .unwrap();

        assert_eq!(report.firings.len(), 1);
        assert_eq!(report.firings[0].status, FireStatus::Done);
        let out = report.nodes.iter().find(|n| n.node == "#out").unwrap();
        assert_eq!(out.text, "9");
    }

    #[test]
    fn test_filtered_query_and_updates() {
        let report = Session::run(&scene(
            r#"
            [[node]]
            id = "list"
            tag = "ul"
            on = "click|push('on')"
            to = "(li){i<2}|addClass"

            [[node]]
            id = "a"
            tag = "li"
            parent = "list"

            [[node]]
            id = "b"
            tag = "li"
            parent = "list"

            [[node]]
            id = "c"
            tag = "li"
            parent = "list"

            [[fire]]
            node = "c"
            event = "click"
            "#,
        ))
        .unwrap();

        let classes = |id: &str| {
            report
                .nodes
                .iter()
                .find(|n| n.node == id)
                .map(|n| n.classes.clone())
                .unwrap()
        };
        assert_eq!(classes("#a"), vec!["on"]);
        assert_eq!(classes("#b"), vec!["on"]);
        assert!(classes("#c").is_empty());
        assert_eq!(report.firings[0].target, "#c");
        assert_eq!(report.firings[0].delegate, "#list");
    }

    #[test]
    fn test_filter_on_attribute_values() {
        let report = Session::run(&scene(
            r#"
            [[node]]
            id = "list"
            tag = "ul"
            on = "click|push('hit')"
            to = "(li){v.data_state == 'open' || v.text == 'c'}|addClass"

            [[node]]
            id = "a"
            tag = "li"
            parent = "list"
            attrs = { data-state = "open" }

            [[node]]
            id = "b"
            tag = "li"
            parent = "list"
            attrs = { data-state = "closed" }

            [[node]]
            id = "c"
            tag = "li"
            parent = "list"
            text = "c"

            [[fire]]
            node = "b"
            event = "click"
            "#,
        ))
        .unwrap();

        let classes = |id: &str| {
            report
                .nodes
                .iter()
                .find(|n| n.node == id)
                .map(|n| n.classes.clone())
                .unwrap()
        };
        assert_eq!(classes("#a"), vec!["hit"]);
        assert!(classes("#b").is_empty());
        assert_eq!(classes("#c"), vec!["hit"]);
    }

    #[test]
    fn test_rebind_with_init() {
        let report = Session::run(&scene(
            r#"
            [[node]]
            id = "tpl"
            on = "@render|add(10)"
            to = "=|text"

            [[node]]
            id = "view"

            [[rebind]]
            from = "tpl"
            to = "view"
            init = 5

            [[fire]]
            node = "view"
            event = "render"
            "#,
        ))
        .unwrap();

        assert_eq!(report.builds[0].stored, 1);
        let view = report.nodes.iter().find(|n| n.node == "#view").unwrap();
        assert_eq!(view.text, "15");
        assert_eq!(report.firings[0].value, None);
    }

    #[test]
    fn test_lenient_build_reports_skipped_groups() {
        let report = Session::run(&scene(
            r#"
            [builder]
            strict = false

            [[node]]
            id = "n"
            on = "click|nosuch; hover|push(1)"
            "#,
        ))
        .unwrap();

        assert_eq!(report.builds[0].chains, 1);
        assert_eq!(report.builds[0].errors.len(), 1);
    }

    #[test]
    fn test_strict_build_fails() {
        let err = Session::run(&scene(
            r#"
            [[node]]
            id = "n"
            on = "click|nosuch"
            "#,
        ))
        .err()
        .unwrap();
        assert!(format!("{:#}", err).contains("Failed to build node `n`"));
    }

    #[test]
    fn test_deferred_value_settles() {
        let report = Session::run(&scene(
            r#"
            [[node]]
            id = "n"
            on = "go|defer(7)"

            [[fire]]
            node = "n"
            event = "go"
            "#,
        ))
        .unwrap();

        assert_eq!(report.firings[0].status, FireStatus::Done);
        assert_eq!(report.firings[0].value, Some(Value::Int(7)));
    }
}
