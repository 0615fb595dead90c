//! Run report
//!
//! Plain text for the terminal, JSON for tooling.

use crate::dispatcher::{FireRecord, FireStatus};
use crate::document::{Document, Node};
use chrono::{DateTime, Utc};
use obt_core::{BuildSummary, Value};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;

#[derive(Debug, Clone, Serialize)]
pub struct BuildLine {
    pub node: String,
    pub chains: usize,
    pub bound: usize,
    pub stored: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FiringLine {
    pub event: String,
    pub target: String,
    pub current: String,
    pub delegate: String,
    pub status: FireStatus,
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeState {
    pub node: String,
    pub tag: String,
    pub classes: Vec<String>,
    pub attrs: BTreeMap<String, String>,
    pub props: BTreeMap<String, Value>,
    pub styles: BTreeMap<String, String>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub generated: DateTime<Utc>,
    pub builds: Vec<BuildLine>,
    pub firings: Vec<FiringLine>,
    pub nodes: Vec<NodeState>,
}

impl Report {
    pub fn new(doc: &Document, builds: &[BuildSummary], records: &[FireRecord]) -> Self {
        let builds = builds
            .iter()
            .map(|b| BuildLine {
                node: doc.label(b.node),
                chains: b.chains,
                bound: b.bound,
                stored: b.stored,
                errors: b
                    .errors
                    .iter()
                    .map(|e| format!("group {} `{}`: {}", e.index, e.on, e.error))
                    .collect(),
            })
            .collect();

        let firings = records
            .iter()
            .map(|r| FiringLine {
                event: r.event.clone(),
                target: doc.label(r.target),
                current: doc.label(r.current),
                delegate: doc.label(r.delegate),
                status: r.status.clone(),
                value: r.value.clone(),
            })
            .collect();

        let nodes = doc
            .nodes()
            .filter(|n| n.id != Document::ROOT)
            .map(|n| node_state(doc, n))
            .collect();

        Self {
            generated: Utc::now(),
            builds,
            firings,
            nodes,
        }
    }

    pub fn render_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "Report generated {}", self.generated.format("%Y-%m-%d %H:%M:%S UTC"));
        let _ = writeln!(out, "\nBuilds:");
        for b in &self.builds {
            let _ = writeln!(
                out,
                "  {:<12} chains={} bound={} stored={}",
                b.node, b.chains, b.bound, b.stored
            );
            for e in &b.errors {
                let _ = writeln!(out, "    skipped {}", e);
            }
        }

        let _ = writeln!(out, "\nFirings:");
        if self.firings.is_empty() {
            let _ = writeln!(out, "  (none)");
        }
        for f in &self.firings {
            let status = match &f.status {
                FireStatus::Done => "done".to_string(),
                FireStatus::Pending => "pending".to_string(),
                FireStatus::Aborted => "aborted".to_string(),
                FireStatus::Failed(e) => format!("failed: {}", e),
            };
            let value = f.value.as_ref().map_or_else(|| "-".to_string(), Value::to_string);
            let _ = writeln!(
                out,
                "  {} at {} on {} (via {}): {} => {}",
                f.event, f.target, f.current, f.delegate, status, value
            );
        }

        let _ = writeln!(out, "\nNodes:");
        for n in &self.nodes {
            let _ = write!(out, "  {} <{}>", n.node, n.tag);
            if !n.classes.is_empty() {
                let _ = write!(out, " .{}", n.classes.join("."));
            }
            for (k, v) in &n.attrs {
                let _ = write!(out, " {}=\"{}\"", k, v);
            }
            for (k, v) in &n.props {
                let _ = write!(out, " ${}={}", k, v);
            }
            for (k, v) in &n.styles {
                let _ = write!(out, " %{}={}", k, v);
            }
            if !n.text.is_empty() {
                let _ = write!(out, " text={:?}", n.text);
            }
            let _ = writeln!(out);
        }
        out
    }
}

fn node_state(doc: &Document, node: &Node) -> NodeState {
    NodeState {
        node: doc.label(node.id),
        tag: node.tag.clone(),
        classes: node.classes.clone(),
        attrs: node.attrs.clone(),
        props: node.props.clone(),
        styles: node.styles.clone(),
        text: node.text.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obt_core::NodeId;

    fn sample() -> Report {
        let mut doc = Document::new();
        let p = doc.create("p", None);
        {
            let node = doc.node_mut(p).unwrap();
            node.set_attr("id", "greet");
            node.set_attr("title", "hi");
            node.text = "hello".into();
        }
        let records = vec![FireRecord {
            event: "click".into(),
            target: p,
            current: p,
            delegate: p,
            status: FireStatus::Done,
            value: Some(Value::Int(3)),
        }];
        Report::new(&doc, &[], &records)
    }

    #[test]
    fn test_render_text() {
        let text = sample().render_text();
        assert!(text.contains("click at #greet on #greet (via #greet): done => 3"));
        assert!(text.contains("#greet <p> title=\"hi\" text=\"hello\""));
        assert!(text.starts_with("Report generated "));
    }

    #[test]
    fn test_render_json() {
        let json: serde_json::Value = serde_json::from_str(&sample().render_json().unwrap()).unwrap();
        assert_eq!(json["firings"][0]["status"], "done");
        assert_eq!(json["firings"][0]["value"], 3);
        assert_eq!(json["nodes"][0]["node"], "#greet");
        assert_eq!(json["nodes"].as_array().map(Vec::len), Some(1));
        assert!(json["generated"].is_string());
    }

    #[test]
    fn test_unknown_node_label() {
        let doc = Document::new();
        assert_eq!(doc.label(NodeId(42)), "#42");
    }
}
