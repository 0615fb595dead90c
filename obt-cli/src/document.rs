//! In-memory node tree
//!
//! A deliberately small stand-in for a browser document: nodes with a tag,
//! an id, classes, attributes, properties, inline styles and text.

use crate::selector::{Element, Selector, SelectorError};
use obt_core::{NodeFinder, NodeId, Value};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub tag: String,
    /// The `id` attribute
    pub name: Option<String>,
    pub classes: Vec<String>,
    pub attrs: BTreeMap<String, String>,
    pub props: BTreeMap<String, Value>,
    pub styles: BTreeMap<String, String>,
    pub text: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl Node {
    fn new(id: NodeId, tag: &str, parent: Option<NodeId>) -> Self {
        Self {
            id,
            tag: tag.to_string(),
            name: None,
            classes: Vec::new(),
            attrs: BTreeMap::new(),
            props: BTreeMap::new(),
            styles: BTreeMap::new(),
            text: String::new(),
            parent,
            children: Vec::new(),
        }
    }

    pub fn add_class(&mut self, class: &str) {
        if !self.classes.iter().any(|c| c == class) {
            self.classes.push(class.to_string());
        }
    }

    /// Set an attribute; `id` and `class` map onto their dedicated fields
    pub fn set_attr(&mut self, name: &str, value: &str) {
        match name {
            "id" => self.name = Some(value.to_string()),
            "class" => {
                self.classes.clear();
                value.split_whitespace().for_each(|c| self.add_class(c));
            }
            _ => {
                self.attrs.insert(name.to_string(), value.to_string());
            }
        }
    }

    pub fn remove_attr(&mut self, name: &str) {
        match name {
            "id" => self.name = None,
            "class" => self.classes.clear(),
            _ => {
                self.attrs.remove(name);
            }
        }
    }
}

impl Element for Node {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn html_id(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    fn attr(&self, name: &str) -> Option<&str> {
        match name {
            "id" => self.name.as_deref(),
            _ => self.attrs.get(name).map(String::as_str),
        }
    }
}

/// Node arena; `NodeId(0)` is the root
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Document {
    pub const ROOT: NodeId = NodeId(0);

    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(Self::ROOT, "html", None)],
        }
    }

    /// Append a new element under `parent` (the root if `None`)
    pub fn create(&mut self, tag: &str, parent: Option<NodeId>) -> NodeId {
        let parent = parent.unwrap_or(Self::ROOT);
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(id, tag, Some(parent)));
        if let Some(p) = self.nodes.get_mut(parent.0) {
            p.children.push(id);
        }
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Printable handle: `#name` or `tag@n`
    pub fn label(&self, id: NodeId) -> String {
        match self.node(id) {
            Some(Node { name: Some(name), .. }) => format!("#{}", name),
            Some(node) => format!("{}@{}", node.tag, id.0),
            None => id.to_string(),
        }
    }

    /// The node itself, then its ancestors up to the root
    pub fn path(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut at = self.node(id).map(|n| n.id);
        while let Some(cur) = at {
            out.push(cur);
            at = self.node(cur).and_then(|n| n.parent);
        }
        out
    }

    /// Descendants of `id` in tree order, excluding `id`
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut todo: Vec<NodeId> = self
            .node(id)
            .map(|n| n.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(cur) = todo.pop() {
            out.push(cur);
            if let Some(n) = self.node(cur) {
                todo.extend(n.children.iter().rev().copied());
            }
        }
        out
    }

    pub fn matches(&self, id: NodeId, selector: &Selector) -> bool {
        let path: Vec<&dyn Element> = self
            .path(id)
            .into_iter()
            .filter_map(|n| self.node(n))
            .map(|n| n as &dyn Element)
            .collect();
        selector.matches(&path)
    }

    /// Descendants of `start` (whole document if `None`) matching `selector`
    pub fn select(&self, selector: &str, start: Option<NodeId>) -> Result<Vec<NodeId>, SelectorError> {
        let selector = Selector::parse(selector)?;
        Ok(self
            .descendants(start.unwrap_or(Self::ROOT))
            .into_iter()
            .filter(|&n| self.matches(n, &selector))
            .collect())
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

/// [`NodeFinder`] over a shared document
pub struct DocFinder {
    doc: Rc<RefCell<Document>>,
}

impl DocFinder {
    pub fn new(doc: Rc<RefCell<Document>>) -> Self {
        Self { doc }
    }
}

impl NodeFinder for DocFinder {
    fn find_one(&self, selector: &str, start: Option<NodeId>) -> Option<NodeId> {
        self.find_all(selector, start).into_iter().next()
    }

    fn find_all(&self, selector: &str, start: Option<NodeId>) -> Vec<NodeId> {
        match self.doc.borrow().select(selector, start) {
            Ok(found) => found,
            Err(e) => {
                log::warn!("{}", e);
                Vec::new()
            }
        }
    }

    /// Property, then attribute (`data_i` also reads `data-i`), then `text` / `tag`
    fn value(&self, node: NodeId, name: &str) -> Option<Value> {
        let doc = self.doc.borrow();
        let node = doc.node(node)?;
        if let Some(v) = node.props.get(name) {
            return Some(v.clone());
        }
        let attr = node.attr(name).or_else(|| node.attr(&name.replace('_', "-")));
        if let Some(v) = attr {
            return Some(Value::from(v));
        }
        match name {
            "text" => Some(Value::from(node.text.as_str())),
            "tag" => Some(Value::from(node.tag.as_str())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Document, NodeId, Vec<NodeId>) {
        let mut doc = Document::new();
        let ul = doc.create("ul", None);
        doc.node_mut(ul).unwrap().name = Some("menu".into());
        let items: Vec<NodeId> = (0..3)
            .map(|i| {
                let li = doc.create("li", Some(ul));
                doc.node_mut(li).unwrap().add_class("item");
                doc.node_mut(li).unwrap().attrs.insert("data-i".into(), i.to_string());
                li
            })
            .collect();
        (doc, ul, items)
    }

    #[test]
    fn test_tree_navigation() {
        let (doc, ul, items) = sample();
        assert_eq!(doc.path(items[1]), vec![items[1], ul, Document::ROOT]);
        assert_eq!(doc.descendants(Document::ROOT), vec![ul, items[0], items[1], items[2]]);
        assert_eq!(doc.label(ul), "#menu");
        assert_eq!(doc.label(items[0]), "li@2");
    }

    #[test]
    fn test_select_scoped() {
        let (doc, ul, items) = sample();
        assert_eq!(doc.select("#menu .item", None).unwrap(), items);
        assert_eq!(doc.select("li[data-i=2]", Some(ul)).unwrap(), vec![items[2]]);
        assert!(doc.select(".item", Some(items[0])).unwrap().is_empty());
        assert!(doc.select("li>", None).is_err());
    }

    #[test]
    fn test_doc_finder() {
        let (doc, ul, items) = sample();
        let finder = DocFinder::new(Rc::new(RefCell::new(doc)));
        assert_eq!(finder.find_one(".item", Some(ul)), Some(items[0]));
        assert_eq!(finder.find_all("li", None).len(), 3);
        assert!(finder.find_all("[", None).is_empty());
    }

    #[test]
    fn test_doc_finder_values() {
        let (mut doc, ul, items) = sample();
        doc.node_mut(items[0]).unwrap().props.insert("checked".into(), Value::Bool(true));
        doc.node_mut(items[1]).unwrap().text = "two".into();
        let finder = DocFinder::new(Rc::new(RefCell::new(doc)));

        assert_eq!(finder.value(items[2], "data_i"), Some(Value::from("2")));
        assert_eq!(finder.value(items[0], "checked"), Some(Value::Bool(true)));
        assert_eq!(finder.value(items[1], "text"), Some(Value::from("two")));
        assert_eq!(finder.value(ul, "id"), Some(Value::from("menu")));
        assert_eq!(finder.value(ul, "tag"), Some(Value::from("ul")));
        assert_eq!(finder.value(items[1], "checked"), None);
        assert_eq!(finder.value(NodeId(99), "tag"), None);
    }
}
