//! Scene file loading and validation

use anyhow::{bail, ensure, Context, Result};
use obt_core::{BuilderConfig, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

/// A scene: a node tree with OBT attributes plus the events to fire at it
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Scene {
    #[serde(default)]
    pub builder: BuilderConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default, rename = "node")]
    pub nodes: Vec<NodeConfig>,
    #[serde(default, rename = "fire")]
    pub fires: Vec<FireConfig>,
    #[serde(default, rename = "rebind")]
    pub rebinds: Vec<RebindConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeConfig {
    /// Scene-unique name, also the node's `id` attribute
    pub id: String,
    #[serde(default = "default_tag")]
    pub tag: String,
    /// Parent node id (document root if absent)
    pub parent: Option<String>,
    /// Space separated class list
    #[serde(default)]
    pub class: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub on: String,
    #[serde(default)]
    pub by: String,
    #[serde(default)]
    pub to: String,
}

fn default_tag() -> String {
    "div".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FireConfig {
    pub node: String,
    pub event: String,
    pub detail: Option<Value>,
    #[serde(default = "default_bubbles")]
    pub bubbles: bool,
}

fn default_bubbles() -> bool {
    true
}

/// Re-bind chains stored with `@event` on one node as listeners on another
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RebindConfig {
    pub from: String,
    pub to: String,
    /// Event names; empty re-binds everything stored on `from`
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub once: bool,
    pub init: Option<Value>,
    pub selector: Option<String>,
}

/// Load a scene from a TOML file
pub fn load_scene(path: &Path) -> Result<Scene> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scene file: {:?}", path))?;

    let scene: Scene = toml::from_str(&content)
        .with_context(|| format!("Failed to parse scene file: {:?}", path))?;

    validate(&scene).with_context(|| format!("Invalid scene file: {:?}", path))?;
    Ok(scene)
}

/// Check node references; parents must be declared before their children
pub fn validate(scene: &Scene) -> Result<()> {
    let mut known = HashSet::new();
    for node in &scene.nodes {
        ensure!(!node.id.is_empty(), "Node with empty id");
        if let Some(parent) = &node.parent {
            ensure!(
                known.contains(parent.as_str()),
                "Node `{}` refers to unknown parent `{}`",
                node.id,
                parent
            );
        }
        if !known.insert(node.id.as_str()) {
            bail!("Duplicate node id `{}`", node.id);
        }
    }

    for fire in &scene.fires {
        ensure!(known.contains(fire.node.as_str()), "Fire targets unknown node `{}`", fire.node);
        ensure!(!fire.event.trim().is_empty(), "Fire on `{}` has no event name", fire.node);
    }
    for rebind in &scene.rebinds {
        for id in [&rebind.from, &rebind.to] {
            ensure!(known.contains(id.as_str()), "Rebind refers to unknown node `{}`", id);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SCENE: &str = r#"
        [builder]
        strict = false

        [output]
        format = "json"

        [[node]]
        id = "menu"
        tag = "ul"
        on = "click(.item)|attr('href')"
        to = "=|text"

        [[node]]
        id = "first"
        tag = "li"
        parent = "menu"
        class = "item"
        attrs = { href = "/one" }

        [[fire]]
        node = "first"
        event = "click"
        detail = 5

        [[rebind]]
        from = "menu"
        to = "first"
        init = 3
    "#;

    #[test]
    fn test_scene_deserialization() {
        let scene: Scene = toml::from_str(SCENE).unwrap();
        assert!(!scene.builder.strict);
        assert!(scene.builder.debug);
        assert_eq!(scene.builder.done_event, "obted");
        assert_eq!(scene.output.format, OutputFormat::Json);

        assert_eq!(scene.nodes.len(), 2);
        assert_eq!(scene.nodes[1].tag, "li");
        assert_eq!(scene.nodes[1].attrs.get("href").map(String::as_str), Some("/one"));
        assert_eq!(scene.nodes[0].by, "");

        assert_eq!(scene.fires[0].detail, Some(Value::Int(5)));
        assert!(scene.fires[0].bubbles);
        assert_eq!(scene.rebinds[0].init, Some(Value::Int(3)));
        assert!(scene.rebinds[0].events.is_empty());
        assert!(validate(&scene).is_ok());
    }

    #[test]
    fn test_defaults_for_empty_scene() {
        let scene: Scene = toml::from_str("").unwrap();
        assert!(scene.nodes.is_empty());
        assert!(scene.builder.strict);
        assert_eq!(scene.output.format, OutputFormat::Text);
    }

    #[test]
    fn test_validation_errors() {
        let unknown_parent = r#"
            [[node]]
            id = "a"
            parent = "b"
        "#;
        let duplicate = r#"
            [[node]]
            id = "a"
            [[node]]
            id = "a"
        "#;
        let bad_fire = r#"
            [[node]]
            id = "a"
            [[fire]]
            node = "b"
            event = "click"
        "#;
        for text in [unknown_parent, duplicate, bad_fire] {
            let scene: Scene = toml::from_str(text).unwrap();
            assert!(validate(&scene).is_err(), "{}", text);
        }
    }

    #[test]
    fn test_load_scene_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SCENE.as_bytes()).unwrap();

        let scene = load_scene(file.path()).unwrap();
        assert_eq!(scene.nodes[0].id, "menu");
    }

    #[test]
    fn test_load_scene_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[[node]]\nid = 3\n").unwrap();

        let err = load_scene(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse scene file"));

        let missing = load_scene(Path::new("/nonexistent/scene.toml")).unwrap_err();
        assert!(missing.to_string().contains("Failed to read scene file"));
    }
}
