//! Domain entities: core data structures

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Type name reserved for the root node of every content tree.
pub const ROOT_TYPE: &str = "root";

/// Type name of the built-in default block.
pub const DEFAULT_TYPE: &str = "default";

/// Deepest JSON nesting inside `props`, the map itself included. Keeps the
/// dump of a tree at `MAX_DEPTH` restorable.
pub const MAX_PROPS_NESTING: usize = 32;

/// Payload stored at each node of a content tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentNodeValue {
    /// Block kind; drives external rendering and editor config lookup
    #[serde(rename = "type")]
    pub node_type: String,
    /// Human-readable name shown in the builder UI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Raw markup for HTML-emitting block types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    /// Free-form configuration, opaque to the store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<Map<String, Value>>,
    /// Whether the UI lets this block accept children (not enforced here)
    #[serde(default, alias = "allowChildren", skip_serializing_if = "Option::is_none")]
    pub allow_inner_blocks: Option<bool>,
}

impl ContentNodeValue {
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            label: None,
            html: None,
            props: None,
            allow_inner_blocks: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    pub fn with_prop(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props
            .get_or_insert_with(Map::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn with_inner_blocks(mut self, allow: bool) -> Self {
        self.allow_inner_blocks = Some(allow);
        self
    }

    /// True if the label is missing or blank.
    pub fn needs_label(&self) -> bool {
        self.label.as_deref().map_or(true, |l| l.trim().is_empty())
    }

    /// JSON nesting of `props`: 0 without props, 1 for a flat map.
    pub fn props_nesting(&self) -> usize {
        self.props
            .as_ref()
            .map_or(0, |props| 1 + props.values().map(nesting).max().unwrap_or(0))
    }

    /// Value of the root node.
    pub fn root(root_type: impl Into<String>) -> Self {
        Self::new(root_type)
    }
}

fn nesting(value: &Value) -> usize {
    match value {
        Value::Array(items) => 1 + items.iter().map(nesting).max().unwrap_or(0),
        Value::Object(map) => 1 + map.values().map(nesting).max().unwrap_or(0),
        _ => 0,
    }
}

impl Default for ContentNodeValue {
    fn default() -> Self {
        Self::new(DEFAULT_TYPE).with_inner_blocks(true)
    }
}

impl fmt::Display for ContentNodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{} [{}]", label, self.node_type),
            None => write!(f, "[{}]", self.node_type),
        }
    }
}
