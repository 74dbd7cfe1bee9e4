//! Editor type catalog: static config describing the property form for each
//! block type. The store never reads it; UIs and the CLI do.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::entities::DEFAULT_TYPE;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorTypeConfig {
    /// Block type name (`ContentNodeValue::node_type`)
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<Vec<EditorPropConfig>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_inner_blocks: Option<InnerBlocksConfig>,
}

/// One generated form field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorPropConfig {
    pub name: String,
    pub input_type: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_props: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InnerBlocksConfig {
    pub value: bool,
    pub hidden: bool,
}

fn textarea(name: &str, placeholder: &str) -> EditorPropConfig {
    let mut input_props = Map::new();
    input_props.insert("placeholder".into(), Value::from(placeholder));
    EditorPropConfig {
        name: name.to_string(),
        input_type: "textarea".to_string(),
        value: Value::from(""),
        input_props: Some(input_props),
    }
}

/// Built-in catalog: a single `default` block with raw html and style.
pub fn default_types() -> Vec<EditorTypeConfig> {
    vec![EditorTypeConfig {
        value: DEFAULT_TYPE.to_string(),
        label: Some("Default".to_string()),
        description: Some(String::new()),
        props: Some(vec![
            textarea("html", "<b>Hello, World!</b>"),
            textarea("style", "color: red;"),
        ]),
        allow_inner_blocks: Some(InnerBlocksConfig {
            value: true,
            hidden: false,
        }),
    }]
}

/// Look up a type by name.
pub fn find_type<'a>(catalog: &'a [EditorTypeConfig], node_type: &str) -> Option<&'a EditorTypeConfig> {
    catalog.iter().find(|t| t.value == node_type)
}
