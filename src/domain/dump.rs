//! Serialized tree shape shared by snapshots, dumps and restore.

use serde::{Deserialize, Serialize};

/// One node of a serialized tree dump: `{ key, value, children }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "V: Deserialize<'de>"))]
pub struct NodeDto<V> {
    pub key: String,
    pub value: V,
    #[serde(default)]
    pub children: Vec<NodeDto<V>>,
}

impl<V> NodeDto<V> {
    /// Number of nodes in this subtree, including `self`.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(NodeDto::size).sum::<usize>()
    }

    /// Depth-first search for `key` within this subtree.
    pub fn find(&self, key: &str) -> Option<&NodeDto<V>> {
        if self.key == key {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(key))
    }

    /// All keys in pre-order.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys = Vec::with_capacity(self.size());
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            keys.push(node.key.as_str());
            // Push children in reverse order for left-to-right traversal
            for child in node.children.iter().rev() {
                stack.push(child);
            }
        }
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(key: &str) -> NodeDto<u32> {
        NodeDto {
            key: key.to_string(),
            value: 0,
            children: vec![],
        }
    }

    #[test]
    fn given_nested_dto_when_listing_keys_then_returns_preorder() {
        let mut a = leaf("a");
        a.children.push(leaf("a1"));
        let root = NodeDto {
            key: "root".to_string(),
            value: 0,
            children: vec![a, leaf("b")],
        };

        assert_eq!(root.keys(), vec!["root", "a", "a1", "b"]);
        assert_eq!(root.size(), 4);
        assert_eq!(root.find("a1").map(|n| n.key.as_str()), Some("a1"));
        assert!(root.find("zzz").is_none());
    }

    #[test]
    fn given_dump_without_children_field_when_deserializing_then_defaults_to_empty() {
        let dto: NodeDto<u32> = serde_json::from_str(r#"{"key":"k","value":7}"#).unwrap();
        assert!(dto.children.is_empty());
        assert_eq!(dto.value, 7);
    }
}
