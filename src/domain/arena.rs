use std::collections::HashMap;

use generational_arena::{Arena, Index};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;

use crate::domain::dump::NodeDto;
use crate::domain::error::{TreeError, TreeResult};

/// Deepest tree allowed, root included.
///
/// Each level costs two JSON nesting levels in a dump (node object and
/// `children` array); together with node values a dump must stay below
/// serde_json's recursion limit of 128 or it can never be restored.
pub const MAX_DEPTH: usize = 32;

/// Tree node in the arena-based hierarchy structure.
#[derive(Debug, Clone)]
pub struct TreeNode<V> {
    /// Unique key, stable for the lifetime of the node
    pub key: String,
    /// Payload stored at this node
    pub value: V,
    /// Index of parent node in the arena, None for the root
    pub parent: Option<Index>,
    /// Indices of child nodes in the arena, in sibling order
    pub children: Vec<Index>,
}

/// Ordered, keyed tree backed by a generational arena.
///
/// There is always exactly one root. Every node is addressable by its string
/// key; arena indices never leave this module, so callers re-resolve by key
/// before each operation and never hold stale references.
#[derive(Debug)]
pub struct ContentTree<V> {
    /// Arena storage for all tree nodes
    arena: Arena<TreeNode<V>>,
    /// Index of the root node
    root: Index,
    /// Key lookup, kept in sync with `arena`
    keys: HashMap<String, Index>,
}

/// Borrowed view of one node, resolved by key.
pub struct NodeView<'a, V> {
    tree: &'a ContentTree<V>,
    idx: Index,
}

impl<V> Clone for NodeView<'_, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for NodeView<'_, V> {}

impl<'a, V> NodeView<'a, V> {
    fn node(&self) -> &'a TreeNode<V> {
        let tree: &'a ContentTree<V> = self.tree;
        &tree.arena[self.idx]
    }

    pub fn key(&self) -> &'a str {
        &self.node().key
    }

    pub fn value(&self) -> &'a V {
        &self.node().value
    }

    pub fn is_root(&self) -> bool {
        self.idx == self.tree.root
    }

    pub fn parent_key(&self) -> Option<&'a str> {
        let tree: &'a ContentTree<V> = self.tree;
        self.node().parent.map(|p| tree.arena[p].key.as_str())
    }

    pub fn child_keys(&self) -> Vec<&'a str> {
        let tree: &'a ContentTree<V> = self.tree;
        self.node()
            .children
            .iter()
            .map(|&c| tree.arena[c].key.as_str())
            .collect()
    }

    /// Position among the parent's children (0 for the root).
    pub fn sibling_index(&self) -> usize {
        self.node()
            .parent
            .and_then(|p| self.tree.arena[p].children.iter().position(|&c| c == self.idx))
            .unwrap_or(0)
    }
}

fn new_key() -> String {
    Uuid::new_v4().simple().to_string()
}

impl<V> ContentTree<V> {
    /// Create a tree holding only a root node with `root_value`.
    pub fn new(root_value: V) -> Self {
        let mut arena = Arena::new();
        let key = new_key();
        let root = arena.insert(TreeNode {
            key: key.clone(),
            value: root_value,
            parent: None,
            children: Vec::new(),
        });
        let mut keys = HashMap::new();
        keys.insert(key, root);
        Self { arena, root, keys }
    }

    pub fn root_key(&self) -> &str {
        &self.arena[self.root].key
    }

    pub fn root(&self) -> NodeView<'_, V> {
        NodeView {
            tree: self,
            idx: self.root,
        }
    }

    /// Number of nodes, including the root.
    pub fn size(&self) -> usize {
        self.arena.len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains_key(key)
    }

    pub fn find(&self, key: &str) -> Option<NodeView<'_, V>> {
        self.keys.get(key).map(|&idx| NodeView { tree: self, idx })
    }

    pub fn value(&self, key: &str) -> Option<&V> {
        self.keys.get(key).map(|&idx| &self.arena[idx].value)
    }

    fn index(&self, key: &str) -> TreeResult<Index> {
        self.keys
            .get(key)
            .copied()
            .ok_or_else(|| TreeError::NotFound(key.to_string()))
    }

    fn fresh_key(&self) -> String {
        loop {
            let key = new_key();
            if !self.keys.contains_key(&key) {
                return key;
            }
        }
    }

    fn insert_under(&mut self, parent: Index, value: V) -> Index {
        let key = self.fresh_key();
        let idx = self.arena.insert(TreeNode {
            key: key.clone(),
            value,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.arena[parent].children.push(idx);
        self.keys.insert(key, idx);
        idx
    }

    /// Unlink `idx` from its parent's child list. The subtree stays in the arena.
    fn detach(&mut self, idx: Index) {
        if let Some(parent) = self.arena[idx].parent.take() {
            self.arena[parent].children.retain(|&c| c != idx);
        }
    }

    /// True if `ancestor` is `node` or lies on the path from `node` to the root.
    fn is_ancestor_or_self(&self, ancestor: Index, node: Index) -> bool {
        let mut current = Some(node);
        while let Some(idx) = current {
            if idx == ancestor {
                return true;
            }
            current = self.arena[idx].parent;
        }
        false
    }

    /// Level of `idx` counted from the root, which is level 1.
    fn level(&self, idx: Index) -> usize {
        let mut level = 0;
        let mut current = Some(idx);
        while let Some(i) = current {
            level += 1;
            current = self.arena[i].parent;
        }
        level
    }

    /// Rejects hanging a subtree of `height` levels below `dest`.
    fn ensure_fits(&self, dest: Index, height: usize) -> TreeResult<()> {
        if self.level(dest) + height > MAX_DEPTH {
            return Err(TreeError::TooDeep { max: MAX_DEPTH });
        }
        Ok(())
    }

    /// Append `value` as the last child of `parent_key`; returns the new key.
    #[instrument(level = "trace", skip(self, value))]
    pub fn append_child(&mut self, parent_key: &str, value: V) -> TreeResult<String> {
        let parent = self.index(parent_key)?;
        self.ensure_fits(parent, 1)?;
        let idx = self.insert_under(parent, value);
        Ok(self.arena[idx].key.clone())
    }

    /// Remove the node and its entire subtree.
    ///
    /// Returns `Ok(false)` if no node has `key`; the root cannot be removed.
    #[instrument(level = "trace", skip(self))]
    pub fn remove(&mut self, key: &str) -> TreeResult<bool> {
        let Some(&idx) = self.keys.get(key) else {
            return Ok(false);
        };
        if idx == self.root {
            return Err(TreeError::RootRemoval);
        }
        self.detach(idx);
        let doomed: Vec<Index> = PostOrderIterator::new(self, idx).collect();
        for doomed_idx in doomed {
            if let Some(node) = self.arena.remove(doomed_idx) {
                self.keys.remove(&node.key);
            }
        }
        Ok(true)
    }

    /// Reparent the subtree at `src` as the last child of `dest_parent`.
    ///
    /// Rejects moving the root, moving a node into its own subtree and
    /// exceeding [`MAX_DEPTH`].
    #[instrument(level = "trace", skip(self))]
    pub fn move_node(&mut self, src: &str, dest_parent: &str) -> TreeResult<()> {
        let src_idx = self.index(src)?;
        let dest_idx = self.index(dest_parent)?;
        if src_idx == self.root {
            return Err(TreeError::RootMove);
        }
        if self.is_ancestor_or_self(src_idx, dest_idx) {
            return Err(TreeError::Cycle {
                src: src.to_string(),
                target: dest_parent.to_string(),
            });
        }
        self.ensure_fits(dest_idx, self.calculate_depth(src_idx))?;
        self.detach(src_idx);
        self.arena[dest_idx].children.push(src_idx);
        self.arena[src_idx].parent = Some(dest_idx);
        Ok(())
    }

    /// Move `key` to `target_index` among its current siblings.
    ///
    /// The index is clamped to the valid range; the final position is returned.
    /// The root has no siblings and always reports position 0.
    #[instrument(level = "trace", skip(self))]
    pub fn move_sibling_index(&mut self, key: &str, target_index: usize) -> TreeResult<usize> {
        let idx = self.index(key)?;
        let Some(parent) = self.arena[idx].parent else {
            return Ok(0);
        };
        let siblings = &mut self.arena[parent].children;
        let from = siblings
            .iter()
            .position(|&c| c == idx)
            .ok_or_else(|| TreeError::NotFound(key.to_string()))?;
        siblings.remove(from);
        let to = target_index.min(siblings.len());
        siblings.insert(to, idx);
        Ok(to)
    }

    /// Replace the value stored at `key`.
    #[instrument(level = "trace", skip(self, value))]
    pub fn set_value(&mut self, key: &str, value: V) -> TreeResult<()> {
        let idx = self.index(key)?;
        self.arena[idx].value = value;
        Ok(())
    }

    pub fn iter(&self) -> TreeIterator<'_, V> {
        TreeIterator::new(self)
    }

    pub fn depth(&self) -> usize {
        self.calculate_depth(self.root)
    }

    fn calculate_depth(&self, node_idx: Index) -> usize {
        1 + self.arena[node_idx]
            .children
            .iter()
            .map(|&child| self.calculate_depth(child))
            .max()
            .unwrap_or(0)
    }

    /// Keys of all nodes without children, left to right.
    pub fn leaf_keys(&self) -> Vec<&str> {
        self.iter()
            .filter(|node| node.node().children.is_empty())
            .map(|node| node.key())
            .collect()
    }

    /// Build a tree from a serialized shape, keeping its keys.
    pub fn from_dto(dto: NodeDto<V>) -> TreeResult<Self> {
        let mut arena = Arena::with_capacity(dto.size());
        let mut keys = HashMap::new();
        let root = Self::load_node(&mut arena, &mut keys, None, 1, dto)?;
        Ok(Self { arena, root, keys })
    }

    fn load_node(
        arena: &mut Arena<TreeNode<V>>,
        keys: &mut HashMap<String, Index>,
        parent: Option<Index>,
        level: usize,
        dto: NodeDto<V>,
    ) -> TreeResult<Index> {
        if level > MAX_DEPTH {
            return Err(TreeError::TooDeep { max: MAX_DEPTH });
        }
        if keys.contains_key(&dto.key) {
            return Err(TreeError::DuplicateKey(dto.key));
        }
        let idx = arena.insert(TreeNode {
            key: dto.key.clone(),
            value: dto.value,
            parent,
            children: Vec::with_capacity(dto.children.len()),
        });
        keys.insert(dto.key, idx);
        for child in dto.children {
            let child_idx = Self::load_node(arena, keys, Some(idx), level + 1, child)?;
            arena[idx].children.push(child_idx);
        }
        Ok(idx)
    }
}

impl<V: Clone> ContentTree<V> {
    fn subtree_dto(&self, idx: Index) -> NodeDto<V> {
        let node = &self.arena[idx];
        NodeDto {
            key: node.key.clone(),
            value: node.value.clone(),
            children: node
                .children
                .iter()
                .map(|&child| self.subtree_dto(child))
                .collect(),
        }
    }

    /// Full structural and value dump, rooted at the tree root.
    pub fn to_dto(&self) -> NodeDto<V> {
        self.subtree_dto(self.root)
    }

    /// Insert `blueprint` under `parent` with fresh keys throughout.
    fn graft(&mut self, parent: Index, blueprint: NodeDto<V>) -> Index {
        let idx = self.insert_under(parent, blueprint.value);
        for child in blueprint.children {
            self.graft(idx, child);
        }
        idx
    }

    /// Deep-copy the subtree at `src` as the last child of `dest_parent`.
    ///
    /// Every copied node gets a fresh key; returns the key of the copy's root.
    /// Fails if the copy would exceed [`MAX_DEPTH`].
    #[instrument(level = "trace", skip(self))]
    pub fn copy(&mut self, src: &str, dest_parent: &str) -> TreeResult<String> {
        let src_idx = self.index(src)?;
        let dest_idx = self.index(dest_parent)?;
        self.ensure_fits(dest_idx, self.calculate_depth(src_idx))?;
        // Taken before inserting, so copying into the source's own subtree terminates.
        let blueprint = self.subtree_dto(src_idx);
        let idx = self.graft(dest_idx, blueprint);
        Ok(self.arena[idx].key.clone())
    }
}

impl<V: Clone + Serialize> ContentTree<V> {
    /// Stable string form accepted by [`ContentTree::restore`].
    pub fn dump(&self) -> TreeResult<String> {
        serde_json::to_string(&self.to_dto()).map_err(TreeError::Serialize)
    }
}

impl<V: DeserializeOwned> ContentTree<V> {
    /// Replace the whole structure with the contents of `dump`.
    ///
    /// The current tree is untouched if the dump is malformed or repeats a key.
    #[instrument(level = "trace", skip_all)]
    pub fn restore(&mut self, dump: &str) -> TreeResult<()> {
        let dto: NodeDto<V> = serde_json::from_str(dump).map_err(TreeError::InvalidDump)?;
        *self = Self::from_dto(dto)?;
        Ok(())
    }
}

/// Pre-order traversal from the root, children left to right.
pub struct TreeIterator<'a, V> {
    tree: &'a ContentTree<V>,
    stack: Vec<Index>,
}

impl<'a, V> TreeIterator<'a, V> {
    fn new(tree: &'a ContentTree<V>) -> Self {
        Self {
            tree,
            stack: vec![tree.root],
        }
    }
}

impl<'a, V> Iterator for TreeIterator<'a, V> {
    type Item = NodeView<'a, V>;

    fn next(&mut self) -> Option<Self::Item> {
        let current_idx = self.stack.pop()?;
        let node = self.tree.arena.get(current_idx)?;
        // Push children in reverse order for left-to-right traversal
        for &child in node.children.iter().rev() {
            self.stack.push(child);
        }
        Some(NodeView {
            tree: self.tree,
            idx: current_idx,
        })
    }
}

/// Post-order traversal of one subtree; yields arena indices.
struct PostOrderIterator<'a, V> {
    tree: &'a ContentTree<V>,
    stack: Vec<(Index, bool)>,
}

impl<'a, V> PostOrderIterator<'a, V> {
    fn new(tree: &'a ContentTree<V>, start: Index) -> Self {
        Self {
            tree,
            stack: vec![(start, false)],
        }
    }
}

impl<V> Iterator for PostOrderIterator<'_, V> {
    type Item = Index;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((current_idx, visited)) = self.stack.pop() {
            if let Some(node) = self.tree.arena.get(current_idx) {
                if !visited {
                    self.stack.push((current_idx, true));
                    for &child in node.children.iter().rev() {
                        self.stack.push((child, false));
                    }
                } else {
                    return Some(current_idx);
                }
            }
        }
        None
    }
}
