/*
Rendering of serialized content trees as termtree output.
A trait because termtree::Tree is a foreign type.
 */
use std::fmt::Display;

use termtree::Tree;
use tracing::instrument;

use crate::domain::dump::NodeDto;

pub trait TreeNodeConvert {
    fn to_tree_string(&self) -> Tree<String>;
}

impl<V: Display> TreeNodeConvert for NodeDto<V> {
    #[instrument(level = "trace", skip_all)]
    fn to_tree_string(&self) -> Tree<String> {
        let leaves: Vec<_> = self.children.iter().map(|c| c.to_tree_string()).collect();
        Tree::new(format!("{} ({})", self.value, self.key)).with_leaves(leaves)
    }
}
