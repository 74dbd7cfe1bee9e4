//! Domain layer: the keyed tree and block payloads
//!
//! This layer is independent of external concerns (no I/O, no async, no config loading).

pub mod arena;
pub mod catalog;
pub mod display;
pub mod dump;
pub mod entities;
pub mod error;

pub use arena::{ContentTree, NodeView, TreeIterator, TreeNode, MAX_DEPTH};
pub use catalog::{default_types, EditorPropConfig, EditorTypeConfig, InnerBlocksConfig};
pub use display::TreeNodeConvert;
pub use dump::NodeDto;
pub use entities::{ContentNodeValue, DEFAULT_TYPE, MAX_PROPS_NESTING, ROOT_TYPE};
pub use error::{TreeError, TreeResult};
