//! content-tree: an ordered, keyed block tree for content builders.
//!
//! The [`ContentTreeStore`] owns the tree, applies structural edits, publishes
//! immutable [`Snapshot`]s to observers and hands a JSON dump to an async save
//! hook after every change.

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod util;

pub use application::{
    ContentTreeStore, EditPayload, SaveHook, Snapshot, StoreError, StoreOptions, Subscription,
};
pub use domain::{ContentNodeValue, ContentTree, NodeDto, TreeError};
