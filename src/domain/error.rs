//! Domain-level errors (no I/O concerns)

use thiserror::Error;

/// Structural errors raised by the keyed tree.
/// The tree is left unchanged whenever one of these is returned.
#[derive(Error, Debug)]
pub enum TreeError {
    #[error("node not found: {0}")]
    NotFound(String),

    #[error("cannot remove the root node")]
    RootRemoval,

    #[error("cannot move the root node")]
    RootMove,

    #[error("cannot move node {src} into its own subtree at {target}")]
    Cycle { src: String, target: String },

    #[error("tree would exceed the maximum depth of {max} levels")]
    TooDeep { max: usize },

    #[error("duplicate node key in dump: {0}")]
    DuplicateKey(String),

    #[error("invalid tree dump: {0}")]
    InvalidDump(#[source] serde_json::Error),

    #[error("tree serialization failed: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Result type for tree operations.
pub type TreeResult<T> = Result<T, TreeError>;
