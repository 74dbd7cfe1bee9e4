//! Infrastructure layer: I/O implementations
//!
//! This layer implements the persistence boundary for file-backed trees.

pub mod error;
pub mod file_sink;

pub use error::{InfraError, InfraResult};
pub use file_sink::{read_dump, FileDumpSink};
