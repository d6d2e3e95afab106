//! Crate-wide error type.
//!
//! Structural errors from reloading rows are reported as soon as they are found; nothing is ever
//! partially built.

use crate::database::SampleKey;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("sample key not found in database: {0}")]
    KeyNotFound(SampleKey),

    #[error("node not found at address: {0}")]
    NodeNotFound(usize),

    #[error("descriptor length {actual} does not match expected length {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("corrupt descriptor file: {0}")]
    CorruptDatabase(String),

    #[error("could not parse input: {0}")]
    Parse(String),

    #[error("rows contain no root node")]
    MissingRoot,

    #[error("rows contain more than one root node: {first} and {second}")]
    MultipleRoots { first: u64, second: u64 },

    #[error("node id {0} appears in more than one row")]
    DuplicateNode(u64),

    #[error("node {node} references parent {parent} which is not in the rows")]
    DanglingParent { node: u64, parent: u64 },

    #[error("malformed row for node {node}: {reason}")]
    MalformedRows { node: u64, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}
