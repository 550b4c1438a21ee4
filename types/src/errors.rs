use thiserror::Error;

#[derive(Debug, Error)]
pub enum DhtError {
    #[error("no live node known for identifier {0}")]
    NodeNotFound(String),

    #[error("no record found for key {0}")]
    NoDataForKey(String),

    #[error("point has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("kd-tree cannot be built at depth {0}")]
    ImpossibleDepth(usize),

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("transport failure: {0}")]
    Transport(#[from] std::io::Error),

    #[error("serialization failure: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("identifier `{value}` does not have the configured width {expected}")]
    IdentifierWidthMismatch { value: String, expected: usize },

    #[error("identifier `{0}` is already in use")]
    DuplicateIdentifier(String),
}
