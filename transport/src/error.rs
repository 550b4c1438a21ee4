use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport io failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization failure: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("message did not start with the expected magic bytes")]
    BadMagic,

    #[error("incompatible wire version: expected major {expected}, found {found}")]
    IncompatibleVersion { expected: u8, found: u8 },

    #[error("message of {actual} bytes exceeds the configured maximum of {max} bytes")]
    MessageTooLarge { max: usize, actual: usize },
}
