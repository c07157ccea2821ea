//! Error types for the adapter core.
//!
//! Everything in this crate is synchronous and side-effect free, so errors
//! here are always caller-visible: nothing is caught or retried internally.

/// Failures while decoding the binary adapter container or packed weights.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("invalid container header: expected {expected:02x?}, found {found:02x?}")]
    InvalidHeader { expected: [u8; 8], found: Vec<u8> },

    #[error("truncated {section}: needed {needed} bytes, {available} available")]
    Truncated {
        section: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("{section} length {len} is not a multiple of 4")]
    MisalignedFloats { section: &'static str, len: usize },

    #[error("invalid metadata block: {0}")]
    InvalidMetadata(String),

    #[error("{0} trailing bytes after weights block")]
    TrailingBytes(usize),

    #[error("{section} of {len} bytes exceeds the u32 length prefix")]
    Oversized { section: &'static str, len: usize },
}

/// Adapter-core errors.
#[derive(Debug, thiserror::Error)]
pub enum LoraError {
    #[error("format error: {0}")]
    Format(#[from] FormatError),

    #[error("unknown composition strategy: `{0}`")]
    UnknownStrategy(String),

    #[error("composition requires at least one adapter")]
    EmptyComposition,

    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("invalid training data for error `{error_id}`: {reason}")]
    InvalidTrainingData { error_id: String, reason: String },

    #[error("wire message error: {0}")]
    Wire(#[from] prost::DecodeError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, LoraError>;
