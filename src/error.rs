// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for candle-headscope.

use std::fmt;

/// Which side of a token pair an index refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexRole {
    /// The attending (query) token.
    Source,
    /// The attended-to (key) token.
    Destination,
}

impl fmt::Display for IndexRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => write!(f, "src_index"),
            Self::Destination => write!(f, "dst_index"),
        }
    }
}

/// Errors that can occur while scoring attention heads.
#[derive(Debug, thiserror::Error)]
pub enum HeadScopeError {
    /// Input text is blank or whitespace-only.
    #[error("input text is empty")]
    EmptyInput,

    /// Unrecognized scoring or view mode string.
    #[error("unknown score mode: {0}")]
    InvalidMode(String),

    /// A token index lies outside `[0, len)`.
    #[error("{role} {index} out of range: valid range is [0, {len})")]
    IndexOutOfRange {
        /// Which index was rejected.
        role: IndexRole,
        /// The rejected value.
        index: usize,
        /// Sequence length.
        len: usize,
    },

    /// A pair view was requested without one of its two indices.
    ///
    /// Clients that only know an index-range error class should treat this
    /// as a variant of [`IndexOutOfRange`](Self::IndexOutOfRange).
    #[error("src_index and dst_index are required for pair view (missing {0})")]
    MissingPairIndex(IndexRole),

    /// The forward pass returned no usable attention tensors.
    #[error("missing attention: {0}")]
    MissingAttention(String),

    /// A mask or tensor has a length that disagrees with the sequence.
    #[error("shape error: {0}")]
    Shape(String),

    /// Tensor operation failure (wraps candle).
    #[error("model error: {0}")]
    Model(#[from] candle_core::Error),

    /// Tokenizer error.
    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    /// Model registry parsing or lookup error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HeadScopeError {
    /// Whether this error means the upstream model broke its contract
    /// (no attention data at all), as opposed to a bad request.
    #[must_use]
    pub const fn is_missing_attention(&self) -> bool {
        matches!(self, Self::MissingAttention(_))
    }
}

/// Result type alias for candle-headscope operations.
pub type Result<T> = std::result::Result<T, HeadScopeError>;
