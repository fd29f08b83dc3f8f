//! Error types for Cadence.

use thiserror::Error;

/// Primary error type for all Cadence operations.
#[derive(Error, Debug)]
pub enum CadenceError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed stream frame: {reason}")]
    MalformedFrame { reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Index {index} out of bounds for history of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("Image generation failed: {0}")]
    ImageGeneration(String),

    #[error("Follow-up request failed: {0}")]
    FollowUp(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of a [`CadenceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Frame malformed or connection dropped. Partial content is still kept.
    Transport,
    /// Input rejected by a store operation; the store is unchanged.
    Validation,
    /// Image generation or follow-up failure; delivery continues.
    Collaborator,
    Configuration,
}

impl CadenceError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedFrame {
            reason: reason.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Transport(_) | Self::MalformedFrame { .. } | Self::Serialization(_) => {
                ErrorCategory::Transport
            }
            Self::Validation(_) | Self::IndexOutOfBounds { .. } => ErrorCategory::Validation,
            Self::ImageGeneration(_) | Self::FollowUp(_) => ErrorCategory::Collaborator,
            Self::Configuration(_) | Self::Io(_) => ErrorCategory::Configuration,
        }
    }

    /// Whether the caller may reasonably retry the request that produced this
    /// error. Nothing inside this crate retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, CadenceError>;
