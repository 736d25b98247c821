//! Error types for the animation core

use thiserror::Error;

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    #[error("No model bound to the animator")]
    NoModelBound,

    #[error("Output buffer too small: need {required}, got {provided}")]
    BufferTooSmall { required: usize, provided: usize },

    #[error("Unknown clip: {0}")]
    UnknownClip(String),

    #[error("Unknown layer: {0}")]
    UnknownLayer(usize),

    #[error("No animator registered for this entity")]
    UnknownInstance,

    #[error("Invalid skeleton: {0}")]
    InvalidSkeleton(String),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
}
