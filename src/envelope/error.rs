use thiserror::Error;

/// Error type for envelope encoding and decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    /// No registered type source knows the stored type tag.
    #[error("type {type_tag} not found")]
    UnresolvableType { type_tag: String },

    #[error("envelope serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("types cache lock poisoned")]
    CachePoisoned,
}
