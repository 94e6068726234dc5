/// Errors that can occur while encoding or decoding wire messages.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The payload is not valid JSON or does not fit the envelope shape.
    #[error("invalid message json: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload parsed but is not a JSON object.
    #[error("message is not a JSON object (got {0})")]
    NotAnObject(&'static str),

    /// The envelope schema could not be compiled.
    #[cfg(feature = "schema")]
    #[error("failed to compile envelope schema: {0}")]
    SchemaCompile(String),

    /// The envelope failed schema validation.
    #[cfg(feature = "schema")]
    #[error("envelope validation failed: {0}")]
    InvalidEnvelope(String),
}

pub type Result<T> = std::result::Result<T, WireError>;
