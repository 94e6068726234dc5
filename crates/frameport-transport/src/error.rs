use crate::traits::ContextId;

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The target context no longer exists.
    #[error("target context {0} has been detached")]
    Detached(ContextId),
}

pub type Result<T> = std::result::Result<T, TransportError>;
