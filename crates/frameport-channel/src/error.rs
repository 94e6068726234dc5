/// Errors that can occur while moving RPC messages.
///
/// Failures reported by the remote side are not errors here: they arrive
/// as rejected promises carrying the remote error value.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] frameport_transport::TransportError),

    /// Wire-level error.
    #[error("wire error: {0}")]
    Wire(#[from] frameport_wire::WireError),
}

pub type Result<T> = std::result::Result<T, ChannelError>;
