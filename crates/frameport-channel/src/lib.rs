//! RPC channels between browsing contexts.
//!
//! A [`Channel`] is one connection to a remote context. It correlates
//! outbound calls with their responses, dispatches inbound requests to the
//! objects registered on it (or globally on the [`RpcContext`]) and keeps
//! the table of local functions the remote side may call back.
//!
//! A [`ChannelManager`] listens once on the local context and routes each
//! inbound message to the channels that own it, using the origin binding
//! and handshake-token protocol in [`handshake`].

pub mod channel;
pub mod config;
pub mod context;
pub mod error;
pub mod handshake;
pub mod host;
pub mod manager;

pub use channel::Channel;
pub use config::ChannelConfig;
pub use context::RpcContext;
pub use error::{ChannelError, Result};
pub use handshake::{new_handshake_token, OriginBinding, HANDSHAKE_TOKEN_LEN};
pub use host::{HostConnection, HOST_CONTROL_INSTANCE_ID, INITIAL_HANDSHAKE_METHOD};
pub use manager::{ChannelManager, Dispatch};
