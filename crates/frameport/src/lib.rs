//! Cross-context RPC channels.
//!
//! frameport lets code in one browsing context call methods on objects that
//! live in another, over a transport that only carries serialized messages.
//! Functions and cyclic object graphs cross the boundary as proxies and
//! back-references.
//!
//! # Crate Structure
//!
//! - [`core`]: dynamic values, promises and the cooperative event loop
//! - [`transport`]: message sink/source abstraction and in-memory contexts
//! - [`wire`]: envelopes, text codec and graph serialization
//! - [`registry`]: instance-id to object registry
//! - [`channel`]: channels, channel manager, handshake and host connection

/// Re-export value, promise and event-loop types.
pub mod core {
    pub use frameport_core::*;
}

/// Re-export transport types.
pub mod transport {
    pub use frameport_transport::*;
}

/// Re-export wire types.
pub mod wire {
    pub use frameport_wire::*;
}

/// Re-export registry types.
pub mod registry {
    pub use frameport_registry::*;
}

/// Re-export channel types.
pub mod channel {
    pub use frameport_channel::*;
}

pub use frameport_channel::{
    Channel, ChannelConfig, ChannelManager, HostConnection, RpcContext, HOST_CONTROL_INSTANCE_ID,
};
pub use frameport_core::{Completion, Deferred, EventLoop, Promise, Value};
pub use frameport_registry::{ObjectRegistry, Registered};
pub use frameport_transport::BrowsingContext;
