//! Cross-context message transport abstraction.
//!
//! Provides a unified interface over the host's cross-context messaging
//! primitive: a [`MessageSink`] posts one payload to a remote context and a
//! [`MessageSource`] delivers [`MessageEvent`]s to local listeners.
//!
//! This is the lowest layer of frameport that moves data. The [`memory`]
//! module supplies in-process browsing contexts that deliver through the
//! shared [`frameport_core::EventLoop`].

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{Result, TransportError};
pub use memory::{BrowsingContext, WindowProxy};
pub use traits::{
    ContextId, MessageEvent, MessageListener, MessagePayload, MessageSink, MessageSource,
    SANDBOXED_ORIGIN,
};
