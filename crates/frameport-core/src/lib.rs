//! Dynamic values, promises and the cooperative event loop.
//!
//! This is the lowest layer of frameport. Everything that crosses a context
//! boundary is a [`Value`]; everything that completes later is a [`Promise`];
//! every deferred callback runs as a task on an [`EventLoop`].

pub mod event_loop;
pub mod promise;
pub mod value;

pub use event_loop::EventLoop;
pub use promise::{Completion, Continuation, Deferred, Outcome, Promise, Settlement};
pub use value::{number_to_json, ArrayRef, Function, HostKind, ObjectRef, Value};
