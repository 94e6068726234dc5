//! Objects exposed to remote callers, keyed by instance id.
//!
//! An entry is either a concrete instance or a factory that builds one from
//! the caller's context data. Channels consult their own registry first and
//! then the process-wide one held by the RPC context.

pub mod registry;

pub use registry::{Factory, ObjectRegistry, Registered};
