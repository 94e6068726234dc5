//! RPC envelopes, text codec and cycle-safe graph serialization.
//!
//! Every message is a single JSON text payload carrying:
//! - a correlation `id`, increasing per channel
//! - `instanceId` (and `methodName`) for requests, `result`/`error` for responses
//! - the `protocolVersion` tag and, while a channel is unbound, its `handshakeToken`
//!
//! Arguments and results travel through [`serialize`], which copies a value
//! graph into plain JSON while replacing cycles, functions and dates with
//! markers that [`deserialize`] turns back into live values.

pub mod codec;
pub mod error;
pub mod message;
#[cfg(feature = "schema")]
pub mod schema;
pub mod serialize;

pub use codec::{decode_message, decode_value, encode_message};
pub use error::{Result, WireError};
pub use message::{
    InboundMessage, RpcRequest, RpcResponse, SerializationSettings, PROTOCOL_VERSION,
    PROXY_FUNCTIONS_INSTANCE_ID,
};
#[cfg(feature = "schema")]
pub use schema::EnvelopeValidator;
pub use serialize::{
    deserialize, deserialize_item, serialize, serialize_item, FunctionMarshaler, CHANNEL_ID,
    CIRCULAR_REFERENCE, CIRCULAR_REFERENCE_ID, MAX_DEPTH, PROXY_DATE, PROXY_FUNCTION_ID,
};
