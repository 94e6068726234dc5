use std::fmt;
use std::rc::Rc;

use crate::error::Result;

/// Origin reported for messages sent by fully sandboxed frames.
pub const SANDBOXED_ORIGIN: &str = "null";

/// Identity of a browsing context (window or frame).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// Payload carried by one cross-context message.
#[derive(Debug, Clone, PartialEq)]
pub enum MessagePayload {
    /// A serialized text payload. RPC traffic always uses this form.
    Text(String),
    /// A structured-clone payload posted by someone else.
    Structured(serde_json::Value),
}

impl MessagePayload {
    /// Text content, if this is a text payload.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessagePayload::Text(text) => Some(text),
            MessagePayload::Structured(_) => None,
        }
    }
}

impl From<String> for MessagePayload {
    fn from(text: String) -> Self {
        MessagePayload::Text(text)
    }
}

impl From<&str> for MessagePayload {
    fn from(text: &str) -> Self {
        MessagePayload::Text(text.to_string())
    }
}

/// One inbound message as seen by the receiving context.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    /// Context that posted the message.
    pub source: ContextId,
    /// Origin of the posting context (`"null"` for sandboxed frames).
    pub origin: String,
    /// The posted payload.
    pub data: MessagePayload,
}

/// Listener invoked once per inbound message.
pub type MessageListener = Rc<dyn Fn(&MessageEvent)>;

/// The posting side of a remote context.
///
/// Posting is fire-and-forget. A message to a context that has gone away
/// may be dropped without error; `Err` is reserved for failures the
/// transport can detect at post time.
pub trait MessageSink {
    /// Identity of the context messages are posted to.
    fn context_id(&self) -> ContextId;

    /// Post one payload to the remote context.
    fn post_message(&self, payload: MessagePayload) -> Result<()>;
}

/// The receiving side of the local context.
pub trait MessageSource {
    /// Subscribe `listener` to every message delivered to this context.
    fn add_message_listener(&self, listener: MessageListener);
}
