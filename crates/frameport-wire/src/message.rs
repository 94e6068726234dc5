use std::fmt;

use serde::{Deserialize, Serialize};

/// Protocol tag carried by every envelope.
pub const PROTOCOL_VERSION: &str = "2.0";

/// Reserved instance id under which a channel exposes its proxy functions.
pub const PROXY_FUNCTIONS_INSTANCE_ID: &str = "__proxyFunctions";

/// Per-call serialization options, carried on the request so the response
/// is serialized the same way.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializationSettings {
    /// Copy properties whose name starts with an underscore.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_underscore_properties: Option<bool>,
}

impl SerializationSettings {
    /// Settings that keep underscore-prefixed properties.
    pub fn with_underscore_properties() -> Self {
        Self {
            include_underscore_properties: Some(true),
        }
    }

    pub fn includes_underscore_properties(&self) -> bool {
        self.include_underscore_properties.unwrap_or(false)
    }
}

/// Request envelope: invoke `method_name` on the object registered as
/// `instance_id` on the receiving side.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcRequest {
    pub id: u64,
    /// `None` asks for the registered instance itself.
    pub method_name: Option<String>,
    pub instance_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_context: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    #[serde(default)]
    pub protocol_version: String,
    /// Present only while the sending channel has not learned its peer's origin.
    /// Redacted in debug output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handshake_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serialization_settings: Option<SerializationSettings>,
}

/// Response envelope: the outcome of the request with the same `id`.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcResponse {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
    #[serde(default)]
    pub protocol_version: String,
    /// Echo of the request's token. Redacted in debug output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handshake_token: Option<String>,
}

impl RpcResponse {
    /// Successful response to `request`.
    pub fn success(request: &RpcRequest, result: serde_json::Value) -> Self {
        Self {
            id: request.id,
            result: Some(result),
            error: None,
            protocol_version: PROTOCOL_VERSION.to_string(),
            handshake_token: request.handshake_token.clone(),
        }
    }

    /// Error response to `request`.
    pub fn failure(request: &RpcRequest, error: serde_json::Value) -> Self {
        Self {
            id: request.id,
            result: None,
            error: Some(error),
            protocol_version: PROTOCOL_VERSION.to_string(),
            handshake_token: request.handshake_token.clone(),
        }
    }

    /// True when the error field carries a truthy value.
    pub fn is_error(&self) -> bool {
        self.error.as_ref().is_some_and(json_is_truthy)
    }
}

/// A decoded inbound envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Request(RpcRequest),
    Response(RpcResponse),
}

impl InboundMessage {
    pub fn id(&self) -> u64 {
        match self {
            InboundMessage::Request(request) => request.id,
            InboundMessage::Response(response) => response.id,
        }
    }

    pub fn handshake_token(&self) -> Option<&str> {
        match self {
            InboundMessage::Request(request) => request.handshake_token.as_deref(),
            InboundMessage::Response(response) => response.handshake_token.as_deref(),
        }
    }

    pub fn instance_id(&self) -> Option<&str> {
        match self {
            InboundMessage::Request(request) => Some(&request.instance_id),
            InboundMessage::Response(_) => None,
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(self, InboundMessage::Request(_))
    }
}

fn json_is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        serde_json::Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn redacted(token: &Option<String>) -> Option<String> {
    token
        .as_ref()
        .map(|token| format!("<redacted:{} bytes>", token.len()))
}

impl fmt::Debug for RpcRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcRequest")
            .field("id", &self.id)
            .field("method_name", &self.method_name)
            .field("instance_id", &self.instance_id)
            .field("instance_context", &self.instance_context)
            .field("params", &self.params)
            .field("protocol_version", &self.protocol_version)
            .field("handshake_token", &redacted(&self.handshake_token))
            .field("serialization_settings", &self.serialization_settings)
            .finish()
    }
}

impl fmt::Debug for RpcResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcResponse")
            .field("id", &self.id)
            .field("result", &self.result)
            .field("error", &self.error)
            .field("protocol_version", &self.protocol_version)
            .field("handshake_token", &redacted(&self.handshake_token))
            .finish()
    }
}
