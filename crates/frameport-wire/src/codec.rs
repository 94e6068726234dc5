use serde::Serialize;

use crate::error::{Result, WireError};
use crate::message::{InboundMessage, RpcRequest, RpcResponse};

/// Encode an envelope into its single text payload.
pub fn encode_message<T: Serialize>(message: &T) -> Result<String> {
    Ok(serde_json::to_string(message)?)
}

/// Decode one text payload.
///
/// A payload is a request iff `instanceId` is a non-empty string; anything
/// else that parses as an object is treated as a response.
pub fn decode_message(text: &str) -> Result<InboundMessage> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    decode_value(value)
}

/// Decode an already parsed payload.
pub fn decode_value(value: serde_json::Value) -> Result<InboundMessage> {
    let kind = match &value {
        serde_json::Value::Object(_) => None,
        serde_json::Value::Null => Some("null"),
        serde_json::Value::Bool(_) => Some("boolean"),
        serde_json::Value::Number(_) => Some("number"),
        serde_json::Value::String(_) => Some("string"),
        serde_json::Value::Array(_) => Some("array"),
    };
    if let Some(kind) = kind {
        return Err(WireError::NotAnObject(kind));
    }

    let is_request = value
        .get("instanceId")
        .and_then(serde_json::Value::as_str)
        .is_some_and(|id| !id.is_empty());

    if is_request {
        let request: RpcRequest = serde_json::from_value(value)?;
        Ok(InboundMessage::Request(request))
    } else {
        let response: RpcResponse = serde_json::from_value(value)?;
        Ok(InboundMessage::Response(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{SerializationSettings, PROTOCOL_VERSION};

    #[test]
    fn request_roundtrip_keeps_every_field() {
        let request = RpcRequest {
            id: 9,
            method_name: Some("getItem".to_string()),
            instance_id: "store".to_string(),
            instance_context: Some(serde_json::json!({"scope": "user"})),
            params: Some(serde_json::json!(["key"])),
            protocol_version: PROTOCOL_VERSION.to_string(),
            handshake_token: Some("abc".to_string()),
            serialization_settings: Some(SerializationSettings::with_underscore_properties()),
        };

        let text = encode_message(&request).unwrap();
        match decode_message(&text).unwrap() {
            InboundMessage::Request(decoded) => assert_eq!(decoded, request),
            other => panic!("expected request, got {other:?}"),
        }
    }

    #[test]
    fn missing_or_empty_instance_id_means_response() {
        let decoded = decode_message(r#"{"id":4,"result":[1,2],"protocolVersion":"2.0"}"#).unwrap();
        match decoded {
            InboundMessage::Response(response) => {
                assert_eq!(response.id, 4);
                assert_eq!(response.result, Some(serde_json::json!([1, 2])));
            }
            other => panic!("expected response, got {other:?}"),
        }

        let decoded = decode_message(r#"{"id":5,"instanceId":"","error":"x"}"#).unwrap();
        assert!(!decoded.is_request());
    }

    #[test]
    fn rejects_non_object_payloads() {
        assert!(matches!(
            decode_message("[1,2,3]"),
            Err(WireError::NotAnObject("array"))
        ));
        assert!(matches!(
            decode_message("\"initialHandShack\""),
            Err(WireError::NotAnObject("string"))
        ));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(decode_message("{not-json"), Err(WireError::Json(_))));
    }

    #[test]
    fn rejects_non_numeric_ids() {
        assert!(matches!(
            decode_message(r#"{"id":"7","instanceId":"x"}"#),
            Err(WireError::Json(_))
        ));
    }

    #[test]
    fn missing_method_name_decodes_as_none() {
        let decoded = decode_message(r#"{"id":1,"instanceId":"obj"}"#).unwrap();
        match decoded {
            InboundMessage::Request(request) => {
                assert!(request.method_name.is_none());
                assert!(request.params.is_none());
                assert_eq!(request.protocol_version, "");
            }
            other => panic!("expected request, got {other:?}"),
        }
    }
}
