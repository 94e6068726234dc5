//! Structural validation of inbound envelopes against the bundled schema.

use jsonschema::Validator;

use crate::error::{Result, WireError};

const ENVELOPE_SCHEMA: &str = include_str!("../schemas/envelope.schema.json");

/// Compiled envelope schema.
pub struct EnvelopeValidator {
    validator: Validator,
}

impl EnvelopeValidator {
    /// Compile the bundled envelope schema.
    pub fn new() -> Result<Self> {
        let schema: serde_json::Value = serde_json::from_str(ENVELOPE_SCHEMA)?;
        let validator = jsonschema::validator_for(&schema)
            .map_err(|err| WireError::SchemaCompile(err.to_string()))?;
        Ok(Self { validator })
    }

    /// Validate one parsed payload. The message lists up to four violations.
    pub fn validate(&self, payload: &serde_json::Value) -> Result<()> {
        let mut errors = self.validator.iter_errors(payload);
        if let Some(first) = errors.next() {
            let mut message = first.to_string();
            for err in errors.take(3) {
                message.push_str("; ");
                message.push_str(&err.to_string());
            }
            return Err(WireError::InvalidEnvelope(message));
        }
        Ok(())
    }

    /// Parse and validate one text payload.
    pub fn validate_text(&self, text: &str) -> Result<serde_json::Value> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        self.validate(&value)?;
        Ok(value)
    }
}

impl std::fmt::Debug for EnvelopeValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeValidator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_envelopes() {
        let validator = EnvelopeValidator::new().unwrap();
        validator
            .validate(&serde_json::json!({
                "id": 1,
                "methodName": "add",
                "instanceId": "calc",
                "params": [1, 2],
                "protocolVersion": "2.0"
            }))
            .unwrap();
        validator
            .validate(&serde_json::json!({"id": 1, "result": 3, "protocolVersion": "2.0"}))
            .unwrap();
    }

    #[test]
    fn rejects_missing_id() {
        let validator = EnvelopeValidator::new().unwrap();
        let err = validator
            .validate(&serde_json::json!({"result": 3}))
            .unwrap_err();
        assert!(matches!(err, WireError::InvalidEnvelope(_)));
    }

    #[test]
    fn rejects_request_carrying_a_result() {
        let validator = EnvelopeValidator::new().unwrap();
        let err = validator
            .validate_text(r#"{"id":2,"instanceId":"calc","methodName":"add","result":1}"#)
            .unwrap_err();
        assert!(matches!(err, WireError::InvalidEnvelope(_)));
    }

    #[test]
    fn rejects_wrong_types() {
        let validator = EnvelopeValidator::new().unwrap();
        assert!(validator
            .validate(&serde_json::json!({"id": "7", "instanceId": "x", "methodName": "m"}))
            .is_err());
        assert!(validator
            .validate(&serde_json::json!({"id": 7, "instanceId": "x", "methodName": "m", "params": 5}))
            .is_err());
    }
}
