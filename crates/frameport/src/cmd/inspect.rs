use std::collections::BTreeMap;
use std::fs;

use frameport_wire::{
    decode_value, EnvelopeValidator, InboundMessage, CIRCULAR_REFERENCE, CIRCULAR_REFERENCE_ID,
    PROXY_DATE, PROXY_FUNCTION_ID, PROXY_FUNCTIONS_INSTANCE_ID,
};
use serde::Serialize;

use crate::cmd::InspectArgs;
use crate::exit::{io_error, wire_error, CliResult, SUCCESS};
use crate::output::{print_json, print_table, OutputFormat};

const MARKERS: [&str; 4] = [
    PROXY_FUNCTION_ID,
    PROXY_DATE,
    CIRCULAR_REFERENCE,
    CIRCULAR_REFERENCE_ID,
];

#[derive(Serialize)]
struct InspectOutput {
    schema_id: &'static str,
    kind: &'static str,
    id: u64,
    method: Option<String>,
    instance: Option<String>,
    proxy_callback: bool,
    has_handshake_token: bool,
    protocol_version: String,
    markers: BTreeMap<&'static str, usize>,
}

pub fn run(args: InspectArgs, format: OutputFormat) -> CliResult<i32> {
    let text = match (&args.data, &args.file) {
        (Some(data), _) => data.clone(),
        (None, Some(path)) => fs::read_to_string(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?,
        (None, None) => String::new(),
    };

    let out = inspect(&text)?;
    print_output(&out, format);
    Ok(SUCCESS)
}

fn inspect(text: &str) -> CliResult<InspectOutput> {
    let validator = EnvelopeValidator::new().map_err(|err| wire_error("schema", err))?;
    let payload = validator
        .validate_text(text)
        .map_err(|err| wire_error("invalid payload", err))?;

    let mut markers = BTreeMap::new();
    count_markers(&payload, &mut markers);

    let message = decode_value(payload).map_err(|err| wire_error("invalid payload", err))?;
    let has_handshake_token = message.handshake_token().is_some();
    let out = match message {
        InboundMessage::Request(request) => InspectOutput {
            schema_id: "https://schemas.3leaps.dev/frameport/cli/v1/inspect.schema.json",
            kind: "request",
            id: request.id,
            proxy_callback: request.instance_id == PROXY_FUNCTIONS_INSTANCE_ID,
            method: request.method_name,
            instance: Some(request.instance_id),
            has_handshake_token,
            protocol_version: request.protocol_version,
            markers,
        },
        InboundMessage::Response(response) => InspectOutput {
            schema_id: "https://schemas.3leaps.dev/frameport/cli/v1/inspect.schema.json",
            kind: if response.is_error() { "error" } else { "result" },
            id: response.id,
            method: None,
            instance: None,
            proxy_callback: false,
            has_handshake_token,
            protocol_version: response.protocol_version,
            markers,
        },
    };
    Ok(out)
}

fn count_markers(value: &serde_json::Value, counts: &mut BTreeMap<&'static str, usize>) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, item) in map {
                if let Some(marker) = MARKERS.iter().find(|m| **m == key.as_str()) {
                    *counts.entry(*marker).or_insert(0) += 1;
                }
                count_markers(item, counts);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                count_markers(item, counts);
            }
        }
        _ => {}
    }
}

fn print_output(out: &InspectOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let markers = render_markers(&out.markers);
            print_table(
                &["KIND", "ID", "METHOD", "INSTANCE", "TOKEN", "MARKERS"],
                vec![vec![
                    out.kind.to_string(),
                    out.id.to_string(),
                    out.method.clone().unwrap_or_else(|| "-".to_string()),
                    out.instance.clone().unwrap_or_else(|| "-".to_string()),
                    out.has_handshake_token.to_string(),
                    markers,
                ]],
            );
        }
        OutputFormat::Pretty => {
            println!("Message:");
            println!("  Kind:      {}", out.kind);
            println!("  Id:        {}", out.id);
            if let Some(instance) = &out.instance {
                println!("  Instance:  {instance}");
                println!(
                    "  Method:    {}",
                    out.method.as_deref().unwrap_or("<instance itself>")
                );
            }
            if out.proxy_callback {
                println!("  Callback:  invokes a proxied function");
            }
            println!("  Protocol:  {}", out.protocol_version);
            println!("  Token:     {}", if out.has_handshake_token { "present" } else { "absent" });
            println!("  Markers:   {}", render_markers(&out.markers));
        }
    }
}

fn render_markers(markers: &BTreeMap<&'static str, usize>) -> String {
    if markers.is_empty() {
        return "none".to_string();
    }
    markers
        .iter()
        .map(|(name, count)| format!("{name}={count}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit::DATA_INVALID;

    #[test]
    fn describes_requests_with_markers() {
        let out = inspect(
            r#"{"id":3,"methodName":"subscribe","instanceId":"events","protocolVersion":"2.0",
                "handshakeToken":"abc",
                "params":[{"onTick":{"__proxyFunctionId":1,"__channelId":2},"self":{"__circularReference":1},"__circularReferenceId":1}]}"#,
        )
        .unwrap();

        assert_eq!(out.kind, "request");
        assert_eq!(out.id, 3);
        assert_eq!(out.method.as_deref(), Some("subscribe"));
        assert!(out.has_handshake_token);
        assert_eq!(out.markers.get(PROXY_FUNCTION_ID), Some(&1));
        assert_eq!(out.markers.get(CIRCULAR_REFERENCE), Some(&1));
        assert_eq!(out.markers.get(CIRCULAR_REFERENCE_ID), Some(&1));
        assert!(out.markers.get(PROXY_DATE).is_none());
    }

    #[test]
    fn describes_error_responses() {
        let out = inspect(r#"{"id":9,"error":{"message":"nope"},"protocolVersion":"2.0"}"#).unwrap();
        assert_eq!(out.kind, "error");
        assert!(out.instance.is_none());
    }

    #[test]
    fn rejects_garbage_as_data_invalid() {
        let err = inspect("not json").err().expect("garbage should fail");
        assert_eq!(err.code, DATA_INVALID);

        let err = inspect("[1,2]").err().expect("arrays should fail");
        assert_eq!(err.code, DATA_INVALID);
    }
}
