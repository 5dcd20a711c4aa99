// Wire message classification.
//
// Inbound payloads are decoded once into a tagged union; everything
// downstream matches on the variant instead of re-probing JSON fields.
// Client and server messages have distinct vocabularies, so each
// direction gets its own classifier.

use serde::Deserialize;
use serde_json::Value;

/// A client→server payload, classified by its top-level shape.
#[derive(Debug)]
pub enum ClientPayload {
    /// One-time session handshake carrying the requested model and
    /// optional tool declarations.
    Setup(Value),
    /// Anything else; relayed opaquely.
    Other,
}

/// A server→client payload, classified by its top-level shape.
#[derive(Debug)]
pub enum ServerPayload {
    /// Acknowledgment that the session handshake was accepted.
    SetupComplete,
    /// Request to execute one or more local functions before
    /// generation continues.
    ToolCall(ToolCallEnvelope),
    /// Anything else; relayed opaquely.
    Other,
}

/// The `toolCall` control message requesting local function execution.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallEnvelope {
    #[serde(default)]
    pub function_calls: Vec<FunctionCall>,
}

/// One function invocation inside a tool call envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct FunctionCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

/// One `{id, name, result}` entry of a tool response envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionResponse {
    pub id: String,
    pub name: String,
    pub result: Value,
}

/// Classify a raw client→server text payload.
pub fn classify_client(raw: &str) -> Result<ClientPayload, serde_json::Error> {
    let value: Value = serde_json::from_str(raw)?;
    if value.get("setup").is_some() {
        return Ok(ClientPayload::Setup(value));
    }
    Ok(ClientPayload::Other)
}

/// Classify a raw server→client text payload.
pub fn classify_server(raw: &str) -> Result<ServerPayload, serde_json::Error> {
    let value: Value = serde_json::from_str(raw)?;
    if value.get("setupComplete").is_some() {
        return Ok(ServerPayload::SetupComplete);
    }
    if let Some(tool_call) = value.get("toolCall") {
        let envelope: ToolCallEnvelope = serde_json::from_value(tool_call.clone())?;
        return Ok(ServerPayload::ToolCall(envelope));
    }
    Ok(ServerPayload::Other)
}

/// Serialize response entries into the `tool_response` envelope sent to
/// both legs. The nested `response.result.object_value` shape is what the
/// backend expects back for each call.
pub fn tool_response_message(responses: &[FunctionResponse]) -> String {
    let entries: Vec<Value> = responses
        .iter()
        .map(|r| {
            serde_json::json!({
                "id": r.id,
                "name": r.name,
                "response": { "result": { "object_value": r.result } },
            })
        })
        .collect();
    serde_json::json!({ "tool_response": { "function_responses": entries } }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ---------------------------------------------------------------
    // Client classification
    // ---------------------------------------------------------------

    #[test]
    fn client_setup_classified() {
        let payload = classify_client(r#"{"setup":{"model":"models/gemini"}}"#).unwrap();
        match payload {
            ClientPayload::Setup(value) => {
                assert_eq!(value["setup"]["model"], "models/gemini");
            }
            other => panic!("expected Setup, got {other:?}"),
        }
    }

    #[test]
    fn client_non_setup_classified_as_other() {
        let payload = classify_client(r#"{"clientContent":{"turns":[]}}"#).unwrap();
        assert!(matches!(payload, ClientPayload::Other));
    }

    #[test]
    fn client_malformed_is_an_error() {
        assert!(classify_client("this is not json {{{").is_err());
    }

    // ---------------------------------------------------------------
    // Server classification
    // ---------------------------------------------------------------

    #[test]
    fn server_setup_complete_classified() {
        let payload = classify_server(r#"{"setupComplete":true}"#).unwrap();
        assert!(matches!(payload, ServerPayload::SetupComplete));
    }

    #[test]
    fn server_setup_complete_with_object_body_classified() {
        // The backend sends `"setupComplete": {}` in some versions;
        // presence of the field is what matters, not its value.
        let payload = classify_server(r#"{"setupComplete":{}}"#).unwrap();
        assert!(matches!(payload, ServerPayload::SetupComplete));
    }

    #[test]
    fn server_tool_call_classified_with_calls_in_order() {
        let raw = r#"{"toolCall":{"functionCalls":[
            {"id":"1","name":"get_weather","args":{"city":"X"}},
            {"id":"2","name":"get_time","args":{}}
        ]}}"#;
        let payload = classify_server(raw).unwrap();
        match payload {
            ServerPayload::ToolCall(envelope) => {
                assert_eq!(envelope.function_calls.len(), 2);
                assert_eq!(envelope.function_calls[0].id, "1");
                assert_eq!(envelope.function_calls[0].name, "get_weather");
                assert_eq!(envelope.function_calls[0].args["city"], "X");
                assert_eq!(envelope.function_calls[1].id, "2");
            }
            other => panic!("expected ToolCall, got {other:?}"),
        }
    }

    #[test]
    fn server_tool_call_without_calls_field_is_empty() {
        let payload = classify_server(r#"{"toolCall":{}}"#).unwrap();
        match payload {
            ServerPayload::ToolCall(envelope) => assert!(envelope.function_calls.is_empty()),
            other => panic!("expected ToolCall, got {other:?}"),
        }
    }

    #[test]
    fn server_content_classified_as_other() {
        let payload = classify_server(r#"{"serverContent":{"modelTurn":{}}}"#).unwrap();
        assert!(matches!(payload, ServerPayload::Other));
    }

    #[test]
    fn server_malformed_is_an_error() {
        assert!(classify_server("not json").is_err());
    }

    #[test]
    fn function_call_without_args_defaults_to_null() {
        let raw = r#"{"toolCall":{"functionCalls":[{"id":"1","name":"noop"}]}}"#;
        let payload = classify_server(raw).unwrap();
        match payload {
            ServerPayload::ToolCall(envelope) => {
                assert!(envelope.function_calls[0].args.is_null());
            }
            other => panic!("expected ToolCall, got {other:?}"),
        }
    }

    // ---------------------------------------------------------------
    // Response envelope serialization
    // ---------------------------------------------------------------

    #[test]
    fn tool_response_envelope_shape() {
        let responses = vec![FunctionResponse {
            id: "1".to_string(),
            name: "get_weather".to_string(),
            result: json!({"temperature": 212}),
        }];
        let raw = tool_response_message(&responses);
        let value: Value = serde_json::from_str(&raw).unwrap();

        let entries = value["tool_response"]["function_responses"]
            .as_array()
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["id"], "1");
        assert_eq!(entries[0]["name"], "get_weather");
        assert_eq!(entries[0]["response"]["result"]["object_value"]["temperature"], 212);
    }

    #[test]
    fn tool_response_preserves_entry_order() {
        let responses = vec![
            FunctionResponse {
                id: "a".to_string(),
                name: "first".to_string(),
                result: json!(1),
            },
            FunctionResponse {
                id: "b".to_string(),
                name: "second".to_string(),
                result: json!(2),
            },
        ];
        let value: Value = serde_json::from_str(&tool_response_message(&responses)).unwrap();
        let entries = value["tool_response"]["function_responses"]
            .as_array()
            .unwrap();
        assert_eq!(entries[0]["id"], "a");
        assert_eq!(entries[1]["id"], "b");
    }

    #[test]
    fn tool_response_with_no_entries_is_an_empty_envelope() {
        let value: Value = serde_json::from_str(&tool_response_message(&[])).unwrap();
        assert!(value["tool_response"]["function_responses"]
            .as_array()
            .unwrap()
            .is_empty());
    }
}
