// Tool call interceptor.
//
// Applied to every server→client text payload. Stateless across
// messages: each message is classified once and either forwarded,
// or expanded into a tool response envelope sent to both legs.

use crate::message::{self, FunctionResponse, ServerPayload, ToolCallEnvelope};
use crate::tools::ToolRegistry;
use std::sync::Arc;

/// What a server message turns into after interception.
#[derive(Debug, Default, PartialEq)]
pub struct Interception {
    pub to_client: Option<String>,
    pub to_upstream: Option<String>,
}

impl Interception {
    fn client_only(raw: impl Into<String>) -> Self {
        Self {
            to_client: Some(raw.into()),
            to_upstream: None,
        }
    }

    fn dropped() -> Self {
        Self::default()
    }
}

/// Dispatches server-issued tool calls to registered handlers.
pub struct ToolCallInterceptor {
    registry: Arc<ToolRegistry>,
}

impl ToolCallInterceptor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    /// Route one server→client text payload.
    ///
    /// - `setupComplete` acknowledgments forward to the client only.
    /// - `toolCall` envelopes with at least one call are dispatched; the
    ///   resulting `tool_response` goes to the client for visibility and,
    ///   when any call produced a result, upstream to resume generation.
    /// - Everything else forwards to the client unchanged.
    /// - A payload that does not parse is dropped and reported; the pair
    ///   stays alive.
    pub fn handle(&self, raw: &str) -> Interception {
        match message::classify_server(raw) {
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed server message");
                Interception::dropped()
            }
            Ok(ServerPayload::SetupComplete) => {
                tracing::debug!("setup complete");
                Interception::client_only(raw)
            }
            Ok(ServerPayload::ToolCall(envelope)) if !envelope.function_calls.is_empty() => {
                self.dispatch(&envelope)
            }
            Ok(_) => Interception::client_only(raw),
        }
    }

    /// Execute every call in envelope order, skipping calls with no
    /// registered handler and calls whose handler fails.
    fn dispatch(&self, envelope: &ToolCallEnvelope) -> Interception {
        let mut responses = Vec::with_capacity(envelope.function_calls.len());

        for call in &envelope.function_calls {
            let Some(handler) = self.registry.get(&call.name) else {
                tracing::warn!(id = %call.id, name = %call.name, "no handler registered; skipping call");
                continue;
            };
            match handler.call(&call.args) {
                Ok(result) => {
                    tracing::debug!(id = %call.id, name = %call.name, "tool call handled");
                    responses.push(FunctionResponse {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        result,
                    });
                }
                Err(e) => {
                    tracing::warn!(id = %call.id, name = %call.name, error = %e, "tool handler failed; skipping call");
                }
            }
        }

        let envelope_raw = message::tool_response_message(&responses);
        let to_upstream = (!responses.is_empty()).then(|| envelope_raw.clone());
        Interception {
            to_client: Some(envelope_raw),
            to_upstream,
        }
    }
}
