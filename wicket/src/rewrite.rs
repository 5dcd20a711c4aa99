// Setup rewriter.
//
// Pure transformation applied to the one-time `setup` handshake on the
// client→server path. The managed backend wants fully-qualified model
// resource paths and does not accept client-declared tools in this
// flow; the direct API-key endpoint takes the message as-is.

use crate::config::RelayMode;
use serde_json::Value;
use std::borrow::Cow;

#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    #[error("setup message is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Rewrite a raw setup message for the configured mode.
///
/// - API-key mode: identity; the input text is returned byte-identical.
/// - Managed mode: `setup.model` identifiers of the form `models/...`
///   are qualified to
///   `projects/{project}/locations/{location}/publishers/google/{model}`;
///   already-qualified identifiers are retained. Any `tools` declaration
///   is removed. All other fields pass through unchanged.
///
/// A payload that does not parse is an error; the caller drops the
/// message and keeps the pair alive.
pub fn rewrite_setup<'a>(raw: &'a str, mode: &RelayMode) -> Result<Cow<'a, str>, RewriteError> {
    let (project, location) = match mode {
        RelayMode::ApiKey => return Ok(Cow::Borrowed(raw)),
        RelayMode::Managed { project, location } => (project, location),
    };

    let mut value: Value = serde_json::from_str(raw)?;
    let Some(setup) = value.get_mut("setup").and_then(Value::as_object_mut) else {
        // Not a setup message; nothing to rewrite.
        return Ok(Cow::Borrowed(raw));
    };

    if let Some(requested) = setup.get("model").and_then(Value::as_str) {
        if requested.starts_with("models/") {
            let qualified = qualified_model(requested, project, location);
            tracing::debug!(requested = %requested, qualified = %qualified, "qualified model for managed backend");
            setup.insert("model".to_string(), Value::String(qualified));
        } else {
            tracing::debug!(requested, "model already qualified; retained");
        }
    }

    // The managed backend rejects client-declared tools in this flow.
    setup.remove("tools");
    if let Some(top) = value.as_object_mut() {
        top.remove("tools");
    }

    Ok(Cow::Owned(value.to_string()))
}

/// Fully qualify a `models/...` identifier against project and location.
pub fn qualified_model(model: &str, project: &str, location: &str) -> String {
    format!("projects/{project}/locations/{location}/publishers/google/{model}")
}
