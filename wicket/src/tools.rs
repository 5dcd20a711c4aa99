// Tool handler registry.
//
// The capability set is fixed at startup: handlers are registered by
// name and looked up by the interceptor when the server issues a tool
// call. Real handler implementations are deployment-specific; the
// canned weather handler below mirrors the reference deployment.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("handler failed: {0}")]
    Failed(String),
}

/// A locally executed function behind a tool call.
///
/// Handlers must be safe to retry at the caller's discretion; the relay
/// itself never retries. A failing handler costs that call its response
/// entry, nothing more.
pub trait ToolHandler: Send + Sync {
    fn call(&self, args: &Value) -> Result<Value, ToolError>;
}

/// Name → handler mapping, populated once at startup.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under the given function name. A later
    /// registration under the same name replaces the earlier one.
    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn ToolHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ToolHandler>> {
        self.handlers.get(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Canned weather lookup, registered as `get_weather` by default.
pub struct MockWeatherHandler;

impl ToolHandler for MockWeatherHandler {
    fn call(&self, args: &Value) -> Result<Value, ToolError> {
        let city = args.get("city").and_then(Value::as_str).unwrap_or("unknown");
        tracing::debug!(city, "serving canned weather report");
        Ok(serde_json::json!({
            "temperature": 212,
            "description": "cloudy with a chance of meatballs",
            "humidity": 105,
            "windSpeed": -5,
            "city": "Gemini-istan",
            "country": "GB",
        }))
    }
}
