// Startup configuration.
//
// Built once from CLI flags and environment variables, then passed by
// `Arc` into every connection pair. No component reads process-wide
// mutable state after startup; the endpoint and operating mode are
// fixed for the lifetime of the process.

use clap::Parser;
use std::fmt;

/// Default host for the direct API-key endpoint.
const API_KEY_HOST: &str = "generativelanguage.googleapis.com";

/// Default host for the managed-infrastructure endpoint.
const MANAGED_HOST: &str = "us-central1-aiplatform.googleapis.com";

#[derive(Parser, Debug)]
#[command(name = "wicket", about = "Bidirectional relay for streaming generative-AI sessions")]
pub struct Cli {
    /// Port the relay listens on
    #[arg(long, default_value_t = 8080, env = "WICKET_PORT")]
    pub port: u16,

    /// Host of the upstream service (defaults per mode)
    #[arg(long, env = "WICKET_TARGET_HOST")]
    pub target: Option<String>,

    /// Direct API key; selects API-key mode when set
    #[arg(long, env = "GEMINI_API_KEY")]
    pub api_key: Option<String>,

    /// Cloud project used to qualify model identifiers (managed mode)
    #[arg(long, env = "GOOGLE_CLOUD_PROJECT")]
    pub project: Option<String>,

    /// Cloud location used to qualify model identifiers (managed mode)
    #[arg(long, default_value = "us-central1", env = "GOOGLE_CLOUD_LOCATION")]
    pub location: String,
}

/// Operating mode, selected once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMode {
    /// Direct API-key endpoint; setup messages pass through untouched
    /// and the upstream connection carries no auth header.
    ApiKey,
    /// Managed infrastructure; requires a bearer credential and
    /// model-identifier qualification against project/location.
    Managed { project: String, location: String },
}

impl fmt::Display for RelayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayMode::ApiKey => write!(f, "api-key"),
            RelayMode::Managed { .. } => write!(f, "managed"),
        }
    }
}

/// Immutable process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: RelayMode,
    pub listen_port: u16,
    /// Host portion of the upstream endpoint; safe to log.
    pub target_host: String,
    /// Full upstream WebSocket URL. In API-key mode this embeds the key,
    /// so log `target_host` instead.
    pub upstream_url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("managed mode requires a project (set --project or GOOGLE_CLOUD_PROJECT)")]
    MissingProject,
}

impl Config {
    /// Resolve the operating mode and upstream endpoint from CLI input.
    ///
    /// An API key selects the direct endpoint; otherwise the relay runs
    /// against the managed backend and must know the cloud project.
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        match &cli.api_key {
            Some(key) => {
                let host = cli.target.clone().unwrap_or_else(|| API_KEY_HOST.to_string());
                let upstream_url = format!(
                    "wss://{host}/ws/google.ai.generativelanguage.v1alpha.GenerativeService.BidiGenerateContent?key={key}"
                );
                Ok(Self {
                    mode: RelayMode::ApiKey,
                    listen_port: cli.port,
                    target_host: host,
                    upstream_url,
                })
            }
            None => {
                let project = cli.project.clone().ok_or(ConfigError::MissingProject)?;
                let host = cli.target.clone().unwrap_or_else(|| MANAGED_HOST.to_string());
                let upstream_url = format!(
                    "wss://{host}/ws/google.cloud.aiplatform.v1beta1.LlmBidiService/BidiGenerateContent"
                );
                Ok(Self {
                    mode: RelayMode::Managed {
                        project,
                        location: cli.location.clone(),
                    },
                    listen_port: cli.port,
                    target_host: host,
                    upstream_url,
                })
            }
        }
    }

    /// Whether establishing an upstream connection requires fetching a
    /// bearer credential first.
    pub fn needs_credential(&self) -> bool {
        matches!(self.mode, RelayMode::Managed { .. })
    }
}
