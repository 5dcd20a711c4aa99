// Credential provider.
//
// Managed-infrastructure mode needs a bearer token for the upstream
// handshake; API-key mode never invokes the provider. The default
// implementation asks the instance metadata server for the service
// account's access token, the same lookup application-default
// credentials perform.

use async_trait::async_trait;
use serde::Deserialize;

/// Default token endpoint on the instance metadata server.
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// A credential for the upstream handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// Attach `Authorization: Bearer <token>`.
    Bearer(String),
    /// No auth header required (API-key mode).
    NoAuth,
}

impl Credential {
    /// The `Authorization` header value, if one is needed.
    pub fn authorization_header(&self) -> Option<String> {
        match self {
            Credential::Bearer(token) => Some(format!("Bearer {token}")),
            Credential::NoAuth => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("token response malformed: {0}")]
    Malformed(String),
}

/// Supplies a credential for one upstream connection.
///
/// Invoked once per pair, before the upstream dial; a fetch failure
/// fails that pair only.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn fetch(&self) -> Result<Credential, CredentialError>;
}

// ---------------------------------------------------------------------------
// Metadata server provider
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Fetches the default service account token from the metadata server.
pub struct MetadataProvider {
    client: reqwest::Client,
    token_url: String,
}

impl MetadataProvider {
    pub fn new() -> Self {
        Self::with_token_url(METADATA_TOKEN_URL)
    }

    /// Point the provider at an alternative token endpoint. Used by
    /// tests and by environments with a metadata proxy.
    pub fn with_token_url(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token_url: url.into(),
        }
    }
}

impl Default for MetadataProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialProvider for MetadataProvider {
    async fn fetch(&self) -> Result<Credential, CredentialError> {
        let response = self
            .client
            .get(&self.token_url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await?
            .error_for_status()?;

        let token: TokenResponse = response.json().await?;
        if token.access_token.is_empty() {
            return Err(CredentialError::Malformed(
                "empty access_token in metadata response".to_string(),
            ));
        }
        Ok(Credential::Bearer(token.access_token))
    }
}

// ---------------------------------------------------------------------------
// Static provider
// ---------------------------------------------------------------------------

/// Always returns the same credential. For tests and local development
/// with a pre-issued token.
pub struct StaticProvider {
    credential: Credential,
}

impl StaticProvider {
    pub fn new(credential: Credential) -> Self {
        Self { credential }
    }
}

#[async_trait]
impl CredentialProvider for StaticProvider {
    async fn fetch(&self) -> Result<Credential, CredentialError> {
        Ok(self.credential.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn bearer_credential_formats_header() {
        let credential = Credential::Bearer("tok123".to_string());
        assert_eq!(
            credential.authorization_header().as_deref(),
            Some("Bearer tok123")
        );
    }

    #[test]
    fn no_auth_credential_has_no_header() {
        assert!(Credential::NoAuth.authorization_header().is_none());
    }

    #[tokio::test]
    async fn static_provider_returns_its_credential() {
        let provider = StaticProvider::new(Credential::Bearer("t".to_string()));
        assert_eq!(
            provider.fetch().await.unwrap(),
            Credential::Bearer("t".to_string())
        );
    }

    #[tokio::test]
    async fn metadata_provider_parses_token_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/token"))
            .and(header("Metadata-Flavor", "Google"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.abc",
                "expires_in": 3599,
                "token_type": "Bearer",
            })))
            .mount(&server)
            .await;

        let provider = MetadataProvider::with_token_url(format!("{}/token", server.uri()));
        let credential = provider.fetch().await.unwrap();
        assert_eq!(credential, Credential::Bearer("ya29.abc".to_string()));
    }

    #[tokio::test]
    async fn metadata_provider_propagates_http_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let provider = MetadataProvider::with_token_url(format!("{}/token", server.uri()));
        let err = provider.fetch().await.unwrap_err();
        assert!(matches!(err, CredentialError::Http(_)));
    }

    #[tokio::test]
    async fn metadata_provider_rejects_empty_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "",
            })))
            .mount(&server)
            .await;

        let provider = MetadataProvider::with_token_url(format!("{}/token", server.uri()));
        let err = provider.fetch().await.unwrap_err();
        assert!(matches!(err, CredentialError::Malformed(_)));
    }
}
