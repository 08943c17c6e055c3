// chat-client/src/token_client.rs
use async_trait::async_trait;
use common::{ClientConfig, Credential, ErrorResponse, Identity, TokenResponse};
use reqwest::StatusCode;
use std::fmt;
use std::time::Duration;

use crate::error::TokenClientError;

/// A signed-in identity together with its identity-provider bearer token
#[derive(Clone)]
pub struct AuthSession {
    pub identity: Identity,
    bearer: String,
}

impl AuthSession {
    pub fn new(identity: Identity, bearer: impl Into<String>) -> Self {
        Self {
            identity,
            bearer: bearer.into(),
        }
    }

    pub fn bearer(&self) -> &str {
        &self.bearer
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("identity", &self.identity.id)
            .field("bearer", &"<redacted>")
            .finish()
    }
}

/// Anything that can hand out platform credentials for a signed-in identity
#[async_trait]
pub trait CredentialSource: Send + Sync + 'static {
    async fn issue(&self, auth: &AuthSession) -> Result<Credential, TokenClientError>;
}

/// HTTP client for the token service
#[derive(Debug, Clone)]
pub struct TokenClient {
    http: reqwest::Client,
    base_url: String,
}

impl TokenClient {
    pub fn new(config: &ClientConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        Ok(Self::with_client(http, &config.api_base_url))
    }

    pub fn with_client(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn token_url(&self) -> String {
        format!("{}/chat/token", self.base_url)
    }
}

#[async_trait]
impl CredentialSource for TokenClient {
    async fn issue(&self, auth: &AuthSession) -> Result<Credential, TokenClientError> {
        let response = self
            .http
            .get(self.token_url())
            .bearer_auth(auth.bearer())
            .send()
            .await
            .map_err(|e| TokenClientError::UpstreamUnavailable(e.to_string()))?;

        let status = response.status();
        match status {
            StatusCode::UNAUTHORIZED => Err(TokenClientError::Unauthenticated),
            s if s.is_success() => {
                let body: TokenResponse = response
                    .json()
                    .await
                    .map_err(|e| TokenClientError::UpstreamUnavailable(format!("malformed token response: {}", e)))?;
                if body.token.is_empty() {
                    return Err(TokenClientError::UpstreamUnavailable("empty token".to_string()));
                }
                tracing::debug!("Fetched platform credential for {}", auth.identity.id);
                Ok(body.token)
            },
            s => {
                let message = response
                    .json::<ErrorResponse>()
                    .await
                    .map(|body| body.message)
                    .unwrap_or_else(|_| s.to_string());
                tracing::warn!("Token service answered {} for {}: {}", s, auth.identity.id, message);
                Err(TokenClientError::UpstreamUnavailable(message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn auth() -> AuthSession {
        AuthSession::new(Identity::new("user_1"), "identity_jwt")
    }

    fn client_for(server: &MockServer) -> TokenClient {
        TokenClient::new(&ClientConfig {
            api_base_url: format!("{}/api/", server.uri()),
            request_timeout_ms: 2_000,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetches_token_with_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/chat/token"))
            .and(header("authorization", "Bearer identity_jwt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "tok_abc" })))
            .expect(1)
            .mount(&server)
            .await;

        let credential = client_for(&server).issue(&auth()).await.unwrap();
        assert_eq!(credential.expose(), "tok_abc");
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_unauthenticated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/chat/token"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "Unauthenticated" })))
            .mount(&server)
            .await;

        let result = client_for(&server).issue(&auth()).await;
        assert_eq!(result.unwrap_err(), TokenClientError::Unauthenticated);
    }

    #[tokio::test]
    async fn test_server_error_carries_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/chat/token"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "message": "Failed to generate token" })))
            .mount(&server)
            .await;

        let result = client_for(&server).issue(&auth()).await;
        assert_eq!(
            result.unwrap_err(),
            TokenClientError::UpstreamUnavailable("Failed to generate token".to_string())
        );
    }

    #[tokio::test]
    async fn test_slow_service_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/chat/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "token": "tok_late" }))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client = TokenClient::new(&ClientConfig {
            api_base_url: format!("{}/api", server.uri()),
            request_timeout_ms: 50,
        })
        .unwrap();

        let result = client.issue(&auth()).await;
        assert!(matches!(result, Err(TokenClientError::UpstreamUnavailable(_))));
    }

    #[test]
    fn test_debug_hides_bearer() {
        let printed = format!("{:?}", auth());
        assert!(printed.contains("user_1"));
        assert!(!printed.contains("identity_jwt"));
    }
}
