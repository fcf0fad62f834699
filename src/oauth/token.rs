use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::error::{AuthError, ProtocolViolation};
use crate::oauth::discovery::DiscoveryResolver;
use crate::session::ApiSession;

pub const GRANT_CLIENT_CREDENTIALS: &str = "client_credentials";
pub const GRANT_TOKEN_EXCHANGE: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
pub const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";
pub const ACCESS_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:access_token";

/// Token endpoint response shared by every grant.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl TokenResponse {
    /// Only the access token carries a contract: it must be non-empty.
    pub fn is_valid(&self) -> bool {
        !self.access_token.is_empty()
    }

    pub fn expires_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.expires_in
            .map(|secs| chrono::Utc::now() + chrono::Duration::seconds(secs))
    }
}

/// Issues grants against the token endpoint and records the resulting
/// credential on the shared [`ApiSession`].
#[derive(Clone)]
pub struct TokenClient {
    http: reqwest::Client,
    config: Arc<AuthConfig>,
    discovery: DiscoveryResolver,
    session: Arc<ApiSession>,
}

impl TokenClient {
    pub fn new(
        config: Arc<AuthConfig>,
        discovery: DiscoveryResolver,
        session: Arc<ApiSession>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            discovery,
            session,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<ApiSession> {
        &self.session
    }

    pub fn discovery(&self) -> &DiscoveryResolver {
        &self.discovery
    }

    /// Client-credentials grant against the configured token URL.
    pub async fn client_credentials(
        &self,
        client_id: &str,
        client_secret: &str,
        scope: &str,
    ) -> Result<TokenResponse, AuthError> {
        let url = self.config.token_url()?;
        let mut headers = HeaderMap::new();
        if !self.config.realm.is_empty() {
            let name = HeaderName::from_bytes(self.config.realm_header_name.as_bytes())
                .map_err(|e| {
                    AuthError::Configuration(format!(
                        "Invalid realm header name '{}': {e}",
                        self.config.realm_header_name
                    ))
                })?;
            let value = HeaderValue::from_str(&self.config.realm).map_err(|e| {
                AuthError::Configuration(format!("Invalid realm '{}': {e}", self.config.realm))
            })?;
            headers.insert(name, value);
        }

        self.post_form(
            &url,
            &[
                ("grant_type", GRANT_CLIENT_CREDENTIALS),
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("scope", scope),
            ],
            headers,
        )
        .await
    }

    /// Exchange a subject token, authenticated with the current session's
    /// access token.
    pub async fn exchange_token(
        &self,
        subject_token: &str,
        subject_token_type: &str,
    ) -> Result<TokenResponse, AuthError> {
        let current = self
            .session
            .access_token()
            .ok_or(ProtocolViolation::NoActiveSession)?;
        let url = self.config.token_url()?;

        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {current}"))
            .map_err(|e| AuthError::Request(format!("Invalid access token for header: {e}")))?;
        headers.insert(AUTHORIZATION, bearer);

        self.post_form(
            &url,
            &[
                ("grant_type", GRANT_TOKEN_EXCHANGE),
                ("subject_token", subject_token),
                ("subject_token_type", subject_token_type),
            ],
            headers,
        )
        .await
    }

    /// Renew an access token through token exchange. The request carries no
    /// Authorization header; the endpoint validates the subject token itself.
    pub async fn refresh_token(&self, access_token: &str) -> Result<TokenResponse, AuthError> {
        let url = self.config.token_url()?;
        self.post_form(
            &url,
            &[
                ("grant_type", GRANT_TOKEN_EXCHANGE),
                ("subject_token", access_token),
                ("subject_token_type", ACCESS_TOKEN_TYPE),
            ],
            HeaderMap::new(),
        )
        .await
    }

    /// Redeem an authorization code at the discovered token endpoint.
    pub async fn exchange_auth_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, AuthError> {
        let (Some(issuer), Some(client_id)) =
            (&self.config.oidc_issuer_url, &self.config.oidc_client_id)
        else {
            return Err(AuthError::incomplete_oidc_config());
        };

        let discovery = self.discovery.discover(issuer).await?;
        self.post_form(
            &discovery.token_endpoint,
            &[
                ("grant_type", GRANT_AUTHORIZATION_CODE),
                ("code", code),
                ("client_id", client_id),
                ("redirect_uri", redirect_uri),
                ("code_verifier", code_verifier),
            ],
            HeaderMap::new(),
        )
        .await
    }

    async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
        headers: HeaderMap,
    ) -> Result<TokenResponse, AuthError> {
        let grant = form
            .iter()
            .find(|(k, _)| *k == "grant_type")
            .map(|(_, v)| *v)
            .unwrap_or_default();
        tracing::debug!("POST {url} (grant_type={grant})");

        let resp = self
            .http
            .post(url)
            .headers(headers)
            .form(form)
            .send()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!("Token endpoint {url} rejected {grant} with status {status}");
            return Err(AuthError::Transport { status, body });
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| AuthError::Request(format!("Failed to parse token response: {e}")))?;

        if token.is_valid() {
            self.session.set_access_token(&token.access_token);
            tracing::info!("Obtained access token via {grant}");
        } else {
            tracing::warn!("Token endpoint returned no access token for {grant}");
        }
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySessionStore;

    fn client(config: AuthConfig) -> TokenClient {
        let store = Arc::new(MemorySessionStore::new());
        TokenClient::new(
            Arc::new(config),
            DiscoveryResolver::new(store).unwrap(),
            Arc::new(ApiSession::new()),
        )
    }

    #[test]
    fn token_response_minimal() {
        let token: TokenResponse = serde_json::from_str(r#"{"access_token":"tok123"}"#).unwrap();
        assert!(token.is_valid());
        assert_eq!(token.token_type, "");
        assert!(token.expires_in.is_none());
        assert!(token.expires_at().is_none());
    }

    #[test]
    fn token_response_full() {
        let json = r#"{
            "access_token": "a",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "r",
            "scope": "PRINCIPAL_ROLE:ALL",
            "issued_token_type": "urn:ietf:params:oauth:token-type:access_token"
        }"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(token.token_type, "bearer");
        assert_eq!(token.refresh_token.as_deref(), Some("r"));
        assert_eq!(token.scope.as_deref(), Some("PRINCIPAL_ROLE:ALL"));
        assert!(token.expires_at().unwrap() > chrono::Utc::now());
    }

    #[test]
    fn empty_access_token_is_invalid() {
        let token: TokenResponse = serde_json::from_str(r#"{"token_type":"bearer"}"#).unwrap();
        assert!(!token.is_valid());
    }

    #[test]
    fn debug_redacts_tokens() {
        let token = TokenResponse {
            access_token: "secret-access".into(),
            token_type: "bearer".into(),
            expires_in: None,
            refresh_token: Some("secret-refresh".into()),
            scope: None,
        };
        let rendered = format!("{token:?}");
        assert!(!rendered.contains("secret-access"));
        assert!(!rendered.contains("secret-refresh"));
    }

    #[tokio::test]
    async fn exchange_without_session_fails_before_network() {
        let client = client(AuthConfig {
            oauth_token_url: Some("http://127.0.0.1:9/token".into()),
            ..AuthConfig::default()
        });
        let err = client
            .exchange_token("subject", ACCESS_TOKEN_TYPE)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::Protocol(ProtocolViolation::NoActiveSession)
        ));
    }

    #[tokio::test]
    async fn auth_code_exchange_requires_issuer_and_client() {
        let client = client(AuthConfig {
            oidc_issuer_url: Some("http://127.0.0.1:9".into()),
            ..AuthConfig::default()
        });
        let err = client
            .exchange_auth_code("code", "verifier", "https://console/callback")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "config_error");
    }

    #[tokio::test]
    async fn client_credentials_without_token_url_is_config_error() {
        let client = client(AuthConfig::default());
        let err = client
            .client_credentials("id", "secret", "PRINCIPAL_ROLE:ALL")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "config_error");
    }

    #[tokio::test]
    async fn invalid_realm_header_name_is_config_error() {
        let client = client(AuthConfig {
            oauth_token_url: Some("http://127.0.0.1:9/token".into()),
            realm_header_name: "bad header".into(),
            ..AuthConfig::default()
        });
        let err = client
            .client_credentials("id", "secret", "scope")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid realm header name"));
    }
}
