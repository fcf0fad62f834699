use serde::Serialize;

use crate::error::AuthError;

/// Path appended to the API base URL when no explicit token URL is configured.
pub const DEFAULT_TOKEN_PATH: &str = "/api/catalog/v1/oauth/tokens";

/// Every setting the authentication core reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    ApiUrl,
    Realm,
    PrincipalScope,
    OAuthTokenUrl,
    RealmHeaderName,
    OidcIssuerUrl,
    OidcClientId,
    OidcRedirectUri,
    OidcScope,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 9] = [
        ConfigKey::ApiUrl,
        ConfigKey::Realm,
        ConfigKey::PrincipalScope,
        ConfigKey::OAuthTokenUrl,
        ConfigKey::RealmHeaderName,
        ConfigKey::OidcIssuerUrl,
        ConfigKey::OidcClientId,
        ConfigKey::OidcRedirectUri,
        ConfigKey::OidcScope,
    ];

    /// Name used in runtime config files; environment variables add a prefix.
    pub fn name(self) -> &'static str {
        match self {
            ConfigKey::ApiUrl => "POLARIS_API_URL",
            ConfigKey::Realm => "POLARIS_REALM",
            ConfigKey::PrincipalScope => "POLARIS_PRINCIPAL_SCOPE",
            ConfigKey::OAuthTokenUrl => "OAUTH_TOKEN_URL",
            ConfigKey::RealmHeaderName => "POLARIS_REALM_HEADER_NAME",
            ConfigKey::OidcIssuerUrl => "OIDC_ISSUER_URL",
            ConfigKey::OidcClientId => "OIDC_CLIENT_ID",
            ConfigKey::OidcRedirectUri => "OIDC_REDIRECT_URI",
            ConfigKey::OidcScope => "OIDC_SCOPE",
        }
    }

    pub fn default_value(self) -> &'static str {
        match self {
            ConfigKey::Realm => "POLARIS",
            ConfigKey::RealmHeaderName => "Polaris-Realm",
            ConfigKey::OidcScope => "openid profile email",
            _ => "",
        }
    }
}

/// Immutable configuration snapshot shared by the authentication core.
///
/// Optional settings are `None` when no source supplied a non-empty value.
#[derive(Debug, Clone, Serialize)]
pub struct AuthConfig {
    pub api_url: Option<String>,
    pub realm: String,
    pub principal_scope: Option<String>,
    pub oauth_token_url: Option<String>,
    pub realm_header_name: String,
    pub oidc_issuer_url: Option<String>,
    pub oidc_client_id: Option<String>,
    pub oidc_redirect_uri: Option<String>,
    pub oidc_scope: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl AuthConfig {
    /// Build a snapshot from a key lookup, falling back to each key's default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(ConfigKey) -> Option<String>,
    {
        let value = |key: ConfigKey| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| key.default_value().to_string())
        };
        let optional = |key: ConfigKey| Some(value(key)).filter(|v| !v.is_empty());

        Self {
            api_url: optional(ConfigKey::ApiUrl),
            realm: value(ConfigKey::Realm),
            principal_scope: optional(ConfigKey::PrincipalScope),
            oauth_token_url: optional(ConfigKey::OAuthTokenUrl),
            realm_header_name: value(ConfigKey::RealmHeaderName),
            oidc_issuer_url: optional(ConfigKey::OidcIssuerUrl),
            oidc_client_id: optional(ConfigKey::OidcClientId),
            oidc_redirect_uri: optional(ConfigKey::OidcRedirectUri),
            oidc_scope: value(ConfigKey::OidcScope),
        }
    }

    /// Token endpoint for the direct grants: the explicit override, or the
    /// catalog API's token path.
    pub fn token_url(&self) -> Result<String, AuthError> {
        if let Some(url) = &self.oauth_token_url {
            return Ok(url.clone());
        }
        match &self.api_url {
            Some(api) => Ok(format!("{}{DEFAULT_TOKEN_PATH}", api.trim_end_matches('/'))),
            None => Err(AuthError::Configuration(format!(
                "No token endpoint configured. Set {} or {}.",
                ConfigKey::OAuthTokenUrl.name(),
                ConfigKey::ApiUrl.name()
            ))),
        }
    }

    pub fn is_oidc_configured(&self) -> bool {
        self.oidc_issuer_url.is_some()
            && self.oidc_client_id.is_some()
            && self.oidc_redirect_uri.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let cfg = AuthConfig::default();
        assert_eq!(cfg.realm, "POLARIS");
        assert_eq!(cfg.realm_header_name, "Polaris-Realm");
        assert_eq!(cfg.oidc_scope, "openid profile email");
        assert!(cfg.api_url.is_none());
        assert!(cfg.oidc_issuer_url.is_none());
        assert!(!cfg.is_oidc_configured());
    }

    #[test]
    fn empty_values_fall_back_to_default() {
        let cfg = AuthConfig::from_lookup(|key| match key {
            ConfigKey::Realm => Some(String::new()),
            ConfigKey::OidcClientId => Some(String::new()),
            _ => None,
        });
        assert_eq!(cfg.realm, "POLARIS");
        assert!(cfg.oidc_client_id.is_none());
    }

    #[test]
    fn token_url_prefers_override() {
        let cfg = AuthConfig {
            api_url: Some("https://catalog.example.com".into()),
            oauth_token_url: Some("https://idp.example.com/token".into()),
            ..AuthConfig::default()
        };
        assert_eq!(cfg.token_url().unwrap(), "https://idp.example.com/token");
    }

    #[test]
    fn token_url_derived_from_api_url() {
        let cfg = AuthConfig {
            api_url: Some("https://catalog.example.com/".into()),
            ..AuthConfig::default()
        };
        assert_eq!(
            cfg.token_url().unwrap(),
            "https://catalog.example.com/api/catalog/v1/oauth/tokens"
        );
    }

    #[test]
    fn token_url_missing_is_configuration_error() {
        let err = AuthConfig::default().token_url().unwrap_err();
        assert_eq!(err.code(), "config_error");
        assert!(err.to_string().contains("OAUTH_TOKEN_URL"));
    }

    #[test]
    fn oidc_configured_requires_all_three() {
        let mut cfg = AuthConfig {
            oidc_issuer_url: Some("https://idp".into()),
            oidc_client_id: Some("console".into()),
            ..AuthConfig::default()
        };
        assert!(!cfg.is_oidc_configured());
        cfg.oidc_redirect_uri = Some("https://console/callback".into());
        assert!(cfg.is_oidc_configured());
    }
}
