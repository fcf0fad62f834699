#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use console_auth::config::{AuthConfig, ConfigKey};
use console_auth::{MemorySessionStore, SessionStore};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";
pub const REDIRECT_URI: &str = "https://console.example.com/auth/callback";

/// Discovery document whose endpoints point back at the mock server.
pub fn discovery_body(server: &MockServer) -> serde_json::Value {
    serde_json::json!({
        "issuer": server.uri(),
        "authorization_endpoint": format!("{}/authorize", server.uri()),
        "token_endpoint": format!("{}/token", server.uri()),
        "jwks_uri": format!("{}/jwks", server.uri()),
    })
}

/// Serve the discovery document, expecting it to be fetched `times` times.
pub async fn mount_discovery(server: &MockServer, times: u64) {
    Mock::given(method("GET"))
        .and(path(DISCOVERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(discovery_body(server)))
        .expect(times)
        .mount(server)
        .await;
}

pub fn token_body(access_token: &str) -> serde_json::Value {
    serde_json::json!({
        "access_token": access_token,
        "token_type": "bearer",
        "expires_in": 3600,
    })
}

/// Build a config snapshot from `KEY: value` pairs, defaults for the rest.
pub fn config_with(pairs: &[(ConfigKey, &str)]) -> Arc<AuthConfig> {
    let values: HashMap<ConfigKey, String> =
        pairs.iter().map(|(k, v)| (*k, v.to_string())).collect();
    Arc::new(AuthConfig::from_lookup(|key| values.get(&key).cloned()))
}

/// OIDC settings pointing at the mock provider.
pub fn oidc_config(server: &MockServer) -> Arc<AuthConfig> {
    let issuer = server.uri();
    config_with(&[
        (ConfigKey::OidcIssuerUrl, issuer.as_str()),
        (ConfigKey::OidcClientId, "console"),
        (ConfigKey::OidcRedirectUri, REDIRECT_URI),
    ])
}

pub fn memory_store() -> Arc<dyn SessionStore> {
    Arc::new(MemorySessionStore::new())
}

/// Decode an `application/x-www-form-urlencoded` request body.
pub fn form_fields(body: &[u8]) -> HashMap<String, String> {
    url::form_urlencoded::parse(body).into_owned().collect()
}

/// Write a runtime config file into `dir` and return its path.
pub fn write_config(dir: &tempfile::TempDir, values: &[(&str, &str)]) -> std::path::PathBuf {
    let map: HashMap<&str, &str> = values.iter().copied().collect();
    let path = dir.path().join("console-auth.json");
    std::fs::write(&path, serde_json::to_string_pretty(&map).unwrap()).unwrap();
    path
}
