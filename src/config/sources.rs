use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::AuthError;

use super::types::{AuthConfig, ConfigKey};

/// Prefix for environment variables read by [`EnvSource`] and captured at
/// build time by [`BuildTimeSource`].
pub const ENV_PREFIX: &str = "CONSOLE_AUTH_";

/// One layer of configuration. Layers are consulted in order and the first
/// non-empty value wins.
pub trait ConfigSource: Send + Sync {
    fn name(&self) -> &str;
    fn get(&self, key: ConfigKey) -> Option<String>;
}

/// Values supplied at runtime, typically from a JSON config file.
#[derive(Debug, Clone, Default)]
pub struct RuntimeSource {
    label: String,
    values: HashMap<String, String>,
}

impl RuntimeSource {
    pub fn new(label: impl Into<String>, values: HashMap<String, String>) -> Self {
        Self {
            label: label.into(),
            values,
        }
    }

    /// Load a JSON object of `KEY: "value"` pairs.
    pub fn from_file(path: &Path) -> Result<Self, AuthError> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            AuthError::Configuration(format!("Cannot read config {}: {e}", path.display()))
        })?;
        let values: HashMap<String, String> = serde_json::from_str(&data).map_err(|e| {
            AuthError::Configuration(format!("Error in config {}: {e}", path.display()))
        })?;
        Ok(Self::new(path.display().to_string(), values))
    }
}

impl ConfigSource for RuntimeSource {
    fn name(&self) -> &str {
        &self.label
    }

    fn get(&self, key: ConfigKey) -> Option<String> {
        self.values.get(key.name()).cloned()
    }
}

/// Process environment, `CONSOLE_AUTH_<KEY>`.
#[derive(Debug, Clone)]
pub struct EnvSource {
    prefix: String,
}

impl EnvSource {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for EnvSource {
    fn default() -> Self {
        Self::with_prefix(ENV_PREFIX)
    }
}

impl ConfigSource for EnvSource {
    fn name(&self) -> &str {
        "environment"
    }

    fn get(&self, key: ConfigKey) -> Option<String> {
        std::env::var(format!("{}{}", self.prefix, key.name())).ok()
    }
}

/// Defaults compiled into the binary from the build environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildTimeSource;

impl ConfigSource for BuildTimeSource {
    fn name(&self) -> &str {
        "build"
    }

    fn get(&self, key: ConfigKey) -> Option<String> {
        let value = match key {
            ConfigKey::ApiUrl => option_env!("CONSOLE_AUTH_POLARIS_API_URL"),
            ConfigKey::Realm => option_env!("CONSOLE_AUTH_POLARIS_REALM"),
            ConfigKey::PrincipalScope => option_env!("CONSOLE_AUTH_POLARIS_PRINCIPAL_SCOPE"),
            ConfigKey::OAuthTokenUrl => option_env!("CONSOLE_AUTH_OAUTH_TOKEN_URL"),
            ConfigKey::RealmHeaderName => option_env!("CONSOLE_AUTH_POLARIS_REALM_HEADER_NAME"),
            ConfigKey::OidcIssuerUrl => option_env!("CONSOLE_AUTH_OIDC_ISSUER_URL"),
            ConfigKey::OidcClientId => option_env!("CONSOLE_AUTH_OIDC_CLIENT_ID"),
            ConfigKey::OidcRedirectUri => option_env!("CONSOLE_AUTH_OIDC_REDIRECT_URI"),
            ConfigKey::OidcScope => option_env!("CONSOLE_AUTH_OIDC_SCOPE"),
        };
        value.map(str::to_string)
    }
}

/// Where a resolved setting came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedValue {
    pub key: ConfigKey,
    pub value: String,
    pub source: String,
}

/// Ordered list of configuration sources, evaluated first-match-wins.
#[derive(Default)]
pub struct ConfigLayers {
    sources: Vec<Box<dyn ConfigSource>>,
}

impl ConfigLayers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a lower-precedence layer.
    pub fn push(mut self, source: impl ConfigSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    pub fn lookup(&self, key: ConfigKey) -> Option<ResolvedValue> {
        self.sources.iter().find_map(|source| {
            source
                .get(key)
                .filter(|v| !v.is_empty())
                .map(|value| ResolvedValue {
                    key,
                    value,
                    source: source.name().to_string(),
                })
        })
    }

    /// Every key with its winning value, or the default when no layer had one.
    pub fn annotated(&self) -> Vec<ResolvedValue> {
        ConfigKey::ALL
            .iter()
            .map(|&key| {
                self.lookup(key).unwrap_or_else(|| ResolvedValue {
                    key,
                    value: key.default_value().to_string(),
                    source: "default".to_string(),
                })
            })
            .collect()
    }

    pub fn snapshot(&self) -> AuthConfig {
        AuthConfig::from_lookup(|key| self.lookup(key).map(|r| r.value))
    }
}

/// Standard layer stack: optional runtime file, then environment, then
/// build-time values.
pub fn default_layers(runtime_file: Option<PathBuf>) -> Result<ConfigLayers, AuthError> {
    let mut layers = ConfigLayers::new();
    if let Some(path) = runtime_file {
        tracing::debug!("Loading runtime config from {}", path.display());
        layers = layers.push(RuntimeSource::from_file(&path)?);
    }
    Ok(layers.push(EnvSource::default()).push(BuildTimeSource))
}
