use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::session::SessionStore;

pub const DISCOVERY_CACHE_PREFIX: &str = "oidc_discovery_cache";
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);
pub const CACHE_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    #[serde(default)]
    pub issuer: String,
    #[serde(default)]
    pub authorization_endpoint: String,
    #[serde(default)]
    pub token_endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<String>,
}

impl DiscoveryDocument {
    fn has_required_endpoints(&self) -> bool {
        !self.authorization_endpoint.is_empty() && !self.token_endpoint.is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedDiscovery {
    document: DiscoveryDocument,
    /// Milliseconds since the Unix epoch.
    timestamp: i64,
}

/// Construct the OpenID configuration URL for an issuer.
pub fn build_discovery_url(issuer: &str) -> String {
    let base = issuer.strip_suffix('/').unwrap_or(issuer);
    format!("{base}/.well-known/openid-configuration")
}

pub fn cache_key(issuer: &str) -> String {
    format!("{DISCOVERY_CACHE_PREFIX}_{issuer}")
}

/// Fetches provider metadata and caches it in the session store.
///
/// Concurrent lookups for the same issuer are not coalesced; each may hit the
/// network, and the last one to finish overwrites the cache entry.
#[derive(Clone)]
pub struct DiscoveryResolver {
    client: reqwest::Client,
    store: Arc<dyn SessionStore>,
    ttl: Duration,
    timeout: Duration,
}

impl DiscoveryResolver {
    pub fn new(store: Arc<dyn SessionStore>) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AuthError::Request(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            store,
            ttl: CACHE_TTL,
            timeout: DISCOVERY_TIMEOUT,
        })
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Upper bound on the well-known document fetch.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn discover(&self, issuer: &str) -> Result<DiscoveryDocument, AuthError> {
        if let Some(document) = self.cached(issuer) {
            tracing::debug!("Using cached OIDC discovery for {issuer}");
            return Ok(document);
        }

        let url = build_discovery_url(issuer);
        tracing::debug!("Fetching OIDC discovery document from {url}");
        let discovery_error = |detail: String| {
            AuthError::Discovery(format!(
                "Failed to discover OIDC endpoints from {url}: {detail}"
            ))
        };

        let resp = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| discovery_error(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(discovery_error(format!(
                "endpoint returned status {}",
                resp.status()
            )));
        }

        let document: DiscoveryDocument = resp
            .json()
            .await
            .map_err(|e| discovery_error(format!("invalid response body: {e}")))?;

        if !document.has_required_endpoints() {
            return Err(AuthError::Discovery(
                "Invalid OIDC discovery document: missing required endpoints".into(),
            ));
        }

        self.store_cached(issuer, &document);
        Ok(document)
    }

    /// Return an unexpired cache entry, purging it if it has expired.
    fn cached(&self, issuer: &str) -> Option<DiscoveryDocument> {
        let key = cache_key(issuer);
        let raw = self.store.get(&key)?;
        let entry: CachedDiscovery = serde_json::from_str(&raw).ok()?;

        let age_ms = chrono::Utc::now().timestamp_millis() - entry.timestamp;
        if age_ms > self.ttl.as_millis() as i64 {
            tracing::debug!("OIDC discovery cache for {issuer} expired");
            if let Err(e) = self.store.remove(&key) {
                tracing::debug!("Failed to purge expired discovery cache: {e}");
            }
            return None;
        }
        Some(entry.document)
    }

    fn store_cached(&self, issuer: &str, document: &DiscoveryDocument) {
        let entry = CachedDiscovery {
            document: document.clone(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        let result = serde_json::to_string(&entry)
            .map_err(|e| AuthError::Store(e.to_string()))
            .and_then(|data| self.store.set(&cache_key(issuer), &data));
        if let Err(e) = result {
            tracing::debug!("Ignoring discovery cache write failure: {e}");
        }
    }
}
