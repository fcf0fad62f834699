use std::sync::RwLock;

/// The single active access token used by the API client.
///
/// Every successful grant replaces the token; the last write wins.
#[derive(Default)]
pub struct ApiSession {
    token: RwLock<Option<String>>,
}

impl std::fmt::Debug for ApiSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiSession")
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

impl ApiSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_access_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }

    pub fn access_token(&self) -> Option<String> {
        self.token.read().ok()?.clone()
    }

    pub fn set_access_token(&self, token: &str) {
        if let Ok(mut guard) = self.token.write() {
            *guard = Some(token.to_string());
        }
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.token.write() {
            *guard = None;
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token().is_some()
    }
}
