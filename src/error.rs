/// Ways a callback can violate the redirect-flow protocol.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolViolation {
    #[error("Missing authorization code or state parameter")]
    MissingCodeOrState,

    #[error("Invalid state parameter. Possible CSRF attack.")]
    StateMismatch,

    #[error("Code verifier not found. Please restart the login process.")]
    MissingVerifier,

    #[error("Authorization code has already been processed")]
    DuplicateCallback,

    #[error("No active session to exchange from")]
    NoActiveSession,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    Configuration(String),

    #[error("{0}")]
    Discovery(String),

    #[error("Token endpoint returned status {status}: {body}")]
    Transport { status: u16, body: String },

    #[error("Token request failed: {0}")]
    Request(String),

    #[error("{0}")]
    Protocol(#[from] ProtocolViolation),

    #[error("{0}")]
    Provider(String),

    #[error("Secure random source unavailable: {0}")]
    Entropy(String),

    #[error("Session store error: {0}")]
    Store(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AuthError {
    pub(crate) fn incomplete_oidc_config() -> Self {
        AuthError::Configuration(
            "OIDC configuration is incomplete. Please check environment variables.".into(),
        )
    }

    /// Error code string for structured JSON output.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Configuration(_) => "config_error",
            AuthError::Discovery(_) => "discovery_error",
            AuthError::Transport { .. } => "transport_error",
            AuthError::Request(_) => "transport_error",
            AuthError::Protocol(ProtocolViolation::StateMismatch) => "csrf_suspected",
            AuthError::Protocol(_) => "protocol_error",
            AuthError::Provider(_) => "provider_error",
            AuthError::Entropy(_) => "entropy_error",
            AuthError::Store(_) => "store_error",
            AuthError::IoError(_) => "io_error",
        }
    }

    /// True when the callback state did not match the stored one.
    pub fn is_csrf(&self) -> bool {
        matches!(self, AuthError::Protocol(ProtocolViolation::StateMismatch))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            AuthError::Transport { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        if let Some(status) = self.status() {
            obj.insert("status".into(), serde_json::Value::from(status));
        }
        obj.insert("message".into(), serde_json::Value::String(self.to_string()));
        obj.insert("code".into(), serde_json::Value::String(self.code().to_string()));
        serde_json::json!({ "error": obj })
    }
}
