use std::sync::Arc;

use crate::error::AuthError;

use super::store::SessionStore;

pub const PKCE_VERIFIER_KEY: &str = "pkce_code_verifier";
pub const PKCE_STATE_KEY: &str = "pkce_state";
pub const AUTH_ERROR_KEY: &str = "auth_error";

/// Verifier and state read out of the store in one step.
///
/// Taking a handshake removes both keys, so each record is observed at most
/// once regardless of how the callback concludes.
#[derive(Clone, PartialEq, Eq)]
pub struct Handshake {
    pub verifier: Option<String>,
    pub state: Option<String>,
}

impl std::fmt::Debug for Handshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handshake")
            .field("verifier", &self.verifier.as_ref().map(|_| "<redacted>"))
            .field("state", &self.state.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// The persisted half of the redirect flow: what must survive the trip to the
/// identity provider and back.
#[derive(Clone)]
pub struct PkceSession {
    store: Arc<dyn SessionStore>,
}

impl PkceSession {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Persist a fresh verifier and state. On a partial write the session is
    /// cleared again before the error is returned.
    pub fn begin(&self, verifier: &str, state: &str) -> Result<(), AuthError> {
        let result = self
            .store
            .set(PKCE_VERIFIER_KEY, verifier)
            .and_then(|_| self.store.set(PKCE_STATE_KEY, state));
        if let Err(e) = result {
            if let Err(clear_err) = self.clear() {
                tracing::debug!("Failed to clear partial PKCE session: {clear_err}");
            }
            return Err(e);
        }
        Ok(())
    }

    pub fn verifier(&self) -> Option<String> {
        self.store.get(PKCE_VERIFIER_KEY)
    }

    pub fn state(&self) -> Option<String> {
        self.store.get(PKCE_STATE_KEY)
    }

    /// Remove verifier and state together. Clearing an empty session is a no-op.
    pub fn clear(&self) -> Result<(), AuthError> {
        self.store.remove_all(&[PKCE_VERIFIER_KEY, PKCE_STATE_KEY])
    }

    pub fn take(&self) -> Result<Handshake, AuthError> {
        let handshake = Handshake {
            verifier: self.verifier(),
            state: self.state(),
        };
        self.clear()?;
        Ok(handshake)
    }

    pub fn store_auth_error(&self, message: &str) -> Result<(), AuthError> {
        self.store.set(AUTH_ERROR_KEY, message)
    }

    /// Read and remove the message left by the last failed callback.
    pub fn take_auth_error(&self) -> Option<String> {
        let message = self.store.get(AUTH_ERROR_KEY)?;
        if let Err(e) = self.store.remove(AUTH_ERROR_KEY) {
            tracing::debug!("Failed to remove stored auth error: {e}");
        }
        Some(message)
    }
}
