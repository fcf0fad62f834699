use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use url::Url;

use crate::config::AuthConfig;
use crate::error::{AuthError, ProtocolViolation};
use crate::navigation::{Navigator, HOME_ROUTE, LOGIN_ROUTE};
use crate::oauth::callback::CallbackParams;
use crate::oauth::discovery::DiscoveryResolver;
use crate::oauth::pkce::{generate_pkce, generate_state};
use crate::oauth::token::{TokenClient, TokenResponse};
use crate::session::{ApiSession, Handshake, PkceSession, SessionStore};

/// Delay before a failed callback sends the user back to the login page.
pub const ERROR_REDIRECT_DELAY: Duration = Duration::from_secs(3);
/// Delay between clearing credentials on logout and leaving the page.
pub const LOGOUT_REDIRECT_DELAY: Duration = Duration::from_millis(100);
/// How many recently redeemed codes the duplicate guard remembers.
pub const PROCESSED_CODE_WINDOW: usize = 16;

/// Where a redirect-based login currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    Initiating,
    AwaitingRedirect,
    Validating,
    Exchanging,
    Complete,
    Failed,
}

impl std::fmt::Display for FlowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FlowState::Idle => "idle",
            FlowState::Initiating => "initiating",
            FlowState::AwaitingRedirect => "awaiting-redirect",
            FlowState::Validating => "validating",
            FlowState::Exchanging => "exchanging",
            FlowState::Complete => "complete",
            FlowState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Drives login, callback handling and logout on behalf of the UI.
pub struct LoginController {
    tokens: TokenClient,
    pkce: PkceSession,
    navigator: Arc<dyn Navigator>,
    state: Mutex<FlowState>,
    processed_codes: Mutex<VecDeque<String>>,
    error_redirect_delay: Duration,
    logout_redirect_delay: Duration,
}

impl LoginController {
    /// Wire a controller, its token client and discovery resolver around one
    /// session store.
    pub fn new(
        config: Arc<AuthConfig>,
        store: Arc<dyn SessionStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, AuthError> {
        let discovery = DiscoveryResolver::new(store.clone())?;
        let tokens = TokenClient::new(config, discovery, Arc::new(ApiSession::new()));
        Ok(Self::with_token_client(tokens, store, navigator))
    }

    pub fn with_token_client(
        tokens: TokenClient,
        store: Arc<dyn SessionStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            tokens,
            pkce: PkceSession::new(store),
            navigator,
            state: Mutex::new(FlowState::Idle),
            processed_codes: Mutex::new(VecDeque::with_capacity(PROCESSED_CODE_WINDOW)),
            error_redirect_delay: ERROR_REDIRECT_DELAY,
            logout_redirect_delay: LOGOUT_REDIRECT_DELAY,
        }
    }

    pub fn with_redirect_delays(mut self, on_error: Duration, on_logout: Duration) -> Self {
        self.error_redirect_delay = on_error;
        self.logout_redirect_delay = on_logout;
        self
    }

    pub fn tokens(&self) -> &TokenClient {
        &self.tokens
    }

    pub fn state(&self) -> FlowState {
        self.state.lock().map(|s| *s).unwrap_or(FlowState::Failed)
    }

    pub fn is_oidc_configured(&self) -> bool {
        self.tokens.config().is_oidc_configured()
    }

    /// Message left behind by the last failed callback, read once.
    pub fn take_auth_error(&self) -> Option<String> {
        self.pkce.take_auth_error()
    }

    fn transition(&self, next: FlowState) {
        if let Ok(mut state) = self.state.lock() {
            tracing::debug!("Login flow {} -> {next}", *state);
            *state = next;
        }
    }

    /// Direct login with the client-credentials grant.
    pub async fn login_with_client_credentials(
        &self,
        client_id: &str,
        client_secret: &str,
        scope: &str,
    ) -> Result<TokenResponse, AuthError> {
        let token = self
            .tokens
            .client_credentials(client_id, client_secret, scope)
            .await?;
        self.navigator.navigate(HOME_ROUTE);
        Ok(token)
    }

    /// Start the Authorization Code + PKCE flow and redirect to the provider.
    ///
    /// Returns the authorization URL that was handed to the navigator.
    pub async fn initiate(&self) -> Result<Url, AuthError> {
        let config = self.tokens.config();
        let (Some(issuer), Some(client_id), Some(redirect_uri)) = (
            &config.oidc_issuer_url,
            &config.oidc_client_id,
            &config.oidc_redirect_uri,
        ) else {
            return Err(AuthError::incomplete_oidc_config());
        };

        self.transition(FlowState::Initiating);
        match self
            .authorization_url(issuer, client_id, redirect_uri, &config.oidc_scope)
            .await
        {
            Ok(url) => {
                self.transition(FlowState::AwaitingRedirect);
                tracing::info!("Redirecting to identity provider at {issuer}");
                self.navigator.redirect(&url);
                Ok(url)
            }
            Err(e) => {
                if let Err(clear_err) = self.pkce.clear() {
                    tracing::warn!("Failed to clear PKCE session: {clear_err}");
                }
                self.transition(FlowState::Failed);
                Err(e)
            }
        }
    }

    async fn authorization_url(
        &self,
        issuer: &str,
        client_id: &str,
        redirect_uri: &str,
        scope: &str,
    ) -> Result<Url, AuthError> {
        // A verifier or state left by an abandoned attempt must not be reusable.
        self.pkce.clear()?;

        let discovery = self.tokens.discovery().discover(issuer).await?;
        let mut url = Url::parse(&discovery.authorization_endpoint).map_err(|e| {
            AuthError::Discovery(format!(
                "Invalid authorization endpoint '{}': {e}",
                discovery.authorization_endpoint
            ))
        })?;

        let pkce = generate_pkce()?;
        let state = generate_state()?;
        self.pkce.begin(&pkce.verifier, &state)?;

        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", scope)
            .append_pair("state", &state)
            .append_pair("code_challenge", &pkce.challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("prompt", "login");
        Ok(url)
    }

    /// Validate the provider's redirect and redeem the authorization code.
    ///
    /// A recently redeemed code is refused outright. Past
    /// that guard, the stored verifier and state are consumed before any
    /// validation, so no path leaves them behind.
    pub async fn handle_callback(
        &self,
        params: &CallbackParams,
    ) -> Result<TokenResponse, AuthError> {
        if let Some(code) = &params.code {
            let first_use = self
                .processed_codes
                .lock()
                .map(|mut codes| {
                    if codes.contains(code) {
                        return false;
                    }
                    if codes.len() == PROCESSED_CODE_WINDOW {
                        codes.pop_front();
                    }
                    codes.push_back(code.clone());
                    true
                })
                .unwrap_or(false);
            if !first_use {
                tracing::debug!("Ignoring repeated callback for an already processed code");
                return Err(ProtocolViolation::DuplicateCallback.into());
            }
        }

        self.transition(FlowState::Validating);
        let result = match self.pkce.take() {
            Ok(handshake) => self.validate_and_exchange(params, handshake).await,
            Err(e) => Err(e),
        };
        match &result {
            Ok(_) => self.transition(FlowState::Complete),
            Err(e) => {
                tracing::warn!("OIDC callback failed: {e}");
                self.transition(FlowState::Failed);
            }
        }
        result
    }

    async fn validate_and_exchange(
        &self,
        params: &CallbackParams,
        handshake: Handshake,
    ) -> Result<TokenResponse, AuthError> {
        if let Some(message) = params.provider_error() {
            return Err(AuthError::Provider(message.to_string()));
        }

        let (Some(code), Some(state)) = (&params.code, &params.state) else {
            return Err(ProtocolViolation::MissingCodeOrState.into());
        };

        if handshake.state.as_deref() != Some(state.as_str()) {
            return Err(ProtocolViolation::StateMismatch.into());
        }

        let verifier = handshake
            .verifier
            .ok_or(ProtocolViolation::MissingVerifier)?;

        let redirect_uri = self
            .tokens
            .config()
            .oidc_redirect_uri
            .clone()
            .ok_or_else(|| AuthError::Configuration("Redirect URI not configured.".into()))?;

        self.transition(FlowState::Exchanging);
        self.tokens
            .exchange_auth_code(code, &verifier, &redirect_uri)
            .await
    }

    /// UI entry point for the callback page: on success go home, on failure
    /// remember the message for the login page and return there after a delay.
    ///
    /// A repeated invocation for the same code has no side effects.
    pub async fn complete_login(
        &self,
        params: &CallbackParams,
    ) -> Result<TokenResponse, AuthError> {
        match self.handle_callback(params).await {
            Ok(token) => {
                self.navigator.navigate(HOME_ROUTE);
                Ok(token)
            }
            Err(e @ AuthError::Protocol(ProtocolViolation::DuplicateCallback)) => Err(e),
            Err(e) => {
                if let Err(store_err) = self.pkce.store_auth_error(&e.to_string()) {
                    tracing::debug!("Failed to record auth error: {store_err}");
                }
                self.schedule_navigation(LOGIN_ROUTE, self.error_redirect_delay);
                Err(e)
            }
        }
    }

    /// Give up on an attempt whose callback will never arrive, discarding the
    /// stored verifier and state.
    pub fn abandon(&self) {
        if let Err(e) = self.pkce.clear() {
            tracing::warn!("Failed to clear PKCE session: {e}");
        }
        self.transition(FlowState::Failed);
    }

    /// Drop the active credential and any PKCE leftovers, then leave for the
    /// login page.
    ///
    /// Navigation happens on a spawned task after a short delay; the returned
    /// handle completes once it has run.
    pub fn logout(&self) -> tokio::task::JoinHandle<()> {
        self.tokens.session().clear();
        if let Err(e) = self.pkce.clear() {
            tracing::warn!("Failed to clear PKCE session on logout: {e}");
        }
        self.transition(FlowState::Idle);
        tracing::info!("Logged out");
        self.schedule_navigation(LOGIN_ROUTE, self.logout_redirect_delay)
    }

    fn schedule_navigation(
        &self,
        route: &'static str,
        delay: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let navigator = self.navigator.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            navigator.navigate(route);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigation::RecordingNavigator;
    use crate::session::{MemorySessionStore, PKCE_STATE_KEY, PKCE_VERIFIER_KEY};

    fn oidc_config() -> AuthConfig {
        AuthConfig {
            oidc_issuer_url: Some("http://127.0.0.1:9".into()),
            oidc_client_id: Some("console".into()),
            oidc_redirect_uri: Some("https://console.example.com/auth/callback".into()),
            ..AuthConfig::default()
        }
    }

    fn controller(
        config: AuthConfig,
    ) -> (LoginController, Arc<MemorySessionStore>, Arc<RecordingNavigator>) {
        let store = Arc::new(MemorySessionStore::new());
        let nav = Arc::new(RecordingNavigator::new());
        let ctrl = LoginController::new(Arc::new(config), store.clone(), nav.clone())
            .unwrap()
            .with_redirect_delays(Duration::from_millis(10), Duration::from_millis(10));
        (ctrl, store, nav)
    }

    #[test]
    fn flow_state_display() {
        assert_eq!(FlowState::AwaitingRedirect.to_string(), "awaiting-redirect");
        assert_eq!(FlowState::Complete.to_string(), "complete");
    }

    #[tokio::test]
    async fn initiate_without_config_fails_fast() {
        let (ctrl, store, nav) = controller(AuthConfig::default());
        let err = ctrl.initiate().await.unwrap_err();
        assert_eq!(err.code(), "config_error");
        assert_eq!(ctrl.state(), FlowState::Idle);
        assert!(store.is_empty());
        assert!(nav.events().is_empty());
    }

    #[tokio::test]
    async fn initiate_discovery_failure_clears_stale_secrets() {
        let (ctrl, store, nav) = controller(oidc_config());
        store.set(PKCE_VERIFIER_KEY, "stale").unwrap();
        store.set(PKCE_STATE_KEY, "stale").unwrap();

        let err = ctrl.initiate().await.unwrap_err();
        assert_eq!(err.code(), "discovery_error");
        assert_eq!(ctrl.state(), FlowState::Failed);
        assert!(store.get(PKCE_VERIFIER_KEY).is_none());
        assert!(store.get(PKCE_STATE_KEY).is_none());
        assert!(nav.events().is_empty());
    }

    #[tokio::test]
    async fn state_mismatch_is_csrf_and_clears() {
        let (ctrl, store, _nav) = controller(oidc_config());
        store.set(PKCE_VERIFIER_KEY, "verifier").unwrap();
        store.set(PKCE_STATE_KEY, "xyz").unwrap();

        let params = CallbackParams::from_query("code=c1&state=abc");
        let err = ctrl.handle_callback(&params).await.unwrap_err();
        assert!(err.is_csrf());
        assert!(store.is_empty());
        assert_eq!(ctrl.state(), FlowState::Failed);
    }

    #[tokio::test]
    async fn absent_stored_state_is_csrf() {
        let (ctrl, store, _nav) = controller(oidc_config());
        store.set(PKCE_VERIFIER_KEY, "verifier").unwrap();

        let params = CallbackParams::from_query("code=c1&state=abc");
        let err = ctrl.handle_callback(&params).await.unwrap_err();
        assert!(err.is_csrf());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn missing_code_is_protocol_error() {
        let (ctrl, store, _nav) = controller(oidc_config());
        store.set(PKCE_VERIFIER_KEY, "verifier").unwrap();
        store.set(PKCE_STATE_KEY, "xyz").unwrap();

        let params = CallbackParams::from_query("state=xyz");
        let err = ctrl.handle_callback(&params).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::Protocol(ProtocolViolation::MissingCodeOrState)
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn missing_verifier_is_protocol_error() {
        let (ctrl, store, _nav) = controller(oidc_config());
        store.set(PKCE_STATE_KEY, "xyz").unwrap();

        let params = CallbackParams::from_query("code=c1&state=xyz");
        let err = ctrl.handle_callback(&params).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::Protocol(ProtocolViolation::MissingVerifier)
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn missing_redirect_uri_is_config_error() {
        let (ctrl, store, _nav) = controller(AuthConfig {
            oidc_redirect_uri: None,
            ..oidc_config()
        });
        store.set(PKCE_VERIFIER_KEY, "verifier").unwrap();
        store.set(PKCE_STATE_KEY, "xyz").unwrap();

        let params = CallbackParams::from_query("code=c1&state=xyz");
        let err = ctrl.handle_callback(&params).await.unwrap_err();
        assert_eq!(err.to_string(), "Redirect URI not configured.");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn provider_error_surfaces_description() {
        let (ctrl, store, _nav) = controller(oidc_config());
        store.set(PKCE_VERIFIER_KEY, "verifier").unwrap();
        store.set(PKCE_STATE_KEY, "xyz").unwrap();

        let params = CallbackParams::from_query(
            "error=access_denied&error_description=The+user+denied+access&state=xyz",
        );
        let err = ctrl.handle_callback(&params).await.unwrap_err();
        assert_eq!(err.code(), "provider_error");
        assert_eq!(err.to_string(), "The user denied access");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn duplicate_code_is_rejected_without_touching_store() {
        let (ctrl, store, _nav) = controller(oidc_config());
        store.set(PKCE_STATE_KEY, "xyz").unwrap();

        let params = CallbackParams::from_query("code=c1&state=abc");
        assert!(ctrl.handle_callback(&params).await.unwrap_err().is_csrf());

        store.set(PKCE_STATE_KEY, "fresh").unwrap();
        let err = ctrl.handle_callback(&params).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::Protocol(ProtocolViolation::DuplicateCallback)
        ));
        assert_eq!(store.get(PKCE_STATE_KEY).as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn duplicate_guard_remembers_a_bounded_window() {
        let (ctrl, store, _nav) = controller(oidc_config());
        for i in 0..=PROCESSED_CODE_WINDOW {
            let params = CallbackParams::from_query(&format!("code=c{i}&state=abc"));
            assert!(ctrl.handle_callback(&params).await.unwrap_err().is_csrf());
        }

        // The oldest code has been forgotten and is validated again.
        store.set(PKCE_STATE_KEY, "xyz").unwrap();
        let oldest = CallbackParams::from_query("code=c0&state=abc");
        assert!(ctrl.handle_callback(&oldest).await.unwrap_err().is_csrf());
        assert!(store.get(PKCE_STATE_KEY).is_none());

        // The most recent one is still refused.
        store.set(PKCE_STATE_KEY, "xyz").unwrap();
        let latest =
            CallbackParams::from_query(&format!("code=c{PROCESSED_CODE_WINDOW}&state=abc"));
        let err = ctrl.handle_callback(&latest).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::Protocol(ProtocolViolation::DuplicateCallback)
        ));
        assert_eq!(store.get(PKCE_STATE_KEY).as_deref(), Some("xyz"));
    }

    #[tokio::test]
    async fn abandon_discards_handshake() {
        let (ctrl, store, nav) = controller(oidc_config());
        store.set(PKCE_VERIFIER_KEY, "verifier").unwrap();
        store.set(PKCE_STATE_KEY, "xyz").unwrap();

        ctrl.abandon();

        assert!(store.is_empty());
        assert_eq!(ctrl.state(), FlowState::Failed);
        assert!(nav.events().is_empty());
    }

    #[tokio::test]
    async fn complete_login_failure_records_error_and_returns_to_login() {
        let (ctrl, _store, nav) = controller(oidc_config());
        let params = CallbackParams::from_query("code=c1&state=abc");

        let err = ctrl.complete_login(&params).await.unwrap_err();
        assert!(err.is_csrf());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(nav.last_route().as_deref(), Some(LOGIN_ROUTE));
        assert_eq!(
            ctrl.take_auth_error().as_deref(),
            Some("Invalid state parameter. Possible CSRF attack.")
        );
        assert!(ctrl.take_auth_error().is_none());
    }

    #[tokio::test]
    async fn complete_login_duplicate_has_no_side_effects() {
        let (ctrl, _store, nav) = controller(oidc_config());
        let params = CallbackParams::from_query("code=c1&state=abc");
        let _ = ctrl.complete_login(&params).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        let _ = ctrl.take_auth_error();
        let before = nav.events().len();

        let err = ctrl.complete_login(&params).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::Protocol(ProtocolViolation::DuplicateCallback)
        ));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(nav.events().len(), before);
        assert!(ctrl.take_auth_error().is_none());
    }

    #[tokio::test]
    async fn logout_clears_everything_then_navigates() {
        let (ctrl, store, nav) = controller(oidc_config());
        ctrl.tokens().session().set_access_token("tok");
        store.set(PKCE_VERIFIER_KEY, "v").unwrap();
        store.set(PKCE_STATE_KEY, "s").unwrap();

        let handle = ctrl.logout();
        assert!(!ctrl.tokens().session().is_authenticated());
        assert!(store.is_empty());

        handle.await.unwrap();
        assert_eq!(
            nav.events(),
            vec![crate::navigation::NavigationEvent::Route("/login".into())]
        );
    }
}
