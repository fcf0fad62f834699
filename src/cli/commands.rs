use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::config::{load_layers, AuthConfig, ConfigLayers};
use crate::error::AuthError;
use crate::navigation::{BrowserNavigator, Navigator, RecordingNavigator};
use crate::oauth::token::ACCESS_TOKEN_TYPE;
use crate::oauth::{listen_for_callback, CallbackParams, LoginController};
use crate::session::{default_session_path, FileSessionStore, SessionStore};

use super::output::{format_config, format_discovery, format_token, OutputMode};

/// Everything a command needs: resolved configuration and the on-disk session.
pub struct CliContext {
    pub layers: ConfigLayers,
    pub config: Arc<AuthConfig>,
    pub store: Arc<dyn SessionStore>,
    pub mode: OutputMode,
}

impl CliContext {
    pub fn load(
        config_path: Option<&str>,
        session_path: Option<PathBuf>,
        json: bool,
    ) -> Result<Self, AuthError> {
        let layers = load_layers(config_path)?;
        let config = Arc::new(layers.snapshot());
        let store = FileSessionStore::new(session_path.unwrap_or_else(default_session_path));
        tracing::debug!("Using session file {}", store.path().display());
        Ok(Self {
            layers,
            config,
            store: Arc::new(store),
            mode: OutputMode::from_flag(json),
        })
    }

    fn controller(&self, navigator: Arc<dyn Navigator>) -> Result<LoginController, AuthError> {
        LoginController::new(self.config.clone(), self.store.clone(), navigator)
    }

    fn headless(&self) -> Result<LoginController, AuthError> {
        self.controller(Arc::new(RecordingNavigator::new()))
    }
}

pub async fn run_token(
    ctx: &CliContext,
    client_id: &str,
    client_secret: &str,
    scope: Option<&str>,
) -> Result<(), AuthError> {
    let scope = scope
        .map(str::to_string)
        .or_else(|| ctx.config.principal_scope.clone())
        .ok_or_else(|| {
            AuthError::Configuration(
                "No scope given. Pass --scope or set POLARIS_PRINCIPAL_SCOPE.".into(),
            )
        })?;
    let controller = ctx.headless()?;
    let token = controller
        .login_with_client_credentials(client_id, client_secret, &scope)
        .await?;
    println!("{}", format_token(&token, ctx.mode));
    Ok(())
}

pub async fn run_exchange(
    ctx: &CliContext,
    bearer: &str,
    subject_token: &str,
    subject_token_type: Option<&str>,
) -> Result<(), AuthError> {
    let controller = ctx.headless()?;
    let tokens = controller.tokens();
    tokens.session().set_access_token(bearer);
    let token = tokens
        .exchange_token(subject_token, subject_token_type.unwrap_or(ACCESS_TOKEN_TYPE))
        .await?;
    println!("{}", format_token(&token, ctx.mode));
    Ok(())
}

pub async fn run_refresh(ctx: &CliContext, access_token: &str) -> Result<(), AuthError> {
    let controller = ctx.headless()?;
    let token = controller.tokens().refresh_token(access_token).await?;
    println!("{}", format_token(&token, ctx.mode));
    Ok(())
}

pub async fn run_discover(ctx: &CliContext, issuer: Option<&str>) -> Result<(), AuthError> {
    let issuer = issuer
        .map(str::to_string)
        .or_else(|| ctx.config.oidc_issuer_url.clone())
        .ok_or_else(|| {
            AuthError::Configuration("No issuer given. Pass --issuer or set OIDC_ISSUER_URL.".into())
        })?;
    let controller = ctx.headless()?;
    let doc = controller.tokens().discovery().discover(&issuer).await?;
    println!("{}", format_discovery(&doc, ctx.mode));
    Ok(())
}

/// Port to listen on when the redirect URI points back at this machine.
fn loopback_port(redirect_uri: &str) -> Option<u16> {
    let url = Url::parse(redirect_uri).ok()?;
    match url.host_str()? {
        "localhost" | "127.0.0.1" => url.port_or_known_default(),
        _ => None,
    }
}

pub async fn run_login(
    ctx: &CliContext,
    open_browser: bool,
    wait: bool,
    timeout: Duration,
) -> Result<(), AuthError> {
    let navigator: Arc<dyn Navigator> = if open_browser {
        Arc::new(BrowserNavigator)
    } else {
        Arc::new(RecordingNavigator::new())
    };
    let controller = ctx.controller(navigator)?;

    let port = if wait {
        let redirect_uri = ctx.config.oidc_redirect_uri.as_deref().unwrap_or_default();
        Some(loopback_port(redirect_uri).ok_or_else(|| {
            AuthError::Configuration(format!(
                "--wait needs a localhost redirect URI, got '{redirect_uri}'"
            ))
        })?)
    } else {
        None
    };

    let url = controller.initiate().await?;
    eprintln!("Sign in at:\n{url}");

    let Some(port) = port else {
        eprintln!("Then run: console-auth callback '<redirected URL>'");
        return Ok(());
    };

    let params = match listen_for_callback(port, timeout).await {
        Ok(params) => params,
        Err(e) => {
            controller.abandon();
            return Err(e);
        }
    };
    let token = controller.handle_callback(&params).await?;
    println!("{}", format_token(&token, ctx.mode));
    Ok(())
}

pub async fn run_callback(ctx: &CliContext, redirected_url: &str) -> Result<(), AuthError> {
    let params = CallbackParams::from_url(redirected_url)?;
    let controller = ctx.headless()?;
    let token = controller.handle_callback(&params).await?;
    println!("{}", format_token(&token, ctx.mode));
    Ok(())
}

pub async fn run_logout(ctx: &CliContext) -> Result<(), AuthError> {
    let controller = ctx.headless()?;
    controller
        .logout()
        .await
        .map_err(|e| AuthError::Store(format!("Logout did not complete: {e}")))?;
    eprintln!("Logged out");
    Ok(())
}

pub fn run_config_show(ctx: &CliContext) -> Result<(), AuthError> {
    let is_tty = std::io::stdout().is_terminal();
    println!("{}", format_config(&ctx.layers.annotated(), ctx.mode, is_tty));
    Ok(())
}
