use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console_auth::cli::commands;
use console_auth::cli::{CliContext, OutputMode};

#[derive(Parser)]
#[command(name = "console-auth", version, about = "OAuth2/OIDC login for the catalog console")]
struct Cli {
    /// Runtime config file (JSON object of settings)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Session file holding the in-flight PKCE handshake
    #[arg(long, global = true, env = "CONSOLE_AUTH_SESSION")]
    session: Option<PathBuf>,

    /// JSON output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Obtain a token with the client-credentials grant
    Token {
        #[arg(long)]
        client_id: String,

        #[arg(long, env = "CONSOLE_AUTH_CLIENT_SECRET", hide_env_values = true)]
        client_secret: String,

        /// Defaults to POLARIS_PRINCIPAL_SCOPE
        #[arg(long)]
        scope: Option<String>,
    },

    /// Exchange a subject token using an existing access token
    Exchange {
        /// Access token of the current session
        #[arg(long, env = "CONSOLE_AUTH_ACCESS_TOKEN", hide_env_values = true)]
        bearer: String,

        #[arg(long)]
        subject_token: String,

        /// Defaults to urn:ietf:params:oauth:token-type:access_token
        #[arg(long)]
        subject_token_type: Option<String>,
    },

    /// Renew an access token through token exchange
    Refresh {
        #[arg(long, env = "CONSOLE_AUTH_ACCESS_TOKEN", hide_env_values = true)]
        access_token: String,
    },

    /// Fetch the provider's OpenID configuration
    Discover {
        /// Defaults to OIDC_ISSUER_URL
        #[arg(long)]
        issuer: Option<String>,
    },

    /// Start the Authorization Code + PKCE login
    Login {
        /// Print the authorization URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,

        /// Listen on the localhost redirect URI and finish the login in-process
        #[arg(long)]
        wait: bool,

        /// Callback timeout in milliseconds when using --wait
        #[arg(long, env = "CONSOLE_AUTH_CALLBACK_TIMEOUT_MS", default_value_t = 120000)]
        timeout_ms: u64,
    },

    /// Finish a login from the URL the browser was redirected to
    Callback {
        redirected_url: String,
    },

    /// Clear the session and any in-flight login
    Logout,

    /// Inspect resolved configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Display resolved settings with their sources
    Show,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("CONSOLE_AUTH_LOG_LEVEL")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mode = OutputMode::from_flag(cli.json);

    if let Err(e) = run(cli).await {
        console_auth::cli::output::print_error(&e, mode, std::io::stderr().is_terminal());
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), console_auth::AuthError> {
    let ctx = CliContext::load(cli.config.as_deref(), cli.session, cli.json)?;
    match cli.command {
        Commands::Token {
            client_id,
            client_secret,
            scope,
        } => commands::run_token(&ctx, &client_id, &client_secret, scope.as_deref()).await,
        Commands::Exchange {
            bearer,
            subject_token,
            subject_token_type,
        } => {
            commands::run_exchange(&ctx, &bearer, &subject_token, subject_token_type.as_deref())
                .await
        }
        Commands::Refresh { access_token } => commands::run_refresh(&ctx, &access_token).await,
        Commands::Discover { issuer } => commands::run_discover(&ctx, issuer.as_deref()).await,
        Commands::Login {
            no_browser,
            wait,
            timeout_ms,
        } => {
            let timeout = std::time::Duration::from_millis(timeout_ms);
            commands::run_login(&ctx, !no_browser, wait, timeout).await
        }
        Commands::Callback { redirected_url } => {
            commands::run_callback(&ctx, &redirected_url).await
        }
        Commands::Logout => commands::run_logout(&ctx).await,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::run_config_show(&ctx),
        },
    }
}
