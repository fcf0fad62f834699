use colored::Colorize;

use crate::config::ResolvedValue;
use crate::error::AuthError;
use crate::oauth::{DiscoveryDocument, TokenResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Bare values suitable for shell substitution.
    Plain,
    Json,
}

impl OutputMode {
    pub fn from_flag(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Plain
        }
    }
}

/// Plain mode prints only the access token so it can be captured by a shell.
pub fn format_token(token: &TokenResponse, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => serde_json::to_string_pretty(token).unwrap_or_default(),
        OutputMode::Plain => token.access_token.clone(),
    }
}

pub fn format_discovery(doc: &DiscoveryDocument, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => serde_json::to_string_pretty(doc).unwrap_or_default(),
        OutputMode::Plain => {
            let mut lines = vec![
                format!("issuer: {}", doc.issuer),
                format!("authorization_endpoint: {}", doc.authorization_endpoint),
                format!("token_endpoint: {}", doc.token_endpoint),
            ];
            let optional = [
                ("userinfo_endpoint", &doc.userinfo_endpoint),
                ("jwks_uri", &doc.jwks_uri),
                ("end_session_endpoint", &doc.end_session_endpoint),
            ];
            for (name, value) in optional {
                if let Some(value) = value {
                    lines.push(format!("{name}: {value}"));
                }
            }
            lines.join("\n")
        }
    }
}

pub fn format_config(values: &[ResolvedValue], mode: OutputMode, is_tty: bool) -> String {
    match mode {
        OutputMode::Json => {
            let entries: serde_json::Map<String, serde_json::Value> = values
                .iter()
                .map(|r| {
                    (
                        r.key.name().to_string(),
                        serde_json::json!({ "value": r.value, "source": r.source }),
                    )
                })
                .collect();
            serde_json::to_string_pretty(&entries).unwrap_or_default()
        }
        OutputMode::Plain => values
            .iter()
            .map(|r| {
                let source = format!("({})", r.source);
                let source = if is_tty {
                    source.dimmed().to_string()
                } else {
                    source
                };
                format!("{}={} {}", r.key.name(), r.value, source)
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

pub fn print_error(err: &AuthError, mode: OutputMode, is_tty: bool) {
    match mode {
        OutputMode::Json => {
            println!("{}", serde_json::to_string_pretty(&err.to_json()).unwrap_or_default());
        }
        OutputMode::Plain => {
            let label = if is_tty {
                "Error".red().bold().to_string()
            } else {
                "Error".to_string()
            };
            eprintln!("{label}: {err}");
        }
    }
}
