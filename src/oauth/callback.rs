use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;

use crate::error::{AuthError, ProtocolViolation};

/// Query parameters delivered to the redirect URI.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl std::fmt::Debug for CallbackParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackParams")
            .field("code", &self.code.as_ref().map(|_| "<redacted>"))
            .field("state", &self.state.as_ref().map(|_| "<redacted>"))
            .field("error", &self.error)
            .field("error_description", &self.error_description)
            .finish()
    }
}

impl CallbackParams {
    /// Parse a raw query string (with or without the leading `?`). Empty
    /// values count as absent.
    pub fn from_query(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut params = Self::default();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            if value.is_empty() {
                continue;
            }
            let slot = match &*key {
                "code" => &mut params.code,
                "state" => &mut params.state,
                "error" => &mut params.error,
                "error_description" => &mut params.error_description,
                _ => continue,
            };
            slot.get_or_insert_with(|| value.into_owned());
        }
        params
    }

    /// Parse the full URL the browser landed on.
    pub fn from_url(redirect: &str) -> Result<Self, AuthError> {
        let url = Url::parse(redirect).map_err(|e| {
            AuthError::Configuration(format!("Invalid callback URL '{redirect}': {e}"))
        })?;
        Ok(Self::from_query(url.query().unwrap_or_default()))
    }

    /// The provider's message when it reported an error instead of a code.
    pub fn provider_error(&self) -> Option<&str> {
        self.error
            .as_deref()
            .map(|error| self.error_description.as_deref().unwrap_or(error))
    }
}

/// Wait for the identity provider to redirect the browser to a loopback
/// redirect URI, and return the parameters it carried.
pub async fn listen_for_callback(
    port: u16,
    timeout: Duration,
) -> Result<CallbackParams, AuthError> {
    let listener = TcpListener::bind(format!("127.0.0.1:{port}")).await?;

    let accept_future = async {
        let (mut stream, _) = listener.accept().await?;

        let mut buf = vec![0u8; 8192];
        let n = stream.read(&mut buf).await?;
        let request = String::from_utf8_lossy(&buf[..n]);

        let params = parse_request_line(&request)
            .ok_or(AuthError::Protocol(ProtocolViolation::MissingCodeOrState))?;

        let body = if params.provider_error().is_some() {
            "<!DOCTYPE html><html><body><h1>Authentication failed</h1>\
             <p>Return to the terminal for details.</p></body></html>"
        } else {
            "<!DOCTYPE html><html><body><h1>Authentication received</h1>\
             <p>You can close this window and return to the terminal.</p></body></html>"
        };
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).await?;
        stream.shutdown().await?;

        Ok::<CallbackParams, AuthError>(params)
    };

    tokio::time::timeout(timeout, accept_future)
        .await
        .map_err(|_| {
            AuthError::IoError(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!(
                    "Timed out waiting for OIDC callback after {}ms",
                    timeout.as_millis()
                ),
            ))
        })?
}

/// Extract the query from "GET /callback?code=... HTTP/1.1".
fn parse_request_line(request: &str) -> Option<CallbackParams> {
    let first_line = request.lines().next()?;
    let path = first_line.split_whitespace().nth(1)?;
    let (_, query) = path.split_once('?')?;
    Some(CallbackParams::from_query(query))
}
