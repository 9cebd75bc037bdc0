// Loopback redirect listener
// Receives the authorization code on http://localhost:<port>

use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

use crate::error::AuthError;

const SUCCESS_HTML: &str = "<html><body><h1>Signed in to Microsoft 365</h1><p>You may close this window and return to your assistant.</p></body></html>";
const ERROR_HTML: &str =
    "<html><body><h1>Sign-in failed</h1><p>You may close this window and retry.</p></body></html>";

/// Query parameters the identity provider appends to the redirect URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CallbackPayload {
    pub(crate) code: Option<String>,
    pub(crate) state: Option<String>,
    pub(crate) error: Option<String>,
    pub(crate) error_description: Option<String>,
}

/// Listens on both loopback families; `localhost` may resolve to either
#[derive(Debug)]
pub(crate) struct CallbackListener {
    port: u16,
    v4: Option<TcpListener>,
    v6: Option<TcpListener>,
}

impl CallbackListener {
    /// Bind 127.0.0.1 and ::1 on the same port; port 0 picks an ephemeral port.
    /// One family failing is tolerated as long as the other is bound.
    pub(crate) async fn bind(port: u16) -> Result<Self, AuthError> {
        let mut bind_errors = Vec::new();

        let v4 = match TcpListener::bind(("127.0.0.1", port)).await {
            Ok(listener) => Some(listener),
            Err(e) => {
                bind_errors.push(format!("127.0.0.1:{} ({})", port, e));
                None
            }
        };
        let port = match &v4 {
            Some(listener) => local_port(listener)?,
            None => port,
        };

        let v6 = match TcpListener::bind(("::1", port)).await {
            Ok(listener) => Some(listener),
            Err(e) => {
                bind_errors.push(format!("[::1]:{} ({})", port, e));
                None
            }
        };
        let port = match (&v4, &v6) {
            (None, Some(listener)) => local_port(listener)?,
            (None, None) => {
                return Err(AuthError::Callback(format!(
                    "bind failed: {}",
                    bind_errors.join("; ")
                )))
            }
            _ => port,
        };
        if !bind_errors.is_empty() {
            tracing::debug!("Loopback listener partially bound: {}", bind_errors.join("; "));
        }

        Ok(Self { port, v4, v6 })
    }

    pub(crate) fn port(&self) -> u16 {
        self.port
    }

    pub(crate) fn redirect_uri(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    /// Wait for the redirect, optionally bounded by `timeout`
    pub(crate) async fn wait(
        self,
        expected_state: &str,
        timeout: Option<Duration>,
    ) -> Result<CallbackPayload, AuthError> {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, self.accept_loop(expected_state))
                .await
                .map_err(|_| {
                    AuthError::Callback(format!(
                        "no sign-in response within {} seconds",
                        limit.as_secs()
                    ))
                })?,
            None => self.accept_loop(expected_state).await,
        }
    }

    /// Serve requests until one carries a code or an error, then validate its state.
    /// Browsers also ask for things like `/favicon.ico`; those get a 404 and the wait continues.
    async fn accept_loop(&self, expected_state: &str) -> Result<CallbackPayload, AuthError> {
        loop {
            let mut socket = self
                .accept()
                .await
                .map_err(|e| AuthError::Callback(format!("accept failed: {}", e)))?;

            let target = match read_request_target(&mut socket).await {
                Ok(target) => target,
                Err(e) => {
                    tracing::debug!("Ignoring malformed loopback request: {}", e);
                    respond(&mut socket, "400 Bad Request", ERROR_HTML).await;
                    continue;
                }
            };

            let Some(payload) = parse_callback_target(&target) else {
                respond(&mut socket, "404 Not Found", "").await;
                continue;
            };

            if let Err(e) = validate_state(&payload, expected_state) {
                respond(&mut socket, "400 Bad Request", ERROR_HTML).await;
                return Err(e);
            }

            if payload.error.is_some() {
                respond(&mut socket, "400 Bad Request", ERROR_HTML).await;
            } else {
                respond(&mut socket, "200 OK", SUCCESS_HTML).await;
            }
            return Ok(payload);
        }
    }

    async fn accept(&self) -> std::io::Result<TcpStream> {
        let (socket, _) = match (&self.v4, &self.v6) {
            (Some(v4), Some(v6)) => tokio::select! {
                accepted = v4.accept() => accepted?,
                accepted = v6.accept() => accepted?,
            },
            (Some(listener), None) | (None, Some(listener)) => listener.accept().await?,
            (None, None) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::NotConnected,
                    "no loopback listener bound",
                ))
            }
        };
        Ok(socket)
    }
}

fn local_port(listener: &TcpListener) -> Result<u16, AuthError> {
    listener
        .local_addr()
        .map(|addr| addr.port())
        .map_err(|e| AuthError::Callback(format!("local_addr failed: {}", e)))
}

async fn read_request_target(socket: &mut TcpStream) -> Result<String, String> {
    let mut buffer = vec![0u8; 8192];
    let size = socket
        .read(&mut buffer)
        .await
        .map_err(|e| format!("read failed: {}", e))?;
    if size == 0 {
        return Err("empty request".to_string());
    }

    let request = String::from_utf8_lossy(&buffer[..size]);
    let first = request.lines().next().ok_or("missing request line")?;
    let mut parts = first.split_whitespace();
    let method = parts.next().unwrap_or_default();
    let target = parts.next().unwrap_or_default();
    if method != "GET" || target.is_empty() {
        return Err(format!("unexpected request line: {}", first));
    }
    Ok(target.to_string())
}

/// `None` when the request carries neither `code` nor `error`
pub(crate) fn parse_callback_target(target: &str) -> Option<CallbackPayload> {
    let url = Url::parse(&format!("http://localhost{}", target)).ok()?;

    let mut payload = CallbackPayload {
        code: None,
        state: None,
        error: None,
        error_description: None,
    };
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => payload.code = Some(value.into_owned()),
            "state" => payload.state = Some(value.into_owned()),
            "error" => payload.error = Some(value.into_owned()),
            "error_description" => payload.error_description = Some(value.into_owned()),
            _ => {}
        }
    }

    if payload.code.is_none() && payload.error.is_none() {
        return None;
    }
    Some(payload)
}

fn validate_state(payload: &CallbackPayload, expected_state: &str) -> Result<(), AuthError> {
    match payload.state.as_deref() {
        Some(state) if state == expected_state => Ok(()),
        Some(_) => Err(AuthError::Callback("state mismatch".to_string())),
        None => Err(AuthError::Callback("missing state".to_string())),
    }
}

async fn respond(socket: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}
