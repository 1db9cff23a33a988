//! Remote 2FA backend client
//!
//! Three calls: `POST {endpoint}/revoke-2fa`, `POST {endpoint}/generate-new-2fa`
//! and a heartbeat `GET {endpoint}`. Only the HTTP status drives decisions;
//! bodies are passed through for logging.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Timeout applied to every remote call
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Body of the revoke call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokeRequest {
    pub action: String,
    pub reason: String,
    pub failed_attempts: u32,
    /// UTC, `YYYY-MM-DDTHH:MM:SSZ`
    pub timestamp: String,
    pub client_id: String,
}

impl RevokeRequest {
    /// Revoke request for a brute-force lockout
    pub fn security_breach(
        failed_attempts: u32,
        at: chrono::DateTime<chrono::Utc>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            action: "revoke_2fa".to_string(),
            reason: "security_breach".to_string(),
            failed_attempts,
            timestamp: at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            client_id: client_id.into(),
        }
    }
}

/// Status and raw body of a remote response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Errors that prevent a remote call from producing a response
#[derive(Debug, thiserror::Error)]
pub enum RevocationError {
    #[error("invalid API endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Remote backend used for revocation and heartbeats
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Invalidate the active code
    async fn revoke(&self, request: &RevokeRequest) -> Result<ApiResponse, RevocationError>;

    /// Ask the backend to issue a fresh code
    async fn generate_new_code(&self) -> Result<ApiResponse, RevocationError>;

    /// Generic call made after a successful challenge
    async fn heartbeat(&self) -> Result<ApiResponse, RevocationError>;
}

/// `reqwest`-backed implementation of `RemoteApi`
#[derive(Debug, Clone)]
pub struct HttpRemoteApi {
    client: reqwest::Client,
    endpoint: reqwest::Url,
    authorization: String,
}

impl HttpRemoteApi {
    pub fn new(endpoint: &str, token: &str) -> Result<Self, RevocationError> {
        let endpoint = reqwest::Url::parse(endpoint.trim_end_matches('/')).map_err(|e| {
            RevocationError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            }
        })?;

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(RevocationError::Client)?;

        Ok(Self {
            client,
            endpoint,
            authorization: bearer(token),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint.as_str().trim_end_matches('/'), path)
    }

    async fn finish(response: reqwest::Response) -> Result<ApiResponse, RevocationError> {
        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(status, body_len = body.len(), "remote call completed");
        Ok(ApiResponse { status, body })
    }
}

#[async_trait]
impl RemoteApi for HttpRemoteApi {
    async fn revoke(&self, request: &RevokeRequest) -> Result<ApiResponse, RevocationError> {
        let response = self
            .client
            .post(self.url("revoke-2fa"))
            .header(AUTHORIZATION, self.authorization.as_str())
            .json(request)
            .send()
            .await?;
        Self::finish(response).await
    }

    async fn generate_new_code(&self) -> Result<ApiResponse, RevocationError> {
        let response = self
            .client
            .post(self.url("generate-new-2fa"))
            .header(AUTHORIZATION, self.authorization.as_str())
            .send()
            .await?;
        Self::finish(response).await
    }

    async fn heartbeat(&self) -> Result<ApiResponse, RevocationError> {
        let response = self
            .client
            .get(self.endpoint.clone())
            .header(AUTHORIZATION, self.authorization.as_str())
            .send()
            .await?;
        Self::finish(response).await
    }
}

/// Stand-in used when the configured endpoint cannot be parsed; every call fails
#[derive(Debug, Clone)]
pub struct UnconfiguredApi {
    endpoint: String,
    reason: String,
}

impl UnconfiguredApi {
    pub fn new(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    fn fail(&self) -> Result<ApiResponse, RevocationError> {
        Err(RevocationError::InvalidEndpoint {
            endpoint: self.endpoint.clone(),
            reason: self.reason.clone(),
        })
    }
}

#[async_trait]
impl RemoteApi for UnconfiguredApi {
    async fn revoke(&self, _request: &RevokeRequest) -> Result<ApiResponse, RevocationError> {
        self.fail()
    }

    async fn generate_new_code(&self) -> Result<ApiResponse, RevocationError> {
        self.fail()
    }

    async fn heartbeat(&self) -> Result<ApiResponse, RevocationError> {
        self.fail()
    }
}

/// Authorization header value; tokens may already carry the scheme
fn bearer(token: &str) -> String {
    let token = token.trim();
    let has_scheme = token
        .get(..7)
        .map_or(false, |scheme| scheme.eq_ignore_ascii_case("bearer "));
    if has_scheme {
        token.to_string()
    } else {
        format!("Bearer {}", token)
    }
}

#[cfg(test)]
pub mod testing {
    //! In-memory `RemoteApi` for tests

    use std::sync::Mutex;

    use super::*;

    /// Scripted response: a status code, or `None` for an unreachable backend
    #[derive(Debug, Default)]
    pub struct FakeApi {
        pub revoke_status: Option<u16>,
        pub generate_status: Option<u16>,
        pub heartbeat_status: Option<u16>,
        pub calls: Mutex<Vec<String>>,
        pub revoke_requests: Mutex<Vec<RevokeRequest>>,
    }

    impl FakeApi {
        pub fn answering(status: u16) -> Self {
            Self {
                revoke_status: Some(status),
                generate_status: Some(status),
                heartbeat_status: Some(status),
                ..Default::default()
            }
        }

        pub fn unreachable() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn reply(&self, call: &str, status: Option<u16>) -> Result<ApiResponse, RevocationError> {
            self.calls.lock().unwrap().push(call.to_string());
            match status {
                Some(status) => Ok(ApiResponse {
                    status,
                    body: format!("{{\"call\":\"{}\"}}", call),
                }),
                None => Err(RevocationError::InvalidEndpoint {
                    endpoint: "fake".to_string(),
                    reason: "unreachable".to_string(),
                }),
            }
        }
    }

    #[async_trait]
    impl RemoteApi for FakeApi {
        async fn revoke(&self, request: &RevokeRequest) -> Result<ApiResponse, RevocationError> {
            self.revoke_requests.lock().unwrap().push(request.clone());
            self.reply("revoke", self.revoke_status)
        }

        async fn generate_new_code(&self) -> Result<ApiResponse, RevocationError> {
            self.reply("generate", self.generate_status)
        }

        async fn heartbeat(&self) -> Result<ApiResponse, RevocationError> {
            self.reply("heartbeat", self.heartbeat_status)
        }
    }
}

#[cfg(test)]
pub mod test_server {
    //! Single-shot HTTP responder on a local port

    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve `status` to every request; returns the address and a request counter
    pub async fn respond_with(status: u16, body: &'static str) -> (SocketAddr, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                read_request(&mut stream).await;
                let response = format!(
                    "HTTP/1.1 {} Status\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        (addr, hits)
    }

    async fn read_request(stream: &mut tokio::net::TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf);
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + content_length {
                    return;
                }
            }
        }
    }
}
