//! Wire types and the transport seam of the sync engine

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of a sync exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRequest {
    /// SHA-256 hex of the local user file
    pub config_hash: String,
    /// Base64 of the (possibly encrypted) live configuration
    pub config_data: String,
}

/// Server reply when it holds a different configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResponse {
    pub hash: String,
    /// Base64 string of the encoded configuration, or a plain JSON mapping
    pub config: Value,
}

/// Metadata attached to a pushed configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMetadata {
    pub version: String,
    pub modified: DateTime<Utc>,
    pub checksum: String,
}

/// Body of a named push
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushRequest {
    pub config: String,
    pub metadata: PushMetadata,
}

/// Moves sync payloads to and from the remote counterpart
///
/// Implementations must give up after their own timeout and report that
/// as [`Error::Network`](crate::Error::Network).
pub trait SyncTransport: Send + Sync {
    /// Send the local state; `None` means the server has nothing newer
    ///
    /// # Errors
    ///
    /// Returns a network error if the exchange fails.
    fn exchange(&self, request: &SyncRequest) -> Result<Option<SyncResponse>>;

    /// Store the configuration remotely under `name`
    ///
    /// # Errors
    ///
    /// Returns a network error if the server does not accept it.
    fn push(&self, name: &str, request: &PushRequest) -> Result<()>;

    /// List the configurations stored remotely
    ///
    /// # Errors
    ///
    /// Returns a network error if the listing fails.
    fn fetch_configs(&self) -> Result<Value>;
}

#[cfg(feature = "http")]
pub use http::HttpTransport;

#[cfg(feature = "http")]
mod http {
    use super::{PushRequest, SyncRequest, SyncResponse, SyncTransport};
    use crate::error::{Error, Result};

    use log::debug;
    use reqwest::StatusCode;
    use reqwest::blocking::{Client, RequestBuilder, Response};
    use serde_json::Value;
    use std::time::Duration;

    /// [`SyncTransport`] over blocking HTTP
    pub struct HttpTransport {
        client: Client,
        endpoint: String,
        token: Option<String>,
    }

    impl HttpTransport {
        /// # Errors
        ///
        /// Returns [`Error::Network`] if the HTTP client cannot be built.
        pub fn new(endpoint: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
            let client = Client::builder()
                .timeout(timeout)
                .user_agent(concat!("confkeep/", env!("CARGO_PKG_VERSION")))
                .build()
                .map_err(|e| Error::Network(format!("http client: {e}")))?;

            Ok(Self {
                client,
                endpoint: endpoint.trim_end_matches('/').to_string(),
                token,
            })
        }

        pub fn endpoint(&self) -> &str {
            &self.endpoint
        }

        fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
            match &self.token {
                Some(token) => builder.bearer_auth(token),
                None => builder,
            }
        }

        fn send(&self, builder: RequestBuilder, what: &str) -> Result<Response> {
            let response = self
                .authorized(builder)
                .send()
                .map_err(|e| Error::Network(format!("{what} failed: {e}")))?;

            if !response.status().is_success() {
                return Err(Error::Network(format!(
                    "HTTP {} during {what}",
                    response.status()
                )));
            }
            Ok(response)
        }
    }

    impl SyncTransport for HttpTransport {
        fn exchange(&self, request: &SyncRequest) -> Result<Option<SyncResponse>> {
            let response = self.send(self.client.post(&self.endpoint).json(request), "sync")?;
            if response.status() == StatusCode::NO_CONTENT {
                return Ok(None);
            }

            let body = response
                .text()
                .map_err(|e| Error::Network(format!("reading sync response: {e}")))?;
            if body.trim().is_empty() {
                debug!("Empty sync response");
                return Ok(None);
            }

            serde_json::from_str(&body)
                .map(Some)
                .map_err(|e| Error::Network(format!("invalid sync response: {e}")))
        }

        fn push(&self, name: &str, request: &PushRequest) -> Result<()> {
            let url = format!("{}/configs/{name}", self.endpoint);
            self.send(self.client.post(url).json(request), "push")?;
            Ok(())
        }

        fn fetch_configs(&self) -> Result<Value> {
            let url = format!("{}/configs", self.endpoint);
            self.send(self.client.get(url), "fetch")?
                .json()
                .map_err(|e| Error::Network(format!("invalid configs response: {e}")))
        }
    }

    impl std::fmt::Debug for HttpTransport {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("HttpTransport")
                .field("endpoint", &self.endpoint)
                .field("token", &self.token.as_ref().map(|_| "<redacted>"))
                .finish_non_exhaustive()
        }
    }

}
