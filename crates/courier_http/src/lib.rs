//! An HTTP [`Transport`] for courier.
//!
//! Each batch is sent as one `POST` with a JSON body to the batched call
//! endpoint below the site root, by default `<wwwroot>/lib/ajax/service.php`.
//! The body of the reply is handed back untouched; the dispatcher decodes it.

use async_trait::async_trait;
use courier::Transport;
use courier_common::SiteConfig;
use courier_common::error::RemoteError;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use url::Url;

/// Path of the batched call endpoint below the site root.
pub const DEFAULT_SERVICE_PATH: &str = "/lib/ajax/service.php";

/// Settings for [`HttpTransport`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Site root, e.g. `https://school.example/moodle`.
    pub wwwroot: String,
    /// Endpoint path below the site root.
    ///
    /// ## Default
    /// `/lib/ajax/service.php`
    pub service_path: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self::from_site_config(&SiteConfig::default())
    }
}

impl HttpSettings {
    /// Settings for the default endpoint below `wwwroot`.
    pub fn new(wwwroot: impl Into<String>) -> Self {
        Self {
            wwwroot: wwwroot.into(),
            service_path: DEFAULT_SERVICE_PATH.to_string(),
        }
    }

    /// Settings for the default endpoint of the configured site.
    pub fn from_site_config(config: &SiteConfig) -> Self {
        Self::new(config.wwwroot.clone())
    }

    /// Absolute URL of the endpoint.
    pub fn endpoint(&self) -> Result<Url, RemoteError> {
        let joined = format!(
            "{}/{}",
            self.wwwroot.trim_end_matches('/'),
            self.service_path.trim_start_matches('/')
        );
        Url::parse(&joined)
            .map_err(|err| RemoteError::Transport(format!("invalid endpoint {}: {}", joined, err)))
    }
}

/// Sends batches over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpTransport {
    /// Creates a transport with a default client.
    pub fn new(settings: HttpSettings) -> Result<Self, RemoteError> {
        Self::with_client(reqwest::Client::new(), settings)
    }

    /// Creates a transport sharing an existing client, e.g. one carrying the
    /// session cookie.
    pub fn with_client(client: reqwest::Client, settings: HttpSettings) -> Result<Self, RemoteError> {
        let endpoint = settings.endpoint()?;
        debug!("HTTP transport posting to {}", endpoint);
        Ok(Self { client, endpoint })
    }

    /// The URL batches are posted to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    const TRANSPORT_NAME: &'static str = "HTTP";

    async fn round_trip(&self, body: Vec<u8>) -> Result<Vec<u8>, RemoteError> {
        trace!("Posting {} bytes to {}", body.len(), self.endpoint);
        let response = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .body(body)
            .send()
            .await
            .map_err(describe)?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Transport(format!("HTTP status {}", status)));
        }

        let bytes = response.bytes().await.map_err(describe)?;
        trace!("Received {} bytes", bytes.len());
        Ok(bytes.to_vec())
    }
}

fn describe(error: reqwest::Error) -> RemoteError {
    let kind = if error.is_timeout() {
        "Timeout"
    } else if error.is_connect() {
        "Connection Error"
    } else if error.is_body() || error.is_decode() {
        "Body Error"
    } else if error.is_request() {
        "Request Error"
    } else {
        "Error"
    };
    RemoteError::Transport(format!("{}: {}", kind, error))
}
