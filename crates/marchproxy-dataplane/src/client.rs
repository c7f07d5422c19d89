//! Thin client for a proxy process: authenticates to the control plane with
//! its cluster API key, fetches its config snapshot, and long-polls for
//! changes. Deserializes its own mirror of the wire format rather than
//! depending on the control plane's domain crate -- this crate ships to
//! proxy hosts independently of the control plane binary.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{DataplaneError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub endpoint: Option<String>,
    pub level: String,
    pub access_log_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Tcp,
    Udp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointRef {
    pub id: String,
    pub host: String,
    pub port: i32,
    pub transport: Transport,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RenderedPorts {
    List(Vec<u16>),
    Range { start: u16, end: u16 },
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenderedMapping {
    pub id: String,
    pub name: String,
    pub sources: Vec<EndpointRef>,
    pub destinations: Vec<EndpointRef>,
    pub ports: Vec<RenderedPorts>,
    pub auth_required: bool,
    pub priority: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub id: String,
    pub name: String,
    pub host: String,
    pub port: i32,
    pub transport: Transport,
    pub auth_type: serde_json::Value,
    pub tls_enabled: bool,
    pub tls_verify: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CertificateConfig {
    pub id: String,
    pub pem: String,
    pub certificate_type: String,
}

/// Mirrors `marchproxy::distributor::ConfigSnapshot`'s wire shape.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSnapshot {
    pub cluster_id: String,
    pub version: String,
    pub logging: LoggingConfig,
    pub services: Vec<ServiceConfig>,
    pub mappings: Vec<RenderedMapping>,
    pub certificates: Vec<CertificateConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "outcome")]
enum PollResponse {
    Changed { snapshot: ConfigSnapshot },
    NoChange,
}

/// Result of a single poll cycle.
#[derive(Debug, Clone)]
pub enum PollOutcome {
    Changed(ConfigSnapshot),
    NoChange,
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    name: &'a str,
    hostname: &'a str,
    address: &'a str,
    port: i32,
    version: &'a str,
    capabilities: &'a [String],
}

#[derive(Debug, Deserialize)]
pub struct RegisterResponse {
    pub proxy_id: String,
    pub cluster_id: String,
    pub status: String,
}

/// Talks to one control plane base URL on behalf of one proxy process.
pub struct ControlPlaneClient {
    http: reqwest::Client,
    base_url: String,
    cluster_api_key: String,
}

impl ControlPlaneClient {
    pub fn new(base_url: impl Into<String>, cluster_api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder().build().expect("reqwest client builds with default settings"),
            base_url: base_url.into(),
            cluster_api_key: cluster_api_key.into(),
        }
    }

    pub async fn register(
        &self,
        name: &str,
        hostname: &str,
        address: &str,
        port: i32,
        version: &str,
        capabilities: &[String],
    ) -> Result<RegisterResponse> {
        let response = self
            .http
            .post(format!("{}/proxy/register", self.base_url))
            .header("x-cluster-api-key", &self.cluster_api_key)
            .json(&RegisterRequest { name, hostname, address, port, version, capabilities })
            .send()
            .await
            .map_err(|e| DataplaneError::ControlPlane { context: "registering with the control plane".to_string(), source: Some(e) })?;

        self.parse_json(response, "decoding register response").await
    }

    /// Long-polls `/config/poll` until a new version is available or
    /// `max_wait` elapses, whichever comes first. Cancellation-safe: the
    /// caller can wrap this in `tokio::select!` against its own shutdown
    /// signal without leaving the control plane mid-request in an
    /// inconsistent state, since the request is a single GET.
    pub async fn poll_changes(&self, since_version: &str, max_wait: Duration) -> Result<PollOutcome> {
        let response = self
            .http
            .get(format!("{}/config/poll", self.base_url))
            .header("x-cluster-api-key", &self.cluster_api_key)
            .query(&[("since_version", since_version), ("max_wait_seconds", &max_wait.as_secs().to_string())])
            .timeout(max_wait + Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| DataplaneError::ControlPlane { context: "polling for config changes".to_string(), source: Some(e) })?;

        let parsed: PollResponse = self.parse_json(response, "decoding poll response").await?;
        Ok(match parsed {
            PollResponse::Changed { snapshot } => PollOutcome::Changed(snapshot),
            PollResponse::NoChange => PollOutcome::NoChange,
        })
    }

    pub async fn get_cluster_config(&self) -> Result<ConfigSnapshot> {
        let response = self
            .http
            .get(format!("{}/config/cluster", self.base_url))
            .header("x-cluster-api-key", &self.cluster_api_key)
            .send()
            .await
            .map_err(|e| DataplaneError::ControlPlane { context: "fetching cluster config".to_string(), source: Some(e) })?;

        self.parse_json(response, "decoding config snapshot").await
    }

    async fn parse_json<T: for<'de> Deserialize<'de>>(&self, response: reqwest::Response, context: &str) -> Result<T> {
        if !response.status().is_success() {
            return Err(DataplaneError::ControlPlane { context: format!("{context}: HTTP {}", response.status()), source: None });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| DataplaneError::ControlPlane { context: context.to_string(), source: Some(e) })
    }
}
