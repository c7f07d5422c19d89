//! Proxy instance: a running data-plane process registered to a cluster.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{ClusterId, ProxyId};

/// Lifecycle state of a registered proxy.
///
/// ```text
///         register()        first heartbeat        timeout                retire-timeout
///   ─────▶ registering ────────────▶ active ───────────▶ stale ───────────▶ retired
///                                      ▲──heartbeat─────┘
/// ```
/// Transitions out of `Retired` require a new `register()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyStatus {
    Registering,
    Active,
    Stale,
    Retired,
}

impl ProxyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyStatus::Registering => "registering",
            ProxyStatus::Active => "active",
            ProxyStatus::Stale => "stale",
            ProxyStatus::Retired => "retired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "registering" => Some(ProxyStatus::Registering),
            "active" => Some(ProxyStatus::Active),
            "stale" => Some(ProxyStatus::Stale),
            "retired" => Some(ProxyStatus::Retired),
            _ => None,
        }
    }

    /// Non-retired statuses count against a cluster's `max_proxies` quota.
    pub fn counts_against_capacity(&self) -> bool {
        !matches!(self, ProxyStatus::Retired)
    }
}

/// A running data-plane process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proxy {
    pub id: ProxyId,
    pub cluster_id: ClusterId,
    pub name: String,
    pub hostname: String,
    pub address: String,
    pub port: i32,
    pub version: String,
    pub capabilities: Vec<String>,
    pub status: ProxyStatus,
    pub last_heartbeat: DateTime<Utc>,
    pub config_version: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Proxy {
    pub fn new(
        cluster_id: ClusterId,
        name: impl Into<String>,
        hostname: impl Into<String>,
        address: impl Into<String>,
        port: i32,
        version: impl Into<String>,
        capabilities: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ProxyId::new(),
            cluster_id,
            name: name.into(),
            hostname: hostname.into(),
            address: address.into(),
            port,
            version: version.into(),
            capabilities,
            status: ProxyStatus::Registering,
            last_heartbeat: now,
            config_version: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Re-registers a proxy slot reused from a stale/retired record instead
    /// of creating a duplicate. Identity and creation time are preserved.
    pub fn reregister(
        &mut self,
        hostname: impl Into<String>,
        address: impl Into<String>,
        port: i32,
        version: impl Into<String>,
        capabilities: Vec<String>,
    ) {
        self.hostname = hostname.into();
        self.address = address.into();
        self.port = port;
        self.version = version.into();
        self.capabilities = capabilities;
        self.status = ProxyStatus::Registering;
        self.last_heartbeat = Utc::now();
        self.updated_at = self.last_heartbeat;
    }

    pub fn record_heartbeat(&mut self, version: impl Into<String>, capabilities: Vec<String>) {
        self.last_heartbeat = Utc::now();
        self.updated_at = self.last_heartbeat;
        self.version = version.into();
        self.capabilities = capabilities;
        if self.status == ProxyStatus::Registering {
            self.status = ProxyStatus::Active;
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>, stale_threshold_secs: i64) -> bool {
        matches!(self.status, ProxyStatus::Registering | ProxyStatus::Active)
            && (now - self.last_heartbeat).num_seconds() > stale_threshold_secs
    }

    pub fn is_retirable(&self, now: DateTime<Utc>, retire_threshold_secs: i64) -> bool {
        self.status == ProxyStatus::Stale
            && (now - self.last_heartbeat).num_seconds() > retire_threshold_secs
    }
}
