//! Cluster: the operational boundary grouping proxies, services, mappings,
//! and certificates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::ClusterId;

/// Logging configuration distributed to every proxy in a cluster's config
/// snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    pub endpoint: Option<String>,
    pub level: String,
    pub access_log_enabled: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { endpoint: None, level: "info".to_string(), access_log_enabled: true }
    }
}

/// A logical boundary grouping proxies and services.
///
/// Invariant: a cluster API key maps to at most one cluster; rotation
/// atomically replaces `api_key_hash`, invalidating the previous value the
/// instant the update commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub id: ClusterId,
    pub name: String,
    /// Argon2id hash of the cluster API key. The raw key is never persisted
    /// and is only ever shown once, at creation or rotation time.
    #[serde(skip_serializing)]
    pub api_key_hash: String,
    pub max_proxies: i64,
    pub logging: LoggingConfig,
    pub is_default: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cluster {
    pub fn new(name: impl Into<String>, api_key_hash: impl Into<String>, max_proxies: i64) -> Self {
        let now = Utc::now();
        Self {
            id: ClusterId::new(),
            name: name.into(),
            api_key_hash: api_key_hash.into(),
            max_proxies,
            logging: LoggingConfig::default(),
            is_default: false,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }
}
