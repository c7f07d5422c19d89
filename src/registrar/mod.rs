//! Fleet Registrar: admits data-plane proxies via their cluster's API key,
//! tracks liveness through periodic heartbeats, and reaps proxies that stop
//! reporting in.
//!
//! A cluster's effective capacity is `min(cluster.max_proxies,
//! license.effective_max_proxies())` — the license can only ever shrink a
//! cluster's ceiling, never raise it above what the cluster itself allows.

pub mod reaper;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use crate::auth::hashing::verify_cluster_api_key;
use crate::domain::{Cluster, ClusterId, Proxy, ProxyId, ProxyStatus};
use crate::errors::{AuthErrorReason, MarchProxyError, Result};
use crate::storage::repositories::{AuditEvent, AuditLogRepository, ClusterRepository, ProxyRepository};
use crate::storage::DbPool;

/// Outcome of a successful [`FleetRegistrar::register`] call.
#[derive(Debug, Clone)]
pub struct RegisterOutcome {
    pub proxy_id: ProxyId,
    pub cluster_id: ClusterId,
    pub status: ProxyStatus,
}

/// Outcome of a successful [`FleetRegistrar::heartbeat`] call.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatOutcome {
    pub acknowledged: bool,
    pub next_interval_seconds: i64,
}

/// Metrics reported by a heartbeat, currently opaque to the registrar
/// itself (forwarded to observability, not interpreted here).
#[derive(Debug, Clone, Default)]
pub struct HeartbeatMetrics {
    pub fields: serde_json::Value,
}

/// Filters accepted by [`FleetRegistrar::list_proxies`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ProxyFilter {
    pub status: Option<ProxyStatus>,
}

pub struct FleetRegistrar {
    pool: DbPool,
    clusters: ClusterRepository,
    proxies: ProxyRepository,
    audit: AuditLogRepository,
    stale_seconds: i64,
    retire_seconds: i64,
}

impl FleetRegistrar {
    pub fn new(pool: DbPool, stale_seconds: i64, retire_seconds: i64) -> Self {
        Self {
            clusters: ClusterRepository::new(pool.clone()),
            proxies: ProxyRepository::new(pool.clone()),
            audit: AuditLogRepository::new(pool.clone()),
            pool,
            stale_seconds,
            retire_seconds,
        }
    }

    /// Finds the active cluster whose API key hash matches `cluster_api_key`.
    /// Shared with [`crate::distributor`], which authenticates the same way
    /// against the same cluster set.
    #[instrument(skip(self, cluster_api_key))]
    pub async fn authenticate_cluster(&self, cluster_api_key: &str) -> Result<Cluster> {
        authenticate_cluster_key(&self.clusters, cluster_api_key).await
    }

    /// Admits a proxy into its cluster's fleet, reusing a stale/retired slot
    /// keyed by `(cluster_id, name)` instead of creating a duplicate row.
    #[instrument(skip(self, cluster_api_key, capabilities), fields(proxy_name = name))]
    #[allow(clippy::too_many_arguments)]
    pub async fn register(
        &self,
        cluster_api_key: &str,
        name: &str,
        hostname: &str,
        address: &str,
        port: i32,
        version: &str,
        capabilities: Vec<String>,
        license_max_proxies: i64,
    ) -> Result<RegisterOutcome> {
        let cluster = self.authenticate_cluster(cluster_api_key).await?;
        let existing = self.proxies.find_by_cluster_and_name(&cluster.id, name).await?;

        let mut tx = self.pool.begin().await.map_err(|e| MarchProxyError::Database {
            source: e,
            context: "failed to begin registration transaction".to_string(),
        })?;

        let active_count = self.proxies.count_active_in_tx(&mut tx, &cluster.id).await?;
        let already_counts = existing.as_ref().map(|p| p.status.counts_against_capacity()).unwrap_or(false);
        let effective_capacity = cluster.max_proxies.min(license_max_proxies);
        let count_after = if already_counts { active_count } else { active_count + 1 };

        if count_after > effective_capacity {
            tx.rollback().await.ok();
            warn!(cluster_id = %cluster.id, "registration rejected: fleet at capacity");
            return Err(MarchProxyError::capacity(format!(
                "cluster {} is at capacity ({}/{})",
                cluster.id, active_count, effective_capacity
            )));
        }

        let proxy = match existing {
            Some(mut proxy) => {
                proxy.reregister(hostname, address, port, version, capabilities);
                self.proxies.update_in_tx(&mut tx, &proxy).await?;
                proxy
            }
            None => {
                let proxy = Proxy::new(cluster.id.clone(), name, hostname, address, port, version, capabilities);
                self.proxies.insert_in_tx(&mut tx, &proxy).await?;
                proxy
            }
        };

        tx.commit().await.map_err(|e| MarchProxyError::Database {
            source: e,
            context: "failed to commit registration transaction".to_string(),
        })?;

        self.audit
            .record(
                AuditEvent::new("proxy.registered", "fleet_registrar", "proxy", proxy.id.as_str())
                    .with_metadata(serde_json::json!({ "cluster_id": cluster.id.as_str(), "name": proxy.name })),
            )
            .await?;

        info!(proxy_id = %proxy.id, cluster_id = %cluster.id, "proxy registered");
        Ok(RegisterOutcome { proxy_id: proxy.id, cluster_id: cluster.id, status: proxy.status })
    }

    /// Records a liveness heartbeat. Idempotent: repeating the same
    /// heartbeat has no further effect beyond refreshing `last_heartbeat`.
    /// An unknown proxy name is an `auth` failure (the expected remedy is to
    /// call [`Self::register`] again), not a `not_found`.
    #[instrument(skip(self, cluster_api_key, capabilities, _metrics), fields(proxy_name = proxy_name))]
    pub async fn heartbeat(
        &self,
        cluster_api_key: &str,
        proxy_name: &str,
        version: &str,
        capabilities: Vec<String>,
        config_version: Option<String>,
        _metrics: Option<HeartbeatMetrics>,
    ) -> Result<HeartbeatOutcome> {
        let cluster = self.authenticate_cluster(cluster_api_key).await?;
        let mut proxy = self
            .proxies
            .find_by_cluster_and_name(&cluster.id, proxy_name)
            .await?
            .ok_or_else(|| MarchProxyError::auth("unknown proxy, re-register", AuthErrorReason::UnknownProxy))?;

        if proxy.status == ProxyStatus::Retired {
            return Err(MarchProxyError::auth("proxy has been retired, re-register", AuthErrorReason::UnknownProxy));
        }

        proxy.record_heartbeat(version, capabilities);
        proxy.config_version = config_version;
        self.proxies.update(&proxy).await?;

        Ok(HeartbeatOutcome { acknowledged: true, next_interval_seconds: self.stale_seconds / 4 })
    }

    #[instrument(skip(self))]
    pub async fn list_proxies(&self, cluster_id: &ClusterId, filter: ProxyFilter) -> Result<Vec<Proxy>> {
        let proxies = self.proxies.list_by_cluster(cluster_id).await?;
        Ok(match filter.status {
            Some(status) => proxies.into_iter().filter(|p| p.status == status).collect(),
            None => proxies,
        })
    }

    /// Sweeps every non-retired proxy, marking it stale or retired once its
    /// heartbeat falls behind the configured thresholds. Returns the number
    /// of proxies whose status changed.
    #[instrument(skip(self))]
    pub async fn reap(&self, now: DateTime<Utc>) -> Result<usize> {
        let proxies = self.proxies.list_non_retired().await?;
        let mut changed = 0usize;

        for mut proxy in proxies {
            let before = proxy.status;
            if proxy.is_retirable(now, self.retire_seconds) {
                proxy.status = ProxyStatus::Retired;
            } else if proxy.is_stale(now, self.stale_seconds) {
                proxy.status = ProxyStatus::Stale;
            }

            if proxy.status != before {
                proxy.updated_at = now;
                self.proxies.update(&proxy).await?;
                self.audit
                    .record(
                        AuditEvent::new("proxy.reaped", "fleet_registrar_reaper", "proxy", proxy.id.as_str())
                            .with_metadata(serde_json::json!({ "from": before.as_str(), "to": proxy.status.as_str() })),
                    )
                    .await?;
                changed += 1;
            }
        }

        Ok(changed)
    }
}

/// Finds the active cluster whose API key digest matches `cluster_api_key`.
///
/// The key is stored as an HMAC-SHA256 digest, compared in constant time --
/// not Argon2id, which is priced for human-password brute-force resistance
/// and would make this linear scan over every active cluster expensive at
/// fleet scale for no security benefit against a high-entropy generated
/// key. A linear scan over active clusters is still acceptable at fleet
/// scale; each comparison's cost no longer depends on the candidate cluster,
/// so scanning in order reveals nothing about where a match was found.
pub async fn authenticate_cluster_key(clusters: &ClusterRepository, cluster_api_key: &str) -> Result<Cluster> {
    let active = clusters.list_active().await?;
    for cluster in active {
        if verify_cluster_api_key(cluster_api_key, &cluster.api_key_hash)? {
            return Ok(cluster);
        }
    }
    Err(MarchProxyError::auth("cluster authentication failed", AuthErrorReason::InvalidCredential))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::hashing::hash_cluster_api_key;
    use crate::storage::test_helpers::TestDatabase;

    const API_KEY: &str = "test-cluster-api-key";

    async fn registrar_with_cluster(stale: i64, retire: i64, max_proxies: i64) -> (FleetRegistrar, Cluster) {
        let db = TestDatabase::new("registrar").await;
        let mut cluster = Cluster::new("default", hash_cluster_api_key(API_KEY), max_proxies);
        cluster.is_default = true;
        ClusterRepository::new(db.pool.clone()).create(&cluster).await.unwrap();

        let registrar = FleetRegistrar::new(db.pool.clone(), stale, retire);
        (registrar, cluster)
    }

    #[tokio::test]
    async fn registers_a_new_proxy_as_registering() {
        let (registrar, cluster) = registrar_with_cluster(600, 1800, 5).await;
        let outcome = registrar
            .register(API_KEY, "proxy-1", "host-1", "10.0.0.1", 8443, "1.0.0", vec!["tcp".into()], 100)
            .await
            .unwrap();
        assert_eq!(outcome.cluster_id, cluster.id);
        assert_eq!(outcome.status, ProxyStatus::Registering);
    }

    #[tokio::test]
    async fn rejects_registration_with_a_bad_api_key() {
        let (registrar, _cluster) = registrar_with_cluster(600, 1800, 5).await;
        let err = registrar
            .register("wrong-key", "proxy-1", "host-1", "10.0.0.1", 8443, "1.0.0", vec![], 100)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "auth");
    }

    #[tokio::test]
    async fn rejects_registration_once_capacity_is_reached() {
        let (registrar, _cluster) = registrar_with_cluster(600, 1800, 1).await;

        registrar.register(API_KEY, "proxy-1", "h", "10.0.0.1", 1, "1.0", vec![], 100).await.unwrap();
        let err = registrar.register(API_KEY, "proxy-2", "h", "10.0.0.2", 1, "1.0", vec![], 100).await.unwrap_err();
        assert_eq!(err.kind(), "capacity");
    }

    #[tokio::test]
    async fn heartbeat_promotes_registering_to_active_and_is_idempotent() {
        let (registrar, cluster) = registrar_with_cluster(600, 1800, 5).await;
        registrar.register(API_KEY, "proxy-1", "h", "10.0.0.1", 1, "1.0", vec![], 100).await.unwrap();

        let first = registrar.heartbeat(API_KEY, "proxy-1", "1.0.1", vec![], None, None).await.unwrap();
        assert!(first.acknowledged);
        let second = registrar.heartbeat(API_KEY, "proxy-1", "1.0.1", vec![], None, None).await.unwrap();
        assert!(second.acknowledged);

        let proxies = registrar.list_proxies(&cluster.id, ProxyFilter::default()).await.unwrap();
        assert_eq!(proxies[0].status, ProxyStatus::Active);
    }

    #[tokio::test]
    async fn heartbeat_for_an_unknown_proxy_is_an_auth_failure() {
        let (registrar, _cluster) = registrar_with_cluster(600, 1800, 5).await;
        let err = registrar.heartbeat(API_KEY, "ghost", "1.0", vec![], None, None).await.unwrap_err();
        assert_eq!(err.kind(), "auth");
    }

    #[tokio::test]
    async fn reap_marks_overdue_proxies_stale_then_retired() {
        let (registrar, cluster) = registrar_with_cluster(10, 20, 5).await;
        registrar.register(API_KEY, "proxy-1", "h", "10.0.0.1", 1, "1.0", vec![], 100).await.unwrap();

        let soon_stale = Utc::now() + chrono::Duration::seconds(11);
        let changed = registrar.reap(soon_stale).await.unwrap();
        assert_eq!(changed, 1);
        let proxies = registrar.list_proxies(&cluster.id, ProxyFilter::default()).await.unwrap();
        assert_eq!(proxies[0].status, ProxyStatus::Stale);

        let past_retire = soon_stale + chrono::Duration::seconds(21);
        let changed = registrar.reap(past_retire).await.unwrap();
        assert_eq!(changed, 1);
        let proxies = registrar.list_proxies(&cluster.id, ProxyFilter::default()).await.unwrap();
        assert_eq!(proxies[0].status, ProxyStatus::Retired);
    }
}
