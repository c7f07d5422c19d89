//! Config Distributor: renders per-cluster config snapshots for the
//! dataplane fleet and serves them, including a long-poll endpoint that
//! blocks until the snapshot changes.

pub mod canonical;

use std::collections::HashMap;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::watch;
use tracing::{instrument, warn};

use crate::domain::cluster::LoggingConfig;
use crate::domain::mapping::{Protocol, precedence_order};
use crate::domain::{Certificate, ClusterId, Mapping, Service, ServiceId};
use crate::errors::{MarchProxyError, Result};
use crate::registrar::authenticate_cluster_key;
use crate::storage::repositories::{CertificateRepository, ClusterRepository, MappingRepository, ServiceRepository};
use crate::storage::DbPool;

/// A resolved source/destination endpoint inside a rendered mapping.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EndpointRef {
    pub id: ServiceId,
    pub host: String,
    pub port: i32,
    pub transport: crate::domain::service::Transport,
}

/// A mapping's port list as served to proxies: ranges small enough to
/// enumerate are expanded, larger ranges are passed through as a range.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(untagged)]
pub enum RenderedPorts {
    List(Vec<u16>),
    Range { start: u16, end: u16 },
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RenderedMapping {
    pub id: String,
    pub name: String,
    pub sources: Vec<EndpointRef>,
    pub destinations: Vec<EndpointRef>,
    pub ports: Vec<RenderedPorts>,
    pub protocols: Vec<Protocol>,
    pub auth_required: bool,
    pub priority: i32,
}

/// A full config snapshot as served to a cluster or a single proxy.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConfigSnapshot {
    pub cluster_id: ClusterId,
    pub version: String,
    pub logging: LoggingConfig,
    pub services: Vec<Service>,
    pub mappings: Vec<RenderedMapping>,
    pub certificates: Vec<Certificate>,
}

/// Outcome of a [`ConfigDistributor::poll_changes`] call.
pub enum PollOutcome {
    Changed(ConfigSnapshot),
    NoChange,
}

pub struct ConfigDistributor {
    pool: DbPool,
    clusters: ClusterRepository,
    services: ServiceRepository,
    mappings: MappingRepository,
    certificates: CertificateRepository,
    watches: DashMap<ClusterId, watch::Sender<String>>,
}

impl ConfigDistributor {
    pub fn new(pool: DbPool, services: ServiceRepository) -> Self {
        Self {
            clusters: ClusterRepository::new(pool.clone()),
            mappings: MappingRepository::new(pool.clone()),
            certificates: CertificateRepository::new(pool.clone()),
            services,
            pool,
            watches: DashMap::new(),
        }
    }

    /// Renders the full snapshot for `cluster_id` from a single transaction
    /// so the read is over one consistent view of the store.
    #[instrument(skip(self), fields(cluster_id = %cluster_id))]
    async fn render(&self, cluster_id: &ClusterId) -> Result<ConfigSnapshot> {
        let mut tx = self.pool.begin().await.map_err(|e| MarchProxyError::Database {
            source: e,
            context: "failed to begin config render transaction".to_string(),
        })?;

        let cluster = self.clusters.get_by_id(cluster_id).await?;
        let services = self.services.list_active_by_cluster_in_tx(&mut tx, cluster_id).await?;
        let mut mappings = self.mappings.list_active_by_cluster_in_tx(&mut tx, cluster_id).await?;
        let certificates = self.certificates.list_active_for_cluster_in_tx(&mut tx, cluster_id).await?;
        tx.rollback().await.ok();

        mappings.sort_by(precedence_order);

        let canonical = canonical::canonical_bytes(&cluster.logging, &services, &mappings, &certificates);
        let version = canonical::version(&canonical);

        let by_id: HashMap<&ServiceId, &Service> = services.iter().map(|s| (&s.id, s)).collect();
        let rendered_mappings = mappings.iter().map(|m| render_mapping(m, &by_id)).collect();

        Ok(ConfigSnapshot {
            cluster_id: cluster_id.clone(),
            version,
            logging: cluster.logging,
            services,
            mappings: rendered_mappings,
            certificates,
        })
    }

    #[instrument(skip(self, cluster_api_key))]
    pub async fn get_cluster_config(&self, cluster_api_key: &str) -> Result<ConfigSnapshot> {
        let cluster = authenticate_cluster_key(&self.clusters, cluster_api_key).await?;
        self.render(&cluster.id).await
    }

    /// Same render as [`Self::get_cluster_config`], narrowed to what
    /// `proxy_name`'s advertised capabilities can act on: a mapping is
    /// dropped if none of its protocols match a capability the proxy
    /// reported at registration/heartbeat time.
    #[instrument(skip(self, cluster_api_key))]
    pub async fn get_proxy_config(&self, proxy_name: &str, cluster_api_key: &str, proxy_capabilities: &[String]) -> Result<ConfigSnapshot> {
        let cluster = authenticate_cluster_key(&self.clusters, cluster_api_key).await?;
        let mut snapshot = self.render(&cluster.id).await?;

        let capabilities: std::collections::HashSet<String> = proxy_capabilities.iter().map(|c| c.to_lowercase()).collect();
        if !capabilities.is_empty() {
            snapshot.mappings.retain(|m| {
                m.protocols.iter().any(|p| {
                    let name = match p {
                        Protocol::Tcp => "tcp",
                        Protocol::Udp => "udp",
                    };
                    capabilities.contains(name)
                })
            });
            let referenced: std::collections::HashSet<ServiceId> = snapshot
                .mappings
                .iter()
                .flat_map(|m| m.sources.iter().chain(m.destinations.iter()).map(|e| e.id.clone()))
                .collect();
            snapshot.services.retain(|s| referenced.contains(&s.id));
        }

        tracing::trace!(proxy_name, mapping_count = snapshot.mappings.len(), "rendered proxy-scoped config");
        Ok(snapshot)
    }

    /// Long-polls for a change to `last_seen_version`. Returns immediately
    /// if the current version already differs; otherwise waits up to
    /// `max_wait` for the version's `watch` channel to change. Dropping the
    /// returned future (e.g. the caller's connection closing) cancels the
    /// wait with no further effect, satisfying cancellation without a
    /// dedicated polling loop.
    #[instrument(skip(self, cluster_api_key))]
    pub async fn poll_changes(&self, cluster_api_key: &str, last_seen_version: &str, max_wait: Duration) -> Result<PollOutcome> {
        let cluster = authenticate_cluster_key(&self.clusters, cluster_api_key).await?;
        let mut rx = self.watch_for(&cluster.id).await?;

        if *rx.borrow() != last_seen_version {
            return Ok(PollOutcome::Changed(self.render(&cluster.id).await?));
        }

        match tokio::time::timeout(max_wait, rx.changed()).await {
            Ok(Ok(())) => Ok(PollOutcome::Changed(self.render(&cluster.id).await?)),
            Ok(Err(_)) => Err(MarchProxyError::internal("config version watch closed unexpectedly")),
            Err(_) => Ok(PollOutcome::NoChange),
        }
    }

    async fn watch_for(&self, cluster_id: &ClusterId) -> Result<watch::Receiver<String>> {
        if let Some(tx) = self.watches.get(cluster_id) {
            return Ok(tx.subscribe());
        }
        let version = self.render(cluster_id).await?.version;
        let (tx, _rx) = watch::channel(version);
        let entry = self.watches.entry(cluster_id.clone()).or_insert(tx);
        Ok(entry.subscribe())
    }

    /// Recomputes every cluster's version and notifies its watchers if it
    /// changed. Called from [`refresh::spawn`] on a fixed interval; cheap
    /// clusters with no active watcher are skipped entirely.
    #[instrument(skip(self))]
    pub async fn refresh_all(&self) -> Result<()> {
        let cluster_ids: Vec<ClusterId> = self.watches.iter().map(|e| e.key().clone()).collect();
        for cluster_id in cluster_ids {
            let snapshot = self.render(&cluster_id).await?;
            if let Some(tx) = self.watches.get(&cluster_id) {
                tx.send_if_modified(|current| {
                    if *current != snapshot.version {
                        *current = snapshot.version.clone();
                        true
                    } else {
                        false
                    }
                });
            }
        }
        Ok(())
    }
}

fn render_mapping(mapping: &Mapping, by_id: &HashMap<&ServiceId, &Service>) -> RenderedMapping {
    let resolve = |ids: &[ServiceId]| -> Vec<EndpointRef> {
        ids.iter()
            .filter_map(|id| match by_id.get(id) {
                Some(service) => Some(EndpointRef { id: id.clone(), host: service.host.clone(), port: service.port, transport: service.transport }),
                None => {
                    warn!(mapping_id = %mapping.id, service_id = %id, "mapping references a service missing from the active set, eliding it");
                    None
                }
            })
            .collect()
    };

    let ports = mapping
        .ports
        .iter()
        .map(|p| if p.is_expandable() { RenderedPorts::List(p.expand()) } else { match p {
            crate::domain::mapping::PortSpec::Range(lo, hi) => RenderedPorts::Range { start: *lo, end: *hi },
            crate::domain::mapping::PortSpec::Single(p) => RenderedPorts::List(vec![*p]),
        } })
        .collect();

    RenderedMapping {
        id: mapping.id.as_str().to_string(),
        name: mapping.name.clone(),
        sources: resolve(&mapping.source_services),
        destinations: resolve(&mapping.destination_services),
        ports,
        protocols: mapping.protocols.clone(),
        auth_required: mapping.auth_required,
        priority: mapping.priority,
    }
}

pub mod refresh {
    //! Background task keeping every watched cluster's version current so
    //! long-polling callers don't have to wait a full poll cycle to learn
    //! about a change another operator just made.

    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::watch;
    use tokio::task::JoinHandle;
    use tracing::{error, info};

    use super::ConfigDistributor;

    pub fn spawn(distributor: Arc<ConfigDistributor>, interval: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let mut ticker = tokio::time::interval(interval);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = distributor.refresh_all().await {
                            error!(error = %e, "config distributor refresh sweep failed");
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!("config distributor refresh loop shutting down");
                            break;
                        }
                    }
                }
            }
        })
    }
}
