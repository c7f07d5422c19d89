//! License Enforcer: validates a cached license against an external issuer,
//! gates registration capacity and feature access, and keeps the issuer
//! informed the license is in active use.

pub mod backoff;
pub mod keepalive;

use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{instrument, warn};

use crate::config::settings::LicenseConfig;
use crate::domain::license::{LicenseState, LicenseTier};
use crate::domain::LicenseRecord;
use crate::errors::Result;
use crate::storage::repositories::LicenseRepository;

/// Grace window applied when the issuer doesn't hand back its own, e.g. the
/// very first successful validation for a license key.
const DEFAULT_GRACE_PERIOD_SECONDS: i64 = 3600;
const ISSUER_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct IssuerValidateResponse {
    tier: String,
    max_proxies: i64,
    features: Vec<String>,
    expires_at: Option<chrono::DateTime<Utc>>,
    grace_period_seconds: Option<i64>,
}

#[derive(Debug, Serialize)]
struct IssuerValidateRequest<'a> {
    license_key: &'a str,
}

#[derive(Debug, Serialize)]
struct IssuerKeepaliveRequest<'a> {
    license_key: &'a str,
}

pub struct LicenseEnforcer {
    repo: LicenseRepository,
    http: reqwest::Client,
    issuer_url: Option<String>,
    state: RwLock<LicenseRecord>,
}

impl LicenseEnforcer {
    /// Seeds in-memory state from the most recently cached record, falling
    /// back to the community default when the control plane has never
    /// validated a license before.
    pub async fn new(repo: LicenseRepository, config: &LicenseConfig) -> Result<Self> {
        let cached = match repo.get_current().await? {
            Some(mut record) => {
                record.tick(Utc::now());
                record
            }
            None => LicenseRecord::community_default(),
        };
        Ok(Self {
            repo,
            http: reqwest::Client::builder().timeout(ISSUER_TIMEOUT).build().map_err(|e| {
                crate::errors::MarchProxyError::internal(format!("failed to build license issuer client: {e}"))
            })?,
            issuer_url: config.issuer_url.clone(),
            state: RwLock::new(cached),
        })
    }

    /// Returns the cached record unless it's expired or `force_refresh` is
    /// set, in which case it contacts the issuer. An issuer failure while
    /// the cached record is still within its grace window returns that
    /// cached record (`is_stale()` will report `true`) rather than failing
    /// the call outright.
    #[instrument(skip(self, license_key))]
    pub async fn validate(&self, license_key: &str, force_refresh: bool) -> Result<LicenseRecord> {
        if license_key.is_empty() {
            let community = LicenseRecord::community_default();
            *self.state.write().await = community.clone();
            self.repo.upsert(&community).await?;
            return Ok(community);
        }

        {
            let mut guard = self.state.write().await;
            guard.tick(Utc::now());
            let needs_refresh = force_refresh || guard.license_key != license_key || !matches!(guard.state, LicenseState::Valid);
            if !needs_refresh {
                return Ok(guard.clone());
            }
        }

        match self.issuer_url.as_deref() {
            None => {
                warn!("license key configured but no issuer_url set, falling back to community tier");
                let community = LicenseRecord::community_default();
                *self.state.write().await = community.clone();
                self.repo.upsert(&community).await?;
                Ok(community)
            }
            Some(issuer_url) => self.refresh_from_issuer(issuer_url, license_key).await,
        }
    }

    async fn refresh_from_issuer(&self, issuer_url: &str, license_key: &str) -> Result<LicenseRecord> {
        let url = format!("{}/v1/licenses/validate", issuer_url.trim_end_matches('/'));
        let response = self.http.post(&url).json(&IssuerValidateRequest { license_key }).send().await;

        let mut guard = self.state.write().await;
        match response.and_then(|r| r.error_for_status()) {
            Ok(response) => match response.json::<IssuerValidateResponse>().await {
                Ok(parsed) => {
                    let tier = if parsed.tier == "enterprise" { LicenseTier::Enterprise } else { LicenseTier::Community };
                    let record = LicenseRecord {
                        id: guard.id.clone(),
                        license_key: license_key.to_string(),
                        tier,
                        state: LicenseState::Valid,
                        max_proxies: parsed.max_proxies,
                        features: parsed.features.into_iter().collect::<HashSet<_>>(),
                        expires_at: parsed.expires_at,
                        last_keepalive: guard.last_keepalive,
                        grace_period_seconds: parsed.grace_period_seconds.unwrap_or(DEFAULT_GRACE_PERIOD_SECONDS),
                        updated_at: Utc::now(),
                    };
                    *guard = record.clone();
                    self.repo.upsert(&record).await?;
                    Ok(record)
                }
                Err(e) => {
                    warn!(error = %e, "license issuer returned an unparseable response, keeping cached record");
                    guard.tick(Utc::now());
                    let stale = guard.clone();
                    self.repo.upsert(&stale).await?;
                    Ok(stale)
                }
            },
            Err(e) => {
                warn!(error = %e, "license issuer unreachable, keeping cached record");
                guard.tick(Utc::now());
                let stale = guard.clone();
                self.repo.upsert(&stale).await?;
                Ok(stale)
            }
        }
    }

    /// Returns the cached record as-is, ticking its grace/expiry state but
    /// never contacting the issuer or falling back to the community
    /// default -- unlike [`Self::validate`], this has no side effect on
    /// persisted state. Used by read-only status surfaces.
    #[instrument(skip(self))]
    pub async fn current(&self) -> LicenseRecord {
        let mut guard = self.state.write().await;
        guard.tick(Utc::now());
        guard.clone()
    }

    #[instrument(skip(self))]
    pub async fn check_feature(&self, feature_name: &str) -> bool {
        let mut guard = self.state.write().await;
        guard.tick(Utc::now());
        guard.has_feature(feature_name)
    }

    #[instrument(skip(self))]
    pub async fn capacity(&self) -> i64 {
        let mut guard = self.state.write().await;
        guard.tick(Utc::now());
        guard.effective_max_proxies()
    }

    /// Signals the issuer the license is in active use. Callers drive
    /// [`backoff::Backoff`] off this call's result; success resets it.
    #[instrument(skip(self))]
    pub async fn keepalive(&self) -> Result<()> {
        let license_key = { self.state.read().await.license_key.clone() };
        if license_key.is_empty() {
            return Ok(());
        }
        let Some(issuer_url) = self.issuer_url.as_deref() else {
            return Ok(());
        };

        let url = format!("{}/v1/licenses/keepalive", issuer_url.trim_end_matches('/'));
        self.http
            .post(&url)
            .json(&IssuerKeepaliveRequest { license_key: &license_key })
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| crate::errors::MarchProxyError::internal(format!("license keepalive failed: {e}")))?;

        let mut guard = self.state.write().await;
        guard.last_keepalive = Some(Utc::now());
        let record = guard.clone();
        drop(guard);
        self.repo.upsert(&record).await?;
        Ok(())
    }
}
