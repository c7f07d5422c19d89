//! License: a validation record cached from an external issuer.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::LicenseId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseTier {
    Community,
    Enterprise,
}

impl LicenseTier {
    /// Capacity granted when no valid license is cached.
    pub const COMMUNITY_DEFAULT_MAX_PROXIES: i64 = 3;
}

/// `uninitialized → validating → {valid, invalid, grace(until)}`.
///
/// `Valid` transitions to `Grace` once the cached record's expiry passes;
/// `Grace` transitions to `Invalid` once `until` passes. An issuer actively
/// declaring the key invalid flips straight to `Invalid` regardless of grace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LicenseState {
    Uninitialized,
    Validating,
    Valid,
    Invalid,
    Grace { until: DateTime<Utc> },
}

impl LicenseState {
    pub fn is_usable(&self) -> bool {
        matches!(self, LicenseState::Valid | LicenseState::Grace { .. })
    }
}

/// A validation record cached from the external license issuer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseRecord {
    pub id: LicenseId,
    pub license_key: String,
    pub tier: LicenseTier,
    pub state: LicenseState,
    pub max_proxies: i64,
    pub features: HashSet<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_keepalive: Option<DateTime<Utc>>,
    pub grace_period_seconds: i64,
    pub updated_at: DateTime<Utc>,
}

impl LicenseRecord {
    /// The community-tier record this control plane falls back to when no
    /// license key is configured or the cached license has lapsed past its
    /// grace window.
    pub fn community_default() -> Self {
        Self {
            id: LicenseId::new(),
            license_key: String::new(),
            tier: LicenseTier::Community,
            state: LicenseState::Valid,
            max_proxies: LicenseTier::COMMUNITY_DEFAULT_MAX_PROXIES,
            features: HashSet::new(),
            expires_at: None,
            last_keepalive: None,
            grace_period_seconds: 0,
            updated_at: Utc::now(),
        }
    }

    /// `capacity()` as the Fleet Registrar sees it: the licensed max while
    /// usable, the community default otherwise.
    pub fn effective_max_proxies(&self) -> i64 {
        if self.state.is_usable() {
            self.max_proxies
        } else {
            LicenseTier::COMMUNITY_DEFAULT_MAX_PROXIES
        }
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.state.is_usable() && self.features.contains(feature)
    }

    /// Advances `Valid` to `Grace` once the cached expiry passes, and
    /// `Grace` to `Invalid` once `until` passes. Called on every read so the
    /// state machine never needs its own background task beyond keepalive.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        match &self.state {
            LicenseState::Valid => {
                if let Some(expires_at) = self.expires_at {
                    if now > expires_at {
                        self.state = LicenseState::Grace {
                            until: expires_at + chrono::Duration::seconds(self.grace_period_seconds),
                        };
                    }
                }
            }
            LicenseState::Grace { until } => {
                if now > *until {
                    self.state = LicenseState::Invalid;
                }
            }
            _ => {}
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self.state, LicenseState::Grace { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_state_falls_back_to_community_capacity() {
        let mut record = LicenseRecord::community_default();
        record.tier = LicenseTier::Enterprise;
        record.max_proxies = 500;
        record.state = LicenseState::Invalid;
        assert_eq!(record.effective_max_proxies(), LicenseTier::COMMUNITY_DEFAULT_MAX_PROXIES);
    }

    #[test]
    fn grace_state_keeps_licensed_capacity_and_reports_stale() {
        let mut record = LicenseRecord::community_default();
        record.max_proxies = 500;
        record.state = LicenseState::Grace { until: Utc::now() + chrono::Duration::hours(1) };
        assert_eq!(record.effective_max_proxies(), 500);
        assert!(record.is_stale());
    }

    #[test]
    fn tick_expires_valid_into_grace_then_invalid() {
        let mut record = LicenseRecord::community_default();
        record.grace_period_seconds = 3600;
        record.expires_at = Some(Utc::now() - chrono::Duration::seconds(1));
        record.state = LicenseState::Valid;

        record.tick(Utc::now());
        assert!(matches!(record.state, LicenseState::Grace { .. }));

        record.tick(Utc::now() + chrono::Duration::hours(2));
        assert_eq!(record.state, LicenseState::Invalid);
    }
}
