//! Mapping: a routing rule composing sources, destinations, ports, and
//! protocols.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{ClusterId, MappingId, ServiceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

/// A port is either a single value or an inclusive range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortSpec {
    Single(u16),
    Range(u16, u16),
}

impl PortSpec {
    /// Number of distinct ports this spec denotes.
    pub fn len(&self) -> u32 {
        match self {
            PortSpec::Single(_) => 1,
            PortSpec::Range(lo, hi) => (*hi as u32).saturating_sub(*lo as u32) + 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// A range is "finite and small" (spec threshold: ≤128 ports) if it can
    /// be expanded into an explicit list in a rendered config snapshot
    /// without the list becoming unwieldy.
    pub fn is_expandable(&self) -> bool {
        self.len() <= 128
    }

    pub fn expand(&self) -> Vec<u16> {
        match self {
            PortSpec::Single(p) => vec![*p],
            PortSpec::Range(lo, hi) => (*lo..=*hi).collect(),
        }
    }
}

/// A routing rule composing sources, destinations, ports, and protocols.
///
/// Invariant: all referenced services belong to the same cluster as the
/// mapping; `priority` (lower = higher precedence) establishes a total order
/// for overlapping matches, ties broken by identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mapping {
    pub id: MappingId,
    pub cluster_id: ClusterId,
    pub name: String,
    pub source_services: Vec<ServiceId>,
    pub destination_services: Vec<ServiceId>,
    pub ports: Vec<PortSpec>,
    pub protocols: Vec<Protocol>,
    pub auth_required: bool,
    pub priority: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Mapping {
    pub fn new(cluster_id: ClusterId, name: impl Into<String>, priority: i32) -> Self {
        let now = Utc::now();
        Self {
            id: MappingId::new(),
            cluster_id,
            name: name.into(),
            source_services: Vec::new(),
            destination_services: Vec::new(),
            ports: Vec::new(),
            protocols: Vec::new(),
            auth_required: false,
            priority,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Orders mappings the way the Config Distributor renders them: ascending
/// priority, ties broken by identifier.
pub fn precedence_order(a: &Mapping, b: &Mapping) -> std::cmp::Ordering {
    a.priority.cmp(&b.priority).then_with(|| a.id.as_str().cmp(b.id.as_str()))
}
