//! Pure canonical serialization used to compute a config snapshot's version.
//!
//! `version()` must be stable under re-fetching the same underlying rows in
//! a different order, so this sorts every collection before serializing
//! rather than trusting callers' query order.

use sha2::{Digest, Sha256};

use crate::domain::cluster::LoggingConfig;
use crate::domain::mapping::precedence_order;
use crate::domain::{Certificate, Mapping, Service};

/// Produces the bytes [`version`] hashes: logging config plus services
/// sorted by id, mappings sorted by `(priority, id)`, certificates sorted
/// by id, serialized through `serde_json` (whose default `Map` is
/// key-ordered, giving every call the same byte layout for the same data).
pub fn canonical_bytes(
    logging: &LoggingConfig,
    services: &[Service],
    mappings: &[Mapping],
    certificates: &[Certificate],
) -> Vec<u8> {
    let mut services = services.to_vec();
    services.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));

    let mut mappings = mappings.to_vec();
    mappings.sort_by(precedence_order);

    let mut certificates = certificates.to_vec();
    certificates.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));

    let value = serde_json::json!({
        "logging": logging,
        "services": services,
        "mappings": mappings,
        "certificates": certificates,
    });
    serde_json::to_vec(&value).expect("canonical snapshot value always serializes")
}

/// The version string served to proxies and compared across polls.
pub fn version(canonical_bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(canonical_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ClusterId, Mapping};

    #[test]
    fn version_is_stable_across_input_order() {
        let logging = LoggingConfig::default();
        let cluster = ClusterId::new();
        let mut a = Mapping::new(cluster.clone(), "a", 1);
        a.id = crate::domain::MappingId::from_string("aaa");
        let mut b = Mapping::new(cluster, "b", 1);
        b.id = crate::domain::MappingId::from_string("bbb");

        let forward = canonical_bytes(&logging, &[], &[a.clone(), b.clone()], &[]);
        let backward = canonical_bytes(&logging, &[], &[b, a], &[]);
        assert_eq!(version(&forward), version(&backward));
    }

    #[test]
    fn version_changes_when_a_mapping_changes() {
        let logging = LoggingConfig::default();
        let cluster = ClusterId::new();
        let mapping = Mapping::new(cluster.clone(), "a", 1);
        let mut changed = mapping.clone();
        changed.priority = 2;

        let before = version(&canonical_bytes(&logging, &[], &[mapping], &[]));
        let after = version(&canonical_bytes(&logging, &[], &[changed], &[]));
        assert_ne!(before, after);
    }
}
