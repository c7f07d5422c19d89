//! Core data model: clusters, proxies, services, mappings, certificates, and
//! license records. Pure types only — no storage or transport concerns live
//! here.

pub mod cluster;
pub mod certificate;
pub mod id;
pub mod license;
pub mod mapping;
pub mod proxy;
pub mod service;

pub use cluster::Cluster;
pub use certificate::{Certificate, CertificateSource, CertificateType, RevocationState};
pub use id::{CertificateId, ClusterId, LicenseId, MappingId, ProxyId, ServiceId, TokenId};
pub use license::{LicenseRecord, LicenseState, LicenseTier};
pub use mapping::{Mapping, PortSpec, Protocol};
pub use proxy::{Proxy, ProxyStatus};
pub use service::{AuthType, Service, SignedTokenAlgorithm, Transport};
