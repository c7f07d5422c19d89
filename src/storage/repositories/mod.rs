//! One repository struct per aggregate root, each holding a [`DbPool`] and
//! exposing typed operations over its table.

pub mod audit;
pub mod certificate;
pub mod cluster;
pub mod license;
pub mod mapping;
pub mod operator;
pub mod proxy;
pub mod service;

pub use audit::{AuditEvent, AuditLogRepository, AuditRecord};
pub use certificate::CertificateRepository;
pub use cluster::ClusterRepository;
pub use license::LicenseRepository;
pub use mapping::MappingRepository;
pub use operator::{OperatorAccount, OperatorRepository};
pub use proxy::ProxyRepository;
pub use service::ServiceRepository;
