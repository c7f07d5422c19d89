//! Per-connection enforcement primitives for MarchProxy data-plane
//! processes.
//!
//! - **Service Authenticator** ([`authenticator`]): none/symmetric/signed-token
//!   credential checks on each forwarded connection.
//! - **Circuit Breaker Engine** ([`breaker`]): one breaker per backend,
//!   guarding calls through CLOSED/OPEN/HALF_OPEN.
//! - **mTLS Validator** ([`mtls`]): extra checks on a presented client
//!   certificate beyond standard chain verification, with hot-reloadable
//!   policy and revocation.
//! - **Control plane client** ([`client`]): registers a proxy and polls for
//!   config snapshot changes.
//!
//! This crate has no store and no HTTP framework -- it runs embedded in a
//! proxy process, not the control plane.

pub mod authenticator;
pub mod breaker;
pub mod client;
pub mod errors;
pub mod mtls;

pub use errors::{DataplaneError, Result};
