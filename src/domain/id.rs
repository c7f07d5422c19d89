//! Newtype identifiers wrapping a UUID-backed `String`.
//!
//! Every aggregate root gets its own id type so the compiler rejects passing
//! a `ServiceId` where a `ProxyId` is expected, even though both are strings
//! at rest.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Declares a newtype id wrapping a `String`, with `Display`, `FromStr`,
/// serde support, and a `new()` constructor that generates a fresh UUIDv4.
macro_rules! domain_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generates a new random identifier.
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// Wraps an existing string without validating its shape.
            pub fn from_string(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_string()))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

domain_id!(ClusterId);
domain_id!(ProxyId);
domain_id!(ServiceId);
domain_id!(MappingId);
domain_id!(CertificateId);
domain_id!(LicenseId);
domain_id!(TokenId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types_but_equal_strings_roundtrip() {
        let id = ClusterId::new();
        let parsed: ClusterId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn display_matches_as_str() {
        let id = ProxyId::from_string("proxy-123");
        assert_eq!(id.to_string(), "proxy-123");
        assert_eq!(id.as_str(), "proxy-123");
    }

    #[test]
    fn serializes_as_bare_string() {
        let id = ServiceId::from_string("svc-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"svc-1\"");
    }
}
