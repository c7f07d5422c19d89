//! Service Authenticator: one decision per forwarded connection --
//! `authenticate(service, presented) -> AuthOutcome | auth error`.

pub mod signed_token;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::errors::{AuthFailureReason, DataplaneError, Result};

type HmacSha256 = Hmac<Sha256>;

/// The auth material attached to a service, as rendered into the data
/// plane's config snapshot. Mirrors the shape of the control plane's
/// `AuthType`, kept local so this crate carries no dependency on the control
/// plane's storage layer.
#[derive(Debug, Clone)]
pub enum ServiceAuth {
    None,
    SymmetricToken { token_value: Vec<u8> },
    SignedToken { secret: Vec<u8> },
}

/// The service identity a presented credential is checked against.
/// `service_id` is the numeric identifier carried in signed-token claims,
/// not the control plane's string `ServiceId`.
#[derive(Debug, Clone, Copy)]
pub struct ServiceIdentity<'a> {
    pub service_id: i64,
    pub service_name: &'a str,
    pub auth: &'a ServiceAuth,
}

/// Successful authentication outcome. Carries the parsed signed-token claims
/// when that path was used, for logging; `None` for the `none`/symmetric
/// paths, which have nothing further to report.
#[derive(Debug, Clone)]
pub struct AuthOutcome {
    pub claims: Option<signed_token::Claims>,
}

/// Authenticates `presented` against `service`'s configured auth type.
/// Every rejection collapses to [`DataplaneError::Auth`] with a `reason` for
/// logs -- the concrete cause is never handed back to the remote peer.
pub fn authenticate(service: ServiceIdentity<'_>, presented: &[u8], now: i64) -> Result<AuthOutcome> {
    match service.auth {
        ServiceAuth::None => Ok(AuthOutcome { claims: None }),

        ServiceAuth::SymmetricToken { token_value } => {
            if token_value.len() != presented.len() {
                return Err(DataplaneError::Auth { reason: AuthFailureReason::LengthMismatch });
            }
            if verify_symmetric(token_value, presented) {
                Ok(AuthOutcome { claims: None })
            } else {
                Err(DataplaneError::Auth { reason: AuthFailureReason::BadSignature })
            }
        }

        ServiceAuth::SignedToken { secret } => {
            let token = std::str::from_utf8(presented)
                .map_err(|_| DataplaneError::Auth { reason: AuthFailureReason::ParseFailure })?;
            let claims = signed_token::validate(token, secret, service.service_id, now)?;
            Ok(AuthOutcome { claims: Some(claims) })
        }
    }
}

/// HMAC-SHA256 tag comparison over a fixed key, so the comparison itself
/// runs in constant time regardless of how many leading bytes of `presented`
/// happen to match `expected`. Differing lengths are rejected directly.
fn verify_symmetric(expected: &[u8], presented: &[u8]) -> bool {
    if expected.len() != presented.len() {
        return false;
    }

    let mut mac_expected = HmacSha256::new_from_slice(b"marchproxy-dataplane-symmetric-token-compare")
        .expect("HMAC accepts any key length");
    mac_expected.update(expected);
    let tag_expected = mac_expected.finalize().into_bytes();

    let mut mac_presented = HmacSha256::new_from_slice(b"marchproxy-dataplane-symmetric-token-compare")
        .expect("HMAC accepts any key length");
    mac_presented.update(presented);
    let tag_presented = mac_presented.finalize().into_bytes();

    tag_expected.ct_eq(&tag_presented).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_auth_accepts_anything() {
        let service = ServiceIdentity { service_id: 1, service_name: "db", auth: &ServiceAuth::None };
        assert!(authenticate(service, b"whatever", 0).is_ok());
    }

    #[test]
    fn symmetric_token_accepts_a_matching_presented_value() {
        let auth = ServiceAuth::SymmetricToken { token_value: b"shared-secret".to_vec() };
        let service = ServiceIdentity { service_id: 1, service_name: "db", auth: &auth };
        assert!(authenticate(service, b"shared-secret", 0).is_ok());
    }

    #[test]
    fn symmetric_token_rejects_a_wrong_length_value() {
        let auth = ServiceAuth::SymmetricToken { token_value: b"shared-secret".to_vec() };
        let service = ServiceIdentity { service_id: 1, service_name: "db", auth: &auth };
        let err = authenticate(service, b"short", 0).unwrap_err();
        assert!(matches!(err, DataplaneError::Auth { reason: AuthFailureReason::LengthMismatch }));
    }

    #[test]
    fn signed_token_round_trips_through_the_authenticator() {
        let token = signed_token::sign(42, "db", b"topsecret", 1_700_000_000, 3600);
        let auth = ServiceAuth::SignedToken { secret: b"topsecret".to_vec() };
        let service = ServiceIdentity { service_id: 42, service_name: "db", auth: &auth };
        let outcome = authenticate(service, token.as_bytes(), 1_700_001_000).unwrap();
        assert_eq!(outcome.claims.unwrap().service_name, "db");
    }
}
