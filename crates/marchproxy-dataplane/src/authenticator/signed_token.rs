//! Compact signed-token codec: `base64url(header).base64url(payload).base64url(hmac)`.
//! Deliberately hand-rolled rather than built on `jsonwebtoken` -- the
//! rejection ordering and claim shape here are exact and narrower than a
//! general-purpose JWT validator's defaults (no clock-skew leeway, exactly
//! one signing algorithm accepted).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::errors::{AuthFailureReason, DataplaneError, Result};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

/// Claims carried by a signed token. `service_id` is the numeric identifier
/// carried on the wire, unrelated to the control plane's string `ServiceId`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub service_id: i64,
    pub service_name: String,
    pub iat: i64,
    pub exp: i64,
}

/// Builds a signed token for `claims`, valid from `iat` until `iat + duration_seconds`.
pub fn sign(service_id: i64, service_name: &str, secret: &[u8], iat: i64, duration_seconds: i64) -> String {
    let claims = Claims { service_id, service_name: service_name.to_string(), iat, exp: iat + duration_seconds };
    encode(&claims, secret)
}

fn encode(claims: &Claims, secret: &[u8]) -> String {
    let header = Header { alg: "HS256".to_string(), typ: "JWT".to_string() };
    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).expect("header always serializes"));
    let payload_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).expect("claims always serialize"));
    let signing_input = format!("{header_b64}.{payload_b64}");

    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(signing_input.as_bytes());
    let signature_b64 = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    format!("{signing_input}.{signature_b64}")
}

/// Validates `token` against `secret` and `expected_service_id`, rejecting in
/// the exact order spec'd: parse failure, unsupported algorithm, bad
/// signature, wrong service, expired. No clock-skew allowance.
pub fn validate(token: &str, secret: &[u8], expected_service_id: i64, now: i64) -> Result<Claims> {
    let parts: Vec<&str> = token.split('.').collect();
    let [header_b64, payload_b64, signature_b64] = parts[..] else {
        return Err(DataplaneError::Auth { reason: AuthFailureReason::ParseFailure });
    };

    let header_bytes =
        URL_SAFE_NO_PAD.decode(header_b64).map_err(|_| DataplaneError::Auth { reason: AuthFailureReason::ParseFailure })?;
    let header: Header = serde_json::from_slice(&header_bytes)
        .map_err(|_| DataplaneError::Auth { reason: AuthFailureReason::ParseFailure })?;

    if header.alg != "HS256" {
        return Err(DataplaneError::Auth { reason: AuthFailureReason::UnsupportedAlgorithm });
    }

    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| DataplaneError::Auth { reason: AuthFailureReason::ParseFailure })?;
    let claims: Claims = serde_json::from_slice(&payload_bytes)
        .map_err(|_| DataplaneError::Auth { reason: AuthFailureReason::ParseFailure })?;

    let signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| DataplaneError::Auth { reason: AuthFailureReason::ParseFailure })?;

    let signing_input = format!("{header_b64}.{payload_b64}");
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(signing_input.as_bytes());
    mac.verify_slice(&signature).map_err(|_| DataplaneError::Auth { reason: AuthFailureReason::BadSignature })?;

    if claims.service_id != expected_service_id {
        return Err(DataplaneError::Auth { reason: AuthFailureReason::ServiceMismatch });
    }

    if now > claims.exp {
        return Err(DataplaneError::Auth { reason: AuthFailureReason::Expired });
    }

    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"topsecret";

    #[test]
    fn signs_and_validates_the_documented_scenario() {
        let token = sign(42, "db", SECRET, 1_700_000_000, 3600);
        let claims = validate(&token, SECRET, 42, 1_700_001_000).unwrap();
        assert_eq!(claims.service_name, "db");
        assert_eq!(claims.exp, 1_700_003_600);
    }

    #[test]
    fn rejects_an_expired_token() {
        let token = sign(42, "db", SECRET, 1_700_000_000, 3600);
        let err = validate(&token, SECRET, 42, 1_700_003_601).unwrap_err();
        assert!(matches!(err, DataplaneError::Auth { reason: AuthFailureReason::Expired }));
    }

    #[test]
    fn rejects_a_tampered_signature() {
        let mut token = sign(42, "db", SECRET, 1_700_000_000, 3600);
        token.push('x');
        let err = validate(&token, SECRET, 42, 1_700_001_000).unwrap_err();
        assert!(matches!(err, DataplaneError::Auth { reason: AuthFailureReason::BadSignature }));
    }

    #[test]
    fn rejects_a_service_id_mismatch() {
        let token = sign(42, "db", SECRET, 1_700_000_000, 3600);
        let err = validate(&token, SECRET, 99, 1_700_001_000).unwrap_err();
        assert!(matches!(err, DataplaneError::Auth { reason: AuthFailureReason::ServiceMismatch }));
    }

    #[test]
    fn rejects_an_unparsable_token() {
        let err = validate("not-a-token", SECRET, 42, 1_700_001_000).unwrap_err();
        assert!(matches!(err, DataplaneError::Auth { reason: AuthFailureReason::ParseFailure }));
    }
}
