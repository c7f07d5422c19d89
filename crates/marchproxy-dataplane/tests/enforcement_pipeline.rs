//! Exercises the breaker and authenticator together the way a proxy's
//! per-connection path actually composes them: a call is only attempted if
//! the breaker admits it, and a successful call still has to pass
//! authentication.

use marchproxy_dataplane::authenticator::{authenticate, ServiceAuth, ServiceIdentity};
use marchproxy_dataplane::breaker::{Breaker, BreakerConfig};
use marchproxy_dataplane::errors::{AuthFailureReason, BreakerRejection, DataplaneError};

fn test_config() -> BreakerConfig {
    BreakerConfig { ready_to_trip: 3, ..Default::default() }
}

#[tokio::test]
async fn a_tripped_breaker_rejects_before_authentication_is_ever_attempted() {
    let breaker = Breaker::new("billing-service", test_config());

    for _ in 0..3 {
        let outcome = breaker.execute(|| async { Err::<(), &str>("downstream failure") }).await;
        assert!(outcome.is_ok(), "the breaker call itself should succeed even though the guarded call failed");
    }

    let auth = ServiceAuth::SymmetricToken { token_value: b"shared-secret".to_vec() };
    let service = ServiceIdentity { service_id: "svc-1", service_name: "billing-service", auth: &auth };

    let result = breaker
        .execute(|| async {
            let outcome = authenticate(service.clone(), b"shared-secret", 0);
            Ok::<_, DataplaneError>(outcome)
        })
        .await;

    assert!(
        matches!(result, Err(DataplaneError::Breaker(BreakerRejection::Open))),
        "an open breaker must reject before the guarded call runs"
    );
}

#[tokio::test]
async fn an_admitted_call_through_a_closed_breaker_still_enforces_authentication() {
    let breaker = Breaker::new("billing-service", test_config());
    let auth = ServiceAuth::SymmetricToken { token_value: b"shared-secret".to_vec() };
    let service = ServiceIdentity { service_id: "svc-1", service_name: "billing-service", auth: &auth };

    let result = breaker
        .execute(|| async { authenticate(service.clone(), b"wrong-secret", 0) })
        .await
        .expect("the breaker itself admits the call");

    let err = result.unwrap_err();
    assert!(matches!(err, DataplaneError::Auth { reason: AuthFailureReason::LengthMismatch }));
}
