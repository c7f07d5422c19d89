//! Operator session login.
//!
//! The control plane has exactly one class of human-facing credential: the
//! bootstrap operator account created by [`crate::startup::handle_first_time_startup`]
//! (or via [`OperatorRepository::create`]). Logging in exchanges a username
//! and password for a JWT used on every other operator-session endpoint.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::auth::hashing::verify_password;
use crate::errors::{AuthErrorReason, MarchProxyError};
use crate::observability::metrics;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in_seconds: u64,
}

pub async fn login_handler(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let operator = state.operators.find_by_username(&body.username).await?.ok_or_else(|| {
        MarchProxyError::auth("invalid username or password", AuthErrorReason::InvalidCredential)
    })?;

    if !verify_password(&body.password, &operator.password_hash)? {
        metrics::record_authentication("operator_login", "rejected").await;
        return Err(MarchProxyError::auth("invalid username or password", AuthErrorReason::InvalidCredential).into());
    }

    let token = state.auth.generate_token(&operator.username)?;
    metrics::record_authentication("operator_login", "accepted").await;

    Ok(Json(LoginResponse { token, expires_in_seconds: state.auth.token_expiry_seconds() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::test_state_with_pool;
    use crate::auth::hashing::hash_password;
    use crate::storage::repositories::OperatorRepository;
    use crate::storage::test_helpers::TestDatabase;

    async fn state() -> AppState {
        let db = TestDatabase::new("auth_handler").await;
        let password_hash = hash_password("correct-password").unwrap();
        OperatorRepository::new(db.pool.clone()).create("admin", &password_hash).await.unwrap();
        test_state_with_pool(db.pool.clone()).await
    }

    #[tokio::test]
    async fn rejects_an_unknown_username() {
        let state = state().await;
        let result = login_handler(
            State(state),
            Json(LoginRequest { username: "nobody".to_string(), password: "whatever".to_string() }),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn accepts_the_correct_password_and_issues_a_token() {
        let state = state().await;
        let response = login_handler(
            State(state),
            Json(LoginRequest { username: "admin".to_string(), password: "correct-password".to_string() }),
        )
        .await
        .unwrap();
        assert!(!response.0.token.is_empty());
    }

    #[tokio::test]
    async fn rejects_the_wrong_password() {
        let state = state().await;
        let result = login_handler(
            State(state),
            Json(LoginRequest { username: "admin".to_string(), password: "wrong".to_string() }),
        )
        .await;
        assert!(result.is_err());
    }
}
