//! Operator account repository: the bootstrap login used by operator
//! surfaces (CLI, audit viewer) to obtain a session token.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::instrument;

use crate::errors::{MarchProxyError, Result};
use crate::storage::DbPool;

#[derive(Debug, Clone, FromRow)]
pub struct OperatorAccount {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct OperatorRepository {
    pool: DbPool,
}

impl OperatorRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, password_hash), fields(username = username))]
    pub async fn create(&self, username: &str, password_hash: &str) -> Result<OperatorAccount> {
        let now = Utc::now();
        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO operator_accounts (id, username, password_hash, created_at, updated_at) VALUES ($1,$2,$3,$4,$5)")
            .bind(&id)
            .bind(username)
            .bind(password_hash)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(OperatorAccount { id, username: username.to_string(), password_hash: password_hash.to_string(), created_at: now, updated_at: now })
    }

    #[instrument(skip(self), fields(username = username))]
    pub async fn find_by_username(&self, username: &str) -> Result<Option<OperatorAccount>> {
        let row = sqlx::query_as::<_, OperatorAccount>("SELECT * FROM operator_accounts WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    #[instrument(skip(self))]
    pub async fn count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM operator_accounts").fetch_one(&self.pool).await?;
        Ok(row.0)
    }

    #[instrument(skip(self, new_password_hash), fields(operator_id = id))]
    pub async fn update_password(&self, id: &str, new_password_hash: &str) -> Result<()> {
        let result = sqlx::query("UPDATE operator_accounts SET password_hash = $1, updated_at = $2 WHERE id = $3")
            .bind(new_password_hash)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(MarchProxyError::not_found("operator_account", id));
        }
        Ok(())
    }
}
