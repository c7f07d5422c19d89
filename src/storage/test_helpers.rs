//! Test database utilities for in-library tests.
//!
//! Each `TestDatabase` opens a fresh private in-memory SQLite instance with
//! all migrations applied. `sqlite://:memory:` bound through a single
//! pooled connection gives full isolation between tests without the
//! Docker dependency.
//!
//! This module is only available in test builds (`#[cfg(test)]`).

use crate::config::DatabaseConfig;
use crate::storage::{create_pool, DbPool};

pub struct TestDatabase {
    pub pool: DbPool,
}

impl TestDatabase {
    /// Create a new test database with all migrations applied.
    ///
    /// `label` is accepted for call-site readability only; every instance
    /// is a private, independent in-memory database regardless of label.
    pub async fn new(label: &str) -> Self {
        let config = DatabaseConfig {
            url: "sqlite://:memory:".to_string(),
            auto_migrate: true,
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        };

        let pool = create_pool(&config).await.unwrap_or_else(|e| panic!("failed to create test pool for {label}: {e}"));

        Self { pool }
    }
}
