//! SQLite persistence
//!
//! - Connection pool in WAL mode
//! - Embedded migrations, run on connect
//! - ULID primary keys stored as text

pub mod behaviours;
pub mod contacts;
pub mod tenants;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::error::DbError;

pub use behaviours::{BaseModel, Identity, TenantScope, Timestamps};
pub use contacts::{Contact, ContactStore};
pub use tenants::{Tenant, TenantStore};

/// Database handle
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open the pool and apply pending migrations
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!(url = %config.url, "Database migrations completed");

        Ok(Self { pool })
    }

    /// Private in-memory database; one connection so every query sees it
    pub async fn in_memory() -> Result<Self, DbError> {
        Self::connect(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        })
        .await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// `SELECT 1` round trip
    pub async fn ping(&self) -> Result<(), DbError> {
        let one: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&self.pool).await?;
        if one != 1 {
            return Err(sqlx::Error::RowNotFound.into());
        }
        Ok(())
    }

    pub fn tenants(&self) -> TenantStore<'_> {
        TenantStore::new(&self.pool)
    }

    pub fn contacts(&self) -> ContactStore<'_> {
        ContactStore::new(&self.pool)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
