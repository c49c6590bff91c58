//! Database connection pool management
//!
//! Uses sqlx PgPool with explicit connection limits and lifetime.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Pool bounds applied to every connection the service opens.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of open connections.
    pub max_open_conns: u32,
    /// Connections kept warm when the pool is idle.
    pub min_idle_conns: u32,
    /// Connections older than this are recycled.
    pub max_lifetime: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_open_conns: 100,
            min_idle_conns: 2,
            max_lifetime: Duration::from_secs(3600),
        }
    }
}

/// Create a PostgreSQL connection pool with default bounds.
///
/// # Errors
///
/// Returns an error if the connection fails.
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    create_pool_with_config(database_url, &PoolConfig::default()).await
}

/// Create a PostgreSQL connection pool with explicit bounds.
pub async fn create_pool_with_config(
    database_url: &str,
    config: &PoolConfig,
) -> Result<PgPool, sqlx::Error> {
    tracing::info!(
        max_open_conns = config.max_open_conns,
        min_idle_conns = config.min_idle_conns,
        max_lifetime_secs = config.max_lifetime.as_secs(),
        "creating database pool"
    );

    PgPoolOptions::new()
        .max_connections(config.max_open_conns)
        .min_connections(config.min_idle_conns)
        .max_lifetime(config.max_lifetime)
        .connect(database_url)
        .await
}
