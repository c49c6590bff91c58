//! Database layer - connection pool, migrations and repositories
//!
//! # Design Principles
//!
//! - Bounded connection pool, recycled by sqlx - no per-request connections
//! - Conflict-aware inserts against real constraints - no bare check-then-insert
//! - One transaction per multi-step write, commit last, rollback on drop

pub mod migrations;
pub mod pool;
pub mod repos;

pub use pool::{create_pool, create_pool_with_config, PoolConfig};
pub use repos::*;
