//! bannerd-server: resolves and mutates banners targeted by feature/tag pairs.
//!
//! A banner is visible through the combination of one feature and one tag it
//! is associated with. The database layer owns the multi-table invariants
//! (`db::repos`); the HTTP layer (`http`) is a thin mapping onto it.

pub mod db;
pub mod http;
