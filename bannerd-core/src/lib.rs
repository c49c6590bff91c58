//! bannerd-core: shared configuration for the bannerd service.
//!
//! Keeps the config types out of the server crate so tooling can load
//! the same file without pulling in the HTTP/database stack.

pub mod config;

pub use config::{Config, HttpServerConfig, PostgresConfig};
