//! HTTP server layer
//!
//! Axum server with:
//! - CORS and request tracing
//! - Graceful shutdown
//! - JSON error responses mapped from the database error taxonomy

pub mod error;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use server::{run_server, AppState, ServerConfig};
