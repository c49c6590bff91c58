//! API error types with IntoResponse
//!
//! NotFound conditions become 404s naming the missing entity; anything from
//! the store is logged here and surfaced as a generic 500 - the access layer
//! never produces the user-facing message itself.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::db::repos::DbError;

/// API error type with automatic HTTP status mapping
#[derive(Debug)]
pub enum ApiError {
    /// Entity or relation does not exist (404)
    NotFound { resource: &'static str },

    /// Database error (500, logged)
    Database(DbError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::NotFound { resource } => (
                StatusCode::NOT_FOUND,
                json!({
                    "error": "not_found",
                    "message": format!("{} not found", resource)
                }),
            ),
            Self::Database(e) => {
                // Log the actual error, return a generic message
                tracing::error!("database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "error": "internal_error",
                        "message": "an internal error occurred"
                    }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::BannerNotFound => Self::NotFound { resource: "banner" },
            DbError::BannerFeatureNotFound => Self::NotFound {
                resource: "banner-feature relation",
            },
            DbError::BannerTagNotFound => Self::NotFound {
                resource: "banner-tag relation",
            },
            other => Self::Database(other),
        }
    }
}
