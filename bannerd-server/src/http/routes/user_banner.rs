//! Content-serving endpoint
//!
//! GET /user_banner resolves exactly one banner's content for a required
//! feature/tag pair. Missing parameters are rejected by the query extractor.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::repos::BannerRepo;
use crate::http::error::ApiError;
use crate::http::server::AppState;

/// Both ids are required; there is no "match any" sentinel here.
#[derive(Debug, Deserialize)]
pub struct UserBannerParams {
    pub feature_id: i64,
    pub tag_id: i64,
}

#[derive(Serialize)]
pub struct UserBannerResponse {
    pub content: String,
}

/// GET /user_banner
async fn user_banner(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UserBannerParams>,
) -> Result<Json<UserBannerResponse>, ApiError> {
    let content = BannerRepo::new(&state.pool)
        .content(params.feature_id, params.tag_id)
        .await?;

    Ok(Json(UserBannerResponse { content }))
}

/// User banner routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/user_banner", get(user_banner))
}
