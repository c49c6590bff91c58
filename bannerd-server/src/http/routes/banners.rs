//! Banner CRUD endpoints
//!
//! GET /banner lists banners under optional feature/tag/pagination filters;
//! POST creates, PATCH updates, DELETE removes. The repository owns the
//! transactional semantics; handlers only shape requests and responses.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::repos::{
    BannerFilter, BannerRepo, BannerUpdate, BannerWithTags, Feature, NewBanner, Tag,
};
use crate::http::error::ApiError;
use crate::http::server::AppState;

/// Query filters for GET /banner. Zero means "filter omitted".
#[derive(Debug, Deserialize)]
pub struct ListBannersParams {
    #[serde(default)]
    pub feature_id: i64,
    #[serde(default)]
    pub tag_id: i64,
    #[serde(default)]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

/// Body shared by POST and PATCH.
#[derive(Debug, Deserialize)]
pub struct BannerBody {
    pub feature_id: i64,
    #[serde(default)]
    pub tag_ids: Vec<i64>,
    pub content: String,
    pub is_active: bool,
}

/// Banner response
#[derive(Serialize)]
pub struct BannerResponse {
    pub banner_id: i64,
    pub tag_ids: Vec<i64>,
    pub feature_id: i64,
    pub content: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct CreateBannerResponse {
    pub banner_id: i64,
}

impl BannerResponse {
    /// The feature id echoes the request filter; the read path does not
    /// resolve each banner's stored feature association.
    fn from_row(row: BannerWithTags, feature_id: i64) -> Self {
        Self {
            banner_id: row.banner.id,
            tag_ids: row.tag_ids,
            feature_id,
            content: row.banner.content,
            is_active: row.banner.is_active,
            created_at: row.banner.created_at,
            updated_at: row.banner.updated_at,
        }
    }
}

/// GET /banner - list banners under optional filters
async fn list_banners(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListBannersParams>,
) -> Result<Json<Vec<BannerResponse>>, ApiError> {
    let filter = BannerFilter {
        feature_id: params.feature_id,
        tag_id: params.tag_id,
        limit: params.limit,
        offset: params.offset,
    };

    let rows = BannerRepo::new(&state.pool).list(&filter).await?;
    let body = rows
        .into_iter()
        .map(|row| BannerResponse::from_row(row, params.feature_id))
        .collect();

    Ok(Json(body))
}

/// POST /banner - create a banner with its associations
async fn create_banner(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BannerBody>,
) -> Result<(StatusCode, Json<CreateBannerResponse>), ApiError> {
    let now = Utc::now();
    let draft = NewBanner {
        content: req.content,
        is_active: req.is_active,
        created_at: now,
        updated_at: now,
    };
    let feature = Feature {
        id: req.feature_id,
        created_at: now,
        used_at: now,
    };
    let tags: Vec<Tag> = req
        .tag_ids
        .iter()
        .map(|&id| Tag {
            id,
            created_at: now,
            used_at: now,
        })
        .collect();

    let banner_id = BannerRepo::new(&state.pool)
        .create(&draft, &feature, &tags)
        .await?;

    Ok((StatusCode::CREATED, Json(CreateBannerResponse { banner_id })))
}

/// PATCH /banner/{id} - rewrite a banner and replace its associations
async fn update_banner(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<BannerBody>,
) -> Result<StatusCode, ApiError> {
    let update = BannerUpdate {
        id,
        content: req.content,
        is_active: req.is_active,
        updated_at: Utc::now(),
    };

    BannerRepo::new(&state.pool)
        .update(&update, req.feature_id, &req.tag_ids)
        .await?;

    Ok(StatusCode::OK)
}

/// DELETE /banner/{id} - cascade delete a banner
async fn delete_banner(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    BannerRepo::new(&state.pool).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Banner routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/banner", get(list_banners).post(create_banner))
        .route("/banner/{id}", patch(update_banner).delete(delete_banner))
}
