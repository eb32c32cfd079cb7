//! Asset register: persist upload descriptors into the metadata index and
//! read them back.
//!
//! The upload queue emits a `MediaAsset` per completed transfer; callers
//! register it here. The queue itself never writes the index.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use utoipa::ToSchema;

use medley_core::{AppError, MediaAsset};

use crate::error::{AppJson, HttpAppError};
use crate::state::AppState;

#[utoipa::path(
    post,
    path = "/assets",
    tag = "assets",
    request_body = MediaAsset,
    responses(
        (status = 201, description = "Asset registered", body = MediaAsset),
        (status = 400, description = "Malformed record", body = crate::error::ErrorResponse)
    )
)]
pub async fn register_asset(
    State(state): State<Arc<AppState>>,
    AppJson(asset): AppJson<MediaAsset>,
) -> Result<(StatusCode, Json<MediaAsset>), HttpAppError> {
    if asset.id.is_empty() {
        return Err(AppError::BadRequest("asset id must not be empty".to_string()).into());
    }
    state.repository.register(&asset).await?;
    tracing::info!(asset_id = %asset.id, kind = %asset.kind, "Asset registered");
    Ok((StatusCode::CREATED, Json(asset)))
}

#[utoipa::path(
    get,
    path = "/assets",
    tag = "assets",
    responses((status = 200, description = "All assets, newest first", body = [MediaAsset]))
)]
pub async fn list_assets(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<MediaAsset>>, HttpAppError> {
    let assets = state.repository.list().await?;
    Ok(Json(assets))
}

#[utoipa::path(
    get,
    path = "/assets/{id}",
    tag = "assets",
    params(("id" = String, Path, description = "Asset id")),
    responses(
        (status = 200, description = "Asset record", body = MediaAsset),
        (status = 404, description = "Unknown asset", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_asset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<MediaAsset>, HttpAppError> {
    match state.repository.get(&id).await? {
        Some(asset) => Ok(Json(asset)),
        None => Err(AppError::NotFound(format!("asset {id}")).into()),
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddUsageRequest {
    /// Opaque reference to the entity embedding the asset.
    pub reference: String,
}

#[utoipa::path(
    post,
    path = "/assets/{id}/usage",
    tag = "assets",
    params(("id" = String, Path, description = "Asset id")),
    request_body = AddUsageRequest,
    responses(
        (status = 200, description = "Usage list after append", body = [String]),
        (status = 404, description = "Unknown asset", body = crate::error::ErrorResponse)
    )
)]
pub async fn add_usage(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(body): AppJson<AddUsageRequest>,
) -> Result<Json<Vec<String>>, HttpAppError> {
    if state.repository.get(&id).await?.is_none() {
        return Err(AppError::NotFound(format!("asset {id}")).into());
    }
    state.repository.add_usage(&id, &body.reference).await?;
    let usage = state.repository.usage(&id).await?;
    Ok(Json(usage))
}
