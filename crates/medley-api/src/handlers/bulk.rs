//! Bulk media operations: apply one operation across a set of asset ids.
//!
//! Per-id failures are isolated and reported in the response body; only
//! request-shape violations abort the call. A batch with failures still
//! returns 200 with `success: false`, so callers must inspect both arrays,
//! not just the envelope.
//!
//! Delete ordering per id: the external store first, metadata second, so the
//! two never diverge (either both gone or both present). The index list is
//! rewritten exactly once per batch, removing only the ids whose delete
//! fully succeeded.
//!
//! Known limitation: updates are last-write-wins with no optimistic
//! concurrency check, so two concurrent bulk updates on the same id can
//! clobber each other.

use std::collections::HashSet;
use std::sync::Arc;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use utoipa::ToSchema;

use medley_core::{models::IMMUTABLE_FIELDS, AppError};

use crate::error::{AppJson, HttpAppError};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BulkOperation {
    Update,
    Delete,
    Usage,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkRequest {
    pub operation: BulkOperation,
    pub ids: Vec<String>,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub updates: Option<Map<String, JsonValue>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BulkResult {
    pub id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub detail: Option<JsonValue>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BulkError {
    pub id: String,
    pub error: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BulkResponse {
    pub success: bool,
    pub results: Vec<BulkResult>,
    pub errors: Vec<BulkError>,
}

/// Fast-fail validation: malformed input aborts the whole call before any
/// per-item work starts.
fn validate(body: &BulkRequest, max_batch_size: usize) -> Result<(), AppError> {
    if body.ids.is_empty() {
        return Err(AppError::BadRequest("ids must not be empty".to_string()));
    }
    if body.ids.len() > max_batch_size {
        return Err(AppError::BadRequest(format!(
            "Batch size exceeds maximum of {max_batch_size}"
        )));
    }

    let mut seen = HashSet::with_capacity(body.ids.len());
    for id in &body.ids {
        if !seen.insert(id.as_str()) {
            return Err(AppError::BadRequest(format!(
                "duplicate id in batch: {id}"
            )));
        }
    }

    if body.operation == BulkOperation::Update {
        let updates = body
            .updates
            .as_ref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                AppError::BadRequest(
                    "updates must be a non-empty object for the update operation".to_string(),
                )
            })?;
        for key in updates.keys() {
            if IMMUTABLE_FIELDS.contains(&key.as_str()) || key == "updated_at" {
                return Err(AppError::BadRequest(format!(
                    "field '{key}' is immutable"
                )));
            }
        }
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/bulk",
    tag = "bulk",
    request_body = BulkRequest,
    responses(
        (status = 200, description = "Batch processed (inspect results and errors)", body = BulkResponse),
        (status = 400, description = "Malformed request", body = crate::error::ErrorResponse),
        (status = 500, description = "Coordinator failure", body = crate::error::ErrorResponse)
    )
)]
pub async fn bulk_operations(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<BulkRequest>,
) -> Result<Json<BulkResponse>, HttpAppError> {
    validate(&body, state.max_bulk_batch_size).map_err(HttpAppError::from)?;

    let mut results = Vec::with_capacity(body.ids.len());
    let mut errors = Vec::new();

    match body.operation {
        BulkOperation::Update => {
            let Some(updates) = body.updates.as_ref() else {
                return Err(HttpAppError(AppError::Internal(
                    "updates missing after validation".to_string(),
                )));
            };
            for id in &body.ids {
                match state.repository.get(id).await {
                    Ok(Some(mut asset)) => {
                        asset.apply_updates(updates);
                        match state.repository.put(&asset).await {
                            Ok(()) => results.push(BulkResult {
                                id: id.clone(),
                                success: true,
                                detail: None,
                            }),
                            Err(e) => errors.push(BulkError {
                                id: id.clone(),
                                error: e.to_string(),
                            }),
                        }
                    }
                    Ok(None) => errors.push(BulkError {
                        id: id.clone(),
                        error: "not found".to_string(),
                    }),
                    Err(e) => errors.push(BulkError {
                        id: id.clone(),
                        error: e.to_string(),
                    }),
                }
            }
        }
        BulkOperation::Delete => {
            let mut removed = Vec::new();
            for id in &body.ids {
                match state.repository.get(id).await {
                    Ok(Some(asset)) => {
                        // Backend first, metadata second. On backend failure
                        // the record stays so the two stores never diverge.
                        let backend = state.backends.for_kind(asset.kind);
                        if let Err(e) = backend.delete(&asset.backend_ref).await {
                            tracing::warn!(
                                asset_id = %id,
                                kind = %asset.kind,
                                error = %e,
                                "Backend delete failed, keeping metadata"
                            );
                            errors.push(BulkError {
                                id: id.clone(),
                                error: e.to_string(),
                            });
                            continue;
                        }
                        match state.repository.delete_record(id).await {
                            Ok(()) => {
                                removed.push(id.clone());
                                results.push(BulkResult {
                                    id: id.clone(),
                                    success: true,
                                    detail: None,
                                });
                            }
                            Err(e) => errors.push(BulkError {
                                id: id.clone(),
                                error: e.to_string(),
                            }),
                        }
                    }
                    Ok(None) => errors.push(BulkError {
                        id: id.clone(),
                        error: "not found".to_string(),
                    }),
                    Err(e) => errors.push(BulkError {
                        id: id.clone(),
                        error: e.to_string(),
                    }),
                }
            }
            // One index rewrite per batch; failed ids stay listed.
            state
                .repository
                .remove_from_index(&removed)
                .await
                .map_err(HttpAppError::from)?;
        }
        BulkOperation::Usage => {
            for id in &body.ids {
                match state.repository.usage(id).await {
                    // Ids with no usage record yield an empty list, not an
                    // error.
                    Ok(usage) => results.push(BulkResult {
                        id: id.clone(),
                        success: true,
                        detail: Some(JsonValue::from(usage)),
                    }),
                    Err(e) => errors.push(BulkError {
                        id: id.clone(),
                        error: e.to_string(),
                    }),
                }
            }
        }
    }

    tracing::info!(
        operation = ?body.operation,
        total = body.ids.len(),
        succeeded = results.len(),
        failed = errors.len(),
        "Bulk operation completed"
    );

    Ok(Json(BulkResponse {
        success: errors.is_empty(),
        results,
        errors,
    }))
}
