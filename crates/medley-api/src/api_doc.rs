//! OpenAPI document assembly.

use utoipa::OpenApi;

use crate::error::ErrorResponse;
use crate::handlers::{assets, bulk, health};
use medley_core::{MediaAsset, MediaKind};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        bulk::bulk_operations,
        assets::register_asset,
        assets::list_assets,
        assets::get_asset,
        assets::add_usage,
    ),
    components(schemas(
        MediaAsset,
        MediaKind,
        ErrorResponse,
        bulk::BulkOperation,
        bulk::BulkRequest,
        bulk::BulkResponse,
        bulk::BulkResult,
        bulk::BulkError,
        assets::AddUsageRequest,
    )),
    tags(
        (name = "bulk", description = "Bulk media operations"),
        (name = "assets", description = "Asset register"),
        (name = "system", description = "Service health")
    )
)]
pub struct ApiDoc;
