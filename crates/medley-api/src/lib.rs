//! HTTP surface for Medley: bulk media operations and the asset register.

pub mod api_doc;
pub mod error;
pub mod handlers;
pub mod state;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;

use crate::api_doc::ApiDoc;
use crate::state::AppState;

/// Build the application router. CORS and other deployment-specific layers
/// are added by the binary; tests drive this router directly.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/bulk", post(handlers::bulk::bulk_operations))
        .route(
            "/assets",
            post(handlers::assets::register_asset).get(handlers::assets::list_assets),
        )
        .route("/assets/{id}", get(handlers::assets::get_asset))
        .route("/assets/{id}/usage", post(handlers::assets::add_usage))
        .merge(RapiDoc::with_openapi("/api-docs/openapi.json", ApiDoc::openapi()).path("/docs"))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
