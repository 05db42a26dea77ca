//! Axum router construction.
//!
//! Builds the application router with the export routes, middleware layers
//! and the OpenAPI document.

use axum::middleware;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::context::AppContext;
use crate::middleware::auth::auth_middleware;
use crate::middleware::request_id::request_id_middleware;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::health::health_check,
        routes::exports::create_export,
        routes::exports::list_templates,
        routes::exports::download_export,
        routes::exports::delete_export,
        routes::entitlement::get_entitlement,
    ),
    components(schemas(
        routes::health::HealthResponse,
        routes::exports::CreateExportRequest,
        routes::exports::ExportOptionsBody,
        routes::exports::ExportResponse,
        routes::exports::TrackResponse,
        routes::exports::TemplateResponse,
        routes::entitlement::EntitlementResponse,
        routes::entitlement::DownloadEntry,
    ))
)]
pub struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let protected_routes = Router::new()
        .route("/exports", axum::routing::post(routes::exports::create_export))
        .route("/exports/templates", get(routes::exports::list_templates))
        .route(
            "/exports/{file_name}",
            get(routes::exports::download_export).delete(routes::exports::delete_export),
        )
        .route("/entitlement", get(routes::entitlement::get_entitlement))
        .layer(middleware::from_fn_with_state(ctx.clone(), auth_middleware));

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api-docs/openapi.json", get(openapi_json))
        .nest("/api", protected_routes)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
