//! HTTP API routes and handlers.
//!
//! This module contains all HTTP endpoint implementations organized by domain:
//! - `ble` - Bluetooth session lifecycle
//! - `rounds` - Round history and statistics
//! - `settings` - User settings
//! - `data` - Backup export, import and wipe
//! - `health` - Service health checks
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::state::SharedState;

pub mod ble;
pub mod data;
pub mod error;
pub mod health;
pub mod openapi;
pub mod rounds;
pub mod settings;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use openapi::get_openapi_json;

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                - Health check
/// /swagger-ui            - Swagger UI
/// /api
/// ├── /ble               - Permissions, adapter, scan, connect, disconnect
/// ├── /rounds            - Round history and stats
/// ├── /settings          - User settings
/// ├── /data              - Export, import, delete all
/// └── /openapi.json      - OpenAPI specification
/// ```
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest(
            "/api",
            Router::new()
                .route("/openapi.json", get(openapi::get_openapi_spec))
                .nest("/ble", ble::router())
                .nest("/rounds", rounds::router())
                .nest("/settings", settings::router())
                .nest("/data", data::router()),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum_test::TestServer;

    use super::*;
    use crate::state::test_support::demo_state;

    #[tokio::test]
    async fn test_openapi_route() {
        let (state, _) = demo_state();
        let server = TestServer::new(create_router(state)).unwrap();

        let response = server.get("/api/openapi.json").await;
        response.assert_status_ok();
        assert_eq!(
            response.json::<serde_json::Value>()["info"]["title"],
            "JackTrack API"
        );
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let (state, _) = demo_state();
        let server = TestServer::new(create_router(state)).unwrap();
        server
            .get("/api/unknown")
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}
