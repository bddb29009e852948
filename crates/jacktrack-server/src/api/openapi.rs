//! OpenAPI specification generation for the JackTrack API.
//!
//! The document is served at `/api/openapi.json`, browsable through Swagger UI
//! at `/swagger-ui`, and written to the workspace root by the `gen-openapi`
//! binary for client generation.

use axum::Json;
use jacktrack_core::{
    AdapterState, Backup, CharacteristicInfo, Connection, ConnectionState, Granted, HoleScore,
    Permission, PeripheralRecord, RoundDraft, RoundRecord, RoundStats, RoundStatus, ServiceInfo,
    ServiceTable, Settings, SettingsPatch,
};
use utoipa::OpenApi;

use super::ble::{
    AdapterResponse, ConnectionResponse, PeripheralRequest, PeripheralsResponse, ScanRequest,
    ScanResponse, StartRequest,
};
use super::data::ImportResponse;
use super::error::ErrorResponse;
use super::health::HealthResponse;
use super::rounds::RoundsResponse;

/// Serve the OpenAPI specification as JSON.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Returns the OpenAPI specification as pretty JSON.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn get_openapi_json() -> Result<String, serde_json::Error> {
    ApiDoc::openapi().to_pretty_json()
}

/// Main OpenAPI document structure for JackTrack.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "JackTrack API",
        version = "0.1.0",
        description = r#"
# JackTrack API

JackTrack pairs with Bluetooth-tagged golf balls and keeps a history of your rounds.

## Pairing a ball

1. `POST /api/ble/permissions` to obtain Bluetooth permissions
2. `POST /api/ble/start` to start the adapter
3. `POST /api/ble/scan` to scan for balls; the response arrives when the window closes
4. `POST /api/ble/connect` with a `peripheral_id` from the scan

Only one scan and one connection may be active at a time. Conflicting
requests return `409`. Calls made before permissions are granted or the
adapter is started return `424`.

## Rounds and settings

Rounds, settings and backups are stored locally as JSON documents.
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local JackTrack server")
    ),
    tags(
        (name = "system", description = "Health checks"),
        (name = "ble", description = "Bluetooth session: permissions, adapter, discovery and connection"),
        (name = "rounds", description = "Round history and statistics"),
        (name = "settings", description = "User settings"),
        (name = "data", description = "Backup export, import and deletion")
    ),
    paths(
        super::health::health_check,
        super::ble::ensure_permissions,
        super::ble::start_adapter,
        super::ble::scan,
        super::ble::get_peripherals,
        super::ble::get_connection,
        super::ble::connect,
        super::ble::disconnect,
        super::rounds::list_rounds,
        super::rounds::add_round,
        super::rounds::get_stats,
        super::rounds::update_round,
        super::rounds::delete_round,
        super::settings::get_settings,
        super::settings::update_settings,
        super::data::export_data,
        super::data::import_data,
        super::data::delete_all,
    ),
    components(
        schemas(
            // Error types
            ErrorResponse,
            // Health types
            HealthResponse,
            // BLE types
            Permission,
            Granted,
            AdapterState,
            StartRequest,
            AdapterResponse,
            ScanRequest,
            ScanResponse,
            PeripheralRecord,
            PeripheralsResponse,
            CharacteristicInfo,
            ServiceInfo,
            ServiceTable,
            Connection,
            ConnectionState,
            ConnectionResponse,
            PeripheralRequest,
            // Round types
            RoundStatus,
            HoleScore,
            RoundDraft,
            RoundRecord,
            RoundStats,
            RoundsResponse,
            // Settings types
            Settings,
            SettingsPatch,
            // Data types
            Backup,
            ImportResponse,
        )
    )
)]
pub struct ApiDoc;
