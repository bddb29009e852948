//! Bluetooth session API endpoints.
//!
//! Drives the BLE session through its lifecycle: grant permissions, start
//! the adapter, run a discovery pass, then connect to one tagged ball.

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use jacktrack_core::config::MAX_SCAN_DURATION_MS;
use jacktrack_core::{
    AdapterState, Connection, ConnectionState, Granted, PeripheralRecord, StartOptions,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult};
use crate::state::SharedState;

/// Creates the BLE router with all endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/permissions", post(ensure_permissions))
        .route("/start", post(start_adapter))
        .route("/scan", post(scan))
        .route("/peripherals", get(get_peripherals))
        .route("/connection", get(get_connection))
        .route("/connect", post(connect))
        .route("/disconnect", post(disconnect))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Adapter start request. Omitted fields use the configured defaults.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[schema(example = json!({"suppress_system_alert": true}))]
pub struct StartRequest {
    /// Suppress the platform's own "turn Bluetooth on" dialog.
    #[schema(example = true)]
    pub suppress_system_alert: Option<bool>,
}

/// Adapter readiness.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"state": "ready"}))]
pub struct AdapterResponse {
    /// Current adapter state.
    pub state: AdapterState,
}

/// Discovery pass request. Omitted fields use the configured defaults.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[schema(example = json!({"duration_ms": 5000, "allow_duplicates": true}))]
pub struct ScanRequest {
    /// Scan window in milliseconds. Must be positive.
    #[schema(example = 5000)]
    pub duration_ms: Option<i64>,

    /// Report repeated advertisements from the same peripheral.
    #[schema(example = true)]
    pub allow_duplicates: Option<bool>,
}

/// Result of a discovery pass.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "peripherals": [
        {"id": "AA:BB", "name": "Ball 1", "rssi": -58},
        {"id": "CC:DD", "name": null, "rssi": -71}
    ],
    "duration_ms": 5000,
    "scanned_at_utc": "2024-01-15T09:30:05Z"
}))]
pub struct ScanResponse {
    /// Peripherals seen during the window, in discovery order.
    pub peripherals: Vec<PeripheralRecord>,

    /// Window that was scanned.
    #[schema(example = 5000)]
    pub duration_ms: i64,

    /// When the window closed.
    pub scanned_at_utc: DateTime<Utc>,
}

/// Latest discovery snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "peripherals": [{"id": "AA:BB", "name": "Ball 1", "rssi": -58}],
    "scanning": false
}))]
pub struct PeripheralsResponse {
    /// Peripherals from the last completed scan.
    pub peripherals: Vec<PeripheralRecord>,

    /// Whether a scan window is open right now.
    #[schema(example = false)]
    pub scanning: bool,
}

/// Connection state and, when connected, the live connection.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "state": {"state": "connected", "peripheral_id": "AA:BB"},
    "connection": {
        "peripheral": {"id": "AA:BB", "name": "Ball 1", "rssi": -58},
        "services": {"services": []},
        "connected_at_utc": "2024-01-15T09:30:07Z"
    }
}))]
pub struct ConnectionResponse {
    /// Current connection state.
    pub state: ConnectionState,

    /// The connection, present only while connected.
    pub connection: Option<Connection>,
}

/// Target of a connect or disconnect.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({"peripheral_id": "AA:BB"}))]
pub struct PeripheralRequest {
    /// Peripheral id as reported by the scan.
    #[schema(example = "AA:BB")]
    pub peripheral_id: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Request any missing Bluetooth permissions.
#[utoipa::path(
    post,
    path = "/api/ble/permissions",
    tag = "ble",
    operation_id = "ensurePermissions",
    summary = "Ensure Bluetooth permissions",
    description = "Requests scan, connect and location capabilities if they are \
        not already held. Platforms without runtime permissions grant them at once.",
    responses(
        (status = 200, description = "All permissions held", body = Granted),
        (status = 424, description = "Permissions denied", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn ensure_permissions(State(state): State<SharedState>) -> ApiResult<Json<Granted>> {
    let granted = state.session().ensure_permissions().await?;
    Ok(Json(granted))
}

/// Start the Bluetooth adapter.
#[utoipa::path(
    post,
    path = "/api/ble/start",
    tag = "ble",
    operation_id = "startAdapter",
    summary = "Start the Bluetooth adapter",
    description = "Initializes the platform Bluetooth stack. Idempotent: calling \
        it again once ready returns `ready` without touching the adapter.",
    request_body(content = StartRequest, content_type = "application/json"),
    responses(
        (status = 200, description = "Adapter ready", body = AdapterResponse),
        (status = 503, description = "Adapter unavailable", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn start_adapter(
    State(state): State<SharedState>,
    body: Bytes,
) -> ApiResult<Json<AdapterResponse>> {
    let request: StartRequest = optional_json(&body)?;
    let options = StartOptions {
        suppress_system_alert: request
            .suppress_system_alert
            .unwrap_or(state.config().ble.suppress_system_alert),
    };

    let adapter_state = state.session().start(options).await?;
    Ok(Json(AdapterResponse {
        state: adapter_state,
    }))
}

/// Run one discovery pass.
#[utoipa::path(
    post,
    path = "/api/ble/scan",
    tag = "ble",
    operation_id = "scanPeripherals",
    summary = "Scan for tagged golf balls",
    description = "Scans for the requested window and returns every peripheral \
        seen. The response arrives after the window closes. Only one scan may \
        run at a time.",
    request_body(content = ScanRequest, content_type = "application/json"),
    responses(
        (status = 200, description = "Scan completed", body = ScanResponse),
        (status = 400, description = "Invalid duration", body = crate::api::error::ErrorResponse),
        (status = 409, description = "A scan is already running", body = crate::api::error::ErrorResponse),
        (status = 424, description = "Permissions missing or adapter not started", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn scan(
    State(state): State<SharedState>,
    body: Bytes,
) -> ApiResult<Json<ScanResponse>> {
    let request: ScanRequest = optional_json(&body)?;
    let defaults = &state.config().ble;
    let duration_ms = request
        .duration_ms
        .unwrap_or_else(|| i64::try_from(defaults.scan_duration_ms).unwrap_or(i64::MAX));
    let allow_duplicates = request.allow_duplicates.unwrap_or(defaults.allow_duplicates);

    if u64::try_from(duration_ms).is_ok_and(|ms| ms > MAX_SCAN_DURATION_MS) {
        return Err(ApiError::BadRequest {
            error_code: "scan_too_long".to_string(),
            message: format!("duration_ms must be at most {MAX_SCAN_DURATION_MS}"),
        });
    }

    let peripherals = state.session().scan(duration_ms, allow_duplicates).await?;
    info!(count = peripherals.len(), duration_ms, "scan completed");

    Ok(Json(ScanResponse {
        peripherals,
        duration_ms,
        scanned_at_utc: Utc::now(),
    }))
}

/// Latest discovery snapshot.
#[utoipa::path(
    get,
    path = "/api/ble/peripherals",
    tag = "ble",
    operation_id = "getPeripherals",
    summary = "Get peripherals from the last scan",
    responses(
        (status = 200, description = "Snapshot retrieved", body = PeripheralsResponse)
    )
)]
pub async fn get_peripherals(State(state): State<SharedState>) -> Json<PeripheralsResponse> {
    let session = state.session();
    Json(PeripheralsResponse {
        peripherals: session.discovered().await,
        scanning: session.is_scanning(),
    })
}

/// Current connection state.
#[utoipa::path(
    get,
    path = "/api/ble/connection",
    tag = "ble",
    operation_id = "getConnection",
    summary = "Get the connection state",
    responses(
        (status = 200, description = "State retrieved", body = ConnectionResponse)
    )
)]
pub async fn get_connection(State(state): State<SharedState>) -> Json<ConnectionResponse> {
    Json(connection_response(&state).await)
}

/// Connect to a discovered ball.
#[utoipa::path(
    post,
    path = "/api/ble/connect",
    tag = "ble",
    operation_id = "connectPeripheral",
    summary = "Connect to a golf ball",
    description = "Connects to a peripheral from the last scan and resolves its \
        services. On any failure the link is torn down and the state returns \
        to disconnected.",
    request_body = PeripheralRequest,
    responses(
        (status = 200, description = "Connected", body = Connection),
        (status = 404, description = "Peripheral not in the last scan", body = crate::api::error::ErrorResponse),
        (status = 409, description = "Another connection is active or in progress", body = crate::api::error::ErrorResponse),
        (status = 424, description = "Adapter not started", body = crate::api::error::ErrorResponse),
        (status = 503, description = "Link or service resolution failed", body = crate::api::error::ErrorResponse),
        (status = 504, description = "Connect timed out", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn connect(
    State(state): State<SharedState>,
    body: Result<Json<PeripheralRequest>, JsonRejection>,
) -> ApiResult<Json<Connection>> {
    let Json(request) = body?;
    let peripheral_id = validated_id(&request.peripheral_id)?;
    let connection = state.session().connect(peripheral_id).await?;
    Ok(Json(connection))
}

/// Disconnect a ball.
#[utoipa::path(
    post,
    path = "/api/ble/disconnect",
    tag = "ble",
    operation_id = "disconnectPeripheral",
    summary = "Disconnect a golf ball",
    description = "Tears down the link. Disconnecting a peripheral that is not \
        connected succeeds and changes nothing.",
    request_body = PeripheralRequest,
    responses(
        (status = 200, description = "Disconnected", body = ConnectionResponse),
        (status = 503, description = "Platform failed to disconnect", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn disconnect(
    State(state): State<SharedState>,
    body: Result<Json<PeripheralRequest>, JsonRejection>,
) -> ApiResult<Json<ConnectionResponse>> {
    let Json(request) = body?;
    let peripheral_id = validated_id(&request.peripheral_id)?;
    state.session().disconnect(peripheral_id).await?;
    Ok(Json(connection_response(&state).await))
}

// ============================================================================
// Helpers
// ============================================================================

/// Parse an optional JSON body; an empty body yields the defaults.
fn optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> ApiResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest {
        error_code: "invalid_request_body".to_string(),
        message: e.to_string(),
    })
}

fn validated_id(peripheral_id: &str) -> ApiResult<&str> {
    let trimmed = peripheral_id.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest {
            error_code: "invalid_peripheral_id".to_string(),
            message: "peripheral_id must not be empty".to_string(),
        });
    }
    Ok(trimmed)
}

async fn connection_response(state: &SharedState) -> ConnectionResponse {
    let session = state.session();
    ConnectionResponse {
        state: session.state().await,
        connection: session.connection().await,
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use jacktrack_core::PlatformCall;
    use serde_json::{json, Value};

    use super::*;
    use crate::api::create_router;
    use crate::state::test_support::demo_state;

    fn server() -> (TestServer, std::sync::Arc<jacktrack_core::MockPlatform>) {
        let (state, platform) = demo_state();
        (TestServer::new(create_router(state)).unwrap(), platform)
    }

    #[tokio::test]
    async fn test_scan_before_start_is_failed_dependency() {
        let (server, platform) = server();

        let response = server
            .post("/api/ble/scan")
            .json(&json!({"duration_ms": 100}))
            .await;
        response.assert_status(StatusCode::FAILED_DEPENDENCY);
        assert_eq!(response.json::<Value>()["error"], "adapter_not_ready");
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn test_non_positive_duration_is_bad_request() {
        let (server, _) = server();
        server.post("/api/ble/start").await.assert_status_ok();

        let response = server
            .post("/api/ble/scan")
            .json(&json!({"duration_ms": 0}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["error"], "invalid_argument");

        server
            .post("/api/ble/scan")
            .json(&json!({"duration_ms": 600_000}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let (server, platform) = server();

        for _ in 0..2 {
            let response = server
                .post("/api/ble/start")
                .json(&json!({"suppress_system_alert": true}))
                .await;
            response.assert_status_ok();
            assert_eq!(response.json::<Value>()["state"], "ready");
        }
        assert_eq!(platform.adapter_start_count(), 1);
    }

    #[tokio::test]
    async fn test_scan_connect_disconnect_flow() {
        let (server, platform) = server();
        server.post("/api/ble/start").await.assert_status_ok();

        let scan = server
            .post("/api/ble/scan")
            .json(&json!({"duration_ms": 50, "allow_duplicates": false}))
            .await;
        scan.assert_status_ok();
        let body = scan.json::<Value>();
        assert_eq!(body["peripherals"][0]["id"], "AA:BB");
        assert_eq!(body["peripherals"][0]["name"], "Ball 1");
        assert_eq!(body["peripherals"][1]["name"], Value::Null);
        assert!(platform.calls().contains(&PlatformCall::ScanForPeripherals {
            timeout_secs: 1,
            allow_duplicates: false,
        }));

        let snapshot = server.get("/api/ble/peripherals").await.json::<Value>();
        assert_eq!(snapshot["scanning"], false);
        assert_eq!(snapshot["peripherals"].as_array().unwrap().len(), 2);

        let connected = server
            .post("/api/ble/connect")
            .json(&json!({"peripheral_id": "AA:BB"}))
            .await;
        connected.assert_status_ok();
        assert_eq!(connected.json::<Value>()["peripheral"]["id"], "AA:BB");

        let state = server.get("/api/ble/connection").await.json::<Value>();
        assert_eq!(state["state"]["state"], "connected");
        assert_eq!(state["state"]["peripheral_id"], "AA:BB");

        server
            .post("/api/ble/connect")
            .json(&json!({"peripheral_id": "CC:DD"}))
            .await
            .assert_status(StatusCode::CONFLICT);

        let disconnected = server
            .post("/api/ble/disconnect")
            .json(&json!({"peripheral_id": "AA:BB"}))
            .await;
        disconnected.assert_status_ok();
        let body = disconnected.json::<Value>();
        assert_eq!(body["state"]["state"], "disconnected");
        assert_eq!(body["connection"], Value::Null);
    }

    #[tokio::test]
    async fn test_connect_unknown_peripheral_is_not_found() {
        let (server, _) = server();
        server.post("/api/ble/start").await.assert_status_ok();
        server
            .post("/api/ble/scan")
            .json(&json!({"duration_ms": 10}))
            .await
            .assert_status_ok();

        let response = server
            .post("/api/ble/connect")
            .json(&json!({"peripheral_id": "ZZ:ZZ"}))
            .await;
        response.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(response.json::<Value>()["error"], "peripheral_not_found");

        let state = server.get("/api/ble/connection").await.json::<Value>();
        assert_eq!(state["state"]["state"], "disconnected");
    }

    #[tokio::test]
    async fn test_malformed_connect_body_is_bad_request() {
        let (server, _) = server();
        let response = server.post("/api/ble/connect").json(&json!({"id": 1})).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["error"], "invalid_request_body");

        server
            .post("/api/ble/connect")
            .json(&json!({"peripheral_id": "  "}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_permissions_granted_without_runtime_model() {
        let (server, _) = server();
        let response = server.post("/api/ble/permissions").await;
        response.assert_status_ok();
        let body = response.json::<Value>();
        assert_eq!(body["prompted"], false);
        assert_eq!(body["permissions"].as_array().unwrap().len(), 3);
    }
}
