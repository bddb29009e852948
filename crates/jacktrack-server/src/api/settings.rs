//! Settings API endpoints.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use jacktrack_core::{Settings, SettingsPatch};
use tracing::info;

use crate::api::error::ApiResult;
use crate::state::SharedState;

/// Creates the settings router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/", get(get_settings).put(update_settings))
}

/// Current settings.
#[utoipa::path(
    get,
    path = "/api/settings",
    tag = "settings",
    operation_id = "getSettings",
    summary = "Get settings",
    responses(
        (status = 200, description = "Settings retrieved", body = Settings)
    )
)]
pub async fn get_settings(State(state): State<SharedState>) -> Json<Settings> {
    Json(state.settings().await.get())
}

/// Change some settings.
#[utoipa::path(
    put,
    path = "/api/settings",
    tag = "settings",
    operation_id = "updateSettings",
    summary = "Update settings",
    description = "Applies the fields present in the body and leaves the rest \
        unchanged. Returns the full settings object.",
    request_body = SettingsPatch,
    responses(
        (status = 200, description = "Settings updated", body = Settings),
        (status = 400, description = "Malformed body", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn update_settings(
    State(state): State<SharedState>,
    body: Result<Json<SettingsPatch>, JsonRejection>,
) -> ApiResult<Json<Settings>> {
    let Json(patch) = body?;
    if patch.is_empty() {
        return Ok(Json(state.settings().await.get()));
    }
    let settings = state.settings_mut().await.update(&patch)?;
    info!(?patch, "settings updated");
    Ok(Json(settings))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::{json, Value};

    use crate::api::create_router;
    use crate::state::test_support::demo_state;

    #[tokio::test]
    async fn test_defaults_then_partial_update() {
        let (state, _) = demo_state();
        let server = TestServer::new(create_router(state)).unwrap();

        let defaults = server.get("/api/settings").await.json::<Value>();
        assert_eq!(
            defaults,
            json!({
                "dark_mode": false,
                "notifications": true,
                "vibration": true,
                "auto_sync": true,
                "battery_optimization": false
            })
        );

        let updated = server
            .put("/api/settings")
            .json(&json!({"dark_mode": true, "vibration": false}))
            .await;
        updated.assert_status_ok();
        let body = updated.json::<Value>();
        assert_eq!(body["dark_mode"], true);
        assert_eq!(body["vibration"], false);
        assert_eq!(body["notifications"], true);

        let reread = server.get("/api/settings").await.json::<Value>();
        assert_eq!(reread, body);
    }

    #[tokio::test]
    async fn test_wrong_type_is_bad_request() {
        let (state, _) = demo_state();
        let server = TestServer::new(create_router(state)).unwrap();

        server
            .put("/api/settings")
            .json(&json!({"dark_mode": "yes"}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }
}
