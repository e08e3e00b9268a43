use axum::{Json, Router, extract::State, routing::post};
use std::sync::Arc;
use tracing::error;

use crate::db::models::AssetKey;
use crate::web::models::task_models::{AssetStatusView, TaskStatusQuery, TaskStatusRecord};
use crate::web::{AppState, error::AppError};

/// Mounted under `/api/tasks`.
pub fn task_status_routes() -> Router<Arc<AppState>> {
    Router::<Arc<AppState>>::new().route("/status", post(get_tasks_status))
}

/// Mounted under `/api/assets`.
pub fn asset_status_routes() -> Router<Arc<AppState>> {
    Router::<Arc<AppState>>::new().route("/status", post(get_assets_status))
}

#[axum::debug_handler]
async fn get_tasks_status(
    State(app_state): State<Arc<AppState>>,
    Json(queries): Json<Vec<TaskStatusQuery>>,
) -> Result<Json<Vec<TaskStatusRecord>>, AppError> {
    match app_state.status_aggregator.get_tasks_status(&queries).await {
        Ok(records) => Ok(Json(records)),
        Err(e) => {
            error!(tasks = queries.len(), error = %e, "Error fetching task statuses.");
            Err(e.into())
        }
    }
}

#[axum::debug_handler]
async fn get_assets_status(
    State(app_state): State<Arc<AppState>>,
    Json(assets): Json<Vec<AssetKey>>,
) -> Result<Json<Vec<AssetStatusView>>, AppError> {
    match app_state.status_aggregator.get_assets_status(&assets).await {
        Ok(views) => Ok(Json(views)),
        Err(e) => {
            error!(assets = assets.len(), error = %e, "Error fetching asset statuses.");
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::db::entities::asset_status;
    use crate::services::error_catalog::ErrorCatalog;
    use crate::test_support::{TEST_TOKEN, app, harness, json_body};
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use chrono::Utc;
    use sea_orm::{EntityTrait, Set};
    use serde_json::json;
    use tower::ServiceExt;

    fn post(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {TEST_TOKEN}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_empty_task_status_batch() {
        let h = harness(false, false).await;
        let response = app(&h, ErrorCatalog::default())
            .oneshot(post("/api/tasks/status", json!([])))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!([]));
    }

    #[tokio::test]
    async fn test_online_asset_reported_missing() {
        let h = harness(false, false).await;
        asset_status::Entity::insert(asset_status::ActiveModel {
            type_id: Set("GW".to_string()),
            asset_id: Set("A1".to_string()),
            status: Set(Some("Online".to_string())),
            error_code: Set(Some("E001".to_string())),
            parent_type_id: Set(None),
            parent_asset_id: Set(None),
            updated_at: Set(Utc::now()),
        })
        .exec_without_returning(&h.db)
        .await
        .unwrap();
        let catalog = ErrorCatalog::from_toml_str("[GW]\nE001 = \"Gateway unreachable\"").unwrap();

        let response = app(&h, catalog)
            .oneshot(post(
                "/api/assets/status",
                json!([{ "typeId": "GW", "assetId": "A1" }]),
            ))
            .await
            .unwrap();
        let views = json_body(response).await;
        assert_eq!(views[0]["status"], "Missing");
        assert_eq!(views[0]["errorMessage"], "Gateway unreachable");
        assert_eq!(views[0]["subAssets"], json!([]));
    }

    #[tokio::test]
    async fn test_unknown_task_in_batch_is_not_found() {
        let h = harness(false, false).await;
        let response = app(&h, ErrorCatalog::default())
            .oneshot(post("/api/tasks/status", json!([{ "taskId": "nope" }])))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
