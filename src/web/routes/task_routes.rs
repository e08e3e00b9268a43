use axum::{
    Json,
    Router,
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
};
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

use crate::db::models::{AssetKey, NewDeployment};
use crate::db::services::task_store::TaskStoreError;
use crate::web::models::AuthenticatedUser;
use crate::web::models::task_models::{
    CreateAssetTaskRequest, CreateDeploymentRequest, TaskAssetDetail, TaskCreatedResponse,
    TaskDetailResponse, TaskListQuery, TaskPage, TaskStartedResponse, UpdateAssetStatusRequest,
};
use crate::web::{AppState, error::AppError};

pub fn task_routes() -> Router<Arc<AppState>> {
    Router::<Arc<AppState>>::new()
        .route("/", get(list_tasks))
        .route("/deployments", post(create_deployment_task))
        .route("/logs", post(create_log_task))
        .route("/reboots", post(create_reboot_task))
        .route("/self-tests", post(create_self_test_task))
        .route("/{task_id}", get(get_task))
        .route("/{task_id}/start", post(start_task))
        .route(
            "/{task_id}/assets/{type_id}/{asset_id}/status",
            put(update_asset_status),
        )
}

/// Logs a failed task operation at a level matching its cause.
fn task_error(operation: &'static str, task_id: &str, err: TaskStoreError) -> AppError {
    match &err {
        TaskStoreError::Internal(_) => {
            error!(operation, task_id = %task_id, error = %err, "Task operation failed.");
        }
        _ => warn!(operation, task_id = %task_id, error = %err, "Task operation rejected."),
    }
    AppError::from(err)
}

fn new_task_id() -> String {
    Uuid::new_v4().to_string()
}

#[axum::debug_handler]
async fn create_deployment_task(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<CreateDeploymentRequest>,
) -> Result<(StatusCode, Json<TaskCreatedResponse>), AppError> {
    let name = payload
        .name
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| AppError::InvalidInput("name is required".to_string()))?;

    let deployment = NewDeployment {
        download_task_id: new_task_id(),
        install_task_id: new_task_id(),
        name,
        created_by: authenticated_user.display_name,
        assets: payload.assets,
        package_ids: payload.package_ids,
    };
    app_state
        .task_manager
        .create_deployment(&deployment)
        .await
        .map_err(|e| task_error("create_deployment", &deployment.download_task_id, e))?;

    Ok((
        StatusCode::CREATED,
        Json(TaskCreatedResponse {
            task_id: deployment.download_task_id,
            install_task_id: Some(deployment.install_task_id),
        }),
    ))
}

#[axum::debug_handler]
async fn create_log_task(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<CreateAssetTaskRequest>,
) -> Result<(StatusCode, Json<TaskCreatedResponse>), AppError> {
    let task_id = new_task_id();
    app_state
        .task_manager
        .create_log_task(task_id.clone(), authenticated_user.display_name, payload.assets)
        .await
        .map_err(|e| task_error("create_log_task", &task_id, e))?;
    Ok(created(task_id))
}

#[axum::debug_handler]
async fn create_reboot_task(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<CreateAssetTaskRequest>,
) -> Result<(StatusCode, Json<TaskCreatedResponse>), AppError> {
    let task_id = new_task_id();
    app_state
        .task_manager
        .create_reboot_task(task_id.clone(), authenticated_user.display_name, payload.assets)
        .await
        .map_err(|e| task_error("create_reboot_task", &task_id, e))?;
    Ok(created(task_id))
}

#[axum::debug_handler]
async fn create_self_test_task(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<CreateAssetTaskRequest>,
) -> Result<(StatusCode, Json<TaskCreatedResponse>), AppError> {
    let task_id = new_task_id();
    app_state
        .task_manager
        .create_self_test_task(task_id.clone(), authenticated_user.display_name, payload.assets)
        .await
        .map_err(|e| task_error("create_self_test_task", &task_id, e))?;
    Ok(created(task_id))
}

fn created(task_id: String) -> (StatusCode, Json<TaskCreatedResponse>) {
    (
        StatusCode::CREATED,
        Json(TaskCreatedResponse {
            task_id,
            install_task_id: None,
        }),
    )
}

#[axum::debug_handler]
async fn list_tasks(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<TaskListQuery>,
) -> Result<Json<TaskPage>, AppError> {
    let page = app_state
        .task_manager
        .list_tasks(&query)
        .await
        .map_err(|e| task_error("list_tasks", "-", e))?;
    Ok(Json(page))
}

#[axum::debug_handler]
async fn get_task(
    State(app_state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskDetailResponse>, AppError> {
    let detail = app_state
        .task_manager
        .get_task(&task_id)
        .await
        .map_err(|e| task_error("get_task", &task_id, e))?;
    Ok(Json(detail))
}

#[axum::debug_handler]
async fn start_task(
    State(app_state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStartedResponse>, AppError> {
    let started_assets = app_state
        .task_manager
        .start_task(&task_id)
        .await
        .map_err(|e| task_error("start_task", &task_id, e))?;
    Ok(Json(TaskStartedResponse {
        task_id,
        started_assets,
    }))
}

#[axum::debug_handler]
async fn update_asset_status(
    State(app_state): State<Arc<AppState>>,
    Path((task_id, type_id, asset_id)): Path<(String, String, String)>,
    Json(payload): Json<UpdateAssetStatusRequest>,
) -> Result<Json<TaskAssetDetail>, AppError> {
    let asset = AssetKey::new(type_id, asset_id);
    let updated = app_state
        .task_manager
        .update_asset_status(&task_id, &asset, payload.status)
        .await
        .map_err(|e| task_error("update_asset_status", &task_id, e))?;
    Ok(Json(updated.into()))
}
