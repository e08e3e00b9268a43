use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::entities::task;
use crate::db::enums::{AssetStatus, ResultStatus, TaskStatus, TaskType};
use crate::db::models::AssetKey;

// --- Creation ---

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CreateDeploymentRequest {
    pub name: Option<String>,
    #[serde(default)]
    pub package_ids: Vec<String>,
    #[serde(default)]
    pub assets: Vec<AssetKey>,
}

/// Body shared by the log, reboot and self-test creation routes.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CreateAssetTaskRequest {
    #[serde(default)]
    pub assets: Vec<AssetKey>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskCreatedResponse {
    pub task_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_task_id: Option<String>,
}

// --- Transitions ---

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAssetStatusRequest {
    pub status: AssetStatus,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TaskStartedResponse {
    pub task_id: String,
    pub started_assets: u64,
}

// --- Reads ---

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub id: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub name: Option<String>,
    pub status: TaskStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<task::Model> for TaskSummary {
    fn from(model: task::Model) -> Self {
        Self {
            id: model.id,
            task_type: model.task_type,
            name: model.name,
            status: model.status,
            created_by: model.created_by,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskAssetDetail {
    pub type_id: String,
    pub asset_id: String,
    pub status: AssetStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskDetailResponse {
    #[serde(flatten)]
    pub task: TaskSummary,
    pub assets: Vec<TaskAssetDetail>,
    pub package_ids: Vec<String>,
    /// Install task linked to a DownloadPackage task.
    pub related_task_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum TaskSortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    Name,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct TaskListQuery {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    #[serde(rename = "type")]
    pub task_type: Option<TaskType>,
    pub status: Option<TaskStatus>,
    pub sort_by: Option<TaskSortField>,
    pub order: Option<SortOrder>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TaskPage {
    pub items: Vec<TaskSummary>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
}

// --- Bulk status ---

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusQuery {
    pub task_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubDeviceStatusView {
    pub sub_type_id: String,
    pub sub_asset_id: String,
    pub status: ResultStatus,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LogResultView {
    pub status: ResultStatus,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub file_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskAssetStatusView {
    pub type_id: String,
    pub asset_id: String,
    pub status: AssetStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub sub_devices: Vec<SubDeviceStatusView>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub log_result: Option<LogResultView>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusRecord {
    pub task_id: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub assets: Vec<TaskAssetStatusView>,
}

/// Reported status of an asset and, recursively, of its sub-assets.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AssetStatusView {
    pub type_id: String,
    pub asset_id: String,
    pub status: String,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub sub_assets: Vec<AssetStatusView>,
}

impl From<crate::db::entities::task_asset::Model> for TaskAssetDetail {
    fn from(model: crate::db::entities::task_asset::Model) -> Self {
        Self {
            type_id: model.type_id,
            asset_id: model.asset_id,
            status: model.status,
            started_at: model.started_at,
            updated_at: model.updated_at,
        }
    }
}
