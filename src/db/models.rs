use serde::{Deserialize, Serialize};

use crate::db::enums::{ResultStatus, TaskType};

/// Identifies a physical asset in the fleet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetKey {
    pub type_id: String,
    pub asset_id: String,
}

impl AssetKey {
    pub fn new(type_id: impl Into<String>, asset_id: impl Into<String>) -> Self {
        Self {
            type_id: type_id.into(),
            asset_id: asset_id.into(),
        }
    }
}

/// Everything needed to persist one task. The id is chosen by the caller so
/// it can be referenced by relations and dispatch before the insert commits.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub id: String,
    pub task_type: TaskType,
    pub name: Option<String>,
    pub created_by: String,
    pub assets: Vec<AssetKey>,
    pub package_ids: Vec<String>,
}

/// The download + install pair created by one deployment request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDeployment {
    pub download_task_id: String,
    pub install_task_id: String,
    pub name: String,
    pub created_by: String,
    pub assets: Vec<AssetKey>,
    pub package_ids: Vec<String>,
}

impl NewDeployment {
    pub fn download_task(&self) -> NewTask {
        self.task(self.download_task_id.clone(), TaskType::DownloadPackage)
    }

    pub fn install_task(&self) -> NewTask {
        self.task(self.install_task_id.clone(), TaskType::Install)
    }

    fn task(&self, id: String, task_type: TaskType) -> NewTask {
        NewTask {
            id,
            task_type,
            name: Some(self.name.clone()),
            created_by: self.created_by.clone(),
            assets: self.assets.clone(),
            package_ids: self.package_ids.clone(),
        }
    }
}

/// Outcome reported by execution for one nested sub-asset of a task asset.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubDeviceOutcome {
    pub asset: AssetKey,
    pub sub_type_id: String,
    pub sub_asset_id: String,
    pub status: ResultStatus,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

/// Outcome of one log retrieval against a task asset.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRetrievalOutcome {
    pub asset: AssetKey,
    pub status: ResultStatus,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub file_path: Option<String>,
}
