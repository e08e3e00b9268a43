use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::db::enums::TaskType;
use crate::db::models::{AssetKey, NewTask};
use crate::server::best_effort::{absorb, SideEffect};
use crate::services::event_sink::{EventSink, EventSinkError, TaskEvent, TaskEventRecord};
use crate::services::package_lookup::{PackageLookup, PackageLookupError};

#[derive(Error, Debug)]
pub enum EventRecorderError {
    #[error("Package lookup failed: {0}")]
    PackageLookup(#[from] PackageLookupError),
    #[error("Event sink failed: {0}")]
    Sink(#[from] EventSinkError),
}

/// What the recorder needs to know about a committed task.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskEventParams {
    pub task_id: String,
    pub task_type: TaskType,
    pub task_name: Option<String>,
    pub created_by: String,
    pub assets: Vec<AssetKey>,
    pub package_ids: Vec<String>,
}

impl From<&NewTask> for TaskEventParams {
    fn from(task: &NewTask) -> Self {
        Self {
            task_id: task.id.clone(),
            task_type: task.task_type,
            task_name: task.name.clone(),
            created_by: task.created_by.clone(),
            assets: task.assets.clone(),
            package_ids: task.package_ids.clone(),
        }
    }
}

/// Writes the creation audit trail of a task, one row per asset.
#[derive(Clone)]
pub struct EventRecorder {
    sink: Arc<dyn EventSink>,
    packages: Arc<dyn PackageLookup>,
}

impl EventRecorder {
    pub fn new(sink: Arc<dyn EventSink>, packages: Arc<dyn PackageLookup>) -> Self {
        Self { sink, packages }
    }

    /// Never fails: the task is already committed when this runs.
    pub async fn record_event(&self, params: &TaskEventParams) -> SideEffect {
        absorb("record_event", params, self.write_events(params)).await
    }

    async fn write_events(&self, params: &TaskEventParams) -> Result<(), EventRecorderError> {
        let detail = self.describe(params).await?;

        // One write at a time to bound the load on the sink.
        for asset in &params.assets {
            let record = TaskEventRecord {
                task_id: params.task_id.clone(),
                type_id: asset.type_id.clone(),
                asset_id: asset.asset_id.clone(),
                task_name: params.task_name.clone(),
                detail: detail.clone(),
                created_by: params.created_by.clone(),
            };
            let Some(event) = TaskEvent::for_task_type(params.task_type, record) else {
                debug!(task_id = %params.task_id, task_type = %params.task_type, "No audit event for task type.");
                return Ok(());
            };
            self.sink.insert_create(event).await?;
        }
        Ok(())
    }

    /// Deployment events carry the package display names, comma separated.
    async fn describe(&self, params: &TaskEventParams) -> Result<Option<String>, EventRecorderError> {
        if !params.task_type.is_deployment() || params.package_ids.is_empty() {
            return Ok(None);
        }
        let packages = self.packages.get_many(&params.package_ids).await?;
        let names: Vec<String> = packages.into_iter().map(|p| p.name).collect();
        Ok(Some(names.join(",")))
    }
}
