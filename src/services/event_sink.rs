use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, DbErr, Set};
use thiserror::Error;

use crate::db::entities::task_event;
use crate::db::enums::TaskType;

#[derive(Error, Debug)]
pub enum EventSinkError {
    #[error("Database error: {0}")]
    DbErr(#[from] DbErr),
}

/// One audit row for one asset of a freshly created task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEventRecord {
    pub task_id: String,
    pub type_id: String,
    pub asset_id: String,
    pub task_name: Option<String>,
    /// Task-type specific context, e.g. the package names of a deployment.
    pub detail: Option<String>,
    pub created_by: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    Download(TaskEventRecord),
    Install(TaskEventRecord),
    RetrieveLog(TaskEventRecord),
    Reboot(TaskEventRecord),
    SelfTest(TaskEventRecord),
}

impl TaskEvent {
    /// `None` for task types that have no creation event.
    pub fn for_task_type(task_type: TaskType, record: TaskEventRecord) -> Option<Self> {
        match task_type {
            TaskType::DownloadPackage => Some(TaskEvent::Download(record)),
            TaskType::Install => Some(TaskEvent::Install(record)),
            TaskType::RetrieveLog => Some(TaskEvent::RetrieveLog(record)),
            TaskType::Reboot => Some(TaskEvent::Reboot(record)),
            TaskType::SelfTest => Some(TaskEvent::SelfTest(record)),
            TaskType::Reset => None,
        }
    }

    pub fn task_type(&self) -> TaskType {
        match self {
            TaskEvent::Download(_) => TaskType::DownloadPackage,
            TaskEvent::Install(_) => TaskType::Install,
            TaskEvent::RetrieveLog(_) => TaskType::RetrieveLog,
            TaskEvent::Reboot(_) => TaskType::Reboot,
            TaskEvent::SelfTest(_) => TaskType::SelfTest,
        }
    }

    pub fn record(&self) -> &TaskEventRecord {
        match self {
            TaskEvent::Download(record)
            | TaskEvent::Install(record)
            | TaskEvent::RetrieveLog(record)
            | TaskEvent::Reboot(record)
            | TaskEvent::SelfTest(record) => record,
        }
    }
}

/// Destination of task creation audit events. Writes are not idempotent.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn insert_create(&self, event: TaskEvent) -> Result<(), EventSinkError>;
}

/// Appends audit events to the `task_events` table.
pub struct DbEventSink {
    db: DatabaseConnection,
}

impl DbEventSink {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EventSink for DbEventSink {
    async fn insert_create(&self, event: TaskEvent) -> Result<(), EventSinkError> {
        let task_type = event.task_type();
        let record = event.record();
        let row = task_event::ActiveModel {
            task_id: Set(record.task_id.clone()),
            task_type: Set(task_type),
            type_id: Set(record.type_id.clone()),
            asset_id: Set(record.asset_id.clone()),
            task_name: Set(record.task_name.clone()),
            detail: Set(record.detail.clone()),
            created_by: Set(record.created_by.clone()),
            created_at: Set(Utc::now()),
            ..Default::default()
        };
        row.insert(&self.db).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_db;
    use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};

    fn record(asset_id: &str) -> TaskEventRecord {
        TaskEventRecord {
            task_id: "dp1".to_string(),
            type_id: "GW".to_string(),
            asset_id: asset_id.to_string(),
            task_name: Some("firmware 2.1".to_string()),
            detail: Some("fw-2.1,bootloader-7".to_string()),
            created_by: "Ada".to_string(),
        }
    }

    #[test]
    fn test_reset_has_no_creation_event() {
        assert!(TaskEvent::for_task_type(TaskType::Reset, record("A1")).is_none());
        let event = TaskEvent::for_task_type(TaskType::SelfTest, record("A1")).unwrap();
        assert_eq!(event.task_type(), TaskType::SelfTest);
    }

    #[tokio::test]
    async fn test_db_sink_appends_rows() {
        let db = memory_db().await;
        let sink = DbEventSink::new(db.clone());

        sink.insert_create(TaskEvent::Download(record("A1"))).await.unwrap();
        sink.insert_create(TaskEvent::Download(record("A2"))).await.unwrap();

        let rows = task_event::Entity::find()
            .filter(task_event::Column::TaskId.eq("dp1"))
            .all(&db)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.task_type == TaskType::DownloadPackage));
        assert_eq!(rows[0].detail.as_deref(), Some("fw-2.1,bootloader-7"));
    }
}
