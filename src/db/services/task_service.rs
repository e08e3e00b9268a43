use chrono::{DateTime, Utc};
use futures::future::join_all;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, TransactionTrait,
};
use tracing::{debug, info, warn};

use crate::db::entities::{task, task_asset};
use crate::db::enums::{AssetStatus, TaskStatus, TaskType};
use crate::db::models::{AssetKey, LogRetrievalOutcome, NewDeployment, NewTask, SubDeviceOutcome};
use crate::db::services::relation_service;
use crate::db::services::task_store::{self, complete_unit, TaskStoreError};
use crate::server::event_recorder::{EventRecorder, TaskEventParams};
use crate::server::task_dispatcher::TaskDispatcher;
use crate::web::models::task_models::{
    SortOrder, TaskDetailResponse, TaskListQuery, TaskPage, TaskSortField, TaskSummary,
};

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;

/// Creates tasks, drives their state machine and serves task reads.
///
/// Every write happens inside one atomic unit per step. Dispatch and event
/// recording run after the commit and can never fail the call.
#[derive(Clone)]
pub struct TaskManager {
    db: DatabaseConnection,
    dispatcher: TaskDispatcher,
    recorder: EventRecorder,
}

impl TaskManager {
    pub fn new(db: DatabaseConnection, dispatcher: TaskDispatcher, recorder: EventRecorder) -> Self {
        Self {
            db,
            dispatcher,
            recorder,
        }
    }

    // --- Creation ---

    /// Persists the task, its assets and (deployment tasks) its packages in
    /// one atomic unit.
    pub async fn create_task(&self, new_task: &NewTask) -> Result<(), TaskStoreError> {
        validate_new_task(new_task)?;

        let txn = self.db.begin().await?;
        let result = insert_task_rows(&txn, new_task, Utc::now()).await;
        complete_unit(txn, result).await?;

        info!(
            task_id = %new_task.id,
            task_type = %new_task.task_type,
            assets = new_task.assets.len(),
            "Task created."
        );
        Ok(())
    }

    pub async fn create_log_task(
        &self,
        task_id: String,
        created_by: String,
        assets: Vec<AssetKey>,
    ) -> Result<(), TaskStoreError> {
        self.create_asset_task(task_id, TaskType::RetrieveLog, created_by, assets)
            .await
    }

    pub async fn create_reboot_task(
        &self,
        task_id: String,
        created_by: String,
        assets: Vec<AssetKey>,
    ) -> Result<(), TaskStoreError> {
        self.create_asset_task(task_id, TaskType::Reboot, created_by, assets)
            .await
    }

    pub async fn create_self_test_task(
        &self,
        task_id: String,
        created_by: String,
        assets: Vec<AssetKey>,
    ) -> Result<(), TaskStoreError> {
        self.create_asset_task(task_id, TaskType::SelfTest, created_by, assets)
            .await
    }

    async fn create_asset_task(
        &self,
        task_id: String,
        task_type: TaskType,
        created_by: String,
        assets: Vec<AssetKey>,
    ) -> Result<(), TaskStoreError> {
        let new_task = NewTask {
            id: task_id,
            task_type,
            name: None,
            created_by,
            assets,
            package_ids: Vec::new(),
        };
        self.create_and_dispatch(&new_task).await
    }

    /// Creates one task, then dispatches it and records its creation events
    /// side by side.
    pub async fn create_and_dispatch(&self, new_task: &NewTask) -> Result<(), TaskStoreError> {
        self.create_task(new_task).await?;

        let params = TaskEventParams::from(new_task);
        let (dispatched, recorded) = tokio::join!(
            self.dispatcher
                .dispatch(&new_task.id, new_task.task_type.callback_path()),
            self.recorder.record_event(&params),
        );
        debug!(
            task_id = %new_task.id,
            dispatched = dispatched.is_completed(),
            recorded = recorded.is_completed(),
            "Post-creation side effects finished."
        );
        Ok(())
    }

    /// Download task, install task and their link are three separate atomic
    /// units. A failure after the first leaves the download task in place
    /// and nothing is dispatched.
    pub async fn create_deployment(&self, deployment: &NewDeployment) -> Result<(), TaskStoreError> {
        if deployment.name.trim().is_empty() {
            return Err(TaskStoreError::InvalidInput(
                "A deployment task requires a name.".to_string(),
            ));
        }

        let download = deployment.download_task();
        let install = deployment.install_task();

        self.create_task(&download).await?;

        if let Err(e) = self.create_task(&install).await {
            warn!(
                download_task_id = %download.id,
                install_task_id = %install.id,
                error = %e,
                "Install task creation failed; download task is left without an install task."
            );
            return Err(e);
        }

        let txn = self.db.begin().await?;
        let linked = relation_service::link(&txn, &download.id, &install.id).await;
        if let Err(e) = complete_unit(txn, linked).await {
            warn!(
                download_task_id = %download.id,
                install_task_id = %install.id,
                error = %e,
                "Linking deployment tasks failed; both tasks remain unlinked."
            );
            return Err(e);
        }

        let download_params = TaskEventParams::from(&download);
        let install_params = TaskEventParams::from(&install);
        let (dispatched, recorded) = tokio::join!(
            self.dispatcher
                .dispatch(&download.id, download.task_type.callback_path()),
            async {
                let download_recorded = self.recorder.record_event(&download_params).await;
                let install_recorded = self.recorder.record_event(&install_params).await;
                download_recorded.is_completed() && install_recorded.is_completed()
            },
        );
        info!(
            download_task_id = %download.id,
            install_task_id = %install.id,
            dispatched = dispatched.is_completed(),
            recorded,
            "Deployment created."
        );
        Ok(())
    }

    // --- Transitions ---

    /// Moves a scheduled task and every scheduled asset to InProgress,
    /// stamping `started_at`. Returns the number of assets started.
    pub async fn start_task(&self, task_id: &str) -> Result<u64, TaskStoreError> {
        let txn = self.db.begin().await?;
        let result = start_task_rows(&txn, task_id, Utc::now()).await;
        let started = complete_unit(txn, result).await?;
        info!(task_id = %task_id, started_assets = started, "Task started.");
        Ok(started)
    }

    /// Validated single-asset transition. Entering InProgress also starts a
    /// still-scheduled task; reaching a terminal status settles the task
    /// once every asset is terminal.
    pub async fn update_asset_status(
        &self,
        task_id: &str,
        asset: &AssetKey,
        status: AssetStatus,
    ) -> Result<task_asset::Model, TaskStoreError> {
        let txn = self.db.begin().await?;
        let result = transition_asset(&txn, task_id, asset, status, Utc::now()).await;
        let updated = complete_unit(txn, result).await?;
        info!(
            task_id = %task_id,
            type_id = %asset.type_id,
            asset_id = %asset.asset_id,
            status = %updated.status,
            "Asset status updated."
        );
        Ok(updated)
    }

    /// Validated task-level move into a terminal status. Complete requires
    /// every asset to be Complete; Failure closes still-open assets as
    /// SystemError.
    pub async fn complete_task(
        &self,
        task_id: &str,
        status: TaskStatus,
    ) -> Result<task::Model, TaskStoreError> {
        if !status.is_terminal() {
            return Err(TaskStoreError::InvalidInput(format!(
                "{status} is not a terminal task status"
            )));
        }
        let txn = self.db.begin().await?;
        let now = Utc::now();
        let result = async {
            let current = task_store::select_task(&txn, task_id).await?;
            if status == TaskStatus::Complete {
                let assets = task_store::select_task_assets(&txn, task_id).await?;
                if let Some(open) = assets.iter().find(|a| a.status != AssetStatus::Complete) {
                    return Err(TaskStoreError::InvalidTransition {
                        entity: format!(
                            "task {task_id} (asset {}/{} is {})",
                            open.type_id, open.asset_id, open.status
                        ),
                        from: current.status.to_string(),
                        to: status.to_string(),
                    });
                }
            }
            transition_task(&txn, &current, status, now).await?;
            if status == TaskStatus::Failure {
                let closed =
                    task_store::update_open_task_assets(&txn, task_id, AssetStatus::SystemError, now)
                        .await?;
                if closed > 0 {
                    warn!(task_id = %task_id, closed_assets = closed, "Open assets closed as SystemError.");
                }
            }
            task_store::select_task(&txn, task_id).await
        }
        .await;
        complete_unit(txn, result).await
    }

    // --- Execution results ---

    pub async fn record_sub_device_result(
        &self,
        task_id: &str,
        outcome: &SubDeviceOutcome,
    ) -> Result<(), TaskStoreError> {
        let txn = self.db.begin().await?;
        let result = async {
            let task = task_store::select_task(&txn, task_id).await?;
            if !task.task_type.has_sub_device_results() {
                return Err(TaskStoreError::InvalidInput(format!(
                    "{} tasks do not record sub-device results",
                    task.task_type
                )));
            }
            task_store::select_task_asset(&txn, task_id, &outcome.asset).await?;
            let inserted =
                task_store::insert_sub_device_result(&txn, task_id, outcome, Utc::now()).await?;
            expect_inserted("sub-device result", task_id, inserted, 1)
        }
        .await;
        complete_unit(txn, result).await
    }

    pub async fn record_retrieve_log_result(
        &self,
        task_id: &str,
        outcome: &LogRetrievalOutcome,
    ) -> Result<(), TaskStoreError> {
        let txn = self.db.begin().await?;
        let result = async {
            let task = task_store::select_task(&txn, task_id).await?;
            if !task.task_type.has_log_results() {
                return Err(TaskStoreError::InvalidInput(format!(
                    "{} tasks do not record log retrieval results",
                    task.task_type
                )));
            }
            task_store::select_task_asset(&txn, task_id, &outcome.asset).await?;
            let inserted =
                task_store::insert_retrieve_log_result(&txn, task_id, outcome, Utc::now()).await?;
            expect_inserted("log retrieval result", task_id, inserted, 1)
        }
        .await;
        complete_unit(txn, result).await
    }

    // --- Reads ---

    pub async fn get_task(&self, task_id: &str) -> Result<TaskDetailResponse, TaskStoreError> {
        let txn = self.db.begin().await?;
        let result = async {
            let task = task_store::select_task(&txn, task_id).await?;
            let assets = task_store::select_task_assets(&txn, task_id).await?;
            let package_ids = task_store::select_task_package_ids(&txn, task_id).await?;
            let related_task_id = if task.task_type == TaskType::DownloadPackage {
                relation_service::related_install_task(&txn, task_id).await?
            } else {
                None
            };
            Ok::<_, TaskStoreError>(TaskDetailResponse {
                task: TaskSummary::from(task),
                assets: assets.into_iter().map(Into::into).collect(),
                package_ids,
                related_task_id,
            })
        }
        .await;
        complete_unit(txn, result).await
    }

    pub async fn list_tasks(&self, query: &TaskListQuery) -> Result<TaskPage, TaskStoreError> {
        let page = query.page.unwrap_or(1);
        let page_size = query.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page == 0 {
            return Err(TaskStoreError::InvalidInput("page starts at 1".to_string()));
        }
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(TaskStoreError::InvalidInput(format!(
                "pageSize must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }

        let mut select = task::Entity::find();
        if let Some(task_type) = query.task_type {
            select = select.filter(task::Column::TaskType.eq(task_type));
        }
        if let Some(status) = query.status {
            select = select.filter(task::Column::Status.eq(status));
        }
        let column = match query.sort_by.unwrap_or_default() {
            TaskSortField::CreatedAt => task::Column::CreatedAt,
            TaskSortField::UpdatedAt => task::Column::UpdatedAt,
            TaskSortField::Name => task::Column::Name,
        };
        let order = match query.order.unwrap_or_default() {
            SortOrder::Asc => Order::Asc,
            SortOrder::Desc => Order::Desc,
        };
        // Ties are broken by id so pages never overlap.
        let select = select
            .order_by(column, order.clone())
            .order_by(task::Column::Id, order);

        let paginator = select.paginate(&self.db, page_size);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page - 1).await?;

        Ok(TaskPage {
            items: items.into_iter().map(TaskSummary::from).collect(),
            total,
            page,
            page_size,
        })
    }
}

fn validate_new_task(new_task: &NewTask) -> Result<(), TaskStoreError> {
    if new_task.id.trim().is_empty() {
        return Err(TaskStoreError::InvalidInput(
            "A task id must be assigned before creation.".to_string(),
        ));
    }
    let named = new_task
        .name
        .as_deref()
        .is_some_and(|name| !name.trim().is_empty());
    if new_task.task_type.is_deployment() && !named {
        return Err(TaskStoreError::InvalidInput(format!(
            "{} task {} requires a name.",
            new_task.task_type, new_task.id
        )));
    }
    Ok(())
}

fn expect_inserted(what: &str, task_id: &str, inserted: u64, expected: u64) -> Result<(), TaskStoreError> {
    if inserted != expected {
        return Err(TaskStoreError::Internal(format!(
            "Inserting {what} of task {task_id} affected {inserted} rows, expected {expected}"
        )));
    }
    Ok(())
}

/// Postgres rejects every statement after the first failure in a
/// transaction with this message.
const ABORTED_TRANSACTION: &str = "current transaction is aborted";

/// Sums the per-row counts of a fan-out. Every branch runs to completion
/// first. On failure the error that caused the abort is preferred over
/// the follow-on rejections of the other branches.
fn sum_counts(results: Vec<Result<u64, TaskStoreError>>) -> Result<u64, TaskStoreError> {
    let mut total = 0;
    let mut errors = Vec::new();
    for result in results {
        match result {
            Ok(count) => total += count,
            Err(e) => errors.push(e),
        }
    }
    if errors.is_empty() {
        return Ok(total);
    }
    let position = errors
        .iter()
        .position(|e| !e.to_string().contains(ABORTED_TRANSACTION))
        .unwrap_or(0);
    Err(errors.swap_remove(position))
}

/// Tags a failed row insert with the row it was inserting.
fn row_error(row: String) -> impl FnOnce(TaskStoreError) -> TaskStoreError {
    move |e| match e {
        TaskStoreError::Internal(msg) => TaskStoreError::Internal(format!("{row}: {msg}")),
        other => other,
    }
}

async fn insert_task_rows(
    txn: &DatabaseTransaction,
    new_task: &NewTask,
    now: DateTime<Utc>,
) -> Result<(), TaskStoreError> {
    let inserted = task_store::insert_task(txn, new_task, now).await?;
    expect_inserted("task row", &new_task.id, inserted, 1)?;

    if !new_task.assets.is_empty() {
        let results = join_all(
            new_task
                .assets
                .iter()
                .map(|asset| async move {
                    task_store::insert_task_asset(txn, &new_task.id, asset, now)
                        .await
                        .map_err(row_error(format!("asset {}/{}", asset.type_id, asset.asset_id)))
                }),
        )
        .await;
        let inserted = sum_counts(results)?;
        expect_inserted("assets", &new_task.id, inserted, new_task.assets.len() as u64)?;
    }

    if new_task.task_type.is_deployment() && !new_task.package_ids.is_empty() {
        let results = join_all(
            new_task
                .package_ids
                .iter()
                .map(|package_id| async move {
                    task_store::insert_task_package(txn, &new_task.id, package_id)
                        .await
                        .map_err(row_error(format!("package {package_id}")))
                }),
        )
        .await;
        let inserted = sum_counts(results)?;
        expect_inserted("packages", &new_task.id, inserted, new_task.package_ids.len() as u64)?;
    }
    Ok(())
}

async fn transition_task(
    txn: &DatabaseTransaction,
    current: &task::Model,
    to: TaskStatus,
    now: DateTime<Utc>,
) -> Result<(), TaskStoreError> {
    if !current.status.can_transition_to(to) {
        return Err(TaskStoreError::InvalidTransition {
            entity: format!("task {}", current.id),
            from: current.status.to_string(),
            to: to.to_string(),
        });
    }
    let updated = task_store::update_task_status(txn, &current.id, current.status, to, now).await?;
    if updated != 1 {
        return Err(TaskStoreError::Internal(format!(
            "Task {} changed status concurrently",
            current.id
        )));
    }
    Ok(())
}

async fn start_task_rows(
    txn: &DatabaseTransaction,
    task_id: &str,
    now: DateTime<Utc>,
) -> Result<u64, TaskStoreError> {
    let current = task_store::select_task(txn, task_id).await?;
    transition_task(txn, &current, TaskStatus::InProgress, now).await?;
    task_store::update_task_assets_started(txn, task_id, now).await
}

async fn transition_asset(
    txn: &DatabaseTransaction,
    task_id: &str,
    asset: &AssetKey,
    to: AssetStatus,
    now: DateTime<Utc>,
) -> Result<task_asset::Model, TaskStoreError> {
    let task = task_store::select_task(txn, task_id).await?;
    let current = task_store::select_task_asset(txn, task_id, asset).await?;
    if task.status.is_terminal() {
        return Err(TaskStoreError::InvalidTransition {
            entity: format!(
                "asset {}/{} of {} task {task_id}",
                asset.type_id, asset.asset_id, task.status
            ),
            from: current.status.to_string(),
            to: to.to_string(),
        });
    }
    if !current.status.can_transition_to(to) {
        return Err(TaskStoreError::InvalidTransition {
            entity: format!("asset {}/{} of task {task_id}", asset.type_id, asset.asset_id),
            from: current.status.to_string(),
            to: to.to_string(),
        });
    }

    // started_at is stamped once, on the first entry into InProgress.
    let started_at = (to == AssetStatus::InProgress && current.started_at.is_none()).then_some(now);
    let updated = task_store::update_task_asset_status(
        txn,
        task_id,
        asset,
        current.status,
        to,
        started_at,
        now,
    )
    .await?;
    if updated != 1 {
        return Err(TaskStoreError::Internal(format!(
            "Asset {}/{} of task {task_id} changed status concurrently",
            asset.type_id, asset.asset_id
        )));
    }

    if to == AssetStatus::InProgress {
        task_store::update_task_status(txn, task_id, TaskStatus::Scheduled, TaskStatus::InProgress, now)
            .await?;
    }
    if to.is_terminal() {
        settle_task(txn, task_id, now).await?;
    }
    task_store::select_task_asset(txn, task_id, asset).await
}

/// Closes an in-progress task once all of its assets are terminal.
async fn settle_task(
    txn: &DatabaseTransaction,
    task_id: &str,
    now: DateTime<Utc>,
) -> Result<(), TaskStoreError> {
    let assets = task_store::select_task_assets(txn, task_id).await?;
    if !assets.iter().all(|asset| asset.status.is_terminal()) {
        return Ok(());
    }
    let outcome = if assets.iter().any(|asset| asset.status.is_error()) {
        TaskStatus::Failure
    } else {
        TaskStatus::Complete
    };
    let settled =
        task_store::update_task_status(txn, task_id, TaskStatus::InProgress, outcome, now).await?;
    if settled == 1 {
        info!(task_id = %task_id, status = %outcome, "Task settled.");
    }
    Ok(())
}
