//! Row-level primitives over the task tables.
//!
//! Mutations are always executed on a caller-supplied connection, which is a
//! `DatabaseTransaction` whenever the write belongs to an atomic unit. Every
//! primitive reports the number of rows it inserted, matched or updated.

use chrono::{DateTime, Utc};
use sea_orm::{
    prelude::Expr, ColumnTrait, ConnectionTrait, DatabaseTransaction, DbErr, EntityTrait,
    QueryFilter, QueryOrder, Set,
};
use tracing::warn;

use crate::db::entities::{
    asset_status, retrieve_log_result, sub_device_result, task, task_asset, task_package,
    task_relation,
};
use crate::db::enums::{AssetStatus, TaskStatus};
use crate::db::models::{AssetKey, LogRetrievalOutcome, NewTask, SubDeviceOutcome};

#[derive(Debug, thiserror::Error)]
pub enum TaskStoreError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Invalid status transition for {entity}: {from} -> {to}")]
    InvalidTransition {
        entity: String,
        from: String,
        to: String,
    },
}

impl From<DbErr> for TaskStoreError {
    fn from(err: DbErr) -> Self {
        TaskStoreError::Internal(format!("Database error: {err}"))
    }
}

/// Reads that expect a unique row: zero rows is `NotFound`, more than one
/// breaks a key invariant and is `Internal`.
fn expect_single<M>(mut rows: Vec<M>, what: impl FnOnce() -> String) -> Result<M, TaskStoreError> {
    match rows.len() {
        1 => Ok(rows.remove(0)),
        0 => Err(TaskStoreError::NotFound(what())),
        n => Err(TaskStoreError::Internal(format!(
            "{} matched {n} rows, expected exactly one",
            what()
        ))),
    }
}

/// Ends an atomic unit: commits when `result` is Ok, rolls back otherwise.
/// Either way the transaction's connection goes back to the pool here.
pub async fn complete_unit<T>(
    txn: DatabaseTransaction,
    result: Result<T, TaskStoreError>,
) -> Result<T, TaskStoreError> {
    match result {
        Ok(value) => {
            txn.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = txn.rollback().await {
                warn!(error = %rollback_err, "Rollback failed after error.");
            }
            Err(e)
        }
    }
}

// --- Inserts ---

pub async fn insert_task<C: ConnectionTrait>(
    conn: &C,
    new_task: &NewTask,
    now: DateTime<Utc>,
) -> Result<u64, TaskStoreError> {
    let row = task::ActiveModel {
        id: Set(new_task.id.clone()),
        task_type: Set(new_task.task_type),
        name: Set(new_task.name.clone()),
        status: Set(TaskStatus::Scheduled),
        created_by: Set(new_task.created_by.clone()),
        created_at: Set(now),
        updated_at: Set(now),
    };
    Ok(task::Entity::insert(row).exec_without_returning(conn).await?)
}

pub async fn insert_task_asset<C: ConnectionTrait>(
    conn: &C,
    task_id: &str,
    asset: &AssetKey,
    now: DateTime<Utc>,
) -> Result<u64, TaskStoreError> {
    let row = task_asset::ActiveModel {
        task_id: Set(task_id.to_owned()),
        type_id: Set(asset.type_id.clone()),
        asset_id: Set(asset.asset_id.clone()),
        status: Set(AssetStatus::Scheduled),
        started_at: Set(None),
        updated_at: Set(now),
    };
    Ok(task_asset::Entity::insert(row).exec_without_returning(conn).await?)
}

pub async fn insert_task_package<C: ConnectionTrait>(
    conn: &C,
    task_id: &str,
    package_id: &str,
) -> Result<u64, TaskStoreError> {
    let row = task_package::ActiveModel {
        task_id: Set(task_id.to_owned()),
        package_id: Set(package_id.to_owned()),
    };
    Ok(task_package::Entity::insert(row).exec_without_returning(conn).await?)
}

pub async fn insert_task_relation<C: ConnectionTrait>(
    conn: &C,
    download_task_id: &str,
    install_task_id: &str,
    now: DateTime<Utc>,
) -> Result<u64, TaskStoreError> {
    let row = task_relation::ActiveModel {
        download_task_id: Set(download_task_id.to_owned()),
        install_task_id: Set(install_task_id.to_owned()),
        created_at: Set(now),
    };
    Ok(task_relation::Entity::insert(row).exec_without_returning(conn).await?)
}

pub async fn insert_sub_device_result<C: ConnectionTrait>(
    conn: &C,
    task_id: &str,
    outcome: &SubDeviceOutcome,
    now: DateTime<Utc>,
) -> Result<u64, TaskStoreError> {
    let row = sub_device_result::ActiveModel {
        task_id: Set(task_id.to_owned()),
        type_id: Set(outcome.asset.type_id.clone()),
        asset_id: Set(outcome.asset.asset_id.clone()),
        sub_type_id: Set(outcome.sub_type_id.clone()),
        sub_asset_id: Set(outcome.sub_asset_id.clone()),
        status: Set(outcome.status),
        error_code: Set(outcome.error_code.clone()),
        error_message: Set(outcome.error_message.clone()),
        created_at: Set(now),
        updated_at: Set(now),
    };
    Ok(sub_device_result::Entity::insert(row).exec_without_returning(conn).await?)
}

pub async fn insert_retrieve_log_result<C: ConnectionTrait>(
    conn: &C,
    task_id: &str,
    outcome: &LogRetrievalOutcome,
    now: DateTime<Utc>,
) -> Result<u64, TaskStoreError> {
    let row = retrieve_log_result::ActiveModel {
        task_id: Set(task_id.to_owned()),
        type_id: Set(outcome.asset.type_id.clone()),
        asset_id: Set(outcome.asset.asset_id.clone()),
        status: Set(outcome.status),
        error_code: Set(outcome.error_code.clone()),
        error_message: Set(outcome.error_message.clone()),
        file_path: Set(outcome.file_path.clone()),
        created_at: Set(now),
    };
    Ok(retrieve_log_result::Entity::insert(row).exec_without_returning(conn).await?)
}

// --- Selects ---

pub async fn select_task<C: ConnectionTrait>(
    conn: &C,
    task_id: &str,
) -> Result<task::Model, TaskStoreError> {
    let rows = task::Entity::find()
        .filter(task::Column::Id.eq(task_id))
        .all(conn)
        .await?;
    expect_single(rows, || format!("task {task_id}"))
}

pub async fn select_task_assets<C: ConnectionTrait>(
    conn: &C,
    task_id: &str,
) -> Result<Vec<task_asset::Model>, TaskStoreError> {
    Ok(task_asset::Entity::find()
        .filter(task_asset::Column::TaskId.eq(task_id))
        .order_by_asc(task_asset::Column::TypeId)
        .order_by_asc(task_asset::Column::AssetId)
        .all(conn)
        .await?)
}

pub async fn select_task_asset<C: ConnectionTrait>(
    conn: &C,
    task_id: &str,
    asset: &AssetKey,
) -> Result<task_asset::Model, TaskStoreError> {
    let rows = task_asset::Entity::find()
        .filter(task_asset::Column::TaskId.eq(task_id))
        .filter(task_asset::Column::TypeId.eq(asset.type_id.as_str()))
        .filter(task_asset::Column::AssetId.eq(asset.asset_id.as_str()))
        .all(conn)
        .await?;
    expect_single(rows, || {
        format!("asset {}/{} of task {task_id}", asset.type_id, asset.asset_id)
    })
}

pub async fn select_task_package_ids<C: ConnectionTrait>(
    conn: &C,
    task_id: &str,
) -> Result<Vec<String>, TaskStoreError> {
    let rows = task_package::Entity::find()
        .filter(task_package::Column::TaskId.eq(task_id))
        .order_by_asc(task_package::Column::PackageId)
        .all(conn)
        .await?;
    Ok(rows.into_iter().map(|row| row.package_id).collect())
}

pub async fn select_task_relation<C: ConnectionTrait>(
    conn: &C,
    download_task_id: &str,
) -> Result<Option<task_relation::Model>, TaskStoreError> {
    let rows = task_relation::Entity::find()
        .filter(task_relation::Column::DownloadTaskId.eq(download_task_id))
        .all(conn)
        .await?;
    match expect_single(rows, || format!("relation of task {download_task_id}")) {
        Ok(relation) => Ok(Some(relation)),
        Err(TaskStoreError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

pub async fn select_sub_device_results<C: ConnectionTrait>(
    conn: &C,
    task_id: &str,
) -> Result<Vec<sub_device_result::Model>, TaskStoreError> {
    Ok(sub_device_result::Entity::find()
        .filter(sub_device_result::Column::TaskId.eq(task_id))
        .order_by_asc(sub_device_result::Column::SubTypeId)
        .order_by_asc(sub_device_result::Column::SubAssetId)
        .all(conn)
        .await?)
}

pub async fn select_retrieve_log_results<C: ConnectionTrait>(
    conn: &C,
    task_id: &str,
) -> Result<Vec<retrieve_log_result::Model>, TaskStoreError> {
    Ok(retrieve_log_result::Entity::find()
        .filter(retrieve_log_result::Column::TaskId.eq(task_id))
        .all(conn)
        .await?)
}

/// Latest status of one asset, `None` when the asset never reported.
pub async fn select_asset_status<C: ConnectionTrait>(
    conn: &C,
    asset: &AssetKey,
) -> Result<Option<asset_status::Model>, TaskStoreError> {
    let rows = asset_status::Entity::find()
        .filter(asset_status::Column::TypeId.eq(asset.type_id.as_str()))
        .filter(asset_status::Column::AssetId.eq(asset.asset_id.as_str()))
        .all(conn)
        .await?;
    match expect_single(rows, || format!("status of asset {}/{}", asset.type_id, asset.asset_id)) {
        Ok(status) => Ok(Some(status)),
        Err(TaskStoreError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

pub async fn select_child_asset_statuses<C: ConnectionTrait>(
    conn: &C,
    parent: &AssetKey,
) -> Result<Vec<asset_status::Model>, TaskStoreError> {
    Ok(asset_status::Entity::find()
        .filter(asset_status::Column::ParentTypeId.eq(parent.type_id.as_str()))
        .filter(asset_status::Column::ParentAssetId.eq(parent.asset_id.as_str()))
        .order_by_asc(asset_status::Column::TypeId)
        .order_by_asc(asset_status::Column::AssetId)
        .all(conn)
        .await?)
}

// --- Updates ---

/// Moves a task from `from` to `to`. Matches nothing if the task is no
/// longer in `from`.
pub async fn update_task_status<C: ConnectionTrait>(
    conn: &C,
    task_id: &str,
    from: TaskStatus,
    to: TaskStatus,
    now: DateTime<Utc>,
) -> Result<u64, TaskStoreError> {
    let result = task::Entity::update_many()
        .col_expr(task::Column::Status, Expr::value(to))
        .col_expr(task::Column::UpdatedAt, Expr::value(now))
        .filter(task::Column::Id.eq(task_id))
        .filter(task::Column::Status.eq(from))
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}

/// Starts every still-scheduled asset of a task, stamping `started_at`.
pub async fn update_task_assets_started<C: ConnectionTrait>(
    conn: &C,
    task_id: &str,
    now: DateTime<Utc>,
) -> Result<u64, TaskStoreError> {
    let result = task_asset::Entity::update_many()
        .col_expr(task_asset::Column::Status, Expr::value(AssetStatus::InProgress))
        .col_expr(task_asset::Column::StartedAt, Expr::value(now))
        .col_expr(task_asset::Column::UpdatedAt, Expr::value(now))
        .filter(task_asset::Column::TaskId.eq(task_id))
        .filter(task_asset::Column::Status.eq(AssetStatus::Scheduled))
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}

/// Closes every asset of a task that is still scheduled or in progress.
pub async fn update_open_task_assets<C: ConnectionTrait>(
    conn: &C,
    task_id: &str,
    to: AssetStatus,
    now: DateTime<Utc>,
) -> Result<u64, TaskStoreError> {
    let result = task_asset::Entity::update_many()
        .col_expr(task_asset::Column::Status, Expr::value(to))
        .col_expr(task_asset::Column::UpdatedAt, Expr::value(now))
        .filter(task_asset::Column::TaskId.eq(task_id))
        .filter(task_asset::Column::Status.is_in([AssetStatus::Scheduled, AssetStatus::InProgress]))
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}

/// Moves one asset from `from` to `to`. `started_at` is only written when
/// given, so later transitions leave it untouched.
pub async fn update_task_asset_status<C: ConnectionTrait>(
    conn: &C,
    task_id: &str,
    asset: &AssetKey,
    from: AssetStatus,
    to: AssetStatus,
    started_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<u64, TaskStoreError> {
    let mut update = task_asset::Entity::update_many()
        .col_expr(task_asset::Column::Status, Expr::value(to))
        .col_expr(task_asset::Column::UpdatedAt, Expr::value(now));
    if let Some(started_at) = started_at {
        update = update.col_expr(task_asset::Column::StartedAt, Expr::value(started_at));
    }
    let result = update
        .filter(task_asset::Column::TaskId.eq(task_id))
        .filter(task_asset::Column::TypeId.eq(asset.type_id.as_str()))
        .filter(task_asset::Column::AssetId.eq(asset.asset_id.as_str()))
        .filter(task_asset::Column::Status.eq(from))
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}
