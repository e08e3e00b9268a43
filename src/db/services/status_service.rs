//! Batch status reads across tasks and assets.
//!
//! Each batch opens one transaction, which is the single connection held
//! for the whole fan-out, and releases it once every item has finished.

use futures::future::{join_all, BoxFuture, FutureExt};
use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};
use std::sync::Arc;
use tracing::debug;

use crate::db::entities::{asset_status, retrieve_log_result, sub_device_result, task_asset};
use crate::db::models::AssetKey;
use crate::db::services::task_store::{self, complete_unit, TaskStoreError};
use crate::services::error_catalog::ErrorCatalog;
use crate::web::models::task_models::{
    AssetStatusView, LogResultView, SubDeviceStatusView, TaskAssetStatusView, TaskStatusQuery,
    TaskStatusRecord,
};

/// Reported in place of `Online` and of a missing status.
pub const MISSING_STATUS: &str = "Missing";
const ONLINE_STATUS: &str = "Online";

pub fn normalize_status(status: Option<&str>) -> String {
    match status {
        None | Some("") | Some(ONLINE_STATUS) => MISSING_STATUS.to_string(),
        Some(other) => other.to_string(),
    }
}

#[derive(Clone)]
pub struct StatusAggregator {
    db: DatabaseConnection,
    catalog: Arc<ErrorCatalog>,
}

impl StatusAggregator {
    pub fn new(db: DatabaseConnection, catalog: Arc<ErrorCatalog>) -> Self {
        Self { db, catalog }
    }

    /// One status tree per requested asset, in input order.
    pub async fn get_assets_status(
        &self,
        assets: &[AssetKey],
    ) -> Result<Vec<AssetStatusView>, TaskStoreError> {
        if assets.is_empty() {
            return Ok(Vec::new());
        }

        let txn = self.db.begin().await?;
        let (conn, catalog) = (&txn, self.catalog.as_ref());
        let results = join_all(assets.iter().map(|asset| async move {
            let record = task_store::select_asset_status(conn, asset).await?;
            asset_tree(conn, catalog, asset.clone(), record, Vec::new()).await
        }))
        .await;
        let views = results.into_iter().collect::<Result<Vec<_>, _>>();
        complete_unit(txn, views).await
    }

    /// All-or-nothing: a failed lookup fails the whole batch.
    pub async fn get_tasks_status(
        &self,
        queries: &[TaskStatusQuery],
    ) -> Result<Vec<TaskStatusRecord>, TaskStoreError> {
        if queries.is_empty() {
            return Ok(Vec::new());
        }

        let txn = self.db.begin().await?;
        let results = join_all(
            queries
                .iter()
                .map(|query| task_status(&txn, &self.catalog, &query.task_id)),
        )
        .await;
        let records = results.into_iter().collect::<Result<Vec<_>, _>>();
        complete_unit(txn, records).await
    }
}

/// Builds the view of `asset` and, recursively, of every sub-asset reporting
/// through it. An asset already on the path from the root is not descended
/// into again.
fn asset_tree<'a>(
    txn: &'a DatabaseTransaction,
    catalog: &'a ErrorCatalog,
    asset: AssetKey,
    record: Option<asset_status::Model>,
    ancestors: Vec<AssetKey>,
) -> BoxFuture<'a, Result<AssetStatusView, TaskStoreError>> {
    async move {
        let children = task_store::select_child_asset_statuses(txn, &asset).await?;

        let mut path = ancestors;
        path.push(asset.clone());

        let mut sub_assets = Vec::with_capacity(children.len());
        for child in children {
            let key = AssetKey::new(child.type_id.clone(), child.asset_id.clone());
            if path.contains(&key) {
                debug!(type_id = %key.type_id, asset_id = %key.asset_id, "Skipping cyclic sub-asset.");
                continue;
            }
            sub_assets.push(asset_tree(txn, catalog, key, Some(child), path.clone()).await?);
        }

        let (status, error_code) = match record {
            Some(record) => (record.status, record.error_code),
            None => (None, None),
        };
        let error_message = error_code
            .as_deref()
            .map(|code| catalog.get_error_message(&asset.type_id, code));

        Ok(AssetStatusView {
            status: normalize_status(status.as_deref()),
            type_id: asset.type_id,
            asset_id: asset.asset_id,
            error_code,
            error_message,
            sub_assets,
        })
    }
    .boxed()
}

async fn task_status(
    txn: &DatabaseTransaction,
    catalog: &ErrorCatalog,
    task_id: &str,
) -> Result<TaskStatusRecord, TaskStoreError> {
    let task = task_store::select_task(txn, task_id).await?;
    let assets = task_store::select_task_assets(txn, task_id).await?;
    let sub_devices = if task.task_type.has_sub_device_results() {
        task_store::select_sub_device_results(txn, task_id).await?
    } else {
        Vec::new()
    };
    let log_results = if task.task_type.has_log_results() {
        task_store::select_retrieve_log_results(txn, task_id).await?
    } else {
        Vec::new()
    };

    let assets = assets
        .into_iter()
        .map(|asset| asset_view(catalog, asset, &sub_devices, &log_results))
        .collect();

    Ok(TaskStatusRecord {
        task_id: task.id,
        task_type: task.task_type,
        status: task.status,
        assets,
    })
}

fn asset_view(
    catalog: &ErrorCatalog,
    asset: task_asset::Model,
    sub_devices: &[sub_device_result::Model],
    log_results: &[retrieve_log_result::Model],
) -> TaskAssetStatusView {
    let owns = |type_id: &str, asset_id: &str| type_id == asset.type_id && asset_id == asset.asset_id;

    let sub_devices = sub_devices
        .iter()
        .filter(|sub| owns(&sub.type_id, &sub.asset_id))
        .map(|sub| SubDeviceStatusView {
            sub_type_id: sub.sub_type_id.clone(),
            sub_asset_id: sub.sub_asset_id.clone(),
            status: sub.status,
            error_code: sub.error_code.clone(),
            error_message: enrich(catalog, &sub.sub_type_id, &sub.error_code, &sub.error_message),
            updated_at: sub.updated_at,
        })
        .collect();

    let log_result = log_results
        .iter()
        .find(|log| owns(&log.type_id, &log.asset_id))
        .map(|log| LogResultView {
            status: log.status,
            error_code: log.error_code.clone(),
            error_message: enrich(catalog, &log.type_id, &log.error_code, &log.error_message),
            file_path: log.file_path.clone(),
            created_at: log.created_at,
        });

    TaskAssetStatusView {
        type_id: asset.type_id,
        asset_id: asset.asset_id,
        status: asset.status,
        started_at: asset.started_at,
        updated_at: asset.updated_at,
        sub_devices,
        log_result,
    }
}

/// Catalog message when a code is present, else whatever was stored.
fn enrich(
    catalog: &ErrorCatalog,
    type_id: &str,
    error_code: &Option<String>,
    stored: &Option<String>,
) -> Option<String> {
    match error_code {
        Some(code) => Some(catalog.get_error_message(type_id, code)),
        None => stored.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::enums::{AssetStatus, ResultStatus, TaskStatus, TaskType};
    use crate::db::models::{LogRetrievalOutcome, NewTask, SubDeviceOutcome};
    use crate::test_support::{harness, memory_db};
    use chrono::Utc;
    use sea_orm::{EntityTrait, Set};

    const CATALOG: &str = r#"
        [GW]
        E001 = "Gateway unreachable"

        [SENSOR]
        S17 = "Sensor not calibrated"
    "#;

    fn catalog() -> Arc<ErrorCatalog> {
        Arc::new(ErrorCatalog::from_toml_str(CATALOG).unwrap())
    }

    async fn report(
        db: &DatabaseConnection,
        asset: (&str, &str),
        status: Option<&str>,
        error_code: Option<&str>,
        parent: Option<(&str, &str)>,
    ) {
        let row = asset_status::ActiveModel {
            type_id: Set(asset.0.to_string()),
            asset_id: Set(asset.1.to_string()),
            status: Set(status.map(str::to_string)),
            error_code: Set(error_code.map(str::to_string)),
            parent_type_id: Set(parent.map(|p| p.0.to_string())),
            parent_asset_id: Set(parent.map(|p| p.1.to_string())),
            updated_at: Set(Utc::now()),
        };
        asset_status::Entity::insert(row)
            .exec_without_returning(db)
            .await
            .unwrap();
    }

    #[test]
    fn test_normalize_status() {
        assert_eq!(normalize_status(Some("Online")), "Missing");
        assert_eq!(normalize_status(None), "Missing");
        assert_eq!(normalize_status(Some("")), "Missing");
        assert_eq!(normalize_status(Some("Offline")), "Offline");
    }

    #[tokio::test]
    async fn test_online_asset_is_reported_missing() {
        let db = memory_db().await;
        report(&db, ("GW", "A1"), Some("Online"), None, None).await;
        let aggregator = StatusAggregator::new(db, catalog());

        let views = aggregator
            .get_assets_status(&[AssetKey::new("GW", "A1")])
            .await
            .unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].status, "Missing");
        assert_eq!(views[0].error_message, None);
    }

    #[tokio::test]
    async fn test_asset_views_keep_input_order() {
        let db = memory_db().await;
        report(&db, ("GW", "A1"), Some("Offline"), Some("E001"), None).await;
        report(&db, ("GW", "A2"), Some("Degraded"), None, None).await;
        let aggregator = StatusAggregator::new(db, catalog());

        let keys = [
            AssetKey::new("GW", "A2"),
            AssetKey::new("GW", "unknown"),
            AssetKey::new("GW", "A1"),
        ];
        let views = aggregator.get_assets_status(&keys).await.unwrap();

        let ids: Vec<&str> = views.iter().map(|v| v.asset_id.as_str()).collect();
        assert_eq!(ids, vec!["A2", "unknown", "A1"]);
        assert_eq!(views[1].status, "Missing");
        assert_eq!(views[2].error_message.as_deref(), Some("Gateway unreachable"));
    }

    #[tokio::test]
    async fn test_sub_assets_are_nested_and_enriched() {
        let db = memory_db().await;
        report(&db, ("GW", "A1"), Some("Offline"), None, None).await;
        report(&db, ("SENSOR", "S1"), Some("Online"), None, Some(("GW", "A1"))).await;
        report(&db, ("SENSOR", "S2"), Some("Fault"), Some("S17"), Some(("GW", "A1"))).await;
        report(&db, ("PROBE", "P1"), None, Some("X9"), Some(("SENSOR", "S2"))).await;
        let aggregator = StatusAggregator::new(db, catalog());

        let views = aggregator
            .get_assets_status(&[AssetKey::new("GW", "A1")])
            .await
            .unwrap();
        let gateway = &views[0];
        assert_eq!(gateway.sub_assets.len(), 2);
        assert_eq!(gateway.sub_assets[0].asset_id, "S1");
        assert_eq!(gateway.sub_assets[0].status, "Missing");

        let faulty = &gateway.sub_assets[1];
        assert_eq!(faulty.error_message.as_deref(), Some("Sensor not calibrated"));
        assert_eq!(faulty.sub_assets.len(), 1);
        assert_eq!(faulty.sub_assets[0].status, "Missing");
        assert_eq!(
            faulty.sub_assets[0].error_message.as_deref(),
            Some("Unsupported type/code: PROBE/X9")
        );
    }

    #[tokio::test]
    async fn test_cyclic_hierarchy_terminates() {
        let db = memory_db().await;
        report(&db, ("GW", "A1"), Some("Offline"), None, Some(("GW", "A2"))).await;
        report(&db, ("GW", "A2"), Some("Offline"), None, Some(("GW", "A1"))).await;
        let aggregator = StatusAggregator::new(db, catalog());

        let views = aggregator
            .get_assets_status(&[AssetKey::new("GW", "A1")])
            .await
            .unwrap();
        assert_eq!(views[0].sub_assets.len(), 1);
        assert!(views[0].sub_assets[0].sub_assets.is_empty());
    }

    #[tokio::test]
    async fn test_empty_batches_do_not_touch_storage() {
        let aggregator = StatusAggregator::new(DatabaseConnection::Disconnected, catalog());

        assert!(aggregator.get_tasks_status(&[]).await.unwrap().is_empty());
        assert!(aggregator.get_assets_status(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_task_status_includes_results() {
        let h = harness(false, false).await;
        let gw = AssetKey::new("GW", "A1");
        h.manager
            .create_reboot_task("rb1".to_string(), "Ada".to_string(), vec![gw.clone()])
            .await
            .unwrap();
        h.manager
            .create_log_task("lg1".to_string(), "Ada".to_string(), vec![gw.clone()])
            .await
            .unwrap();
        h.manager
            .record_sub_device_result(
                "rb1",
                &SubDeviceOutcome {
                    asset: gw.clone(),
                    sub_type_id: "SENSOR".to_string(),
                    sub_asset_id: "S1".to_string(),
                    status: ResultStatus::Error,
                    error_code: Some("S17".to_string()),
                    error_message: Some("raw".to_string()),
                },
            )
            .await
            .unwrap();
        h.manager
            .record_retrieve_log_result(
                "lg1",
                &LogRetrievalOutcome {
                    asset: gw.clone(),
                    status: ResultStatus::Error,
                    error_code: None,
                    error_message: Some("upload timed out".to_string()),
                    file_path: None,
                },
            )
            .await
            .unwrap();
        let aggregator = StatusAggregator::new(h.db.clone(), catalog());

        let records = aggregator
            .get_tasks_status(&[
                TaskStatusQuery { task_id: "lg1".to_string() },
                TaskStatusQuery { task_id: "rb1".to_string() },
            ])
            .await
            .unwrap();

        assert_eq!(records[0].task_type, TaskType::RetrieveLog);
        assert_eq!(records[0].status, TaskStatus::Scheduled);
        let log = records[0].assets[0].log_result.as_ref().unwrap();
        assert_eq!(log.error_message.as_deref(), Some("upload timed out"));
        assert!(records[0].assets[0].sub_devices.is_empty());

        let reboot_asset = &records[1].assets[0];
        assert_eq!(reboot_asset.status, AssetStatus::Scheduled);
        assert_eq!(reboot_asset.sub_devices.len(), 1);
        assert_eq!(
            reboot_asset.sub_devices[0].error_message.as_deref(),
            Some("Sensor not calibrated")
        );
        assert!(reboot_asset.log_result.is_none());
    }

    #[tokio::test]
    async fn test_unknown_task_fails_whole_batch() {
        let h = harness(false, false).await;
        h.manager
            .create_task(&NewTask {
                id: "rb1".to_string(),
                task_type: TaskType::Reboot,
                name: None,
                created_by: "Ada".to_string(),
                assets: vec![],
                package_ids: vec![],
            })
            .await
            .unwrap();
        let aggregator = StatusAggregator::new(h.db.clone(), catalog());

        let err = aggregator
            .get_tasks_status(&[
                TaskStatusQuery { task_id: "rb1".to_string() },
                TaskStatusQuery { task_id: "missing".to_string() },
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, TaskStoreError::NotFound(_)));

        // The batch connection is back in the single-connection pool.
        let records = aggregator
            .get_tasks_status(&[TaskStatusQuery { task_id: "rb1".to_string() }])
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].task_id, "rb1");
    }
}
