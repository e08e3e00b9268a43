use chrono::Utc;
use sea_orm::ConnectionTrait;
use tracing::debug;

use crate::db::services::task_store::{self, TaskStoreError};

/// Links a DownloadPackage task to its dependent Install task on the
/// caller's atomic unit. Existence of either task is not checked here; a
/// rejected insert (for example a download that is already linked) surfaces
/// as `Internal`.
pub async fn link<C: ConnectionTrait>(
    conn: &C,
    download_task_id: &str,
    install_task_id: &str,
) -> Result<(), TaskStoreError> {
    let inserted =
        task_store::insert_task_relation(conn, download_task_id, install_task_id, Utc::now())
            .await?;
    if inserted != 1 {
        return Err(TaskStoreError::Internal(format!(
            "Linking task {download_task_id} to {install_task_id} inserted {inserted} rows"
        )));
    }
    debug!(
        download_task_id = %download_task_id,
        install_task_id = %install_task_id,
        "Linked install task to download task."
    );
    Ok(())
}

/// The Install task that depends on the given DownloadPackage task, if any.
pub async fn related_install_task<C: ConnectionTrait>(
    conn: &C,
    download_task_id: &str,
) -> Result<Option<String>, TaskStoreError> {
    Ok(task_store::select_task_relation(conn, download_task_id)
        .await?
        .map(|relation| relation.install_task_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_db;

    #[tokio::test]
    async fn test_link_is_one_to_one() {
        let db = memory_db().await;

        link(&db, "dp1", "in1").await.unwrap();
        assert_eq!(
            related_install_task(&db, "dp1").await.unwrap().as_deref(),
            Some("in1")
        );

        // A download task keeps its first install task.
        let err = link(&db, "dp1", "in2").await.unwrap_err();
        assert!(matches!(err, TaskStoreError::Internal(_)));
        assert_eq!(
            related_install_task(&db, "dp1").await.unwrap().as_deref(),
            Some("in1")
        );
    }

    #[tokio::test]
    async fn test_unlinked_download_has_no_install() {
        let db = memory_db().await;
        assert!(related_install_task(&db, "dp1").await.unwrap().is_none());
    }
}
