use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Links a DownloadPackage task to the Install task that depends on it.
/// Keyed by the download task so a download has at most one install.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "task_relations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub download_task_id: String,
    #[sea_orm(unique)]
    pub install_task_id: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
