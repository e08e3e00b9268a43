use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::db::enums::TaskType;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "task_events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(indexed)]
    pub task_id: String,
    pub task_type: TaskType,
    pub type_id: String,
    pub asset_id: String,
    pub task_name: Option<String>,
    pub detail: Option<String>,
    pub created_by: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
