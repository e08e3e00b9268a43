use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::db::enums::{TaskStatus, TaskType};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tasks")]
pub struct Model {
    // Assigned by the caller before persistence, never by the database.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(column_name = "type", indexed)]
    pub task_type: TaskType,
    pub name: Option<String>,
    #[sea_orm(indexed)]
    pub status: TaskStatus,
    pub created_by: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::task_asset::Entity")]
    TaskAsset,
    #[sea_orm(has_many = "super::task_package::Entity")]
    TaskPackage,
}

impl Related<super::task_asset::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TaskAsset.def()
    }
}

impl Related<super::task_package::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TaskPackage.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
