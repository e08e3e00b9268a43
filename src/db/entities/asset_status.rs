use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Latest reported status of an asset. Sub-assets point at their parent
/// through `(parent_type_id, parent_asset_id)`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "asset_statuses")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub type_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub asset_id: String,
    pub status: Option<String>,
    pub error_code: Option<String>,
    #[sea_orm(indexed)]
    pub parent_type_id: Option<String>,
    #[sea_orm(indexed)]
    pub parent_asset_id: Option<String>,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
