use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, Schema};
use tracing::debug;

use crate::db::entities::{
    asset_status, retrieve_log_result, sub_device_result, task, task_asset, task_event,
    task_package, task_relation,
};

async fn create_table<E: EntityTrait>(
    db: &DatabaseConnection,
    schema: &Schema,
    entity: E,
) -> Result<(), DbErr> {
    let mut stmt = schema.create_table_from_entity(entity);
    stmt.if_not_exists();
    db.execute(db.get_database_backend().build(&stmt)).await?;
    debug!(table = entity.table_name(), "Ensured table exists.");
    Ok(())
}

/// Creates every task table that does not exist yet. Parents are created
/// before the tables that reference them.
pub async fn create_tables(db: &DatabaseConnection) -> Result<(), DbErr> {
    let schema = Schema::new(db.get_database_backend());

    create_table(db, &schema, task::Entity).await?;
    create_table(db, &schema, task_asset::Entity).await?;
    create_table(db, &schema, task_package::Entity).await?;
    create_table(db, &schema, task_relation::Entity).await?;
    create_table(db, &schema, sub_device_result::Entity).await?;
    create_table(db, &schema, retrieve_log_result::Entity).await?;
    create_table(db, &schema, asset_status::Entity).await?;
    create_table(db, &schema, task_event::Entity).await?;
    Ok(())
}
