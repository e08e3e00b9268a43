//! SeaORM entities mapping the task tables.

pub mod asset_status;
pub mod retrieve_log_result;
pub mod sub_device_result;
pub mod task;
pub mod task_asset;
pub mod task_event;
pub mod task_package;
pub mod task_relation;

