//! Data access and orchestration over the task tables.
//!
//! `task_store` holds the row-level primitives; the other modules build the
//! task lifecycle and the batch status reads on top of them. Public items are
//! re-exported under `crate::db::services::`.

pub mod relation_service;
pub mod status_service;
pub mod task_service;
pub mod task_store;

pub use relation_service::*;
pub use status_service::*;
pub use task_service::*;
pub use task_store::*;
