//! Clients for the systems this service collaborates with but does not own.

pub mod error_catalog;
pub mod event_sink;
pub mod package_lookup;
pub mod scheduler_client;
pub mod user_info;
