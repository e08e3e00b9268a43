pub mod status_routes;
pub mod task_routes;
