pub mod best_effort;
pub mod config;
pub mod event_recorder;
pub mod task_dispatcher;
