use axum::{
    Router,
    http::Method,
    middleware as axum_middleware,
    routing::get,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::db::services::{StatusAggregator, TaskManager};
use crate::services::user_info::UserInfoLookup;
use crate::web::{middleware::auth, routes::*};

pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;

#[derive(Clone)]
pub struct AppState {
    pub task_manager: Arc<TaskManager>,
    pub status_aggregator: Arc<StatusAggregator>,
    pub user_lookup: Arc<dyn UserInfoLookup>,
}

async fn health_check_handler() -> &'static str {
    "OK"
}

pub fn create_axum_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(vec![Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health_check_handler))
        .nest(
            "/api/tasks",
            task_routes::task_routes()
                .merge(status_routes::task_status_routes())
                .route_layer(axum_middleware::from_fn_with_state(app_state.clone(), auth::auth)),
        )
        .nest(
            "/api/assets",
            status_routes::asset_status_routes()
                .route_layer(axum_middleware::from_fn_with_state(app_state.clone(), auth::auth)),
        )
        .with_state(app_state)
        .layer(cors)
}
