//! In-memory database and collaborator fakes shared by the unit tests.

use async_trait::async_trait;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::db::services::task_service::TaskManager;
use crate::server::event_recorder::EventRecorder;
use crate::server::task_dispatcher::TaskDispatcher;
use crate::services::event_sink::{EventSink, EventSinkError, TaskEvent};
use crate::services::package_lookup::{PackageInfo, PackageLookup, PackageLookupError};
use crate::services::scheduler_client::{ScheduleRequest, SchedulerClient, SchedulerError};
use crate::services::user_info::{UserInfo, UserInfoError, UserInfoLookup};

/// A fresh in-memory database with every table created. A single pooled
/// connection keeps the in-memory database alive for the whole test.
pub async fn memory_db() -> DatabaseConnection {
    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.expect("in-memory sqlite");
    crate::db::schema::create_tables(&db).await.expect("schema");
    db
}

#[derive(Default)]
pub struct FakeScheduler {
    pub requests: Mutex<Vec<ScheduleRequest>>,
    pub fail: bool,
}

#[async_trait]
impl SchedulerClient for FakeScheduler {
    async fn schedule(&self, request: &ScheduleRequest) -> Result<(), SchedulerError> {
        self.requests.lock().await.push(request.clone());
        if self.fail {
            return Err(SchedulerError::Rejected("scheduler unavailable".to_string()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeSink {
    pub events: Mutex<Vec<TaskEvent>>,
    pub fail: bool,
}

#[async_trait]
impl EventSink for FakeSink {
    async fn insert_create(&self, event: TaskEvent) -> Result<(), EventSinkError> {
        if self.fail {
            return Err(EventSinkError::DbErr(sea_orm::DbErr::Custom(
                "event store unavailable".to_string(),
            )));
        }
        self.events.lock().await.push(event);
        Ok(())
    }
}

/// Names every package `pkg-<id>`.
pub struct FakePackages;

#[async_trait]
impl PackageLookup for FakePackages {
    async fn get_many(&self, ids: &[String]) -> Result<Vec<PackageInfo>, PackageLookupError> {
        Ok(ids
            .iter()
            .map(|id| PackageInfo {
                id: id.clone(),
                name: format!("pkg-{id}"),
            })
            .collect())
    }
}

/// Accepts exactly one token.
pub struct FakeUsers {
    pub token: String,
    pub display_name: String,
}

#[async_trait]
impl UserInfoLookup for FakeUsers {
    async fn get_user_info(&self, access_token: &str) -> Result<UserInfo, UserInfoError> {
        if access_token != self.token {
            return Err(UserInfoError::Rejected);
        }
        Ok(UserInfo {
            display_name: self.display_name.clone(),
        })
    }
}

pub struct Harness {
    pub db: DatabaseConnection,
    pub scheduler: Arc<FakeScheduler>,
    pub sink: Arc<FakeSink>,
    pub manager: TaskManager,
}

pub async fn harness(fail_dispatch: bool, fail_events: bool) -> Harness {
    let db = memory_db().await;
    let scheduler = Arc::new(FakeScheduler {
        fail: fail_dispatch,
        ..Default::default()
    });
    let sink = Arc::new(FakeSink {
        fail: fail_events,
        ..Default::default()
    });
    let dispatcher = TaskDispatcher::new(scheduler.clone(), "http://tasks.internal");
    let recorder = EventRecorder::new(sink.clone(), Arc::new(FakePackages));
    let manager = TaskManager::new(db.clone(), dispatcher, recorder);
    Harness {
        db,
        scheduler,
        sink,
        manager,
    }
}

pub const TEST_TOKEN: &str = "secret-token";

/// Router over the harness' database, accepting `TEST_TOKEN` as user "Ada".
pub fn app(h: &Harness, catalog: crate::services::error_catalog::ErrorCatalog) -> axum::Router {
    use crate::db::services::status_service::StatusAggregator;
    use crate::web::{AppState, create_axum_router};

    let state = Arc::new(AppState {
        task_manager: Arc::new(h.manager.clone()),
        status_aggregator: Arc::new(StatusAggregator::new(h.db.clone(), Arc::new(catalog))),
        user_lookup: Arc::new(FakeUsers {
            token: TEST_TOKEN.to_string(),
            display_name: "Ada".to_string(),
        }),
    });
    create_axum_router(state)
}

pub async fn json_body(response: axum::response::Response) -> serde_json::Value {
    use http_body_util::BodyExt;
    let bytes = response.into_body().collect().await.expect("body").to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}
