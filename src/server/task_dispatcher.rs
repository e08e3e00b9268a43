use std::sync::Arc;
use tracing::info;

use crate::server::best_effort::{absorb, SideEffect};
use crate::services::scheduler_client::{ScheduleRequest, SchedulerClient};

/// Asks the external scheduler to start executing a created task.
/// Delivery is best-effort: no retry, no backoff.
#[derive(Clone)]
pub struct TaskDispatcher {
    scheduler: Arc<dyn SchedulerClient>,
    callback_base_url: String,
}

impl TaskDispatcher {
    pub fn new(scheduler: Arc<dyn SchedulerClient>, callback_base_url: impl Into<String>) -> Self {
        Self {
            scheduler,
            callback_base_url: callback_base_url.into(),
        }
    }

    pub fn callback_url(&self, callback_path: &str) -> String {
        format!(
            "{}/{}",
            self.callback_base_url.trim_end_matches('/'),
            callback_path.trim_start_matches('/')
        )
    }

    pub async fn dispatch(&self, task_id: &str, callback_path: &str) -> SideEffect {
        let request = ScheduleRequest {
            task_id: task_id.to_owned(),
            callback_url: self.callback_url(callback_path),
        };
        let outcome = absorb("dispatch", &request, self.scheduler.schedule(&request)).await;
        if outcome.is_completed() {
            info!(task_id = %task_id, callback_url = %request.callback_url, "Task dispatched to scheduler.");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::scheduler_client::{HttpSchedulerClient, SchedulerError};
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingScheduler {
        requests: Mutex<Vec<ScheduleRequest>>,
        fail: bool,
    }

    #[async_trait]
    impl SchedulerClient for RecordingScheduler {
        async fn schedule(&self, request: &ScheduleRequest) -> Result<(), SchedulerError> {
            self.requests.lock().await.push(request.clone());
            if self.fail {
                return Err(SchedulerError::Rejected("503".to_string()));
            }
            Ok(())
        }
    }

    #[test]
    fn test_callback_url_joins_one_slash() {
        let dispatcher = TaskDispatcher::new(
            Arc::new(RecordingScheduler::default()),
            "http://tasks.internal/",
        );
        assert_eq!(
            dispatcher.callback_url("/executions/reboot"),
            "http://tasks.internal/executions/reboot"
        );
        assert_eq!(
            dispatcher.callback_url("executions/reboot"),
            "http://tasks.internal/executions/reboot"
        );
    }

    #[tokio::test]
    async fn test_dispatch_sends_task_and_callback() {
        let scheduler = Arc::new(RecordingScheduler::default());
        let dispatcher = TaskDispatcher::new(scheduler.clone(), "http://tasks.internal");

        let outcome = dispatcher.dispatch("dp1", "/executions/download-package").await;
        assert_eq!(outcome, SideEffect::Completed);

        let requests = scheduler.requests.lock().await;
        assert_eq!(
            *requests,
            vec![ScheduleRequest {
                task_id: "dp1".to_string(),
                callback_url: "http://tasks.internal/executions/download-package".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_rejected_dispatch_is_absorbed() {
        let scheduler = Arc::new(RecordingScheduler {
            fail: true,
            ..Default::default()
        });
        let dispatcher = TaskDispatcher::new(scheduler.clone(), "http://tasks.internal");

        let outcome = dispatcher.dispatch("dp1", "/executions/download-package").await;
        assert_eq!(outcome, SideEffect::Absorbed);
        // Exactly one attempt.
        assert_eq!(scheduler.requests.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_scheduler_is_absorbed() {
        let scheduler = Arc::new(HttpSchedulerClient::new("http://127.0.0.1:1/schedule"));
        let dispatcher = TaskDispatcher::new(scheduler, "http://tasks.internal");

        let outcome = dispatcher.dispatch("dp1", "/executions/download-package").await;
        assert_eq!(outcome, SideEffect::Absorbed);
    }
}
