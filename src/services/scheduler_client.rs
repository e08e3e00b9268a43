use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Scheduler rejected the request: {0}")]
    Rejected(String),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

/// Body sent to the external scheduler. It later calls `callback_url` to
/// begin executing the task.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    pub task_id: String,
    pub callback_url: String,
}

#[async_trait]
pub trait SchedulerClient: Send + Sync {
    async fn schedule(&self, request: &ScheduleRequest) -> Result<(), SchedulerError>;
}

/// Posts schedule requests to the scheduler's HTTP endpoint. The response
/// body is ignored; only the status matters.
pub struct HttpSchedulerClient {
    client: Client,
    url: String,
}

impl HttpSchedulerClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl SchedulerClient for HttpSchedulerClient {
    async fn schedule(&self, request: &ScheduleRequest) -> Result<(), SchedulerError> {
        let response = self.client.post(&self.url).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(SchedulerError::Rejected(format!(
                "Scheduler returned non-success status: {status}. Body: {body}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_request_is_camel_case() {
        let request = ScheduleRequest {
            task_id: "dp1".to_string(),
            callback_url: "http://tasks/executions/download-package".to_string(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["taskId"], "dp1");
        assert_eq!(json["callbackUrl"], "http://tasks/executions/download-package");
    }
}
