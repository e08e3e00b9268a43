use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UserInfoError {
    #[error("Access token was rejected")]
    Rejected,
    #[error("User info lookup failed: {0}")]
    LookupFailed(String),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    #[serde(default)]
    pub display_name: String,
}

#[async_trait]
pub trait UserInfoLookup: Send + Sync {
    async fn get_user_info(&self, access_token: &str) -> Result<UserInfo, UserInfoError>;
}

pub struct HttpUserInfoLookup {
    client: Client,
    url: String,
}

impl HttpUserInfoLookup {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl UserInfoLookup for HttpUserInfoLookup {
    async fn get_user_info(&self, access_token: &str) -> Result<UserInfo, UserInfoError> {
        let response = self
            .client
            .get(&self.url)
            .bearer_auth(access_token)
            .send()
            .await?;
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(UserInfoError::Rejected);
        }
        if !status.is_success() {
            return Err(UserInfoError::LookupFailed(format!(
                "User info service returned non-success status: {status}"
            )));
        }
        Ok(response.json::<UserInfo>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_may_be_missing() {
        let info: UserInfo = serde_json::from_str(r#"{"email":"a@b.c"}"#).unwrap();
        assert_eq!(info.display_name, "");

        let info: UserInfo = serde_json::from_str(r#"{"displayName":"Ada"}"#).unwrap();
        assert_eq!(info.display_name, "Ada");
    }
}
