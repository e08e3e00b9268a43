use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PackageLookupError {
    #[error("Package service returned an error: {0}")]
    LookupFailed(String),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PackageInfo {
    pub id: String,
    pub name: String,
}

#[async_trait]
pub trait PackageLookup: Send + Sync {
    async fn get_many(&self, package_ids: &[String]) -> Result<Vec<PackageInfo>, PackageLookupError>;
}

pub struct HttpPackageLookup {
    client: Client,
    url: String,
}

impl HttpPackageLookup {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl PackageLookup for HttpPackageLookup {
    async fn get_many(&self, package_ids: &[String]) -> Result<Vec<PackageInfo>, PackageLookupError> {
        if package_ids.is_empty() {
            return Ok(Vec::new());
        }
        let response = self
            .client
            .get(&self.url)
            .query(&[("ids", package_ids.join(","))])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PackageLookupError::LookupFailed(format!(
                "Package service returned non-success status: {status}"
            )));
        }
        // A body that is not a package list fails here as a decode error.
        Ok(response.json::<Vec<PackageInfo>>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_ids_skips_the_service() {
        let lookup = HttpPackageLookup::new("http://127.0.0.1:1/packages");
        assert!(lookup.get_many(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_service_is_network_error() {
        let lookup = HttpPackageLookup::new("http://127.0.0.1:1/packages");
        let err = lookup.get_many(&["p1".to_string()]).await.unwrap_err();
        assert!(matches!(err, PackageLookupError::NetworkError(_)));
    }
}
