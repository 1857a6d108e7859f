use async_trait::async_trait;
use thiserror::Error;

use crate::packages::{AppPackage, CatalogueEntry};

#[derive(Debug, Error)]
pub enum PackageStoreError {
    #[error("package '{0}' not found in the store")]
    NotFound(String),
    #[error("package store request failed: {0}")]
    Request(String),
    #[error("package store returned status {0} for {1}")]
    Status(u16, String),
    #[error("failed parsing package store response: {0}")]
    Parse(String),
}

/// Contract of the consumed package store: a version catalogue plus full
/// package definitions by id.
#[async_trait]
pub trait PackageResolver {
    async fn catalogue(&self) -> Result<Vec<CatalogueEntry>, PackageStoreError>;
    async fn get_package(&self, package_id: &str) -> Result<AppPackage, PackageStoreError>;
}

/// Package store client fetching `list.json` and per-package `schema.json`
/// documents from a static file host.
pub struct HttpPackageResolver {
    base_url: String,
    client: reqwest::Client,
}

impl HttpPackageResolver {
    pub fn new(store_url: &str) -> Self {
        HttpPackageResolver {
            base_url: store_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn fetch(&self, url: &str) -> Result<reqwest::Response, PackageStoreError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| PackageStoreError::Request(err.to_string()))?;
        if !response.status().is_success() {
            return Err(PackageStoreError::Status(
                response.status().as_u16(),
                url.to_string(),
            ));
        }
        Ok(response)
    }
}

#[async_trait]
impl PackageResolver for HttpPackageResolver {
    async fn catalogue(&self) -> Result<Vec<CatalogueEntry>, PackageStoreError> {
        let url = format!("{}/list.json", self.base_url);
        self.fetch(&url)
            .await?
            .json()
            .await
            .map_err(|err| PackageStoreError::Parse(err.to_string()))
    }

    async fn get_package(&self, package_id: &str) -> Result<AppPackage, PackageStoreError> {
        let url = format!("{}/packages/{package_id}/schema.json", self.base_url);
        let response = match self.fetch(&url).await {
            Err(PackageStoreError::Status(404, _)) => {
                return Err(PackageStoreError::NotFound(package_id.to_string()))
            }
            other => other?,
        };
        response
            .json()
            .await
            .map_err(|err| PackageStoreError::Parse(err.to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn trailing_slashes_are_trimmed_from_the_store_url() {
        let resolver = HttpPackageResolver::new("https://store.example.com/apps/");
        assert_eq!(resolver.base_url, "https://store.example.com/apps");
    }
}
