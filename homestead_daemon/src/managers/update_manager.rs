use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, error, info};
use thiserror::Error;

use super::lifecycle::{AppLifecycle, LifecycleError};
use crate::packages::CatalogueEntry;
use crate::storage::{AppStore, InstalledAppRecord};
use crate::store::PackageResolver;
use crate::version::{self, VersionError};

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("failed refreshing the package catalogue: {0}")]
    Catalogue(String),
    #[error("failed loading installed app records: {0}")]
    Records(String),
    #[error("updating failed for {0} app(s): {1}")]
    AppsFailed(usize, String),
}

#[derive(Debug, Error)]
enum AppUpdateError {
    #[error(transparent)]
    Version(#[from] VersionError),
    #[error("failed fetching the package definition: {0}")]
    Fetch(String),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// Drives version-driven reinstallation: any installed app whose catalogue
/// version is strictly newer is torn down to its containers and installed
/// again from the fresh package definition.
pub struct UpdateManager {
    packages: Arc<dyn PackageResolver + Send + Sync>,
    store: Arc<dyn AppStore + Send + Sync>,
    lifecycle: Arc<dyn AppLifecycle + Send + Sync>,
}

impl UpdateManager {
    pub fn new(
        packages: Arc<dyn PackageResolver + Send + Sync>,
        store: Arc<dyn AppStore + Send + Sync>,
        lifecycle: Arc<dyn AppLifecycle + Send + Sync>,
    ) -> Self {
        UpdateManager {
            packages,
            store,
            lifecycle,
        }
    }

    /// Checks every installed app against the catalogue. One app's failure
    /// does not stop the sweep; the collected failures are reported in the
    /// returned error. Updated apps are left stopped for the caller to
    /// start.
    pub async fn update_apps(&self) -> Result<(), UpdateError> {
        let catalogue = self
            .packages
            .catalogue()
            .await
            .map_err(|err| UpdateError::Catalogue(err.to_string()))?;
        let records = self
            .store
            .list_records()
            .await
            .map_err(|err| UpdateError::Records(err.to_string()))?;
        let installed: HashMap<&str, &InstalledAppRecord> = records
            .iter()
            .map(|record| (record.id.as_str(), record))
            .collect();

        let mut failures = Vec::new();
        for entry in &catalogue {
            let Some(record) = installed.get(entry.id.as_str()) else {
                continue;
            };
            match self.update_app(entry, record).await {
                Ok(true) => info!("updated app {} to {}", entry.id, entry.version),
                Ok(false) => debug!("app {} is up to date", entry.id),
                Err(err) => {
                    error!("failed updating app {}: {err}", entry.id);
                    failures.push(format!("{}: {err}", entry.id));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(UpdateError::AppsFailed(failures.len(), failures.join("; ")))
        }
    }

    async fn update_app(
        &self,
        entry: &CatalogueEntry,
        record: &InstalledAppRecord,
    ) -> Result<bool, AppUpdateError> {
        if version::compare(&entry.version, &record.package.app_version)? != Ordering::Greater {
            return Ok(false);
        }

        info!(
            "updating app {} from {} to {}",
            entry.id, record.package.app_version, entry.version
        );
        let package = self
            .packages
            .get_package(&entry.id)
            .await
            .map_err(|err| AppUpdateError::Fetch(err.to_string()))?;

        self.lifecycle.remove_containers(&entry.id).await?;
        // Install recreates the resources and refreshes the persisted
        // snapshot under the same app id.
        self.lifecycle.install(&package).await?;
        Ok(true)
    }
}
