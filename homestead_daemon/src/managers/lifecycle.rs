use async_trait::async_trait;
use thiserror::Error;

use crate::packages::AppPackage;
use crate::proxy::ProxyError;
use crate::resolver::ResolveError;
use crate::runtime::RuntimeError;
use crate::storage::StoreError;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("app '{0}' is not installed")]
    NotInstalled(String),
    #[error("container '{0}' carries no version label")]
    InvalidContainer(String),
    #[error(
        "app '{app_id}' is in an inconsistent state: \
         record version {record_version}, runtime version {label_version}"
    )]
    InconsistentState {
        app_id: String,
        record_version: String,
        label_version: String,
    },
    #[error("invalid app package: {0}")]
    Validation(String),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Proxy(#[from] ProxyError),
}

/// Reconciled view of an installed app: the persisted snapshot version next
/// to what the runtime labels report.
#[derive(Debug, Clone, PartialEq)]
pub struct AppStatus {
    pub app_id: String,
    pub version: String,
    pub running: bool,
}

/// Application lifecycle transitions against the container runtime. Every
/// operation serializes on a per-app-id lock; triggers for different apps
/// run independently.
#[async_trait]
pub trait AppLifecycle {
    /// Translates a package into runtime resources: the app network, any
    /// proxy network, named volumes and the containers, which are created
    /// but not started. A failure aborts the remaining steps without
    /// rolling back resources already created.
    async fn install(&self, package: &AppPackage) -> Result<(), LifecycleError>;
    async fn start(&self, app_id: &str) -> Result<(), LifecycleError>;
    async fn stop(&self, app_id: &str) -> Result<(), LifecycleError>;
    /// Stops and deletes the app's containers together with their anonymous
    /// volumes, leaving networks, named volumes and the persisted record in
    /// place. Used by both uninstall and update.
    async fn remove_containers(&self, app_id: &str) -> Result<(), LifecycleError>;
    async fn uninstall(&self, app_id: &str) -> Result<(), LifecycleError>;

    async fn is_installed(&self, app_id: &str) -> Result<bool, LifecycleError>;
    async fn is_running(&self, app_id: &str) -> Result<bool, LifecycleError>;
    /// The app version according to the runtime labels.
    async fn app_version(&self, app_id: &str) -> Result<String, LifecycleError>;
    /// Cross-checks the persisted record against the runtime labels,
    /// surfacing divergence as an inconsistent-state error.
    async fn status(&self, app_id: &str) -> Result<AppStatus, LifecycleError>;
}
