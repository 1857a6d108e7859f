pub mod docker;

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use utils::waiting::{self, WaitError};

/// Label carried by every runtime resource belonging to an app; the only
/// source of truth for resource ownership.
pub const APP_ID_LABEL: &str = "AppID";
/// Label carrying the installed package version of a resource.
pub const APP_VERSION_LABEL: &str = "AppVersion";

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("no matching runtime resource: {0}")]
    NotFound(String),
    #[error("runtime resource has invalid configuration: {0}")]
    InvalidResource(String),
    #[error("timed out waiting for {0}")]
    Timeout(String),
    #[error("conflicting runtime state: {0}")]
    Conflict(String),
    #[error("operation was cancelled")]
    Cancelled,
    #[error("runtime api error: {0}")]
    Api(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Created,
    Restarting,
    Running,
    Paused,
    Removing,
    Exited,
    Dead,
    Unknown,
}

impl ContainerState {
    pub fn parse(state: &str) -> Self {
        match state {
            "created" => ContainerState::Created,
            "restarting" => ContainerState::Restarting,
            "running" => ContainerState::Running,
            "paused" => ContainerState::Paused,
            "removing" => ContainerState::Removing,
            "exited" => ContainerState::Exited,
            "dead" => ContainerState::Dead,
            _ => ContainerState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerState::Created => "created",
            ContainerState::Restarting => "restarting",
            ContainerState::Running => "running",
            ContainerState::Paused => "paused",
            ContainerState::Removing => "removing",
            ContainerState::Exited => "exited",
            ContainerState::Dead => "dead",
            ContainerState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub state: ContainerState,
    pub labels: HashMap<String, String>,
    /// Names of the runtime-managed volumes mounted by this container.
    pub volume_mounts: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NetworkSummary {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct NetworkDetails {
    pub id: String,
    pub name: String,
    pub labels: HashMap<String, String>,
    /// Names of the containers currently attached to the network. Only the
    /// inspect endpoint reports these reliably; list results do not.
    pub attached: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct VolumeSummary {
    pub name: String,
}

/// Host-to-container port mapping; the container side carries its protocol
/// suffix (`80/tcp`). Bound on all host interfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortBinding {
    pub host_port: String,
    pub container_port: String,
}

#[derive(Debug, Clone, Default)]
pub struct CreateContainerRequest {
    pub name: String,
    pub image: String,
    pub hostname: Option<String>,
    pub cmd: Option<Vec<String>>,
    pub env: Vec<String>,
    pub labels: HashMap<String, String>,
    /// Bind strings in docker syntax, named-volume sources included.
    pub binds: Vec<String>,
    pub ports: Vec<PortBinding>,
    /// Runtime restart policy name; empty means no policy.
    pub restart_policy: String,
    pub extra_hosts: Vec<String>,
    pub privileged: bool,
    /// Networks the container is attached to at creation time.
    pub networks: Vec<String>,
    pub auto_remove: bool,
}

/// Contract of the consumed container runtime. All app-scoped listings
/// filter on the `AppID` label.
#[async_trait]
pub trait RuntimeClient: Send + Sync {
    async fn inspect_network(&self, name_or_id: &str) -> Result<NetworkDetails, RuntimeError>;
    async fn create_network(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
    ) -> Result<(), RuntimeError>;
    async fn list_networks(&self, app_id: &str) -> Result<Vec<NetworkSummary>, RuntimeError>;
    async fn remove_network(&self, name_or_id: &str) -> Result<(), RuntimeError>;
    async fn connect_network(&self, network: &str, container: &str) -> Result<(), RuntimeError>;
    async fn disconnect_network(&self, network: &str, container: &str)
        -> Result<(), RuntimeError>;

    async fn volume_exists(&self, name: &str) -> Result<bool, RuntimeError>;
    async fn create_volume(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
    ) -> Result<(), RuntimeError>;
    async fn list_volumes(&self, app_id: &str) -> Result<Vec<VolumeSummary>, RuntimeError>;
    async fn remove_volume(&self, name: &str) -> Result<(), RuntimeError>;

    async fn image_present(&self, image: &str) -> Result<bool, RuntimeError>;
    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError>;

    async fn create_container(
        &self,
        request: CreateContainerRequest,
    ) -> Result<String, RuntimeError>;
    async fn start_container(&self, name_or_id: &str) -> Result<(), RuntimeError>;
    async fn stop_container(&self, name_or_id: &str) -> Result<(), RuntimeError>;
    /// Removes the container together with its anonymous volumes.
    async fn remove_container(&self, name_or_id: &str) -> Result<(), RuntimeError>;
    async fn inspect_container_state(
        &self,
        name_or_id: &str,
    ) -> Result<ContainerState, RuntimeError>;
    async fn list_containers(
        &self,
        app_id: &str,
        include_stopped: bool,
    ) -> Result<Vec<ContainerSummary>, RuntimeError>;
    /// Blocks until the container has been fully deleted from the runtime.
    async fn wait_removed(&self, name_or_id: &str) -> Result<(), RuntimeError>;
}

/// Inspect-then-create network lookup; both calls with the same name return
/// the same network identity, and at most one create is issued.
pub async fn get_or_create_network(
    client: &dyn RuntimeClient,
    name: &str,
    labels: &HashMap<String, String>,
) -> Result<String, RuntimeError> {
    match client.inspect_network(name).await {
        Ok(details) => Ok(details.id),
        Err(RuntimeError::NotFound(_)) => {
            client.create_network(name, labels).await?;
            Ok(client.inspect_network(name).await?.id)
        }
        Err(err) => Err(err),
    }
}

/// Polls a container until it reports the target state.
pub async fn until_state(
    client: &dyn RuntimeClient,
    container: &str,
    target: ContainerState,
    timeout: Duration,
    interval: Duration,
    cancel: &CancellationToken,
) -> Result<(), RuntimeError> {
    let result = waiting::wait_until(
        || async {
            Ok::<_, RuntimeError>(client.inspect_container_state(container).await? == target)
        },
        timeout,
        interval,
        cancel,
    )
    .await;

    match result {
        Ok(()) => Ok(()),
        Err(WaitError::Timeout(timeout)) => Err(RuntimeError::Timeout(format!(
            "container {container} to reach state '{target}' within {timeout:?}"
        ))),
        Err(WaitError::Cancelled) => Err(RuntimeError::Cancelled),
        Err(WaitError::Condition(err)) => Err(err),
    }
}

/// Bounds the runtime's blocking removed-wait with a timeout.
pub async fn until_removed(
    client: &dyn RuntimeClient,
    container: &str,
    timeout: Duration,
) -> Result<(), RuntimeError> {
    tokio::time::timeout(timeout, client.wait_removed(container))
        .await
        .map_err(|_| {
            RuntimeError::Timeout(format!("container {container} to be removed within {timeout:?}"))
        })?
}
