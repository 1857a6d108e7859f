use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;
use utils::waiting::{self, WaitError};

use super::app_lock::AppLockRegistry;
use super::lifecycle::{AppLifecycle, AppStatus, LifecycleError};
use crate::config::{HostConfig, PlatformConfig, StorageConfig};
use crate::packages::{AppPackage, ContainerSpec};
use crate::proxy::ProxyRegistry;
use crate::resolver;
use crate::runtime::{
    self, ContainerState, ContainerSummary, CreateContainerRequest, NetworkSummary, RuntimeClient,
    RuntimeError, APP_VERSION_LABEL,
};
use crate::storage::{AppStore, InstalledAppRecord, StoreError};

const EXIT_WAIT_TIMEOUT: Duration = Duration::from_secs(10);
const EXIT_WAIT_INTERVAL: Duration = Duration::from_millis(100);
const DETACH_WAIT_TIMEOUT: Duration = Duration::from_secs(10);
const DETACH_WAIT_INTERVAL: Duration = Duration::from_millis(50);

pub struct LifecycleManager {
    runtime: Arc<dyn RuntimeClient + Send + Sync>,
    store: Arc<dyn AppStore + Send + Sync>,
    proxies: Arc<ProxyRegistry>,
    host: HostConfig,
    storage: StorageConfig,
    platform: PlatformConfig,
    locks: AppLockRegistry,
    cancel: CancellationToken,
}

impl LifecycleManager {
    pub fn new(
        runtime: Arc<dyn RuntimeClient + Send + Sync>,
        store: Arc<dyn AppStore + Send + Sync>,
        proxies: Arc<ProxyRegistry>,
        host: HostConfig,
        storage: StorageConfig,
        platform: PlatformConfig,
        cancel: CancellationToken,
    ) -> Self {
        LifecycleManager {
            runtime,
            store,
            proxies,
            host,
            storage,
            platform,
            locks: AppLockRegistry::new(),
            cancel,
        }
    }

    async fn install_locked(&self, package: &AppPackage) -> Result<(), LifecycleError> {
        if package.id.is_empty() {
            return Err(LifecycleError::Validation(
                "package id must not be empty".to_string(),
            ));
        }

        info!(
            "installing app {} version {}",
            package.id, package.app_version
        );
        let labels = resolver::app_labels(package);
        let network_id = runtime::get_or_create_network(
            self.runtime.as_ref(),
            &resolver::network_name(&package.id),
            &labels,
        )
        .await?;

        for spec in &package.containers {
            self.create_app_container(package, spec, &network_id, &labels)
                .await?;
        }

        self.persist_record(package).await?;
        self.register_proxies(package).await?;
        info!("installed app {}", package.id);
        Ok(())
    }

    async fn create_app_container(
        &self,
        package: &AppPackage,
        spec: &ContainerSpec,
        network_id: &str,
        labels: &HashMap<String, String>,
    ) -> Result<(), LifecycleError> {
        if !self.runtime.image_present(&spec.image).await? {
            info!("pulling image {} for {}", spec.image, package.id);
            self.runtime.pull_image(&spec.image).await?;
        }

        let mut binds = Vec::new();
        for raw in &spec.volumes {
            let mount = resolver::resolve_volume(raw, &package.id, &self.storage)?;
            if let Some(volume) = &mount.named_volume {
                self.ensure_volume(volume, &package.id).await?;
            }
            binds.push(mount.bind);
        }

        let mut networks = vec![network_id.to_string()];
        if spec.proxy_target {
            networks.push(self.ensure_proxy_network(&package.id, labels).await?);
        }

        let name = resolver::container_name(&package.id, &spec.name);
        let request = CreateContainerRequest {
            name: name.clone(),
            image: spec.image.clone(),
            hostname: Some(spec.name.clone()),
            cmd: resolver::split_command(spec.command.as_deref()),
            env: resolver::flatten_environment(&spec.environment),
            labels: labels.clone(),
            binds,
            ports: resolver::parse_ports(&spec.ports)?,
            restart_policy: resolver::restart_policy(spec),
            extra_hosts: resolver::extra_hosts(spec, &self.host),
            privileged: spec.privileged,
            networks,
            auto_remove: false,
        };

        // Containers are created but not started; starting is an explicit,
        // separate transition.
        self.runtime.create_container(request).await?;
        debug!("created container {name}");
        Ok(())
    }

    async fn ensure_volume(&self, volume: &str, app_id: &str) -> Result<(), LifecycleError> {
        if !self.runtime.volume_exists(volume).await? {
            self.runtime
                .create_volume(volume, &resolver::volume_labels(app_id))
                .await?;
            debug!("created volume {volume}");
        }
        Ok(())
    }

    async fn ensure_proxy_network(
        &self,
        app_id: &str,
        labels: &HashMap<String, String>,
    ) -> Result<String, LifecycleError> {
        let network_id = runtime::get_or_create_network(
            self.runtime.as_ref(),
            &resolver::proxy_network_name(app_id),
            labels,
        )
        .await?;

        match self
            .runtime
            .connect_network(&network_id, &self.platform.container_name)
            .await
        {
            Err(RuntimeError::Conflict(reason)) => {
                debug!("platform container already attached to proxy network: {reason}");
            }
            other => other?,
        }
        Ok(network_id)
    }

    async fn persist_record(&self, package: &AppPackage) -> Result<(), LifecycleError> {
        match self.store.get_record(&package.id).await {
            // Updates keep the record, and with it the app's credentials.
            Ok(_) => self.store.update_record(&package.id, package).await?,
            Err(StoreError::NotFound(_)) => {
                self.store
                    .create_record(InstalledAppRecord::new(package.clone()))
                    .await?
            }
            Err(err) => return Err(err.into()),
        }
        Ok(())
    }

    async fn register_proxies(&self, package: &AppPackage) -> Result<(), LifecycleError> {
        for spec in package.containers.iter().filter(|spec| spec.proxy_target) {
            self.proxies
                .add_proxy(
                    &package.name,
                    &resolver::container_name(&package.id, &spec.name),
                    &spec.proxy_port,
                )
                .await?;
        }
        Ok(())
    }

    async fn start_locked(&self, app_id: &str) -> Result<(), LifecycleError> {
        let containers = self.runtime.list_containers(app_id, true).await?;
        if containers.is_empty() {
            return Err(LifecycleError::NotInstalled(app_id.to_string()));
        }

        for container in &containers {
            self.runtime.start_container(&container.id).await?;
        }
        info!("started app {app_id}");
        Ok(())
    }

    async fn stop_locked(&self, app_id: &str) -> Result<(), LifecycleError> {
        let containers = self.runtime.list_containers(app_id, false).await?;
        for container in &containers {
            self.runtime.stop_container(&container.id).await?;
        }
        info!("stopped app {app_id}");
        Ok(())
    }

    async fn remove_containers_locked(&self, app_id: &str) -> Result<(), LifecycleError> {
        self.stop_locked(app_id).await?;

        let containers = self.runtime.list_containers(app_id, true).await?;
        for container in &containers {
            self.wait_for_exit(container).await?;
            self.runtime.remove_container(&container.id).await?;
            debug!("removed container {}", container.name);
        }
        Ok(())
    }

    async fn wait_for_exit(&self, container: &ContainerSummary) -> Result<(), LifecycleError> {
        // A container that was never started cannot reach the exited state.
        if !matches!(
            container.state,
            ContainerState::Running | ContainerState::Restarting | ContainerState::Paused
        ) {
            return Ok(());
        }
        runtime::until_state(
            self.runtime.as_ref(),
            &container.id,
            ContainerState::Exited,
            EXIT_WAIT_TIMEOUT,
            EXIT_WAIT_INTERVAL,
            &self.cancel,
        )
        .await?;
        Ok(())
    }

    async fn uninstall_locked(&self, app_id: &str) -> Result<(), LifecycleError> {
        info!("uninstalling app {app_id}");
        let record = match self.store.get_record(app_id).await {
            Ok(record) => Some(record),
            Err(StoreError::NotFound(_)) => None,
            Err(err) => return Err(err.into()),
        };

        self.remove_containers_locked(app_id).await?;

        for volume in self.runtime.list_volumes(app_id).await? {
            self.runtime.remove_volume(&volume.name).await?;
            debug!("removed volume {}", volume.name);
        }

        for network in self.runtime.list_networks(app_id).await? {
            self.detach_network_clients(&network).await?;
            self.runtime.remove_network(&network.id).await?;
            debug!("removed network {}", network.name);
        }

        if let Some(record) = record {
            if record.package.containers.iter().any(|spec| spec.proxy_target) {
                self.proxies.remove_proxy(&record.package.name).await;
            }
            match self.store.delete_record(app_id).await {
                Err(StoreError::NotFound(_)) => {}
                other => other?,
            }
        }
        info!("uninstalled app {app_id}");
        Ok(())
    }

    /// Disconnects everything still attached to the network, normally just
    /// the platform's own container on a proxy network, and waits until the
    /// inspect endpoint agrees. On timeout the network is left in place for
    /// the operator and the error surfaced.
    async fn detach_network_clients(
        &self,
        network: &NetworkSummary,
    ) -> Result<(), LifecycleError> {
        let details = self.runtime.inspect_network(&network.id).await?;
        for attached in &details.attached {
            debug!("disconnecting {attached} from network {}", details.name);
            self.runtime
                .disconnect_network(&network.id, attached)
                .await?;
        }

        let wait = waiting::wait_until(
            || async {
                Ok::<_, RuntimeError>(
                    self.runtime
                        .inspect_network(&network.id)
                        .await?
                        .attached
                        .is_empty(),
                )
            },
            DETACH_WAIT_TIMEOUT,
            DETACH_WAIT_INTERVAL,
            &self.cancel,
        )
        .await;

        match wait {
            Ok(()) => Ok(()),
            Err(WaitError::Timeout(_)) => {
                let details = self.runtime.inspect_network(&network.id).await?;
                warn!(
                    "network {} still has containers attached after disconnecting: {:?}",
                    details.name, details.attached
                );
                Err(RuntimeError::Timeout(format!(
                    "network {} to detach all containers",
                    details.name
                ))
                .into())
            }
            Err(WaitError::Cancelled) => Err(RuntimeError::Cancelled.into()),
            Err(WaitError::Condition(err)) => Err(err.into()),
        }
    }

    async fn runtime_version(&self, app_id: &str) -> Result<String, LifecycleError> {
        let containers = self.runtime.list_containers(app_id, true).await?;
        let container = containers
            .first()
            .ok_or_else(|| LifecycleError::NotInstalled(app_id.to_string()))?;
        container
            .labels
            .get(APP_VERSION_LABEL)
            .cloned()
            .ok_or_else(|| LifecycleError::InvalidContainer(container.name.clone()))
    }
}

#[async_trait]
impl AppLifecycle for LifecycleManager {
    async fn install(&self, package: &AppPackage) -> Result<(), LifecycleError> {
        let _guard = self.locks.acquire(&package.id).await;
        self.install_locked(package).await
    }

    async fn start(&self, app_id: &str) -> Result<(), LifecycleError> {
        let _guard = self.locks.acquire(app_id).await;
        self.start_locked(app_id).await
    }

    async fn stop(&self, app_id: &str) -> Result<(), LifecycleError> {
        let _guard = self.locks.acquire(app_id).await;
        self.stop_locked(app_id).await
    }

    async fn remove_containers(&self, app_id: &str) -> Result<(), LifecycleError> {
        let _guard = self.locks.acquire(app_id).await;
        self.remove_containers_locked(app_id).await
    }

    async fn uninstall(&self, app_id: &str) -> Result<(), LifecycleError> {
        let _guard = self.locks.acquire(app_id).await;
        self.uninstall_locked(app_id).await
    }

    async fn is_installed(&self, app_id: &str) -> Result<bool, LifecycleError> {
        Ok(!self.runtime.list_containers(app_id, true).await?.is_empty())
    }

    async fn is_running(&self, app_id: &str) -> Result<bool, LifecycleError> {
        let containers = self.runtime.list_containers(app_id, true).await?;
        if containers.is_empty() {
            return Err(LifecycleError::NotInstalled(app_id.to_string()));
        }
        Ok(containers
            .iter()
            .all(|container| container.state == ContainerState::Running))
    }

    async fn app_version(&self, app_id: &str) -> Result<String, LifecycleError> {
        self.runtime_version(app_id).await
    }

    async fn status(&self, app_id: &str) -> Result<AppStatus, LifecycleError> {
        let record = match self.store.get_record(app_id).await {
            Ok(record) => record,
            Err(StoreError::NotFound(_)) => {
                return Err(LifecycleError::NotInstalled(app_id.to_string()))
            }
            Err(err) => return Err(err.into()),
        };

        let label_version = self.runtime_version(app_id).await?;
        if label_version != record.package.app_version {
            // A version split between record and labels means an update was
            // only partially applied.
            return Err(LifecycleError::InconsistentState {
                app_id: app_id.to_string(),
                record_version: record.package.app_version,
                label_version,
            });
        }

        let running = self.is_running(app_id).await?;
        Ok(AppStatus {
            app_id: app_id.to_string(),
            version: label_version,
            running,
        })
    }
}
