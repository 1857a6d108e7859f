use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, NetworkingConfig,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions, WaitContainerOptions,
};
use bollard::image::{CreateImageOptions, ListImagesOptions};
use bollard::models::{
    ContainerStateStatusEnum, EndpointSettings, HostConfig as DockerHostConfig,
    MountPointTypeEnum, PortBinding as DockerPortBinding, PortMap, RestartPolicy,
    RestartPolicyNameEnum,
};
use bollard::network::{
    ConnectNetworkOptions, CreateNetworkOptions, DisconnectNetworkOptions, InspectNetworkOptions,
    ListNetworksOptions,
};
use bollard::volume::{CreateVolumeOptions, ListVolumesOptions};
use bollard::Docker;
use futures_util::StreamExt;
use log::{debug, warn};

use super::{
    ContainerState, ContainerSummary, CreateContainerRequest, NetworkDetails, NetworkSummary,
    RuntimeClient, RuntimeError, VolumeSummary, APP_ID_LABEL,
};

/// Adapter between the platform's runtime contract and the Docker Engine
/// API.
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connects to the daemon, either through the given socket path or the
    /// environment defaults.
    pub fn connect(socket: Option<&str>) -> Result<Self, RuntimeError> {
        let docker = match socket {
            Some(path) => Docker::connect_with_unix(path, 120, bollard::API_DEFAULT_VERSION),
            None => Docker::connect_with_local_defaults(),
        }
        .map_err(|err| RuntimeError::Api(format!("connecting to docker daemon: {err}")))?;
        Ok(DockerRuntime { docker })
    }

    pub async fn ping(&self) -> Result<(), RuntimeError> {
        self.docker
            .ping()
            .await
            .map_err(|err| RuntimeError::Api(format!("pinging docker daemon: {err}")))?;
        Ok(())
    }
}

fn runtime_error(operation: &str, err: bollard::errors::Error) -> RuntimeError {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message,
        } => RuntimeError::NotFound(format!("{operation}: {message}")),
        bollard::errors::Error::DockerResponseServerError {
            status_code: 403 | 409,
            message,
        } if message.contains("already exists") || message.contains("already connected") => {
            RuntimeError::Conflict(format!("{operation}: {message}"))
        }
        err => RuntimeError::Api(format!("{operation}: {err}")),
    }
}

fn label_filter(app_id: &str) -> HashMap<String, Vec<String>> {
    HashMap::from([(
        "label".to_string(),
        vec![format!("{APP_ID_LABEL}={app_id}")],
    )])
}

fn restart_policy_name(policy: &str) -> Option<RestartPolicyNameEnum> {
    match policy {
        "" => None,
        "no" => Some(RestartPolicyNameEnum::NO),
        "always" => Some(RestartPolicyNameEnum::ALWAYS),
        "unless-stopped" => Some(RestartPolicyNameEnum::UNLESS_STOPPED),
        "on-failure" => Some(RestartPolicyNameEnum::ON_FAILURE),
        other => {
            warn!("unknown restart policy '{other}', defaulting to 'always'");
            Some(RestartPolicyNameEnum::ALWAYS)
        }
    }
}

fn container_state(status: Option<ContainerStateStatusEnum>) -> ContainerState {
    match status {
        Some(ContainerStateStatusEnum::CREATED) => ContainerState::Created,
        Some(ContainerStateStatusEnum::RESTARTING) => ContainerState::Restarting,
        Some(ContainerStateStatusEnum::RUNNING) => ContainerState::Running,
        Some(ContainerStateStatusEnum::PAUSED) => ContainerState::Paused,
        Some(ContainerStateStatusEnum::REMOVING) => ContainerState::Removing,
        Some(ContainerStateStatusEnum::EXITED) => ContainerState::Exited,
        Some(ContainerStateStatusEnum::DEAD) => ContainerState::Dead,
        _ => ContainerState::Unknown,
    }
}

#[async_trait]
impl RuntimeClient for DockerRuntime {
    async fn inspect_network(&self, name_or_id: &str) -> Result<NetworkDetails, RuntimeError> {
        let network = self
            .docker
            .inspect_network(name_or_id, None::<InspectNetworkOptions<String>>)
            .await
            .map_err(|err| runtime_error(&format!("inspecting network {name_or_id}"), err))?;

        let id = network.id.ok_or_else(|| {
            RuntimeError::InvalidResource(format!("network {name_or_id} has no id"))
        })?;
        let attached = network
            .containers
            .unwrap_or_default()
            .into_values()
            .filter_map(|container| container.name)
            .collect();

        Ok(NetworkDetails {
            id,
            name: network.name.unwrap_or_else(|| name_or_id.to_string()),
            labels: network.labels.unwrap_or_default(),
            attached,
        })
    }

    async fn create_network(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
    ) -> Result<(), RuntimeError> {
        let options = CreateNetworkOptions {
            name: name.to_string(),
            labels: labels.clone(),
            ..Default::default()
        };
        self.docker
            .create_network(options)
            .await
            .map_err(|err| runtime_error(&format!("creating network {name}"), err))?;
        Ok(())
    }

    async fn list_networks(&self, app_id: &str) -> Result<Vec<NetworkSummary>, RuntimeError> {
        let options = ListNetworksOptions {
            filters: label_filter(app_id),
        };
        let networks = self
            .docker
            .list_networks(Some(options))
            .await
            .map_err(|err| runtime_error(&format!("listing networks for {app_id}"), err))?;

        Ok(networks
            .into_iter()
            .filter_map(|network| {
                let name = network.name.clone();
                network.id.map(|id| NetworkSummary {
                    id,
                    name: name.unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn remove_network(&self, name_or_id: &str) -> Result<(), RuntimeError> {
        self.docker
            .remove_network(name_or_id)
            .await
            .map_err(|err| runtime_error(&format!("removing network {name_or_id}"), err))
    }

    async fn connect_network(&self, network: &str, container: &str) -> Result<(), RuntimeError> {
        let options = ConnectNetworkOptions {
            container: container.to_string(),
            endpoint_config: EndpointSettings::default(),
        };
        self.docker
            .connect_network(network, options)
            .await
            .map_err(|err| {
                runtime_error(&format!("connecting {container} to network {network}"), err)
            })
    }

    async fn disconnect_network(
        &self,
        network: &str,
        container: &str,
    ) -> Result<(), RuntimeError> {
        let options = DisconnectNetworkOptions {
            container: container.to_string(),
            force: true,
        };
        self.docker
            .disconnect_network(network, options)
            .await
            .map_err(|err| {
                runtime_error(
                    &format!("disconnecting {container} from network {network}"),
                    err,
                )
            })
    }

    async fn volume_exists(&self, name: &str) -> Result<bool, RuntimeError> {
        match self.docker.inspect_volume(name).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(err) => Err(runtime_error(&format!("inspecting volume {name}"), err)),
        }
    }

    async fn create_volume(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
    ) -> Result<(), RuntimeError> {
        let options = CreateVolumeOptions {
            name: name.to_string(),
            labels: labels.clone(),
            ..Default::default()
        };
        self.docker
            .create_volume(options)
            .await
            .map_err(|err| runtime_error(&format!("creating volume {name}"), err))?;
        Ok(())
    }

    async fn list_volumes(&self, app_id: &str) -> Result<Vec<VolumeSummary>, RuntimeError> {
        let options = ListVolumesOptions {
            filters: label_filter(app_id),
        };
        let response = self
            .docker
            .list_volumes(Some(options))
            .await
            .map_err(|err| runtime_error(&format!("listing volumes for {app_id}"), err))?;

        Ok(response
            .volumes
            .unwrap_or_default()
            .into_iter()
            .map(|volume| VolumeSummary { name: volume.name })
            .collect())
    }

    async fn remove_volume(&self, name: &str) -> Result<(), RuntimeError> {
        self.docker
            .remove_volume(name, None)
            .await
            .map_err(|err| runtime_error(&format!("removing volume {name}"), err))
    }

    async fn image_present(&self, image: &str) -> Result<bool, RuntimeError> {
        let images = self
            .docker
            .list_images(Some(ListImagesOptions::<String>::default()))
            .await
            .map_err(|err| runtime_error("listing images", err))?;

        Ok(images
            .iter()
            .any(|summary| summary.repo_tags.iter().any(|tag| tag == image)))
    }

    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError> {
        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };
        let mut progress = self.docker.create_image(Some(options), None, None);
        while let Some(step) = progress.next().await {
            step.map_err(|err| runtime_error(&format!("pulling image {image}"), err))?;
        }
        debug!("image {image} is present");
        Ok(())
    }

    async fn create_container(
        &self,
        request: CreateContainerRequest,
    ) -> Result<String, RuntimeError> {
        let mut port_bindings = PortMap::new();
        let mut exposed_ports: HashMap<String, HashMap<(), ()>> = HashMap::new();
        for binding in &request.ports {
            port_bindings.insert(
                binding.container_port.clone(),
                Some(vec![DockerPortBinding {
                    host_ip: Some("0.0.0.0".to_string()),
                    host_port: Some(binding.host_port.clone()),
                }]),
            );
            exposed_ports.insert(binding.container_port.clone(), HashMap::new());
        }

        let host_config = DockerHostConfig {
            network_mode: Some("bridge".to_string()),
            restart_policy: restart_policy_name(&request.restart_policy).map(|name| {
                RestartPolicy {
                    name: Some(name),
                    ..Default::default()
                }
            }),
            port_bindings: (!port_bindings.is_empty()).then_some(port_bindings),
            binds: (!request.binds.is_empty()).then(|| request.binds.clone()),
            extra_hosts: (!request.extra_hosts.is_empty()).then(|| request.extra_hosts.clone()),
            privileged: Some(request.privileged),
            auto_remove: Some(request.auto_remove),
            ..Default::default()
        };

        let endpoints: HashMap<String, EndpointSettings> = request
            .networks
            .iter()
            .map(|network| {
                (
                    network.clone(),
                    EndpointSettings {
                        network_id: Some(network.clone()),
                        ..Default::default()
                    },
                )
            })
            .collect();

        let config = Config {
            image: Some(request.image.clone()),
            hostname: request.hostname.clone(),
            cmd: request.cmd.clone(),
            env: (!request.env.is_empty()).then(|| request.env.clone()),
            labels: (!request.labels.is_empty()).then(|| request.labels.clone()),
            exposed_ports: (!exposed_ports.is_empty()).then_some(exposed_ports),
            host_config: Some(host_config),
            networking_config: (!endpoints.is_empty()).then(|| NetworkingConfig {
                endpoints_config: endpoints,
            }),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: request.name.clone(),
            platform: None,
        };
        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|err| runtime_error(&format!("creating container {}", request.name), err))?;
        Ok(response.id)
    }

    async fn start_container(&self, name_or_id: &str) -> Result<(), RuntimeError> {
        self.docker
            .start_container(name_or_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|err| runtime_error(&format!("starting container {name_or_id}"), err))
    }

    async fn stop_container(&self, name_or_id: &str) -> Result<(), RuntimeError> {
        self.docker
            .stop_container(name_or_id, None::<StopContainerOptions>)
            .await
            .map_err(|err| runtime_error(&format!("stopping container {name_or_id}"), err))
    }

    async fn remove_container(&self, name_or_id: &str) -> Result<(), RuntimeError> {
        let options = RemoveContainerOptions {
            v: true,
            ..Default::default()
        };
        self.docker
            .remove_container(name_or_id, Some(options))
            .await
            .map_err(|err| runtime_error(&format!("removing container {name_or_id}"), err))
    }

    async fn inspect_container_state(
        &self,
        name_or_id: &str,
    ) -> Result<ContainerState, RuntimeError> {
        let details = self
            .docker
            .inspect_container(name_or_id, None)
            .await
            .map_err(|err| runtime_error(&format!("inspecting container {name_or_id}"), err))?;
        Ok(container_state(details.state.and_then(|state| state.status)))
    }

    async fn list_containers(
        &self,
        app_id: &str,
        include_stopped: bool,
    ) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let options = ListContainersOptions {
            all: include_stopped,
            filters: label_filter(app_id),
            ..Default::default()
        };
        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|err| runtime_error(&format!("listing containers for {app_id}"), err))?;

        Ok(containers
            .into_iter()
            .map(|container| {
                let id = container.id.unwrap_or_default();
                let name = container
                    .names
                    .unwrap_or_default()
                    .first()
                    .map(|name| name.trim_start_matches('/').to_string())
                    .unwrap_or_else(|| id.clone());
                let volume_mounts = container
                    .mounts
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|mount| mount.typ == Some(MountPointTypeEnum::VOLUME))
                    .filter_map(|mount| mount.name)
                    .collect();

                ContainerSummary {
                    id,
                    name,
                    state: container
                        .state
                        .as_deref()
                        .map(ContainerState::parse)
                        .unwrap_or(ContainerState::Unknown),
                    labels: container.labels.unwrap_or_default(),
                    volume_mounts,
                }
            })
            .collect())
    }

    async fn wait_removed(&self, name_or_id: &str) -> Result<(), RuntimeError> {
        let options = WaitContainerOptions {
            condition: "removed".to_string(),
        };
        let mut wait = self.docker.wait_container(name_or_id, Some(options));
        while let Some(result) = wait.next().await {
            match result {
                Ok(_) => {}
                // The container being gone already is exactly what we are
                // waiting for.
                Err(bollard::errors::Error::DockerResponseServerError {
                    status_code: 404, ..
                }) => return Ok(()),
                Err(bollard::errors::Error::DockerContainerWaitError { error, code }) => {
                    return Err(RuntimeError::Api(format!(
                        "container {name_or_id} exited with status {code}: {error}"
                    )))
                }
                Err(err) => {
                    return Err(runtime_error(
                        &format!("waiting for container {name_or_id} removal"),
                        err,
                    ))
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn known_restart_policies_map_to_runtime_names() {
        assert_eq!(restart_policy_name(""), None);
        assert_eq!(restart_policy_name("no"), Some(RestartPolicyNameEnum::NO));
        assert_eq!(
            restart_policy_name("always"),
            Some(RestartPolicyNameEnum::ALWAYS)
        );
        assert_eq!(
            restart_policy_name("unless-stopped"),
            Some(RestartPolicyNameEnum::UNLESS_STOPPED)
        );
        assert_eq!(
            restart_policy_name("on-failure"),
            Some(RestartPolicyNameEnum::ON_FAILURE)
        );
        assert_eq!(
            restart_policy_name("bogus"),
            Some(RestartPolicyNameEnum::ALWAYS)
        );
    }

    #[test]
    fn label_filters_use_the_app_id_label() {
        let filter = label_filter("traefik.whoami");
        assert_eq!(
            filter.get("label"),
            Some(&vec!["AppID=traefik.whoami".to_string()])
        );
    }

    #[test]
    fn unknown_states_do_not_panic() {
        assert_eq!(container_state(None), ContainerState::Unknown);
        assert_eq!(
            container_state(Some(ContainerStateStatusEnum::EMPTY)),
            ContainerState::Unknown
        );
        assert_eq!(
            container_state(Some(ContainerStateStatusEnum::RUNNING)),
            ContainerState::Running
        );
    }
}
