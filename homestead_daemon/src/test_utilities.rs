use std::collections::HashMap;

use async_trait::async_trait;
use mockall::mock;

use crate::managers::lifecycle::{AppLifecycle, AppStatus, LifecycleError};
use crate::packages::{AppPackage, CatalogueEntry, ContainerSpec};
use crate::runtime::{
    ContainerState, ContainerSummary, CreateContainerRequest, NetworkDetails, NetworkSummary,
    RuntimeClient, RuntimeError, VolumeSummary,
};
use crate::storage::{AppStore, InstalledAppRecord, StoreError};
use crate::store::{PackageResolver, PackageStoreError};

pub fn create_example_container_spec() -> ContainerSpec {
    ContainerSpec {
        name: "whoami".to_string(),
        image: "traefik/whoami:v1.10.3".to_string(),
        command: None,
        environment: HashMap::from([("test_env".to_string(), "value".to_string())]),
        ports: vec!["8000:80".to_string()],
        volumes: vec![
            "config:/etc/whoami".to_string(),
            "./settings.json:/etc/whoami/settings.json".to_string(),
        ],
        restart_policy: None,
        extra_hosts: vec![],
        privileged: false,
        proxy_target: true,
        proxy_port: "80".to_string(),
    }
}

pub fn create_example_package() -> AppPackage {
    AppPackage {
        schema_version: "v1.0".to_string(),
        app_version: "v1.5".to_string(),
        id: "traefik.whoami".to_string(),
        name: "whoami".to_string(),
        author: "traefik".to_string(),
        description: "Tiny webserver that prints request information.".to_string(),
        containers: vec![create_example_container_spec()],
    }
}

pub fn create_example_record() -> InstalledAppRecord {
    InstalledAppRecord::new(create_example_package())
}

pub fn create_example_catalogue_entry(version: &str) -> CatalogueEntry {
    CatalogueEntry {
        id: "traefik.whoami".to_string(),
        name: "whoami".to_string(),
        version: version.to_string(),
        author: "traefik".to_string(),
        description: String::new(),
    }
}

pub fn create_container_summary(
    app_id: &str,
    container: &str,
    version: &str,
    state: ContainerState,
) -> ContainerSummary {
    ContainerSummary {
        id: format!("{app_id}-{container}-id"),
        name: format!("{app_id}-{container}"),
        state,
        labels: HashMap::from([
            (crate::runtime::APP_ID_LABEL.to_string(), app_id.to_string()),
            (
                crate::runtime::APP_VERSION_LABEL.to_string(),
                version.to_string(),
            ),
        ]),
        volume_mounts: vec![],
    }
}

mock! {
    pub RuntimeClient {}

    #[async_trait]
    impl RuntimeClient for RuntimeClient {
        async fn inspect_network(&self, name_or_id: &str) -> Result<NetworkDetails, RuntimeError>;
        async fn create_network(
            &self,
            name: &str,
            labels: &HashMap<String, String>,
        ) -> Result<(), RuntimeError>;
        async fn list_networks(&self, app_id: &str) -> Result<Vec<NetworkSummary>, RuntimeError>;
        async fn remove_network(&self, name_or_id: &str) -> Result<(), RuntimeError>;
        async fn connect_network(&self, network: &str, container: &str) -> Result<(), RuntimeError>;
        async fn disconnect_network(&self, network: &str, container: &str) -> Result<(), RuntimeError>;
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
        async fn wait_removed(&self, name_or_id: &str) -> Result<(), RuntimeError>;
    }
}

mock! {
    pub AppStore {}

    #[async_trait]
    impl AppStore for AppStore {
        async fn create_record(&self, record: InstalledAppRecord) -> Result<(), StoreError>;
        async fn get_record(&self, app_id: &str) -> Result<InstalledAppRecord, StoreError>;
        async fn list_records(&self) -> Result<Vec<InstalledAppRecord>, StoreError>;
        async fn update_record(&self, app_id: &str, package: &AppPackage) -> Result<(), StoreError>;
        async fn delete_record(&self, app_id: &str) -> Result<(), StoreError>;
    }
}

mock! {
    pub PackageResolver {}

    #[async_trait]
    impl PackageResolver for PackageResolver {
        async fn catalogue(&self) -> Result<Vec<CatalogueEntry>, PackageStoreError>;
        async fn get_package(&self, package_id: &str) -> Result<AppPackage, PackageStoreError>;
    }
}

mock! {
    pub AppLifecycle {}

    #[async_trait]
    impl AppLifecycle for AppLifecycle {
        async fn install(&self, package: &AppPackage) -> Result<(), LifecycleError>;
        async fn start(&self, app_id: &str) -> Result<(), LifecycleError>;
        async fn stop(&self, app_id: &str) -> Result<(), LifecycleError>;
        async fn remove_containers(&self, app_id: &str) -> Result<(), LifecycleError>;
        async fn uninstall(&self, app_id: &str) -> Result<(), LifecycleError>;
        async fn is_installed(&self, app_id: &str) -> Result<bool, LifecycleError>;
        async fn is_running(&self, app_id: &str) -> Result<bool, LifecycleError>;
        async fn app_version(&self, app_id: &str) -> Result<String, LifecycleError>;
        async fn status(&self, app_id: &str) -> Result<AppStatus, LifecycleError>;
    }
}
