use std::collections::HashMap;
use std::sync::Arc;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use homestead_daemon::config::{HostConfig, PlatformConfig, StorageConfig};
use homestead_daemon::managers::lifecycle_manager::LifecycleManager;
use homestead_daemon::packages::{AppPackage, ContainerSpec};
use homestead_daemon::proxy::ProxyRegistry;
use homestead_daemon::runtime::docker::DockerRuntime;
use homestead_daemon::runtime::RuntimeClient;
use homestead_daemon::storage::JsonAppStore;

pub const TEST_APP_ID: &str = "traefik.whoami";

/// Package used against a real Docker daemon. No proxy target so the tests
/// do not depend on a platform container existing.
pub fn whoami_package() -> AppPackage {
    AppPackage {
        schema_version: "v1.0".to_string(),
        app_version: "v1.5".to_string(),
        id: TEST_APP_ID.to_string(),
        name: "whoami".to_string(),
        author: "traefik".to_string(),
        description: "Tiny webserver that prints request information.".to_string(),
        containers: vec![ContainerSpec {
            name: "whoami".to_string(),
            image: "traefik/whoami:v1.10.3".to_string(),
            command: None,
            environment: HashMap::from([("test_env".to_string(), "value".to_string())]),
            ports: vec!["8000:80".to_string()],
            volumes: vec!["test_vol:/opt/bind1".to_string()],
            restart_policy: Some("no".to_string()),
            extra_hosts: vec![],
            privileged: false,
            proxy_target: false,
            proxy_port: String::new(),
        }],
    }
}

pub struct TestHarness {
    pub runtime: Arc<DockerRuntime>,
    pub manager: LifecycleManager,
    // Held so the per-test data directory outlives the harness.
    _data_dir: TempDir,
}

pub async fn create_harness() -> TestHarness {
    let runtime = Arc::new(DockerRuntime::connect(None).unwrap());
    runtime.ping().await.unwrap();

    let data_dir = tempfile::tempdir().unwrap();
    let host = HostConfig {
        domain: "example.home".to_string(),
        port: 1080,
    };
    let storage = StorageConfig {
        data_path: data_dir.path().to_path_buf(),
        app_dir: data_dir.path().to_path_buf(),
    };
    let store = Arc::new(
        JsonAppStore::open(data_dir.path().join("apps.json"))
            .await
            .unwrap(),
    );
    let proxies = Arc::new(ProxyRegistry::new(host.clone()));

    let manager = LifecycleManager::new(
        runtime.clone(),
        store,
        proxies,
        host,
        storage,
        PlatformConfig {
            container_name: "homestead".to_string(),
        },
        CancellationToken::new(),
    );

    TestHarness {
        runtime,
        manager,
        _data_dir: data_dir,
    }
}

/// Best-effort cleanup so a failed assertion does not poison later runs.
pub async fn cleanup(runtime: &DockerRuntime, app_id: &str) {
    if let Ok(containers) = runtime.list_containers(app_id, true).await {
        for container in containers {
            let _ = runtime.stop_container(&container.id).await;
            let _ = runtime.remove_container(&container.id).await;
        }
    }
    if let Ok(volumes) = runtime.list_volumes(app_id).await {
        for volume in volumes {
            let _ = runtime.remove_volume(&volume.name).await;
        }
    }
    if let Ok(networks) = runtime.list_networks(app_id).await {
        for network in networks {
            let _ = runtime.remove_network(&network.id).await;
        }
    }
}
