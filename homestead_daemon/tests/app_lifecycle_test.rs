//! Lifecycle tests against a real Docker daemon; run with
//! `cargo test -- --ignored` on a host with Docker available.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use homestead_daemon::managers::lifecycle::AppLifecycle;
use homestead_daemon::runtime::{self, ContainerState, RuntimeClient};

mod common;

use common::TEST_APP_ID;

#[tokio::test]
#[ignore]
async fn install_and_uninstall_round_trip() {
    let harness = common::create_harness().await;
    let package = common::whoami_package();

    let result = harness.manager.install(&package).await;
    if result.is_err() {
        common::cleanup(&harness.runtime, TEST_APP_ID).await;
    }
    result.unwrap();

    let containers = harness
        .runtime
        .list_containers(TEST_APP_ID, true)
        .await
        .unwrap();
    assert_eq!(containers.len(), 1);
    assert_eq!(containers[0].name, "traefik.whoami-whoami");
    // Install creates containers; starting is a separate transition.
    assert_eq!(containers[0].state, ContainerState::Created);

    let networks = harness
        .runtime
        .list_networks(TEST_APP_ID)
        .await
        .unwrap();
    assert_eq!(networks.len(), 1);
    assert_eq!(networks[0].name, TEST_APP_ID);

    let volumes = harness.runtime.list_volumes(TEST_APP_ID).await.unwrap();
    assert_eq!(volumes.len(), 1);
    assert_eq!(volumes[0].name, "traefik.whoami-test_vol");

    harness.manager.uninstall(TEST_APP_ID).await.unwrap();

    assert!(harness
        .runtime
        .list_containers(TEST_APP_ID, true)
        .await
        .unwrap()
        .is_empty());
    assert!(harness
        .runtime
        .list_networks(TEST_APP_ID)
        .await
        .unwrap()
        .is_empty());
    assert!(harness
        .runtime
        .list_volumes(TEST_APP_ID)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
#[ignore]
async fn start_and_stop_transition_all_containers() {
    let harness = common::create_harness().await;
    let package = common::whoami_package();

    harness.manager.install(&package).await.unwrap();

    harness.manager.start(TEST_APP_ID).await.unwrap();
    let containers = harness
        .runtime
        .list_containers(TEST_APP_ID, true)
        .await
        .unwrap();
    for container in &containers {
        runtime::until_state(
            harness.runtime.as_ref(),
            &container.id,
            ContainerState::Running,
            Duration::from_secs(10),
            Duration::from_millis(100),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    }
    assert!(harness.manager.is_running(TEST_APP_ID).await.unwrap());

    harness.manager.stop(TEST_APP_ID).await.unwrap();
    for container in &containers {
        runtime::until_state(
            harness.runtime.as_ref(),
            &container.id,
            ContainerState::Exited,
            Duration::from_secs(10),
            Duration::from_millis(100),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    }
    assert!(!harness.manager.is_running(TEST_APP_ID).await.unwrap());

    let status = harness.manager.status(TEST_APP_ID).await.unwrap();
    assert_eq!(status.version, "v1.5");
    assert!(!status.running);

    harness.manager.uninstall(TEST_APP_ID).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn installing_twice_reuses_the_network() {
    let harness = common::create_harness().await;
    let package = common::whoami_package();

    harness.manager.install(&package).await.unwrap();
    let networks = harness.runtime.list_networks(TEST_APP_ID).await.unwrap();
    assert_eq!(networks.len(), 1);
    let network_id = networks[0].id.clone();

    // Reinstalling after removing the containers keeps the same network.
    harness.manager.remove_containers(TEST_APP_ID).await.unwrap();
    harness.manager.install(&package).await.unwrap();

    let networks = harness.runtime.list_networks(TEST_APP_ID).await.unwrap();
    assert_eq!(networks.len(), 1);
    assert_eq!(networks[0].id, network_id);

    harness.manager.uninstall(TEST_APP_ID).await.unwrap();
}
