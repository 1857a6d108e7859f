use std::sync::Arc;
use std::time::Duration;

use anyhow::Error;
use log::{debug, error, info, warn};
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cli::Cli;
use crate::config::{HostConfig, PlatformConfig, StorageConfig};
use crate::managers::lifecycle_manager::LifecycleManager;
use crate::managers::update_manager::UpdateManager;
use crate::proxy::ProxyRegistry;
use crate::resolver;
use crate::runtime::docker::DockerRuntime;
use crate::storage::{AppStore, JsonAppStore};
use crate::store::HttpPackageResolver;

const RECORD_STORE_FILE: &str = "apps.json";

pub struct DaemonBuilder;

impl DaemonBuilder {
    pub async fn build(cli: Cli) -> anyhow::Result<Daemon, Error> {
        let host = HostConfig {
            domain: cli.domain,
            port: cli.port,
        };
        let storage = StorageConfig {
            data_path: cli.data_path,
            app_dir: cli.app_dir,
        };
        let platform = PlatformConfig {
            container_name: cli.container_name,
        };

        let runtime = Arc::new(DockerRuntime::connect(cli.docker_socket.as_deref())?);
        runtime.ping().await?;

        let store = Arc::new(
            JsonAppStore::open(storage.data_path.join(RECORD_STORE_FILE)).await?,
        );
        let proxies = Arc::new(ProxyRegistry::new(host.clone()));
        let cancel = CancellationToken::new();
        let lifecycle = Arc::new(LifecycleManager::new(
            runtime,
            store.clone(),
            proxies.clone(),
            host,
            storage,
            platform,
            cancel.clone(),
        ));
        let updates = UpdateManager::new(
            Arc::new(HttpPackageResolver::new(&cli.store_url)),
            store.clone(),
            lifecycle,
        );

        Ok(Daemon {
            store,
            proxies,
            updates,
            cancel,
            update_interval: Duration::from_secs(cli.update_interval_secs),
        })
    }
}

pub struct Daemon {
    store: Arc<JsonAppStore>,
    proxies: Arc<ProxyRegistry>,
    updates: UpdateManager,
    cancel: CancellationToken,
    update_interval: Duration,
}

impl Daemon {
    pub async fn run(self) -> anyhow::Result<(), Error> {
        info!("starting homestead daemon");
        self.restore_proxies().await?;

        let update_thread = Self::spawn_update_thread(
            self.updates,
            self.update_interval,
            self.cancel.clone(),
        );

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = sigint.recv() => info!("SIGINT received, shutting down"),
            _ = sigterm.recv() => info!("SIGTERM received, shutting down"),
        }

        self.cancel.cancel();
        update_thread.await?;
        info!("daemon stopped");
        Ok(())
    }

    /// Proxy routes only live in memory; rebuild them from the installed-app
    /// records so apps stay reachable across daemon restarts.
    async fn restore_proxies(&self) -> anyhow::Result<(), Error> {
        for record in self.store.list_records().await? {
            for spec in record.package.containers.iter().filter(|spec| spec.proxy_target) {
                let target = resolver::container_name(&record.id, &spec.name);
                if let Err(err) = self
                    .proxies
                    .add_proxy(&record.package.name, &target, &spec.proxy_port)
                    .await
                {
                    warn!("skipping proxy route for {}: {err}", record.id);
                }
            }
            debug!("restored proxy routes for {}", record.id);
        }
        Ok(())
    }

    fn spawn_update_thread(
        updates: UpdateManager,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(err) = updates.update_apps().await {
                            error!("app update check failed: {err}");
                        }
                    }
                }
            }
        })
    }
}
