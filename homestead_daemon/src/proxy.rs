use std::collections::HashMap;

use log::debug;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::config::HostConfig;

#[derive(Debug, Error, PartialEq)]
pub enum ProxyError {
    #[error("invalid proxy port '{0}'")]
    InvalidPort(String),
}

/// Forwarding target of a registered route.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyTarget {
    pub url: String,
}

/// In-memory virtual-host routing table. Read on every proxied request and
/// written by lifecycle operations, so reads are shared and writes
/// exclusive. Routes are not persisted; the daemon rebuilds them from the
/// installed-app records at startup.
pub struct ProxyRegistry {
    host: HostConfig,
    routes: RwLock<HashMap<String, ProxyTarget>>,
}

impl ProxyRegistry {
    pub fn new(host: HostConfig) -> Self {
        ProxyRegistry {
            host,
            routes: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a route forwarding `<subdomain>.<domain>` to
    /// `http://<address>:<port>`.
    pub async fn add_proxy(
        &self,
        subdomain: &str,
        address: &str,
        port: &str,
    ) -> Result<(), ProxyError> {
        port.parse::<u16>()
            .map_err(|_| ProxyError::InvalidPort(port.to_string()))?;

        let key = self.route_key(subdomain);
        let target = ProxyTarget {
            url: format!("http://{address}:{port}"),
        };
        debug!("registering proxy route {key} -> {}", target.url);
        self.routes.write().await.insert(key, target);
        Ok(())
    }

    pub async fn remove_proxy(&self, subdomain: &str) {
        let key = self.route_key(subdomain);
        debug!("removing proxy route {key}");
        self.routes.write().await.remove(&key);
    }

    /// Looks up the forwarding target for an inbound request's host header.
    /// A missing entry is a routing miss, not a failure.
    pub async fn resolve(&self, virtual_host: &str) -> Option<ProxyTarget> {
        self.routes.read().await.get(virtual_host).cloned()
    }

    fn route_key(&self, subdomain: &str) -> String {
        let host = format!("{subdomain}.{}", self.host.domain);
        // On the standard ports browsers omit the port from the host header.
        if self.host.port == 80 || self.host.port == 443 {
            host
        } else {
            format!("{host}:{}", self.host.port)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn create_registry(port: u16) -> ProxyRegistry {
        ProxyRegistry::new(HostConfig {
            domain: "example.home".to_string(),
            port,
        })
    }

    #[tokio::test]
    async fn resolves_registered_routes() {
        let registry = create_registry(1080);
        registry.add_proxy("myapp", "10.0.0.5", "8080").await.unwrap();

        let target = registry.resolve("myapp.example.home:1080").await.unwrap();
        assert_eq!(target.url, "http://10.0.0.5:8080");
    }

    #[tokio::test]
    async fn standard_ports_are_omitted_from_the_host_key() {
        let registry = create_registry(443);
        registry.add_proxy("myapp", "10.0.0.5", "8080").await.unwrap();

        assert!(registry.resolve("myapp.example.home").await.is_some());
        assert!(registry.resolve("myapp.example.home:443").await.is_none());
    }

    #[tokio::test]
    async fn removed_routes_no_longer_resolve() {
        let registry = create_registry(1080);
        registry.add_proxy("myapp", "10.0.0.5", "8080").await.unwrap();
        registry.remove_proxy("myapp").await;

        assert_eq!(registry.resolve("myapp.example.home:1080").await, None);
    }

    #[tokio::test]
    async fn unknown_hosts_miss_without_panicking() {
        let registry = create_registry(1080);
        assert_eq!(registry.resolve("unknown.example.home:1080").await, None);
    }

    #[tokio::test]
    async fn invalid_ports_are_rejected() {
        let registry = create_registry(1080);
        assert_eq!(
            registry.add_proxy("myapp", "10.0.0.5", "http").await,
            Err(ProxyError::InvalidPort("http".to_string()))
        );
        assert_eq!(registry.resolve("myapp.example.home:1080").await, None);
    }

    #[tokio::test]
    async fn later_registrations_replace_earlier_ones() {
        let registry = create_registry(1080);
        registry.add_proxy("myapp", "10.0.0.5", "8080").await.unwrap();
        registry.add_proxy("myapp", "10.0.0.6", "9090").await.unwrap();

        let target = registry.resolve("myapp.example.home:1080").await.unwrap();
        assert_eq!(target.url, "http://10.0.0.6:9090");
    }
}
