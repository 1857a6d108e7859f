use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Declarative descriptor of an installable application. Produced by the
/// package store and treated as read-only by the platform; `id` is the join
/// key across runtime labels, persistence records and proxy routes and must
/// never change once installed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppPackage {
    #[serde(rename = "schema")]
    pub schema_version: String,
    #[serde(rename = "version")]
    pub app_version: String,
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub containers: Vec<ContainerSpec>,
}

/// One container of an application bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub environment: HashMap<String, String>,
    /// Entries of the form `"hostPort:containerPort[/proto]"`.
    #[serde(default)]
    pub ports: Vec<String>,
    /// Raw mount strings, resolved by the volume resolver before use.
    #[serde(default)]
    pub volumes: Vec<String>,
    #[serde(default, rename = "restart")]
    pub restart_policy: Option<String>,
    #[serde(default)]
    pub extra_hosts: Vec<String>,
    #[serde(default)]
    pub privileged: bool,
    #[serde(default)]
    pub proxy_target: bool,
    #[serde(default)]
    pub proxy_port: String,
}

/// Catalogue listing of an available package, without its container specs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogueEntry {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn deserializes_package_schema() {
        let schema = r#"{
            "schema": "v1.0",
            "version": "v1.5",
            "id": "traefik.whoami",
            "name": "whoami",
            "author": "traefik",
            "description": "Tiny webserver that prints request information.",
            "containers": [
                {
                    "name": "whoami",
                    "image": "traefik/whoami:v1.10.3",
                    "ports": ["8000:80"],
                    "environment": {"test_env": "value"},
                    "volumes": ["test_vol:/opt/bind1"],
                    "proxy_target": true,
                    "proxy_port": "80"
                }
            ]
        }"#;

        let package: AppPackage = serde_json::from_str(schema).unwrap();
        assert_eq!(package.id, "traefik.whoami");
        assert_eq!(package.app_version, "v1.5");
        assert_eq!(package.containers.len(), 1);

        let container = &package.containers[0];
        assert_eq!(container.image, "traefik/whoami:v1.10.3");
        assert_eq!(container.ports, vec!["8000:80"]);
        assert!(container.proxy_target);
        assert_eq!(container.proxy_port, "80");
        assert_eq!(container.restart_policy, None);
        assert!(!container.privileged);
    }

    #[test]
    fn round_trips_through_json() {
        let package = AppPackage {
            schema_version: "v1.0".to_string(),
            app_version: "v2.1".to_string(),
            id: "example.app".to_string(),
            name: "example".to_string(),
            author: "someone".to_string(),
            description: String::new(),
            containers: vec![],
        };

        let encoded = serde_json::to_string(&package).unwrap();
        let decoded: AppPackage = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, package);
    }
}
