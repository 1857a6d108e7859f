use std::collections::HashMap;

use thiserror::Error;

use crate::config::{HostConfig, StorageConfig};
use crate::packages::{AppPackage, ContainerSpec};
use crate::runtime::{PortBinding, APP_ID_LABEL, APP_VERSION_LABEL};

/// Prefix selecting a bind mount under the platform launcher's working
/// directory.
pub const APP_DIR_PREFIX: &str = "!AppDir";

const DEFAULT_RESTART_POLICY: &str = "always";

#[derive(Debug, Error, PartialEq)]
pub enum ResolveError {
    #[error("invalid port specification '{0}'")]
    InvalidPortSpec(String),
    #[error("invalid volume specification '{0}'")]
    InvalidVolumeSpec(String),
}

pub fn network_name(app_id: &str) -> String {
    app_id.to_string()
}

pub fn proxy_network_name(app_id: &str) -> String {
    format!("{app_id}-proxy")
}

pub fn container_name(app_id: &str, container: &str) -> String {
    format!("{app_id}-{container}")
}

pub fn volume_name(app_id: &str, volume: &str) -> String {
    format!("{app_id}-{volume}")
}

pub fn app_labels(package: &AppPackage) -> HashMap<String, String> {
    HashMap::from([
        (APP_ID_LABEL.to_string(), package.id.clone()),
        (APP_VERSION_LABEL.to_string(), package.app_version.clone()),
    ])
}

pub fn volume_labels(app_id: &str) -> HashMap<String, String> {
    HashMap::from([(APP_ID_LABEL.to_string(), app_id.to_string())])
}

/// Flattens an environment mapping into `KEY=VALUE` entries; the order of
/// the entries is unspecified.
pub fn flatten_environment(environment: &HashMap<String, String>) -> Vec<String> {
    environment
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect()
}

pub fn split_command(command: Option<&str>) -> Option<Vec<String>> {
    let argv: Vec<String> = command?.split_whitespace().map(str::to_string).collect();
    if argv.is_empty() {
        None
    } else {
        Some(argv)
    }
}

pub fn restart_policy(spec: &ContainerSpec) -> String {
    match spec.restart_policy.as_deref() {
        Some(policy) if !policy.is_empty() => policy.to_string(),
        _ => DEFAULT_RESTART_POLICY.to_string(),
    }
}

/// The spec-provided extra hosts plus the injected host-gateway entries for
/// the platform host itself and its auth subdomain, so app containers can
/// reach host-side services by name.
pub fn extra_hosts(spec: &ContainerSpec, host: &HostConfig) -> Vec<String> {
    let mut hosts = spec.extra_hosts.clone();
    hosts.push(format!("{}:host-gateway", host.domain));
    hosts.push(format!("auth.{}:host-gateway", host.domain));
    hosts
}

/// Parses `"hostPort:containerPort[/proto]"` entries; a container port
/// without a protocol suffix defaults to tcp.
pub fn parse_ports(specs: &[String]) -> Result<Vec<PortBinding>, ResolveError> {
    specs
        .iter()
        .map(|spec| {
            let (host_port, container_port) = spec
                .split_once(':')
                .ok_or_else(|| ResolveError::InvalidPortSpec(spec.clone()))?;
            if host_port.is_empty() || container_port.is_empty() {
                return Err(ResolveError::InvalidPortSpec(spec.clone()));
            }

            let mut container_port = container_port.to_string();
            if !container_port.ends_with("/tcp") && !container_port.ends_with("/udp") {
                container_port.push_str("/tcp");
            }

            Ok(PortBinding {
                host_port: host_port.to_string(),
                container_port,
            })
        })
        .collect()
}

/// A resolved volume specification: the bind string handed to the runtime
/// and, for runtime-managed volumes, the volume that must exist beforehand.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMount {
    pub bind: String,
    pub named_volume: Option<String>,
}

/// Resolves a raw volume specification. The prefix rules apply in order:
/// `./` binds below the app's data directory, `!AppDir` binds below the
/// launcher directory, a leading `/` is a raw absolute bind, anything else
/// is an app-prefixed named volume.
pub fn resolve_volume(
    raw: &str,
    app_id: &str,
    storage: &StorageConfig,
) -> Result<ResolvedMount, ResolveError> {
    let (source, target) = raw
        .split_once(':')
        .ok_or_else(|| ResolveError::InvalidVolumeSpec(raw.to_string()))?;
    if source.is_empty() || target.is_empty() {
        return Err(ResolveError::InvalidVolumeSpec(raw.to_string()));
    }

    if let Some(path) = source.strip_prefix("./") {
        let host_path = storage.app_data_dir(app_id).join(path);
        Ok(ResolvedMount {
            bind: format!("{}:{target}", host_path.display()),
            named_volume: None,
        })
    } else if let Some(path) = source.strip_prefix(APP_DIR_PREFIX) {
        let host_path = storage.app_dir.join(path.trim_start_matches('/'));
        Ok(ResolvedMount {
            bind: format!("{}:{target}", host_path.display()),
            named_volume: None,
        })
    } else if source.starts_with('/') {
        Ok(ResolvedMount {
            bind: raw.to_string(),
            named_volume: None,
        })
    } else {
        let volume = volume_name(app_id, source);
        Ok(ResolvedMount {
            bind: format!("{volume}:{target}"),
            named_volume: Some(volume),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use std::path::PathBuf;

    fn example_storage() -> StorageConfig {
        StorageConfig {
            data_path: PathBuf::from("/data"),
            app_dir: PathBuf::from("/opt/homestead"),
        }
    }

    #[test]
    fn names_follow_the_app_id_conventions() {
        assert_eq!(network_name("myapp"), "myapp");
        assert_eq!(proxy_network_name("myapp"), "myapp-proxy");
        assert_eq!(container_name("traefik.whoami", "whoami"), "traefik.whoami-whoami");
        assert_eq!(volume_name("myapp", "cache"), "myapp-cache");
    }

    #[test]
    fn relative_mounts_bind_below_the_app_data_directory() {
        let mount = resolve_volume("./config.json:/etc/app/config.json", "myapp", &example_storage())
            .unwrap();
        assert_eq!(mount.bind, "/data/myapp/data/config.json:/etc/app/config.json");
        assert_eq!(mount.named_volume, None);
    }

    #[test]
    fn app_dir_mounts_bind_below_the_launcher_directory() {
        let mount =
            resolve_volume("!AppDir/assets:/srv/assets", "myapp", &example_storage()).unwrap();
        assert_eq!(mount.bind, "/opt/homestead/assets:/srv/assets");
        assert_eq!(mount.named_volume, None);
    }

    #[test]
    fn absolute_mounts_pass_through_unchanged() {
        let mount = resolve_volume("/etc/foo:/etc/foo:ro", "myapp", &example_storage()).unwrap();
        assert_eq!(mount.bind, "/etc/foo:/etc/foo:ro");
        assert_eq!(mount.named_volume, None);
    }

    #[test]
    fn bare_names_become_app_prefixed_volumes() {
        let mount = resolve_volume("cache:/var/cache/app", "myapp", &example_storage()).unwrap();
        assert_eq!(mount.bind, "myapp-cache:/var/cache/app");
        assert_eq!(mount.named_volume, Some("myapp-cache".to_string()));
    }

    #[test]
    fn mode_suffixes_are_preserved() {
        let mount = resolve_volume("cache:/var/cache/app:ro", "myapp", &example_storage()).unwrap();
        assert_eq!(mount.bind, "myapp-cache:/var/cache/app:ro");
    }

    #[test]
    fn malformed_volume_specs_are_rejected() {
        for raw in ["cache", ":/target", "cache:", ""] {
            assert_eq!(
                resolve_volume(raw, "myapp", &example_storage()),
                Err(ResolveError::InvalidVolumeSpec(raw.to_string()))
            );
        }
    }

    #[test]
    fn container_ports_default_to_tcp() {
        let bindings = parse_ports(&["8000:80".to_string()]).unwrap();
        assert_eq!(
            bindings,
            vec![PortBinding {
                host_port: "8000".to_string(),
                container_port: "80/tcp".to_string(),
            }]
        );
    }

    #[test]
    fn explicit_protocols_are_preserved() {
        let bindings =
            parse_ports(&["53:53/udp".to_string(), "8443:443/tcp".to_string()]).unwrap();
        assert_eq!(bindings[0].container_port, "53/udp");
        assert_eq!(bindings[1].container_port, "443/tcp");
    }

    #[test]
    fn malformed_port_specs_are_rejected() {
        for raw in ["8000", ":80", "8000:"] {
            assert_eq!(
                parse_ports(&[raw.to_string()]),
                Err(ResolveError::InvalidPortSpec(raw.to_string()))
            );
        }
    }

    #[test]
    fn environment_entries_are_key_value_pairs() {
        let environment = HashMap::from([("test_env".to_string(), "value".to_string())]);
        assert_eq!(flatten_environment(&environment), vec!["test_env=value"]);
    }

    #[test]
    fn commands_split_on_whitespace() {
        assert_eq!(
            split_command(Some("redis-server --appendonly yes")),
            Some(vec![
                "redis-server".to_string(),
                "--appendonly".to_string(),
                "yes".to_string(),
            ])
        );
        assert_eq!(split_command(Some("")), None);
        assert_eq!(split_command(None), None);
    }

    #[test]
    fn restart_policy_defaults_to_always() {
        let mut spec = ContainerSpec {
            name: "web".to_string(),
            image: "nginx:latest".to_string(),
            command: None,
            environment: HashMap::new(),
            ports: vec![],
            volumes: vec![],
            restart_policy: None,
            extra_hosts: vec![],
            privileged: false,
            proxy_target: false,
            proxy_port: String::new(),
        };
        assert_eq!(restart_policy(&spec), "always");

        spec.restart_policy = Some("unless-stopped".to_string());
        assert_eq!(restart_policy(&spec), "unless-stopped");

        spec.restart_policy = Some(String::new());
        assert_eq!(restart_policy(&spec), "always");
    }

    #[test]
    fn host_gateway_entries_are_injected() {
        let spec = ContainerSpec {
            name: "web".to_string(),
            image: "nginx:latest".to_string(),
            command: None,
            environment: HashMap::new(),
            ports: vec![],
            volumes: vec![],
            restart_policy: None,
            extra_hosts: vec!["db.internal:10.0.0.9".to_string()],
            privileged: false,
            proxy_target: false,
            proxy_port: String::new(),
        };
        let host = HostConfig {
            domain: "example.home".to_string(),
            port: 1080,
        };
        assert_eq!(
            extra_hosts(&spec, &host),
            vec![
                "db.internal:10.0.0.9",
                "example.home:host-gateway",
                "auth.example.home:host-gateway",
            ]
        );
    }
}
