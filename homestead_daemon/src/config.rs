use std::path::PathBuf;

/// External address under which the platform and its app subdomains are
/// reachable.
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub domain: String,
    pub port: u16,
}

/// Host filesystem layout for application data.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root under which every app gets `<data_path>/<appId>/data`.
    pub data_path: PathBuf,
    /// Working directory of the platform launcher, target of `!AppDir`
    /// volume mounts.
    pub app_dir: PathBuf,
}

impl StorageConfig {
    pub fn app_data_dir(&self, app_id: &str) -> PathBuf {
        self.data_path.join(app_id).join("data")
    }
}

/// Identity of the platform's own container on the runtime, connected to
/// every app proxy network so it can reach proxy-target containers by name.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    pub container_name: String,
}
