use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    /// Root domain under which app subdomains are exposed
    #[arg(short, long, default_value_t = String::from("home.arpa"))]
    pub domain: String,
    /// External port of the platform's reverse proxy
    #[arg(short, long, default_value_t = 1080)]
    pub port: u16,
    /// Root directory for per-app data folders and the app record store
    #[arg(long, default_value = "/var/lib/homestead")]
    pub data_path: PathBuf,
    /// Working directory of the launcher, target of `!AppDir` mounts
    #[arg(long, default_value = "/opt/homestead")]
    pub app_dir: PathBuf,
    /// Name of the platform's own container on the runtime
    #[arg(short, long, default_value_t = String::from("homestead"))]
    pub container_name: String,
    /// Docker socket path; the environment defaults are used when unset
    #[arg(long)]
    pub docker_socket: Option<String>,
    /// Base URL of the package store
    #[arg(short, long, default_value_t = String::from("https://apps.homestead.dev"))]
    pub store_url: String,
    /// Seconds between app update checks
    #[arg(short = 'u', long, default_value_t = 6 * 60 * 60)]
    pub update_interval_secs: u64,
}
