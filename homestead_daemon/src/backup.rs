use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, info};
use thiserror::Error;
use tokio::task::block_in_place;

use crate::config::StorageConfig;
use crate::runtime::{self, CreateContainerRequest, RuntimeClient, RuntimeError};

const HELPER_IMAGE: &str = "busybox";
const FOLDER_ARCHIVE_NAME: &str = "data.tar.gz";

pub const DEFAULT_REMOVAL_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("failed archiving app data: {0}")]
    Archive(String),
    #[error("failed restoring app data: {0}")]
    Restore(String),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Produces and restores compressed archives of application state: runtime
/// volumes through an ephemeral helper container, plain data folders
/// directly on the host filesystem.
pub struct BackupEngine {
    runtime: Arc<dyn RuntimeClient + Send + Sync>,
    storage: StorageConfig,
    removal_timeout: Duration,
}

impl BackupEngine {
    pub fn new(
        runtime: Arc<dyn RuntimeClient + Send + Sync>,
        storage: StorageConfig,
        removal_timeout: Duration,
    ) -> Self {
        BackupEngine {
            runtime,
            storage,
            removal_timeout,
        }
    }

    /// Archives the named volume to `<output_dir>/<volume>.tar.gz` through
    /// an auto-removing helper container that mounts the volume read-only.
    pub async fn backup_volume(
        &self,
        volume_name: &str,
        output_dir: &Path,
    ) -> Result<(), BackupError> {
        info!("backing up volume {volume_name}");
        let request = CreateContainerRequest {
            name: format!("{volume_name}-backup"),
            image: HELPER_IMAGE.to_string(),
            cmd: Some(vec![
                "tar".to_string(),
                "-czf".to_string(),
                format!("/backup/{volume_name}.tar.gz"),
                "-C".to_string(),
                "/target".to_string(),
                ".".to_string(),
            ]),
            binds: vec![
                format!("{}:/backup", output_dir.display()),
                format!("{volume_name}:/target:ro"),
            ],
            auto_remove: true,
            ..Default::default()
        };

        let container = self.runtime.create_container(request).await?;
        self.runtime.start_container(&container).await?;
        runtime::until_removed(self.runtime.as_ref(), &container, self.removal_timeout).await?;
        Ok(())
    }

    /// Archives the app's plain data directory without containerization,
    /// for state that lives in bind-mounted folders rather than runtime
    /// volumes. Returns the archive path.
    pub async fn backup_folder(
        &self,
        app_id: &str,
        output_dir: &Path,
    ) -> Result<PathBuf, BackupError> {
        let source = self.storage.app_data_dir(app_id);
        let output_path = output_dir.join(FOLDER_ARCHIVE_NAME);
        debug!("archiving {} to {}", source.display(), output_path.display());
        block_in_place(|| archive_directory(&source, &output_path))
            .map_err(|err| BackupError::Archive(err.to_string()))?;
        Ok(output_path)
    }

    /// Backs up the app's data folder plus every runtime volume its
    /// containers mount.
    pub async fn backup_app(&self, app_id: &str, output_dir: &Path) -> Result<(), BackupError> {
        self.backup_folder(app_id, output_dir).await?;

        let containers = self.runtime.list_containers(app_id, true).await?;
        for container in &containers {
            for volume in &container.volume_mounts {
                self.backup_volume(volume, output_dir).await?;
            }
        }
        Ok(())
    }

    /// Unpacks a volume archive into the named volume through a helper
    /// container.
    pub async fn restore_volume(
        &self,
        volume_name: &str,
        archive: &Path,
    ) -> Result<(), BackupError> {
        info!("restoring volume {volume_name}");
        let request = CreateContainerRequest {
            name: format!("{volume_name}-restore"),
            image: HELPER_IMAGE.to_string(),
            cmd: Some(vec![
                "tar".to_string(),
                "-xzf".to_string(),
                "/backup/volume.tar.gz".to_string(),
                "-C".to_string(),
                "/target".to_string(),
            ]),
            binds: vec![
                format!("{}:/backup/volume.tar.gz", archive.display()),
                format!("{volume_name}:/target"),
            ],
            auto_remove: true,
            ..Default::default()
        };

        let container = self.runtime.create_container(request).await?;
        self.runtime.start_container(&container).await?;
        runtime::until_removed(self.runtime.as_ref(), &container, self.removal_timeout).await?;
        Ok(())
    }

    /// Unpacks a folder archive into the app's data directory, creating it
    /// if needed.
    pub async fn restore_folder(&self, app_id: &str, archive: &Path) -> Result<(), BackupError> {
        let target = self.storage.app_data_dir(app_id);
        tokio::fs::create_dir_all(&target)
            .await
            .map_err(|err| BackupError::Restore(err.to_string()))?;
        debug!("restoring {} into {}", archive.display(), target.display());
        block_in_place(|| unpack_archive(archive, &target))
            .map_err(|err| BackupError::Restore(err.to_string()))
    }

    /// Restores a whole app backup directory: the data folder archive plus
    /// every `<appId>-*.tar.gz` volume archive. Assumes the app's containers
    /// are already removed.
    pub async fn restore_app(&self, app_id: &str, backup_dir: &Path) -> Result<(), BackupError> {
        self.restore_folder(app_id, &backup_dir.join(FOLDER_ARCHIVE_NAME))
            .await?;

        let mut entries = tokio::fs::read_dir(backup_dir)
            .await
            .map_err(|err| BackupError::Restore(err.to_string()))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| BackupError::Restore(err.to_string()))?
        {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if let Some(volume_name) = file_name
                .strip_suffix(".tar.gz")
                .filter(|name| name.starts_with(&format!("{app_id}-")))
            {
                self.restore_volume(volume_name, &entry.path()).await?;
            }
        }
        Ok(())
    }
}

fn archive_directory(source: &Path, output: &Path) -> std::io::Result<()> {
    let file = File::create(output)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.append_dir_all(".", source)?;
    let encoder = builder.into_inner()?;
    encoder.finish()?;
    Ok(())
}

fn unpack_archive(archive: &Path, target: &Path) -> std::io::Result<()> {
    let file = File::open(archive)?;
    let decoder = GzDecoder::new(file);
    let mut unpacker = tar::Archive::new(decoder);
    unpacker.unpack(target)
}
