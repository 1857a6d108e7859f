use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::packages::AppPackage;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no record for app '{0}'")]
    NotFound(String),
    #[error("a record for app '{0}' already exists")]
    AlreadyExists(String),
    #[error("failed reading app records: {0}")]
    Load(String),
    #[error("failed writing app records: {0}")]
    Persist(String),
}

/// Durable record of an installed application. The package snapshot mirrors
/// what is deployed on the runtime; its version must match the `AppVersion`
/// label of the app's live containers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstalledAppRecord {
    pub id: String,
    pub package: AppPackage,
    pub installed_at: DateTime<Utc>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
}

impl InstalledAppRecord {
    pub fn new(package: AppPackage) -> Self {
        InstalledAppRecord {
            id: package.id.clone(),
            package,
            installed_at: Utc::now(),
            client_id: None,
            client_secret: None,
        }
    }
}

/// Contract of the consumed persistence store, keyed by app id. Updates
/// replace the package snapshot and keep everything else.
#[async_trait]
pub trait AppStore {
    async fn create_record(&self, record: InstalledAppRecord) -> Result<(), StoreError>;
    async fn get_record(&self, app_id: &str) -> Result<InstalledAppRecord, StoreError>;
    async fn list_records(&self) -> Result<Vec<InstalledAppRecord>, StoreError>;
    async fn update_record(&self, app_id: &str, package: &AppPackage) -> Result<(), StoreError>;
    async fn delete_record(&self, app_id: &str) -> Result<(), StoreError>;
}

/// File-backed store: the full record map is loaded at open and rewritten
/// on every mutation.
pub struct JsonAppStore {
    path: PathBuf,
    records: RwLock<HashMap<String, InstalledAppRecord>>,
}

impl JsonAppStore {
    pub async fn open(path: PathBuf) -> Result<Self, StoreError> {
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|err| StoreError::Load(format!("{}: {err}", path.display())))?,
            Err(err) if err.kind() == ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(StoreError::Load(format!("{}: {err}", path.display()))),
        };

        Ok(JsonAppStore {
            path,
            records: RwLock::new(records),
        })
    }

    async fn persist(&self, records: &HashMap<String, InstalledAppRecord>) -> Result<(), StoreError> {
        let persist_error =
            |err: String| StoreError::Persist(format!("{}: {err}", self.path.display()));

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| persist_error(err.to_string()))?;
        }
        let bytes =
            serde_json::to_vec_pretty(records).map_err(|err| persist_error(err.to_string()))?;
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|err| persist_error(err.to_string()))
    }
}

#[async_trait]
impl AppStore for JsonAppStore {
    async fn create_record(&self, record: InstalledAppRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(StoreError::AlreadyExists(record.id));
        }
        records.insert(record.id.clone(), record);
        self.persist(&records).await
    }

    async fn get_record(&self, app_id: &str) -> Result<InstalledAppRecord, StoreError> {
        self.records
            .read()
            .await
            .get(app_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(app_id.to_string()))
    }

    async fn list_records(&self) -> Result<Vec<InstalledAppRecord>, StoreError> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn update_record(&self, app_id: &str, package: &AppPackage) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(app_id)
            .ok_or_else(|| StoreError::NotFound(app_id.to_string()))?;
        record.package = package.clone();
        self.persist(&records).await
    }

    async fn delete_record(&self, app_id: &str) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        records
            .remove(app_id)
            .ok_or_else(|| StoreError::NotFound(app_id.to_string()))?;
        self.persist(&records).await
    }
}
