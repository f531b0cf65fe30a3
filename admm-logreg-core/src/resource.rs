use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::storage::{LocalStorageBackend, StorageBackend};
use crate::utils::AdmmError;

pub(crate) const BINCODE_CONFIG: bincode::config::Configuration = bincode::config::standard()
    .with_little_endian()
    .with_variable_int_encoding();

/// Configuration for the local filesystem storage backend.
///
/// # Example
///
/// ```rust
/// # use admm_logreg_core::resource::LocalConfig;
/// # use std::path::Path;
///
/// let config = LocalConfig::new(Path::new("/tmp/admm"), "exp1_");
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Root directory path for storing files
    pub root: String,
    /// Filename prefix for organizing files
    pub prefix: String,
}

impl LocalConfig {
    pub fn new(root: &Path, prefix: &str) -> Self {
        LocalConfig {
            root: root.to_string_lossy().into_owned(),
            prefix: prefix.to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub local: LocalConfig,
}

impl StorageConfig {
    pub fn new(local: LocalConfig) -> Self {
        StorageConfig { local }
    }
}

/// A named value persisted on disk as zstd-compressed bincode.
///
/// Two handles built with the same id and storage configuration refer to
/// the same file, so a dataset written by one process can be read by
/// another.
///
/// # Example
///
/// ```rust,no_run
/// # use admm_logreg_core::resource::{LocalConfig, ProblemResource, StorageConfig};
/// # use admm_logreg_core::state::LabeledPoint;
/// # use std::path::Path;
/// # async fn example() -> Result<(), admm_logreg_core::utils::AdmmError> {
/// let storage = StorageConfig::new(LocalConfig::new(Path::new("data"), ""));
/// let dataset: ProblemResource<Vec<LabeledPoint>> =
///     ProblemResource::new("train".to_string(), &storage);
/// dataset.write(&vec![LabeledPoint::from_slice(1.0, &[0.5])]).await?;
/// let points = dataset.read().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ProblemResource<T: Serialize + DeserializeOwned + Send + Sync + 'static> {
    id: String,
    backend: Arc<dyn StorageBackend<T>>,
}

impl<T> ProblemResource<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(id: String, storage_config: &StorageConfig) -> Self {
        ProblemResource {
            id,
            backend: Arc::new(LocalStorageBackend::new(&storage_config.local)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn write(&self, value: &T) -> Result<(), AdmmError> {
        self.backend.write(&self.id, value).await?;
        debug!("[ProblemResource] wrote {}", self.local_path().display());
        Ok(())
    }

    /// Reads the stored value. `NotFound` if it was never written.
    pub async fn read(&self) -> Result<T, AdmmError> {
        self.backend.read(&self.id).await
    }

    /// Removes the stored value. Deleting a missing value is not an error.
    pub async fn delete(&self) -> Result<(), AdmmError> {
        self.backend.delete(&self.id).await
    }

    pub fn local_path(&self) -> PathBuf {
        self.backend.file_path(&self.id)
    }
}
