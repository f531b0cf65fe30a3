use crate::{
    resource::{BINCODE_CONFIG, LocalConfig},
    utils::AdmmError,
};
use async_compression::tokio::bufread::ZstdDecoder;
use async_compression::tokio::bufread::ZstdEncoder;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::{
    marker::PhantomData,
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self},
    io::AsyncReadExt,
};

#[async_trait]
pub(crate) trait StorageBackend<T: Serialize + DeserializeOwned + Send + Sync>: Send + Sync {
    async fn read(&self, id: &str) -> Result<T, AdmmError>;
    async fn write(&self, id: &str, value: &T) -> Result<(), AdmmError>;
    async fn delete(&self, id: &str) -> Result<(), AdmmError>;
    fn file_path(&self, id: &str) -> PathBuf;
}

/// Storage backend for storing values on disk as zstd-compressed bincode.
pub(crate) struct LocalStorageBackend<T> {
    config: LocalConfig,
    _marker: PhantomData<T>,
}

impl<T> LocalStorageBackend<T> {
    pub fn new(config: &LocalConfig) -> Self {
        LocalStorageBackend {
            config: config.clone(),
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T> StorageBackend<T> for LocalStorageBackend<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    async fn read(&self, id: &str) -> Result<T, AdmmError> {
        let path = self.file_path(id);
        if !fs::try_exists(&path).await? {
            return Err(AdmmError::NotFound(id.to_string()));
        }
        let bytes = fs::read(path).await?;
        let mut decoder = ZstdDecoder::new(&bytes[..]);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed).await?;
        let (value, _): (T, _) = bincode::serde::decode_from_slice(&decompressed, BINCODE_CONFIG)?;
        Ok(value)
    }

    async fn write(&self, id: &str, value: &T) -> Result<(), AdmmError> {
        let path = self.file_path(id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let bytes = bincode::serde::encode_to_vec(value, BINCODE_CONFIG)?;
        let mut encoder =
            ZstdEncoder::with_quality(&bytes[..], async_compression::Level::Precise(3));
        let mut compressed = Vec::new();
        encoder.read_to_end(&mut compressed).await?;
        fs::write(path, compressed).await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), AdmmError> {
        let path = self.file_path(id);
        if fs::try_exists(&path).await? {
            fs::remove_file(path).await?;
        }
        Ok(())
    }

    fn file_path(&self, id: &str) -> PathBuf {
        Path::new(&self.config.root)
            .join(format!("{}{}", self.config.prefix, id))
            .with_extension("bin.zst")
    }
}
