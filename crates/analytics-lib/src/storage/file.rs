//! File-backed model store
//!
//! One JSON document per model plus a SHA256 sidecar. Writes go to a
//! uniquely named temp file that is synced and renamed into place, so readers
//! never observe a half-written snapshot. Operations on the same model name
//! are serialized so a snapshot and its sidecar always come from one save.

use super::{estimate_state_bytes, ModelStore, StoreStats};
use crate::error::{AnalyticsError, Result};
use crate::models::ModelState;
use async_trait::async_trait;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;
use tracing::{debug, info, warn};

const STATE_EXT: &str = "json";
const CHECKSUM_EXT: &str = "sha256";

/// Configuration for the file model store
#[derive(Debug, Clone)]
pub struct FileStoreConfig {
    /// Directory holding model snapshots
    pub model_dir: PathBuf,
    /// Maximum snapshot size in bytes
    pub max_state_size: usize,
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("/var/lib/analytics/models"),
            max_state_size: 1024 * 1024, // 1MB
        }
    }
}

/// Model store writing snapshots to a directory
#[derive(Debug, Clone)]
pub struct FileModelStore {
    config: FileStoreConfig,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl FileModelStore {
    /// Create the store, creating the model directory if needed
    pub async fn new(config: FileStoreConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&config.model_dir).await.map_err(|e| {
            AnalyticsError::Persistence(format!(
                "failed to create model directory {}: {}",
                config.model_dir.display(),
                e
            ))
        })?;
        Ok(Self {
            config,
            locks: Arc::new(DashMap::new()),
        })
    }

    /// Exclusive access to one model's files
    async fn lock(&self, name: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(file_stem(name))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    pub fn model_dir(&self) -> &Path {
        &self.config.model_dir
    }

    fn state_path(&self, name: &str) -> PathBuf {
        self.config
            .model_dir
            .join(format!("{}.{}", file_stem(name), STATE_EXT))
    }

    fn checksum_path(&self, name: &str) -> PathBuf {
        self.config
            .model_dir
            .join(format!("{}.{}", file_stem(name), CHECKSUM_EXT))
    }

    async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
        let mut temp_name = path.as_os_str().to_os_string();
        temp_name.push(format!(".{}.tmp", Uuid::new_v4()));
        let temp_path = PathBuf::from(temp_name);

        let written = Self::write_and_rename(&temp_path, path, bytes).await;
        if written.is_err() {
            let _ = tokio::fs::remove_file(&temp_path).await;
        }
        written
    }

    async fn write_and_rename(temp_path: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
        let mut file = tokio::fs::File::create(temp_path).await.map_err(|e| {
            AnalyticsError::Persistence(format!("failed to create {}: {}", temp_path.display(), e))
        })?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(temp_path, path).await.map_err(|e| {
            AnalyticsError::Persistence(format!(
                "failed to rename {} to {}: {}",
                temp_path.display(),
                path.display(),
                e
            ))
        })
    }

    async fn snapshot_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.config.model_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(STATE_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[async_trait]
impl ModelStore for FileModelStore {
    async fn save_model(&self, name: &str, state: &ModelState) -> Result<()> {
        let bytes = serde_json::to_vec(state)?;
        if bytes.len() > self.config.max_state_size {
            return Err(AnalyticsError::Persistence(format!(
                "model state size {} exceeds maximum {}",
                bytes.len(),
                self.config.max_state_size
            )));
        }

        let checksum = compute_checksum(&bytes);
        let _guard = self.lock(name).await;
        Self::write_atomic(&self.state_path(name), &bytes).await?;
        Self::write_atomic(&self.checksum_path(name), checksum.as_bytes()).await?;

        info!(
            model = %name,
            size = bytes.len(),
            checksum = %checksum,
            "Model state saved"
        );
        Ok(())
    }

    async fn load_model(&self, name: &str) -> Result<Option<ModelState>> {
        let _guard = self.lock(name).await;
        let path = self.state_path(name);
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let expected = tokio::fs::read_to_string(self.checksum_path(name))
            .await
            .map_err(|e| AnalyticsError::Persistence(format!("missing checksum for '{}': {}", name, e)))?;
        let computed = compute_checksum(&bytes);
        if computed != expected.trim() {
            warn!(model = %name, "Model state checksum mismatch");
            return Err(AnalyticsError::Persistence(format!(
                "checksum mismatch for '{}': expected {}, got {}",
                name,
                expected.trim(),
                computed
            )));
        }

        let state = serde_json::from_slice(&bytes)?;
        debug!(model = %name, path = %path.display(), "Loaded model state from disk");
        Ok(Some(state))
    }

    async fn delete_model(&self, name: &str) -> Result<bool> {
        let _guard = self.lock(name).await;
        let existed = match tokio::fs::remove_file(self.state_path(name)).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };
        if let Err(e) = tokio::fs::remove_file(self.checksum_path(name)).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(model = %name, error = %e, "Failed to remove checksum file");
            }
        }
        Ok(existed)
    }

    async fn clear_all(&self) -> Result<()> {
        for name in self.snapshot_names().await? {
            self.delete_model(&name).await?;
        }
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let models = self.snapshot_names().await?;
        let mut estimated_bytes = 0;
        for name in &models {
            match self.load_model(name).await {
                Ok(Some(state)) => estimated_bytes += estimate_state_bytes(&state),
                Ok(None) => {}
                Err(e) => warn!(model = %name, error = %e, "Skipping unreadable snapshot in stats"),
            }
        }
        Ok(StoreStats {
            model_count: models.len(),
            estimated_bytes,
            models,
        })
    }
}

/// Compute SHA256 checksum of data
fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Map a model name onto a safe file stem
fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WeightTensor;
    use serde_json::json;
    use tempfile::TempDir;

    fn state() -> ModelState {
        ModelState {
            topology: json!({"kind": "dense", "inputs": 2}),
            weights: vec![WeightTensor {
                name: "dense/kernel".to_string(),
                shape: vec![2, 1],
                values: vec![0.5, -0.25],
            }],
            last_training: Some(chrono::Utc::now()),
        }
    }

    async fn store(dir: &TempDir) -> FileModelStore {
        FileModelStore::new(FileStoreConfig {
            model_dir: dir.path().to_path_buf(),
            ..Default::default()
        })
        .await
        .unwrap()
    }

    #[test]
    fn test_compute_checksum() {
        let checksum = compute_checksum(b"test model weights");
        assert_eq!(checksum.len(), 64); // SHA256 hex is 64 chars
        assert_eq!(checksum, compute_checksum(b"test model weights"));
    }

    #[test]
    fn test_file_stem_sanitizes() {
        assert_eq!(file_stem("Sales Predictor/v1"), "Sales_Predictor_v1");
        assert_eq!(file_stem("sales-v2_a"), "sales-v2_a");
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        store.save_model("sales", &state()).await.unwrap();
        let loaded = store.load_model("sales").await.unwrap().unwrap();
        assert_eq!(loaded, state_with_time(&loaded));
        assert!(dir.path().join("sales.sha256").exists());
        assert!(temp_files(&dir).is_empty());
    }

    fn temp_files(dir: &TempDir) -> Vec<PathBuf> {
        std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("tmp"))
            .collect()
    }

    fn state_with_bias(bias: f64) -> ModelState {
        let mut state = state();
        state.weights.push(WeightTensor {
            name: "dense/bias".to_string(),
            shape: vec![1],
            values: vec![bias],
        });
        state
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_saves_keep_snapshot_and_checksum_paired() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        let first = state_with_bias(1.0);
        let second = state_with_bias(2.0);

        for _ in 0..50 {
            let (a, b) = (store.clone(), store.clone());
            let (s1, s2) = (first.clone(), second.clone());
            let left = tokio::spawn(async move { a.save_model("sales", &s1).await });
            let right = tokio::spawn(async move { b.save_model("sales", &s2).await });
            left.await.unwrap().unwrap();
            right.await.unwrap().unwrap();

            let loaded = store.load_model("sales").await.unwrap().unwrap();
            assert!(loaded == first || loaded == second);
        }
        assert!(temp_files(&dir).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_load_during_save_never_sees_mismatch() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        store.save_model("sales", &state_with_bias(0.0)).await.unwrap();

        let writer = store.clone();
        let saves = tokio::spawn(async move {
            for i in 0..50 {
                writer.save_model("sales", &state_with_bias(i as f64)).await.unwrap();
            }
        });
        for _ in 0..50 {
            assert!(store.load_model("sales").await.unwrap().is_some());
        }
        saves.await.unwrap();
    }

    fn state_with_time(loaded: &ModelState) -> ModelState {
        ModelState {
            last_training: loaded.last_training,
            ..state()
        }
    }

    #[tokio::test]
    async fn test_load_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        assert!(store.load_model("absent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tampered_state_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        store.save_model("sales", &state()).await.unwrap();

        let path = dir.path().join("sales.json");
        let mut content = std::fs::read_to_string(&path).unwrap();
        content = content.replace("0.5", "0.75");
        std::fs::write(&path, content).unwrap();

        let err = store.load_model("sales").await.unwrap_err();
        assert_eq!(err.kind(), "persistence_error");
    }

    #[tokio::test]
    async fn test_oversized_state_rejected() {
        let dir = TempDir::new().unwrap();
        let store = FileModelStore::new(FileStoreConfig {
            model_dir: dir.path().to_path_buf(),
            max_state_size: 16,
        })
        .await
        .unwrap();
        assert!(store.save_model("sales", &state()).await.is_err());
    }

    #[tokio::test]
    async fn test_clear_all_and_stats() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        store.save_model("a", &state()).await.unwrap();
        store.save_model("b", &state()).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.model_count, 2);
        assert!(stats.estimated_bytes >= 2 * 16);

        assert!(store.delete_model("a").await.unwrap());
        store.clear_all().await.unwrap();
        assert_eq!(store.stats().await.unwrap().model_count, 0);
    }
}
