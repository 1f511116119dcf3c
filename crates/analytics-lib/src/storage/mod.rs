//! Model state persistence
//!
//! This module provides:
//! - The `ModelStore` contract used by models to load and save their state
//! - An in-memory backend (the default; contents are lost on process exit)
//! - A file backend with checksum validation

mod file;
mod memory;

pub use file::{FileModelStore, FileStoreConfig};
pub use memory::InMemoryModelStore;

use crate::error::Result;
use crate::models::ModelState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Key-value persistence for serialized model state
///
/// Saves replace the stored snapshot wholesale; there is no partial update.
#[async_trait]
pub trait ModelStore: Send + Sync {
    async fn save_model(&self, name: &str, state: &ModelState) -> Result<()>;

    async fn load_model(&self, name: &str) -> Result<Option<ModelState>>;

    /// Returns whether a snapshot existed
    async fn delete_model(&self, name: &str) -> Result<bool>;

    async fn clear_all(&self) -> Result<()>;

    async fn stats(&self) -> Result<StoreStats>;
}

/// Observability summary of a model store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub model_count: usize,
    /// Weight bytes plus serialized topology size, summed over all models
    pub estimated_bytes: usize,
    pub models: Vec<String>,
}

/// Rough memory footprint of a snapshot
pub fn estimate_state_bytes(state: &ModelState) -> usize {
    let weights: usize = state.weights.iter().map(|w| w.byte_len()).sum();
    let topology = serde_json::to_vec(&state.topology)
        .map(|b| b.len())
        .unwrap_or(0);
    weights + topology
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WeightTensor;
    use serde_json::json;

    #[test]
    fn test_estimate_state_bytes() {
        let state = ModelState {
            topology: json!({"k": 1}),
            weights: vec![WeightTensor {
                name: "w".to_string(),
                shape: vec![4],
                values: vec![0.0; 4],
            }],
            last_training: None,
        };
        // 4 * 8 bytes of weights + `{"k":1}`
        assert_eq!(estimate_state_bytes(&state), 32 + 7);
    }
}
