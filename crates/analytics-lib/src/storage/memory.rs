//! In-memory model store

use super::{estimate_state_bytes, ModelStore, StoreStats};
use crate::error::Result;
use crate::models::ModelState;
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

/// Process-local model store; nothing survives a restart
#[derive(Debug, Default)]
pub struct InMemoryModelStore {
    states: DashMap<String, ModelState>,
}

impl InMemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ModelStore for InMemoryModelStore {
    async fn save_model(&self, name: &str, state: &ModelState) -> Result<()> {
        self.states.insert(name.to_string(), state.clone());
        debug!(model = %name, "Saved model state in memory");
        Ok(())
    }

    async fn load_model(&self, name: &str) -> Result<Option<ModelState>> {
        Ok(self.states.get(name).map(|entry| entry.value().clone()))
    }

    async fn delete_model(&self, name: &str) -> Result<bool> {
        Ok(self.states.remove(name).is_some())
    }

    async fn clear_all(&self) -> Result<()> {
        self.states.clear();
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let mut models: Vec<String> = self.states.iter().map(|e| e.key().clone()).collect();
        models.sort();
        let estimated_bytes = self
            .states
            .iter()
            .map(|e| estimate_state_bytes(e.value()))
            .sum();
        Ok(StoreStats {
            model_count: models.len(),
            estimated_bytes,
            models,
        })
    }
}
