//! In-memory state storage backend.

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::Result;

use super::store::StateStore;
use super::types::ProviderState;

/// State store that keeps the state in process memory.
///
/// Nothing survives the process; useful for tests and one-shot runs.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: RwLock<Option<ProviderState>>,
}

impl MemoryStateStore {
    /// Creates an empty memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a memory store seeded with a state.
    #[must_use]
    pub fn with_state(state: ProviderState) -> Self {
        Self {
            state: RwLock::new(Some(state)),
        }
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<Option<ProviderState>> {
        Ok(self.state.read().await.clone())
    }

    async fn save(&self, state: &ProviderState) -> Result<()> {
        debug!("Saving state to memory ({} resources)", state.resources.len());
        *self.state.write().await = Some(state.clone());
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        *self.state.write().await = None;
        Ok(())
    }

    async fn exists(&self) -> Result<bool> {
        Ok(self.state.read().await.is_some())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}
