//! Document sync collaborator.
//!
//! The store never knows where its document lives. It talks to a
//! [`SyncEngine`], which wraps one [`SyncBackend`] and reports every save
//! through the log the same way regardless of backend.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::error::SyncError;
use crate::models::PlantState;

pub mod file;
pub mod memory;
pub mod mongo;

/// Buffer used by backends for their remote-change channels.
pub(crate) const REMOTE_CHANNEL_CAPACITY: usize = 32;

/// Storage and replication for plant documents.
#[async_trait]
pub trait SyncBackend: Send + Sync {
    /// Fetch the document, `None` if nobody has written it yet.
    async fn load(&self, doc_id: &str) -> Result<Option<PlantState>, SyncError>;

    async fn save(&self, doc_id: &str, state: &PlantState) -> Result<(), SyncError>;

    /// Stream of states written to `doc_id` by anyone, this process included.
    /// The stream ends when the backend stops watching.
    async fn on_remote_change(&self, doc_id: &str) -> Result<mpsc::Receiver<PlantState>, SyncError>;

    /// Short label for logs.
    fn kind(&self) -> &'static str;
}

/// Where and as whom we sync.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub url: String,
    pub name: String,
}

/// The configured sync collaborator. Cheap to clone.
#[derive(Clone)]
pub struct SyncEngine {
    backend: Arc<dyn SyncBackend>,
    config: SyncConfig,
}

impl SyncEngine {
    pub fn configure(backend: Arc<dyn SyncBackend>, config: SyncConfig) -> Self {
        info!(
            backend = backend.kind(),
            url = %config.url,
            app = %config.name,
            "motor de sincronización configurado"
        );
        Self { backend, config }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub async fn load(&self, doc_id: &str) -> Result<Option<PlantState>, SyncError> {
        match self.backend.load(doc_id).await {
            Ok(state) => {
                debug!(doc_id, found = state.is_some(), "documento cargado");
                Ok(state)
            }
            Err(e) => {
                error!(doc_id, error = %e, "sync error");
                Err(e)
            }
        }
    }

    pub async fn save(&self, doc_id: &str, state: &PlantState) -> Result<(), SyncError> {
        match self.backend.save(doc_id, state).await {
            Ok(()) => {
                info!(doc_id, "document {doc_id} synced");
                Ok(())
            }
            Err(e) => {
                error!(doc_id, error = %e, "sync error");
                Err(e)
            }
        }
    }

    pub async fn on_remote_change(&self, doc_id: &str) -> Result<mpsc::Receiver<PlantState>, SyncError> {
        self.backend.on_remote_change(doc_id).await.inspect_err(|e| {
            error!(doc_id, error = %e, "no se pudo observar el documento");
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[tokio::test]
    async fn save_errors_are_returned_to_the_caller() {
        let backend = Arc::new(FlakyBackend::new());
        let engine = engine_for(backend.clone());
        backend.set_failing(true);

        let result = engine.save("doc", &PlantState::default()).await;
        assert!(matches!(result, Err(SyncError::Closed)));
        assert!(engine.load("doc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn saved_document_loads_back() {
        let backend = Arc::new(FlakyBackend::new());
        let engine = engine_for(backend);
        let state = PlantState {
            waterers: vec!["Sam".into()],
            ..Default::default()
        };

        engine.save("doc", &state).await.unwrap();
        assert_eq!(engine.load("doc").await.unwrap(), Some(state));
        assert_eq!(engine.name(), "PlantWateringTracker");
    }
}
