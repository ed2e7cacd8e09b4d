//! Process-local backend. Every store opened on the same `MemoryBackend`
//! sees the others' writes, which makes it the reference for how a backend
//! should behave.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::warn;

use super::{SyncBackend, REMOTE_CHANNEL_CAPACITY};
use crate::error::SyncError;
use crate::models::PlantState;

pub struct MemoryBackend {
    docs: RwLock<HashMap<String, PlantState>>,
    changes: broadcast::Sender<(String, PlantState)>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(REMOTE_CHANNEL_CAPACITY);
        Self {
            docs: RwLock::new(HashMap::new()),
            changes,
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SyncBackend for MemoryBackend {
    async fn load(&self, doc_id: &str) -> Result<Option<PlantState>, SyncError> {
        Ok(self.docs.read().await.get(doc_id).cloned())
    }

    async fn save(&self, doc_id: &str, state: &PlantState) -> Result<(), SyncError> {
        let mut docs = self.docs.write().await;
        docs.insert(doc_id.to_string(), state.clone());
        // Sent under the lock so watchers see saves in write order. Nobody
        // listening is fine.
        let _ = self.changes.send((doc_id.to_string(), state.clone()));
        Ok(())
    }

    async fn on_remote_change(&self, doc_id: &str) -> Result<mpsc::Receiver<PlantState>, SyncError> {
        let (tx, rx) = mpsc::channel(REMOTE_CHANNEL_CAPACITY);
        let mut changes = self.changes.subscribe();
        let doc_id = doc_id.to_string();

        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok((id, state)) if id == doc_id => {
                        if tx.send(state).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(doc_id = %doc_id, skipped, "observador atrasado, se omiten cambios");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(rx)
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}
