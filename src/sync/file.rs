//! JSON files in a directory, one per document. Useful on a shared folder
//! (Syncthing, NFS) when there is no MongoDB around.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::{SyncBackend, REMOTE_CHANNEL_CAPACITY};
use crate::error::SyncError;
use crate::models::PlantState;

pub struct FileBackend {
    dir: PathBuf,
    poll_interval: Duration,
}

impl FileBackend {
    /// Creates `dir` if needed.
    pub async fn open(dir: impl Into<PathBuf>, poll_interval: Duration) -> Result<Self, SyncError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir, poll_interval })
    }

    fn path_for(&self, doc_id: &str) -> PathBuf {
        document_path(&self.dir, doc_id)
    }
}

fn document_path(dir: &Path, doc_id: &str) -> PathBuf {
    let file_name: String = doc_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    dir.join(format!("{file_name}.json"))
}

async fn read_document(path: &Path) -> Result<Option<PlantState>, SyncError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn modified_at(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}

#[async_trait]
impl SyncBackend for FileBackend {
    async fn load(&self, doc_id: &str) -> Result<Option<PlantState>, SyncError> {
        read_document(&self.path_for(doc_id)).await
    }

    async fn save(&self, doc_id: &str, state: &PlantState) -> Result<(), SyncError> {
        let path = self.path_for(doc_id);
        let bytes = serde_json::to_vec_pretty(state)?;
        let dir = self.dir.clone();
        let target = path.clone();
        // Each write gets its own temp file so processes sharing the
        // directory never clobber each other before the rename.
        tokio::task::spawn_blocking(move || -> Result<(), SyncError> {
            let mut tmp = NamedTempFile::new_in(&dir)?;
            tmp.write_all(&bytes)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&target).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| SyncError::Io(std::io::Error::other(e)))??;
        debug!(path = %path.display(), "documento escrito");
        Ok(())
    }

    async fn on_remote_change(&self, doc_id: &str) -> Result<mpsc::Receiver<PlantState>, SyncError> {
        let (tx, rx) = mpsc::channel(REMOTE_CHANNEL_CAPACITY);
        let path = self.path_for(doc_id);
        let mut last_seen = modified_at(&path).await;
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tokio::spawn(async move {
            loop {
                ticker.tick().await;
                let modified = modified_at(&path).await;
                if modified.is_none() || modified == last_seen {
                    continue;
                }
                last_seen = modified;
                match read_document(&path).await {
                    Ok(Some(state)) => {
                        if tx.send(state).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!(path = %path.display(), error = %e, "no se pudo leer el documento"),
                }
            }
        });

        Ok(rx)
    }

    fn kind(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WateringEvent;

    fn watered_by(person: &str, timestamp: i64) -> PlantState {
        PlantState {
            last_watering: Some(timestamp),
            watering_history: vec![WateringEvent {
                timestamp,
                person: person.into(),
            }],
            waterers: vec![person.into()],
            ..Default::default()
        }
    }

    #[test]
    fn doc_ids_cannot_escape_the_directory() {
        let path = document_path(Path::new("/data"), "../etc/passwd");
        assert_eq!(path, PathBuf::from("/data/___etc_passwd.json"));
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path(), Duration::from_millis(20)).await.unwrap();

        assert!(backend.load("planta").await.unwrap().is_none());
        let state = watered_by("Ana", 10);
        backend.save("planta", &state).await.unwrap();
        assert_eq!(backend.load("planta").await.unwrap(), Some(state));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn writers_sharing_a_directory_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let mut writes = Vec::new();
        for i in 0..16 {
            let backend = FileBackend::open(dir.path(), Duration::from_millis(20)).await.unwrap();
            writes.push(tokio::spawn(async move {
                backend.save("planta", &watered_by("Ana", i)).await
            }));
        }
        for write in writes {
            write.await.unwrap().unwrap();
        }

        let backend = FileBackend::open(dir.path(), Duration::from_millis(20)).await.unwrap();
        let state = backend.load("planta").await.unwrap().unwrap();
        assert_eq!(state.waterers, vec!["Ana"]);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn corrupt_file_is_a_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path(), Duration::from_millis(20)).await.unwrap();
        tokio::fs::write(dir.path().join("planta.json"), b"{ no es json").await.unwrap();

        assert!(matches!(backend.load("planta").await, Err(SyncError::Json(_))));
    }

    #[tokio::test]
    async fn external_writes_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = FileBackend::open(dir.path(), Duration::from_millis(20)).await.unwrap();
        let writer = FileBackend::open(dir.path(), Duration::from_millis(20)).await.unwrap();
        let mut rx = watcher.on_remote_change("planta").await.unwrap();

        let state = watered_by("Luis", 99);
        writer.save("planta", &state).await.unwrap();

        let received = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no llegó el cambio")
            .expect("canal cerrado");
        assert_eq!(received, state);
    }
}
