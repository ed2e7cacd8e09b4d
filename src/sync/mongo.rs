//! MongoDB backend: one document per plant in the `documents` collection.
//!
//! Remote changes come from a change stream, which MongoDB only offers on
//! replica sets. On a standalone server `on_remote_change` fails and the
//! caller keeps working without live updates.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::TryStreamExt;
use mongodb::bson::doc;
use mongodb::change_stream::event::ChangeStreamEvent;
use mongodb::options::{ClientOptions, FullDocumentType};
use mongodb::{Client, Collection};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{SyncBackend, REMOTE_CHANNEL_CAPACITY};
use crate::error::SyncError;
use crate::models::PlantState;

const COLLECTION: &str = "documents";
const SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize, Deserialize, Debug)]
struct SyncDocument {
    #[serde(rename = "_id")]
    id: String,
    app: String,
    state: PlantState,
    #[serde(rename = "updatedAt")]
    updated_at: DateTime<Utc>,
}

pub struct MongoBackend {
    collection: Collection<SyncDocument>,
    app: String,
}

impl MongoBackend {
    /// Connects, pings the server and binds to `database`.
    pub async fn connect(uri: &str, database: &str, app: &str) -> Result<Self, SyncError> {
        let mut client_options = ClientOptions::parse(uri).await?;
        client_options.server_selection_timeout = Some(SERVER_SELECTION_TIMEOUT);
        client_options.app_name = Some(app.to_string());

        let client = Client::with_options(client_options)?;
        let db = client.database(database);
        db.run_command(doc! { "ping": 1 }).await?;
        info!(database, "conectado a MongoDB");

        Ok(Self {
            collection: db.collection::<SyncDocument>(COLLECTION),
            app: app.to_string(),
        })
    }
}

#[async_trait]
impl SyncBackend for MongoBackend {
    async fn load(&self, doc_id: &str) -> Result<Option<PlantState>, SyncError> {
        let found = self.collection.find_one(doc! { "_id": doc_id }).await?;
        Ok(found.map(|d| d.state))
    }

    async fn save(&self, doc_id: &str, state: &PlantState) -> Result<(), SyncError> {
        let document = SyncDocument {
            id: doc_id.to_string(),
            app: self.app.clone(),
            state: state.clone(),
            updated_at: Utc::now(),
        };
        let result = self
            .collection
            .replace_one(doc! { "_id": doc_id }, document)
            .upsert(true)
            .await?;
        debug!(
            doc_id,
            matched = result.matched_count,
            upserted = result.upserted_id.is_some(),
            "documento guardado en MongoDB"
        );
        Ok(())
    }

    async fn on_remote_change(&self, doc_id: &str) -> Result<mpsc::Receiver<PlantState>, SyncError> {
        let mut stream = self
            .collection
            .watch()
            .pipeline([doc! { "$match": { "documentKey._id": doc_id } }])
            .full_document(FullDocumentType::UpdateLookup)
            .await?;

        let (tx, rx) = mpsc::channel(REMOTE_CHANNEL_CAPACITY);
        let doc_id = doc_id.to_string();
        tokio::spawn(async move {
            loop {
                let event: ChangeStreamEvent<SyncDocument> = match stream.try_next().await {
                    Ok(Some(event)) => event,
                    Ok(None) => break,
                    Err(e) => {
                        warn!(doc_id = %doc_id, error = %e, "el change stream terminó con error");
                        break;
                    }
                };
                // Deletes and drops carry no document.
                let Some(document) = event.full_document else {
                    continue;
                };
                if tx.send(document.state).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }

    fn kind(&self) -> &'static str {
        "mongo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_document_layout() {
        let document = SyncDocument {
            id: "plant-watering-tracker".into(),
            app: "PlantWateringTracker".into(),
            state: PlantState {
                waterers: vec!["Sam".into()],
                ..Default::default()
            },
            updated_at: Utc::now(),
        };
        let bson = mongodb::bson::to_document(&document).unwrap();
        assert_eq!(bson.get_str("_id").unwrap(), "plant-watering-tracker");
        assert!(bson.contains_key("updatedAt"));
        let state = bson.get_document("state").unwrap();
        assert!(state.contains_key("wateringHistory"));
        assert_eq!(state.get_array("waterers").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn bad_uri_is_reported() {
        let result = MongoBackend::connect("not-a-mongo-uri", "arbolitos", "test").await;
        assert!(matches!(result, Err(SyncError::Mongo(_))));
    }
}
