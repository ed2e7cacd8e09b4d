//! The plant store: single source of truth for one synced plant document.
//!
//! Every mutation runs as one transition: copy the current state, apply the
//! change, persist it through the sync engine, and only then publish it.
//! A failed save leaves the published state untouched. Mutations are
//! serialized by a mutex so two transitions never interleave.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{Result, StoreError};
use crate::models::{PlantState, Staleness, WateringEvent};
use crate::sync::SyncEngine;

/// Source of "now" in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

#[derive(Clone)]
pub struct PlantStore {
    inner: Arc<Inner>,
}

struct Inner {
    engine: SyncEngine,
    doc_id: String,
    clock: Arc<dyn Clock>,
    writer: Mutex<()>,
    state: watch::Sender<PlantState>,
}

impl PlantStore {
    /// Loads `doc_id` through `engine`; a document nobody wrote yet starts empty.
    pub async fn open(engine: SyncEngine, doc_id: &str, clock: Arc<dyn Clock>) -> Result<Self> {
        let initial = engine.load(doc_id).await?.unwrap_or_default();
        info!(
            doc_id,
            app = engine.name(),
            events = initial.watering_history.len(),
            waterers = initial.waterers.len(),
            "planta cargada"
        );
        let (state, _) = watch::channel(initial);
        Ok(Self {
            inner: Arc::new(Inner {
                engine,
                doc_id: doc_id.to_string(),
                clock,
                writer: Mutex::new(()),
                state,
            }),
        })
    }

    pub fn doc_id(&self) -> &str {
        &self.inner.doc_id
    }

    pub fn snapshot(&self) -> PlantState {
        self.inner.state.borrow().clone()
    }

    /// Receiver that observes every committed state, local or remote.
    pub fn subscribe(&self) -> watch::Receiver<PlantState> {
        self.inner.state.subscribe()
    }

    pub fn now_ms(&self) -> i64 {
        self.inner.clock.now_ms()
    }

    async fn transition<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&mut PlantState) -> Result<T>,
    {
        let _guard = self.inner.writer.lock().await;
        let current = self.inner.state.borrow().clone();
        let mut next = current.clone();
        let out = f(&mut next)?;
        if next == current {
            debug!(op, "sin cambios");
            return Ok(out);
        }
        next.revision = current.revision.saturating_add(1);
        self.inner.engine.save(&self.inner.doc_id, &next).await?;
        self.inner.state.send_replace(next);
        debug!(op, doc_id = %self.inner.doc_id, "cambio aplicado");
        Ok(out)
    }

    /// Records a watering by `person` at the current time. `person` is not
    /// validated.
    pub async fn water_plant(&self, person: &str) -> Result<WateringEvent> {
        let event = WateringEvent {
            timestamp: self.inner.clock.now_ms(),
            person: person.to_string(),
        };
        self.transition("water_plant", |state| {
            state.watering_history.insert(0, event.clone());
            state.last_watering = Some(event.timestamp);
            Ok(event.clone())
        })
        .await
    }

    /// Appends a trimmed, non-blank, not yet present name to the roster.
    pub async fn add_waterer(&self, name: &str) -> Result<String> {
        let name = name.trim().to_string();
        self.transition("add_waterer", |state| {
            if name.is_empty() {
                return Err(StoreError::EmptyName);
            }
            if state.has_waterer(&name) {
                return Err(StoreError::DuplicateWaterer(name.clone()));
            }
            state.waterers.push(name.clone());
            Ok(name.clone())
        })
        .await
    }

    /// Drops every roster entry equal to `name`. Returns whether any was there.
    pub async fn remove_waterer(&self, name: &str) -> Result<bool> {
        self.transition("remove_waterer", |state| {
            let before = state.waterers.len();
            state.waterers.retain(|w| w != name);
            Ok(state.waterers.len() != before)
        })
        .await
    }

    /// Replaces `old` with `new` in place. History keeps the old name.
    pub async fn rename_waterer(&self, old: &str, new: &str) -> Result<String> {
        let new = new.trim().to_string();
        self.transition("rename_waterer", |state| {
            if new.is_empty() {
                return Err(StoreError::EmptyName);
            }
            if new == old {
                return Err(StoreError::UnchangedName);
            }
            let Some(pos) = state.waterers.iter().position(|w| w == old) else {
                return Err(StoreError::UnknownWaterer(old.to_string()));
            };
            if state.has_waterer(&new) {
                return Err(StoreError::DuplicateWaterer(new.clone()));
            }
            state.waterers[pos] = new.clone();
            state.waterers.retain(|w| w != old);
            Ok(new.clone())
        })
        .await
    }

    /// Removes the event at `index` (0 is the newest) and re-derives the
    /// last watering from what is left.
    pub async fn delete_watering_entry(&self, index: usize) -> Result<WateringEvent> {
        self.transition("delete_watering_entry", |state| {
            let len = state.watering_history.len();
            if index >= len {
                return Err(StoreError::EntryOutOfRange { index, len });
            }
            let removed = state.watering_history.remove(index);
            state.sync_last_watering();
            Ok(removed)
        })
        .await
    }

    /// Fractional days since the last watering; infinity if never watered.
    pub fn days_since_watering(&self) -> f64 {
        self.inner
            .state
            .borrow()
            .days_since_watering(self.inner.clock.now_ms())
    }

    pub fn staleness(&self) -> Staleness {
        Staleness::from_days(self.days_since_watering())
    }

    /// Adopts a state reported by the backend. Returns whether it changed
    /// anything.
    ///
    /// Backends also report this store's own saves, possibly after a newer
    /// one was committed, so anything older than the current revision is
    /// dropped. Same revision with different content is a concurrent write
    /// from another client and wins, since the backend delivers in write
    /// order.
    pub async fn apply_remote(&self, state: PlantState) -> bool {
        let _guard = self.inner.writer.lock().await;
        let changed = self.inner.state.send_if_modified(|current| {
            if state.revision < current.revision {
                debug!(
                    remote = state.revision,
                    local = current.revision,
                    "eco viejo descartado"
                );
                return false;
            }
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
        if changed {
            debug!(doc_id = %self.inner.doc_id, "cambio remoto aplicado");
        }
        changed
    }

    /// Follows the backend's change notifications until they stop.
    pub async fn spawn_remote_listener(&self) -> Result<JoinHandle<()>> {
        let mut changes = self.inner.engine.on_remote_change(&self.inner.doc_id).await?;
        let store = self.clone();
        Ok(tokio::spawn(async move {
            while let Some(state) = changes.recv().await {
                store.apply_remote(state).await;
            }
            debug!(doc_id = %store.doc_id(), "se dejó de observar el documento");
        }))
    }
}


#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::test_helpers::*;
    use super::*;
    use crate::models::MS_PER_DAY;
    use crate::sync::memory::MemoryBackend;
    use crate::sync::testing::{engine_for, FlakyBackend};

    #[tokio::test]
    async fn first_watering_sets_last_watering() {
        let (store, _clock) = memory_store().await;
        store.water_plant("Sam").await.unwrap();

        let state = store.snapshot();
        assert_eq!(state.last_watering, Some(T0));
        assert_eq!(state.watering_history.len(), 1);
    }

    #[tokio::test]
    async fn history_is_newest_first_and_head_matches_last_watering() {
        let (store, clock) = memory_store().await;
        for (i, person) in ["Ana", "Luis", "Sam", "Ana"].iter().enumerate() {
            clock.advance(1_000);
            store.water_plant(person).await.unwrap();
            let state = store.snapshot();
            assert_eq!(state.watering_history.len(), i + 1);
            assert_eq!(state.last_watering, Some(state.watering_history[0].timestamp));
        }
        let state = store.snapshot();
        assert_eq!(state.watering_history[0].person, "Ana");
        assert_eq!(state.watering_history[3].person, "Ana");
        assert!(state.watering_history[0].timestamp > state.watering_history[1].timestamp);
    }

    #[tokio::test]
    async fn water_plant_accepts_any_person() {
        let (store, _clock) = memory_store().await;
        let event = store.water_plant("").await.unwrap();
        assert_eq!(event.person, "");
    }

    #[tokio::test]
    async fn deleting_only_entry_resets_to_never_watered() {
        let (store, _clock) = memory_store().await;
        store.water_plant("Sam").await.unwrap();
        store.delete_watering_entry(0).await.unwrap();

        let state = store.snapshot();
        assert!(state.watering_history.is_empty());
        assert_eq!(state.last_watering, None);
        assert!(store.days_since_watering().is_infinite());
        assert_eq!(store.staleness(), Staleness::Alert);
    }

    #[tokio::test]
    async fn deleting_a_non_head_entry_keeps_last_watering() {
        let (store, clock) = memory_store().await;
        store.water_plant("Ana").await.unwrap();
        clock.advance(5_000);
        store.water_plant("Luis").await.unwrap();
        clock.advance(5_000);
        store.water_plant("Sam").await.unwrap();

        let before = store.snapshot().last_watering;
        let removed = store.delete_watering_entry(1).await.unwrap();
        assert_eq!(removed.person, "Luis");
        assert_eq!(store.snapshot().last_watering, before);
    }

    #[tokio::test]
    async fn deleting_the_head_falls_back_to_the_next_entry() {
        let (store, clock) = memory_store().await;
        store.water_plant("Ana").await.unwrap();
        clock.advance(5_000);
        store.water_plant("Luis").await.unwrap();

        store.delete_watering_entry(0).await.unwrap();
        assert_eq!(store.snapshot().last_watering, Some(T0));
    }

    #[tokio::test]
    async fn out_of_range_delete_is_rejected() {
        let (store, _clock) = memory_store().await;
        store.water_plant("Sam").await.unwrap();

        let err = store.delete_watering_entry(1).await.unwrap_err();
        assert!(matches!(err, StoreError::EntryOutOfRange { index: 1, len: 1 }));
        assert_eq!(store.snapshot().watering_history.len(), 1);
    }

    #[tokio::test]
    async fn add_then_remove_leaves_empty_roster() {
        let (store, _clock) = memory_store().await;
        store.add_waterer("Alice").await.unwrap();
        assert!(store.remove_waterer("Alice").await.unwrap());
        assert!(store.snapshot().waterers.is_empty());
    }

    #[tokio::test]
    async fn removing_unknown_waterer_is_a_no_op() {
        let (store, _clock) = memory_store().await;
        assert!(!store.remove_waterer("Nadie").await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_and_blank_adds_are_rejected() {
        let (store, _clock) = memory_store().await;
        store.add_waterer("Sam").await.unwrap();

        assert!(matches!(
            store.add_waterer(" Sam ").await,
            Err(StoreError::DuplicateWaterer(name)) if name == "Sam"
        ));
        assert!(matches!(store.add_waterer("   ").await, Err(StoreError::EmptyName)));
        // Case-sensitive.
        store.add_waterer("sam").await.unwrap();
        assert_eq!(store.snapshot().waterers, vec!["Sam", "sam"]);
    }

    #[tokio::test]
    async fn rename_swaps_in_place() {
        let (store, _clock) = memory_store().await;
        for name in ["Ana", "Luis", "Sam"] {
            store.add_waterer(name).await.unwrap();
        }
        let mut rx = store.subscribe();
        rx.mark_unchanged();

        store.rename_waterer("Luis", "Lucho").await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), store.snapshot());
        assert_eq!(store.snapshot().waterers, vec!["Ana", "Lucho", "Sam"]);
    }

    #[tokio::test]
    async fn rename_guards() {
        let (store, _clock) = memory_store().await;
        store.add_waterer("Ana").await.unwrap();
        store.add_waterer("Sam").await.unwrap();

        assert!(matches!(store.rename_waterer("Ana", " ").await, Err(StoreError::EmptyName)));
        assert!(matches!(store.rename_waterer("Ana", "Ana").await, Err(StoreError::UnchangedName)));
        assert!(matches!(
            store.rename_waterer("Ana", "Sam").await,
            Err(StoreError::DuplicateWaterer(_))
        ));
        assert!(matches!(
            store.rename_waterer("Pepe", "Luis").await,
            Err(StoreError::UnknownWaterer(_))
        ));
        assert_eq!(store.snapshot().waterers, vec!["Ana", "Sam"]);
    }

    #[tokio::test]
    async fn example_scenario() {
        let (store, _clock) = memory_store().await;
        store.add_waterer("Sam").await.unwrap();
        assert_eq!(store.snapshot().waterers, vec!["Sam"]);

        store.water_plant("Sam").await.unwrap();
        let state = store.snapshot();
        assert_eq!(state.last_watering, Some(T0));
        assert_eq!(
            state.watering_history,
            vec![WateringEvent { timestamp: T0, person: "Sam".into() }]
        );

        store.delete_watering_entry(0).await.unwrap();
        let state = store.snapshot();
        assert!(state.watering_history.is_empty());
        assert_eq!(state.last_watering, None);
    }

    #[tokio::test]
    async fn staleness_follows_the_clock() {
        let (store, clock) = memory_store().await;
        store.water_plant("Sam").await.unwrap();

        clock.set(T0 + (3.4 * MS_PER_DAY) as i64);
        assert_eq!(store.staleness(), Staleness::Neutral);
        clock.set(T0 + (3.5 * MS_PER_DAY) as i64);
        assert_eq!(store.staleness(), Staleness::Warning);
        clock.set(T0 + (4.0 * MS_PER_DAY) as i64);
        assert_eq!(store.staleness(), Staleness::Alert);
    }

    #[tokio::test]
    async fn failed_save_changes_nothing() {
        let backend = Arc::new(FlakyBackend::new());
        let clock = Arc::new(ManualClock::new(T0));
        let store = PlantStore::open(engine_for(backend.clone()), DOC_ID, clock)
            .await
            .unwrap();
        store.add_waterer("Sam").await.unwrap();

        backend.set_failing(true);
        let err = store.water_plant("Sam").await.unwrap_err();
        assert!(matches!(err, StoreError::Sync(_)));
        assert!(store.snapshot().watering_history.is_empty());

        backend.set_failing(false);
        store.water_plant("Sam").await.unwrap();
        assert_eq!(store.snapshot().watering_history.len(), 1);
    }

    #[tokio::test]
    async fn reopening_loads_the_persisted_document() {
        let backend = Arc::new(MemoryBackend::new());
        let clock = Arc::new(ManualClock::new(T0));
        let first = PlantStore::open(engine_for(backend.clone()), DOC_ID, clock.clone())
            .await
            .unwrap();
        first.add_waterer("Ana").await.unwrap();
        first.water_plant("Ana").await.unwrap();

        let second = PlantStore::open(engine_for(backend), DOC_ID, clock).await.unwrap();
        assert_eq!(second.snapshot(), first.snapshot());
    }

    #[tokio::test]
    async fn two_clients_converge_through_the_backend() {
        let backend = Arc::new(MemoryBackend::new());
        let clock = Arc::new(ManualClock::new(T0));
        let phone = PlantStore::open(engine_for(backend.clone()), DOC_ID, clock.clone())
            .await
            .unwrap();
        let laptop = PlantStore::open(engine_for(backend), DOC_ID, clock).await.unwrap();
        let _listener = laptop.spawn_remote_listener().await.unwrap();
        let mut rx = laptop.subscribe();

        phone.add_waterer("Ana").await.unwrap();
        phone.water_plant("Ana").await.unwrap();

        let expected = phone.snapshot();
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| *s == expected))
            .await
            .expect("el segundo cliente no convergió")
            .unwrap();
        assert_eq!(laptop.snapshot(), expected);
    }

    #[tokio::test]
    async fn identical_remote_state_is_ignored() {
        let (store, _clock) = memory_store().await;
        store.add_waterer("Ana").await.unwrap();
        assert!(!store.apply_remote(store.snapshot()).await);

        let cleared = PlantState {
            revision: store.snapshot().revision + 1,
            ..Default::default()
        };
        assert!(store.apply_remote(cleared).await);
        assert!(store.snapshot().waterers.is_empty());
    }

    #[tokio::test]
    async fn every_commit_bumps_the_revision() {
        let (store, _clock) = memory_store().await;
        assert_eq!(store.snapshot().revision, 0);
        store.add_waterer("Ana").await.unwrap();
        store.water_plant("Ana").await.unwrap();
        assert_eq!(store.snapshot().revision, 2);

        // No-ops and rejections do not count.
        assert!(!store.remove_waterer("Pepe").await.unwrap());
        assert!(store.add_waterer("Ana").await.is_err());
        assert_eq!(store.snapshot().revision, 2);
    }

    #[tokio::test]
    async fn late_echo_of_an_older_save_is_dropped() {
        let (store, _clock) = memory_store().await;
        store.add_waterer("Ana").await.unwrap();
        let echo = store.snapshot();
        store.add_waterer("Luis").await.unwrap();

        assert!(!store.apply_remote(echo).await);
        assert_eq!(store.snapshot().waterers, vec!["Ana", "Luis"]);

        store.add_waterer("Sam").await.unwrap();
        assert_eq!(store.snapshot().waterers, vec!["Ana", "Luis", "Sam"]);
    }

    #[tokio::test]
    async fn concurrent_write_with_the_same_revision_is_adopted() {
        let (store, _clock) = memory_store().await;
        store.add_waterer("Ana").await.unwrap();
        let theirs = PlantState {
            revision: store.snapshot().revision,
            waterers: vec!["Luis".into()],
            ..Default::default()
        };
        assert!(store.apply_remote(theirs).await);
        assert_eq!(store.snapshot().waterers, vec!["Luis"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn rapid_edits_survive_their_own_echoes() {
        for _ in 0..50 {
            let (store, _clock) = memory_store().await;
            let listener = store.spawn_remote_listener().await.unwrap();
            for i in 0..30 {
                store.add_waterer(&format!("w{i}")).await.unwrap();
            }
            tokio::time::sleep(Duration::from_millis(20)).await;

            let state = store.snapshot();
            assert_eq!(state.waterers.len(), 30, "se perdieron cambios: {:?}", state.waterers);
            assert_eq!(state.revision, 30);
            listener.abort();
        }
    }
}
