use serde::{Deserialize, Serialize};

pub const MS_PER_DAY: f64 = 1000.0 * 60.0 * 60.0 * 24.0;

/// A single watering, as stored in the shared document.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct WateringEvent {
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub person: String,
}

/// The whole synced document. Field names are camelCase so every client of
/// the same document id reads the same layout.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct PlantState {
    /// Bumped by every committed local change. A state older than the one a
    /// store holds is a late echo and gets dropped.
    pub revision: i64,
    pub last_watering: Option<i64>,
    /// Newest first.
    pub watering_history: Vec<WateringEvent>,
    pub waterers: Vec<String>,
}

impl PlantState {
    pub fn has_waterer(&self, name: &str) -> bool {
        self.waterers.iter().any(|w| w == name)
    }

    /// Days elapsed between the last watering and `now_ms`, or infinity if
    /// the plant was never watered.
    pub fn days_since_watering(&self, now_ms: i64) -> f64 {
        match self.last_watering {
            None => f64::INFINITY,
            Some(last) => now_ms.saturating_sub(last) as f64 / MS_PER_DAY,
        }
    }

    /// Re-derives `last_watering` from the head of the history.
    pub(crate) fn sync_last_watering(&mut self) {
        self.last_watering = self.watering_history.first().map(|e| e.timestamp);
    }
}

/// How worried we should be about the plant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    Neutral,
    Warning,
    Alert,
}

impl Staleness {
    pub const WARNING_DAYS: f64 = 3.5;
    pub const ALERT_DAYS: f64 = 4.0;

    pub fn from_days(days: f64) -> Self {
        if days >= Self::ALERT_DAYS {
            Staleness::Alert
        } else if days >= Self::WARNING_DAYS {
            Staleness::Warning
        } else {
            Staleness::Neutral
        }
    }
}
