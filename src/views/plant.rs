//! The plant page: one big pot, how long since it was watered, and a picker
//! for who is watering it now.

use std::io::{self, Write};
use std::time::Duration;

use crossterm::queue;
use crossterm::style::{Print, ResetColor, SetForegroundColor};
use tracing::debug;

use super::timer::LoadingTimer;
use super::{render_header, staleness_color, Route, NEUTRAL};
use crate::error::{Result, StoreError};
use crate::models::{PlantState, Staleness, WateringEvent};
use crate::store::PlantStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlantMode {
    Loading,
    Idle,
    /// Picker open; `draft` is the "new waterer" input.
    SelectingWaterer { draft: String },
}

pub struct PlantView {
    mode: PlantMode,
    timer: Option<LoadingTimer>,
}

impl PlantView {
    /// Mounts with the splash; `on_loaded` runs when it is over unless the
    /// view is dropped first. Call [`PlantView::finish_loading`] from it.
    pub fn mount<F>(splash: Duration, on_loaded: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            mode: PlantMode::Loading,
            timer: Some(LoadingTimer::start(splash, on_loaded)),
        }
    }

    /// A view that skips the splash.
    pub fn loaded() -> Self {
        Self {
            mode: PlantMode::Idle,
            timer: None,
        }
    }

    #[cfg(test)]
    pub fn mode(&self) -> &PlantMode {
        &self.mode
    }

    pub fn finish_loading(&mut self) {
        if self.mode == PlantMode::Loading {
            self.mode = PlantMode::Idle;
        }
        self.timer = None;
    }

    /// Clicking the pot opens the picker, unless we are still loading.
    pub fn click_plant(&mut self) -> bool {
        if self.mode != PlantMode::Idle {
            return false;
        }
        self.mode = PlantMode::SelectingWaterer {
            draft: String::new(),
        };
        true
    }

    pub fn set_draft(&mut self, text: &str) {
        if let PlantMode::SelectingWaterer { draft } = &mut self.mode {
            *draft = text.to_string();
        }
    }

    pub fn cancel(&mut self) {
        if matches!(self.mode, PlantMode::SelectingWaterer { .. }) {
            self.mode = PlantMode::Idle;
        }
    }

    /// Waters as an existing waterer and closes the picker. Outside the
    /// picker nothing happens.
    pub async fn choose(&mut self, store: &PlantStore, name: &str) -> Result<Option<WateringEvent>> {
        if !matches!(self.mode, PlantMode::SelectingWaterer { .. }) {
            return Ok(None);
        }
        let event = store.water_plant(name).await?;
        self.mode = PlantMode::Idle;
        Ok(Some(event))
    }

    /// "Add & water": puts the draft name on the roster and waters as them.
    /// A blank draft is ignored and the picker stays open.
    pub async fn submit_new(&mut self, store: &PlantStore) -> Result<Option<WateringEvent>> {
        let PlantMode::SelectingWaterer { draft } = &self.mode else {
            return Ok(None);
        };
        let name = draft.trim().to_string();
        if name.is_empty() {
            return Ok(None);
        }
        match store.add_waterer(&name).await {
            Ok(_) => {}
            Err(StoreError::DuplicateWaterer(_)) => {
                debug!(name = %name, "ya estaba en la lista, solo se riega");
            }
            Err(e) => return Err(e),
        }
        let event = store.water_plant(&name).await?;
        self.mode = PlantMode::Idle;
        Ok(Some(event))
    }

    pub fn render(&self, state: &PlantState, now_ms: i64, out: &mut impl Write) -> io::Result<()> {
        render_header(Route::Plant, out)?;
        queue!(out, Print("        🪴\n\n"))?;

        if self.mode == PlantMode::Loading {
            queue!(out, SetForegroundColor(NEUTRAL), Print("Recordando...\n"), ResetColor)?;
            return out.flush();
        }

        let days = state.days_since_watering(now_ms);
        queue!(
            out,
            SetForegroundColor(staleness_color(Staleness::from_days(days))),
            Print(format!("Último riego: {}\n", time_since_text(state, days))),
            ResetColor,
        )?;

        if let PlantMode::SelectingWaterer { draft } = &self.mode {
            queue!(out, Print("\n¿Quién está regando la planta?\n"))?;
            for (i, waterer) in state.waterers.iter().enumerate() {
                queue!(out, Print(format!("  {}. {}\n", i + 1, waterer)))?;
            }
            queue!(
                out,
                Print(format!("Agregar otra persona: [{draft}]\n")),
                Print("(pick <nombre|n> · new <nombre> · cancel)\n"),
            )?;
        }
        out.flush()
    }
}

/// "Nunca" when never watered, then today / yesterday / whole days.
pub fn time_since_text(state: &PlantState, days: f64) -> String {
    if state.last_watering.is_none() {
        return "Nunca".to_string();
    }
    if days < 1.0 {
        "Hoy".to_string()
    } else if days < 2.0 {
        "Ayer".to_string()
    } else {
        format!("hace {} días", days.floor() as i64)
    }
}
