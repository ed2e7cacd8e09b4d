//! The history page: roster chips and the full watering log.

use std::io::{self, Write};
use std::time::Duration;

use chrono::{Local, TimeZone};
use crossterm::queue;
use crossterm::style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor};
use tracing::debug;

use super::timer::LoadingTimer;
use super::{render_header, Route, NEUTRAL};
use crate::error::{Result, StoreError};
use crate::models::{PlantState, WateringEvent};
use crate::store::PlantStore;

/// Inline rename in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameDraft {
    pub original: String,
    pub new: String,
}

pub struct HistoryView {
    loading: bool,
    timer: Option<LoadingTimer>,
    editing: Option<RenameDraft>,
    /// Row whose "delete?" prompt is open.
    deleting: Option<usize>,
}

impl HistoryView {
    pub fn mount<F>(splash: Duration, on_loaded: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            loading: true,
            timer: Some(LoadingTimer::start(splash, on_loaded)),
            editing: None,
            deleting: None,
        }
    }

    pub fn loaded() -> Self {
        Self {
            loading: false,
            timer: None,
            editing: None,
            deleting: None,
        }
    }

    #[cfg(test)]
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn finish_loading(&mut self) {
        self.loading = false;
        self.timer = None;
    }

    #[cfg(test)]
    pub fn editing(&self) -> Option<&RenameDraft> {
        self.editing.as_ref()
    }

    #[cfg(test)]
    pub fn deleting(&self) -> Option<usize> {
        self.deleting
    }

    /// Adds a trimmed name. Blank or already listed names are ignored.
    pub async fn add_waterer(&mut self, store: &PlantStore, name: &str) -> Result<bool> {
        let name = name.trim();
        if self.loading || name.is_empty() || store.snapshot().has_waterer(name) {
            return Ok(false);
        }
        store.add_waterer(name).await?;
        Ok(true)
    }

    pub async fn remove_waterer(&mut self, store: &PlantStore, name: &str) -> Result<bool> {
        if self.loading {
            return Ok(false);
        }
        if self.editing.as_ref().is_some_and(|d| d.original == name) {
            self.editing = None;
        }
        store.remove_waterer(name).await
    }

    pub fn start_rename(&mut self, name: &str) {
        if self.loading {
            return;
        }
        self.editing = Some(RenameDraft {
            original: name.to_string(),
            new: name.to_string(),
        });
    }

    pub fn edit_rename(&mut self, text: &str) {
        if let Some(draft) = &mut self.editing {
            draft.new = text.to_string();
        }
    }

    pub fn cancel_rename(&mut self) {
        self.editing = None;
    }

    /// Commits the open rename and closes the editor. A blank, unchanged or
    /// clashing name just closes it.
    pub async fn finish_rename(&mut self, store: &PlantStore) -> Result<bool> {
        let Some(draft) = self.editing.take() else {
            return Ok(false);
        };
        match store.rename_waterer(&draft.original, &draft.new).await {
            Ok(_) => Ok(true),
            Err(
                e @ (StoreError::EmptyName
                | StoreError::UnchangedName
                | StoreError::DuplicateWaterer(_)
                | StoreError::UnknownWaterer(_)),
            ) => {
                debug!(original = %draft.original, error = %e, "renombre descartado");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Opens the "delete?" prompt for one row, closing any other.
    pub fn request_delete(&mut self, index: usize) {
        if !self.loading {
            self.deleting = Some(index);
        }
    }

    /// Answers the open prompt. Only "yes" touches the store.
    pub async fn confirm_delete(&mut self, store: &PlantStore, yes: bool) -> Result<Option<WateringEvent>> {
        let Some(index) = self.deleting.take() else {
            return Ok(None);
        };
        if !yes {
            return Ok(None);
        }
        store.delete_watering_entry(index).await.map(Some)
    }

    pub fn render(&self, state: &PlantState, out: &mut impl Write) -> io::Result<()> {
        render_header(Route::History, out)?;
        queue!(
            out,
            SetAttribute(Attribute::Bold),
            Print("Historial de riego\n\n"),
            SetAttribute(Attribute::Reset),
        )?;

        if self.loading {
            queue!(
                out,
                SetForegroundColor(NEUTRAL),
                Print("Recordando...\n"),
                ResetColor,
                SetForegroundColor(Color::DarkGrey),
                Print("  ▒▒▒▒▒▒▒▒▒▒▒▒▒▒▒▒▒▒\n  ▒▒▒▒▒▒▒▒▒▒▒▒\n\n  ▒▒▒▒▒▒▒▒▒▒▒▒▒▒▒▒\n  ▒▒▒▒▒▒▒▒\n"),
                ResetColor,
            )?;
            return out.flush();
        }

        queue!(out, Print("Regadores\n"))?;
        if state.waterers.is_empty() {
            queue!(out, Print("  (nadie todavía)\n"))?;
        }
        for waterer in &state.waterers {
            match &self.editing {
                Some(draft) if &draft.original == waterer => {
                    queue!(out, Print(format!("  ✏️  {} → [{}]\n", waterer, draft.new)))?;
                }
                _ => {
                    queue!(
                        out,
                        SetForegroundColor(NEUTRAL),
                        Print(format!("  ● {waterer}\n")),
                        ResetColor,
                    )?;
                }
            }
        }

        queue!(out, Print("\nRiegos\n"))?;
        if state.watering_history.is_empty() {
            queue!(out, Print("  Todavía no hay riegos.\n"))?;
        }
        for (i, entry) in state.watering_history.iter().enumerate() {
            queue!(
                out,
                Print(format!("  {}. {}  ", i + 1, entry.person)),
                SetForegroundColor(Color::DarkGrey),
                Print(format_timestamp(entry.timestamp)),
                ResetColor,
                Print("\n"),
            )?;
            if self.deleting == Some(i) {
                queue!(
                    out,
                    SetForegroundColor(Color::Red),
                    Print("     ¿Borrar este riego? (yes/no)\n"),
                    ResetColor,
                )?;
            }
        }
        out.flush()
    }
}

/// Local date and time, or the raw number if it is out of chrono's range.
pub fn format_timestamp(timestamp: i64) -> String {
    match Local.timestamp_millis_opt(timestamp).single() {
        Some(dt) => dt.format("%d/%m/%Y %H:%M:%S").to_string(),
        None => timestamp.to_string(),
    }
}
