//! Terminal renderings of the app's pages and the routes that reach them.

use std::io::{self, Write};

use crossterm::queue;
use crossterm::style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor};

use crate::models::Staleness;

pub mod history;
pub mod plant;
pub mod timer;

pub use history::HistoryView;
pub use plant::PlantView;

/// Amber, the app's base text colour.
pub const NEUTRAL: Color = Color::DarkYellow;

pub fn staleness_color(staleness: Staleness) -> Color {
    match staleness {
        Staleness::Neutral => NEUTRAL,
        Staleness::Warning => Color::Red,
        Staleness::Alert => Color::DarkRed,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Plant,
    History,
    /// Demo page, not linked from anywhere.
    Hello,
}

impl Route {
    pub fn parse(path: &str) -> Option<Route> {
        match path.trim().trim_end_matches('/') {
            "" => Some(Route::Plant),
            "/history" | "history" => Some(Route::History),
            "/hello" | "hello" => Some(Route::Hello),
            _ => None,
        }
    }

    pub fn path(self) -> &'static str {
        match self {
            Route::Plant => "/",
            Route::History => "/history",
            Route::Hello => "/hello",
        }
    }
}

/// Shared header: app title plus the link to the other page.
pub fn render_header(route: Route, out: &mut impl Write) -> io::Result<()> {
    let link = match route {
        Route::Plant => "Historial → /history",
        Route::History => "Volver a la planta → /",
        Route::Hello => "Inicio → /",
    };
    queue!(
        out,
        SetForegroundColor(NEUTRAL),
        SetAttribute(Attribute::Bold),
        Print("Planty"),
        SetAttribute(Attribute::Reset),
        ResetColor,
        Print(format!("    {link}\n\n")),
    )
}

pub fn render_hello(out: &mut impl Write) -> io::Result<()> {
    render_header(Route::Hello, out)?;
    queue!(out, Print("¡Hola, mundo!\n"))?;
    out.flush()
}

pub fn render_not_found(path: &str, out: &mut impl Write) -> io::Result<()> {
    queue!(
        out,
        SetForegroundColor(Color::Red),
        Print(format!("No hay ninguna página en '{path}'\n")),
        ResetColor,
    )?;
    out.flush()
}
