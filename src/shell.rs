//! Interactive mode: one page mounted at a time, commands typed line by line,
//! and a re-render whenever the document changes (here or on another device).

use std::io::{self, Write};
use std::time::Duration;

use anyhow::Result;
use crossterm::cursor::MoveTo;
use crossterm::queue;
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use crossterm::terminal::{Clear, ClearType};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::store::PlantStore;
use crate::views::{self, HistoryView, PlantView, Route};

const HELP: &str = "\
go <ruta>             ir a /, /history o /hello
water                 tocar la planta (abre la lista de regadores)
pick <nombre|n>       regar como alguien de la lista
new <nombre>          agregar a alguien y regar
cancel                cerrar la lista
add <nombre>          agregar regador (en /history)
rename <viejo> -> <nuevo>
rm <nombre>           quitar regador
del <n>               borrar el riego n (pide confirmación)
yes / no              responder la confirmación
help / quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Go(String),
    Water,
    Pick(String),
    New(String),
    Cancel,
    Add(String),
    Rename { old: String, new: String },
    Remove(String),
    /// 1-based, as displayed.
    Delete(usize),
    Yes,
    No,
    Help,
    Quit,
}

/// `Ok(None)` for a blank line, `Err` with a message for anything unknown.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    let needs_arg = |cmd: fn(String) -> Command| {
        if rest.is_empty() {
            Err(format!("'{verb}' necesita un argumento"))
        } else {
            Ok(Some(cmd(rest.to_string())))
        }
    };

    match verb {
        "go" => needs_arg(Command::Go),
        "water" => Ok(Some(Command::Water)),
        "pick" => needs_arg(Command::Pick),
        "new" => needs_arg(Command::New),
        "cancel" => Ok(Some(Command::Cancel)),
        "add" => needs_arg(Command::Add),
        "rm" => needs_arg(Command::Remove),
        "rename" => match rest.split_once("->") {
            Some((old, new)) if !old.trim().is_empty() => Ok(Some(Command::Rename {
                old: old.trim().to_string(),
                new: new.trim().to_string(),
            })),
            _ => Err("uso: rename <viejo> -> <nuevo>".to_string()),
        },
        "del" => match rest.parse::<usize>() {
            Ok(n) if n >= 1 => Ok(Some(Command::Delete(n))),
            _ => Err("uso: del <n> (n empieza en 1)".to_string()),
        },
        "yes" | "y" => Ok(Some(Command::Yes)),
        "no" | "n" => Ok(Some(Command::No)),
        "help" | "?" => Ok(Some(Command::Help)),
        "quit" | "exit" | "q" => Ok(Some(Command::Quit)),
        other => Err(format!("comando desconocido: '{other}' (probá 'help')")),
    }
}

/// Sent by a page's splash timer. `mount` tells stale timers apart.
#[derive(Debug)]
pub struct Loaded {
    mount: u64,
}

enum Page {
    Plant(PlantView),
    History(HistoryView),
    Hello,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct App {
    store: PlantStore,
    splash: Duration,
    route: Route,
    page: Page,
    mount: u64,
    loaded_tx: mpsc::UnboundedSender<Loaded>,
    status: Option<String>,
}

impl App {
    pub fn new(store: PlantStore, splash: Duration, loaded_tx: mpsc::UnboundedSender<Loaded>) -> Self {
        let mut app = Self {
            store,
            splash,
            route: Route::Plant,
            page: Page::Hello,
            mount: 0,
            loaded_tx,
            status: None,
        };
        app.navigate(Route::Plant);
        app
    }

    pub fn route(&self) -> Route {
        self.route
    }

    /// Unmounts the current page (cancelling its splash) and mounts `route`.
    pub fn navigate(&mut self, route: Route) {
        self.mount += 1;
        let mount = self.mount;
        let tx = self.loaded_tx.clone();
        let on_loaded = move || {
            let _ = tx.send(Loaded { mount });
        };
        self.page = match route {
            Route::Plant => Page::Plant(PlantView::mount(self.splash, on_loaded)),
            Route::History => Page::History(HistoryView::mount(self.splash, on_loaded)),
            Route::Hello => Page::Hello,
        };
        self.route = route;
        debug!(path = route.path(), mount, "página montada");
    }

    /// Returns whether the page changed.
    pub fn on_loaded(&mut self, event: Loaded) -> bool {
        if event.mount != self.mount {
            return false;
        }
        match &mut self.page {
            Page::Plant(view) => view.finish_loading(),
            Page::History(view) => view.finish_loading(),
            Page::Hello => return false,
        }
        true
    }

    pub async fn handle(&mut self, command: Command) -> Flow {
        let result = self.dispatch(command).await;
        match result {
            Ok(flow) => flow,
            Err(e) => {
                if matches!(e, StoreError::Sync(_)) {
                    warn!(error = %e, "el cambio no se pudo sincronizar");
                }
                self.status = Some(e.to_string());
                Flow::Continue
            }
        }
    }

    async fn dispatch(&mut self, command: Command) -> Result<Flow, StoreError> {
        match command {
            Command::Quit => return Ok(Flow::Quit),
            Command::Help => self.status = Some(HELP.to_string()),
            Command::Go(path) => match Route::parse(&path) {
                Some(route) => self.navigate(route),
                None => {
                    self.status = Some(format!("No hay ninguna página en '{path}'"));
                    self.navigate(Route::Plant);
                }
            },
            command => self.page_command(command).await?,
        }
        Ok(Flow::Continue)
    }

    async fn page_command(&mut self, command: Command) -> Result<(), StoreError> {
        let store = &self.store;
        let status = &mut self.status;
        match (command, &mut self.page) {
            (Command::Water, Page::Plant(view)) => {
                if !view.click_plant() {
                    *status = Some("Un momento...".to_string());
                }
            }
            (Command::Pick(who), Page::Plant(view)) => {
                let waterers = store.snapshot().waterers;
                let name = match who.parse::<usize>() {
                    Ok(n) if n >= 1 => waterers.get(n - 1).cloned(),
                    _ => waterers.iter().find(|w| **w == who).cloned(),
                };
                match name {
                    Some(name) => {
                        if view.choose(store, &name).await?.is_some() {
                            *status = Some(format!("¡Gracias, {name}!"));
                        }
                    }
                    None => *status = Some(format!("'{who}' no está en la lista")),
                }
            }
            (Command::New(name), Page::Plant(view)) => {
                view.set_draft(&name);
                if let Some(event) = view.submit_new(store).await? {
                    *status = Some(format!("¡Gracias, {}!", event.person));
                }
            }
            (Command::Cancel, Page::Plant(view)) => view.cancel(),

            (Command::Add(name), Page::History(view)) => {
                view.add_waterer(store, &name).await?;
            }
            (Command::Rename { old, new }, Page::History(view)) => {
                view.start_rename(&old);
                view.edit_rename(&new);
                if !view.finish_rename(store).await? {
                    *status = Some("No se cambió el nombre".to_string());
                }
            }
            (Command::Remove(name), Page::History(view)) => {
                if !view.remove_waterer(store, &name).await? {
                    *status = Some(format!("'{name}' no está en la lista"));
                }
            }
            (Command::Delete(n), Page::History(view)) => view.request_delete(n - 1),
            (Command::Yes, Page::History(view)) => {
                view.confirm_delete(store, true).await?;
            }
            (Command::No, Page::History(view)) => {
                view.confirm_delete(store, false).await?;
            }
            (Command::Cancel, Page::History(view)) => view.cancel_rename(),

            _ => *status = Some(format!("Eso no se puede hacer en {}", self.route.path())),
        }
        Ok(())
    }

    pub fn render(&mut self, out: &mut impl Write) -> io::Result<()> {
        let state = self.store.snapshot();
        match &self.page {
            Page::Plant(view) => view.render(&state, self.store.now_ms(), out)?,
            Page::History(view) => view.render(&state, out)?,
            Page::Hello => views::render_hello(out)?,
        }
        if let Some(status) = self.status.take() {
            queue!(
                out,
                Print("\n"),
                SetForegroundColor(Color::Cyan),
                Print(status),
                ResetColor,
                Print("\n"),
            )?;
        }
        queue!(out, Print("\n> "))?;
        out.flush()
    }
}

fn redraw(app: &mut App, out: &mut impl Write) -> io::Result<()> {
    queue!(out, Clear(ClearType::All), MoveTo(0, 0))?;
    app.render(out)
}

pub async fn run(store: PlantStore, splash: Duration) -> Result<()> {
    let _listener = match store.spawn_remote_listener().await {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "sin cambios en vivo de otros dispositivos");
            None
        }
    };
    let mut changes = store.subscribe();
    let (loaded_tx, mut loaded_rx) = mpsc::unbounded_channel();
    let mut app = App::new(store, splash, loaded_tx);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = io::stdout();

    redraw(&mut app, &mut stdout)?;
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_command(&line) {
                    Ok(Some(command)) => {
                        if app.handle(command).await == Flow::Quit {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(msg) => app.status = Some(msg),
                }
                redraw(&mut app, &mut stdout)?;
            }
            Some(event) = loaded_rx.recv() => {
                if app.on_loaded(event) {
                    debug!(path = app.route().path(), "página lista");
                    redraw(&mut app, &mut stdout)?;
                }
            }
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                redraw(&mut app, &mut stdout)?;
            }
        }
    }
    Ok(())
}
