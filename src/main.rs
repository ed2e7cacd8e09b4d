use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod error;
mod models;
mod shell;
mod store;
mod sync;
mod views;

use cli::{Cli, Commands, DeleteArgs, GlobalArgs, WatererCommands};
use config::{BackendKind, Config};
use error::StoreError;
use store::{PlantStore, SystemClock};
use sync::file::FileBackend;
use sync::memory::MemoryBackend;
use sync::mongo::MongoBackend;
use sync::{SyncBackend, SyncConfig, SyncEngine};
use views::{HistoryView, PlantView, Route};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    let config = apply_overrides(Config::from_env(), &cli.global);
    let store = open_store(&config).await?;

    match cli.command {
        Commands::View => render_route(&store, Route::Plant)?,
        Commands::History => render_route(&store, Route::History)?,
        Commands::Open { path } => match Route::parse(&path) {
            Some(route) => render_route(&store, route)?,
            None => {
                views::render_not_found(&path, &mut io::stdout())?;
                render_route(&store, Route::Plant)?;
            }
        },
        Commands::Water { person } => {
            let mut view = PlantView::loaded();
            view.click_plant();
            let event = if store.snapshot().has_waterer(&person) {
                view.choose(&store, &person).await?
            } else {
                view.set_draft(&person);
                view.submit_new(&store).await?
            };
            match event {
                Some(event) => println!("Riego registrado: {}", event.person),
                None => anyhow::bail!("Hace falta un nombre para registrar el riego"),
            }
        }
        Commands::Waterer(WatererCommands::Add { name }) => {
            let name = store.add_waterer(&name).await?;
            println!("Regador agregado: {name}");
        }
        Commands::Waterer(WatererCommands::Rename { old, new }) => {
            let new = store.rename_waterer(&old, &new).await?;
            println!("'{old}' ahora se llama '{new}'");
        }
        Commands::Waterer(WatererCommands::Remove { name }) => {
            if store.remove_waterer(&name).await? {
                println!("Regador '{name}' removido");
            } else {
                println!("No se encontró a '{name}' en la lista");
            }
        }
        Commands::Delete(args) => delete_entry(&store, args).await?,
        Commands::Shell => shell::run(store, config.splash).await?,
        Commands::Watch => watch(store).await?,
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("arbolitos_riego={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn apply_overrides(mut config: Config, args: &GlobalArgs) -> Config {
    if let Some(backend) = args.backend {
        config.backend = backend;
    }
    if let Some(uri) = &args.mongo_uri {
        config.mongo_uri = uri.clone();
    }
    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(doc_id) = &args.doc_id {
        config.doc_id = doc_id.clone();
    }
    config
}

async fn open_store(config: &Config) -> Result<PlantStore> {
    let backend: Arc<dyn SyncBackend> = match config.backend {
        BackendKind::Mongo => Arc::new(
            MongoBackend::connect(&config.mongo_uri, &config.database, &config.app_name)
                .await
                .with_context(|| format!("Error al conectar con MongoDB en {}", config.mongo_uri))?,
        ),
        BackendKind::File => Arc::new(
            FileBackend::open(&config.data_dir, config.poll_interval)
                .await
                .with_context(|| format!("Error al abrir {}", config.data_dir.display()))?,
        ),
        BackendKind::Memory => Arc::new(MemoryBackend::new()),
    };

    let engine = SyncEngine::configure(
        backend,
        SyncConfig {
            url: config.sync_url(),
            name: config.app_name.clone(),
        },
    );
    let store = PlantStore::open(engine, &config.doc_id, Arc::new(SystemClock))
        .await
        .with_context(|| format!("Error al cargar el documento '{}'", config.doc_id))?;
    Ok(store)
}

fn render_route(store: &PlantStore, route: Route) -> Result<()> {
    let state = store.snapshot();
    let mut out = io::stdout();
    match route {
        Route::Plant => PlantView::loaded().render(&state, store.now_ms(), &mut out)?,
        Route::History => HistoryView::loaded().render(&state, &mut out)?,
        Route::Hello => views::render_hello(&mut out)?,
    }
    Ok(())
}

/// Maps the 1-based row shown by `history` to a store index, checking it
/// exists before anyone is asked to confirm.
fn entry_index(entry: usize, len: usize) -> Result<usize> {
    let Some(index) = entry.checked_sub(1) else {
        anyhow::bail!("Los riegos se numeran desde 1");
    };
    if index >= len {
        return Err(StoreError::EntryOutOfRange { index, len }.into());
    }
    Ok(index)
}

async fn delete_entry(store: &PlantStore, args: DeleteArgs) -> Result<()> {
    let index = entry_index(args.entry, store.snapshot().watering_history.len())?;
    let mut view = HistoryView::loaded();
    view.request_delete(index);
    view.render(&store.snapshot(), &mut io::stdout())?;

    let confirmed = args.yes || ask_confirmation()?;
    match view.confirm_delete(store, confirmed).await? {
        Some(removed) => println!(
            "Riego de {} ({}) borrado",
            removed.person,
            views::history::format_timestamp(removed.timestamp)
        ),
        None => println!("No se borró nada"),
    }
    Ok(())
}

fn ask_confirmation() -> Result<bool> {
    print!("> ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes" | "s" | "si" | "sí"))
}

async fn watch(store: PlantStore) -> Result<()> {
    let _listener = store
        .spawn_remote_listener()
        .await
        .context("Este backend no puede avisar cambios en vivo")?;
    let mut changes = store.subscribe();
    info!(doc_id = store.doc_id(), "observando cambios");

    render_route(&store, Route::Plant)?;
    loop {
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                println!();
                render_route(&store, Route::Plant)?;
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}
