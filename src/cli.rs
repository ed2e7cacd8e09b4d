use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::BackendKind;

#[derive(Parser)]
#[command(name = "arbolitos-riego")]
#[command(about = "Una CLI para saber cuándo se regó la planta y quién la regó")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Dónde vive el documento compartido
    #[arg(long, value_enum, global = true)]
    pub backend: Option<BackendKind>,
    /// URI de MongoDB (backend mongo)
    #[arg(long = "mongo-uri", global = true)]
    pub mongo_uri: Option<String>,
    /// Carpeta de documentos (backend file)
    #[arg(long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,
    /// ID del documento de la planta
    #[arg(long = "doc-id", global = true)]
    pub doc_id: Option<String>,
    /// Más detalle en los logs (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ver la planta y cuánto hace que se regó
    View,
    /// Ver regadores e historial de riegos
    History,
    /// Registrar un riego (agrega a la persona si no está en la lista)
    Water {
        /// Quién regó
        person: String,
    },
    /// Administrar la lista de regadores
    #[command(subcommand)]
    Waterer(WatererCommands),
    /// Borrar un riego del historial
    Delete(DeleteArgs),
    /// Abrir una ruta: /, /history o /hello
    Open {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Modo interactivo con navegación entre páginas
    Shell,
    /// Seguir los cambios de otros dispositivos en vivo
    Watch,
}

#[derive(Subcommand, Debug)]
pub enum WatererCommands {
    /// Agregar un regador
    Add {
        name: String,
    },
    /// Cambiar el nombre de un regador
    Rename {
        old: String,
        new: String,
    },
    /// Quitar un regador
    Remove {
        name: String,
    },
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Número del riego tal como aparece en `history` (1 es el más reciente)
    pub entry: usize,
    /// No pedir confirmación
    #[arg(short, long)]
    pub yes: bool,
}
