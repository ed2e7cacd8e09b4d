//! Settings from the environment. Everything has a default so the app runs
//! against a local MongoDB with zero setup; CLI flags override on top.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::ValueEnum;

use crate::views::timer::DEFAULT_SPLASH;

pub const DEFAULT_MONGO_URI: &str = "mongodb://localhost:27017/arbolitos";
pub const DEFAULT_DATABASE: &str = "arbolitos";
pub const DEFAULT_DATA_DIR: &str = "./arbolitos-data";
pub const DEFAULT_DOC_ID: &str = "plant-watering-tracker";
pub const DEFAULT_APP_NAME: &str = "PlantWateringTracker";
const DEFAULT_POLL_MS: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    Mongo,
    File,
    Memory,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as ValueEnum>::from_str(s, true)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Env: `ARBOLITOS_BACKEND`
    pub backend: BackendKind,
    /// Env: `MONGO_URI`
    pub mongo_uri: String,
    /// Env: `ARBOLITOS_DB`
    pub database: String,
    /// Directory for the file backend. Env: `ARBOLITOS_DATA_DIR`
    pub data_dir: PathBuf,
    /// Env: `ARBOLITOS_DOC_ID`
    pub doc_id: String,
    /// Env: `ARBOLITOS_APP_NAME`
    pub app_name: String,
    /// Env: `ARBOLITOS_LOADING_MS`
    pub splash: Duration,
    /// How often the file backend looks for outside edits. Env: `ARBOLITOS_POLL_MS`
    pub poll_interval: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            backend: env_parse("ARBOLITOS_BACKEND", BackendKind::Mongo),
            mongo_uri: env_string("MONGO_URI", DEFAULT_MONGO_URI),
            database: env_string("ARBOLITOS_DB", DEFAULT_DATABASE),
            data_dir: PathBuf::from(env_string("ARBOLITOS_DATA_DIR", DEFAULT_DATA_DIR)),
            doc_id: env_string("ARBOLITOS_DOC_ID", DEFAULT_DOC_ID),
            app_name: env_string("ARBOLITOS_APP_NAME", DEFAULT_APP_NAME),
            splash: Duration::from_millis(env_parse(
                "ARBOLITOS_LOADING_MS",
                DEFAULT_SPLASH.as_millis() as u64,
            )),
            poll_interval: Duration::from_millis(env_parse("ARBOLITOS_POLL_MS", DEFAULT_POLL_MS)),
        }
    }

    /// The endpoint reported to the sync engine.
    pub fn sync_url(&self) -> String {
        match self.backend {
            BackendKind::Mongo => self.mongo_uri.clone(),
            BackendKind::File => format!("file://{}", self.data_dir.display()),
            BackendKind::Memory => "memory://".to_string(),
        }
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parsed env var, or `default` when missing or malformed.
pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
