use thiserror::Error;

/// Failures talking to a sync backend.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("error de MongoDB: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("error de E/S: {0}")]
    Io(#[from] std::io::Error),

    #[error("documento inválido: {0}")]
    Json(#[from] serde_json::Error),

    /// The backend went away (dropped channel, closed stream).
    #[error("el backend de sincronización se cerró")]
    Closed,
}

/// Rejections and failures from the plant store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("el nombre no puede estar vacío")]
    EmptyName,

    #[error("'{0}' ya está en la lista de regadores")]
    DuplicateWaterer(String),

    #[error("'{0}' no está en la lista de regadores")]
    UnknownWaterer(String),

    #[error("el nuevo nombre es igual al anterior")]
    UnchangedName,

    #[error("índice {index} fuera de rango (hay {len} riegos)")]
    EntryOutOfRange { index: usize, len: usize },

    #[error(transparent)]
    Sync(#[from] SyncError),
}

pub type Result<T> = std::result::Result<T, StoreError>;
