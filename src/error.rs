use thiserror::Error;

#[derive(Error, Debug)]
pub enum BoardError {
    #[error("config error: {0}")]
    ConfigInvalid(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("message parse error: {0}")]
    Parse(String),

    #[error("price store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
