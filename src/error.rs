use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Provider request failed: {0}")]
    Provider(#[from] reqwest::Error),

    #[error("Store unavailable: {message}")]
    Store { message: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    // The provider tag cannot be a field named `source`; thiserror reserves
    // that name for the error cause.
    #[error("Mapping for {source_tag}:{external_id} was linked concurrently")]
    ConflictRace {
        source_tag: String,
        external_id: String,
    },

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;
