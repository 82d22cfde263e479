use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to read config file at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to initialize logging: {0}")]
    LoggingInit(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
    #[error("failed to resolve storage paths: {details}")]
    StoragePathResolution { details: String },
    #[error("failed to create storage directory {path}: {source}")]
    StorageDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to persist auth session at {path}: {source}")]
    SessionWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode auth session: {0}")]
    SessionEncode(#[source] toml::ser::Error),
    #[error("failed to remove auth session at {path}: {source}")]
    SessionRemove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to initialize async runtime: {0}")]
    RuntimeInit(#[source] std::io::Error),
    #[error("failed to build HTTP client: {0}")]
    HttpClientInit(#[source] reqwest::Error),
}
