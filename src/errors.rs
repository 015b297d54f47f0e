//! Error types for the libsleuth library.

use std::path::PathBuf;

/// Top-level error enum.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Extraction error in {path}: {message}")]
    Extract { path: PathBuf, message: String },

    #[error("Profile error: {0}")]
    Profile(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
