//! Bootstrap errors shared by the pipescan crates

use std::path::PathBuf;
use thiserror::Error;

/// Result type for bootstrap operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Root folder or config file could not be created or written
    #[error("Root folder I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Config file could not be read, parsed or serialized
    #[error("Config file {}: {message}", path.display())]
    Config { path: PathBuf, message: String },
}

impl Error {
    pub(crate) fn config(path: &std::path::Path, message: impl std::fmt::Display) -> Self {
        Error::Config {
            path: path.to_path_buf(),
            message: message.to_string(),
        }
    }
}
