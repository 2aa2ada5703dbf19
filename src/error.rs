//! Error types for the mining pipeline.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while mining a repository or running the pipeline.
#[derive(Error, Debug)]
pub enum MineError {
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("history command failed: {0}")]
    History(String),

    #[error("unable to clone project {url}, id {id}: {reason}")]
    CloneFailed { url: String, id: u64, reason: String },

    #[error("consistency violation: {0}")]
    Consistency(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("metadata request failed: {0}")]
    Metadata(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("worker panicked: {0}")]
    Panicked(String),
}

impl MineError {
    /// Wrap an I/O error together with the path it concerns.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        MineError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, MineError>;

/// Attach a path to `std::io::Result` values.
pub trait IoContext<T> {
    fn at(self, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn at(self, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|e| MineError::io(path, e))
    }
}
