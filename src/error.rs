// ABOUTME: Top-level error type for ppselect's CLI and driver boundary

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PpError {
    #[error("cannot read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write {path}: {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("bad option: {0}")]
    BadOption(String),

    #[error("{path}:{line}: {message}")]
    Abend {
        path: String,
        line: usize,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, PpError>;
