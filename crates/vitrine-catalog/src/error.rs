//! Catalog error types.
//!
//! These never reach HTTP callers: the public catalog lookups log them and
//! return an empty result instead.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading object media from disk.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Object name has no variants in the catalog
    #[error("unknown object: {0}")]
    UnknownObject(String),

    /// Expected directory is missing
    #[error("directory not found: {}", .0.display())]
    MissingDirectory(PathBuf),

    /// No file of the requested kind in the variant directory
    #[error("no {kind} file in {}", .dir.display())]
    MissingFile { kind: &'static str, dir: PathBuf },

    /// Filesystem read failed
    #[error("failed to read {}: {error}", .path.display())]
    Io {
        path: PathBuf,
        error: std::io::Error,
    },

    /// Segment file pattern failed to compile
    #[error("invalid segment pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// File was not valid JSON
    #[error("failed to parse {}: {error}", .path.display())]
    Json {
        path: PathBuf,
        error: serde_json::Error,
    },
}

impl CatalogError {
    pub(crate) fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            error,
        }
    }
}

/// Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;
