use std::{io, path::PathBuf};

use thiserror::Error;

use crate::geocoding::GeocodeError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to access {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed input {}: {detail}", .path.display())]
    Parse { path: PathBuf, detail: String },

    #[error("row {row}: geocoding request did not complete")]
    Network {
        row: usize,
        #[source]
        source: GeocodeError,
    },

    #[error("row {row}: unusable geocoding response")]
    InvalidResponse {
        row: usize,
        #[source]
        source: GeocodeError,
    },

    #[error("row {row}: no geocoding match for {query}")]
    NoMatch { row: usize, query: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parse(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            detail: detail.into(),
        }
    }

    /// Attributes a failed lookup to the data row that issued it.
    pub fn lookup(row: usize, source: GeocodeError) -> Self {
        if source.is_network() {
            Self::Network { row, source }
        } else {
            Self::InvalidResponse { row, source }
        }
    }

    /// Errors that only concern one row and may be skipped over when the
    /// caller asks for it. Everything else always aborts the run.
    pub fn is_row_level(&self) -> bool {
        matches!(self, Self::NoMatch { .. } | Self::Network { .. })
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
