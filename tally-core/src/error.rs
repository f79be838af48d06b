//! Error type shared by the tally library crates.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A source adapter produced rows that do not fit the canonical record shape.
    /// Raised before anything is resolved or merged.
    #[error("source format error in {label}: {message}")]
    SourceFormat { label: String, message: String },

    /// The persisted history could not be read. Never replaced by an empty history.
    #[error("transaction history unavailable: {0}")]
    HistoryUnavailable(String),

    #[error("{table} table not found at {}", path.display())]
    TableMissing { table: String, path: PathBuf },

    #[error("{table} table: {message}")]
    Storage { table: String, message: String },

    #[error("record '{0}' reached the merge without a resolved category")]
    UnresolvedCategory(String),

    /// The operator closed input while being asked for a category.
    #[error("categorization aborted by operator while resolving '{0}'")]
    Aborted(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn source_format(label: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SourceFormat {
            label: label.into(),
            message: message.into(),
        }
    }

    pub fn storage(table: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Storage {
            table: table.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
