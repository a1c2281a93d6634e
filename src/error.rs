// src/error.rs

use crate::validate::ValidationErrors;
use thiserror::Error;

/// Core error types for prodlisting
#[derive(Error, Debug)]
pub enum Error {
    /// The listing document failed schema validation; nothing was written
    #[error("Listing failed validation against the schema:\n{0}")]
    InvalidListing(ValidationErrors),

    /// No product row matches the requested listing
    #[error("The database has no row for {label}, version {version}, and variant {variant}")]
    ListingNotFound {
        label: String,
        version: String,
        variant: String,
    },

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A store operation could not complete for a reason other than SQLite itself
    #[error("Store failure: {0}")]
    StoreFailure(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML read or write errors
    #[error("YAML error in {path}: {source}")]
    Yaml {
        path: String,
        source: serde_yml::Error,
    },

    /// The schema description itself is malformed
    #[error("Invalid schema: {0}")]
    Schema(String),

    /// Configuration file problems
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Database initialization error
    #[error("Failed to initialize database: {0}")]
    InitError(String),

    /// Database not found
    #[error("Database not found at path: {0}")]
    DatabaseNotFound(String),
}

impl Error {
    /// True for failures reading or writing the relational store
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Error::Database(_) | Error::StoreFailure(_))
    }
}

/// Result type alias using prodlisting's Error type
pub type Result<T> = std::result::Result<T, Error>;
