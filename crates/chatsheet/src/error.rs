//! Error type shared by loading, translation and query execution.

use chatsheet_db::BackendError;
use chatsheet_schema::SchemaError;
use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;
use crate::translator::TranslationError;

#[derive(Debug, Error)]
pub enum Error {
    /// Header or row layout could not be turned into a schema.
    #[error("Schema inference failed: {0}")]
    SchemaInference(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// A cell did not convert to its column's type. Nothing was written.
    #[error("Data coercion failed: {0}")]
    DataCoercion(String),

    #[error("Translation failed: {0}")]
    Translation(#[from] TranslationError),

    /// Validator rejection; the statement never reached the database.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Query execution failed: {0}")]
    Execution(String),

    #[error("Cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] BackendError),
}

impl From<SchemaError> for Error {
    fn from(err: SchemaError) -> Self {
        if err.is_identifier_error() {
            Error::InvalidIdentifier(err.to_string())
        } else if err.is_coercion_error() {
            Error::DataCoercion(err.to_string())
        } else {
            Error::SchemaInference(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
