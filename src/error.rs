#![allow(missing_docs)]

use thiserror::Error;

use crate::config::ConfigError;
use crate::model::ModelError;
use crate::query::errors::{EntityFinderError, QueryExpressionError, TraversalError};
use crate::query::spec::SpecError;
use crate::sql::{IndexingError, SqlQueryError};

pub type Result<T> = std::result::Result<T, Error>;

/// Any failure surfaced by the crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Expression(#[from] QueryExpressionError),
    #[error(transparent)]
    Traversal(#[from] TraversalError),
    #[error(transparent)]
    Spec(#[from] SpecError),
    #[error(transparent)]
    Compile(#[from] SqlQueryError),
    #[error(transparent)]
    Finder(#[from] EntityFinderError),
    #[error(transparent)]
    Indexing(#[from] IndexingError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Stable code of the underlying failure.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Model(e) => e.code(),
            Error::Expression(e) => e.code(),
            Error::Traversal(e) => e.code(),
            Error::Spec(e) => e.code(),
            Error::Compile(e) => e.code(),
            Error::Finder(e) => e.code(),
            Error::Indexing(e) => e.code(),
            Error::Config(e) => e.code(),
            Error::Sql(_) => "Sql",
            Error::Io(_) => "Io",
            Error::InvalidArgument(_) => "InvalidArgument",
        }
    }
}
