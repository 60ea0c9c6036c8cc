#![forbid(unsafe_code)]

//! SQL index: layout, compiler, executor and writer.

pub mod bind;
pub mod executor;
pub mod indexer;
pub mod lookup;
pub mod metadata;
pub mod names;
pub mod parser;
pub mod statement;

use thiserror::Error;

use crate::types::QualifiedName;

pub use executor::SqlEntityFinder;
pub use indexer::{IndexingError, SqlIndexer};
pub use metadata::{EntityTypeInfo, IndexingMetadata, IndexingState, QNameInfo};
pub use parser::{CompiledQuery, ResultShape, SqlQueryParser};
pub use statement::Dialect;

/// Failures while compiling a query to SQL.
///
/// All of these point at a caller or model defect rather than at data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqlQueryError {
    /// The predicate or traversal has no SQL translation.
    #[error("unsupported in SQL: {0}")]
    Unsupported(String),
    /// The index layout has no table for a qualified name the query uses.
    #[error("no index table for '{0}'; model and index layout disagree")]
    MissingQNameInfo(QualifiedName),
    /// No indexed entity type is assignable to the result type.
    #[error("no indexed entity type is assignable to '{0}'")]
    UnknownResultType(String),
    /// A variable referenced by the filter has no value.
    #[error("variable '{0}' is not bound")]
    UnboundVariable(String),
}

impl SqlQueryError {
    /// Stable error code.
    pub fn code(&self) -> &'static str {
        match self {
            SqlQueryError::Unsupported(_) => "Unsupported",
            SqlQueryError::MissingQNameInfo(_) => "MissingQNameInfo",
            SqlQueryError::UnknownResultType(_) => "UnknownResultType",
            SqlQueryError::UnboundVariable(_) => "UnboundVariable",
        }
    }
}

/// Result alias for compilation.
pub type Result<T> = std::result::Result<T, SqlQueryError>;
