#![forbid(unsafe_code)]
#![allow(missing_docs)]

use thiserror::Error;

use crate::model::{MemberKind, ValueType};
use crate::types::QualifiedName;

/// Failures while walking a reference chain over composite state.
///
/// `satisfied_by` converts these into "not satisfied"; they only escape
/// through the typed `map` functions on paths.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TraversalError {
    /// A many- or named-association was used as a non-terminal hop.
    #[error("cannot traverse through {kind} '{through}'")]
    MultiValuedTraversal { through: String, kind: MemberKind },
    /// The reached state does not declare the accessor.
    #[error("{type_name} has no {kind} '{name}'")]
    UnknownAccessor {
        type_name: String,
        name: QualifiedName,
        kind: MemberKind,
    },
    /// A property resolved to a scalar but the chain continues past it.
    #[error("'{path}' resolved to a scalar and cannot be traversed")]
    NotComposite { path: String },
}

impl TraversalError {
    pub fn code(&self) -> &'static str {
        match self {
            TraversalError::MultiValuedTraversal { .. } => "MultiValuedTraversal",
            TraversalError::UnknownAccessor { .. } => "UnknownAccessor",
            TraversalError::NotComposite { .. } => "NotComposite",
        }
    }
}

/// Build-time failures while constructing paths and expressions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryExpressionError {
    /// The type is not part of the model.
    #[error("unknown type '{0}'")]
    UnknownType(String),
    /// The member is not declared on the type or its supertypes.
    #[error("type '{type_name}' has no member '{member}'")]
    UnknownMember { type_name: String, member: String },
    /// The member exists but is of a different accessor category.
    #[error("'{member}' is a {found}, not a {expected}")]
    WrongAccessorKind {
        member: QualifiedName,
        found: MemberKind,
        expected: MemberKind,
    },
    /// The member or its value type is excluded from queries.
    #[error("'{0}' is not queryable")]
    NotQueryable(String),
    /// A collection predicate was built over a non-collection property.
    #[error("'{0}' is not a collection property")]
    NotACollection(String),
    /// A regular-expression predicate was built over a non-string property.
    #[error("'{0}' is not a string property")]
    NotAString(String),
    /// The regular expression did not compile.
    #[error("invalid regular expression '{pattern}': {reason}")]
    InvalidRegex { pattern: String, reason: String },
    /// An ordering operator was given a literal without a total order.
    #[error("literal {0} cannot be used with an ordering operator")]
    NotOrderable(String),
    /// A comparison was given a null literal.
    #[error("'{0}' cannot be compared with null, use is_null")]
    NullOperand(String),
    /// A comparison literal does not fit the property's declared type.
    #[error("'{path}' holds {expected:?} and cannot be compared with {found}")]
    TypeMismatch {
        path: String,
        expected: ValueType,
        found: String,
    },
    /// The path continues past a member that cannot be traversed.
    #[error("cannot continue traversal past '{0}'")]
    NotTraversable(String),
    /// A dotted path was empty or had an empty segment.
    #[error("malformed path '{0}'")]
    MalformedPath(String),
}

impl QueryExpressionError {
    pub fn code(&self) -> &'static str {
        match self {
            QueryExpressionError::UnknownType(_) => "UnknownType",
            QueryExpressionError::UnknownMember { .. } => "UnknownMember",
            QueryExpressionError::WrongAccessorKind { .. } => "WrongAccessorKind",
            QueryExpressionError::NotQueryable(_) => "NotQueryable",
            QueryExpressionError::NotACollection(_) => "NotACollection",
            QueryExpressionError::NotAString(_) => "NotAString",
            QueryExpressionError::InvalidRegex { .. } => "InvalidRegex",
            QueryExpressionError::NotOrderable(_) => "NotOrderable",
            QueryExpressionError::NullOperand(_) => "NullOperand",
            QueryExpressionError::TypeMismatch { .. } => "TypeMismatch",
            QueryExpressionError::NotTraversable(_) => "NotTraversable",
            QueryExpressionError::MalformedPath(_) => "MalformedPath",
        }
    }
}

/// Result alias for expression construction.
pub type Result<T> = std::result::Result<T, QueryExpressionError>;

/// Failures surfaced by entity finders.
#[derive(Debug, Error)]
pub enum EntityFinderError {
    /// The query could not be compiled to SQL.
    #[error("query compilation failed: {0}")]
    Compile(#[from] crate::sql::SqlQueryError),
    /// The database rejected the statement; the driver error is kept as source.
    #[error("entity query failed")]
    Sql(#[from] rusqlite::Error),
    /// The result type is not part of the model.
    #[error("unknown result type '{0}'")]
    UnknownResultType(String),
}

impl EntityFinderError {
    pub fn code(&self) -> &'static str {
        match self {
            EntityFinderError::Compile(_) => "Compile",
            EntityFinderError::Sql(_) => "Sql",
            EntityFinderError::UnknownResultType(_) => "UnknownResultType",
        }
    }
}
