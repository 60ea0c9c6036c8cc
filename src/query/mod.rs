#![forbid(unsafe_code)]

//! Entity query expressions and their evaluation.
//!
//! This module provides the expression grammar, the path machinery that
//! resolves it against composite state, the template builder and the
//! finders that run queries.

/// Expression tree for entity queries.
///
/// Defines predicates, boolean composition and order-by segments.
pub mod ast;

/// Template-based construction of paths and expressions.
pub mod builder;

/// Error types for expression construction, traversal and finders.
pub mod errors;

/// In-memory evaluation of expressions.
mod eval;

/// Query descriptions and finders.
pub mod finder;

/// Reference chains over composite members.
pub mod path;

/// JSON query descriptions.
pub mod spec;

/// Runtime values.
pub mod value;

pub use ast::{CompareOp, Direction, Expr, Operand, OrderBy, Variables};
pub use builder::{AnyPath, Template};
pub use errors::{EntityFinderError, QueryExpressionError, TraversalError};
pub use finder::{CollectionEntityFinder, EntityFinder, FinderResult, Query};
pub use path::{AssociationPath, ManyAssociationPath, NamedAssociationPath, PropertyPath};
pub use spec::{QuerySpec, SpecError};
pub use value::Value;
