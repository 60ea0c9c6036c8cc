//! Entity query expressions, in-memory evaluation and SQL compilation.
//!
//! Build filters from a [`model::TypeModel`] with the template API in
//! [`query::builder`], evaluate them in process with
//! [`query::CollectionEntityFinder`], or compile them to one SQL statement
//! with [`sql::SqlQueryParser`] and run them through [`sql::SqlEntityFinder`].

#![warn(missing_docs)]

pub mod config;
/// Crate-level error aggregate.
pub mod error;
/// Logging setup.
pub mod logging;
pub mod model;
pub mod query;
pub mod sql;
pub mod types;

pub use error::{Error, Result};
pub use model::{EntityState, TypeModel, ValueState};
pub use query::{EntityFinder, Expr, Query, Value};
pub use types::{EntityReference, QualifiedName};
