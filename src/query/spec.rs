//! JSON query descriptions.
//!
//! A [`QuerySpec`] names paths as dotted strings and literals as tagged
//! values; [`QuerySpec::into_query`] resolves it against a [`TypeModel`]
//! through the same template API programmatic callers use.

use std::collections::BTreeMap;

use serde::Deserialize;
use thiserror::Error;

use crate::model::TypeModel;
use crate::query::ast::{CompareOp, Direction, Expr, Operand};
use crate::query::builder::{self, AnyPath, Template};
use crate::query::errors::QueryExpressionError;
use crate::query::finder::Query;
use crate::query::value::Value;
use crate::types::EntityReference;

/// Failures while reading a query description.
#[derive(Debug, Error)]
pub enum SpecError {
    /// The document is not valid JSON for a query.
    #[error("invalid query document: {0}")]
    Json(#[from] serde_json::Error),
    /// A path or predicate does not fit the model.
    #[error(transparent)]
    Expression(#[from] QueryExpressionError),
    /// The predicate does not apply to the path it names.
    #[error("{0}")]
    Message(String),
}

impl SpecError {
    /// Stable error code.
    pub fn code(&self) -> &'static str {
        match self {
            SpecError::Json(_) => "Json",
            SpecError::Expression(e) => e.code(),
            SpecError::Message(_) => "InvalidSpec",
        }
    }
}

type Result<T> = std::result::Result<T, SpecError>;

/// JSON-deserializable query.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySpec {
    /// Result type name.
    pub result_type: String,
    /// Optional filter tree.
    #[serde(default)]
    pub filter: Option<FilterSpec>,
    /// Order-by segments.
    #[serde(default)]
    pub order_by: Vec<OrderSpec>,
    /// Rows to skip.
    #[serde(default)]
    pub first_result: Option<u64>,
    /// Row limit.
    #[serde(default)]
    pub max_results: Option<i64>,
    /// Variable bindings.
    #[serde(default)]
    pub variables: BTreeMap<String, LiteralSpec>,
}

impl QuerySpec {
    /// Parses a JSON document.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Resolves paths against `model` and builds the query.
    pub fn into_query(self, model: &TypeModel) -> Result<Query> {
        let template = model.template(&self.result_type)?;
        let mut query = Query::new(self.result_type.clone());
        if let Some(filter) = self.filter {
            query = query.filter(filter.into_expr(&template)?);
        }
        for segment in self.order_by {
            let path = template.path(&segment.path)?;
            query = query.order_by(builder::order_by(&path, segment.direction.into()));
        }
        if let Some(first) = self.first_result {
            query = query.first_result(first);
        }
        if let Some(max) = self.max_results {
            query = query.max_results(max);
        }
        for (name, literal) in self.variables {
            query = query.set_variable(name, literal.into_value());
        }
        Ok(query)
    }
}

/// Order-by segment.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSpec {
    /// Dotted property path.
    pub path: String,
    /// Direction, ascending by default.
    #[serde(default)]
    pub direction: DirectionSpec,
}

/// Sort direction.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectionSpec {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl From<DirectionSpec> for Direction {
    fn from(value: DirectionSpec) -> Self {
        match value {
            DirectionSpec::Asc => Direction::Asc,
            DirectionSpec::Desc => Direction::Desc,
        }
    }
}

/// Filter tree node.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FilterSpec {
    /// `path = value`; on an association path compares the target identity.
    Eq {
        /// Dotted path.
        path: String,
        /// Operand.
        value: OperandSpec,
    },
    /// `path != value`.
    Ne {
        /// Dotted path.
        path: String,
        /// Operand.
        value: OperandSpec,
    },
    /// `path < value`.
    Lt {
        /// Dotted path.
        path: String,
        /// Operand.
        value: OperandSpec,
    },
    /// `path <= value`.
    Le {
        /// Dotted path.
        path: String,
        /// Operand.
        value: OperandSpec,
    },
    /// `path > value`.
    Gt {
        /// Dotted path.
        path: String,
        /// Operand.
        value: OperandSpec,
    },
    /// `path >= value`.
    Ge {
        /// Dotted path.
        path: String,
        /// Operand.
        value: OperandSpec,
    },
    /// Property or association is null.
    IsNull {
        /// Dotted path.
        path: String,
    },
    /// Property or association is not null.
    IsNotNull {
        /// Dotted path.
        path: String,
    },
    /// Collection, many-association or named-association contains a value.
    Contains {
        /// Dotted path.
        path: String,
        /// Element or entity.
        value: OperandSpec,
    },
    /// Collection contains every value.
    ContainsAll {
        /// Dotted path.
        path: String,
        /// Elements.
        values: Vec<OperandSpec>,
    },
    /// Named-association has an entry name.
    ContainsName {
        /// Dotted path.
        path: String,
        /// Entry name.
        name: OperandSpec,
    },
    /// String property matches a regular expression.
    Matches {
        /// Dotted path.
        path: String,
        /// Pattern matched against the whole string.
        pattern: String,
    },
    /// Every operand holds.
    And {
        /// Operands.
        operands: Vec<FilterSpec>,
    },
    /// Some operand holds.
    Or {
        /// Operands.
        operands: Vec<FilterSpec>,
    },
    /// Operand does not hold.
    Not {
        /// Negated filter.
        operand: Box<FilterSpec>,
    },
    /// Query text for an external engine.
    Native {
        /// Language tag.
        language: String,
        /// Query text.
        query: String,
    },
}

impl FilterSpec {
    fn into_expr(self, template: &Template<'_>) -> Result<Expr> {
        let comparison = |op: CompareOp, path: &str, value: OperandSpec| -> Result<Expr> {
            match template.resolve(path)? {
                AnyPath::Association(association) if op == CompareOp::Eq => {
                    match value.into_operand() {
                        Operand::Literal(literal) => match literal.as_identity() {
                            Some(identity) => Ok(builder::eq_association(&association, identity)),
                            None => Err(SpecError::Message(format!(
                                "association '{path}' can only be compared with an identity"
                            ))),
                        },
                        Operand::Variable(_) => Err(SpecError::Message(format!(
                            "association '{path}' needs a literal identity"
                        ))),
                    }
                }
                other => {
                    let property = into_property(other, path)?;
                    Ok(builder::compare(op, &property, value.into_operand())?)
                }
            }
        };
        match self {
            FilterSpec::Eq { path, value } => comparison(CompareOp::Eq, &path, value),
            FilterSpec::Ne { path, value } => comparison(CompareOp::Ne, &path, value),
            FilterSpec::Lt { path, value } => comparison(CompareOp::Lt, &path, value),
            FilterSpec::Le { path, value } => comparison(CompareOp::Le, &path, value),
            FilterSpec::Gt { path, value } => comparison(CompareOp::Gt, &path, value),
            FilterSpec::Ge { path, value } => comparison(CompareOp::Ge, &path, value),
            FilterSpec::IsNull { path } => Self::null_check(template, &path, true),
            FilterSpec::IsNotNull { path } => Self::null_check(template, &path, false),
            FilterSpec::Contains { path, value } => match template.resolve(&path)? {
                AnyPath::Property(property) => {
                    Ok(builder::contains(&property, value.into_operand())?)
                }
                AnyPath::ManyAssociation(many) => {
                    Ok(builder::contains_entity(&many, value.into_operand()))
                }
                AnyPath::NamedAssociation(named) => {
                    Ok(builder::contains_named_entity(&named, value.into_operand()))
                }
                AnyPath::Association(_) => Err(SpecError::Message(format!(
                    "'{path}' is a single association; use eq"
                ))),
            },
            FilterSpec::ContainsAll { path, values } => {
                let property = template.path(&path)?;
                Ok(builder::contains_all(
                    &property,
                    values.into_iter().map(OperandSpec::into_operand),
                )?)
            }
            FilterSpec::ContainsName { path, name } => {
                let named = template.resolve(&path)?.into_named_association()?;
                Ok(builder::contains_name(&named, name.into_operand()))
            }
            FilterSpec::Matches { path, pattern } => {
                let property = template.path(&path)?;
                Ok(builder::matches(&property, &pattern)?)
            }
            FilterSpec::And { operands } => Self::fold(template, operands, Expr::And),
            FilterSpec::Or { operands } => Self::fold(template, operands, Expr::Or),
            FilterSpec::Not { operand } => Ok(!operand.into_expr(template)?),
            FilterSpec::Native { language, query } => Ok(builder::native(language, query)),
        }
    }

    fn null_check(template: &Template<'_>, path: &str, is_null: bool) -> Result<Expr> {
        Ok(match template.resolve(path)? {
            AnyPath::Property(property) if is_null => builder::is_null(&property),
            AnyPath::Property(property) => builder::is_not_null(&property),
            AnyPath::Association(association) if is_null => {
                builder::association_is_null(&association)
            }
            AnyPath::Association(association) => builder::association_is_not_null(&association),
            _ => {
                return Err(SpecError::Message(format!(
                    "'{path}' is multi-valued and cannot be null-checked"
                )))
            }
        })
    }

    fn fold(
        template: &Template<'_>,
        operands: Vec<FilterSpec>,
        wrap: fn(Vec<Expr>) -> Expr,
    ) -> Result<Expr> {
        let mut exprs = operands
            .into_iter()
            .map(|operand| operand.into_expr(template))
            .collect::<Result<Vec<_>>>()?;
        Ok(if exprs.len() == 1 {
            exprs.remove(0)
        } else {
            wrap(exprs)
        })
    }
}

fn into_property(path: AnyPath, dotted: &str) -> Result<crate::query::path::PropertyPath> {
    match path {
        AnyPath::Property(property) => Ok(property),
        _ => Err(SpecError::Message(format!("'{dotted}' is not a property"))),
    }
}

/// Right-hand side of a predicate: a variable reference or a literal.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OperandSpec {
    /// `{"variable": "name"}`.
    Variable {
        /// Variable name.
        variable: String,
    },
    /// Tagged literal.
    Literal(LiteralSpec),
}

impl OperandSpec {
    fn into_operand(self) -> Operand {
        match self {
            OperandSpec::Variable { variable } => Operand::Variable(variable),
            OperandSpec::Literal(literal) => Operand::Literal(literal.into_value()),
        }
    }
}

/// Literal value.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum LiteralSpec {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// String value.
    String(String),
    /// Entity reference by identity.
    Entity(String),
}

impl LiteralSpec {
    fn into_value(self) -> Value {
        match self {
            LiteralSpec::Null => Value::Null,
            LiteralSpec::Bool(v) => Value::Bool(v),
            LiteralSpec::Int(v) => Value::Int(v),
            LiteralSpec::Float(v) => Value::Float(v),
            LiteralSpec::String(v) => Value::String(v),
            LiteralSpec::Entity(v) => Value::Entity(EntityReference::new(v)),
        }
    }
}
