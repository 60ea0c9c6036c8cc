//! Expression grammar for entity queries.
//!
//! Expressions are immutable trees of predicates over property and
//! association paths. They are shared between the in-memory evaluator and
//! the SQL compiler and carry no execution state.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Not;

use regex::Regex;

use crate::query::path::{AssociationPath, ManyAssociationPath, NamedAssociationPath, PropertyPath};
use crate::query::value::Value;

/// Values bound to named variables for one query execution.
pub type Variables = BTreeMap<String, Value>;

/// Comparison operators.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CompareOp {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
}

impl CompareOp {
    /// True for `<`, `<=`, `>` and `>=`.
    pub fn is_ordering(self) -> bool {
        !matches!(self, CompareOp::Eq | CompareOp::Ne)
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        })
    }
}

/// Right-hand side of a predicate: a literal or a named variable.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    /// Literal value.
    Literal(Value),
    /// Variable resolved when the query runs.
    Variable(String),
}

impl Operand {
    /// Resolves the operand against bound variables.
    pub fn resolve<'a>(&'a self, variables: &'a Variables) -> Option<&'a Value> {
        match self {
            Operand::Literal(value) => Some(value),
            Operand::Variable(name) => variables.get(name),
        }
    }

    fn bind(&self, variables: &Variables) -> Operand {
        match self {
            Operand::Variable(name) => match variables.get(name) {
                Some(value) => Operand::Literal(value.clone()),
                None => self.clone(),
            },
            literal => literal.clone(),
        }
    }
}

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        Operand::Literal(value)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Literal(value) => write!(f, "{value}"),
            Operand::Variable(name) => write!(f, "?{name}"),
        }
    }
}

/// Regular expression matched against the whole string.
#[derive(Clone, Debug)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    /// Compiles a pattern anchored at both ends.
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!("^(?:{source})$"))?;
        Ok(Pattern {
            source: source.to_owned(),
            regex,
        })
    }

    /// The pattern as written.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Full-string match.
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// Pattern of a `matches` predicate.
#[derive(Clone, Debug, PartialEq)]
pub enum MatchPattern {
    /// Compiled pattern.
    Regex(Pattern),
    /// Variable holding the pattern text.
    Variable(String),
}

/// Boolean predicate over a composite.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// Property compared with an operand.
    Comparison {
        /// Operator.
        op: CompareOp,
        /// Compared property.
        path: PropertyPath,
        /// Right-hand side.
        operand: Operand,
    },
    /// Property null check.
    PropertyNull {
        /// Checked property.
        path: PropertyPath,
        /// `true` for "is null", `false` for "is not null".
        is_null: bool,
    },
    /// Association null check.
    AssociationNull {
        /// Checked association.
        path: AssociationPath,
        /// `true` for "is null", `false` for "is not null".
        is_null: bool,
    },
    /// Collection property contains a value.
    Contains {
        /// Collection property.
        path: PropertyPath,
        /// Required element.
        operand: Operand,
    },
    /// Collection property contains every value.
    ContainsAll {
        /// Collection property.
        path: PropertyPath,
        /// Required elements.
        operands: Vec<Operand>,
    },
    /// Many-association contains an entity.
    ManyAssociationContains {
        /// Many-association.
        path: ManyAssociationPath,
        /// Entity looked up by identity.
        operand: Operand,
    },
    /// Named-association contains an entity under any name.
    NamedAssociationContains {
        /// Named-association.
        path: NamedAssociationPath,
        /// Entity looked up by identity.
        operand: Operand,
    },
    /// Named-association has an entry with the given name.
    NamedAssociationContainsName {
        /// Named-association.
        path: NamedAssociationPath,
        /// Entry name.
        name: Operand,
    },
    /// String property matches a regular expression.
    Matches {
        /// String property.
        path: PropertyPath,
        /// Pattern.
        pattern: MatchPattern,
    },
    /// Every operand holds.
    And(Vec<Expr>),
    /// At least one operand holds.
    Or(Vec<Expr>),
    /// The operand does not hold.
    Not(Box<Expr>),
    /// Query text for an external engine, identified by language.
    Native {
        /// Query language tag.
        language: String,
        /// Opaque query text.
        query: String,
    },
}

impl Expr {
    /// Conjunction with `other`. An existing conjunction gains `other` as its
    /// first operand instead of being nested.
    pub fn and(self, other: Expr) -> Expr {
        match self {
            Expr::And(mut operands) => {
                operands.insert(0, other);
                Expr::And(operands)
            }
            this => Expr::And(vec![this, other]),
        }
    }

    /// Disjunction with `other`, flattened like [`Expr::and`].
    pub fn or(self, other: Expr) -> Expr {
        match self {
            Expr::Or(mut operands) => {
                operands.insert(0, other);
                Expr::Or(operands)
            }
            this => Expr::Or(vec![this, other]),
        }
    }

    /// Replaces bound variables with their values. Unbound variables stay.
    pub fn bind(&self, variables: &Variables) -> Expr {
        match self {
            Expr::Comparison { op, path, operand } => Expr::Comparison {
                op: *op,
                path: path.clone(),
                operand: operand.bind(variables),
            },
            Expr::Contains { path, operand } => Expr::Contains {
                path: path.clone(),
                operand: operand.bind(variables),
            },
            Expr::ContainsAll { path, operands } => Expr::ContainsAll {
                path: path.clone(),
                operands: operands.iter().map(|o| o.bind(variables)).collect(),
            },
            Expr::ManyAssociationContains { path, operand } => Expr::ManyAssociationContains {
                path: path.clone(),
                operand: operand.bind(variables),
            },
            Expr::NamedAssociationContains { path, operand } => Expr::NamedAssociationContains {
                path: path.clone(),
                operand: operand.bind(variables),
            },
            Expr::NamedAssociationContainsName { path, name } => {
                Expr::NamedAssociationContainsName {
                    path: path.clone(),
                    name: name.bind(variables),
                }
            }
            Expr::Matches {
                path,
                pattern: MatchPattern::Variable(name),
            } => {
                let compiled = match variables.get(name) {
                    Some(Value::String(source)) => Pattern::new(source).ok(),
                    _ => None,
                };
                Expr::Matches {
                    path: path.clone(),
                    pattern: compiled
                        .map(MatchPattern::Regex)
                        .unwrap_or_else(|| MatchPattern::Variable(name.clone())),
                }
            }
            Expr::And(operands) => Expr::And(operands.iter().map(|e| e.bind(variables)).collect()),
            Expr::Or(operands) => Expr::Or(operands.iter().map(|e| e.bind(variables)).collect()),
            Expr::Not(inner) => Expr::Not(Box::new(inner.bind(variables))),
            other => other.clone(),
        }
    }
}

impl Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }
}

fn join(f: &mut fmt::Formatter<'_>, operands: &[Expr], word: &str) -> fmt::Result {
    f.write_str("( ")?;
    for (i, operand) in operands.iter().enumerate() {
        if i > 0 {
            write!(f, " {word} ")?;
        }
        write!(f, "{operand}")?;
    }
    f.write_str(" )")
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Comparison { op, path, operand } => write!(f, "{path} {op} {operand}"),
            Expr::PropertyNull { path, is_null } => {
                write!(f, "{path} is {}null", if *is_null { "" } else { "not " })
            }
            Expr::AssociationNull { path, is_null } => {
                write!(f, "{path} is {}null", if *is_null { "" } else { "not " })
            }
            Expr::Contains { path, operand } => write!(f, "{path} contains {operand}"),
            Expr::ContainsAll { path, operands } => {
                write!(f, "{path} contains all [")?;
                for (i, operand) in operands.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{operand}")?;
                }
                f.write_str("]")
            }
            Expr::ManyAssociationContains { path, operand } => {
                write!(f, "{path} contains {operand}")
            }
            Expr::NamedAssociationContains { path, operand } => {
                write!(f, "{path} contains {operand}")
            }
            Expr::NamedAssociationContainsName { path, name } => {
                write!(f, "{path} contains name {name}")
            }
            Expr::Matches { path, pattern } => match pattern {
                MatchPattern::Regex(p) => write!(f, "{path} matches /{}/", p.source()),
                MatchPattern::Variable(name) => write!(f, "{path} matches ?{name}"),
            },
            Expr::And(operands) => join(f, operands, "and"),
            Expr::Or(operands) => join(f, operands, "or"),
            Expr::Not(inner) => write!(f, "!( {inner} )"),
            Expr::Native { language, query } => write!(f, "{language}:{query}"),
        }
    }
}

/// Sort direction of an order-by segment.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum Direction {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        })
    }
}

/// One order-by segment.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderBy {
    /// Sorted property.
    pub path: PropertyPath,
    /// Direction.
    pub direction: Direction,
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.path, self.direction)
    }
}
