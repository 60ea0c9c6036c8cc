//! Intermediate SQL statement tree.
//!
//! The compiler assembles these clause objects and renders them once at the
//! end. Bind values live inside the tree next to the placeholder that uses
//! them, so rendering emits `?` markers and values in the same order.

use std::fmt::{self, Write as _};

use serde::{Deserialize, Serialize};

use crate::query::ast::{CompareOp, Direction};
use crate::query::value::Value;

/// How compound selects are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// `(left) INTERSECT (right)`.
    Ansi,
    /// `SELECT * FROM (left) INTERSECT SELECT * FROM (right)`; SQLite rejects
    /// parenthesised compound operands.
    #[default]
    Sqlite,
}

/// `alias.column`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    /// Table alias.
    pub alias: String,
    /// Column name.
    pub column: String,
}

impl ColumnRef {
    /// Column `column` of the table aliased `alias`.
    pub fn new(alias: impl Into<String>, column: impl Into<String>) -> Self {
        ColumnRef {
            alias: alias.into(),
            column: column.into(),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.alias, self.column)
    }
}

/// `schema.table`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    /// Schema prefix.
    pub schema: String,
    /// Table name.
    pub name: String,
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Binary comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl From<CompareOp> for BinaryOp {
    fn from(op: CompareOp) -> Self {
        match op {
            CompareOp::Eq => BinaryOp::Eq,
            CompareOp::Ne => BinaryOp::Ne,
            CompareOp::Lt => BinaryOp::Lt,
            CompareOp::Le => BinaryOp::Le,
            CompareOp::Gt => BinaryOp::Gt,
            CompareOp::Ge => BinaryOp::Ge,
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        })
    }
}

/// Boolean condition in `ON` and `WHERE` clauses.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `column op ?` with the bound value.
    Compare {
        /// Compared column.
        column: ColumnRef,
        /// Operator.
        op: BinaryOp,
        /// Bound value.
        value: Value,
    },
    /// `left = right`.
    ColumnsEqual(ColumnRef, ColumnRef),
    /// `column IS NULL`.
    IsNull(ColumnRef),
    /// `column IS NOT NULL`.
    IsNotNull(ColumnRef),
    /// `column IN (k1, k2, ...)` over literal keys.
    In {
        /// Tested column.
        column: ColumnRef,
        /// Literal keys.
        keys: Vec<i64>,
    },
    /// Conjunction.
    And(Vec<Condition>),
    /// Disjunction.
    Or(Vec<Condition>),
}

impl Condition {
    /// Conjunction of `self` and `other`, flattening nested conjunctions.
    pub fn and(self, other: Condition) -> Condition {
        let mut parts = match self {
            Condition::And(parts) => parts,
            single => vec![single],
        };
        match other {
            Condition::And(more) => parts.extend(more),
            single => parts.push(single),
        }
        Condition::And(parts)
    }
}

/// Join flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// `JOIN`
    Inner,
    /// `LEFT JOIN`
    LeftOuter,
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JoinKind::Inner => "JOIN",
            JoinKind::LeftOuter => "LEFT JOIN",
        })
    }
}

/// One join of a `FROM` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    /// Join flavour.
    pub kind: JoinKind,
    /// Joined table.
    pub table: TableRef,
    /// Alias of the joined table.
    pub alias: String,
    /// Join condition.
    pub on: Condition,
}

/// Source of a `FROM` clause.
#[derive(Debug, Clone, PartialEq)]
pub enum FromSource {
    /// Stored table.
    Table(TableRef),
    /// Sub-query.
    Derived(Box<QueryExpr>),
}

/// Select list.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// Explicit columns.
    Columns(Vec<ColumnRef>),
    /// `COUNT(column)`.
    Count(ColumnRef),
}

/// `ORDER BY` term.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderTerm {
    /// Sorted column.
    pub column: ColumnRef,
    /// Direction.
    pub direction: Direction,
}

/// One `SELECT`.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    /// `SELECT DISTINCT`.
    pub distinct: bool,
    /// Select list.
    pub projection: Projection,
    /// Source of the first table.
    pub from: FromSource,
    /// Alias of the first table.
    pub alias: String,
    /// Joins in emission order.
    pub joins: Vec<Join>,
    /// `WHERE` condition.
    pub filter: Option<Condition>,
    /// `ORDER BY` terms.
    pub order_by: Vec<OrderTerm>,
}

/// Set operator combining two selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOp {
    /// `INTERSECT`
    Intersect,
    /// `UNION`
    Union,
    /// `EXCEPT`
    Except,
}

impl fmt::Display for SetOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SetOp::Intersect => "INTERSECT",
            SetOp::Union => "UNION",
            SetOp::Except => "EXCEPT",
        })
    }
}

/// A select or a compound of two query expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryExpr {
    /// Plain select.
    Select(Select),
    /// `left op right`.
    Compound {
        /// Set operator.
        op: SetOp,
        /// Left operand.
        left: Box<QueryExpr>,
        /// Right operand.
        right: Box<QueryExpr>,
    },
}

impl QueryExpr {
    /// Combines two expressions with a set operator.
    pub fn compound(op: SetOp, left: QueryExpr, right: QueryExpr) -> QueryExpr {
        QueryExpr::Compound {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Renders SQL text and the bind values in placeholder order.
    pub fn render(&self, dialect: Dialect) -> Rendered {
        let mut writer = Writer {
            dialect,
            sql: String::new(),
            values: Vec::new(),
        };
        writer.query(self);
        Rendered {
            sql: writer.sql,
            values: writer.values,
        }
    }
}

/// Rendered statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    /// SQL text with `?` placeholders.
    pub sql: String,
    /// Bind values, one per placeholder.
    pub values: Vec<Value>,
}

struct Writer {
    dialect: Dialect,
    sql: String,
    values: Vec<Value>,
}

impl Writer {
    fn push(&mut self, text: impl fmt::Display) {
        // Writing into a String cannot fail.
        let _ = write!(self.sql, "{text}");
    }

    fn query(&mut self, query: &QueryExpr) {
        match query {
            QueryExpr::Select(select) => self.select(select),
            QueryExpr::Compound { op, left, right } => {
                let (open, close) = match self.dialect {
                    Dialect::Ansi => ("(", ")"),
                    Dialect::Sqlite => ("SELECT * FROM (", ")"),
                };
                self.push(open);
                self.query(left);
                self.push(close);
                self.push(format_args!("\n{op}\n"));
                self.push(open);
                self.query(right);
                self.push(close);
            }
        }
    }

    fn select(&mut self, select: &Select) {
        self.push("SELECT ");
        if select.distinct {
            self.push("DISTINCT ");
        }
        match &select.projection {
            Projection::Columns(columns) => {
                for (i, column) in columns.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.push(column);
                }
            }
            Projection::Count(column) => self.push(format_args!("COUNT({column})")),
        }
        self.push("\nFROM ");
        match &select.from {
            FromSource::Table(table) => self.push(table),
            FromSource::Derived(inner) => {
                self.push("(\n");
                self.query(inner);
                self.push("\n)");
            }
        }
        self.push(format_args!(" {}", select.alias));
        for join in &select.joins {
            self.push(format_args!("\n{} {} {} ON ", join.kind, join.table, join.alias));
            self.condition(&join.on, false);
        }
        if let Some(filter) = &select.filter {
            self.push("\nWHERE ");
            self.condition(filter, false);
        }
        if !select.order_by.is_empty() {
            self.push("\nORDER BY ");
            for (i, term) in select.order_by.iter().enumerate() {
                if i > 0 {
                    self.push(", ");
                }
                self.push(format_args!("{} {}", term.column, term.direction));
            }
        }
    }

    fn condition(&mut self, condition: &Condition, nested: bool) {
        match condition {
            Condition::Compare { column, op, value } => {
                self.push(format_args!("{column} {op} ?"));
                self.values.push(value.clone());
            }
            Condition::ColumnsEqual(left, right) => self.push(format_args!("{left} = {right}")),
            Condition::IsNull(column) => self.push(format_args!("{column} IS NULL")),
            Condition::IsNotNull(column) => self.push(format_args!("{column} IS NOT NULL")),
            Condition::In { column, keys } => {
                self.push(format_args!("{column} IN ("));
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.push(key);
                }
                self.push(")");
            }
            Condition::And(parts) => self.junction(parts, " AND ", nested),
            Condition::Or(parts) => self.junction(parts, " OR ", true),
        }
    }

    fn junction(&mut self, parts: &[Condition], word: &str, parenthesize: bool) {
        let parenthesize = parenthesize && parts.len() > 1;
        if parenthesize {
            self.push("(");
        }
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                self.push(word);
            }
            self.condition(part, true);
        }
        if parenthesize {
            self.push(")");
        }
    }
}
