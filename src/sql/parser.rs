//! Compiles queries into one SQL statement over the entity index.
//!
//! Each leaf predicate becomes an independent sub-select returning
//! `(entity_pk, entity_type_id, entity_identity)` rows; conjunctions and
//! disjunctions combine those with `INTERSECT` and `UNION`. Negation never
//! reaches the SQL as `NOT`: it flips a flag that selects the negated rows of
//! the [`lookup`](crate::sql::lookup) tables.

use std::sync::Arc;

use tracing::debug;

use crate::model::MemberKind;
use crate::query::ast::{Expr, Operand, Variables};
use crate::query::finder::Query;
use crate::query::path::{Accessor, PropertyPath};
use crate::query::value::Value;
use crate::sql::lookup::{self, PredicateKind, SqlOperator};
use crate::sql::metadata::{IndexingMetadata, QNameInfo};
use crate::sql::names::{
    collection_index, ASSOCIATION_NAME, ENTITY_IDENTITY, ENTITY_PK, ENTITY_TABLE, ENTITY_TYPE_FK,
    PARENT_QNAME, QNAME_ID, QNAME_VALUE,
};
use crate::sql::statement::{
    ColumnRef, Condition, Dialect, FromSource, Join, JoinKind, OrderTerm, Projection,
    QueryExpr, Select, SetOp, TableRef,
};
use crate::sql::{Result, SqlQueryError};
use crate::types::QualifiedName;

const ROOT: &str = "t0";

/// How the executor should read the compiled statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultShape {
    /// Single `COUNT` row.
    Count,
    /// Rows read after seeking past `first_result`.
    Scrollable {
        /// Rows to skip.
        first_result: u64,
    },
    /// Rows read from the start.
    ForwardOnly,
}

/// A compiled statement with its bind values.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    /// SQL text with `?` placeholders.
    pub sql: String,
    /// One value per placeholder, in order.
    pub values: Vec<Value>,
    /// Outer statement shape.
    pub shape: ResultShape,
    /// Statement tree the text was rendered from.
    pub statement: QueryExpr,
}

/// Query-to-SQL compiler.
///
/// Holds only the injected index layout and the dialect, so one instance can
/// be shared between threads.
#[derive(Clone)]
pub struct SqlQueryParser {
    metadata: Arc<dyn IndexingMetadata>,
    dialect: Dialect,
}

impl std::fmt::Debug for SqlQueryParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlQueryParser")
            .field("schema", &self.metadata.schema_name())
            .field("dialect", &self.dialect)
            .finish()
    }
}

struct Scope<'q> {
    type_ids: Vec<i64>,
    variables: &'q Variables,
}

/// Allocates `t1`, `t2`, ... after the root alias.
#[derive(Default)]
struct Aliases(usize);

impl Aliases {
    fn next(&mut self) -> String {
        self.0 += 1;
        format!("t{}", self.0)
    }
}

/// Where a join chain currently stands.
enum Cursor {
    /// Alias of an entity table row.
    Entity(String),
    /// Alias of a value composite row in a qualified-name table.
    Row(String),
}

/// Joins emitted for one select.
#[derive(Default)]
struct JoinChain {
    aliases: Aliases,
    joins: Vec<Join>,
}

/// Column reached by a property path.
struct PropertyTarget {
    column: ColumnRef,
    /// Alias of the joined row; `None` for identity.
    alias: Option<String>,
    collection_depth: usize,
}

impl SqlQueryParser {
    /// Compiler over `metadata` rendering for `dialect`.
    pub fn new(metadata: Arc<dyn IndexingMetadata>, dialect: Dialect) -> Self {
        SqlQueryParser { metadata, dialect }
    }

    /// Rendering dialect.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Index layout this compiler reads.
    pub fn metadata(&self) -> &Arc<dyn IndexingMetadata> {
        &self.metadata
    }

    /// Compiles `query`. With `count_only` the statement counts matches and
    /// ignores ordering.
    pub fn compile(&self, query: &Query, count_only: bool) -> Result<CompiledQuery> {
        let type_ids = self.metadata.entity_type_ids(&query.result_type);
        if type_ids.is_empty() {
            return Err(SqlQueryError::UnknownResultType(query.result_type.clone()));
        }
        let scope = Scope {
            type_ids,
            variables: &query.variables,
        };

        let filtered = match &query.filter {
            Some(expr) => self.compile_expr(expr, false, &scope)?,
            None => None,
        };
        let from = match filtered {
            Some(inner) => FromSource::Derived(Box::new(inner)),
            None => FromSource::Table(self.table(ENTITY_TABLE)),
        };

        let mut chain = JoinChain::default();
        let mut order_by = Vec::new();
        if !count_only {
            for segment in &query.order_by {
                let target = self.property_target(&segment.path, JoinKind::LeftOuter, &mut chain)?;
                if target.collection_depth > 0 {
                    return Err(SqlQueryError::Unsupported(format!(
                        "ordering by collection property '{}'",
                        segment.path
                    )));
                }
                order_by.push(OrderTerm {
                    column: target.column,
                    direction: segment.direction,
                });
            }
        }

        let projection = if count_only {
            Projection::Count(ColumnRef::new(ROOT, ENTITY_PK))
        } else {
            Projection::Columns(vec![ColumnRef::new(ROOT, ENTITY_IDENTITY)])
        };
        let statement = QueryExpr::Select(Select {
            distinct: false,
            projection,
            from,
            alias: ROOT.to_owned(),
            joins: chain.joins,
            filter: Some(type_condition(&scope.type_ids)),
            order_by,
        });

        let rendered = statement.render(self.dialect);
        let shape = match (count_only, query.first_result) {
            (true, _) => ResultShape::Count,
            (false, Some(first_result)) => ResultShape::Scrollable { first_result },
            (false, None) => ResultShape::ForwardOnly,
        };
        debug!(
            result_type = %query.result_type,
            sql = %rendered.sql,
            binds = rendered.values.len(),
            "compiled entity query"
        );
        Ok(CompiledQuery {
            sql: rendered.sql,
            values: rendered.values,
            shape,
            statement,
        })
    }

    fn compile_expr(&self, expr: &Expr, negated: bool, scope: &Scope<'_>) -> Result<Option<QueryExpr>> {
        match expr {
            Expr::Not(inner) => self.compile_expr(inner, !negated, scope),
            Expr::And(operands) => {
                let op = if negated { SetOp::Union } else { SetOp::Intersect };
                self.combine(operands, op, negated, scope)
            }
            Expr::Or(operands) => {
                let op = if negated { SetOp::Intersect } else { SetOp::Union };
                self.combine(operands, op, negated, scope)
            }
            leaf => {
                let unsupported = || SqlQueryError::Unsupported(describe(leaf));
                let kind = PredicateKind::of(leaf).ok_or_else(unsupported)?;
                let operator = lookup::operator(kind, negated).ok_or_else(unsupported)?;
                let style = lookup::join_style(kind, negated).ok_or_else(unsupported)?;
                self.compile_leaf(leaf, operator, style, scope).map(Some)
            }
        }
    }

    fn combine(
        &self,
        operands: &[Expr],
        op: SetOp,
        negated: bool,
        scope: &Scope<'_>,
    ) -> Result<Option<QueryExpr>> {
        let mut combined: Option<QueryExpr> = None;
        for operand in operands {
            let Some(part) = self.compile_expr(operand, negated, scope)? else {
                continue;
            };
            combined = Some(match combined {
                Some(left) => QueryExpr::compound(op, left, part),
                None => part,
            });
        }
        Ok(combined)
    }

    fn compile_leaf(
        &self,
        expr: &Expr,
        operator: SqlOperator,
        style: JoinKind,
        scope: &Scope<'_>,
    ) -> Result<QueryExpr> {
        let mut chain = JoinChain::default();
        let condition = match expr {
            Expr::Comparison { path, operand, .. } => {
                let value = comparable(path, resolve(operand, scope.variables)?)?;
                let target = self.property_target(path, style, &mut chain)?;
                if target.collection_depth > 0 {
                    return Err(SqlQueryError::Unsupported(format!(
                        "comparison over collection property '{path}'"
                    )));
                }
                apply(operator, target.column, value)
            }
            Expr::PropertyNull { path, .. } => {
                let target = self.property_target(path, style, &mut chain)?;
                let mut columns = vec![target.column];
                if let Some(alias) = &target.alias {
                    columns.extend(
                        (1..=target.collection_depth)
                            .map(|level| ColumnRef::new(alias.as_str(), collection_index(level))),
                    );
                }
                null_test(operator, columns)
            }
            Expr::AssociationNull { path, .. } => {
                let steps = path.steps();
                let (last, hops) = split_terminal(&steps)?;
                let cursor = self.walk(hops, style, &mut chain)?;
                let alias = self.join_member(&cursor, &last.name, style, &mut chain)?;
                null_test(operator, vec![ColumnRef::new(alias, QNAME_VALUE)])
            }
            Expr::ManyAssociationContains { path, operand } => {
                let identity = identity_of(resolve(operand, scope.variables)?)?;
                let (_, entity) = self.membership(&path.steps(), style, &mut chain)?;
                apply(operator, ColumnRef::new(entity, ENTITY_IDENTITY), identity)
            }
            Expr::NamedAssociationContains { path, operand } => {
                let identity = identity_of(resolve(operand, scope.variables)?)?;
                let (_, entity) = self.membership(&path.steps(), style, &mut chain)?;
                apply(operator, ColumnRef::new(entity, ENTITY_IDENTITY), identity)
            }
            Expr::NamedAssociationContainsName { path, name } => {
                let name = match resolve(name, scope.variables)? {
                    Value::String(name) => Value::String(name),
                    other => {
                        return Err(SqlQueryError::Unsupported(format!(
                            "association entry name {other}"
                        )))
                    }
                };
                let (link, _) = self.membership(&path.steps(), style, &mut chain)?;
                apply(operator, ColumnRef::new(link, ASSOCIATION_NAME), name)
            }
            other => return Err(SqlQueryError::Unsupported(describe(other))),
        };

        let positive = self.leaf_select(chain.joins, Some(condition), &scope.type_ids);
        Ok(match operator {
            SqlOperator::Except(_) => QueryExpr::compound(
                SetOp::Except,
                self.leaf_select(Vec::new(), None, &scope.type_ids),
                positive,
            ),
            _ => positive,
        })
    }

    fn leaf_select(&self, joins: Vec<Join>, condition: Option<Condition>, type_ids: &[i64]) -> QueryExpr {
        let types = type_condition(type_ids);
        QueryExpr::Select(Select {
            distinct: true,
            projection: Projection::Columns(vec![
                ColumnRef::new(ROOT, ENTITY_PK),
                ColumnRef::new(ROOT, ENTITY_TYPE_FK),
                ColumnRef::new(ROOT, ENTITY_IDENTITY),
            ]),
            from: FromSource::Table(self.table(ENTITY_TABLE)),
            alias: ROOT.to_owned(),
            joins,
            filter: Some(match condition {
                Some(condition) => condition.and(types),
                None => types,
            }),
            order_by: Vec::new(),
        })
    }

    fn table(&self, name: &str) -> TableRef {
        TableRef {
            schema: self.metadata.schema_name().to_owned(),
            name: name.to_owned(),
        }
    }

    fn qname_info(&self, name: &QualifiedName) -> Result<&QNameInfo> {
        self.metadata
            .qname_info(name)
            .ok_or_else(|| SqlQueryError::MissingQNameInfo(name.clone()))
    }

    /// Joins the table of `name` below `cursor` and returns its alias.
    fn join_member(
        &self,
        cursor: &Cursor,
        name: &QualifiedName,
        style: JoinKind,
        chain: &mut JoinChain,
    ) -> Result<String> {
        let info = self.qname_info(name)?;
        let table = self.table(&info.table_name);
        let alias = chain.aliases.next();
        let on = match cursor {
            Cursor::Entity(owner) => Condition::ColumnsEqual(
                ColumnRef::new(owner.as_str(), ENTITY_PK),
                ColumnRef::new(alias.as_str(), ENTITY_PK),
            )
            .and(Condition::IsNull(ColumnRef::new(alias.as_str(), PARENT_QNAME))),
            Cursor::Row(owner) => Condition::ColumnsEqual(
                ColumnRef::new(owner.as_str(), QNAME_ID),
                ColumnRef::new(alias.as_str(), PARENT_QNAME),
            ),
        };
        chain.joins.push(Join {
            kind: style,
            table,
            alias: alias.clone(),
            on,
        });
        Ok(alias)
    }

    /// Joins the entity table onto an association row.
    fn join_target(&self, link: &str, style: JoinKind, chain: &mut JoinChain) -> String {
        let alias = chain.aliases.next();
        chain.joins.push(Join {
            kind: style,
            table: self.table(ENTITY_TABLE),
            alias: alias.clone(),
            on: Condition::ColumnsEqual(
                ColumnRef::new(link, QNAME_VALUE),
                ColumnRef::new(alias.as_str(), ENTITY_PK),
            ),
        });
        alias
    }

    /// Emits the joins of every non-terminal hop.
    fn walk(&self, hops: &[&Accessor], style: JoinKind, chain: &mut JoinChain) -> Result<Cursor> {
        let mut cursor = Cursor::Entity(ROOT.to_owned());
        for hop in hops {
            cursor = match hop.kind {
                MemberKind::Association => {
                    if matches!(cursor, Cursor::Row(_)) {
                        return Err(SqlQueryError::Unsupported(format!(
                            "association '{}' inside a value composite",
                            hop.name
                        )));
                    }
                    let link = self.join_member(&cursor, &hop.name, style, chain)?;
                    Cursor::Entity(self.join_target(&link, style, chain))
                }
                MemberKind::Property if hop.collection_depth() == 0 => {
                    Cursor::Row(self.join_member(&cursor, &hop.name, style, chain)?)
                }
                MemberKind::Property => {
                    return Err(SqlQueryError::Unsupported(format!(
                        "traversal through collection property '{}'",
                        hop.name
                    )))
                }
                kind => {
                    return Err(SqlQueryError::Unsupported(format!(
                        "traversal through {kind} '{}'",
                        hop.name
                    )))
                }
            };
        }
        Ok(cursor)
    }

    fn property_target(
        &self,
        path: &PropertyPath,
        style: JoinKind,
        chain: &mut JoinChain,
    ) -> Result<PropertyTarget> {
        let steps = path.steps();
        let (last, hops) = split_terminal(&steps)?;
        let cursor = self.walk(hops, style, chain)?;
        if last.name.is_identity() {
            return match cursor {
                Cursor::Entity(alias) => Ok(PropertyTarget {
                    column: ColumnRef::new(alias, ENTITY_IDENTITY),
                    alias: None,
                    collection_depth: 0,
                }),
                Cursor::Row(_) => Err(SqlQueryError::Unsupported(format!(
                    "identity of value composite '{path}'"
                ))),
            };
        }
        let collection_depth = self.qname_info(&last.name)?.collection_depth;
        let alias = self.join_member(&cursor, &last.name, style, chain)?;
        Ok(PropertyTarget {
            column: ColumnRef::new(alias.as_str(), QNAME_VALUE),
            alias: Some(alias),
            collection_depth,
        })
    }

    /// Joins a many- or named-association and its target entities; returns
    /// the aliases of the association row and the target entity row.
    fn membership(
        &self,
        steps: &[&Accessor],
        style: JoinKind,
        chain: &mut JoinChain,
    ) -> Result<(String, String)> {
        let (last, hops) = split_terminal(steps)?;
        let cursor = self.walk(hops, style, chain)?;
        let link = self.join_member(&cursor, &last.name, style, chain)?;
        let entity = self.join_target(&link, style, chain);
        Ok((link, entity))
    }
}

fn split_terminal<'a, 'b>(steps: &'b [&'a Accessor]) -> Result<(&'a Accessor, &'b [&'a Accessor])> {
    steps
        .split_last()
        .map(|(last, hops)| (*last, hops))
        .ok_or_else(|| SqlQueryError::Unsupported("empty path".to_owned()))
}

fn type_condition(type_ids: &[i64]) -> Condition {
    Condition::In {
        column: ColumnRef::new(ROOT, ENTITY_TYPE_FK),
        keys: type_ids.to_vec(),
    }
}

fn resolve(operand: &Operand, variables: &Variables) -> Result<Value> {
    match operand {
        Operand::Literal(value) => Ok(value.clone()),
        Operand::Variable(name) => variables
            .get(name)
            .cloned()
            .ok_or_else(|| SqlQueryError::UnboundVariable(name.clone())),
    }
}

/// Only scalars of the property's category have a column encoding that
/// compares the way values do in memory.
fn comparable(path: &PropertyPath, value: Value) -> Result<Value> {
    let scalar = matches!(
        value,
        Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::String(_)
    );
    let fits = path
        .accessor()
        .value_type
        .as_ref()
        .map_or(true, |expected| expected.compares_with(&value));
    if scalar && fits {
        Ok(value)
    } else {
        Err(SqlQueryError::Unsupported(format!(
            "comparison of '{path}' with {value}"
        )))
    }
}

fn identity_of(value: Value) -> Result<Value> {
    match value.as_identity() {
        Some(identity) => Ok(Value::String(identity.to_owned())),
        None => Err(SqlQueryError::Unsupported(format!(
            "cannot compare entity identity with {value}"
        ))),
    }
}

fn apply(operator: SqlOperator, column: ColumnRef, value: Value) -> Condition {
    match operator {
        SqlOperator::Compare(op) | SqlOperator::Except(op) => Condition::Compare { column, op, value },
        SqlOperator::CompareOrNull(op) => Condition::Or(vec![
            Condition::IsNull(column.clone()),
            Condition::Compare { column, op, value },
        ]),
        SqlOperator::IsNull => Condition::IsNull(column),
        SqlOperator::IsNotNull => Condition::IsNotNull(column),
    }
}

fn null_test(operator: SqlOperator, columns: Vec<ColumnRef>) -> Condition {
    let test = match operator {
        SqlOperator::IsNotNull => Condition::IsNotNull,
        _ => Condition::IsNull,
    };
    let mut parts: Vec<Condition> = columns.into_iter().map(test).collect();
    if parts.len() == 1 {
        parts.remove(0)
    } else {
        Condition::And(parts)
    }
}

fn describe(expr: &Expr) -> String {
    let kind = match expr {
        Expr::Matches { .. } => "matches",
        Expr::Contains { .. } => "contains",
        Expr::ContainsAll { .. } => "contains all",
        Expr::Native { .. } => "native",
        _ => "predicate",
    };
    format!("{kind} predicate `{expr}`")
}
