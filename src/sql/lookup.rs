//! Operator and join-style tables for leaf predicates.
//!
//! Negation is pushed down to the leaves: a leaf compiled under an odd
//! number of `Not` nodes takes the negated row of both tables. The two
//! tables are keyed identically so an operator never changes without its
//! join style.

use crate::query::ast::{CompareOp, Expr};
use crate::sql::statement::{BinaryOp, JoinKind};

/// Leaf predicate categories known to the SQL compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredicateKind {
    /// `path op value`.
    Comparison(CompareOp),
    /// `path is null`.
    PropertyNull,
    /// `path is not null`.
    PropertyNotNull,
    /// `association is null`.
    AssociationNull,
    /// `association is not null`.
    AssociationNotNull,
    /// Many-association contains an entity.
    ManyAssociationContains,
    /// Named-association contains an entity.
    NamedAssociationContains,
    /// Named-association has an entry name.
    NamedAssociationContainsName,
}

impl PredicateKind {
    /// Category of a leaf expression; `None` for compound nodes and for
    /// predicates the compiler has no table rows for.
    pub fn of(expr: &Expr) -> Option<PredicateKind> {
        Some(match expr {
            Expr::Comparison { op, .. } => PredicateKind::Comparison(*op),
            Expr::PropertyNull { is_null: true, .. } => PredicateKind::PropertyNull,
            Expr::PropertyNull { is_null: false, .. } => PredicateKind::PropertyNotNull,
            Expr::AssociationNull { is_null: true, .. } => PredicateKind::AssociationNull,
            Expr::AssociationNull { is_null: false, .. } => PredicateKind::AssociationNotNull,
            Expr::ManyAssociationContains { .. } => PredicateKind::ManyAssociationContains,
            Expr::NamedAssociationContains { .. } => PredicateKind::NamedAssociationContains,
            Expr::NamedAssociationContainsName { .. } => {
                PredicateKind::NamedAssociationContainsName
            }
            _ => return None,
        })
    }
}

/// SQL test applied to the compared column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlOperator {
    /// `col op ?`.
    Compare(BinaryOp),
    /// `(col IS NULL OR col op ?)`; the complement of a comparison over an
    /// outer join.
    CompareOrNull(BinaryOp),
    /// `col IS NULL`.
    IsNull,
    /// `col IS NOT NULL`.
    IsNotNull,
    /// Every candidate `EXCEPT` the ones where `col op ?` holds.
    Except(BinaryOp),
}

type Row<T> = (PredicateKind, T, T);

macro_rules! comparison_rows {
    ($(($op:ident, $negated:ident)),* $(,)?) => {
        [$((
            PredicateKind::Comparison(CompareOp::$op),
            SqlOperator::Compare(BinaryOp::$op),
            SqlOperator::CompareOrNull(BinaryOp::$negated),
        )),*]
    };
}

static COMPARISONS: [Row<SqlOperator>; 6] = comparison_rows![
    (Eq, Ne),
    (Ne, Eq),
    (Lt, Ge),
    (Le, Gt),
    (Gt, Le),
    (Ge, Lt),
];

/// `(kind, normal, negated)` operator rows.
static OPERATORS: [Row<SqlOperator>; 7] = [
    (PredicateKind::PropertyNull, SqlOperator::IsNull, SqlOperator::IsNotNull),
    (PredicateKind::PropertyNotNull, SqlOperator::IsNotNull, SqlOperator::IsNull),
    (PredicateKind::AssociationNull, SqlOperator::IsNull, SqlOperator::IsNotNull),
    (PredicateKind::AssociationNotNull, SqlOperator::IsNotNull, SqlOperator::IsNull),
    (
        PredicateKind::ManyAssociationContains,
        SqlOperator::Compare(BinaryOp::Eq),
        SqlOperator::Except(BinaryOp::Eq),
    ),
    (
        PredicateKind::NamedAssociationContains,
        SqlOperator::Compare(BinaryOp::Eq),
        SqlOperator::Except(BinaryOp::Eq),
    ),
    (
        PredicateKind::NamedAssociationContainsName,
        SqlOperator::Compare(BinaryOp::Eq),
        SqlOperator::Except(BinaryOp::Eq),
    ),
];

/// `(kind, normal, negated)` join-style rows.
static JOIN_STYLES: [Row<JoinKind>; 7] = [
    (PredicateKind::PropertyNull, JoinKind::LeftOuter, JoinKind::Inner),
    (PredicateKind::PropertyNotNull, JoinKind::Inner, JoinKind::LeftOuter),
    (PredicateKind::AssociationNull, JoinKind::LeftOuter, JoinKind::Inner),
    (PredicateKind::AssociationNotNull, JoinKind::Inner, JoinKind::LeftOuter),
    (PredicateKind::ManyAssociationContains, JoinKind::Inner, JoinKind::Inner),
    (PredicateKind::NamedAssociationContains, JoinKind::Inner, JoinKind::Inner),
    (PredicateKind::NamedAssociationContainsName, JoinKind::Inner, JoinKind::Inner),
];

fn pick<T: Copy>(rows: &[Row<T>], kind: PredicateKind, negated: bool) -> Option<T> {
    rows.iter()
        .find(|(k, _, _)| *k == kind)
        .map(|&(_, normal, inverse)| if negated { inverse } else { normal })
}

/// Operator for `kind`, taking the negated row when `negated`.
pub fn operator(kind: PredicateKind, negated: bool) -> Option<SqlOperator> {
    pick(&COMPARISONS, kind, negated).or_else(|| pick(&OPERATORS, kind, negated))
}

/// Join style for `kind`, taking the negated row when `negated`.
pub fn join_style(kind: PredicateKind, negated: bool) -> Option<JoinKind> {
    match kind {
        PredicateKind::Comparison(_) if negated => Some(JoinKind::LeftOuter),
        PredicateKind::Comparison(_) => Some(JoinKind::Inner),
        _ => pick(&JOIN_STYLES, kind, negated),
    }
}
