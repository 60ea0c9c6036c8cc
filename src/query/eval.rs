//! In-process evaluation of expressions against composite state.

use tracing::trace;

use crate::model::Composite;
use crate::query::ast::{CompareOp, Expr, MatchPattern, Operand, Pattern, Variables};
use crate::query::errors::TraversalError;
use crate::query::value::Value;

impl Expr {
    /// Evaluates the predicate with no variables bound.
    pub fn satisfied_by(&self, item: &dyn Composite) -> bool {
        self.satisfied_by_with(item, &Variables::new())
    }

    /// Evaluates the predicate against one composite.
    ///
    /// Traversal failures never escape: null checks treat them as "null",
    /// every other predicate as "not satisfied". Unbound variables make the
    /// predicate unsatisfied.
    pub fn satisfied_by_with(&self, item: &dyn Composite, variables: &Variables) -> bool {
        match self {
            Expr::Comparison { op, path, operand } => {
                let Some(expected) = operand.resolve(variables) else {
                    return false;
                };
                match settle(path.map(item), self) {
                    Some(actual) => compare(*op, &actual, expected),
                    None => false,
                }
            }
            Expr::PropertyNull { path, is_null } => match path.map(item) {
                Ok(value) => value.is_none() == *is_null,
                Err(err) => {
                    swallowed(&err, self);
                    *is_null
                }
            },
            Expr::AssociationNull { path, is_null } => match path.map(item) {
                Ok(target) => target.is_none() == *is_null,
                Err(err) => {
                    swallowed(&err, self);
                    *is_null
                }
            },
            Expr::Contains { path, operand } => {
                let Some(expected) = operand.resolve(variables) else {
                    return false;
                };
                match settle(path.map(item), self) {
                    Some(Value::List(items)) => items.iter().any(|i| i.loosely_equals(expected)),
                    _ => false,
                }
            }
            Expr::ContainsAll { path, operands } => {
                let Some(expected) = resolve_all(operands, variables) else {
                    return false;
                };
                match settle(path.map(item), self) {
                    Some(Value::List(items)) => expected
                        .iter()
                        .all(|e| items.iter().any(|i| i.loosely_equals(e))),
                    _ => false,
                }
            }
            Expr::ManyAssociationContains { path, operand } => {
                let Some(identity) = operand.resolve(variables).and_then(Value::as_identity) else {
                    return false;
                };
                match settle(path.map(item), self) {
                    Some(members) => members
                        .iter()
                        .any(|m| m.reference().is_some_and(|r| r.identity() == identity)),
                    None => false,
                }
            }
            Expr::NamedAssociationContains { path, operand } => {
                let Some(identity) = operand.resolve(variables).and_then(Value::as_identity) else {
                    return false;
                };
                match settle(path.map(item), self) {
                    Some(members) => members
                        .values()
                        .any(|m| m.reference().is_some_and(|r| r.identity() == identity)),
                    None => false,
                }
            }
            Expr::NamedAssociationContainsName { path, name } => {
                let Some(Value::String(name)) = name.resolve(variables) else {
                    return false;
                };
                match settle(path.map(item), self) {
                    Some(members) => members.contains_key(name),
                    None => false,
                }
            }
            Expr::Matches { path, pattern } => {
                let compiled;
                let pattern = match pattern {
                    MatchPattern::Regex(p) => p,
                    MatchPattern::Variable(name) => match variables.get(name) {
                        Some(Value::String(source)) => match Pattern::new(source) {
                            Ok(p) => {
                                compiled = p;
                                &compiled
                            }
                            Err(_) => return false,
                        },
                        _ => return false,
                    },
                };
                match settle(path.map(item), self) {
                    Some(Value::String(text)) => pattern.is_match(&text),
                    _ => false,
                }
            }
            Expr::And(operands) => operands
                .iter()
                .all(|e| e.satisfied_by_with(item, variables)),
            Expr::Or(operands) => operands
                .iter()
                .any(|e| e.satisfied_by_with(item, variables)),
            Expr::Not(inner) => !inner.satisfied_by_with(item, variables),
            Expr::Native { .. } => false,
        }
    }
}

fn swallowed(err: &TraversalError, expr: &Expr) {
    trace!(code = err.code(), error = %err, expr = %expr, "traversal failed during evaluation");
}

fn settle<T>(resolved: Result<Option<T>, TraversalError>, expr: &Expr) -> Option<T> {
    match resolved {
        Ok(value) => value,
        Err(err) => {
            swallowed(&err, expr);
            None
        }
    }
}

fn resolve_all<'a>(operands: &'a [Operand], variables: &'a Variables) -> Option<Vec<&'a Value>> {
    operands.iter().map(|o| o.resolve(variables)).collect()
}

fn compare(op: CompareOp, actual: &Value, expected: &Value) -> bool {
    use std::cmp::Ordering::*;

    match op {
        CompareOp::Eq => actual.loosely_equals(expected),
        CompareOp::Ne => !actual.loosely_equals(expected),
        CompareOp::Lt => actual.compare(expected) == Some(Less),
        CompareOp::Le => matches!(actual.compare(expected), Some(Less | Equal)),
        CompareOp::Gt => actual.compare(expected) == Some(Greater),
        CompareOp::Ge => matches!(actual.compare(expected), Some(Greater | Equal)),
    }
}
