//! Conversion of query values into SQLite parameters.

use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue};
use thiserror::Error;

use crate::query::value::Value;

/// A value with no column representation.
#[derive(Debug, Error)]
#[error("{0} cannot be bound as a SQL parameter")]
pub struct UnbindableValue(pub String);

/// Column representation of a scalar value.
///
/// Booleans become 0/1 and entity references their identity. Value
/// composites store their type name so that "is not null" holds for them.
pub fn to_sql_value(value: &Value) -> Result<SqlValue, UnbindableValue> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Int(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Entity(reference) => SqlValue::Text(reference.identity().to_owned()),
        Value::Composite(state) => SqlValue::Text(state.type_name().to_owned()),
        Value::List(_) => return Err(UnbindableValue(value.to_string())),
    })
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        to_sql_value(self)
            .map(ToSqlOutput::Owned)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntityReference;

    #[test]
    fn scalars_map_to_sqlite_storage_classes() {
        assert_eq!(to_sql_value(&Value::Bool(true)).unwrap(), SqlValue::Integer(1));
        assert_eq!(to_sql_value(&Value::Float(1.5)).unwrap(), SqlValue::Real(1.5));
        assert_eq!(
            to_sql_value(&Value::from(EntityReference::new("alice"))).unwrap(),
            SqlValue::Text("alice".into())
        );
        assert!(to_sql_value(&Value::List(vec![Value::Int(1)])).is_err());
    }

    #[test]
    fn lists_fail_parameter_binding() {
        let err = Value::List(Vec::new()).to_sql().unwrap_err();
        assert!(matches!(err, rusqlite::Error::ToSqlConversionFailure(_)));
    }
}
