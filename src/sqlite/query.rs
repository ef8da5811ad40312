use rusqlite::types::Value as SqliteValue;
use rusqlite::{Statement, params_from_iter};

use crate::error::SqlDbError;
use crate::results::{Row, RowShape};
use crate::types::Value;

fn from_sqlite_value(value: SqliteValue) -> Value {
    match value {
        SqliteValue::Null => Value::Null,
        SqliteValue::Integer(i) => Value::Int(i),
        SqliteValue::Real(f) => Value::Float(f),
        SqliteValue::Text(s) => Value::Text(s),
        SqliteValue::Blob(b) => Value::Blob(b),
    }
}

/// Run a prepared statement and collect every row. All rows share one [`RowShape`].
///
/// # Errors
/// Returns `SqlDbError::SqliteError` if execution or value extraction fails.
pub fn build_rows(stmt: &mut Statement<'_>, params: &[SqliteValue]) -> Result<Vec<Row>, SqlDbError> {
    let shape = RowShape::new(
        stmt.column_names()
            .iter()
            .map(ToString::to_string)
            .collect(),
    );
    let col_count = shape.names().len();

    let mut rows = Vec::new();
    let mut cursor = stmt.query(params_from_iter(params.iter()))?;
    while let Some(row) = cursor.next()? {
        let mut values = Vec::with_capacity(col_count);
        for idx in 0..col_count {
            values.push(from_sqlite_value(row.get::<_, SqliteValue>(idx)?));
        }
        rows.push(Row::new(shape.clone(), values));
    }
    Ok(rows)
}
