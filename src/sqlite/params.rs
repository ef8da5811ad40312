use rusqlite::types::Value as SqliteValue;

use crate::types::Value;

/// Convert one middleware value to an owned rusqlite value.
///
/// Booleans become integers, timestamps `YYYY-MM-DD HH:MM:SS[.fff]` text and JSON its
/// serialized text, matching how `SQLite` stores them.
#[must_use]
pub fn to_sqlite_value(value: &Value) -> SqliteValue {
    match value {
        Value::Int(i) => SqliteValue::Integer(*i),
        Value::Float(f) => SqliteValue::Real(*f),
        Value::Text(s) => SqliteValue::Text(s.clone()),
        Value::Bool(b) => SqliteValue::Integer(i64::from(*b)),
        Value::Timestamp(dt) => SqliteValue::Text(dt.format("%F %T%.f").to_string()),
        Value::Json(json) => SqliteValue::Text(json.to_string()),
        Value::Blob(bytes) => SqliteValue::Blob(bytes.clone()),
        Value::Null => SqliteValue::Null,
    }
}

/// Owned parameter list, movable onto a blocking thread.
#[derive(Debug, Clone, Default)]
pub struct Params(pub Vec<SqliteValue>);

impl Params {
    #[must_use]
    pub fn convert(params: &[Value]) -> Self {
        Params(params.iter().map(to_sqlite_value).collect())
    }

    #[must_use]
    pub fn as_values(&self) -> &[SqliteValue] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn converts_non_native_types() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();
        let params = Params::convert(&[
            Value::Bool(true),
            Value::Timestamp(ts),
            Value::Json(serde_json::json!({"a": 1})),
            Value::Null,
        ]);
        assert_eq!(
            params.as_values(),
            &[
                SqliteValue::Integer(1),
                SqliteValue::Text("2024-03-01 12:30:00".to_string()),
                SqliteValue::Text(r#"{"a":1}"#.to_string()),
                SqliteValue::Null,
            ]
        );
    }
}
