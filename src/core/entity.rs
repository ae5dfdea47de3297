//! Generic row access for entity tables.
//!
//! Rows travel as [`FieldMap`]s (column name -> JSON value) so the capture
//! engine can read and write any entity kind without knowing its shape.
//! Table and column names are interpolated into SQL, so both are checked:
//! tables against the known entity kinds, columns against a plain identifier
//! pattern.

use crate::core::error::LedgerError;
use crate::core::schemas;
use regex::Regex;
use rusqlite::types::{Type, Value as SqlValue, ValueRef};
use rusqlite::{Connection, Row, params, params_from_iter};
use serde_json::Value as JsonValue;
use std::sync::OnceLock;

/// Column name -> value snapshot of one entity row.
pub type FieldMap = serde_json::Map<String, JsonValue>;

fn column_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("static regex"))
}

/// Resolve an entity kind to its table name.
pub fn entity_table(kind: &str) -> Result<&'static str, LedgerError> {
    schemas::ENTITY_KINDS
        .iter()
        .copied()
        .find(|k| *k == kind)
        .ok_or_else(|| LedgerError::ValidationError(format!("Unknown entity kind: {}", kind)))
}

fn check_column(name: &str) -> Result<(), LedgerError> {
    if column_pattern().is_match(name) {
        Ok(())
    } else {
        Err(LedgerError::ValidationError(format!(
            "Invalid column name: {:?}",
            name
        )))
    }
}

/// Booleans become 0/1 and nested JSON is stored as text, matching how SQLite
/// hands the values back.
pub fn json_to_sql(value: &JsonValue) -> SqlValue {
    match value {
        JsonValue::Null => SqlValue::Null,
        JsonValue::Bool(b) => SqlValue::Integer(i64::from(*b)),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
        },
        JsonValue::String(s) => SqlValue::Text(s.clone()),
        JsonValue::Array(_) | JsonValue::Object(_) => SqlValue::Text(value.to_string()),
    }
}

pub fn sql_to_json(value: ValueRef<'_>) -> JsonValue {
    match value {
        ValueRef::Null => JsonValue::Null,
        ValueRef::Integer(i) => JsonValue::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        ValueRef::Text(bytes) => JsonValue::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => JsonValue::Array(bytes.iter().map(|b| JsonValue::from(*b)).collect()),
    }
}

/// Read a TEXT column holding serialized JSON.
pub fn json_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<JsonValue> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Read the full current row of an entity, or `None` when it does not exist.
pub fn load_row(conn: &Connection, kind: &str, id: &str) -> Result<Option<FieldMap>, LedgerError> {
    let table = entity_table(kind)?;
    let mut stmt = conn.prepare(&format!("SELECT * FROM {} WHERE id = ?1", table))?;
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query(params![id])?;
    match rows.next()? {
        Some(row) => {
            let mut fields = FieldMap::new();
            for (idx, name) in names.iter().enumerate() {
                fields.insert(name.clone(), sql_to_json(row.get_ref(idx)?));
            }
            Ok(Some(fields))
        }
        None => Ok(None),
    }
}

pub fn insert_row(conn: &Connection, kind: &str, fields: &FieldMap) -> Result<(), LedgerError> {
    let table = entity_table(kind)?;
    if !matches!(fields.get("id"), Some(JsonValue::String(id)) if !id.is_empty()) {
        return Err(LedgerError::ValidationError(format!(
            "{} row must carry a non-empty string id",
            kind
        )));
    }
    for name in fields.keys() {
        check_column(name)?;
    }
    let columns: Vec<&str> = fields.keys().map(String::as_str).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "INSERT INTO {}({}) VALUES({})",
        table,
        columns.join(", "),
        placeholders.join(", ")
    );
    conn.execute(&sql, params_from_iter(fields.values().map(json_to_sql)))?;
    Ok(())
}

/// Apply `patch` to one row. Returns the number of rows changed (0 or 1).
pub fn update_row(
    conn: &Connection,
    kind: &str,
    id: &str,
    patch: &FieldMap,
) -> Result<usize, LedgerError> {
    let table = entity_table(kind)?;
    if patch.is_empty() {
        return Err(LedgerError::ValidationError(format!(
            "Empty update for {}/{}",
            kind, id
        )));
    }
    if patch.contains_key("id") {
        return Err(LedgerError::ValidationError(format!(
            "The id of {}/{} cannot be changed",
            kind, id
        )));
    }
    for name in patch.keys() {
        check_column(name)?;
    }
    let assignments: Vec<String> = patch
        .keys()
        .enumerate()
        .map(|(i, name)| format!("{} = ?{}", name, i + 1))
        .collect();
    let sql = format!(
        "UPDATE {} SET {} WHERE id = ?{}",
        table,
        assignments.join(", "),
        patch.len() + 1
    );
    let mut values: Vec<SqlValue> = patch.values().map(json_to_sql).collect();
    values.push(SqlValue::Text(id.to_string()));
    Ok(conn.execute(&sql, params_from_iter(values))?)
}

pub fn delete_row(conn: &Connection, kind: &str, id: &str) -> Result<usize, LedgerError> {
    let table = entity_table(kind)?;
    Ok(conn.execute(&format!("DELETE FROM {} WHERE id = ?1", table), params![id])?)
}
