//! Identifier quoting and value-to-literal encoding for generated statements.
//!
//! Upsert statements embed every value as a literal instead of binding parameters,
//! so all quoting goes through this module.

use serde_json::Value;

/// Double-quotes an identifier, doubling any embedded quote.
#[inline]
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Splits a possibly qualified name on the dots outside double quotes. Quoted parts
/// come back unquoted, with `""` collapsed to `"`.
fn split_qualified_name(name: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = name.chars().peekable();
    let mut in_quotes = false;

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                chars.next();
                current.push('"');
            }
            '"' => in_quotes = !in_quotes,
            '.' if !in_quotes => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}

/// Formats a table name, quoting each part of `table`, `schema.table` or
/// `database.schema.table`.
pub fn format_table_name(table_name: &str) -> String {
    split_qualified_name(table_name)
        .iter()
        .map(|part| quote_identifier(part))
        .collect::<Vec<_>>()
        .join(".")
}

/// Single-quotes a string literal. Assumes `standard_conforming_strings = on`,
/// the PostgreSQL default, so backslashes need no escaping.
#[inline]
pub fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// True for `json` and `jsonb`.
pub fn is_json_type(database_type: Option<&str>) -> bool {
    database_type.map(|t| matches!(t.trim().to_ascii_lowercase().as_str(), "json" | "jsonb")).unwrap_or(false)
}

/// True for plain `json`, which has no equality operator and is compared as `jsonb`.
pub fn is_plain_json_type(database_type: Option<&str>) -> bool {
    database_type.map(|t| t.trim().eq_ignore_ascii_case("json")).unwrap_or(false)
}

fn is_array_type(database_type: Option<&str>) -> bool {
    database_type.map(|t| t.trim_end().ends_with("[]")).unwrap_or(false)
}

/// Encodes a field value as an untyped literal in PostgreSQL text format.
///
/// `json`/`jsonb` columns receive the JSON text of the value, array columns
/// receive an array literal, everything else its plain text form. JSON `null`
/// becomes SQL `NULL` for every column type.
pub fn encode_literal(value: &Value, database_type: Option<&str>) -> String {
    if value.is_null() {
        return "NULL".to_string();
    }

    if is_json_type(database_type) {
        return quote_literal(&value.to_string());
    }

    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => quote_literal(if *b { "true" } else { "false" }),
        Value::Number(n) => quote_literal(&n.to_string()),
        Value::String(s) => quote_literal(s),
        Value::Array(items) if is_array_type(database_type) => quote_literal(&array_literal(items)),
        Value::Array(_) | Value::Object(_) => quote_literal(&value.to_string()),
    }
}

/// Like [`encode_literal`] but with an explicit cast to the column's native type.
pub fn encode_cast_literal(value: &Value, database_type: Option<&str>) -> String {
    let literal = encode_literal(value, database_type);
    match database_type {
        Some(t) => format!("{}::{}", literal, t),
        None => literal,
    }
}

fn array_literal(items: &[Value]) -> String {
    let elements = items.iter().map(array_element).collect::<Vec<_>>().join(",");
    format!("{{{}}}", elements)
}

fn array_element(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Array(items) => array_literal(items),
        Value::String(s) => quote_array_element(s),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::Object(_) => quote_array_element(&value.to_string()),
    }
}

fn quote_array_element(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}
