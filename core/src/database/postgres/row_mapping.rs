//! Decoding of returned rows into field maps.

use std::error::Error;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Number, Value};
use tokio_postgres::{
    types::{FromSql, Kind, Type as PgType},
    Row,
};
use tracing::warn;
use uuid::Uuid;

use crate::record::FieldMap;

#[derive(thiserror::Error, Debug)]
pub enum RowDecodeError {
    #[error("Could not decode column '{column}' ({type_name}): {source}")]
    Column {
        column: String,
        type_name: String,
        #[source]
        source: tokio_postgres::Error,
    },
}

/// Text in its binary wire form: covers the string types plus enums, whose binary
/// representation is the label.
#[derive(Debug)]
struct TextLike(String);

impl<'a> FromSql<'a> for TextLike {
    fn from_sql(_: &PgType, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        Ok(TextLike(std::str::from_utf8(raw)?.to_string()))
    }

    fn accepts(ty: &PgType) -> bool {
        matches!(ty.kind(), Kind::Enum(_)) || <String as FromSql<'_>>::accepts(ty)
    }
}

/// `format_type` names (modifiers stripped) that [`row_to_field_map`] decodes from the
/// binary wire format. Anything else has to be selected as `::text`.
const NATIVE_TYPES: &[&str] = &[
    "boolean",
    "smallint",
    "integer",
    "bigint",
    "oid",
    "real",
    "double precision",
    "numeric",
    "json",
    "jsonb",
    "uuid",
    "timestamp with time zone",
    "timestamp without time zone",
    "date",
    "time without time zone",
    "bytea",
    "text",
    "character varying",
    "character",
    "name",
    "boolean[]",
    "smallint[]",
    "integer[]",
    "bigint[]",
    "double precision[]",
    "numeric[]",
    "text[]",
    "character varying[]",
    "character[]",
    "uuid[]",
    "json[]",
    "jsonb[]",
];

/// Drops type modifiers such as `(64)` or `(10,2)`.
fn strip_modifiers(database_type: &str) -> String {
    let mut stripped = String::with_capacity(database_type.len());
    let mut depth = 0usize;
    for c in database_type.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => stripped.push(c),
            _ => {}
        }
    }
    stripped.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_lowercase()
}

/// Whether a column of this `format_type` can be returned as is. Unknown types are
/// not, since enums and domains only decode reliably as text.
pub fn decodes_natively(database_type: Option<&str>) -> bool {
    database_type
        .map(|t| NATIVE_TYPES.contains(&strip_modifiers(t).replace(" []", "[]").as_str()))
        .unwrap_or(false)
}

/// Converts every row, dropping (and logging) rows that cannot be decoded.
pub fn rows_to_field_maps(rows: &[Row]) -> Vec<FieldMap> {
    rows.iter()
        .filter_map(|row| match row_to_field_map(row) {
            Ok(map) => Some(map),
            Err(e) => {
                warn!("Skipping row that could not be decoded: {}", e);
                None
            }
        })
        .collect()
}

pub fn row_to_field_map(row: &Row) -> Result<FieldMap, RowDecodeError> {
    let mut map = FieldMap::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let value = column_value(row, idx, column.type_()).map_err(|source| {
            RowDecodeError::Column {
                column: column.name().to_string(),
                type_name: column.type_().name().to_string(),
                source,
            }
        })?;
        map.insert(column.name().to_string(), value);
    }
    Ok(map)
}

fn get<'a, T: FromSql<'a>>(row: &'a Row, idx: usize) -> Result<Option<T>, tokio_postgres::Error> {
    row.try_get::<_, Option<T>>(idx)
}

fn get_array<'a, T: FromSql<'a>>(
    row: &'a Row,
    idx: usize,
    to_json: impl Fn(T) -> Value,
) -> Result<Option<Value>, tokio_postgres::Error> {
    Ok(get::<Vec<Option<T>>>(row, idx)?.map(|items| {
        Value::Array(items.into_iter().map(|item| item.map(&to_json).unwrap_or(Value::Null)).collect())
    }))
}

fn column_value(row: &Row, idx: usize, ty: &PgType) -> Result<Value, tokio_postgres::Error> {
    let value = match ty.name() {
        "bool" => get::<bool>(row, idx)?.map(Value::Bool),
        "int2" => get::<i16>(row, idx)?.map(Value::from),
        "int4" => get::<i32>(row, idx)?.map(Value::from),
        "int8" => get::<i64>(row, idx)?.map(Value::from),
        "oid" => get::<u32>(row, idx)?.map(Value::from),
        "float4" => get::<f32>(row, idx)?.map(|v| float_to_json(v as f64)),
        "float8" => get::<f64>(row, idx)?.map(float_to_json),
        "numeric" => get::<Decimal>(row, idx)?.map(|v| Value::String(v.to_string())),
        "json" | "jsonb" => get::<Value>(row, idx)?,
        "uuid" => get::<Uuid>(row, idx)?.map(|v| Value::String(v.to_string())),
        "timestamptz" => get::<DateTime<Utc>>(row, idx)?.map(|v| Value::String(v.to_rfc3339())),
        "timestamp" => get::<NaiveDateTime>(row, idx)?
            .map(|v| Value::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        "date" => get::<NaiveDate>(row, idx)?.map(|v| Value::String(v.to_string())),
        "time" => get::<NaiveTime>(row, idx)?.map(|v| Value::String(v.to_string())),
        "bytea" => get::<Vec<u8>>(row, idx)?.map(|v| Value::String(bytea_to_hex(&v))),
        "_bool" => get_array::<bool>(row, idx, Value::Bool)?,
        "_int2" => get_array::<i16>(row, idx, Value::from)?,
        "_int4" => get_array::<i32>(row, idx, Value::from)?,
        "_int8" => get_array::<i64>(row, idx, Value::from)?,
        "_float8" => get_array::<f64>(row, idx, float_to_json)?,
        "_numeric" => get_array::<Decimal>(row, idx, |v| Value::String(v.to_string()))?,
        "_text" | "_varchar" | "_bpchar" => get_array::<String>(row, idx, Value::String)?,
        "_uuid" => get_array::<Uuid>(row, idx, |v| Value::String(v.to_string()))?,
        "_json" | "_jsonb" => get_array::<Value>(row, idx, |v| v)?,
        _ => get::<TextLike>(row, idx)?.map(|v| Value::String(v.0)),
    };
    Ok(value.unwrap_or(Value::Null))
}

/// Non-finite floats have no JSON number form and are kept as their text.
fn float_to_json(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or_else(|| Value::String(value.to_string()))
}

/// Same text form PostgreSQL uses for `bytea` output, so it can be written back as is.
fn bytea_to_hex(bytes: &[u8]) -> String {
    format!("\\x{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_to_json() {
        assert_eq!(float_to_json(1.25), serde_json::json!(1.25));
        assert_eq!(float_to_json(f64::NAN), Value::String("NaN".to_string()));
        assert_eq!(float_to_json(f64::INFINITY), Value::String("inf".to_string()));
    }

    #[test]
    fn test_decodes_natively() {
        assert!(decodes_natively(Some("integer")));
        assert!(decodes_natively(Some("character varying(64)")));
        assert!(decodes_natively(Some("numeric(10,2)")));
        assert!(decodes_natively(Some("timestamp(3) with time zone")));
        assert!(decodes_natively(Some("character varying(8)[]")));
        assert!(decodes_natively(Some("JSONB")));

        assert!(!decodes_natively(Some("interval")));
        assert!(!decodes_natively(Some("inet")));
        assert!(!decodes_natively(Some("money")));
        assert!(!decodes_natively(Some("time with time zone")));
        assert!(!decodes_natively(Some("timestamp with time zone[]")));
        assert!(!decodes_natively(Some("date[]")));
        assert!(!decodes_natively(Some("real[]")));
        assert!(!decodes_natively(Some("mood")));
        assert!(!decodes_natively(None));
    }

    #[test]
    fn test_bytea_to_hex() {
        assert_eq!(bytea_to_hex(&[0xde, 0xad, 0xbe, 0xef]), "\\xdeadbeef");
        assert_eq!(bytea_to_hex(&[]), "\\x");
    }

    #[test]
    fn test_text_like_accepts_strings_and_enums() {
        let mood = PgType::new(
            "mood".to_string(),
            90_001,
            Kind::Enum(vec!["happy".to_string(), "sad".to_string()]),
            "public".to_string(),
        );

        assert!(TextLike::accepts(&PgType::TEXT));
        assert!(TextLike::accepts(&PgType::VARCHAR));
        assert!(TextLike::accepts(&mood));
        assert!(!TextLike::accepts(&PgType::INT4));
    }

    #[test]
    fn test_text_like_decodes_utf8() {
        let decoded = TextLike::from_sql(&PgType::TEXT, "héllo".as_bytes()).unwrap();
        assert_eq!(decoded.0, "héllo");
        assert!(TextLike::from_sql(&PgType::TEXT, &[0xff, 0xfe]).is_err());
    }
}
