//! SQLite value to JSON conversion.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use sqlx::sqlite::{SqliteRow, SqliteValueRef};
use sqlx::{Column, Decode, Row as _, Sqlite, TypeInfo, ValueRef};

use crate::{Error, Result, Row};

/// Column alias prefix of the values a row's cursor is built from.
pub(crate) const SORT_KEY_PREFIX: &str = "__sort_key_";

/// Decode every column of a result row, keeping the column order.
///
/// Sort key columns must hold values a cursor can carry; a BLOB there is
/// rejected, since its base64 text would not compare with the stored bytes.
pub(crate) fn to_row(row: &SqliteRow) -> Result<Row> {
   let mut value = IndexMap::with_capacity(row.columns().len());
   for (i, column) in row.columns().iter().enumerate() {
      let v = row.try_get_raw(i)?;
      if column.name().starts_with(SORT_KEY_PREFIX)
         && !v.is_null()
         && v.type_info().name() == "BLOB"
      {
         return Err(sqlx_sqlite_keyset::Error::UnsupportedValueType("blob").into());
      }
      value.insert(column.name().to_string(), to_json(v)?);
   }
   Ok(value)
}

/// Convert one SQLite value to JSON.
///
/// BLOBs become standard base64 strings.
pub(crate) fn to_json(value: SqliteValueRef<'_>) -> Result<JsonValue> {
   if value.is_null() {
      return Ok(JsonValue::Null);
   }

   let type_name = value.type_info().name().to_string();
   let json = match type_name.as_str() {
      "TEXT" | "DATE" | "TIME" | "DATETIME" => JsonValue::String(decode::<String>(value)?),
      "REAL" => {
         let n = decode::<f64>(value)?;
         serde_json::Number::from_f64(n).map_or(JsonValue::Null, JsonValue::Number)
      }
      "INTEGER" | "NUMERIC" | "BOOLEAN" => JsonValue::from(decode::<i64>(value)?),
      "BLOB" => JsonValue::String(STANDARD.encode(decode::<Vec<u8>>(value)?)),
      other => return Err(Error::UnsupportedDatatype(other.to_string())),
   };

   Ok(json)
}

fn decode<'r, T: Decode<'r, Sqlite>>(value: SqliteValueRef<'r>) -> Result<T> {
   T::decode(value).map_err(|e| Error::Sqlx(sqlx::Error::Decode(e)))
}
