//! Field codecs: conversion between wire values and their stored form.
//!
//! | type         | wire            | stored          |
//! |--------------|-----------------|-----------------|
//! | `Boolean`    | `true`          | `1`             |
//! | `Csv`        | `["a", "b"]`    | `"a,b"`         |
//! | `CsvInteger` | `[1, 2]`        | `"1,2"`         |
//! | `Date`       | RFC 3339 string | UTC RFC 3339    |
//! | `Json`       | any JSON value  | JSON text       |
//!
//! NULL passes through every codec unchanged.

use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use time::OffsetDateTime;
use time::UtcOffset;
use time::format_description::well_known::Rfc3339;

use crate::naming::{to_storage, to_wire};
use crate::{Error, Result, Row};

/// Storage codec of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
   Boolean,
   Csv,
   CsvInteger,
   Date,
   Json,
}

impl FieldType {
   fn to_db(self, field: &str, value: JsonValue) -> Result<JsonValue> {
      if value.is_null() {
         return Ok(value);
      }

      let encode_err = |reason: &str| Error::FieldEncode {
         field: field.to_string(),
         reason: reason.to_string(),
      };

      match self {
         FieldType::Boolean => match value {
            JsonValue::Bool(b) => Ok(JsonValue::from(i64::from(b))),
            JsonValue::Number(_) => Ok(value),
            _ => Err(encode_err("expected a boolean")),
         },
         FieldType::Csv | FieldType::CsvInteger => match value {
            JsonValue::Array(items) => {
               let parts = items
                  .iter()
                  .map(|item| match item {
                     JsonValue::String(s) => Ok(s.clone()),
                     JsonValue::Number(n) => Ok(n.to_string()),
                     _ => Err(encode_err("list items must be strings or numbers")),
                  })
                  .collect::<Result<Vec<_>>>()?;
               Ok(JsonValue::String(parts.join(",")))
            }
            JsonValue::String(_) => Ok(value),
            _ => Err(encode_err("expected a list")),
         },
         FieldType::Date => {
            let JsonValue::String(text) = &value else {
               return Err(encode_err("expected an RFC 3339 string"));
            };
            let parsed = OffsetDateTime::parse(text, &Rfc3339)
               .map_err(|e| encode_err(&format!("invalid date: {e}")))?;
            let normalized = parsed
               .to_offset(UtcOffset::UTC)
               .format(&Rfc3339)
               .map_err(|e| encode_err(&format!("invalid date: {e}")))?;
            Ok(JsonValue::String(normalized))
         }
         FieldType::Json => Ok(JsonValue::String(serde_json::to_string(&value)?)),
      }
   }

   fn from_db(self, field: &str, value: JsonValue) -> Result<JsonValue> {
      if value.is_null() {
         return Ok(value);
      }

      let decode_err = |reason: String| Error::FieldDecode {
         field: field.to_string(),
         reason,
      };

      match self {
         FieldType::Boolean => match &value {
            JsonValue::Number(n) => Ok(JsonValue::Bool(n.as_f64().is_some_and(|f| f != 0.0))),
            JsonValue::Bool(_) => Ok(value),
            _ => Err(decode_err("expected an integer".into())),
         },
         FieldType::Csv => match &value {
            JsonValue::String(s) => Ok(JsonValue::Array(
               split_csv(s).map(|item| JsonValue::String(item.to_string())).collect(),
            )),
            _ => Err(decode_err("expected text".into())),
         },
         FieldType::CsvInteger => match &value {
            JsonValue::String(s) => Ok(JsonValue::Array(
               split_csv(s)
                  .map(|item| {
                     item
                        .trim()
                        .parse::<i64>()
                        .map_or(JsonValue::Null, JsonValue::from)
                  })
                  .collect(),
            )),
            _ => Err(decode_err("expected text".into())),
         },
         FieldType::Date => Ok(value),
         FieldType::Json => match &value {
            JsonValue::String(s) => {
               serde_json::from_str(s).map_err(|e| decode_err(format!("invalid JSON: {e}")))
            }
            _ => Ok(value),
         },
      }
   }
}

fn split_csv(s: &str) -> impl Iterator<Item = &str> {
   s.split(',').filter(move |_| !s.is_empty())
}

/// A declared field: optional codec plus optional default.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
   name: String,
   kind: Option<FieldType>,
   default: Option<JsonValue>,
}

impl Field {
   /// Field with a storage codec. `name` is the wire (camelCase) name.
   pub fn new(name: impl Into<String>, kind: FieldType) -> Self {
      Self {
         name: name.into(),
         kind: Some(kind),
         default: None,
      }
   }

   /// Field without a codec, typically declared only for its default.
   pub fn plain(name: impl Into<String>) -> Self {
      Self {
         name: name.into(),
         kind: None,
         default: None,
      }
   }

   /// Value used on create when the field is absent or null.
   pub fn default_value(mut self, value: impl Into<JsonValue>) -> Self {
      self.default = Some(value.into());
      self
   }

   pub fn name(&self) -> &str {
      &self.name
   }

   pub fn kind(&self) -> Option<FieldType> {
      self.kind
   }

   pub fn default(&self) -> Option<&JsonValue> {
      self.default.as_ref()
   }

   pub fn to_db(&self, value: JsonValue) -> Result<JsonValue> {
      match self.kind {
         Some(kind) => kind.to_db(&self.name, value),
         None => Ok(value),
      }
   }

   pub fn from_db(&self, value: JsonValue) -> Result<JsonValue> {
      match self.kind {
         Some(kind) => kind.from_db(&self.name, value),
         None => Ok(value),
      }
   }
}

/// Encode every declared field of a wire row.
fn encode_row(fields: &IndexMap<String, Field>, row: Row) -> Result<Row> {
   row.into_iter()
      .map(|(key, value)| {
         let value = match fields.get(&key) {
            Some(field) => field.to_db(value)?,
            None => value,
         };
         Ok((key, value))
      })
      .collect()
}

/// Decode every declared field of a (camelized) stored row.
fn decode_row(fields: &IndexMap<String, Field>, row: Row) -> Result<Row> {
   row.into_iter()
      .map(|(key, value)| {
         let value = match fields.get(&key) {
            Some(field) => field.from_db(value)?,
            None => value,
         };
         Ok((key, value))
      })
      .collect()
}

/// Encode a wire row and translate its keys to storage names.
pub(crate) fn storage_row(fields: &IndexMap<String, Field>, row: Row) -> Result<Row> {
   Ok(encode_row(fields, row)?
      .into_iter()
      .map(|(key, value)| (to_storage(&key), value))
      .collect())
}

/// Translate a stored row's keys to wire names and decode its fields.
pub(crate) fn wire_row(fields: &IndexMap<String, Field>, row: Row) -> Result<Row> {
   let row = row
      .into_iter()
      .map(|(key, value)| (to_wire(&key), value))
      .collect();
   decode_row(fields, row)
}

/// Current time as a UTC RFC 3339 string.
pub(crate) fn now_timestamp() -> Result<JsonValue> {
   OffsetDateTime::now_utc()
      .format(&Rfc3339)
      .map(JsonValue::String)
      .map_err(|e| Error::Other(format!("cannot format timestamp: {e}")))
}
