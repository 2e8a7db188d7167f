//! Opaque pagination cursors.
//!
//! A cursor carries the ordering values of the last row a client has seen, one
//! value per ordering column. On the wire it is the standard base64 encoding of
//! a JSON array:
//!
//! ```text
//! ["Team 3", 7]  ->  WyJUZWFtIDMiLDdd
//! ```
//!
//! Clients must treat the string as opaque. Nothing is stored server-side.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value as JsonValue};
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

use crate::{Error, Result};

/// Longest accepted encoded cursor, in bytes.
pub const MAX_CURSOR_LEN: usize = 4096;

/// One ordering value of the last-seen row.
///
/// Two values are equal when their JSON wire forms are equal. A `Timestamp`
/// is written as a UTC RFC 3339 string, so it decodes back as `Text`.
#[derive(Debug, Clone)]
pub enum CursorValue {
   Null,
   Number(Number),
   Text(String),
   Timestamp(OffsetDateTime),
}

impl CursorValue {
   pub fn is_null(&self) -> bool {
      matches!(self, CursorValue::Null)
   }

   /// Wire form of this value.
   pub fn to_json(&self) -> Result<JsonValue> {
      Ok(match self {
         CursorValue::Null => JsonValue::Null,
         CursorValue::Number(n) => JsonValue::Number(n.clone()),
         CursorValue::Text(s) => JsonValue::String(s.clone()),
         CursorValue::Timestamp(ts) => JsonValue::String(format_timestamp(ts)?),
      })
   }
}

fn format_timestamp(ts: &OffsetDateTime) -> Result<String> {
   ts.to_offset(UtcOffset::UTC)
      .format(&Rfc3339)
      .map_err(|_| Error::UnsupportedValueType("timestamp outside the RFC 3339 range"))
}

impl PartialEq for CursorValue {
   fn eq(&self, other: &Self) -> bool {
      match (self, other) {
         (CursorValue::Null, CursorValue::Null) => true,
         (CursorValue::Number(a), CursorValue::Number(b)) => a == b,
         (CursorValue::Text(a), CursorValue::Text(b)) => a == b,
         (CursorValue::Timestamp(a), CursorValue::Timestamp(b)) => a == b,
         (CursorValue::Text(text), CursorValue::Timestamp(ts))
         | (CursorValue::Timestamp(ts), CursorValue::Text(text)) => {
            format_timestamp(ts).is_ok_and(|formatted| &formatted == text)
         }
         _ => false,
      }
   }
}

impl From<i64> for CursorValue {
   fn from(n: i64) -> Self {
      CursorValue::Number(n.into())
   }
}

impl From<u64> for CursorValue {
   fn from(n: u64) -> Self {
      CursorValue::Number(n.into())
   }
}

impl From<Number> for CursorValue {
   fn from(n: Number) -> Self {
      CursorValue::Number(n)
   }
}

impl From<&str> for CursorValue {
   fn from(s: &str) -> Self {
      CursorValue::Text(s.to_string())
   }
}

impl From<String> for CursorValue {
   fn from(s: String) -> Self {
      CursorValue::Text(s)
   }
}

impl From<OffsetDateTime> for CursorValue {
   fn from(ts: OffsetDateTime) -> Self {
      CursorValue::Timestamp(ts)
   }
}

impl<T: Into<CursorValue>> From<Option<T>> for CursorValue {
   fn from(value: Option<T>) -> Self {
      value.map_or(CursorValue::Null, Into::into)
   }
}

impl TryFrom<&JsonValue> for CursorValue {
   type Error = Error;

   fn try_from(value: &JsonValue) -> Result<Self> {
      match value {
         JsonValue::Null => Ok(CursorValue::Null),
         JsonValue::Number(n) => Ok(CursorValue::Number(n.clone())),
         JsonValue::String(s) => Ok(CursorValue::Text(s.clone())),
         JsonValue::Bool(_) => Err(Error::UnsupportedValueType("boolean")),
         JsonValue::Array(_) => Err(Error::UnsupportedValueType("array")),
         JsonValue::Object(_) => Err(Error::UnsupportedValueType("object")),
      }
   }
}

/// Opaque, transport-safe pagination cursor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
   /// Encode the ordering values of a row.
   pub fn encode(values: &[CursorValue]) -> Result<Self> {
      let array = values
         .iter()
         .map(CursorValue::to_json)
         .collect::<Result<Vec<_>>>()?;

      Ok(Self::from_array(array))
   }

   /// Encode raw JSON values, e.g. the sort key columns read back from a row.
   pub fn from_json_values(values: &[JsonValue]) -> Result<Self> {
      for value in values {
         CursorValue::try_from(value)?;
      }

      Ok(Self::from_array(values.to_vec()))
   }

   fn from_array(array: Vec<JsonValue>) -> Self {
      Self(STANDARD.encode(JsonValue::Array(array).to_string()))
   }

   /// Decode the ordering values carried by this cursor.
   pub fn decode(&self) -> Result<Vec<CursorValue>> {
      if self.0.len() > MAX_CURSOR_LEN {
         return Err(Error::MalformedCursor(format!(
            "cursor exceeds {MAX_CURSOR_LEN} bytes"
         )));
      }

      let bytes = STANDARD
         .decode(self.0.as_bytes())
         .map_err(|e| Error::MalformedCursor(format!("invalid base64: {e}")))?;

      let json: JsonValue = serde_json::from_slice(&bytes)
         .map_err(|e| Error::MalformedCursor(format!("invalid JSON: {e}")))?;

      let JsonValue::Array(items) = json else {
         return Err(Error::MalformedCursor("expected a JSON array".into()));
      };

      items.iter().map(CursorValue::try_from).collect()
   }

   pub fn as_str(&self) -> &str {
      &self.0
   }

   pub fn into_string(self) -> String {
      self.0
   }
}

impl From<String> for Cursor {
   fn from(s: String) -> Self {
      Self(s)
   }
}

impl From<&str> for Cursor {
   fn from(s: &str) -> Self {
      Self(s.to_string())
   }
}

impl AsRef<str> for Cursor {
   fn as_ref(&self) -> &str {
      &self.0
   }
}

impl fmt::Display for Cursor {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(&self.0)
   }
}
