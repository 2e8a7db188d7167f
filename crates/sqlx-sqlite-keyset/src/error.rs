/// Result type alias for keyset operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building a paginated query.
///
/// Every variant is a client error scoped to a single request. None of them are
/// recovered locally: ignoring a bad cursor or ordering would silently skip or
/// duplicate rows.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
   /// Ordering token could not be parsed.
   #[error("invalid order token '{token}': {reason}")]
   InvalidOrderToken { token: String, reason: &'static str },

   /// Ordering column is not known to the query it is applied to.
   #[error("unknown order column '{column}'")]
   UnknownOrderColumn { column: String },

   /// Cursor is not valid base64, not valid JSON, or not a JSON array.
   #[error("malformed cursor: {0}")]
   MalformedCursor(String),

   /// Cursor was issued for an ordering with a different number of columns.
   #[error("cursor has {cursor_len} values but ordering has {ordering_len} columns")]
   OrderingLengthMismatch {
      cursor_len: usize,
      ordering_len: usize,
   },

   /// Value kind that has no cursor representation.
   #[error("unsupported cursor value type: {0}")]
   UnsupportedValueType(&'static str),
}

impl Error {
   /// Extract a structured error code from the error type.
   pub fn error_code(&self) -> String {
      match self {
         Error::InvalidOrderToken { .. } => "INVALID_ORDER_TOKEN".to_string(),
         Error::UnknownOrderColumn { .. } => "UNKNOWN_ORDER_COLUMN".to_string(),
         Error::MalformedCursor(_) => "MALFORMED_CURSOR".to_string(),
         Error::OrderingLengthMismatch { .. } => "ORDERING_LENGTH_MISMATCH".to_string(),
         Error::UnsupportedValueType(_) => "UNSUPPORTED_VALUE_TYPE".to_string(),
      }
   }
}
