/// Result type alias for data-access operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for schema, query and table operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// Error from SQLx operations.
   #[error(transparent)]
   Sqlx(#[from] sqlx::Error),

   /// Error from keyset pagination (order tokens, cursors).
   #[error(transparent)]
   Keyset(#[from] sqlx_sqlite_keyset::Error),

   /// I/O error when accessing database files.
   #[error("io error: {0}")]
   Io(#[from] std::io::Error),

   /// JSON (de)serialization failed.
   #[error("json error: {0}")]
   Json(#[from] serde_json::Error),

   /// SQLite type that cannot be mapped to JSON.
   #[error("unsupported datatype: {0}")]
   UnsupportedDatatype(String),

   /// Multiple rows returned from fetch_one query.
   #[error("fetch_one() query returned {0} rows, expected 0 or 1")]
   MultipleRowsReturned(usize),

   /// Transaction failed and rollback also failed.
   #[error("transaction failed: {transaction_error}; rollback also failed: {rollback_error}")]
   TransactionRollbackFailed {
      transaction_error: String,
      rollback_error: String,
   },

   /// A transaction is already held on this handle.
   #[error("a transaction is already active on {0}")]
   TransactionAlreadyActive(String),

   /// The transaction this handle belongs to was committed or rolled back.
   #[error("transaction is no longer active")]
   TransactionClosed,

   /// Column name contains invalid characters.
   ///
   /// Column names must match `[a-zA-Z_][a-zA-Z0-9_.]*` (letters, digits,
   /// underscores, and dots for qualified names like `table.column`).
   #[error("invalid column name '{name}': must match [a-zA-Z_][a-zA-Z0-9_.]*")]
   InvalidColumnName { name: String },

   /// Comparison operator not accepted by `where_op`.
   #[error("unsupported comparison operator '{0}'")]
   InvalidOperator(String),

   /// Placeholder count of a raw condition differs from its values.
   #[error("raw condition has {placeholders} placeholders but {values} values")]
   PlaceholderMismatch { placeholders: usize, values: usize },

   /// Table is not registered in the catalog.
   #[error("no schema registered for table '{0}'")]
   UnknownTable(String),

   /// No join is declared between two tables.
   #[error("no join from {from} to {to}")]
   NoJoin { from: String, to: String },

   /// Relation is not declared on the schema.
   #[error("no relation '{relation}' on table '{table}'")]
   UnknownRelation { table: String, relation: String },

   /// Value could not be converted to its storage form.
   #[error("cannot encode field '{field}': {reason}")]
   FieldEncode { field: String, reason: String },

   /// Stored value could not be converted to its wire form.
   #[error("cannot decode field '{field}': {reason}")]
   FieldDecode { field: String, reason: String },

   /// Row handed to an operation lacks its primary key.
   #[error("row is missing primary key for table '{table}'")]
   MissingPrimaryKey { table: String },

   /// Page size must be greater than zero.
   #[error("page size must be greater than zero")]
   InvalidPageSize,

   /// Generic error for operations that don't fit other categories.
   #[error("{0}")]
   Other(String),
}

impl Error {
   /// Extract a structured error code from the error type.
   ///
   /// This provides machine-readable error codes for error handling.
   pub fn error_code(&self) -> String {
      match self {
         Error::Sqlx(e) => {
            if let Some(code) = e.as_database_error().and_then(|db_err| db_err.code()) {
               return format!("SQLITE_{}", code);
            }
            "SQLX_ERROR".to_string()
         }
         Error::Keyset(e) => e.error_code(),
         Error::Io(_) => "IO_ERROR".to_string(),
         Error::Json(_) => "JSON_ERROR".to_string(),
         Error::UnsupportedDatatype(_) => "UNSUPPORTED_DATATYPE".to_string(),
         Error::MultipleRowsReturned(_) => "MULTIPLE_ROWS_RETURNED".to_string(),
         Error::TransactionRollbackFailed { .. } => "TRANSACTION_ROLLBACK_FAILED".to_string(),
         Error::TransactionAlreadyActive(_) => "TRANSACTION_ALREADY_ACTIVE".to_string(),
         Error::TransactionClosed => "TRANSACTION_CLOSED".to_string(),
         Error::InvalidColumnName { .. } => "INVALID_COLUMN_NAME".to_string(),
         Error::InvalidOperator(_) => "INVALID_OPERATOR".to_string(),
         Error::PlaceholderMismatch { .. } => "PLACEHOLDER_MISMATCH".to_string(),
         Error::UnknownTable(_) => "UNKNOWN_TABLE".to_string(),
         Error::NoJoin { .. } => "NO_JOIN".to_string(),
         Error::UnknownRelation { .. } => "UNKNOWN_RELATION".to_string(),
         Error::FieldEncode { .. } => "FIELD_ENCODE".to_string(),
         Error::FieldDecode { .. } => "FIELD_DECODE".to_string(),
         Error::MissingPrimaryKey { .. } => "MISSING_PRIMARY_KEY".to_string(),
         Error::InvalidPageSize => "INVALID_PAGE_SIZE".to_string(),
         Error::Other(_) => "ERROR".to_string(),
      }
   }
}
