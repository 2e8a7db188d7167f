//! Configuration for database connection pools

use std::time::Duration;

use sqlx_sqlite_keyset::NullPlacement;

/// Configuration for a [`Database`](crate::Database) connection pool
///
/// # Examples
///
/// ```
/// use sqlx_sqlite_schema::DatabaseConfig;
/// use std::time::Duration;
///
/// // Use defaults
/// let config = DatabaseConfig::default();
///
/// // Override just one field
/// let config = DatabaseConfig {
///    max_connections: 3,
///    ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
   /// Maximum number of pooled connections
   ///
   /// Default: 6
   pub max_connections: u32,

   /// Idle timeout for pooled connections
   ///
   /// Connections that remain idle for this duration will be closed automatically.
   ///
   /// Default: 30 seconds
   pub idle_timeout: Duration,

   /// How long a connection waits on a locked database before failing
   ///
   /// Default: 5 seconds
   pub busy_timeout: Duration,

   /// Where NULLs sort in keyset orderings
   ///
   /// Default: [`NullPlacement::Smallest`], SQLite's native ordering
   pub null_placement: NullPlacement,
}

impl Default for DatabaseConfig {
   fn default() -> Self {
      Self {
         max_connections: 6,
         idle_timeout: Duration::from_secs(30),
         busy_timeout: Duration::from_secs(5),
         null_placement: NullPlacement::Smallest,
      }
   }
}
