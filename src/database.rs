use std::fs::create_dir_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::sqlite::{
   SqliteArguments, SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool,
   SqlitePoolOptions,
};
use sqlx::{Connection, Sqlite};
use tokio::sync::Mutex;
use tracing::debug;

use crate::catalog::Catalog;
use crate::config::DatabaseConfig;
use crate::decode::to_row;
use crate::table::Table;
use crate::{Error, Result, Row};

/// Result returned from write operations (e.g. INSERT, UPDATE, DELETE).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteQueryResult {
   /// The number of rows affected by the write operation.
   pub rows_affected: u64,
   /// The last inserted row ID (SQLite ROWID).
   ///
   /// Only set for INSERT operations on tables with a ROWID.
   /// Tables created with `WITHOUT ROWID` will not set this value (returns 0).
   pub last_insert_id: i64,
}

/// Open write transaction shared by every handle created from a [`Transaction`].
///
/// `None` once the transaction has been committed or rolled back.
type SharedTransaction = Arc<Mutex<Option<sqlx::Transaction<'static, Sqlite>>>>;

/// A SQLite connection pool paired with the catalog of schemas it serves.
///
/// Cloning is cheap; clones share the pool and the catalog.
#[derive(Debug, Clone)]
pub struct Database {
   pool: SqlitePool,
   catalog: Arc<Catalog>,
   config: DatabaseConfig,
   path: PathBuf,
   transaction: Option<SharedTransaction>,
}

impl Database {
   /// Open (creating if missing) the database at `path` in WAL mode.
   pub async fn connect(
      path: impl AsRef<Path>,
      catalog: impl Into<Arc<Catalog>>,
      custom_config: Option<DatabaseConfig>,
   ) -> Result<Self> {
      let path = path.as_ref().to_path_buf();
      let config = custom_config.unwrap_or_default();

      if let Some(parent) = path.parent()
         && !parent.as_os_str().is_empty()
      {
         create_dir_all(parent)?;
      }

      let options = SqliteConnectOptions::new()
         .filename(&path)
         .create_if_missing(true)
         .journal_mode(SqliteJournalMode::Wal)
         .busy_timeout(config.busy_timeout)
         .foreign_keys(true);

      let pool = SqlitePoolOptions::new()
         .max_connections(config.max_connections)
         .idle_timeout(config.idle_timeout)
         .connect_with(options)
         .await?;

      debug!("connected to {}", path.display());

      Ok(Self {
         pool,
         catalog: catalog.into(),
         config,
         path,
         transaction: None,
      })
   }

   pub fn catalog(&self) -> &Catalog {
      &self.catalog
   }

   pub fn config(&self) -> &DatabaseConfig {
      &self.config
   }

   pub fn path(&self) -> &Path {
      &self.path
   }

   /// Whether statements run inside a caller-held [`Transaction`].
   pub fn in_transaction(&self) -> bool {
      self.transaction.is_some()
   }

   /// Table operations for a table registered in the catalog.
   pub fn table(&self, name: &str) -> Result<Table> {
      let schema = self.catalog.schema(name)?;
      Ok(Table::new(self.clone(), schema))
   }

   /// Start a write transaction (`BEGIN IMMEDIATE`) held by the caller.
   ///
   /// Tables and queries obtained from the returned [`Transaction`] run on its
   /// connection until it is committed or rolled back. Dropping it without
   /// committing rolls back.
   pub async fn begin(&self) -> Result<Transaction> {
      if self.transaction.is_some() {
         return Err(Error::TransactionAlreadyActive(self.path.display().to_string()));
      }

      let tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
      debug!("transaction started on {}", self.path.display());

      Ok(Transaction {
         db: Self {
            transaction: Some(Arc::new(Mutex::new(Some(tx)))),
            ..self.clone()
         },
      })
   }

   /// Execute a write query (INSERT/UPDATE/DELETE)
   pub async fn execute(&self, query: String, values: Vec<JsonValue>) -> Result<WriteQueryResult> {
      debug!("execute: {}", query);

      match &self.transaction {
         Some(shared) => {
            let mut slot = shared.lock().await;
            let tx = slot.as_mut().ok_or(Error::TransactionClosed)?;
            execute_on(&mut **tx, &query, values).await
         }
         None => {
            let mut conn = self.pool.acquire().await?;
            execute_on(&mut conn, &query, values).await
         }
      }
   }

   /// Execute multiple write statements atomically within a transaction.
   ///
   /// Statements run in order on one connection between `BEGIN IMMEDIATE` and
   /// `COMMIT`. Any failure rolls the whole transaction back. Inside a
   /// caller-held transaction they run under a savepoint instead.
   pub async fn execute_transaction(
      &self,
      statements: Vec<(String, Vec<JsonValue>)>,
   ) -> Result<Vec<WriteQueryResult>> {
      match &self.transaction {
         Some(shared) => {
            let mut slot = shared.lock().await;
            let tx = slot.as_mut().ok_or(Error::TransactionClosed)?;
            let savepoint = tx.begin().await?;
            execute_batch(savepoint, statements).await
         }
         None => {
            let tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
            execute_batch(tx, statements).await
         }
      }
   }

   /// Run row-returning statements (e.g. `INSERT … RETURNING *`) atomically.
   ///
   /// Returns the rows of each statement, in statement order.
   pub async fn fetch_all_transaction(
      &self,
      statements: Vec<(String, Vec<JsonValue>)>,
   ) -> Result<Vec<Vec<Row>>> {
      match &self.transaction {
         Some(shared) => {
            let mut slot = shared.lock().await;
            let tx = slot.as_mut().ok_or(Error::TransactionClosed)?;
            let savepoint = tx.begin().await?;
            fetch_batch(savepoint, statements).await
         }
         None => {
            let tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
            fetch_batch(tx, statements).await
         }
      }
   }

   /// Execute a SELECT query, possibly returning multiple rows
   pub async fn fetch_all(&self, query: String, values: Vec<JsonValue>) -> Result<Vec<Row>> {
      debug!("fetch_all: {}", query);

      match &self.transaction {
         Some(shared) => {
            let mut slot = shared.lock().await;
            let tx = slot.as_mut().ok_or(Error::TransactionClosed)?;
            fetch_all_on(&mut **tx, &query, values).await
         }
         None => {
            let mut conn = self.pool.acquire().await?;
            fetch_all_on(&mut conn, &query, values).await
         }
      }
   }

   /// Execute a SELECT query expecting zero or one result
   pub async fn fetch_one(&self, query: String, values: Vec<JsonValue>) -> Result<Option<Row>> {
      // Fetch up to 2 rows to know if there's more than 1
      let limited_query = format!("{} LIMIT 2", query.trim_end().trim_end_matches(';'));
      let mut rows = self.fetch_all(limited_query, values).await?;

      match rows.len() {
         0 => Ok(None),
         1 => Ok(rows.pop()),
         count => Err(Error::MultipleRowsReturned(count)),
      }
   }

   /// Close the database connection pool
   pub async fn close(self) -> Result<()> {
      self.pool.close().await;
      debug!("closed {}", self.path.display());
      Ok(())
   }

   /// Close the pool and remove the database file with its `-wal` / `-shm` siblings
   pub async fn remove(self) -> Result<()> {
      self.pool.close().await;

      let base = self.path.as_os_str().to_owned();
      for suffix in ["", "-wal", "-shm"] {
         let mut file = base.clone();
         file.push(suffix);
         match std::fs::remove_file(&file) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
         }
      }

      debug!("removed {}", self.path.display());
      Ok(())
   }
}

/// A write transaction held by the caller.
///
/// ```no_run
/// # async fn example(db: sqlx_sqlite_schema::Database) -> sqlx_sqlite_schema::Result<()> {
/// use serde_json::json;
///
/// let tx = db.begin().await?;
/// let teams = tx.table("teams")?;
/// let row = [("name".to_string(), json!("Team 1"))].into_iter().collect();
/// let team = teams.find_or_create(row).await?;
/// tx.table("players")?
///    .create([("teamId".to_string(), team["id"].clone())].into_iter().collect())
///    .await?;
/// tx.commit().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
#[must_use = "if unused, the transaction is immediately rolled back"]
pub struct Transaction {
   db: Database,
}

impl Transaction {
   /// Database handle whose statements run inside this transaction.
   pub fn database(&self) -> &Database {
      &self.db
   }

   /// Table operations that run inside this transaction.
   pub fn table(&self, name: &str) -> Result<Table> {
      self.db.table(name)
   }

   pub async fn commit(self) -> Result<()> {
      let tx = self.take().await?;
      tx.commit().await?;
      debug!("transaction committed on {}", self.db.path.display());
      Ok(())
   }

   pub async fn rollback(self) -> Result<()> {
      let tx = self.take().await?;
      tx.rollback().await?;
      debug!("transaction rolled back on {}", self.db.path.display());
      Ok(())
   }

   async fn take(&self) -> Result<sqlx::Transaction<'static, Sqlite>> {
      let shared = self.db.transaction.as_ref().ok_or(Error::TransactionClosed)?;
      shared.lock().await.take().ok_or(Error::TransactionClosed)
   }
}

impl Drop for Transaction {
   fn drop(&mut self) {
      // Handles cloned from this transaction must not keep it open; dropping
      // the sqlx transaction queues its rollback.
      if let Some(shared) = &self.db.transaction
         && let Ok(mut slot) = shared.try_lock()
         && slot.take().is_some()
      {
         debug!(
            "dropping transaction on {} (will roll back)",
            self.db.path.display()
         );
      }
   }
}

async fn execute_on(
   conn: &mut SqliteConnection,
   query: &str,
   values: Vec<JsonValue>,
) -> Result<WriteQueryResult> {
   let result = bind_values(sqlx::query(query), values)
      .execute(&mut *conn)
      .await?;

   Ok(WriteQueryResult {
      rows_affected: result.rows_affected(),
      last_insert_id: result.last_insert_rowid(),
   })
}

async fn fetch_all_on(
   conn: &mut SqliteConnection,
   query: &str,
   values: Vec<JsonValue>,
) -> Result<Vec<Row>> {
   let rows = bind_values(sqlx::query(query), values)
      .fetch_all(&mut *conn)
      .await?;

   rows.iter().map(to_row).collect()
}

async fn execute_batch(
   mut tx: sqlx::Transaction<'_, Sqlite>,
   statements: Vec<(String, Vec<JsonValue>)>,
) -> Result<Vec<WriteQueryResult>> {
   let result = async {
      let mut results = Vec::with_capacity(statements.len());
      for (query, values) in statements {
         debug!("execute (transaction): {}", query);
         results.push(execute_on(&mut tx, &query, values).await?);
      }
      Ok::<Vec<WriteQueryResult>, Error>(results)
   }
   .await;

   finish_transaction(tx, result).await
}

async fn fetch_batch(
   mut tx: sqlx::Transaction<'_, Sqlite>,
   statements: Vec<(String, Vec<JsonValue>)>,
) -> Result<Vec<Vec<Row>>> {
   let result = async {
      let mut results = Vec::with_capacity(statements.len());
      for (query, values) in statements {
         debug!("fetch_all (transaction): {}", query);
         results.push(fetch_all_on(&mut tx, &query, values).await?);
      }
      Ok::<Vec<Vec<Row>>, Error>(results)
   }
   .await;

   finish_transaction(tx, result).await
}

/// Commit on success; roll back on failure, reporting both errors if the
/// rollback fails too.
async fn finish_transaction<T>(tx: sqlx::Transaction<'_, Sqlite>, result: Result<T>) -> Result<T> {
   match result {
      Ok(value) => {
         tx.commit().await?;
         Ok(value)
      }
      Err(e) => match tx.rollback().await {
         Ok(()) => Err(e),
         Err(rollback_err) => Err(Error::TransactionRollbackFailed {
            transaction_error: e.to_string(),
            rollback_error: rollback_err.to_string(),
         }),
      },
   }
}

type SqliteQuery<'a> = sqlx::query::Query<'a, Sqlite, SqliteArguments<'a>>;

fn bind_values(mut query: SqliteQuery<'_>, values: Vec<JsonValue>) -> SqliteQuery<'_> {
   for value in values {
      query = bind_value(query, value);
   }
   query
}

/// Bind a JSON value to a SQLx query
///
/// Booleans are stored as 0/1. Arrays and objects are stored as JSON text.
fn bind_value(query: SqliteQuery<'_>, value: JsonValue) -> SqliteQuery<'_> {
   match value {
      JsonValue::Null => query.bind(None::<JsonValue>),
      JsonValue::String(s) => query.bind(s),
      JsonValue::Bool(b) => query.bind(i64::from(b)),
      JsonValue::Number(number) => {
         // Preserve integer precision by binding as i64 when possible
         if let Some(int_val) = number.as_i64() {
            query.bind(int_val)
         } else if let Some(uint_val) = number.as_u64() {
            // Value too large for i64, use f64 (will lose precision)
            query.bind(uint_val as f64)
         } else {
            query.bind(number.as_f64().unwrap_or_default())
         }
      }
      other => query.bind(other),
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use serde_json::json;
   use tempfile::TempDir;

   async fn create_test_db() -> (Database, TempDir) {
      let temp_dir = TempDir::new().expect("Failed to create temp directory");
      let db_path = temp_dir.path().join("test.db");
      let db = Database::connect(&db_path, Catalog::new(), None)
         .await
         .expect("Failed to connect to test database");

      (db, temp_dir)
   }

   #[tokio::test]
   async fn test_execute_and_write_result() {
      let (db, _temp) = create_test_db().await;

      let result = db
         .execute(
            "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)".into(),
            vec![],
         )
         .await
         .unwrap();

      assert_eq!(result.rows_affected, 0);

      let result = db
         .execute(
            "INSERT INTO t (name) VALUES ($1)".into(),
            vec![json!("Alice")],
         )
         .await
         .unwrap();

      assert_eq!((result.rows_affected, result.last_insert_id), (1, 1));

      let result = db
         .execute("UPDATE t SET name = 'X' WHERE id > 0".into(), vec![])
         .await
         .unwrap();

      assert_eq!(result.rows_affected, 1);

      db.remove().await.unwrap();
   }

   #[tokio::test]
   async fn test_fetch_one() {
      let (db, _temp) = create_test_db().await;
      db.execute(
         "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)".into(),
         vec![],
      )
      .await
      .unwrap();

      assert!(
         db.fetch_one("SELECT * FROM t WHERE id = $1".into(), vec![json!(999)])
            .await
            .unwrap()
            .is_none()
      );

      db.execute(
         "INSERT INTO t (name) VALUES ($1), ($2)".into(),
         vec![json!("Alice"), json!("Bob")],
      )
      .await
      .unwrap();

      let row = db
         .fetch_one("SELECT * FROM t WHERE id = $1".into(), vec![json!(1)])
         .await
         .unwrap()
         .unwrap();

      assert_eq!(row.get("name"), Some(&json!("Alice")));

      let err = db
         .fetch_one("SELECT * FROM t".into(), vec![])
         .await
         .unwrap_err();

      assert!(err.to_string().contains("2 rows"));

      db.remove().await.unwrap();
   }

   #[tokio::test]
   async fn test_transactions() {
      let (db, _temp) = create_test_db().await;
      db.execute(
         "CREATE TABLE t (id INTEGER PRIMARY KEY, val INTEGER NOT NULL)".into(),
         vec![],
      )
      .await
      .unwrap();

      db.execute(
         "INSERT INTO t (id, val) VALUES (1, 100), (2, 50)".into(),
         vec![],
      )
      .await
      .unwrap();

      let results = db
         .execute_transaction(vec![
            ("UPDATE t SET val = val - 30 WHERE id = 1".into(), vec![]),
            ("UPDATE t SET val = val + 30 WHERE id = 2".into(), vec![]),
         ])
         .await
         .unwrap();

      assert_eq!(results.len(), 2);

      // Failed transaction rolls back (NULL violates NOT NULL)
      let err = db
         .execute_transaction(vec![
            ("UPDATE t SET val = 999 WHERE id = 1".into(), vec![]),
            ("INSERT INTO t (id, val) VALUES (3, NULL)".into(), vec![]),
         ])
         .await;

      assert!(err.is_err());

      let row = db
         .fetch_one("SELECT val FROM t WHERE id = 1".into(), vec![])
         .await
         .unwrap()
         .unwrap();

      assert_eq!(row.get("val"), Some(&json!(70)));

      db.remove().await.unwrap();
   }

   #[tokio::test]
   async fn test_held_transaction_uses_savepoints_for_batches() {
      let (db, _temp) = create_test_db().await;
      db.execute(
         "CREATE TABLE t (id INTEGER PRIMARY KEY, val INTEGER NOT NULL)".into(),
         vec![],
      )
      .await
      .unwrap();

      let tx = db.begin().await.unwrap();
      let inner = tx.database();
      assert!(inner.in_transaction());

      inner
         .execute("INSERT INTO t (id, val) VALUES (1, 10)".into(), vec![])
         .await
         .unwrap();

      // A failing batch only undoes its own statements
      let err = inner
         .execute_transaction(vec![
            ("INSERT INTO t (id, val) VALUES (2, 20)".into(), vec![]),
            ("INSERT INTO t (id, val) VALUES (3, NULL)".into(), vec![]),
         ])
         .await;
      assert!(err.is_err());

      let rows = inner
         .fetch_all("SELECT id FROM t ORDER BY id".into(), vec![])
         .await
         .unwrap();
      assert_eq!(rows.len(), 1);

      // Not visible outside until committed
      let outside = db.fetch_all("SELECT id FROM t".into(), vec![]).await.unwrap();
      assert!(outside.is_empty());

      let err = inner.begin().await.unwrap_err();
      assert_eq!(err.error_code(), "TRANSACTION_ALREADY_ACTIVE");

      let handle = inner.clone();
      tx.commit().await.unwrap();

      let outside = db.fetch_all("SELECT id FROM t".into(), vec![]).await.unwrap();
      assert_eq!(outside.len(), 1);

      let err = handle.fetch_all("SELECT id FROM t".into(), vec![]).await.unwrap_err();
      assert_eq!(err.error_code(), "TRANSACTION_CLOSED");

      db.remove().await.unwrap();
   }

   #[tokio::test]
   async fn test_dropped_transaction_rolls_back() {
      let (db, _temp) = create_test_db().await;
      db.execute("CREATE TABLE t (id INTEGER PRIMARY KEY)".into(), vec![])
         .await
         .unwrap();

      {
         let tx = db.begin().await.unwrap();
         tx.database()
            .execute("INSERT INTO t (id) VALUES (1)".into(), vec![])
            .await
            .unwrap();
      }

      // The write lock is released, so a new transaction can start
      let tx = db.begin().await.unwrap();
      let rows = tx
         .database()
         .fetch_all("SELECT id FROM t".into(), vec![])
         .await
         .unwrap();
      assert!(rows.is_empty());
      tx.rollback().await.unwrap();

      db.remove().await.unwrap();
   }

   #[tokio::test]
   async fn test_fetch_all_transaction_returns_rows() {
      let (db, _temp) = create_test_db().await;
      db.execute(
         "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)".into(),
         vec![],
      )
      .await
      .unwrap();

      let results = db
         .fetch_all_transaction(vec![
            (
               "INSERT INTO t (name) VALUES ($1) RETURNING *".into(),
               vec![json!("Alice")],
            ),
            (
               "INSERT INTO t (name) VALUES ($1), ($2) RETURNING *".into(),
               vec![json!("Bob"), json!("Carol")],
            ),
         ])
         .await
         .unwrap();

      assert_eq!(results[0].len(), 1);
      assert_eq!(results[1].len(), 2);
      assert_eq!(results[1][1].get("name"), Some(&json!("Carol")));

      db.remove().await.unwrap();
   }

   #[tokio::test]
   async fn test_type_binding_and_decoding() {
      let (db, _temp) = create_test_db().await;
      db.execute(
         "CREATE TABLE t (id INTEGER PRIMARY KEY, txt TEXT, num REAL, big INTEGER, flag BOOLEAN, data BLOB, meta TEXT)".into(),
         vec![],
      )
      .await
      .unwrap();

      let large_int: i64 = 9_007_199_254_740_992; // 2^53

      db.execute(
         "INSERT INTO t (txt) VALUES ($1)".into(),
         vec![JsonValue::Null],
      )
      .await
      .unwrap();

      db.execute(
         "INSERT INTO t (txt, num) VALUES ($1, $2)".into(),
         vec![json!("hello"), json!(1.23456)],
      )
      .await
      .unwrap();

      db.execute(
         "INSERT INTO t (big) VALUES ($1)".into(),
         vec![json!(large_int)],
      )
      .await
      .unwrap();

      db.execute("INSERT INTO t (flag) VALUES ($1)".into(), vec![json!(true)])
         .await
         .unwrap();

      // BLOB ("Hello" in hex)
      db.execute("INSERT INTO t (data) VALUES (X'48656C6C6F')".into(), vec![])
         .await
         .unwrap();

      db.execute(
         "INSERT INTO t (meta) VALUES ($1)".into(),
         vec![json!({"a": 1})],
      )
      .await
      .unwrap();

      let rows = db
         .fetch_all("SELECT * FROM t ORDER BY id".into(), vec![])
         .await
         .unwrap();

      assert_eq!(rows[0].get("txt"), Some(&JsonValue::Null));

      let num = rows[1].get("num").unwrap().as_f64().unwrap();
      assert!((num - 1.23456).abs() < 0.0001);

      assert_eq!(rows[2].get("big"), Some(&json!(large_int)));

      // Boolean stored as integer
      assert_eq!(rows[3].get("flag"), Some(&json!(1)));

      // BLOB as base64
      assert_eq!(rows[4].get("data").unwrap().as_str(), Some("SGVsbG8="));

      // Objects stored as JSON text
      let meta: JsonValue =
         serde_json::from_str(rows[5].get("meta").unwrap().as_str().unwrap()).unwrap();
      assert_eq!(meta, json!({"a": 1}));

      db.remove().await.unwrap();
   }

   #[tokio::test]
   async fn test_column_order_preserved() {
      let (db, _temp) = create_test_db().await;
      db.execute("CREATE TABLE t (z TEXT, a TEXT, m TEXT)".into(), vec![])
         .await
         .unwrap();
      db.execute(
         "INSERT INTO t VALUES ($1, $2, $3)".into(),
         vec![json!("z"), json!("a"), json!("m")],
      )
      .await
      .unwrap();

      let rows = db
         .fetch_all("SELECT z, a, m FROM t".into(), vec![])
         .await
         .unwrap();

      let keys: Vec<&String> = rows[0].keys().collect();
      assert_eq!(keys, vec!["z", "a", "m"]);

      db.remove().await.unwrap();
   }

   #[tokio::test]
   async fn test_unknown_table() {
      let (db, _temp) = create_test_db().await;
      let err = db.table("nope").unwrap_err();
      assert_eq!(err.error_code(), "UNKNOWN_TABLE");
      db.remove().await.unwrap();
   }

   #[tokio::test]
   async fn test_remove_deletes_files() {
      let (db, temp) = create_test_db().await;
      db.execute("CREATE TABLE t (id INTEGER)".into(), vec![])
         .await
         .unwrap();

      let path = temp.path().join("test.db");
      assert!(path.exists());

      db.remove().await.unwrap();

      assert!(!path.exists());
      assert!(!temp.path().join("test.db-wal").exists());
   }
}
