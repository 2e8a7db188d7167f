//! SELECT builder over one table, with joins and keyset pagination.
//!
//! Identifiers are written in wire form (`createdAt`, `teams.leagueId`) and
//! translated to storage names when the SQL is rendered. Result rows come back
//! with wire keys and field codecs applied.
//!
//! ```no_run
//! # async fn example(db: sqlx_sqlite_schema::Database) -> sqlx_sqlite_schema::Result<()> {
//! let teams = db.table("teams")?;
//!
//! let first = teams.query().where_eq("archived", false).page(20).await?;
//! if let Some(cursor) = &first.next_cursor {
//!    let _second = teams
//!       .query()
//!       .where_eq("archived", false)
//!       .after(["name"], Some(cursor))?
//!       .page(20)
//!       .await?;
//! }
//! # Ok(())
//! # }
//! ```

use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx_sqlite_keyset::{
   self as keyset, Cursor, CursorProjection, KeysetQuery, NamedOrders, NullPlacement, OrderSpec,
   OrderTokens, Ordering, Predicate,
};
use tracing::debug;

use crate::decode::SORT_KEY_PREFIX;
use crate::fields::wire_row;
use crate::naming::{number_placeholders, storage_column, validate_column_name};
use crate::schema::{Join, Schema};
use crate::{Database, Error, Result, Row};

/// Row key carrying the cursor of that row after [`Query::after`].
pub const SORT_KEY: &str = "sortKey";

const COMPARISON_OPERATORS: &[&str] = &["=", "!=", "<>", "<", "<=", ">", ">=", "LIKE", "NOT LIKE"];

/// One page of results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
   /// The rows in this page
   pub rows: Vec<Row>,
   /// Cursor of the last row, or `None` if there are no more pages
   pub next_cursor: Option<Cursor>,
   /// Whether rows exist past this page
   pub has_more: bool,
}

#[derive(Debug, Clone)]
enum Filter {
   Compare {
      column: String,
      op: String,
      value: JsonValue,
   },
   In {
      column: String,
      values: Vec<JsonValue>,
   },
   Null {
      column: String,
      negated: bool,
   },
   Raw {
      sql: String,
      values: Vec<JsonValue>,
   },
   Keyset(Predicate),
}

/// Builder for a SELECT over one table.
///
/// Filters accumulate with AND. Column names are validated when the query is
/// rendered, so errors surface from [`to_sql`](Query::to_sql) and the fetch
/// methods.
#[derive(Debug, Clone)]
pub struct Query {
   db: Database,
   schema: Arc<Schema>,
   columns: Vec<String>,
   joins: Vec<Join>,
   joined: Vec<(String, String)>,
   filters: Vec<Filter>,
   orders: Vec<OrderSpec>,
   cursor_columns: Option<Vec<String>>,
   limit: Option<u64>,
   offset: Option<u64>,
}

impl Query {
   pub(crate) fn new(db: Database, schema: Arc<Schema>) -> Self {
      Self {
         db,
         schema,
         columns: Vec::new(),
         joins: Vec::new(),
         joined: Vec::new(),
         filters: Vec::new(),
         orders: Vec::new(),
         cursor_columns: None,
         limit: None,
         offset: None,
      }
   }

   pub fn schema(&self) -> &Schema {
      &self.schema
   }

   /// Select specific columns instead of every column of the table.
   pub fn select<I, S>(mut self, columns: I) -> Self
   where
      I: IntoIterator<Item = S>,
      S: Into<String>,
   {
      self.columns.extend(columns.into_iter().map(Into::into));
      self
   }

   pub fn where_eq(self, column: impl Into<String>, value: impl Into<JsonValue>) -> Self {
      self.where_op(column, "=", value)
   }

   /// Compare `column` with `value` using one of `=`, `!=`, `<>`, `<`, `<=`,
   /// `>`, `>=`, `LIKE` or `NOT LIKE`.
   pub fn where_op(
      mut self,
      column: impl Into<String>,
      op: impl Into<String>,
      value: impl Into<JsonValue>,
   ) -> Self {
      self.filters.push(Filter::Compare {
         column: column.into(),
         op: op.into(),
         value: value.into(),
      });
      self
   }

   pub fn where_in<I, V>(mut self, column: impl Into<String>, values: I) -> Self
   where
      I: IntoIterator<Item = V>,
      V: Into<JsonValue>,
   {
      self.filters.push(Filter::In {
         column: column.into(),
         values: values.into_iter().map(Into::into).collect(),
      });
      self
   }

   pub fn where_null(mut self, column: impl Into<String>) -> Self {
      self.filters.push(Filter::Null {
         column: column.into(),
         negated: false,
      });
      self
   }

   pub fn where_not_null(mut self, column: impl Into<String>) -> Self {
      self.filters.push(Filter::Null {
         column: column.into(),
         negated: true,
      });
      self
   }

   /// Raw SQL condition with positional `?` placeholders.
   ///
   /// The fragment is used verbatim; identifiers in it are storage names.
   pub fn where_raw(mut self, sql: impl Into<String>, values: Vec<JsonValue>) -> Self {
      self.filters.push(Filter::Raw {
         sql: sql.into(),
         values,
      });
      self
   }

   /// Join along a dotted path of declared joins, starting at this table.
   ///
   /// `joins("teams.leagues")` on `players` joins `players → teams` and then
   /// `teams → leagues`. Hops already joined are skipped.
   pub fn joins(mut self, path: &str) -> Result<Self> {
      let mut from = self.schema.table().to_string();
      for to in path.split('.') {
         let hop = (from.clone(), to.to_string());
         if !self.joined.contains(&hop) {
            let join = self.db.catalog().join(&from, to)?.clone();
            self.joins.push(join);
            self.joined.push(hop);
         }
         from = to.to_string();
      }
      Ok(self)
   }

   /// Order by tokens such as `["name", "-createdAt"]` or a named ordering.
   pub fn order_by(self, tokens: impl Into<OrderTokens>) -> Result<Self> {
      keyset::order_by(self, tokens)
   }

   /// Order by `tokens` plus the primary key and keep only rows after `cursor`.
   ///
   /// Every result row gains a `sortKey` holding its own cursor.
   pub fn after(self, tokens: impl Into<OrderTokens>, cursor: Option<&Cursor>) -> Result<Self> {
      keyset::after(self, tokens, cursor)
   }

   pub fn limit(mut self, limit: u64) -> Self {
      self.limit = Some(limit);
      self
   }

   pub fn offset(mut self, offset: u64) -> Self {
      self.offset = Some(offset);
      self
   }

   /// Render the SELECT and its bind values.
   pub fn to_sql(&self) -> Result<(String, Vec<JsonValue>)> {
      let select = self.select_list()?;
      let (mut sql, values) = self.render_from(&select)?;

      if !self.orders.is_empty() {
         let ordering = Ordering::from(self.orders.clone());
         sql.push(' ');
         sql.push_str(&ordering.to_sql(self.null_placement(), |column| {
            self.keyset_column(column)
         }));
      }

      match (self.limit, self.offset) {
         (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
         (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
         (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
         (None, None) => {}
      }

      Ok((sql, values))
   }

   /// Run the query and return every row.
   pub async fn fetch_all(self) -> Result<Vec<Row>> {
      let (sql, values) = self.to_sql()?;
      debug!("query {}: {}", self.schema.table(), sql);

      let rows = self.db.fetch_all(sql, values).await?;
      rows.into_iter().map(|row| self.finish_row(row)).collect()
   }

   /// Run the query with `LIMIT 1`.
   pub async fn first(self) -> Result<Option<Row>> {
      let rows = self.limit(1).fetch_all().await?;
      Ok(rows.into_iter().next())
   }

   /// Fetch one page of `size` rows.
   ///
   /// Without a prior [`after`](Query::after), any `order_by` terms plus the
   /// primary key become the keyset ordering. One extra row is fetched to tell
   /// whether more pages exist.
   pub async fn page(self, size: u64) -> Result<Page> {
      if size == 0 {
         return Err(Error::InvalidPageSize);
      }

      let query = if self.cursor_columns.is_some() {
         self
      } else {
         let tokens: OrderTokens = self.orders.iter().map(ToString::to_string).collect();
         let mut query = self;
         query.orders.clear();
         query.after(tokens, None)?
      };

      let mut rows = query.limit(size.saturating_add(1)).fetch_all().await?;
      let page_size = usize::try_from(size).unwrap_or(usize::MAX);
      let has_more = rows.len() > page_size;
      if has_more {
         rows.truncate(page_size);
      }

      let next_cursor = if has_more {
         rows
            .last()
            .and_then(|row| row.get(SORT_KEY))
            .and_then(JsonValue::as_str)
            .map(Cursor::from)
      } else {
         None
      };

      Ok(Page {
         rows,
         next_cursor,
         has_more,
      })
   }

   /// Count matching rows, ignoring ordering and limits.
   pub async fn count(self) -> Result<u64> {
      let (sql, values) = self.render_from(r#"COUNT(*) AS "count""#)?;
      debug!("count {}: {}", self.schema.table(), sql);

      let row = self.db.fetch_one(sql, values).await?;
      let count = row
         .and_then(|row| row.get("count").and_then(JsonValue::as_u64))
         .unwrap_or(0);
      Ok(count)
   }

   fn select_list(&self) -> Result<String> {
      let mut parts = Vec::with_capacity(self.columns.len() + 1);
      if self.columns.is_empty() {
         parts.push(format!("{}.*", storage_column(self.schema.table())));
      }
      for column in &self.columns {
         let wildcard_table = column.strip_suffix(".*");
         if column == "*" {
            parts.push("*".to_string());
         } else if let Some(table) = wildcard_table {
            parts.push(format!("{}.*", self.column_sql(table)?));
         } else {
            parts.push(self.column_sql(column)?);
         }
      }
      if let Some(columns) = &self.cursor_columns {
         for (i, column) in columns.iter().enumerate() {
            validate_column_name(column)?;
            parts.push(format!(
               "{} AS \"{}\"",
               self.keyset_column(column),
               sort_key_alias(i)
            ));
         }
      }
      Ok(parts.join(", "))
   }

   fn render_from(&self, select: &str) -> Result<(String, Vec<JsonValue>)> {
      let mut sql = format!("SELECT {select} FROM {}", storage_column(self.schema.table()));
      for join in &self.joins {
         sql.push(' ');
         sql.push_str(&join.to_sql());
      }

      let mut values = Vec::new();
      let mut conditions = Vec::with_capacity(self.filters.len());
      for filter in &self.filters {
         conditions.push(self.filter_sql(filter, &mut values)?);
      }
      if !conditions.is_empty() {
         sql.push_str(" WHERE ");
         sql.push_str(&conditions.join(" AND "));
      }

      Ok((sql, values))
   }

   fn filter_sql(&self, filter: &Filter, values: &mut Vec<JsonValue>) -> Result<String> {
      let sql = match filter {
         Filter::Compare { column, op, value } => {
            let op = op.trim().to_ascii_uppercase();
            if !COMPARISON_OPERATORS.contains(&op.as_str()) {
               return Err(Error::InvalidOperator(op));
            }
            values.push(self.encode_value(column, value.clone())?);
            format!("{} {} ${}", self.column_sql(column)?, op, values.len())
         }
         Filter::In { column, values: items } => {
            if items.is_empty() {
               return Ok("FALSE".to_string());
            }
            let mut placeholders = Vec::with_capacity(items.len());
            for item in items {
               values.push(self.encode_value(column, item.clone())?);
               placeholders.push(format!("${}", values.len()));
            }
            format!("{} IN ({})", self.column_sql(column)?, placeholders.join(", "))
         }
         Filter::Null { column, negated } => {
            let test = if *negated { "IS NOT NULL" } else { "IS NULL" };
            format!("{} {}", self.column_sql(column)?, test)
         }
         Filter::Raw { sql, values: raw } => {
            let (sql, count) = number_placeholders(sql, values.len());
            if count != raw.len() {
               return Err(Error::PlaceholderMismatch {
                  placeholders: count,
                  values: raw.len(),
               });
            }
            values.extend(raw.iter().cloned());
            format!("({sql})")
         }
         Filter::Keyset(predicate) => {
            let (sql, bound) = predicate.to_sql(values.len(), |column| self.keyset_column(column));
            values.extend(bound);
            format!("({sql})")
         }
      };
      Ok(sql)
   }

   fn column_sql(&self, column: &str) -> Result<String> {
      validate_column_name(column)?;
      Ok(storage_column(column))
   }

   /// Ordering and cursor columns without a table name belong to this table.
   ///
   /// They are qualified so that joined tables sharing a column name do not
   /// make them ambiguous.
   fn keyset_column(&self, column: &str) -> String {
      if column.contains('.') {
         storage_column(column)
      } else {
         storage_column(&format!("{}.{}", self.schema.table(), column))
      }
   }

   /// Own-table field declared for `column`, if any.
   fn field_name<'a>(&self, column: &'a str) -> &'a str {
      match column.split_once('.') {
         Some((table, name)) if table == self.schema.table() => name,
         _ => column,
      }
   }

   fn encode_value(&self, column: &str, value: JsonValue) -> Result<JsonValue> {
      match self.schema.field(self.field_name(column)) {
         Some(field) => field.to_db(value),
         None => Ok(value),
      }
   }

   /// Pull the sort key columns out of a raw row and convert the rest to wire form.
   fn finish_row(&self, mut row: Row) -> Result<Row> {
      let cursor = match &self.cursor_columns {
         Some(columns) => {
            let values: Vec<JsonValue> = (0..columns.len())
               .map(|i| row.shift_remove(&sort_key_alias(i)).unwrap_or(JsonValue::Null))
               .collect();
            Some(Cursor::from_json_values(&values)?)
         }
         None => None,
      };

      let mut row = wire_row(self.schema.fields(), row)?;

      if let Some(cursor) = cursor {
         row.insert(SORT_KEY.to_string(), JsonValue::String(cursor.into_string()));
      }
      Ok(row)
   }
}

fn sort_key_alias(index: usize) -> String {
   format!("{SORT_KEY_PREFIX}{index}")
}

impl KeysetQuery for Query {
   type Error = Error;

   fn tiebreaker(&self) -> String {
      format!("{}.{}", self.schema.table(), self.schema.primary_key())
   }

   fn named_orders(&self) -> Option<&NamedOrders> {
      Some(self.schema.orders())
   }

   fn null_placement(&self) -> NullPlacement {
      self.db.config().null_placement
   }

   fn check_column(&self, column: &str) -> Result<()> {
      validate_column_name(column)?;

      let own = match column.split_once('.') {
         Some((table, name)) if table == self.schema.table() => Some(name),
         Some(_) => None,
         None => Some(column),
      };
      if let Some(name) = own
         && !self.schema.has_column(name)
      {
         return Err(keyset::Error::UnknownOrderColumn {
            column: column.to_string(),
         }
         .into());
      }
      Ok(())
   }

   fn and_where(mut self, predicate: Predicate) -> Self {
      self.filters.push(Filter::Keyset(predicate));
      self
   }

   fn order_by_spec(mut self, spec: &OrderSpec) -> Self {
      self.orders.push(spec.clone());
      self
   }

   fn select_cursor(mut self, projection: CursorProjection) -> Self {
      self.cursor_columns = Some(projection.columns);
      self
   }
}

impl IntoFuture for Query {
   type Output = Result<Vec<Row>>;
   type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

   fn into_future(self) -> Self::IntoFuture {
      Box::pin(self.fetch_all())
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::{Catalog, DatabaseConfig};
   use serde_json::json;
   use tempfile::TempDir;

   async fn create_test_db(config: Option<DatabaseConfig>) -> (Database, TempDir) {
      let catalog = Catalog::new()
         .with(
            Schema::builder("players")
               .join(Join::left("teams", "players.teamId", "teams.id"))
               .build(),
         )
         .with(
            Schema::builder("teams")
               .columns(["name", "archived", "createdAt"])
               .order("alphabetical", ["name"])
               .join(Join::inner("leagues", "teams.leagueId", "leagues.id"))
               .build(),
         )
         .with(Schema::builder("leagues").build());

      let temp_dir = TempDir::new().expect("Failed to create temp directory");
      let db = Database::connect(temp_dir.path().join("test.db"), catalog, config)
         .await
         .expect("Failed to connect to test database");
      (db, temp_dir)
   }

   // ─── rendering ───

   #[tokio::test]
   async fn renders_filters_in_storage_names() {
      let (db, _temp) = create_test_db(None).await;
      let query = db
         .table("teams")
         .unwrap()
         .query()
         .where_eq("leagueId", 3)
         .where_in("name", ["a", "b"])
         .where_not_null("createdAt")
         .where_raw("length(name) > ?", vec![json!(2)]);

      let (sql, values) = query.to_sql().unwrap();
      assert_eq!(
         sql,
         r#"SELECT "teams".* FROM "teams" WHERE "league_id" = $1 AND "name" IN ($2, $3) AND "created_at" IS NOT NULL AND (length(name) > $4)"#
      );
      assert_eq!(values, vec![json!(3), json!("a"), json!("b"), json!(2)]);

      db.remove().await.unwrap();
   }

   #[tokio::test]
   async fn renders_keyset_after_cursor() {
      let (db, _temp) = create_test_db(None).await;
      let cursor = Cursor::encode(&["Team 2".into(), 2i64.into()]).unwrap();
      let query = db
         .table("teams")
         .unwrap()
         .query()
         .where_eq("archived", 0)
         .after("name", Some(&cursor))
         .unwrap();

      let (sql, values) = query.to_sql().unwrap();
      assert_eq!(
         sql,
         concat!(
            r#"SELECT "teams".*, "teams"."name" AS "__sort_key_0", "#,
            r#""teams"."id" AS "__sort_key_1" "#,
            r#"FROM "teams" WHERE "archived" = $1 AND "#,
            r#"("teams"."name" > $2 OR ("teams"."name" = $3 AND "teams"."id" > $4)) "#,
            r#"ORDER BY "teams"."name" ASC, "teams"."id" ASC"#
         )
      );
      assert_eq!(values, vec![json!(0), json!("Team 2"), json!("Team 2"), json!(2)]);

      db.remove().await.unwrap();
   }

   #[tokio::test]
   async fn renders_nulls_clause_when_nulls_sort_largest() {
      let config = DatabaseConfig {
         null_placement: NullPlacement::Largest,
         ..Default::default()
      };
      let (db, _temp) = create_test_db(Some(config)).await;
      let query = db.table("teams").unwrap().query().order_by("-name").unwrap();

      let (sql, _) = query.to_sql().unwrap();
      assert!(sql.ends_with(r#"ORDER BY "teams"."name" DESC NULLS FIRST"#));

      db.remove().await.unwrap();
   }

   #[tokio::test]
   async fn offset_without_limit() {
      let (db, _temp) = create_test_db(None).await;
      let (sql, _) = db.table("leagues").unwrap().query().offset(5).to_sql().unwrap();
      assert!(sql.ends_with("LIMIT -1 OFFSET 5"));
      db.remove().await.unwrap();
   }

   #[tokio::test]
   async fn empty_in_matches_nothing() {
      let (db, _temp) = create_test_db(None).await;
      let (sql, values) = db
         .table("leagues")
         .unwrap()
         .query()
         .where_in("id", Vec::<i64>::new())
         .to_sql()
         .unwrap();
      assert!(sql.ends_with("WHERE FALSE"));
      assert!(values.is_empty());
      db.remove().await.unwrap();
   }

   // ─── joins ───

   #[tokio::test]
   async fn joins_follow_dotted_path_once() {
      let (db, _temp) = create_test_db(None).await;
      let query = db
         .table("players")
         .unwrap()
         .query()
         .joins("teams")
         .unwrap()
         .joins("teams.leagues")
         .unwrap();

      let (sql, _) = query.to_sql().unwrap();
      assert_eq!(
         sql,
         concat!(
            r#"SELECT "players".* FROM "players" "#,
            r#"LEFT JOIN "teams" ON "players"."team_id" = "teams"."id" "#,
            r#"INNER JOIN "leagues" ON "teams"."league_id" = "leagues"."id""#
         )
      );

      db.remove().await.unwrap();
   }

   #[tokio::test]
   async fn missing_join_is_an_error() {
      let (db, _temp) = create_test_db(None).await;
      let err = db.table("leagues").unwrap().query().joins("teams").unwrap_err();
      assert_eq!(err.to_string(), "no join from leagues to teams");
      db.remove().await.unwrap();
   }

   // ─── validation ───

   #[tokio::test]
   async fn rejects_bad_operator_and_column() {
      let (db, _temp) = create_test_db(None).await;
      let teams = db.table("teams").unwrap();

      let err = teams.query().where_op("name", "~", "x").to_sql().unwrap_err();
      assert_eq!(err.error_code(), "INVALID_OPERATOR");

      let err = teams.query().where_eq("name; --", "x").to_sql().unwrap_err();
      assert_eq!(err.error_code(), "INVALID_COLUMN_NAME");

      let err = teams.query().where_raw("a = ? AND b = ?", vec![json!(1)]).to_sql().unwrap_err();
      assert_eq!(err.error_code(), "PLACEHOLDER_MISMATCH");

      db.remove().await.unwrap();
   }

   #[tokio::test]
   async fn unknown_order_column_is_rejected() {
      let (db, _temp) = create_test_db(None).await;
      let teams = db.table("teams").unwrap();

      let err = teams.query().order_by("score").unwrap_err();
      assert_eq!(err.error_code(), "UNKNOWN_ORDER_COLUMN");

      // Other tables' columns are not checked
      assert!(teams.query().order_by("leagues.rank").is_ok());
      // Named orderings resolve before the check
      assert!(teams.query().order_by("alphabetical").is_ok());

      db.remove().await.unwrap();
   }

   #[tokio::test]
   async fn page_keeps_plain_order_terms() {
      let (db, _temp) = create_test_db(None).await;
      let query = db
         .table("teams")
         .unwrap()
         .query()
         .order_by("-name")
         .unwrap();

      db.execute(
         "CREATE TABLE teams (id INTEGER PRIMARY KEY, name TEXT, archived INTEGER, created_at TEXT)"
            .into(),
         vec![],
      )
      .await
      .unwrap();
      db.execute(
         "INSERT INTO teams (name) VALUES ('a'), ('c'), ('b')".into(),
         vec![],
      )
      .await
      .unwrap();

      let page = query.page(2).await.unwrap();
      let names: Vec<&str> = page.rows.iter().map(|r| r["name"].as_str().unwrap()).collect();
      assert_eq!(names, vec!["c", "b"]);
      assert!(page.has_more);

      // The cursor continues the same ordering
      let cursor = page.next_cursor.unwrap();
      let rest = db
         .table("teams")
         .unwrap()
         .query()
         .after("-name", Some(&cursor))
         .unwrap()
         .fetch_all()
         .await
         .unwrap();
      assert_eq!(rest.len(), 1);
      assert_eq!(rest[0]["name"], json!("a"));

      db.remove().await.unwrap();
   }

   #[tokio::test]
   async fn zero_page_size_is_rejected() {
      let (db, _temp) = create_test_db(None).await;
      let err = db.table("teams").unwrap().query().page(0).await.unwrap_err();
      assert_eq!(err.error_code(), "INVALID_PAGE_SIZE");
      db.remove().await.unwrap();
   }
}
