//! Row-level operations on one table.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::debug;

use crate::fields::{now_timestamp, storage_row, wire_row};
use crate::naming::{quote_identifier, storage_column, validate_column_name};
use crate::query::Query;
use crate::relation;
use crate::schema::Schema;
use crate::{Database, Error, Result, Row};

/// A table registered in the catalog, bound to a database.
#[derive(Debug, Clone)]
pub struct Table {
   db: Database,
   schema: Arc<Schema>,
}

impl Table {
   pub(crate) fn new(db: Database, schema: Arc<Schema>) -> Self {
      Self { db, schema }
   }

   pub fn schema(&self) -> &Schema {
      &self.schema
   }

   pub fn name(&self) -> &str {
      self.schema.table()
   }

   /// Start a SELECT over this table.
   pub fn query(&self) -> Query {
      Query::new(self.db.clone(), Arc::clone(&self.schema))
   }

   pub async fn find_by_id(&self, id: impl Into<JsonValue>) -> Result<Option<Row>> {
      self
         .query()
         .where_eq(self.qualified_primary_key(), id)
         .first()
         .await
   }

   /// Delete the row with primary key `id`. Returns the number of rows deleted.
   pub async fn remove_by_id(&self, id: impl Into<JsonValue>) -> Result<u64> {
      let sql = format!(
         "DELETE FROM {} WHERE {} = $1",
         storage_column(self.name()),
         storage_column(self.schema.primary_key())
      );
      let result = self.db.execute(sql, vec![id.into()]).await?;
      Ok(result.rows_affected)
   }

   /// Insert one row and return it as stored.
   ///
   /// Field defaults and `createdAt` / `updatedAt` are filled in first.
   pub async fn create(&self, row: Row) -> Result<Row> {
      let row = storage_row(self.schema.fields(), self.with_defaults(row)?)?;
      let (sql, values) = insert_sql(self.name(), std::slice::from_ref(&row))?;

      let inserted = self.db.fetch_all(sql, values).await?;
      let row = inserted
         .into_iter()
         .next()
         .ok_or_else(|| Error::Other(format!("insert into {} returned no row", self.name())))?;
      wire_row(self.schema.fields(), row)
   }

   /// Insert many rows in one transaction, `insert_max_length` rows per statement.
   ///
   /// Columns missing from some rows are inserted as NULL.
   pub async fn create_many(&self, rows: Vec<Row>) -> Result<Vec<Row>> {
      if rows.is_empty() {
         return Ok(Vec::new());
      }

      let rows = rows
         .into_iter()
         .map(|row| storage_row(self.schema.fields(), self.with_defaults(row)?))
         .collect::<Result<Vec<_>>>()?;

      // DEFAULT VALUES inserts a single row, so column-less rows go one at a time
      let statements = rows
         .chunks(self.schema.insert_max_length())
         .flat_map(|batch| {
            let size = if batch.iter().all(Row::is_empty) { 1 } else { batch.len() };
            batch.chunks(size)
         })
         .map(|batch| insert_sql(self.name(), batch))
         .collect::<Result<Vec<_>>>()?;

      debug!(
         "inserting {} rows into {} in {} statements",
         rows.len(),
         self.name(),
         statements.len()
      );

      self
         .db
         .fetch_all_transaction(statements)
         .await?
         .into_iter()
         .flatten()
         .map(|row| wire_row(self.schema.fields(), row))
         .collect()
   }

   /// Apply `changes` to the stored row identified by `row`'s primary key.
   ///
   /// Returns `row` merged with the changes. Empty changes are a no-op.
   pub async fn update(&self, row: Row, mut changes: Row) -> Result<Row> {
      if changes.is_empty() {
         return Ok(row);
      }

      let primary_key = self.schema.primary_key();
      let id = row
         .get(primary_key)
         .filter(|id| !id.is_null())
         .cloned()
         .ok_or_else(|| Error::MissingPrimaryKey {
            table: self.name().to_string(),
         })?;

      if self.schema.field("updatedAt").is_some() && !changes.contains_key("updatedAt") {
         changes.insert("updatedAt".to_string(), now_timestamp()?);
      }

      let stored = storage_row(self.schema.fields(), changes.clone())?;
      let mut assignments = Vec::with_capacity(stored.len());
      let mut values = Vec::with_capacity(stored.len() + 1);
      for (column, value) in stored {
         validate_column_name(&column)?;
         values.push(value);
         assignments.push(format!("{} = ${}", quote_identifier(&column), values.len()));
      }
      values.push(id);

      let sql = format!(
         "UPDATE {} SET {} WHERE {} = ${}",
         storage_column(self.name()),
         assignments.join(", "),
         storage_column(primary_key),
         values.len()
      );
      self.db.execute(sql, values).await?;

      let mut row = row;
      row.extend(changes);
      Ok(row)
   }

   /// Return the row matching `row`'s keys, creating it when none exists.
   pub async fn find_or_create(&self, row: Row) -> Result<Row> {
      match self.search(&row).first().await? {
         Some(found) => Ok(found),
         None => self.create(row).await,
      }
   }

   /// Update the row matching `row`'s keys with its other values, or create it.
   pub async fn update_or_create(&self, row: Row) -> Result<Row> {
      match self.search(&row).first().await? {
         Some(found) => {
            let keys = self.schema.keys().unwrap_or_default();
            let changes: Row = row
               .into_iter()
               .filter(|(key, _)| !keys.contains(key))
               .collect();
            self.update(found, changes).await
         }
         None => self.create(row).await,
      }
   }

   /// Re-read the row by primary key and merge the stored values into it.
   ///
   /// A row that no longer exists is returned unchanged.
   pub async fn reload(&self, row: Row) -> Result<Row> {
      let id = row
         .get(self.schema.primary_key())
         .filter(|id| !id.is_null())
         .cloned()
         .ok_or_else(|| Error::MissingPrimaryKey {
            table: self.name().to_string(),
         })?;

      let mut row = row;
      if let Some(fresh) = self.find_by_id(id).await? {
         row.extend(fresh);
      }
      Ok(row)
   }

   /// Load relations onto `rows`, e.g. `["team", "players.team"]`.
   pub async fn load(&self, rows: &mut [Row], names: &[&str]) -> Result<()> {
      let names: Vec<String> = names.iter().map(|name| name.to_string()).collect();
      relation::load(&self.db, &self.schema, rows, &names).await
   }

   fn qualified_primary_key(&self) -> String {
      format!("{}.{}", self.name(), self.schema.primary_key())
   }

   /// Query matching `row` on the natural keys, or on every value without keys.
   fn search(&self, row: &Row) -> Query {
      let mut query = self.query();
      for (column, value) in row {
         let is_key = match self.schema.keys() {
            Some(keys) => keys.contains(column),
            None => true,
         };
         if !is_key {
            continue;
         }
         let column = format!("{}.{}", self.name(), column);
         query = if value.is_null() {
            query.where_null(column)
         } else {
            query.where_eq(column, value.clone())
         };
      }
      query
   }

   fn with_defaults(&self, mut row: Row) -> Result<Row> {
      for field in self.schema.fields().values() {
         let missing = row.get(field.name()).is_none_or(JsonValue::is_null);
         if let Some(default) = field.default()
            && missing
         {
            row.insert(field.name().to_string(), default.clone());
         }
      }

      // One instant for both, so a new row has createdAt == updatedAt
      let now = now_timestamp()?;
      for timestamp in ["createdAt", "updatedAt"] {
         if self.schema.field(timestamp).is_some()
            && row.get(timestamp).is_none_or(JsonValue::is_null)
         {
            row.insert(timestamp.to_string(), now.clone());
         }
      }

      Ok(row)
   }
}

/// Multi-row `INSERT … RETURNING *` over the union of the rows' columns.
fn insert_sql(table: &str, rows: &[Row]) -> Result<(String, Vec<JsonValue>)> {
   let mut columns: Vec<&str> = Vec::new();
   for row in rows {
      for column in row.keys() {
         if !columns.contains(&column.as_str()) {
            validate_column_name(column)?;
            columns.push(column);
         }
      }
   }

   let table = quote_identifier(table);
   if columns.is_empty() {
      return Ok((format!("INSERT INTO {table} DEFAULT VALUES RETURNING *"), Vec::new()));
   }

   let mut values = Vec::with_capacity(rows.len() * columns.len());
   let mut tuples = Vec::with_capacity(rows.len());
   for row in rows {
      let mut placeholders = Vec::with_capacity(columns.len());
      for column in &columns {
         values.push(row.get(*column).cloned().unwrap_or(JsonValue::Null));
         placeholders.push(format!("${}", values.len()));
      }
      tuples.push(format!("({})", placeholders.join(", ")));
   }

   let column_list = columns
      .iter()
      .map(|column| quote_identifier(column))
      .collect::<Vec<_>>()
      .join(", ");

   Ok((
      format!(
         "INSERT INTO {table} ({column_list}) VALUES {} RETURNING *",
         tuples.join(", ")
      ),
      values,
   ))
}

#[cfg(test)]
mod tests {
   use super::*;
   use serde_json::json;

   fn row(pairs: &[(&str, JsonValue)]) -> Row {
      pairs
         .iter()
         .map(|(key, value)| (key.to_string(), value.clone()))
         .collect()
   }

   #[test]
   fn insert_sql_unions_columns() {
      let rows = vec![
         row(&[("name", json!("a"))]),
         row(&[("name", json!("b")), ("team_id", json!(1))]),
      ];
      let (sql, values) = insert_sql("players", &rows).unwrap();
      assert_eq!(
         sql,
         r#"INSERT INTO "players" ("name", "team_id") VALUES ($1, $2), ($3, $4) RETURNING *"#
      );
      assert_eq!(values, vec![json!("a"), JsonValue::Null, json!("b"), json!(1)]);
   }

   #[test]
   fn insert_sql_without_columns_uses_defaults() {
      let (sql, values) = insert_sql("players", &[Row::new()]).unwrap();
      assert_eq!(sql, r#"INSERT INTO "players" DEFAULT VALUES RETURNING *"#);
      assert!(values.is_empty());
   }

   #[test]
   fn insert_sql_rejects_bad_columns() {
      let rows = vec![row(&[("name) --", json!("a"))])];
      assert!(insert_sql("players", &rows).is_err());
   }
}
