//! Relations between tables and eager loading of related rows.

use std::future::Future;
use std::pin::Pin;

use indexmap::IndexMap;
use serde_json::{Map, Value as JsonValue};
use tracing::debug;

use crate::naming::to_wire;
use crate::query::Query;
use crate::schema::Schema;
use crate::{Database, Error, Result, Row};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
   /// The row holds the foreign key; loads one related row or null
   BelongsTo,
   /// The related rows hold the foreign key; loads a list
   HasMany,
   /// The related rows hold the foreign key; loads the first match or null
   HasOne,
}

/// A relation from the declaring table to `table`.
///
/// `foreign_key` and `key` may be given in wire or storage form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
   kind: RelationKind,
   table: String,
   foreign_key: String,
   key: String,
}

impl Relation {
   /// `foreign_key` is a column of the declaring table pointing at `table.key`.
   pub fn belongs_to(table: impl Into<String>, foreign_key: impl Into<String>) -> Self {
      Self::new(RelationKind::BelongsTo, table, foreign_key)
   }

   /// `foreign_key` is a column of `table` pointing at the declaring table's `key`.
   pub fn has_many(table: impl Into<String>, foreign_key: impl Into<String>) -> Self {
      Self::new(RelationKind::HasMany, table, foreign_key)
   }

   pub fn has_one(table: impl Into<String>, foreign_key: impl Into<String>) -> Self {
      Self::new(RelationKind::HasOne, table, foreign_key)
   }

   fn new(kind: RelationKind, table: impl Into<String>, foreign_key: impl Into<String>) -> Self {
      Self {
         kind,
         table: table.into(),
         foreign_key: foreign_key.into(),
         key: "id".to_string(),
      }
   }

   /// Referenced key (default `id`).
   pub fn key(mut self, key: impl Into<String>) -> Self {
      self.key = key.into();
      self
   }

   pub fn kind(&self) -> RelationKind {
      self.kind
   }

   pub fn table(&self) -> &str {
      &self.table
   }

   pub fn foreign_key(&self) -> &str {
      &self.foreign_key
   }

   pub fn referenced_key(&self) -> &str {
      &self.key
   }

   /// Columns matched between (loaded rows, related rows), in wire form.
   fn local_and_remote(&self) -> (String, String) {
      let foreign_key = to_wire(&self.foreign_key);
      let key = to_wire(&self.key);
      match self.kind {
         RelationKind::BelongsTo => (foreign_key, key),
         RelationKind::HasMany | RelationKind::HasOne => (key, foreign_key),
      }
   }

   /// Fetch the related rows of `rows` and store them under `name`.
   async fn load(&self, db: &Database, name: &str, rows: &mut [Row]) -> Result<()> {
      let (local, remote) = self.local_and_remote();

      let mut ids: Vec<JsonValue> = Vec::new();
      for id in rows.iter().filter_map(|row| row.get(&local)) {
         if !id.is_null() && !ids.contains(id) {
            ids.push(id.clone());
         }
      }

      let related = if ids.is_empty() {
         Vec::new()
      } else {
         let schema = db.catalog().schema(&self.table)?;
         Query::new(db.clone(), schema)
            .where_in(remote.clone(), ids)
            .fetch_all()
            .await?
      };

      debug!(
         "loaded {} {} rows for relation {}",
         related.len(),
         self.table,
         name
      );

      for row in rows.iter_mut() {
         let id = row.get(&local).filter(|id| !id.is_null()).cloned();
         let mut matches = related
            .iter()
            .filter(|candidate| id.is_some() && candidate.get(&remote) == id.as_ref());

         let value = match self.kind {
            RelationKind::BelongsTo | RelationKind::HasOne => matches
               .next()
               .map_or(JsonValue::Null, |found| row_to_json(found.clone())),
            RelationKind::HasMany => {
               JsonValue::Array(matches.map(|found| row_to_json(found.clone())).collect())
            }
         };
         row.insert(name.to_string(), value);
      }

      Ok(())
   }
}

/// Load `names` onto `rows`.
///
/// A dotted name such as `players.team` first loads `players`, then loads
/// `team` onto every loaded player through the players schema.
pub(crate) fn load<'a>(
   db: &'a Database,
   schema: &'a Schema,
   rows: &'a mut [Row],
   names: &'a [String],
) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
   Box::pin(async move {
      let mut primaries: Vec<&str> = Vec::new();
      let mut secondaries: IndexMap<&str, Vec<String>> = IndexMap::new();
      for name in names {
         let (head, rest) = match name.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (name.as_str(), None),
         };
         if !primaries.contains(&head) {
            primaries.push(head);
         }
         if let Some(rest) = rest {
            secondaries.entry(head).or_default().push(rest.to_string());
         }
      }

      for name in &primaries {
         relation(schema, name)?.load(db, name, rows).await?;
      }

      for (head, rest) in &secondaries {
         let related = db.catalog().schema(relation(schema, head)?.table())?;

         let mut nested: Vec<Row> = Vec::new();
         for_each_nested(rows, head, |map| {
            nested.push(std::mem::take(map).into_iter().collect())
         });

         load(db, &related, &mut nested, rest).await?;

         let mut nested = nested.into_iter();
         for_each_nested(rows, head, |map| {
            if let Some(row) = nested.next() {
               *map = row.into_iter().collect();
            }
         });
      }

      Ok(())
   })
}

fn relation<'s>(schema: &'s Schema, name: &str) -> Result<&'s Relation> {
   schema.relation(name).ok_or_else(|| Error::UnknownRelation {
      table: schema.table().to_string(),
      relation: name.to_string(),
   })
}

/// Visit every object stored under `name`, whether it holds one row or a list.
fn for_each_nested(
   rows: &mut [Row],
   name: &str,
   mut visit: impl FnMut(&mut Map<String, JsonValue>),
) {
   for row in rows.iter_mut() {
      match row.get_mut(name) {
         Some(JsonValue::Object(map)) => visit(map),
         Some(JsonValue::Array(items)) => {
            for item in items.iter_mut() {
               if let JsonValue::Object(map) = item {
                  visit(map);
               }
            }
         }
         _ => {}
      }
   }
}

fn row_to_json(row: Row) -> JsonValue {
   JsonValue::Object(row.into_iter().collect())
}
