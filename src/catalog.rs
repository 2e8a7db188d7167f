use std::collections::HashMap;
use std::sync::Arc;

use crate::schema::{Join, Schema};
use crate::{Error, Result};

/// Registry of table schemas, looked up by table name.
///
/// Joins and relations name other tables; they resolve through the catalog
/// the [`Database`](crate::Database) was opened with.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
   schemas: HashMap<String, Arc<Schema>>,
}

impl Catalog {
   pub fn new() -> Self {
      Self::default()
   }

   /// Register a schema, replacing any earlier one for the same table.
   pub fn register(&mut self, schema: Schema) {
      self
         .schemas
         .insert(schema.table().to_string(), Arc::new(schema));
   }

   pub fn with(mut self, schema: Schema) -> Self {
      self.register(schema);
      self
   }

   pub fn get(&self, table: &str) -> Option<&Arc<Schema>> {
      self.schemas.get(table)
   }

   pub fn schema(&self, table: &str) -> Result<Arc<Schema>> {
      self
         .schemas
         .get(table)
         .cloned()
         .ok_or_else(|| Error::UnknownTable(table.to_string()))
   }

   /// Join declared on `from` towards `to`.
   pub fn join(&self, from: &str, to: &str) -> Result<&Join> {
      self
         .schemas
         .get(from)
         .and_then(|schema| schema.join(to))
         .ok_or_else(|| Error::NoJoin {
            from: from.to_string(),
            to: to.to_string(),
         })
   }
}
