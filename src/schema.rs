//! Table schemas: primary key, fields, joins, named orderings and relations.

use indexmap::IndexMap;
use sqlx_sqlite_keyset::{NamedOrders, OrderTokens};

use crate::fields::{Field, FieldType};
use crate::naming::storage_column;
use crate::relation::Relation;

/// Default number of rows per multi-row INSERT in `create_many`.
pub const DEFAULT_INSERT_MAX_LENGTH: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
   Inner,
   Left,
}

impl JoinKind {
   fn as_sql(self) -> &'static str {
      match self {
         JoinKind::Inner => "INNER JOIN",
         JoinKind::Left => "LEFT JOIN",
      }
   }
}

/// A join from the declaring table to `table`, on `left = right`.
///
/// Both sides are wire identifiers, usually qualified (`players.teamId`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
   pub kind: JoinKind,
   pub table: String,
   pub left: String,
   pub right: String,
}

impl Join {
   pub fn inner(
      table: impl Into<String>,
      left: impl Into<String>,
      right: impl Into<String>,
   ) -> Self {
      Self {
         kind: JoinKind::Inner,
         table: table.into(),
         left: left.into(),
         right: right.into(),
      }
   }

   pub fn left(
      table: impl Into<String>,
      left: impl Into<String>,
      right: impl Into<String>,
   ) -> Self {
      Self {
         kind: JoinKind::Left,
         table: table.into(),
         left: left.into(),
         right: right.into(),
      }
   }

   /// Render as `INNER JOIN "teams" ON "players"."team_id" = "teams"."id"`.
   pub fn to_sql(&self) -> String {
      format!(
         "{} {} ON {} = {}",
         self.kind.as_sql(),
         storage_column(&self.table),
         storage_column(&self.left),
         storage_column(&self.right)
      )
   }
}

/// Description of one table.
///
/// Built with [`Schema::builder`]; immutable afterwards.
#[derive(Debug, Clone)]
pub struct Schema {
   table: String,
   primary_key: String,
   keys: Option<Vec<String>>,
   columns: Option<Vec<String>>,
   fields: IndexMap<String, Field>,
   joins: IndexMap<String, Join>,
   orders: NamedOrders,
   relations: IndexMap<String, Relation>,
   insert_max_length: usize,
}

impl Schema {
   pub fn builder(table: impl Into<String>) -> SchemaBuilder {
      SchemaBuilder {
         schema: Schema {
            table: table.into(),
            primary_key: "id".to_string(),
            keys: None,
            columns: None,
            fields: IndexMap::new(),
            joins: IndexMap::new(),
            orders: NamedOrders::new(),
            relations: IndexMap::new(),
            insert_max_length: DEFAULT_INSERT_MAX_LENGTH,
         },
      }
   }

   pub fn table(&self) -> &str {
      &self.table
   }

   pub fn primary_key(&self) -> &str {
      &self.primary_key
   }

   /// Natural keys used by `find_or_create` / `update_or_create`.
   pub fn keys(&self) -> Option<&[String]> {
      self.keys.as_deref()
   }

   pub fn columns(&self) -> Option<&[String]> {
      self.columns.as_deref()
   }

   pub fn fields(&self) -> &IndexMap<String, Field> {
      &self.fields
   }

   pub fn field(&self, name: &str) -> Option<&Field> {
      self.fields.get(name)
   }

   /// Join declared towards `table`.
   pub fn join(&self, table: &str) -> Option<&Join> {
      self.joins.get(table)
   }

   pub fn orders(&self) -> &NamedOrders {
      &self.orders
   }

   pub fn relation(&self, name: &str) -> Option<&Relation> {
      self.relations.get(name)
   }

   pub fn insert_max_length(&self) -> usize {
      self.insert_max_length
   }

   /// Whether `column` is known: always true when no column set is declared.
   pub fn has_column(&self, column: &str) -> bool {
      match &self.columns {
         Some(columns) => column == self.primary_key || columns.iter().any(|c| c == column),
         None => true,
      }
   }
}

/// Builder for [`Schema`].
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
   schema: Schema,
}

impl SchemaBuilder {
   /// Primary key column (default `id`).
   pub fn primary_key(mut self, column: impl Into<String>) -> Self {
      self.schema.primary_key = column.into();
      self
   }

   pub fn keys<I, S>(mut self, keys: I) -> Self
   where
      I: IntoIterator<Item = S>,
      S: Into<String>,
   {
      self.schema.keys = Some(keys.into_iter().map(Into::into).collect());
      self
   }

   /// Known columns (wire names). Ordering by anything else is rejected.
   pub fn columns<I, S>(mut self, columns: I) -> Self
   where
      I: IntoIterator<Item = S>,
      S: Into<String>,
   {
      self.schema.columns = Some(columns.into_iter().map(Into::into).collect());
      self
   }

   pub fn field(mut self, field: Field) -> Self {
      self.schema.fields.insert(field.name().to_string(), field);
      self
   }

   /// Declare `createdAt` and `updatedAt` date fields.
   pub fn timestamps(self) -> Self {
      self
         .field(Field::new("createdAt", FieldType::Date))
         .field(Field::new("updatedAt", FieldType::Date))
   }

   pub fn join(mut self, join: Join) -> Self {
      self.schema.joins.insert(join.table.clone(), join);
      self
   }

   /// Named ordering usable in order tokens, e.g. `order("alphabetical", ["name", "id"])`.
   pub fn order(mut self, name: impl Into<String>, tokens: impl Into<OrderTokens>) -> Self {
      self.schema.orders.insert(name, tokens);
      self
   }

   pub fn relation(mut self, name: impl Into<String>, relation: Relation) -> Self {
      self.schema.relations.insert(name.into(), relation);
      self
   }

   pub fn insert_max_length(mut self, max: usize) -> Self {
      self.schema.insert_max_length = max.max(1);
      self
   }

   pub fn build(self) -> Schema {
      self.schema
   }
}
