//! # sqlx-sqlite-schema
//!
//! A small data-access layer over SQLx for SQLite: declared table schemas,
//! camelCase ⇄ snake_case column names, field codecs, relations and keyset
//! pagination through [`sqlx_sqlite_keyset`].
//!
//! ## Core Types
//!
//! - **[`Database`]**: Connection pool paired with a [`Catalog`] of schemas
//! - **[`Schema`]**: Table description built with [`Schema::builder`]
//! - **[`Table`]**: Row operations (`create`, `update`, `find_or_create`, `load`, ...)
//! - **[`Query`]**: SELECT builder with joins, `order_by` and `after`
//! - **[`Page`]**: One page of rows plus the cursor of the next
//! - **[`Transaction`]**: Caller-held write transaction that tables and queries run in
//!
//! ## Example
//!
//! ```no_run
//! use sqlx_sqlite_schema::{Catalog, Database, Field, FieldType, Schema};
//! use serde_json::json;
//!
//! # async fn example() -> sqlx_sqlite_schema::Result<()> {
//! let catalog = Catalog::new().with(
//!    Schema::builder("teams")
//!       .keys(["name"])
//!       .field(Field::new("archived", FieldType::Boolean).default_value(false))
//!       .timestamps()
//!       .build(),
//! );
//!
//! let db = Database::connect("app.db", catalog, None).await?;
//! let teams = db.table("teams")?;
//!
//! let page = teams.query().after(["name", "-archived"], None)?.page(10).await?;
//! for row in &page.rows {
//!    println!("{}", json!(row));
//! }
//! # Ok(())
//! # }
//! ```

mod catalog;
mod config;
mod database;
mod decode;
mod error;
mod fields;
mod naming;
mod query;
mod relation;
mod schema;
mod table;

use indexmap::IndexMap;
use serde_json::Value as JsonValue;

pub use catalog::Catalog;
pub use config::DatabaseConfig;
pub use database::{Database, Transaction, WriteQueryResult};
pub use error::{Error, Result};
pub use fields::{Field, FieldType};
pub use naming::{quote_identifier, to_storage, to_wire, validate_column_name};
pub use query::{Page, Query, SORT_KEY};
pub use relation::{Relation, RelationKind};
pub use schema::{DEFAULT_INSERT_MAX_LENGTH, Join, JoinKind, Schema, SchemaBuilder};
pub use table::Table;

pub use sqlx_sqlite_keyset::{
   Cursor, CursorValue, NamedOrders, NullPlacement, OrderSpec, OrderTokens, Ordering,
   SortDirection,
};

/// A result row: column name to JSON value, in column order.
pub type Row = IndexMap<String, JsonValue>;
