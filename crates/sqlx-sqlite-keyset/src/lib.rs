//! # sqlx-sqlite-keyset
//!
//! Keyset ("cursor") pagination for SQL queries with composite, per-column
//! ascending/descending orderings and correct NULL handling.
//!
//! ## Core Types
//!
//! - **[`OrderSpec`]**: One parsed order token (`name`, `-createdAt`, `score DESC`)
//! - **[`Ordering`]**: Composite ordering with a guaranteed-unique tiebreaker
//! - **[`Cursor`]**: Opaque base64-of-JSON encoding of a row's ordering values
//! - **[`Predicate`]**: NULL-aware "strictly after" expression tree
//! - **[`KeysetQuery`]**: Contract a host query builder implements for [`after`]
//!
//! ## Flow
//!
//! - **Parse**: order tokens become [`OrderSpec`]s, named orderings are expanded
//! - **Tiebreak**: the host's unique column is appended unless already present
//! - **Seek**: a cursor is decoded and turned into a [`Predicate`]
//! - **Apply**: predicate, ORDER BY terms and cursor projection are handed to the host
//!
//! Everything here is synchronous and pure. Execution belongs to the host.
//! Pagination is not stable under concurrent writes that change the ordering
//! values of rows a client has already seen.

mod cursor;
mod error;
mod order;
mod ordering;
mod paginate;
mod predicate;

pub use cursor::{Cursor, CursorValue, MAX_CURSOR_LEN};
pub use error::{Error, Result};
pub use order::{NullPlacement, OrderSpec, SortDirection};
pub use ordering::{NamedOrders, OrderTokens, Ordering};
pub use paginate::{CursorProjection, KeysetQuery, after, order_by};
pub use predicate::{CompareOp, Predicate, keyset_predicate};
