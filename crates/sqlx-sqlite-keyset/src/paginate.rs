//! `order_by` / `after` applied to a host query builder.

use crate::cursor::Cursor;
use crate::order::{NullPlacement, OrderSpec};
use crate::ordering::{NamedOrders, OrderTokens, Ordering};
use crate::predicate::{Predicate, keyset_predicate};

/// Ordering columns whose values must be projected as each row's cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorProjection {
   pub columns: Vec<String>,
}

impl From<&Ordering> for CursorProjection {
   fn from(ordering: &Ordering) -> Self {
      Self {
         columns: ordering.columns().map(str::to_string).collect(),
      }
   }
}

/// Query builder that keyset pagination can be applied to.
///
/// Implementors own execution and SQL rendering. Column identifiers handed
/// over in predicates, order specs and projections are the raw identifiers
/// from the order tokens; renaming and quoting happen in the implementor.
pub trait KeysetQuery: Sized {
   type Error: From<crate::Error>;

   /// Unique column appended to every keyset ordering.
   fn tiebreaker(&self) -> String;

   fn named_orders(&self) -> Option<&NamedOrders> {
      None
   }

   fn null_placement(&self) -> NullPlacement {
      NullPlacement::default()
   }

   /// Reject columns the query does not know. Accepts everything by default.
   fn check_column(&self, _column: &str) -> Result<(), Self::Error> {
      Ok(())
   }

   /// Conjoin `predicate` with the query's existing filters.
   fn and_where(self, predicate: Predicate) -> Self;

   /// Append one ORDER BY term.
   fn order_by_spec(self, spec: &OrderSpec) -> Self;

   /// Project the ordering values so each result row can yield its cursor.
   fn select_cursor(self, projection: CursorProjection) -> Self;
}

/// Order `query` by `tokens` and, when a cursor is given, keep only the rows
/// strictly after it.
///
/// The query's tiebreaker is appended to the ordering and every row carries the
/// projection needed to produce the next cursor. Nothing is executed.
pub fn after<Q: KeysetQuery>(
   query: Q,
   tokens: impl Into<OrderTokens>,
   cursor: Option<&Cursor>,
) -> Result<Q, Q::Error> {
   let tiebreaker = query.tiebreaker();
   let ordering = match query.named_orders() {
      Some(named) => Ordering::build_with(tokens, &tiebreaker, named)?,
      None => Ordering::build(tokens, &tiebreaker)?,
   };

   for column in ordering.columns() {
      query.check_column(column)?;
   }

   let mut query = query;
   if let Some(cursor) = cursor {
      let values = cursor.decode()?;
      let predicate = keyset_predicate(&ordering, &values, query.null_placement())?;
      query = query.and_where(predicate);
   }

   for spec in &ordering {
      query = query.order_by_spec(spec);
   }

   Ok(query.select_cursor(CursorProjection::from(&ordering)))
}

/// Order `query` by `tokens` without a tiebreaker or cursor projection.
pub fn order_by<Q: KeysetQuery>(query: Q, tokens: impl Into<OrderTokens>) -> Result<Q, Q::Error> {
   let tokens = match query.named_orders() {
      Some(named) => named.resolve(tokens.into()),
      None => tokens.into(),
   };
   let ordering = Ordering::parse(tokens)?;

   for column in ordering.columns() {
      query.check_column(column)?;
   }

   let mut query = query;
   for spec in &ordering {
      query = query.order_by_spec(spec);
   }

   Ok(query)
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::cursor::CursorValue;
   use crate::{Error, Result};

   #[derive(Debug, Default)]
   struct Recorder {
      known: Option<Vec<&'static str>>,
      named: NamedOrders,
      predicates: Vec<Predicate>,
      orders: Vec<String>,
      projection: Option<CursorProjection>,
   }

   impl KeysetQuery for Recorder {
      type Error = Error;

      fn tiebreaker(&self) -> String {
         "id".to_string()
      }

      fn named_orders(&self) -> Option<&NamedOrders> {
         Some(&self.named)
      }

      fn check_column(&self, column: &str) -> Result<()> {
         match &self.known {
            Some(known) if !known.contains(&column) => Err(Error::UnknownOrderColumn {
               column: column.to_string(),
            }),
            _ => Ok(()),
         }
      }

      fn and_where(mut self, predicate: Predicate) -> Self {
         self.predicates.push(predicate);
         self
      }

      fn order_by_spec(mut self, spec: &OrderSpec) -> Self {
         self.orders.push(spec.to_string());
         self
      }

      fn select_cursor(mut self, projection: CursorProjection) -> Self {
         self.projection = Some(projection);
         self
      }
   }

   #[test]
   fn after_without_cursor_orders_and_projects() {
      let query = after(Recorder::default(), ["name", "-archived"], None).unwrap();

      assert!(query.predicates.is_empty());
      assert_eq!(query.orders, vec!["name ASC", "-archived ASC", "id ASC"]);
      assert_eq!(
         query.projection.unwrap().columns,
         vec!["name", "archived", "id"]
      );
   }

   #[test]
   fn after_with_cursor_adds_predicate() {
      let cursor = Cursor::encode(&["Team 2".into(), 2i64.into()]).unwrap();
      let query = after(Recorder::default(), "name", Some(&cursor)).unwrap();

      assert_eq!(query.predicates.len(), 1);
      assert_eq!(query.orders.len(), 2);
   }

   #[test]
   fn after_rejects_cursor_from_other_ordering() {
      let cursor = Cursor::encode(&["Team 2".into(), 2i64.into()]).unwrap();
      let err = after(Recorder::default(), ["name", "-archived"], Some(&cursor)).unwrap_err();

      assert_eq!(
         err,
         Error::OrderingLengthMismatch {
            cursor_len: 2,
            ordering_len: 3
         }
      );
   }

   #[test]
   fn after_rejects_malformed_cursor() {
      let cursor = Cursor::from("%%%");
      let err = after(Recorder::default(), "name", Some(&cursor)).unwrap_err();
      assert_eq!(err.error_code(), "MALFORMED_CURSOR");
   }

   #[test]
   fn after_checks_columns() {
      let recorder = Recorder {
         known: Some(vec!["name", "id"]),
         ..Recorder::default()
      };
      let err = after(recorder, "score", None).unwrap_err();
      assert_eq!(
         err,
         Error::UnknownOrderColumn {
            column: "score".into()
         }
      );
   }

   #[test]
   fn after_resolves_named_orderings() {
      let recorder = Recorder {
         named: NamedOrders::new().with("custom", ["name", "-archived"]),
         ..Recorder::default()
      };
      let query = after(recorder, "-custom", None).unwrap();
      assert_eq!(query.orders, vec!["-name ASC", "archived ASC", "id ASC"]);
   }

   #[test]
   fn after_with_null_cursor_value() {
      let cursor = Cursor::encode(&[CursorValue::Null, 1i64.into()]).unwrap();
      let query = after(Recorder::default(), "name", Some(&cursor)).unwrap();

      let (sql, values) = query.predicates[0].to_sql(0, |c| c.to_string());
      assert_eq!(sql, "name IS NOT NULL OR (name IS NULL AND id > $1)");
      assert_eq!(values.len(), 1);
   }

   #[test]
   fn order_by_adds_no_tiebreaker() {
      let query = order_by(Recorder::default(), ["-createdAt"]).unwrap();
      assert_eq!(query.orders, vec!["-createdAt ASC"]);
      assert!(query.projection.is_none());
   }
}
