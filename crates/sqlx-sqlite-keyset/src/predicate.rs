//! NULL-aware "strictly after" predicates.
//!
//! For an ordering `[o1..on]` and cursor values `[v1..vn]` the predicate is
//! defined level by level:
//!
//! | cursor value | NULLs sort | predicate for `o1` |
//! |--------------|------------|--------------------|
//! | NULL         | first      | `c IS NOT NULL OR (c IS NULL AND rest)` |
//! | NULL         | last       | `c IS NULL AND rest` |
//! | `v`          | first      | `c cmp v OR (c = v AND rest)` |
//! | `v`          | last       | `c cmp v OR c IS NULL OR (c = v AND rest)` |
//!
//! where `cmp` is `>` for an ascending column and `<` for a descending one, and
//! the predicate over an empty ordering is `FALSE`.
//!
//! Row-value comparison (`(a, b) > ($1, $2)`) is deliberately not used: it
//! evaluates to NULL as soon as either side holds a NULL.

use serde_json::Value as JsonValue;
use tracing::trace;

use crate::cursor::CursorValue;
use crate::order::{NullPlacement, OrderSpec, SortDirection};
use crate::ordering::Ordering;
use crate::{Error, Result};

/// Comparison operator of a [`Predicate::Compare`] node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
   Eq,
   Gt,
   Lt,
}

impl CompareOp {
   pub fn as_sql(self) -> &'static str {
      match self {
         CompareOp::Eq => "=",
         CompareOp::Gt => ">",
         CompareOp::Lt => "<",
      }
   }
}

/// Boolean expression over ordering columns.
///
/// Build through the associated constructors, which fold literals and flatten
/// nested conjunctions and disjunctions.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
   Literal(bool),
   Compare {
      column: String,
      op: CompareOp,
      value: JsonValue,
   },
   IsNull {
      column: String,
   },
   Not(Box<Predicate>),
   And(Vec<Predicate>),
   Or(Vec<Predicate>),
}

impl Predicate {
   pub fn compare(column: impl Into<String>, op: CompareOp, value: JsonValue) -> Self {
      Predicate::Compare {
         column: column.into(),
         op,
         value,
      }
   }

   pub fn is_null(column: impl Into<String>) -> Self {
      Predicate::IsNull {
         column: column.into(),
      }
   }

   pub fn is_not_null(column: impl Into<String>) -> Self {
      Predicate::not(Predicate::is_null(column))
   }

   pub fn not(inner: Predicate) -> Self {
      match inner {
         Predicate::Literal(b) => Predicate::Literal(!b),
         Predicate::Not(inner) => *inner,
         other => Predicate::Not(Box::new(other)),
      }
   }

   /// Conjunction. `TRUE` operands are dropped; any `FALSE` operand wins.
   pub fn and(parts: impl IntoIterator<Item = Predicate>) -> Self {
      let mut flat = Vec::new();
      for part in parts {
         match part {
            Predicate::Literal(true) => {}
            Predicate::Literal(false) => return Predicate::Literal(false),
            Predicate::And(inner) => flat.extend(inner),
            other => flat.push(other),
         }
      }

      match flat.len() {
         0 => Predicate::Literal(true),
         1 => flat.remove(0),
         _ => Predicate::And(flat),
      }
   }

   /// Disjunction. `FALSE` operands are dropped; any `TRUE` operand wins.
   pub fn or(parts: impl IntoIterator<Item = Predicate>) -> Self {
      let mut flat = Vec::new();
      for part in parts {
         match part {
            Predicate::Literal(false) => {}
            Predicate::Literal(true) => return Predicate::Literal(true),
            Predicate::Or(inner) => flat.extend(inner),
            other => flat.push(other),
         }
      }

      match flat.len() {
         0 => Predicate::Literal(false),
         1 => flat.remove(0),
         _ => Predicate::Or(flat),
      }
   }

   /// Render as SQL with `$N` placeholders.
   ///
   /// Placeholders are numbered from `param_offset + 1` so they follow any
   /// bind values already present in the surrounding query. `column` renders
   /// each column identifier (quoting, renaming). Returns the fragment and
   /// its bind values in placeholder order.
   pub fn to_sql(
      &self,
      param_offset: usize,
      column: impl Fn(&str) -> String,
   ) -> (String, Vec<JsonValue>) {
      let mut values = Vec::new();
      let sql = self.render(&column, param_offset, &mut values);
      (sql, values)
   }

   fn render(
      &self,
      column: &dyn Fn(&str) -> String,
      offset: usize,
      values: &mut Vec<JsonValue>,
   ) -> String {
      match self {
         Predicate::Literal(true) => "TRUE".to_string(),
         Predicate::Literal(false) => "FALSE".to_string(),
         Predicate::Compare {
            column: name,
            op,
            value,
         } => {
            values.push(value.clone());
            format!(
               "{} {} ${}",
               column(name),
               op.as_sql(),
               offset + values.len()
            )
         }
         Predicate::IsNull { column: name } => format!("{} IS NULL", column(name)),
         Predicate::Not(inner) => match inner.as_ref() {
            Predicate::IsNull { column: name } => format!("{} IS NOT NULL", column(name)),
            other => format!("NOT ({})", other.render(column, offset, values)),
         },
         Predicate::And(parts) => Self::join(parts, " AND ", column, offset, values),
         Predicate::Or(parts) => Self::join(parts, " OR ", column, offset, values),
      }
   }

   fn join(
      parts: &[Predicate],
      separator: &str,
      column: &dyn Fn(&str) -> String,
      offset: usize,
      values: &mut Vec<JsonValue>,
   ) -> String {
      parts
         .iter()
         .map(|part| match part {
            Predicate::And(_) | Predicate::Or(_) => {
               format!("({})", part.render(column, offset, values))
            }
            _ => part.render(column, offset, values),
         })
         .collect::<Vec<_>>()
         .join(separator)
   }
}

/// Build the predicate selecting rows strictly after `values` under `ordering`.
pub fn keyset_predicate(
   ordering: &Ordering,
   values: &[CursorValue],
   nulls: NullPlacement,
) -> Result<Predicate> {
   if ordering.len() != values.len() {
      return Err(Error::OrderingLengthMismatch {
         cursor_len: values.len(),
         ordering_len: ordering.len(),
      });
   }

   let predicate = after_level(ordering.specs(), values, nulls)?;
   trace!("keyset predicate over {} columns: {:?}", ordering.len(), predicate);

   Ok(predicate)
}

fn after_level(
   specs: &[OrderSpec],
   values: &[CursorValue],
   nulls: NullPlacement,
) -> Result<Predicate> {
   let (Some((spec, specs)), Some((value, values))) = (specs.split_first(), values.split_first())
   else {
      return Ok(Predicate::Literal(false));
   };

   let column = spec.column.as_str();
   let direction = spec.effective_direction();
   let nulls_first = nulls.nulls_first(direction);
   let rest = after_level(specs, values, nulls)?;

   if value.is_null() {
      return Ok(if nulls_first {
         Predicate::or([
            Predicate::is_not_null(column),
            Predicate::and([Predicate::is_null(column), rest]),
         ])
      } else {
         Predicate::and([Predicate::is_null(column), rest])
      });
   }

   let value = value.to_json()?;
   let op = match direction {
      SortDirection::Asc => CompareOp::Gt,
      SortDirection::Desc => CompareOp::Lt,
   };

   let mut branches = vec![Predicate::compare(column, op, value.clone())];
   if !nulls_first {
      branches.push(Predicate::is_null(column));
   }
   branches.push(Predicate::and([
      Predicate::compare(column, CompareOp::Eq, value),
      rest,
   ]));

   Ok(Predicate::or(branches))
}

#[cfg(test)]
mod tests {
   use super::*;
   use serde_json::json;

   fn quoted(column: &str) -> String {
      format!("\"{column}\"")
   }

   fn render(ordering: &[&str], values: &[CursorValue], nulls: NullPlacement) -> String {
      let ordering = Ordering::parse(ordering.to_vec()).unwrap();
      let predicate = keyset_predicate(&ordering, values, nulls).unwrap();
      predicate.to_sql(0, quoted).0
   }

   // ─── constructors ───

   #[test]
   fn and_folds_literals() {
      assert_eq!(Predicate::and([]), Predicate::Literal(true));
      assert_eq!(
         Predicate::and([Predicate::is_null("a"), Predicate::Literal(false)]),
         Predicate::Literal(false)
      );
      assert_eq!(
         Predicate::and([Predicate::Literal(true), Predicate::is_null("a")]),
         Predicate::is_null("a")
      );
   }

   #[test]
   fn or_folds_literals() {
      assert_eq!(Predicate::or([]), Predicate::Literal(false));
      assert_eq!(
         Predicate::or([Predicate::is_null("a"), Predicate::Literal(true)]),
         Predicate::Literal(true)
      );
   }

   #[test]
   fn or_flattens_nested_disjunctions() {
      let nested = Predicate::or([
         Predicate::is_null("a"),
         Predicate::or([Predicate::is_null("b"), Predicate::is_null("c")]),
      ]);
      assert!(matches!(nested, Predicate::Or(ref parts) if parts.len() == 3));
   }

   #[test]
   fn double_negation_cancels() {
      let p = Predicate::not(Predicate::not(Predicate::is_null("a")));
      assert_eq!(p, Predicate::is_null("a"));
   }

   // ─── keyset_predicate shapes ───

   #[test]
   fn single_ascending_column() {
      assert_eq!(
         render(&["id"], &[5i64.into()], NullPlacement::Smallest),
         r#""id" > $1"#
      );
   }

   #[test]
   fn single_descending_column() {
      assert_eq!(
         render(&["-id"], &[5i64.into()], NullPlacement::Smallest),
         r#""id" < $1"#
      );
   }

   #[test]
   fn value_with_nulls_first() {
      assert_eq!(
         render(
            &["name", "id"],
            &["Team 1".into(), 1i64.into()],
            NullPlacement::Smallest
         ),
         r#""name" > $1 OR ("name" = $2 AND "id" > $3)"#
      );
   }

   #[test]
   fn value_with_nulls_last() {
      assert_eq!(
         render(
            &["-name", "id"],
            &["Team 1".into(), 1i64.into()],
            NullPlacement::Smallest
         ),
         r#""name" < $1 OR "name" IS NULL OR ("name" = $2 AND "id" > $3)"#
      );
   }

   #[test]
   fn null_with_nulls_first() {
      assert_eq!(
         render(
            &["name", "id"],
            &[CursorValue::Null, 2i64.into()],
            NullPlacement::Smallest
         ),
         r#""name" IS NOT NULL OR ("name" IS NULL AND "id" > $1)"#
      );
   }

   #[test]
   fn null_with_nulls_last() {
      assert_eq!(
         render(
            &["-name", "id"],
            &[CursorValue::Null, 2i64.into()],
            NullPlacement::Smallest
         ),
         r#""name" IS NULL AND "id" > $1"#
      );
   }

   #[test]
   fn largest_placement_mirrors_null_branches() {
      assert_eq!(
         render(
            &["name", "id"],
            &["Team 1".into(), 1i64.into()],
            NullPlacement::Largest
         ),
         r#""name" > $1 OR "name" IS NULL OR ("name" = $2 AND "id" > $3)"#
      );
   }

   #[test]
   fn null_on_last_level_sorting_last_is_false() {
      assert_eq!(
         render(&["-name"], &[CursorValue::Null], NullPlacement::Smallest),
         "FALSE"
      );
   }

   #[test]
   fn empty_ordering_is_false() {
      let predicate =
         keyset_predicate(&Ordering::default(), &[], NullPlacement::Smallest).unwrap();
      assert_eq!(predicate, Predicate::Literal(false));
   }

   #[test]
   fn three_level_nesting_keeps_parentheses() {
      assert_eq!(
         render(
            &["a", "-b", "id"],
            &["va".into(), "vb".into(), 3i64.into()],
            NullPlacement::Smallest
         ),
         r#""a" > $1 OR ("a" = $2 AND ("b" < $3 OR "b" IS NULL OR ("b" = $4 AND "id" > $5)))"#
      );
   }

   #[test]
   fn placeholders_follow_offset() {
      let ordering = Ordering::parse(["name", "id"]).unwrap();
      let predicate = keyset_predicate(
         &ordering,
         &["Team 1".into(), 1i64.into()],
         NullPlacement::Smallest,
      )
      .unwrap();

      let (sql, values) = predicate.to_sql(2, quoted);

      assert_eq!(sql, r#""name" > $3 OR ("name" = $4 AND "id" > $5)"#);
      assert_eq!(values, vec![json!("Team 1"), json!("Team 1"), json!(1)]);
   }

   #[test]
   fn length_mismatch_is_rejected() {
      let ordering = Ordering::parse(["name", "id"]).unwrap();
      let err = keyset_predicate(&ordering, &[1i64.into()], NullPlacement::Smallest).unwrap_err();
      assert_eq!(
         err,
         Error::OrderingLengthMismatch {
            cursor_len: 1,
            ordering_len: 2
         }
      );
   }

   #[test]
   fn not_renders_with_parentheses() {
      let p = Predicate::not(Predicate::compare("a", CompareOp::Eq, json!(1)));
      assert_eq!(p.to_sql(0, quoted).0, r#"NOT ("a" = $1)"#);
   }
}
