//! Composite orderings built from one or many order tokens.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::order::{NullPlacement, OrderSpec};
use crate::{Error, Result};

/// One or many order tokens, in priority order.
///
/// Converts from a single token as well as from arrays, slices and vectors so
/// that `"name"` and `["name", "-archived"]` are accepted in the same position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderTokens(Vec<String>);

impl OrderTokens {
   /// Iterate the raw tokens.
   pub fn iter(&self) -> impl Iterator<Item = &str> {
      self.0.iter().map(String::as_str)
   }

   pub fn len(&self) -> usize {
      self.0.len()
   }

   pub fn is_empty(&self) -> bool {
      self.0.is_empty()
   }
}

impl From<&str> for OrderTokens {
   fn from(token: &str) -> Self {
      Self(vec![token.to_string()])
   }
}

impl From<String> for OrderTokens {
   fn from(token: String) -> Self {
      Self(vec![token])
   }
}

impl From<&String> for OrderTokens {
   fn from(token: &String) -> Self {
      Self(vec![token.clone()])
   }
}

impl From<Vec<String>> for OrderTokens {
   fn from(tokens: Vec<String>) -> Self {
      Self(tokens)
   }
}

impl From<Vec<&str>> for OrderTokens {
   fn from(tokens: Vec<&str>) -> Self {
      tokens.into_iter().map(str::to_string).collect()
   }
}

impl From<&[&str]> for OrderTokens {
   fn from(tokens: &[&str]) -> Self {
      tokens.iter().map(|t| t.to_string()).collect()
   }
}

impl From<&[String]> for OrderTokens {
   fn from(tokens: &[String]) -> Self {
      Self(tokens.to_vec())
   }
}

impl<const N: usize> From<[&str; N]> for OrderTokens {
   fn from(tokens: [&str; N]) -> Self {
      tokens.into_iter().map(str::to_string).collect()
   }
}

impl FromIterator<String> for OrderTokens {
   fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
      Self(iter.into_iter().collect())
   }
}

/// Lookup table of logical ordering names.
///
/// A named ordering maps one token (e.g. `recent`) to an underlying token
/// sequence (e.g. `["-priority", "-createdAt"]`). Resolution is one level deep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamedOrders(HashMap<String, Vec<String>>);

impl NamedOrders {
   pub fn new() -> Self {
      Self::default()
   }

   /// Register (or replace) a named ordering.
   pub fn insert(&mut self, name: impl Into<String>, tokens: impl Into<OrderTokens>) {
      self.0.insert(name.into(), tokens.into().0);
   }

   /// Builder-style [`NamedOrders::insert`].
   pub fn with(mut self, name: impl Into<String>, tokens: impl Into<OrderTokens>) -> Self {
      self.insert(name, tokens);
      self
   }

   pub fn get(&self, name: &str) -> Option<&[String]> {
      self.0.get(name).map(Vec::as_slice)
   }

   pub fn is_empty(&self) -> bool {
      self.0.is_empty()
   }

   /// Replace every token naming a group with the group's tokens.
   ///
   /// Only single-word tokens are looked up. A leading `-` on the group name
   /// toggles the `-` of each expanded token, which reverses the whole group.
   pub fn resolve(&self, tokens: OrderTokens) -> OrderTokens {
      if self.is_empty() {
         return tokens;
      }

      let mut resolved = Vec::with_capacity(tokens.len());
      for token in tokens.0 {
         let trimmed = token.trim();
         if trimmed.contains(char::is_whitespace) {
            resolved.push(token);
            continue;
         }

         let (name, negated) = match trimmed.strip_prefix('-') {
            Some(rest) => (rest, true),
            None => (trimmed, false),
         };

         match self.get(name) {
            Some(group) => {
               trace!("resolved named ordering '{}' to {:?}", trimmed, group);
               resolved.extend(group.iter().map(|t| {
                  if negated {
                     toggle_negation(t)
                  } else {
                     t.clone()
                  }
               }));
            }
            None => resolved.push(token),
         }
      }

      OrderTokens(resolved)
   }
}

fn toggle_negation(token: &str) -> String {
   let token = token.trim();
   match token.strip_prefix('-') {
      Some(rest) => rest.to_string(),
      None => format!("-{token}"),
   }
}

/// A normalized, priority-ordered list of ordering criteria.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ordering(Vec<OrderSpec>);

impl Ordering {
   /// Parse every token in order, without a tiebreaker.
   pub fn parse(tokens: impl Into<OrderTokens>) -> Result<Self> {
      let specs = tokens
         .into()
         .iter()
         .map(OrderSpec::parse)
         .collect::<Result<Vec<_>>>()?;

      Ok(Self(specs))
   }

   /// Parse the tokens and append `tiebreaker` unless it is already present.
   ///
   /// User-specified columns are neither deduplicated nor reordered. The
   /// tiebreaker is appended ascending; an explicit occurrence keeps the
   /// caller's position and direction.
   pub fn build(tokens: impl Into<OrderTokens>, tiebreaker: &str) -> Result<Self> {
      Self::build_with(tokens, tiebreaker, &NamedOrders::default())
   }

   /// [`Ordering::build`] after resolving named orderings.
   pub fn build_with(
      tokens: impl Into<OrderTokens>,
      tiebreaker: &str,
      named: &NamedOrders,
   ) -> Result<Self> {
      if tiebreaker.is_empty() {
         return Err(Error::InvalidOrderToken {
            token: String::new(),
            reason: "empty tiebreaker column",
         });
      }

      let mut ordering = Self::parse(named.resolve(tokens.into()))?;
      if !ordering.contains_column(tiebreaker) {
         ordering.0.push(OrderSpec::asc(tiebreaker));
      }

      Ok(ordering)
   }

   pub fn specs(&self) -> &[OrderSpec] {
      &self.0
   }

   pub fn iter(&self) -> std::slice::Iter<'_, OrderSpec> {
      self.0.iter()
   }

   pub fn len(&self) -> usize {
      self.0.len()
   }

   pub fn is_empty(&self) -> bool {
      self.0.is_empty()
   }

   /// Column identifiers in priority order.
   pub fn columns(&self) -> impl Iterator<Item = &str> {
      self.0.iter().map(|spec| spec.column.as_str())
   }

   pub fn contains_column(&self, column: &str) -> bool {
      self.0.iter().any(|spec| spec.column == column)
   }

   /// Render the `ORDER BY` clause.
   ///
   /// `column` renders each identifier (quoting, renaming). Explicit
   /// `NULLS FIRST` / `NULLS LAST` is only emitted for
   /// [`NullPlacement::Largest`], since SQLite already sorts NULL lowest.
   pub fn to_sql(&self, nulls: NullPlacement, mut column: impl FnMut(&str) -> String) -> String {
      let parts: Vec<String> = self
         .0
         .iter()
         .map(|spec| {
            let direction = spec.effective_direction();
            let mut part = format!("{} {}", column(&spec.column), direction.as_sql());
            if nulls == NullPlacement::Largest {
               part.push_str(if nulls.nulls_first(direction) {
                  " NULLS FIRST"
               } else {
                  " NULLS LAST"
               });
            }
            part
         })
         .collect();

      format!("ORDER BY {}", parts.join(", "))
   }
}

impl From<Vec<OrderSpec>> for Ordering {
   fn from(specs: Vec<OrderSpec>) -> Self {
      Self(specs)
   }
}

impl<'a> IntoIterator for &'a Ordering {
   type Item = &'a OrderSpec;
   type IntoIter = std::slice::Iter<'a, OrderSpec>;

   fn into_iter(self) -> Self::IntoIter {
      self.0.iter()
   }
}
