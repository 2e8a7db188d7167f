//! Order tokens and their parsed form.
//!
//! An order token is a column name, optionally prefixed with `-` and optionally
//! followed by an explicit direction:
//!
//! ```text
//! "-"? <column> (" " <ASC|DESC>)?
//! ```
//!
//! The `-` prefix and the direction word combine: `-name DESC` sorts ascending.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Sort direction for an ordering column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortDirection {
   /// Ascending order (smallest first)
   Asc,
   /// Descending order (largest first)
   Desc,
}

impl SortDirection {
   /// Return the opposite sort direction.
   pub fn reversed(self) -> Self {
      match self {
         SortDirection::Asc => SortDirection::Desc,
         SortDirection::Desc => SortDirection::Asc,
      }
   }

   /// SQL keyword for this direction.
   pub fn as_sql(self) -> &'static str {
      match self {
         SortDirection::Asc => "ASC",
         SortDirection::Desc => "DESC",
      }
   }

   fn parse(word: &str) -> Option<Self> {
      if word.eq_ignore_ascii_case("asc") {
         Some(SortDirection::Asc)
      } else if word.eq_ignore_ascii_case("desc") {
         Some(SortDirection::Desc)
      } else {
         None
      }
   }
}

/// Where NULLs sort relative to non-NULL values.
///
/// `Smallest` treats NULL as lower than every value, so NULLs come first under
/// ascending order and last under descending order. This is SQLite's native
/// behaviour and the default. `Largest` is the mirror image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NullPlacement {
   /// NULL sorts below every value
   #[default]
   Smallest,
   /// NULL sorts above every value
   Largest,
}

impl NullPlacement {
   /// Whether NULLs come before non-NULL values for a column sorted in `direction`.
   pub fn nulls_first(self, direction: SortDirection) -> bool {
      matches!(
         (self, direction),
         (NullPlacement::Smallest, SortDirection::Asc)
            | (NullPlacement::Largest, SortDirection::Desc)
      )
   }
}

/// One ordering criterion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSpec {
   /// Column identifier, handed to the query as-is
   pub column: String,
   /// Declared direction (ASC when the token has none)
   pub direction: SortDirection,
   /// Explicit negation from a leading `-`
   pub reversed: bool,
}

impl OrderSpec {
   /// Create an ascending, non-reversed spec.
   pub fn asc(column: impl Into<String>) -> Self {
      Self {
         column: column.into(),
         direction: SortDirection::Asc,
         reversed: false,
      }
   }

   /// Create a descending, non-reversed spec.
   pub fn desc(column: impl Into<String>) -> Self {
      Self {
         column: column.into(),
         direction: SortDirection::Desc,
         reversed: false,
      }
   }

   /// Parse an order token such as `name`, `-createdAt` or `score desc`.
   pub fn parse(token: &str) -> Result<Self> {
      let invalid = |reason: &'static str| Error::InvalidOrderToken {
         token: token.to_string(),
         reason,
      };

      let mut words = token.split_whitespace();
      let first = words.next().ok_or_else(|| invalid("empty token"))?;

      let direction = match words.next() {
         Some(word) => SortDirection::parse(word).ok_or_else(|| invalid("unrecognized direction"))?,
         None => SortDirection::Asc,
      };

      if words.next().is_some() {
         return Err(invalid("expected '<column> [ASC|DESC]'"));
      }

      let (column, reversed) = match first.strip_prefix('-') {
         Some(rest) => (rest, true),
         None => (first, false),
      };

      if column.is_empty() {
         return Err(invalid("missing column"));
      }

      Ok(Self {
         column: column.to_string(),
         direction,
         reversed,
      })
   }

   /// Direction after applying the reversal flag.
   pub fn effective_direction(&self) -> SortDirection {
      if self.reversed {
         self.direction.reversed()
      } else {
         self.direction
      }
   }
}

impl FromStr for OrderSpec {
   type Err = Error;

   fn from_str(token: &str) -> Result<Self> {
      Self::parse(token)
   }
}

impl fmt::Display for OrderSpec {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      let prefix = if self.reversed { "-" } else { "" };
      write!(f, "{}{} {}", prefix, self.column, self.direction.as_sql())
   }
}
