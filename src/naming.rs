//! Identifier translation between wire (camelCase) and storage (snake_case)
//! names, plus SQL identifier quoting and placeholder numbering.

use convert_case::{Boundary, Case, Casing};

use crate::{Error, Result};

/// Translate a wire identifier to its storage form.
///
/// Each dot-separated segment is converted on its own and `*` is left alone,
/// so `teamMembers.createdAt` becomes `team_members.created_at`. Digits stay
/// attached to the word before them (`addressLine1` → `address_line1`).
pub fn to_storage(identifier: &str) -> String {
   map_segments(identifier, |segment| {
      segment
         .remove_boundaries(&Boundary::digits())
         .to_case(Case::Snake)
   })
}

/// Translate a storage identifier to its wire form (`created_at` → `createdAt`).
pub fn to_wire(identifier: &str) -> String {
   map_segments(identifier, |segment| {
      segment
         .remove_boundaries(&Boundary::digits())
         .to_case(Case::Camel)
   })
}

fn map_segments(identifier: &str, convert: fn(&str) -> String) -> String {
   identifier
      .split('.')
      .map(|segment| {
         if segment == "*" || segment.is_empty() {
            segment.to_string()
         } else {
            convert(segment)
         }
      })
      .collect::<Vec<_>>()
      .join(".")
}

/// Quote an identifier with double quotes, one dotted segment at a time.
///
/// Any embedded double quotes are doubled per SQL standard (`"` → `""`).
pub fn quote_identifier(identifier: &str) -> String {
   identifier
      .split('.')
      .map(|segment| {
         if segment == "*" {
            segment.to_string()
         } else {
            format!("\"{}\"", segment.replace('"', "\"\""))
         }
      })
      .collect::<Vec<_>>()
      .join(".")
}

/// Validate that a column name is safe for SQL interpolation.
///
/// Accepts names matching `[a-zA-Z_][a-zA-Z0-9_.]*`, which covers plain column
/// names, qualified names (e.g., `table.column`), and underscored identifiers.
pub fn validate_column_name(name: &str) -> Result<()> {
   let invalid = || Error::InvalidColumnName {
      name: name.to_string(),
   };

   let mut chars = name.chars();
   let first = chars.next().ok_or_else(invalid)?;
   if !first.is_ascii_alphabetic() && first != '_' {
      return Err(invalid());
   }

   if chars.any(|ch| !ch.is_ascii_alphanumeric() && ch != '_' && ch != '.') {
      return Err(invalid());
   }

   Ok(())
}

/// Storage-side rendering of a wire identifier: translated, then quoted.
pub(crate) fn storage_column(identifier: &str) -> String {
   quote_identifier(&to_storage(identifier))
}

/// Rewrite positional `?` placeholders to `$N`, numbering from `offset + 1`.
///
/// Question marks inside string literals, quoted identifiers and comments are
/// left alone. Returns the rewritten SQL and the number of placeholders.
pub(crate) fn number_placeholders(sql: &str, offset: usize) -> (String, usize) {
   let positions = placeholder_positions(sql);
   let mut out = String::with_capacity(sql.len() + positions.len() * 2);
   let mut last = 0;

   for (n, &pos) in positions.iter().enumerate() {
      out.push_str(&sql[last..pos]);
      out.push('$');
      out.push_str(&(offset + n + 1).to_string());
      last = pos + 1;
   }
   out.push_str(&sql[last..]);

   (out, positions.len())
}

fn placeholder_positions(sql: &str) -> Vec<usize> {
   let bytes = sql.as_bytes();
   let len = bytes.len();
   let mut positions = Vec::new();
   let mut i = 0;

   while i < len {
      match bytes[i] {
         quote @ (b'\'' | b'"' | b'`') => {
            i = skip_quoted(bytes, len, i, quote);
         }
         b'-' if i + 1 < len && bytes[i + 1] == b'-' => {
            i = skip_line_comment(bytes, len, i);
         }
         b'/' if i + 1 < len && bytes[i + 1] == b'*' => {
            i = skip_block_comment(bytes, len, i);
         }
         b'?' => positions.push(i),
         _ => {}
      }
      i += 1;
   }

   positions
}

/// Advance the scanner index past a quoted literal or identifier.
///
/// Handles SQL-standard doubled-quote escaping (`''` or `""`).
fn skip_quoted(bytes: &[u8], len: usize, i: usize, quote: u8) -> usize {
   let mut j = i + 1;
   while j < len {
      if bytes[j] == quote {
         if j + 1 < len && bytes[j + 1] == quote {
            j += 2;
            continue;
         }
         return j;
      }
      j += 1;
   }
   j
}

/// Advance the scanner index past a `--` line comment (until newline or end).
fn skip_line_comment(bytes: &[u8], len: usize, i: usize) -> usize {
   let mut j = i + 2;
   while j < len && bytes[j] != b'\n' {
      j += 1;
   }
   j
}

/// Advance the scanner index past a `/* … */` block comment.
fn skip_block_comment(bytes: &[u8], len: usize, i: usize) -> usize {
   let mut j = i + 2;
   while j + 1 < len {
      if bytes[j] == b'*' && bytes[j + 1] == b'/' {
         return j + 1;
      }
      j += 1;
   }
   len
}
