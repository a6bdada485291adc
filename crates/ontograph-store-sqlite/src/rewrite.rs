//! Pre-execution statement rewriting for semi-structured columns.
//!
//! Semi-structured values are bound as their JSON transport text, but a
//! column holding them must receive the output of the store's parse function
//! (`json(?)`), and function calls are not accepted inside a literal
//! `INSERT … VALUES (…)` list. Every single-row INSERT that targets one of
//! [`SEMI_STRUCTURED_COLUMNS`] is therefore rewritten from
//!
//! ```sql
//! INSERT INTO nodes (node_id, structured_data) VALUES (?1, ?2)
//! ```
//!
//! to
//!
//! ```sql
//! INSERT INTO nodes (node_id, structured_data) SELECT ?1, json(?2)
//! ```
//!
//! A trailing `ON CONFLICT …` or `RETURNING …` clause is kept behind
//! `WHERE true`, which SQLite needs to parse an upsert clause after a
//! `SELECT`. Statements that are not INSERTs, or that touch no registered
//! column, pass through untouched.

use std::borrow::Cow;

use crate::{Error, Result};

/// Columns that hold semi-structured (JSON) values, in any table.
pub const SEMI_STRUCTURED_COLUMNS: &[&str] = &[
  "config",
  "stats",
  "tags",
  "attributes",
  "vector_config",
  "unstructured_config",
  "endpoints",
  "structured_data",
  "unstructured_data",
  "vector",
  "metadata",
  "properties",
  "ontology",
  "finalized_schema_ids",
];

/// The store-native "parse as semi-structured" function.
pub const PARSE_FUNCTION: &str = "json";

/// A hook that sees every write statement before it is prepared.
pub trait StatementInterceptor: Send + Sync + 'static {
  fn intercept<'a>(&self, sql: &'a str) -> Result<Cow<'a, str>>;
}

/// Hands every statement to the driver as written.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl StatementInterceptor for Passthrough {
  fn intercept<'a>(&self, sql: &'a str) -> Result<Cow<'a, str>> { Ok(Cow::Borrowed(sql)) }
}

/// Wraps placeholders bound to semi-structured columns in the parse function.
#[derive(Debug, Clone)]
pub struct SemiStructuredRewriter {
  columns:  Vec<String>,
  function: String,
}

impl Default for SemiStructuredRewriter {
  fn default() -> Self {
    Self::new(SEMI_STRUCTURED_COLUMNS.iter().copied(), PARSE_FUNCTION)
  }
}

impl SemiStructuredRewriter {
  pub fn new<'c>(columns: impl IntoIterator<Item = &'c str>, function: impl Into<String>) -> Self {
    Self {
      columns:  columns.into_iter().map(str::to_ascii_lowercase).collect(),
      function: function.into(),
    }
  }

  fn is_semi_structured(&self, column: &str) -> bool {
    self.columns.iter().any(|c| c.eq_ignore_ascii_case(column))
  }
}

impl StatementInterceptor for SemiStructuredRewriter {
  fn intercept<'a>(&self, sql: &'a str) -> Result<Cow<'a, str>> {
    let mut cur = Cursor::new(sql);
    if !cur.keyword("INSERT") {
      return Ok(Cow::Borrowed(sql));
    }
    if cur.keyword("OR") && cur.identifier().is_none() {
      return Ok(Cow::Borrowed(sql));
    }
    if !cur.keyword("INTO") || cur.qualified_name().is_none() {
      return Ok(Cow::Borrowed(sql));
    }

    let fail = |columns: &[&str], reason| Error::StoreRewriteFailure {
      sql: sql.to_owned(),
      columns: columns.iter().map(|c| unquote(c).to_owned()).collect(),
      reason,
    };

    cur.skip_ws();
    if !cur.peek_is(b'(') {
      // `INSERT INTO t VALUES (…)` gives no way to tell which columns are
      // targeted. `DEFAULT VALUES` and `SELECT` forms bind nothing here.
      return if cur.keyword("VALUES") {
        Err(fail(&[], "missing column list"))
      } else {
        Ok(Cow::Borrowed(sql))
      };
    }

    let columns = cur.group().map_err(|reason| fail(&[], reason))?;
    let header_end = cur.pos;
    if !columns.iter().any(|c| self.is_semi_structured(unquote(c))) {
      return Ok(Cow::Borrowed(sql));
    }

    if !cur.keyword("VALUES") {
      return Ok(Cow::Borrowed(sql));
    }
    cur.skip_ws();
    if !cur.peek_is(b'(') {
      return Err(fail(&columns, "expected a parenthesised VALUES list"));
    }
    let values = cur.group().map_err(|reason| fail(&columns, reason))?;
    cur.skip_ws();
    if cur.peek_is(b',') {
      return Err(fail(&columns, "multi-row VALUES cannot carry semi-structured values"));
    }
    if values.len() != columns.len() {
      return Err(fail(&columns, "column and value counts differ"));
    }

    let exprs: Vec<Cow<'_, str>> = columns
      .iter()
      .zip(&values)
      .map(|(column, value)| {
        if self.is_semi_structured(unquote(column)) && is_placeholder(value) {
          Cow::Owned(format!("{}({value})", self.function))
        } else {
          Cow::Borrowed(*value)
        }
      })
      .collect();

    let mut out = String::with_capacity(sql.len() + 16);
    out.push_str(&sql[..header_end]);
    out.push_str(" SELECT ");
    out.push_str(&exprs.join(", "));
    let tail = sql[cur.pos..].trim().trim_end_matches(';').trim_end();
    if !tail.is_empty() {
      out.push_str(" WHERE true ");
      out.push_str(tail);
    }
    Ok(Cow::Owned(out))
  }
}

fn is_placeholder(expr: &str) -> bool {
  matches!(expr.as_bytes().first(), Some(b'?' | b':' | b'@' | b'$'))
}

fn unquote(ident: &str) -> &str {
  let b = ident.as_bytes();
  match (b.first(), b.last()) {
    (Some(b'"'), Some(b'"')) | (Some(b'`'), Some(b'`')) | (Some(b'['), Some(b']'))
      if b.len() >= 2 =>
    {
      &ident[1..ident.len() - 1]
    }
    _ => ident,
  }
}

// ─── Scanner ─────────────────────────────────────────────────────────────────

/// Just enough of a SQL scanner to find the column and VALUES lists of an
/// INSERT. Delimiters are ASCII, so byte positions are always on UTF-8
/// boundaries.
struct Cursor<'a> {
  sql: &'a str,
  pos: usize,
}

impl<'a> Cursor<'a> {
  fn new(sql: &'a str) -> Self { Self { sql, pos: 0 } }

  fn bytes(&self) -> &'a [u8] { self.sql.as_bytes() }

  fn skip_ws(&mut self) {
    while self.pos < self.sql.len() && self.bytes()[self.pos].is_ascii_whitespace() {
      self.pos += 1;
    }
  }

  fn peek_is(&self, b: u8) -> bool { self.bytes().get(self.pos) == Some(&b) }

  /// Consume `kw` (case-insensitive) if it is the next whole word.
  fn keyword(&mut self, kw: &str) -> bool {
    self.skip_ws();
    let end = self.pos + kw.len();
    let matches = self.sql.get(self.pos..end).is_some_and(|w| w.eq_ignore_ascii_case(kw))
      && !self.bytes().get(end).is_some_and(|b| is_ident_byte(*b));
    if matches {
      self.pos = end;
    }
    matches
  }

  fn identifier(&mut self) -> Option<&'a str> {
    self.skip_ws();
    let start = self.pos;
    let close = match self.bytes().get(start)? {
      b'"' => b'"',
      b'`' => b'`',
      b'[' => b']',
      b if is_ident_byte(*b) => {
        while self.bytes().get(self.pos).is_some_and(|b| is_ident_byte(*b)) {
          self.pos += 1;
        }
        return Some(&self.sql[start..self.pos]);
      }
      _ => return None,
    };
    let rel = self.bytes()[start + 1..].iter().position(|b| *b == close)?;
    self.pos = start + rel + 2;
    Some(&self.sql[start..self.pos])
  }

  /// `name` or `schema.name`.
  fn qualified_name(&mut self) -> Option<&'a str> {
    self.skip_ws();
    let start = self.pos;
    self.identifier()?;
    while self.peek_is(b'.') {
      self.pos += 1;
      self.identifier()?;
    }
    Some(&self.sql[start..self.pos])
  }

  /// Consume a parenthesised list starting at the cursor and return its
  /// top-level, comma-separated items, trimmed.
  fn group(&mut self) -> std::result::Result<Vec<&'a str>, &'static str> {
    let bytes = self.bytes();
    let mut depth = 0usize;
    let mut items = Vec::new();
    let mut item_start = self.pos + 1;
    let mut i = self.pos;

    while i < bytes.len() {
      match bytes[i] {
        q @ (b'\'' | b'"' | b'`') => {
          i += 1;
          loop {
            match bytes.get(i) {
              None => return Err("unterminated quoted string"),
              Some(b) if *b == q && bytes.get(i + 1) == Some(&q) => i += 2,
              Some(b) if *b == q => break,
              Some(_) => i += 1,
            }
          }
        }
        b'[' => {
          let rel = bytes[i..].iter().position(|b| *b == b']').ok_or("unterminated identifier")?;
          i += rel;
        }
        b'(' => depth += 1,
        b')' => {
          depth = depth.checked_sub(1).ok_or("unbalanced parentheses")?;
          if depth == 0 {
            let last = self.sql[item_start..i].trim();
            if !last.is_empty() || !items.is_empty() {
              items.push(last);
            }
            self.pos = i + 1;
            return Ok(items);
          }
        }
        b',' if depth == 1 => {
          items.push(self.sql[item_start..i].trim());
          item_start = i + 1;
        }
        _ => {}
      }
      i += 1;
    }
    Err("unbalanced parentheses")
  }
}

fn is_ident_byte(b: u8) -> bool { b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80 }
