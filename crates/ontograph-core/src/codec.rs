//! The semi-structured value codec.
//!
//! Every field typed as semi-structured (maps, lists, nested scalar trees, or
//! any `Serialize` type whose serde form is such a tree) crosses the storage
//! boundary as compact JSON text, the *transport form*. Integers of arbitrary
//! size survive the round trip because the workspace enables
//! `serde_json/arbitrary_precision`.
//!
//! Decoding is idempotent: backends may hand back either the transport text or
//! a value the driver already materialised, and both decode to the same
//! [`Value`].

use serde::{Serialize, de::DeserializeOwned};

pub use serde_json::Value;

use crate::Result;

/// A semi-structured value as it comes back from a store.
#[derive(Debug, Clone, PartialEq)]
pub enum Encoded<'a> {
  /// The transport form, i.e. JSON text.
  Text(&'a str),
  /// A value the store (or its driver) already parsed.
  Native(Value),
  /// SQL `NULL` or an absent column.
  Null,
}

impl<'a> From<&'a str> for Encoded<'a> {
  fn from(s: &'a str) -> Self { Encoded::Text(s) }
}

impl<'a> From<Option<&'a str>> for Encoded<'a> {
  fn from(s: Option<&'a str>) -> Self { s.map_or(Encoded::Null, Encoded::Text) }
}

impl From<Value> for Encoded<'_> {
  fn from(v: Value) -> Self { Encoded::Native(v) }
}

/// Project any serialisable value into its semi-structured form.
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
  Ok(serde_json::to_value(value)?)
}

/// Encode a value into its transport form.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String> {
  Ok(serde_json::to_string(value)?)
}

/// Decode a stored value into a [`Value`]. A [`Encoded::Native`] input is
/// returned unchanged.
pub fn decode<'a>(raw: impl Into<Encoded<'a>>) -> Result<Value> {
  match raw.into() {
    Encoded::Text(s) => Ok(serde_json::from_str(s)?),
    Encoded::Native(v) => Ok(v),
    Encoded::Null => Ok(Value::Null),
  }
}

/// Decode a stored value straight into a typed structure.
pub fn decode_as<'a, T: DeserializeOwned>(raw: impl Into<Encoded<'a>>) -> Result<T> {
  Ok(serde_json::from_value(decode(raw)?)?)
}
