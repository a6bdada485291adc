//! Payload validation against a pinned [`Schema`].
//!
//! Unambiguous scalars are coerced (a numeric string becomes an int, `"true"`
//! becomes a bool, an integral float becomes an int); everything else that
//! does not match the declared type is rejected. Missing optional attributes
//! with a default are filled in.

use std::fmt;

use chrono::{DateTime, NaiveDate};
use serde_json::{Map, Number, Value};

use crate::{
  schema::{DataType, Schema},
  version::SemVer,
};

/// What is wrong with one attribute of a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Problem {
  /// The payload is not a map.
  NotAnObject,
  Missing,
  TypeMismatch { expected: &'static str, found: &'static str },
  NotInEnum { value: String },
  /// The attribute is not declared and the schema is strict.
  Unknown,
}

impl fmt::Display for Problem {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::NotAnObject => write!(f, "payload must be an object"),
      Self::Missing => write!(f, "required attribute is missing"),
      Self::TypeMismatch { expected, found } => write!(f, "expected {expected}, found {found}"),
      Self::NotInEnum { value } => write!(f, "{value:?} is not an allowed value"),
      Self::Unknown => write!(f, "attribute is not declared by the schema"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
  pub attribute: String,
  pub problem:   Problem,
}

/// Every violation found in one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
  pub schema_name: String,
  pub version:     SemVer,
  pub violations:  Vec<Violation>,
}

impl fmt::Display for ValidationError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "payload does not match schema {} v{}: ", self.schema_name, self.version)?;
    for (i, v) in self.violations.iter().enumerate() {
      if i > 0 {
        write!(f, "; ")?;
      }
      write!(f, "{}: {}", v.attribute, v.problem)?;
    }
    Ok(())
  }
}

impl std::error::Error for ValidationError {}

/// Validate `data` against `schema`, returning the coerced payload.
///
/// `null` is treated as an empty map.
pub fn validate_payload(schema: &Schema, data: &Value) -> Result<Value, ValidationError> {
  let fail = |violations| ValidationError {
    schema_name: schema.schema_name.clone(),
    version: schema.version,
    violations,
  };

  let empty = Map::new();
  let input = match data {
    Value::Object(map) => map,
    Value::Null => &empty,
    _ => {
      return Err(fail(vec![Violation { attribute: "$".into(), problem: Problem::NotAnObject }]));
    }
  };

  let mut out = Map::new();
  let mut violations = Vec::new();

  for attr in &schema.attributes {
    match input.get(&attr.name) {
      None | Some(Value::Null) => {
        if let Some(default) = &attr.default {
          out.insert(attr.name.clone(), default.clone());
        } else if attr.required {
          violations.push(Violation { attribute: attr.name.clone(), problem: Problem::Missing });
        } else if input.contains_key(&attr.name) {
          out.insert(attr.name.clone(), Value::Null);
        }
      }
      Some(value) => match coerce(&attr.data_type, value) {
        Ok(v) => {
          out.insert(attr.name.clone(), v);
        }
        Err(problem) => violations.push(Violation { attribute: attr.name.clone(), problem }),
      },
    }
  }

  for (key, value) in input {
    if schema.attribute(key).is_some() {
      continue;
    }
    if schema.strict {
      violations.push(Violation { attribute: key.clone(), problem: Problem::Unknown });
    } else {
      out.insert(key.clone(), value.clone());
    }
  }

  if violations.is_empty() { Ok(Value::Object(out)) } else { Err(fail(violations)) }
}

fn kind_of(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "bool",
    Value::Number(n) if is_integral(n) => "int",
    Value::Number(_) => "float",
    Value::String(_) => "string",
    Value::Array(_) => "list",
    Value::Object(_) => "object",
  }
}

/// Integral numbers, including ones too large for 64 bits.
fn is_integral(n: &Number) -> bool {
  n.is_i64() || n.is_u64() || !n.to_string().contains(['.', 'e', 'E'])
}

fn coerce(data_type: &DataType, value: &Value) -> Result<Value, Problem> {
  let mismatch = || Problem::TypeMismatch { expected: data_type.name(), found: kind_of(value) };

  match (data_type, value) {
    (DataType::Json, v) => Ok(v.clone()),

    (DataType::String, Value::String(_)) => Ok(value.clone()),

    (DataType::Int, Value::Number(n)) if is_integral(n) => Ok(value.clone()),
    (DataType::Int, Value::Number(n)) => match n.as_f64() {
      Some(f) if f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 => Ok(Value::from(f as i64)),
      _ => Err(mismatch()),
    },
    (DataType::Int, Value::String(s)) => s.trim().parse::<i64>().map(Value::from).map_err(|_| mismatch()),

    (DataType::Float, Value::Number(n)) => {
      n.as_f64().and_then(Number::from_f64).map(Value::Number).ok_or_else(mismatch)
    }
    (DataType::Float, Value::String(s)) => s
      .trim()
      .parse::<f64>()
      .ok()
      .and_then(Number::from_f64)
      .map(Value::Number)
      .ok_or_else(mismatch),

    (DataType::Bool, Value::Bool(_)) => Ok(value.clone()),
    (DataType::Bool, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
      "true" => Ok(Value::Bool(true)),
      "false" => Ok(Value::Bool(false)),
      _ => Err(mismatch()),
    },

    (DataType::Enum(variants), Value::String(s)) => {
      if variants.iter().any(|v| v == s) {
        Ok(value.clone())
      } else {
        Err(Problem::NotInEnum { value: s.clone() })
      }
    }

    (DataType::Date, Value::String(s)) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
      .map(|d| Value::String(d.to_string()))
      .map_err(|_| mismatch()),

    (DataType::Datetime, Value::String(s)) => DateTime::parse_from_rfc3339(s.trim())
      .map(|_| value.clone())
      .map_err(|_| mismatch()),

    _ => Err(mismatch()),
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;
  use uuid::Uuid;

  use super::*;
  use crate::schema::{AttributeDefinition, SchemaDefinition};

  fn schema(def: SchemaDefinition) -> Schema { Schema::from_definition(Uuid::new_v4(), def, SemVer::INITIAL) }

  fn person() -> Schema {
    schema(
      SchemaDefinition::node("Person")
        .with_attribute(AttributeDefinition::required("name", DataType::String))
        .with_attribute(AttributeDefinition::optional("age", DataType::Int))
        .with_attribute(AttributeDefinition::optional("score", DataType::Float))
        .with_attribute(AttributeDefinition::optional("active", DataType::Bool))
        .with_attribute(
          AttributeDefinition::optional("role", DataType::Enum(vec!["author".into(), "editor".into()]))
            .with_default(json!("author")),
        ),
    )
  }

  #[test]
  fn accepts_matching_payload_and_fills_defaults() {
    let out = validate_payload(&person(), &json!({ "name": "Ada", "age": 36 })).unwrap();
    assert_eq!(out, json!({ "name": "Ada", "age": 36, "role": "author" }));
  }

  #[test]
  fn coerces_unambiguous_scalars() {
    let out = validate_payload(
      &person(),
      &json!({ "name": "Ada", "age": " 36 ", "score": "9.5", "active": "TRUE" }),
    )
    .unwrap();
    assert_eq!(out["age"], json!(36));
    assert_eq!(out["score"], json!(9.5));
    assert_eq!(out["active"], json!(true));
  }

  #[test]
  fn integral_float_becomes_int() {
    let out = validate_payload(&person(), &json!({ "name": "Ada", "age": 36.0 })).unwrap();
    assert_eq!(out["age"].as_i64(), Some(36));
  }

  #[test]
  fn big_integers_stay_ints() {
    let big: Value = serde_json::from_str("99999999999999999999999").unwrap();
    let out = validate_payload(&person(), &json!({ "name": "Ada", "age": big })).unwrap();
    assert_eq!(out["age"].to_string(), "99999999999999999999999");
  }

  #[test]
  fn reports_every_violation() {
    let err = validate_payload(&person(), &json!({ "age": "old", "active": 1, "role": "admin" })).unwrap_err();
    let attrs: Vec<_> = err.violations.iter().map(|v| v.attribute.as_str()).collect();
    assert_eq!(attrs, ["name", "age", "active", "role"]);
    assert_eq!(err.violations[0].problem, Problem::Missing);
    assert!(matches!(err.violations[3].problem, Problem::NotInEnum { .. }));
    assert!(err.to_string().starts_with("payload does not match schema Person v1.0.0"));
  }

  #[test]
  fn numbers_are_not_coerced_to_strings() {
    let err = validate_payload(&person(), &json!({ "name": 42 })).unwrap_err();
    assert_eq!(
      err.violations[0].problem,
      Problem::TypeMismatch { expected: "string", found: "int" }
    );
  }

  #[test]
  fn unknown_attributes_depend_on_strictness() {
    let lax = person();
    let out = validate_payload(&lax, &json!({ "name": "Ada", "nickname": "Countess" })).unwrap();
    assert_eq!(out["nickname"], json!("Countess"));

    let mut strict = person();
    strict.strict = true;
    let err = validate_payload(&strict, &json!({ "name": "Ada", "nickname": "Countess" })).unwrap_err();
    assert_eq!(err.violations[0].problem, Problem::Unknown);
  }

  #[test]
  fn null_payload_is_an_empty_map() {
    let empty = schema(SchemaDefinition::node("Topic"));
    assert_eq!(validate_payload(&empty, &Value::Null).unwrap(), json!({}));
    assert!(validate_payload(&person(), &Value::Null).is_err());
  }

  #[test]
  fn non_object_payload_is_rejected() {
    let err = validate_payload(&person(), &json!([1, 2])).unwrap_err();
    assert_eq!(err.violations[0].problem, Problem::NotAnObject);
  }

  #[test]
  fn dates_are_normalised() {
    let s = schema(
      SchemaDefinition::node("Event")
        .with_attribute(AttributeDefinition::required("on", DataType::Date))
        .with_attribute(AttributeDefinition::optional("at", DataType::Datetime)),
    );
    let out = validate_payload(&s, &json!({ "on": "2024-03-01", "at": "2024-03-01T10:00:00Z" })).unwrap();
    assert_eq!(out["on"], json!("2024-03-01"));
    assert!(validate_payload(&s, &json!({ "on": "March 1st" })).is_err());
  }
}
