//! Per-datatype shape validators.
//!
//! Each validator is a pure function over a raw [`serde_json::Value`]. They
//! check shape only; coercion into a typed payload happens afterwards in
//! [`crate::value::ValuePayload::from_raw`]. The enum validator is
//! shape-only as well — choice-group membership is checked by
//! [`crate::attribute::Attribute::validate_value`], since the group hangs
//! off the attribute, not the datatype.

use chrono::NaiveDate;
use serde_json::Value as Json;

use crate::{Error, Result, datatype::Datatype, entity::EntityRef};

fn invalid(datatype: Datatype, reason: impl Into<String>) -> Error {
  Error::InvalidValue { datatype, reason: reason.into() }
}

pub fn validate_text(raw: &Json) -> Result<()> {
  match raw.as_str() {
    Some(_) => Ok(()),
    None => Err(invalid(Datatype::Text, format!("expected a string, got {raw}"))),
  }
}

pub fn validate_float(raw: &Json) -> Result<()> {
  match raw.as_f64() {
    Some(_) => Ok(()),
    None => Err(invalid(Datatype::Float, format!("expected a number, got {raw}"))),
  }
}

pub fn validate_int(raw: &Json) -> Result<()> {
  match raw.as_i64() {
    Some(_) => Ok(()),
    None => {
      Err(invalid(Datatype::Int, format!("expected an integer, got {raw}")))
    }
  }
}

pub fn validate_date(raw: &Json) -> Result<()> {
  let Some(s) = raw.as_str() else {
    return Err(invalid(Datatype::Date, format!("expected a date string, got {raw}")));
  };
  match parse_date(s) {
    Some(_) => Ok(()),
    None => Err(invalid(Datatype::Date, format!("unparsable date {s:?}"))),
  }
}

pub fn validate_bool(raw: &Json) -> Result<()> {
  match raw.as_bool() {
    Some(_) => Ok(()),
    None => Err(invalid(Datatype::Bool, format!("expected a boolean, got {raw}"))),
  }
}

/// An object value must be a resolvable host-record reference:
/// `{"type": "...", "id": <int or string>}`.
pub fn validate_object(raw: &Json) -> Result<()> {
  let entity: EntityRef = serde_json::from_value(raw.clone()).map_err(|e| {
    invalid(Datatype::Object, format!("expected an entity reference: {e}"))
  })?;
  if entity.type_tag.is_empty() {
    return Err(invalid(Datatype::Object, "entity reference has an empty type tag"));
  }
  Ok(())
}

/// An enum value is a choice label: either a bare string or an enum-value
/// reference carrying a string `value` field.
pub fn validate_enum(raw: &Json) -> Result<()> {
  match enum_label(raw) {
    Some(_) => Ok(()),
    None => {
      Err(invalid(Datatype::Enum, format!("expected a choice label, got {raw}")))
    }
  }
}

pub fn validate_json(raw: &Json) -> Result<()> {
  if raw.is_null() {
    return Err(invalid(Datatype::Json, "null is not a storable JSON value"));
  }
  Ok(())
}

/// A csv value must be a comma-joinable sequence of primitives, or a single
/// string (split on commas at coercion time).
pub fn validate_csv(raw: &Json) -> Result<()> {
  match raw {
    Json::String(_) => Ok(()),
    Json::Array(items) => {
      for item in items {
        if !(item.is_string() || item.is_number() || item.is_boolean()) {
          return Err(invalid(
            Datatype::Csv,
            format!("non-primitive element {item} in csv sequence"),
          ));
        }
      }
      Ok(())
    }
    other => Err(invalid(
      Datatype::Csv,
      format!("expected a sequence of primitives, got {other}"),
    )),
  }
}

/// Extract the choice label from a raw enum value.
pub(crate) fn enum_label(raw: &Json) -> Option<&str> {
  raw
    .as_str()
    .or_else(|| raw.get("value").and_then(Json::as_str))
}

/// Parse a calendar date from `YYYY-MM-DD` or an RFC 3339 timestamp.
pub(crate) fn parse_date(s: &str) -> Option<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().or_else(|| {
    chrono::DateTime::parse_from_rfc3339(s)
      .ok()
      .map(|dt| dt.date_naive())
  })
}
