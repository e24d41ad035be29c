//! The closed set of attribute datatypes.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::{Result, validators};

/// The datatype of an attribute.
///
/// Selects exactly one validator and exactly one storage slot per variant.
/// The string form (`"text"`, `"float"`, …) is the tag stored in the
/// `datatype` database column.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Datatype {
  Text,
  Float,
  Int,
  Date,
  Bool,
  Object,
  Enum,
  Json,
  Csv,
}

impl Datatype {
  /// Human-readable label used in attribute display strings.
  pub fn label(&self) -> &'static str {
    match self {
      Self::Text => "Text",
      Self::Float => "Float",
      Self::Int => "Integer",
      Self::Date => "Date",
      Self::Bool => "True / False",
      Self::Object => "Object",
      Self::Enum => "Multiple Choice",
      Self::Json => "JSON Object",
      Self::Csv => "Comma-Separated-Value",
    }
  }

  /// Check `raw` against the validator for this datatype.
  ///
  /// The match is exhaustive: a new datatype without a validator is a
  /// compile error, not a lookup that can silently fail.
  pub fn validate(&self, raw: &serde_json::Value) -> Result<()> {
    match self {
      Self::Text => validators::validate_text(raw),
      Self::Float => validators::validate_float(raw),
      Self::Int => validators::validate_int(raw),
      Self::Date => validators::validate_date(raw),
      Self::Bool => validators::validate_bool(raw),
      Self::Object => validators::validate_object(raw),
      Self::Enum => validators::validate_enum(raw),
      Self::Json => validators::validate_json(raw),
      Self::Csv => validators::validate_csv(raw),
    }
  }
}
