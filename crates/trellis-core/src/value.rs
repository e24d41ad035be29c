//! Stored values — the typed payload union and its row envelope.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

use crate::{
  Error, Result,
  datatype::Datatype,
  entity::EntityRef,
  validators::{enum_label, parse_date},
};

// ─── Payload ─────────────────────────────────────────────────────────────────

/// The typed payload of a stored value — exactly one variant per datatype,
/// so "exactly one slot populated" holds structurally rather than as a
/// runtime check over nine nullable fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ValuePayload {
  Text(String),
  Float(f64),
  Int(i64),
  Date(NaiveDate),
  Bool(bool),
  /// A reference to another host record.
  Object(EntityRef),
  /// The label of the chosen [`crate::enums::EnumValue`].
  Enum(String),
  Json(Json),
  Csv(Vec<String>),
}

impl ValuePayload {
  /// The datatype whose storage slot this payload occupies.
  pub fn datatype(&self) -> Datatype {
    match self {
      Self::Text(_) => Datatype::Text,
      Self::Float(_) => Datatype::Float,
      Self::Int(_) => Datatype::Int,
      Self::Date(_) => Datatype::Date,
      Self::Bool(_) => Datatype::Bool,
      Self::Object(_) => Datatype::Object,
      Self::Enum(_) => Datatype::Enum,
      Self::Json(_) => Datatype::Json,
      Self::Csv(_) => Datatype::Csv,
    }
  }

  /// Coerce a raw value into the payload for `datatype`.
  ///
  /// Callers run [`Datatype::validate`] first; a shape mismatch that slips
  /// through still fails here rather than storing garbage.
  pub fn from_raw(datatype: Datatype, raw: &Json) -> Result<Self> {
    let mismatch = || Error::InvalidValue {
      datatype,
      reason: format!("cannot coerce {raw}"),
    };

    Ok(match datatype {
      Datatype::Text => {
        Self::Text(raw.as_str().ok_or_else(mismatch)?.to_owned())
      }
      Datatype::Float => Self::Float(raw.as_f64().ok_or_else(mismatch)?),
      Datatype::Int => Self::Int(raw.as_i64().ok_or_else(mismatch)?),
      Datatype::Date => {
        let s = raw.as_str().ok_or_else(mismatch)?;
        Self::Date(parse_date(s).ok_or_else(mismatch)?)
      }
      Datatype::Bool => Self::Bool(raw.as_bool().ok_or_else(mismatch)?),
      Datatype::Object => Self::Object(serde_json::from_value(raw.clone())?),
      Datatype::Enum => {
        Self::Enum(enum_label(raw).ok_or_else(mismatch)?.to_owned())
      }
      Datatype::Json => Self::Json(raw.clone()),
      Datatype::Csv => match raw {
        Json::String(s) => {
          Self::Csv(s.split(',').map(|p| p.trim().to_owned()).collect())
        }
        Json::Array(items) => {
          let mut parts = Vec::with_capacity(items.len());
          for item in items {
            match item {
              Json::String(s) => parts.push(s.clone()),
              Json::Number(n) => parts.push(n.to_string()),
              Json::Bool(b) => parts.push(b.to_string()),
              _ => return Err(mismatch()),
            }
          }
          Self::Csv(parts)
        }
        _ => return Err(mismatch()),
      },
    })
  }

  /// The raw JSON form of the payload, symmetric with [`Self::from_raw`].
  pub fn to_raw(&self) -> Json {
    match self {
      Self::Text(s) => Json::from(s.clone()),
      Self::Float(f) => Json::from(*f),
      Self::Int(n) => Json::from(*n),
      Self::Date(d) => Json::from(d.format("%Y-%m-%d").to_string()),
      Self::Bool(b) => Json::from(*b),
      Self::Object(entity) => {
        serde_json::to_value(entity).unwrap_or(Json::Null)
      }
      Self::Enum(label) => Json::from(label.clone()),
      Self::Json(j) => j.clone(),
      Self::Csv(parts) => Json::from(parts.clone()),
    }
  }
}

/// The empty-write sentinel: `null` and the empty string both mean "no
/// value" and map to the delete branch of the upsert protocol.
pub fn is_empty_raw(raw: &Json) -> bool {
  raw.is_null() || raw.as_str() == Some("")
}

// ─── Value ───────────────────────────────────────────────────────────────────

/// One stored datum: "attribute A has this payload for host entity E".
///
/// At most one `Value` exists per `(attribute, entity)` identity, and a
/// `Value` never exists with an empty payload — the upsert protocol deletes
/// rows instead of nulling them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Value {
  pub value_id:     Uuid,
  pub attribute_id: Uuid,
  pub entity:       EntityRef,
  pub payload:      ValuePayload,
  pub created_at:   DateTime<Utc>,
  /// Untouched when a write carries a payload equal to the stored one.
  pub modified_at:  DateTime<Utc>,
}

// ─── Write outcome ───────────────────────────────────────────────────────────

/// What a single [`crate::store::EavStore::upsert_value`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
  /// No row existed and the write was empty.
  Noop,
  /// A new row was created.
  Created,
  /// The existing row's payload was replaced.
  Updated,
  /// The existing row already held an equal payload; nothing was written.
  Unchanged,
  /// The existing row was deleted by an empty write.
  Deleted,
}
