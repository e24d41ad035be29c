//! Encoding and decoding helpers between core domain types and the
//! plain-text representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, calendar dates are `YYYY-MM-DD`, UUIDs
//! are hyphenated lowercase strings, list columns (entity_types, csv) are
//! compact JSON arrays, and an object reference's key is JSON-encoded so
//! integer and string keys stay distinguishable.

use std::str::FromStr as _;

use chrono::{DateTime, NaiveDate, Utc};
use trellis_core::{
  datatype::Datatype,
  entity::{EntityRef, KeyValue},
  enums::{EnumGroup, EnumValue},
  value::{Value, ValuePayload},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── Timestamps & dates ──────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_date(d: NaiveDate) -> String {
  d.format("%Y-%m-%d").to_string()
}

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Datatype ────────────────────────────────────────────────────────────────

pub fn encode_datatype(dt: Datatype) -> String { dt.to_string() }

pub fn decode_datatype(s: &str) -> Result<Datatype> {
  Datatype::from_str(s).map_err(|_| Error::UnknownDatatype(s.to_owned()))
}

// ─── String lists ────────────────────────────────────────────────────────────

pub fn encode_string_list(items: &[String]) -> Result<String> {
  Ok(serde_json::to_string(items)?)
}

pub fn decode_string_list(s: &str) -> Result<Vec<String>> {
  Ok(serde_json::from_str(s)?)
}

// ─── Entity keys ─────────────────────────────────────────────────────────────

/// Split a key into the two identity columns; exactly one is `Some`.
pub fn encode_key(key: &KeyValue) -> (Option<i64>, Option<String>) {
  match key {
    KeyValue::Int(n) => (Some(*n), None),
    KeyValue::Text(s) => (None, Some(s.clone())),
  }
}

/// An object slot's key, JSON-encoded (`17` vs `"p-17"`).
pub fn encode_object_key(key: &KeyValue) -> Result<String> {
  Ok(serde_json::to_string(key)?)
}

pub fn decode_object_key(s: &str) -> Result<KeyValue> {
  Ok(serde_json::from_str(s)?)
}

// ─── Payload slots ───────────────────────────────────────────────────────────

/// The per-datatype column values for one payload. All slots of the other
/// datatypes stay `None` (NULL). Equality over encoded slots is what the
/// upsert protocol's unchanged check compares.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Slots {
  pub text:        Option<String>,
  pub float:       Option<f64>,
  pub int:         Option<i64>,
  pub date:        Option<String>,
  pub boolean:     Option<bool>,
  pub object_type: Option<String>,
  pub object_key:  Option<String>,
  /// The choice label; resolved to an `enum_values` id at write time.
  pub enum_label:  Option<String>,
  pub json:        Option<String>,
  pub csv:         Option<String>,
}

impl Slots {
  pub fn from_payload(payload: &ValuePayload) -> Result<Self> {
    let mut slots = Self::default();
    match payload {
      ValuePayload::Text(s) => slots.text = Some(s.clone()),
      ValuePayload::Float(f) => slots.float = Some(*f),
      ValuePayload::Int(n) => slots.int = Some(*n),
      ValuePayload::Date(d) => slots.date = Some(encode_date(*d)),
      ValuePayload::Bool(b) => slots.boolean = Some(*b),
      ValuePayload::Object(entity) => {
        slots.object_type = Some(entity.type_tag.clone());
        slots.object_key = Some(encode_object_key(&entity.pk)?);
      }
      ValuePayload::Enum(label) => slots.enum_label = Some(label.clone()),
      ValuePayload::Json(j) => slots.json = Some(serde_json::to_string(j)?),
      ValuePayload::Csv(parts) => slots.csv = Some(encode_string_list(parts)?),
    }
    Ok(slots)
  }

  /// Read the ten slot columns starting at column `base` of a row laid out
  /// as `value_text, value_float, value_int, value_date, value_bool,
  /// value_object_type, value_object_id, <enum label>, value_json,
  /// value_csv`.
  pub fn from_row(row: &rusqlite::Row<'_>, base: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      text:        row.get(base)?,
      float:       row.get(base + 1)?,
      int:         row.get(base + 2)?,
      date:        row.get(base + 3)?,
      boolean:     row.get(base + 4)?,
      object_type: row.get(base + 5)?,
      object_key:  row.get(base + 6)?,
      enum_label:  row.get(base + 7)?,
      json:        row.get(base + 8)?,
      csv:         row.get(base + 9)?,
    })
  }

  /// Rebuild the typed payload from the slot selected by `datatype`.
  pub fn into_payload(
    self,
    datatype: Datatype,
    value_id: &str,
  ) -> Result<ValuePayload> {
    let corrupt = |reason: &str| Error::CorruptRow {
      value_id: value_id.to_owned(),
      reason:   reason.to_owned(),
    };

    Ok(match datatype {
      Datatype::Text => {
        ValuePayload::Text(self.text.ok_or_else(|| corrupt("empty text slot"))?)
      }
      Datatype::Float => ValuePayload::Float(
        self.float.ok_or_else(|| corrupt("empty float slot"))?,
      ),
      Datatype::Int => {
        ValuePayload::Int(self.int.ok_or_else(|| corrupt("empty int slot"))?)
      }
      Datatype::Date => ValuePayload::Date(decode_date(
        &self.date.ok_or_else(|| corrupt("empty date slot"))?,
      )?),
      Datatype::Bool => ValuePayload::Bool(
        self.boolean.ok_or_else(|| corrupt("empty bool slot"))?,
      ),
      Datatype::Object => {
        let type_tag =
          self.object_type.ok_or_else(|| corrupt("empty object slot"))?;
        let key = decode_object_key(
          &self.object_key.ok_or_else(|| corrupt("empty object key"))?,
        )?;
        ValuePayload::Object(EntityRef::new(type_tag, key))
      }
      Datatype::Enum => ValuePayload::Enum(
        self.enum_label.ok_or_else(|| corrupt("empty enum slot"))?,
      ),
      Datatype::Json => ValuePayload::Json(serde_json::from_str(
        &self.json.ok_or_else(|| corrupt("empty json slot"))?,
      )?),
      Datatype::Csv => ValuePayload::Csv(decode_string_list(
        &self.csv.ok_or_else(|| corrupt("empty csv slot"))?,
      )?),
    })
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from an `attributes` row.
pub struct RawAttribute {
  pub attribute_id:  String,
  pub name:          String,
  pub slug:          String,
  pub datatype:      String,
  pub required:      bool,
  pub description:   Option<String>,
  pub display_order: i64,
  pub enum_group_id: Option<String>,
  pub entity_types:  String,
  pub created:       String,
  pub modified:      String,
}

impl RawAttribute {
  pub fn into_attribute(
    self,
    enum_group: Option<EnumGroup>,
  ) -> Result<trellis_core::attribute::Attribute> {
    Ok(trellis_core::attribute::Attribute {
      attribute_id: decode_uuid(&self.attribute_id)?,
      name: self.name,
      slug: self.slug,
      datatype: decode_datatype(&self.datatype)?,
      required: self.required,
      description: self.description,
      display_order: self.display_order as u32,
      enum_group,
      entity_types: decode_string_list(&self.entity_types)?,
      created: decode_dt(&self.created)?,
      modified: decode_dt(&self.modified)?,
    })
  }
}

/// Raw strings for an `enum_groups` row plus its member labels.
pub struct RawEnumGroup {
  pub group_id: String,
  pub name:     String,
  /// `(value_id, value)` pairs.
  pub values:   Vec<(String, String)>,
}

impl RawEnumGroup {
  pub fn into_group(self) -> Result<EnumGroup> {
    let values = self
      .values
      .into_iter()
      .map(|(id, value)| {
        Ok(EnumValue { value_id: decode_uuid(&id)?, value })
      })
      .collect::<Result<Vec<_>>>()?;

    Ok(EnumGroup {
      group_id: decode_uuid(&self.group_id)?,
      name: self.name,
      values,
    })
  }
}

/// Raw columns for one `eav_values` row joined with its attribute's
/// datatype and (for enum slots) the choice label.
pub struct RawValue {
  pub value_id:     String,
  pub attribute_id: String,
  pub datatype:     String,
  pub slots:        Slots,
  pub created_at:   String,
  pub modified_at:  String,
}

impl RawValue {
  /// Column layout shared by the value SELECTs:
  /// `value_id, attribute_id, datatype, <ten slot columns>, created_at,
  /// modified_at`.
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      value_id:     row.get(0)?,
      attribute_id: row.get(1)?,
      datatype:     row.get(2)?,
      slots:        Slots::from_row(row, 3)?,
      created_at:   row.get(13)?,
      modified_at:  row.get(14)?,
    })
  }

  pub fn into_value(self, entity: EntityRef) -> Result<Value> {
    let datatype = decode_datatype(&self.datatype)?;
    let payload = self.slots.into_payload(datatype, &self.value_id)?;

    Ok(Value {
      value_id: decode_uuid(&self.value_id)?,
      attribute_id: decode_uuid(&self.attribute_id)?,
      entity,
      payload,
      created_at: decode_dt(&self.created_at)?,
      modified_at: decode_dt(&self.modified_at)?,
    })
  }
}
