//! Host-record identity resolution.
//!
//! Trellis never owns host records; it indexes into them through a stable
//! `(type_tag, primary_key)` pair. Any host type that can produce that pair
//! participates by implementing [`Entity`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// The primary-key shapes a host record may be indexed by.
///
/// The shape decides which matching column a backend uses, so integer-keyed
/// and string-keyed hosts resolve to different identity fields and never
/// collide in the same column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyValue {
  Int(i64),
  Text(String),
}

impl fmt::Display for KeyValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Int(n) => write!(f, "{n}"),
      Self::Text(s) => write!(f, "{s}"),
    }
  }
}

/// A stable back-reference into a host record: type tag plus primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
  #[serde(rename = "type")]
  pub type_tag: String,
  #[serde(rename = "id")]
  pub pk:       KeyValue,
}

impl EntityRef {
  pub fn new(type_tag: impl Into<String>, pk: KeyValue) -> Self {
    Self { type_tag: type_tag.into(), pk }
  }

  /// Resolve the identity of a host record.
  pub fn of(entity: &(impl Entity + ?Sized)) -> Self {
    Self {
      type_tag: entity.type_tag().to_owned(),
      pk:       entity.primary_key(),
    }
  }
}

impl fmt::Display for EntityRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.type_tag, self.pk)
  }
}

/// The only capability trellis requires from a host record type.
pub trait Entity {
  /// A stable discriminator for the host type (e.g. a table name).
  fn type_tag(&self) -> &str;

  /// The record's primary key.
  fn primary_key(&self) -> KeyValue;
}

impl Entity for EntityRef {
  fn type_tag(&self) -> &str { &self.type_tag }

  fn primary_key(&self) -> KeyValue { self.pk.clone() }
}
