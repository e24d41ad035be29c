//! Attribute — the **A** in EAV.
//!
//! An attribute is a typed, named, slug-identified definition of a dynamic
//! field: color, height, number of patients, has fever?. It owns validation
//! dispatch (one validator per datatype, plus the choice-group membership
//! check for enum attributes) and the entry point of the value write
//! protocol, [`Attribute::save_value`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

use crate::{
  Error, Result,
  datatype::Datatype,
  entity::{Entity, EntityRef},
  enums::{EnumGroup, EnumValue},
  slug::slugify,
  store::EavStore,
  validators::enum_label,
  value::{ValuePayload, WriteOutcome, is_empty_raw},
};

/// A typed, admin-defined field that host records may carry a value for.
///
/// `slug` is the stable identity; left blank it is derived from `name` by
/// [`Attribute::finalized`] before the first persist. `enum_group` is set
/// iff `datatype` is [`Datatype::Enum`] — [`Attribute::clean`] rejects every
/// other combination.
///
/// Once any stored value references an attribute, its datatype is locked;
/// backends reject the change on save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attribute {
  pub attribute_id:  Uuid,
  /// User-friendly display name.
  pub name:          String,
  /// Short unique label; empty means "derive from `name` on save".
  pub slug:          String,
  pub datatype:      Datatype,
  /// Entities this attribute applies to are expected to carry a value for
  /// it. Advisory for form layers; the core never enforces presence.
  pub required:      bool,
  pub description:   Option<String>,
  pub display_order: u32,
  pub enum_group:    Option<EnumGroup>,
  /// Host type tags this attribute applies to; empty means all types.
  pub entity_types:  Vec<String>,
  pub created:       DateTime<Utc>,
  /// Maintained by the store on every persist.
  pub modified:      DateTime<Utc>,
}

impl Attribute {
  /// A new attribute with defaults; the slug is derived on save.
  pub fn new(name: impl Into<String>, datatype: Datatype) -> Self {
    let now = Utc::now();
    Self {
      attribute_id: Uuid::new_v4(),
      name: name.into(),
      slug: String::new(),
      datatype,
      required: false,
      description: None,
      display_order: 1,
      enum_group: None,
      entity_types: Vec::new(),
      created: now,
      modified: now,
    }
  }

  pub fn with_enum_group(mut self, group: EnumGroup) -> Self {
    self.enum_group = Some(group);
    self
  }

  pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
    self.slug = slug.into();
    self
  }

  /// `"{name} ({datatype label})"`, e.g. `"has fever? (Multiple Choice)"`.
  pub fn display_name(&self) -> String {
    format!("{} ({})", self.name, self.datatype.label())
  }

  /// Whether this attribute applies to hosts with the given type tag.
  pub fn applies_to(&self, type_tag: &str) -> bool {
    self.entity_types.is_empty()
      || self.entity_types.iter().any(|t| t == type_tag)
  }

  /// Check `raw` against the validator for this attribute's datatype, and
  /// — for enum attributes only — require the label (bare string or
  /// enum-value reference) to be a member of the choice group.
  ///
  /// Fails fast with the first violation; no coercion, no partial
  /// validation.
  pub fn validate_value(&self, raw: &Json) -> Result<()> {
    self.datatype.validate(raw)?;

    if self.datatype == Datatype::Enum {
      let group = self.enum_group.as_ref().ok_or(Error::EnumGroupMissing)?;
      // validate() guaranteed a label is present.
      let label = enum_label(raw).unwrap_or_default();
      if !group.contains(label) {
        return Err(Error::InvalidChoice {
          value:     label.to_owned(),
          attribute: self.display_name(),
        });
      }
    }

    Ok(())
  }

  /// The member set of the choice group for enum attributes.
  ///
  /// `None` for non-enum attributes — distinct from `Some(&[])`, an enum
  /// attribute whose group has no choices yet.
  pub fn get_choices(&self) -> Option<&[EnumValue]> {
    if self.datatype != Datatype::Enum {
      return None;
    }
    Some(self.enum_group.as_ref().map(|g| g.values.as_slice()).unwrap_or(&[]))
  }

  /// The choice-group invariant: a group is required for enum attributes
  /// and forbidden for every other datatype.
  pub fn clean(&self) -> Result<()> {
    match (self.datatype, &self.enum_group) {
      (Datatype::Enum, None) => Err(Error::EnumGroupMissing),
      (datatype, Some(_)) if datatype != Datatype::Enum => {
        Err(Error::EnumGroupForbidden)
      }
      _ => Ok(()),
    }
  }

  /// The pre-save step backends run before every persist: derive the slug
  /// from `name` when blank, then run [`Attribute::clean`].
  ///
  /// Slug derivation is deterministic; a collision with another attribute
  /// is left to the store's unique constraint and surfaces as the backend's
  /// slug-conflict error.
  pub fn finalized(&self) -> Result<Self> {
    let mut attr = self.clone();
    if attr.slug.is_empty() {
      attr.slug = slugify(&attr.name);
      if attr.slug.is_empty() {
        return Err(Error::SlugEmpty(attr.name.clone()));
      }
    }
    attr.clean()?;
    Ok(attr)
  }

  /// Validate `raw` and write it for `entity` through `store`.
  ///
  /// `null` and `""` are the empty sentinel: they delete any existing value
  /// instead of materialising an empty row. Everything else is validated,
  /// coerced into the typed payload for this attribute's datatype, and
  /// handed to [`EavStore::upsert_value`].
  pub async fn save_value<S, E>(
    &self,
    store: &S,
    entity: &E,
    raw: Json,
  ) -> Result<WriteOutcome, S::Error>
  where
    S: EavStore,
    E: Entity + ?Sized,
  {
    let entity_ref = EntityRef::of(entity);

    let payload = if is_empty_raw(&raw) {
      None
    } else {
      self.validate_value(&raw).map_err(S::Error::from)?;
      Some(ValuePayload::from_raw(self.datatype, &raw).map_err(S::Error::from)?)
    };

    store.upsert_value(self, &entity_ref, payload).await
  }

  /// Read the stored value for `entity`, if any.
  pub async fn get_value<S, E>(
    &self,
    store: &S,
    entity: &E,
  ) -> Result<Option<crate::value::Value>, S::Error>
  where
    S: EavStore,
    E: Entity + ?Sized,
  {
    let entity_ref = EntityRef::of(entity);
    store.get_value(self, &entity_ref).await
  }
}
