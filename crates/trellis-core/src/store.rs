//! The `EavStore` trait and its contract.
//!
//! The trait is implemented by storage backends (e.g.
//! `trellis-store-sqlite`). Higher layers depend on this abstraction, not on
//! any concrete backend. Backends own atomicity: every method is one
//! logical transaction.

use std::future::Future;

use crate::{
  attribute::Attribute,
  entity::EntityRef,
  enums::EnumGroup,
  value::{Value, ValuePayload, WriteOutcome},
};

/// Abstraction over a trellis storage backend.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait EavStore: Send + Sync {
  type Error: std::error::Error
    + From<crate::Error>
    + Send
    + Sync
    + 'static;

  // ── Attributes ────────────────────────────────────────────────────────

  /// Finalize (slug derivation plus invariant check, see
  /// [`Attribute::finalized`]) and persist `attribute`, inserting or
  /// updating by `attribute_id`.
  ///
  /// Returns the persisted copy. A slug collision with another attribute is
  /// a distinct, catchable error, not a silent rename. The update path must
  /// reject a datatype change while stored values reference the attribute.
  fn save_attribute(
    &self,
    attribute: Attribute,
  ) -> impl Future<Output = Result<Attribute, Self::Error>> + Send + '_;

  /// Retrieve an attribute by slug, with its choice group (if any) loaded.
  fn get_attribute<'a>(
    &'a self,
    slug: &'a str,
  ) -> impl Future<Output = Result<Option<Attribute>, Self::Error>> + Send + 'a;

  /// List attributes ordered by name, restricted to those that apply to
  /// `entity_type` when given.
  fn list_attributes<'a>(
    &'a self,
    entity_type: Option<&'a str>,
  ) -> impl Future<Output = Result<Vec<Attribute>, Self::Error>> + Send + 'a;

  /// Delete an attribute. Fails while stored values reference it; the
  /// caller removes the values first, deletion never cascades.
  fn delete_attribute<'a>(
    &'a self,
    slug: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Enum groups ───────────────────────────────────────────────────────

  /// Create the group named `name`, or replace its member set if it already
  /// exists. Labels are get-or-created globally and may be shared between
  /// groups.
  fn save_enum_group<'a>(
    &'a self,
    name: &'a str,
    labels: &'a [&'a str],
  ) -> impl Future<Output = Result<EnumGroup, Self::Error>> + Send + 'a;

  fn get_enum_group<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<Option<EnumGroup>, Self::Error>> + Send + 'a;

  /// Delete a choice label. Fails while a group or a stored value
  /// references it.
  fn delete_enum_value<'a>(
    &'a self,
    label: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Values ────────────────────────────────────────────────────────────

  /// Write `payload` for the `(attribute, entity)` identity:
  ///
  /// - no row, empty payload — nothing happens;
  /// - no row, payload — a row is created;
  /// - row exists, empty payload — the row is deleted;
  /// - row exists, equal payload — nothing is written, timestamps untouched;
  /// - row exists, different payload — the row is updated in place.
  ///
  /// Afterwards at most one row exists for the identity, and its payload
  /// equals `payload` whenever `payload` is non-empty. The lookup-then-act
  /// sequence runs as one transaction; a lost insert race against a
  /// concurrent call surfaces as the backend's identity-conflict error, and
  /// callers retry the whole call (which then takes the update branch).
  fn upsert_value<'a>(
    &'a self,
    attribute: &'a Attribute,
    entity: &'a EntityRef,
    payload: Option<ValuePayload>,
  ) -> impl Future<Output = Result<WriteOutcome, Self::Error>> + Send + 'a;

  /// Read the value for one `(attribute, entity)` identity.
  fn get_value<'a>(
    &'a self,
    attribute: &'a Attribute,
    entity: &'a EntityRef,
  ) -> impl Future<Output = Result<Option<Value>, Self::Error>> + Send + 'a;

  /// All stored values for one entity, across attributes.
  fn list_values<'a>(
    &'a self,
    entity: &'a EntityRef,
  ) -> impl Future<Output = Result<Vec<Value>, Self::Error>> + Send + 'a;
}
