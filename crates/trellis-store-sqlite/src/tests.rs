//! Integration tests for `SqliteStore` against an in-memory database.

use serde_json::json;
use trellis_core::{
  attribute::Attribute,
  datatype::Datatype,
  entity::{Entity, EntityRef, KeyValue},
  store::EavStore,
  value::{ValuePayload, WriteOutcome},
};

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

/// An integer-keyed host record.
struct Patient {
  id: i64,
}

impl Entity for Patient {
  fn type_tag(&self) -> &str { "patient" }

  fn primary_key(&self) -> KeyValue { KeyValue::Int(self.id) }
}

/// A string-keyed host record.
struct Device {
  serial: String,
}

impl Entity for Device {
  fn type_tag(&self) -> &str { "device" }

  fn primary_key(&self) -> KeyValue { KeyValue::Text(self.serial.clone()) }
}

async fn fever_attribute(s: &SqliteStore) -> Attribute {
  let group = s
    .save_enum_group("Yes / No / Unknown", &["yes", "no", "unknown"])
    .await
    .unwrap();
  s.save_attribute(
    Attribute::new("has fever?", Datatype::Enum).with_enum_group(group),
  )
  .await
  .unwrap()
}

// ─── Attribute persistence ───────────────────────────────────────────────────

#[tokio::test]
async fn save_attribute_derives_slug() {
  let s = store().await;

  let saved = s
    .save_attribute(Attribute::new("Eye Color", Datatype::Text))
    .await
    .unwrap();
  assert_eq!(saved.slug, "eye_color");

  let fetched = s.get_attribute("eye_color").await.unwrap().unwrap();
  assert_eq!(fetched.attribute_id, saved.attribute_id);
  assert_eq!(fetched.name, "Eye Color");
  assert_eq!(fetched.datatype, Datatype::Text);
}

#[tokio::test]
async fn slug_collision_is_a_distinct_error() {
  let s = store().await;

  s.save_attribute(Attribute::new("Eye Color", Datatype::Text))
    .await
    .unwrap();

  // A different name that slugifies to the same candidate.
  let err = s
    .save_attribute(Attribute::new("Eye-Color!", Datatype::Text))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::SlugConflict(ref slug) if slug == "eye_color"));
}

#[tokio::test]
async fn choice_group_invariant_is_checked_on_save() {
  let s = store().await;

  let err = s
    .save_attribute(Attribute::new("mood", Datatype::Enum))
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    Error::Core(trellis_core::Error::EnumGroupMissing)
  ));

  let group = s.save_enum_group("moods", &["happy", "sad"]).await.unwrap();
  let err = s
    .save_attribute(
      Attribute::new("Color", Datatype::Text).with_enum_group(group.clone()),
    )
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    Error::Core(trellis_core::Error::EnumGroupForbidden)
  ));

  // The two valid combinations go through.
  s.save_attribute(Attribute::new("mood", Datatype::Enum).with_enum_group(group))
    .await
    .unwrap();
  s.save_attribute(Attribute::new("Color", Datatype::Text))
    .await
    .unwrap();
}

#[tokio::test]
async fn save_attribute_updates_in_place() {
  let s = store().await;

  let mut attr = s
    .save_attribute(Attribute::new("Height", Datatype::Int))
    .await
    .unwrap();

  attr.description = Some("in centimetres".into());
  attr.display_order = 3;
  s.save_attribute(attr.clone()).await.unwrap();

  let all = s.list_attributes(None).await.unwrap();
  assert_eq!(all.len(), 1);
  assert_eq!(all[0].description.as_deref(), Some("in centimetres"));
  assert_eq!(all[0].display_order, 3);
}

#[tokio::test]
async fn datatype_is_locked_once_values_exist() {
  let s = store().await;
  let patient = Patient { id: 1 };

  let attr = s
    .save_attribute(Attribute::new("Height", Datatype::Int))
    .await
    .unwrap();

  // No values yet: the datatype may still change.
  let mut retyped = attr.clone();
  retyped.datatype = Datatype::Float;
  s.save_attribute(retyped).await.unwrap();

  let mut attr = s.get_attribute("height").await.unwrap().unwrap();
  attr.save_value(&s, &patient, json!(1.78)).await.unwrap();

  attr.datatype = Datatype::Text;
  let err = s.save_attribute(attr).await.unwrap_err();
  assert!(matches!(
    err,
    Error::Core(trellis_core::Error::DatatypeLocked(ref slug)) if slug == "height"
  ));
}

#[tokio::test]
async fn list_attributes_filters_by_entity_type() {
  let s = store().await;

  let mut for_patients = Attribute::new("Blood Type", Datatype::Text);
  for_patients.entity_types = vec!["patient".into()];
  s.save_attribute(for_patients).await.unwrap();

  // No restriction: applies everywhere.
  s.save_attribute(Attribute::new("Notes", Datatype::Text))
    .await
    .unwrap();

  let for_patient = s.list_attributes(Some("patient")).await.unwrap();
  assert_eq!(for_patient.len(), 2);

  let for_device = s.list_attributes(Some("device")).await.unwrap();
  assert_eq!(for_device.len(), 1);
  assert_eq!(for_device[0].slug, "notes");

  let all = s.list_attributes(None).await.unwrap();
  assert_eq!(all.len(), 2);
}

// ─── Value upsert protocol ───────────────────────────────────────────────────

#[tokio::test]
async fn height_scenario() {
  let s = store().await;
  let patient = Patient { id: 1 };

  let attr = s
    .save_attribute(Attribute::new("Height", Datatype::Int))
    .await
    .unwrap();

  // First write creates the row.
  let outcome = attr.save_value(&s, &patient, json!(178)).await.unwrap();
  assert_eq!(outcome, WriteOutcome::Created);
  let value = attr.get_value(&s, &patient).await.unwrap().unwrap();
  assert_eq!(value.payload, ValuePayload::Int(178));

  // Same payload again: no mutation.
  let outcome = attr.save_value(&s, &patient, json!(178)).await.unwrap();
  assert_eq!(outcome, WriteOutcome::Unchanged);

  // Empty write deletes.
  let outcome = attr.save_value(&s, &patient, json!(null)).await.unwrap();
  assert_eq!(outcome, WriteOutcome::Deleted);
  assert!(attr.get_value(&s, &patient).await.unwrap().is_none());

  // Writing again recreates with the new payload.
  let outcome = attr.save_value(&s, &patient, json!(180)).await.unwrap();
  assert_eq!(outcome, WriteOutcome::Created);
  let value = attr.get_value(&s, &patient).await.unwrap().unwrap();
  assert_eq!(value.payload, ValuePayload::Int(180));
}

#[tokio::test]
async fn idempotent_write_leaves_timestamps_alone() {
  let s = store().await;
  let patient = Patient { id: 2 };

  let attr = s
    .save_attribute(Attribute::new("Height", Datatype::Int))
    .await
    .unwrap();

  attr.save_value(&s, &patient, json!(178)).await.unwrap();
  let before = attr.get_value(&s, &patient).await.unwrap().unwrap();

  attr.save_value(&s, &patient, json!(178)).await.unwrap();
  let after = attr.get_value(&s, &patient).await.unwrap().unwrap();

  assert_eq!(after.value_id, before.value_id);
  assert_eq!(after.modified_at, before.modified_at);

  // A real change keeps the row but touches modified_at only.
  let outcome = attr.save_value(&s, &patient, json!(180)).await.unwrap();
  assert_eq!(outcome, WriteOutcome::Updated);
  let changed = attr.get_value(&s, &patient).await.unwrap().unwrap();
  assert_eq!(changed.value_id, before.value_id);
  assert_eq!(changed.created_at, before.created_at);
  assert_ne!(changed.modified_at, before.modified_at);
}

#[tokio::test]
async fn empty_write_on_absent_row_is_a_noop() {
  let s = store().await;
  let patient = Patient { id: 3 };

  let attr = s
    .save_attribute(Attribute::new("Height", Datatype::Int))
    .await
    .unwrap();

  let outcome = attr.save_value(&s, &patient, json!(null)).await.unwrap();
  assert_eq!(outcome, WriteOutcome::Noop);
  assert!(attr.get_value(&s, &patient).await.unwrap().is_none());
}

#[tokio::test]
async fn empty_string_is_the_same_sentinel_as_null() {
  let s = store().await;
  let patient = Patient { id: 4 };

  let attr = s
    .save_attribute(Attribute::new("Nickname", Datatype::Text))
    .await
    .unwrap();

  attr.save_value(&s, &patient, json!("Lou")).await.unwrap();
  let outcome = attr.save_value(&s, &patient, json!("")).await.unwrap();
  assert_eq!(outcome, WriteOutcome::Deleted);
  assert!(attr.get_value(&s, &patient).await.unwrap().is_none());
}

#[tokio::test]
async fn at_most_one_row_per_identity() {
  let s = store().await;
  let patient = Patient { id: 5 };

  let attr = s
    .save_attribute(Attribute::new("Nickname", Datatype::Text))
    .await
    .unwrap();

  for raw in [json!("a"), json!("b"), json!(null), json!("c"), json!("c")] {
    attr.save_value(&s, &patient, raw).await.unwrap();
  }

  let values = s.list_values(&EntityRef::of(&patient)).await.unwrap();
  assert_eq!(values.len(), 1);
  assert_eq!(values[0].payload, ValuePayload::Text("c".into()));
}

#[tokio::test]
async fn key_shapes_resolve_to_distinct_identities() {
  let s = store().await;

  let attr = s
    .save_attribute(Attribute::new("Owner", Datatype::Text))
    .await
    .unwrap();

  // Same attribute, same type tag, "same" key — but different shapes.
  let int_host = EntityRef::new("host", KeyValue::Int(7));
  let text_host = EntityRef::new("host", KeyValue::Text("7".into()));

  attr.save_value(&s, &int_host, json!("alice")).await.unwrap();
  attr.save_value(&s, &text_host, json!("bob")).await.unwrap();

  let int_value = attr.get_value(&s, &int_host).await.unwrap().unwrap();
  let text_value = attr.get_value(&s, &text_host).await.unwrap().unwrap();
  assert_eq!(int_value.payload, ValuePayload::Text("alice".into()));
  assert_eq!(text_value.payload, ValuePayload::Text("bob".into()));
}

#[tokio::test]
async fn string_keyed_hosts_round_trip() {
  let s = store().await;
  let device = Device { serial: "dev-42".into() };

  let attr = s
    .save_attribute(Attribute::new("Firmware", Datatype::Text))
    .await
    .unwrap();

  attr.save_value(&s, &device, json!("1.2.3")).await.unwrap();

  let value = attr.get_value(&s, &device).await.unwrap().unwrap();
  assert_eq!(value.entity.type_tag, "device");
  assert_eq!(value.entity.pk, KeyValue::Text("dev-42".into()));
  assert_eq!(value.payload, ValuePayload::Text("1.2.3".into()));
}

#[tokio::test]
async fn list_values_collects_all_attributes_of_an_entity() {
  let s = store().await;
  let patient = Patient { id: 6 };

  let height = s
    .save_attribute(Attribute::new("Height", Datatype::Int))
    .await
    .unwrap();
  let weight = s
    .save_attribute(Attribute::new("Weight", Datatype::Float))
    .await
    .unwrap();

  height.save_value(&s, &patient, json!(178)).await.unwrap();
  weight.save_value(&s, &patient, json!(72.5)).await.unwrap();

  let values = s.list_values(&EntityRef::of(&patient)).await.unwrap();
  assert_eq!(values.len(), 2);
  assert!(values.iter().any(|v| v.payload == ValuePayload::Int(178)));
  assert!(
    values
      .iter()
      .any(|v| v.payload == ValuePayload::Float(72.5))
  );
}

// ─── Datatype round-trips ────────────────────────────────────────────────────

#[tokio::test]
async fn every_datatype_round_trips_through_the_store() {
  let s = store().await;
  let patient = Patient { id: 7 };

  let cases: Vec<(&str, Datatype, serde_json::Value, ValuePayload)> = vec![
    ("t", Datatype::Text, json!("blue"), ValuePayload::Text("blue".into())),
    ("f", Datatype::Float, json!(1.75), ValuePayload::Float(1.75)),
    ("i", Datatype::Int, json!(-3), ValuePayload::Int(-3)),
    (
      "d",
      Datatype::Date,
      json!("2024-02-29"),
      ValuePayload::Date("2024-02-29".parse().unwrap()),
    ),
    ("b", Datatype::Bool, json!(true), ValuePayload::Bool(true)),
    (
      "o",
      Datatype::Object,
      json!({"type": "patient", "id": 99}),
      ValuePayload::Object(EntityRef::new("patient", KeyValue::Int(99))),
    ),
    (
      "j",
      Datatype::Json,
      json!({"nested": [1, 2, 3]}),
      ValuePayload::Json(json!({"nested": [1, 2, 3]})),
    ),
    (
      "c",
      Datatype::Csv,
      json!(["a", "b", "c"]),
      ValuePayload::Csv(vec!["a".into(), "b".into(), "c".into()]),
    ),
  ];

  for (name, datatype, raw, expected) in cases {
    let attr = s
      .save_attribute(Attribute::new(name, datatype))
      .await
      .unwrap();
    attr.save_value(&s, &patient, raw).await.unwrap();

    let value = attr.get_value(&s, &patient).await.unwrap().unwrap();
    assert_eq!(value.payload, expected, "datatype {datatype}");
  }
}

// ─── Enum attributes ─────────────────────────────────────────────────────────

#[tokio::test]
async fn fever_scenario() {
  let s = store().await;
  let patient = Patient { id: 8 };
  let attr = fever_attribute(&s).await;

  // Validation rejects non-members before anything touches the store.
  let err = attr.validate_value(&json!("maybe")).unwrap_err();
  assert!(matches!(
    err,
    trellis_core::Error::InvalidChoice { ref value, .. } if value == "maybe"
  ));
  assert!(attr.validate_value(&json!("yes")).is_ok());

  let outcome = attr.save_value(&s, &patient, json!("yes")).await.unwrap();
  assert_eq!(outcome, WriteOutcome::Created);

  let value = attr.get_value(&s, &patient).await.unwrap().unwrap();
  assert_eq!(value.payload, ValuePayload::Enum("yes".into()));

  // The write path runs the same validation.
  let err = attr
    .save_value(&s, &patient, json!("maybe"))
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    Error::Core(trellis_core::Error::InvalidChoice { .. })
  ));
}

#[tokio::test]
async fn get_attribute_loads_the_choice_group() {
  let s = store().await;
  fever_attribute(&s).await;

  let attr = s.get_attribute("has_fever").await.unwrap().unwrap();
  let choices = attr.get_choices().expect("enum attribute has choices");
  assert_eq!(choices.len(), 3);
  assert!(attr.enum_group.as_ref().unwrap().contains("unknown"));
}

#[tokio::test]
async fn enum_labels_are_shared_between_groups() {
  let s = store().await;

  let ynu = s
    .save_enum_group("Yes / No / Unknown", &["yes", "no", "unknown"])
    .await
    .unwrap();
  let yn = s.save_enum_group("Yes / No", &["yes", "no"]).await.unwrap();

  let shared_yes = ynu.value_by_label("yes").unwrap();
  assert_eq!(shared_yes.value_id, yn.value_by_label("yes").unwrap().value_id);
}

#[tokio::test]
async fn save_enum_group_replaces_the_member_set() {
  let s = store().await;

  s.save_enum_group("moods", &["happy", "sad"]).await.unwrap();
  let replaced = s.save_enum_group("moods", &["happy"]).await.unwrap();

  assert_eq!(replaced.values.len(), 1);
  assert!(replaced.contains("happy"));
  assert!(!replaced.contains("sad"));

  let fetched = s.get_enum_group("moods").await.unwrap().unwrap();
  assert_eq!(fetched.group_id, replaced.group_id);
  assert_eq!(fetched.values.len(), 1);
}

// ─── Restricted deletes ──────────────────────────────────────────────────────

#[tokio::test]
async fn delete_attribute_is_restricted_while_values_exist() {
  let s = store().await;
  let patient = Patient { id: 9 };

  let attr = s
    .save_attribute(Attribute::new("Height", Datatype::Int))
    .await
    .unwrap();
  attr.save_value(&s, &patient, json!(178)).await.unwrap();

  let err = s.delete_attribute("height").await.unwrap_err();
  assert!(matches!(err, Error::AttributeInUse(ref slug) if slug == "height"));

  // Clearing the value unblocks the delete.
  attr.save_value(&s, &patient, json!(null)).await.unwrap();
  s.delete_attribute("height").await.unwrap();
  assert!(s.get_attribute("height").await.unwrap().is_none());
}

#[tokio::test]
async fn delete_missing_attribute_errors() {
  let s = store().await;
  let err = s.delete_attribute("no_such").await.unwrap_err();
  assert!(matches!(err, Error::AttributeNotFound(_)));
}

#[tokio::test]
async fn delete_enum_value_is_restricted_while_referenced() {
  let s = store().await;

  s.save_enum_group("moods", &["happy", "sad"]).await.unwrap();

  let err = s.delete_enum_value("happy").await.unwrap_err();
  assert!(matches!(err, Error::EnumValueInUse(ref label) if label == "happy"));

  // Dropping "sad" from the group leaves it unreferenced and deletable.
  s.save_enum_group("moods", &["happy"]).await.unwrap();
  s.delete_enum_value("sad").await.unwrap();

  let err = s.delete_enum_value("sad").await.unwrap_err();
  assert!(matches!(err, Error::EnumValueNotFound(_)));
}
