//! [`SqliteStore`] — the SQLite implementation of [`EavStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use trellis_core::{
  attribute::Attribute,
  entity::{EntityRef, KeyValue},
  enums::EnumGroup,
  store::EavStore,
  value::{Value, ValuePayload, WriteOutcome},
};

use crate::{
  Error, Result,
  encode::{
    RawAttribute, RawEnumGroup, RawValue, Slots, encode_datatype, encode_dt,
    encode_key, encode_string_list, encode_uuid,
  },
  error::is_unique_violation,
  schema::SCHEMA,
};

// ─── Closure outcomes ────────────────────────────────────────────────────────
// Domain branching happens inside the transaction closures; these enums carry
// the branch taken back out, where it is mapped onto the error taxonomy.

enum AttrWrite {
  Saved,
  /// Datatype change attempted while stored values reference the attribute.
  Locked,
}

enum RestrictedDelete {
  Missing,
  InUse,
  Deleted,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A trellis store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    tracing::info!("trellis schema initialised");
    Ok(())
  }
}

// ─── Row helpers ─────────────────────────────────────────────────────────────

fn read_raw_attribute(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawAttribute> {
  Ok(RawAttribute {
    attribute_id:  row.get(0)?,
    name:          row.get(1)?,
    slug:          row.get(2)?,
    datatype:      row.get(3)?,
    required:      row.get(4)?,
    description:   row.get(5)?,
    display_order: row.get(6)?,
    enum_group_id: row.get(7)?,
    entity_types:  row.get(8)?,
    created:       row.get(9)?,
    modified:      row.get(10)?,
  })
}

const ATTRIBUTE_COLUMNS: &str = "attribute_id, name, slug, datatype, required, \
   description, display_order, enum_group_id, entity_types, created, modified";

const VALUE_COLUMNS: &str = "v.value_id, v.attribute_id, a.datatype, \
   v.value_text, v.value_float, v.value_int, v.value_date, v.value_bool, \
   v.value_object_type, v.value_object_id, ev.value, v.value_json, v.value_csv, \
   v.created_at, v.modified_at";

fn load_enum_group(
  conn: &rusqlite::Connection,
  group_id: &str,
) -> rusqlite::Result<Option<RawEnumGroup>> {
  let name: Option<String> = conn
    .query_row(
      "SELECT name FROM enum_groups WHERE group_id = ?1",
      rusqlite::params![group_id],
      |r| r.get(0),
    )
    .optional()?;

  let Some(name) = name else { return Ok(None) };

  let mut stmt = conn.prepare(
    "SELECT ev.value_id, ev.value
     FROM enum_values ev
     JOIN enum_group_members m ON m.value_id = ev.value_id
     WHERE m.group_id = ?1",
  )?;
  let values = stmt
    .query_map(rusqlite::params![group_id], |r| Ok((r.get(0)?, r.get(1)?)))?
    .collect::<rusqlite::Result<Vec<(String, String)>>>()?;

  Ok(Some(RawEnumGroup {
    group_id: group_id.to_owned(),
    name,
    values,
  }))
}

fn resolve_enum_id(
  conn: &rusqlite::Connection,
  slots: &Slots,
) -> rusqlite::Result<Option<String>> {
  match slots.enum_label.as_deref() {
    Some(label) => conn
      .query_row(
        "SELECT value_id FROM enum_values WHERE value = ?1",
        rusqlite::params![label],
        |r| r.get(0),
      )
      .map(Some),
    None => Ok(None),
  }
}

fn into_attribute(
  raw: RawAttribute,
  group: Option<RawEnumGroup>,
) -> Result<Attribute> {
  let group = group.map(RawEnumGroup::into_group).transpose()?;
  raw.into_attribute(group)
}

// ─── EavStore impl ───────────────────────────────────────────────────────────

impl EavStore for SqliteStore {
  type Error = Error;

  // ── Attributes ────────────────────────────────────────────────────────────

  async fn save_attribute(&self, attribute: Attribute) -> Result<Attribute> {
    let mut attr = attribute.finalized()?;
    attr.modified = Utc::now();

    let id_str        = encode_uuid(attr.attribute_id);
    let name          = attr.name.clone();
    let slug          = attr.slug.clone();
    let datatype_str  = encode_datatype(attr.datatype);
    let required      = attr.required;
    let description   = attr.description.clone();
    let display_order = attr.display_order as i64;
    let group_id_str  = attr.enum_group.as_ref().map(|g| encode_uuid(g.group_id));
    let types_str     = encode_string_list(&attr.entity_types)?;
    let created_str   = encode_dt(attr.created);
    let modified_str  = encode_dt(attr.modified);

    let write = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let existing: Option<(String, i64)> = tx
          .query_row(
            "SELECT a.datatype,
                    (SELECT COUNT(*) FROM eav_values v
                     WHERE v.attribute_id = a.attribute_id)
             FROM attributes a WHERE a.attribute_id = ?1",
            rusqlite::params![id_str],
            |r| Ok((r.get(0)?, r.get(1)?)),
          )
          .optional()?;

        match existing {
          Some((stored_datatype, value_count)) => {
            if stored_datatype != datatype_str && value_count > 0 {
              return Ok(AttrWrite::Locked);
            }
            tx.execute(
              "UPDATE attributes
               SET name = ?2, slug = ?3, datatype = ?4, required = ?5,
                   description = ?6, display_order = ?7, enum_group_id = ?8,
                   entity_types = ?9, modified = ?10
               WHERE attribute_id = ?1",
              rusqlite::params![
                id_str,
                name,
                slug,
                datatype_str,
                required,
                description,
                display_order,
                group_id_str,
                types_str,
                modified_str,
              ],
            )?;
          }
          None => {
            tx.execute(
              "INSERT INTO attributes (
                 attribute_id, name, slug, datatype, required, description,
                 display_order, enum_group_id, entity_types, created, modified
               ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
              rusqlite::params![
                id_str,
                name,
                slug,
                datatype_str,
                required,
                description,
                display_order,
                group_id_str,
                types_str,
                created_str,
                modified_str,
              ],
            )?;
          }
        }

        tx.commit()?;
        Ok(AttrWrite::Saved)
      })
      .await
      .map_err(|e| {
        if is_unique_violation(&e, "attributes.slug") {
          Error::SlugConflict(attr.slug.clone())
        } else {
          Error::Database(e)
        }
      })?;

    match write {
      AttrWrite::Saved => Ok(attr),
      AttrWrite::Locked => {
        Err(trellis_core::Error::DatatypeLocked(attr.slug.clone()).into())
      }
    }
  }

  async fn get_attribute(&self, slug: &str) -> Result<Option<Attribute>> {
    let slug = slug.to_owned();

    let raw = self
      .conn
      .call(move |conn| {
        let raw: Option<RawAttribute> = conn
          .query_row(
            &format!("SELECT {ATTRIBUTE_COLUMNS} FROM attributes WHERE slug = ?1"),
            rusqlite::params![slug],
            read_raw_attribute,
          )
          .optional()?;

        let Some(raw) = raw else { return Ok(None) };

        let group = match raw.enum_group_id.as_deref() {
          Some(gid) => load_enum_group(conn, gid)?,
          None => None,
        };

        Ok(Some((raw, group)))
      })
      .await?;

    raw.map(|(raw, group)| into_attribute(raw, group)).transpose()
  }

  async fn list_attributes(
    &self,
    entity_type: Option<&str>,
  ) -> Result<Vec<Attribute>> {
    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ATTRIBUTE_COLUMNS} FROM attributes ORDER BY name"
        ))?;
        let raws = stmt
          .query_map([], read_raw_attribute)?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut out = Vec::with_capacity(raws.len());
        for raw in raws {
          let group = match raw.enum_group_id.as_deref() {
            Some(gid) => load_enum_group(conn, gid)?,
            None => None,
          };
          out.push((raw, group));
        }
        Ok(out)
      })
      .await?;

    let attributes = raws
      .into_iter()
      .map(|(raw, group)| into_attribute(raw, group))
      .collect::<Result<Vec<_>>>()?;

    Ok(match entity_type {
      Some(tag) => attributes
        .into_iter()
        .filter(|a| a.applies_to(tag))
        .collect(),
      None => attributes,
    })
  }

  async fn delete_attribute(&self, slug: &str) -> Result<()> {
    let slug_owned = slug.to_owned();

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let id: Option<String> = tx
          .query_row(
            "SELECT attribute_id FROM attributes WHERE slug = ?1",
            rusqlite::params![slug_owned],
            |r| r.get(0),
          )
          .optional()?;

        let Some(id) = id else { return Ok(RestrictedDelete::Missing) };

        let value_count: i64 = tx.query_row(
          "SELECT COUNT(*) FROM eav_values WHERE attribute_id = ?1",
          rusqlite::params![id],
          |r| r.get(0),
        )?;
        if value_count > 0 {
          return Ok(RestrictedDelete::InUse);
        }

        tx.execute(
          "DELETE FROM attributes WHERE attribute_id = ?1",
          rusqlite::params![id],
        )?;
        tx.commit()?;
        Ok(RestrictedDelete::Deleted)
      })
      .await?;

    match outcome {
      RestrictedDelete::Deleted => Ok(()),
      RestrictedDelete::Missing => Err(Error::AttributeNotFound(slug.to_owned())),
      RestrictedDelete::InUse => Err(Error::AttributeInUse(slug.to_owned())),
    }
  }

  // ── Enum groups ───────────────────────────────────────────────────────────

  async fn save_enum_group(
    &self,
    name: &str,
    labels: &[&str],
  ) -> Result<EnumGroup> {
    let name_owned = name.to_owned();
    let labels_owned: Vec<String> = labels.iter().map(|l| (*l).to_owned()).collect();
    // Candidate ids; only used for rows that don't exist yet.
    let group_candidate = encode_uuid(Uuid::new_v4());
    let value_candidates: Vec<String> = labels
      .iter()
      .map(|_| encode_uuid(Uuid::new_v4()))
      .collect();

    let (group_id, values) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let group_id: String = match tx
          .query_row(
            "SELECT group_id FROM enum_groups WHERE name = ?1",
            rusqlite::params![name_owned],
            |r| r.get(0),
          )
          .optional()?
        {
          Some(id) => id,
          None => {
            tx.execute(
              "INSERT INTO enum_groups (group_id, name) VALUES (?1, ?2)",
              rusqlite::params![group_candidate, name_owned],
            )?;
            group_candidate
          }
        };

        // Replace semantics: the member set becomes exactly `labels`.
        tx.execute(
          "DELETE FROM enum_group_members WHERE group_id = ?1",
          rusqlite::params![group_id],
        )?;

        let mut values = Vec::with_capacity(labels_owned.len());
        for (label, candidate) in labels_owned.iter().zip(&value_candidates) {
          let value_id: String = match tx
            .query_row(
              "SELECT value_id FROM enum_values WHERE value = ?1",
              rusqlite::params![label],
              |r| r.get(0),
            )
            .optional()?
          {
            Some(id) => id,
            None => {
              tx.execute(
                "INSERT INTO enum_values (value_id, value) VALUES (?1, ?2)",
                rusqlite::params![candidate, label],
              )?;
              candidate.clone()
            }
          };

          tx.execute(
            "INSERT INTO enum_group_members (group_id, value_id) VALUES (?1, ?2)",
            rusqlite::params![group_id, value_id],
          )?;
          values.push((value_id, label.clone()));
        }

        tx.commit()?;
        Ok((group_id, values))
      })
      .await?;

    RawEnumGroup { group_id, name: name.to_owned(), values }.into_group()
  }

  async fn get_enum_group(&self, name: &str) -> Result<Option<EnumGroup>> {
    let name_owned = name.to_owned();

    let raw = self
      .conn
      .call(move |conn| {
        let group_id: Option<String> = conn
          .query_row(
            "SELECT group_id FROM enum_groups WHERE name = ?1",
            rusqlite::params![name_owned],
            |r| r.get(0),
          )
          .optional()?;

        Ok(match group_id {
          Some(gid) => load_enum_group(conn, &gid)?,
          None => None,
        })
      })
      .await?;

    raw.map(RawEnumGroup::into_group).transpose()
  }

  async fn delete_enum_value(&self, label: &str) -> Result<()> {
    let label_owned = label.to_owned();

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let id: Option<String> = tx
          .query_row(
            "SELECT value_id FROM enum_values WHERE value = ?1",
            rusqlite::params![label_owned],
            |r| r.get(0),
          )
          .optional()?;

        let Some(id) = id else { return Ok(RestrictedDelete::Missing) };

        let references: i64 = tx.query_row(
          "SELECT
             (SELECT COUNT(*) FROM enum_group_members WHERE value_id = ?1)
           + (SELECT COUNT(*) FROM eav_values WHERE value_enum_id = ?1)",
          rusqlite::params![id],
          |r| r.get(0),
        )?;
        if references > 0 {
          return Ok(RestrictedDelete::InUse);
        }

        tx.execute(
          "DELETE FROM enum_values WHERE value_id = ?1",
          rusqlite::params![id],
        )?;
        tx.commit()?;
        Ok(RestrictedDelete::Deleted)
      })
      .await?;

    match outcome {
      RestrictedDelete::Deleted => Ok(()),
      RestrictedDelete::Missing => Err(Error::EnumValueNotFound(label.to_owned())),
      RestrictedDelete::InUse => Err(Error::EnumValueInUse(label.to_owned())),
    }
  }

  // ── Values ────────────────────────────────────────────────────────────────

  async fn upsert_value(
    &self,
    attribute: &Attribute,
    entity: &EntityRef,
    payload: Option<ValuePayload>,
  ) -> Result<WriteOutcome> {
    let attr_id_str  = encode_uuid(attribute.attribute_id);
    let entity_type  = entity.type_tag.clone();
    let key          = entity.pk.clone();
    let new_slots    = payload.as_ref().map(Slots::from_payload).transpose()?;
    let value_id_str = encode_uuid(Uuid::new_v4());
    let now_str      = encode_dt(Utc::now());

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        // The matching identity column depends on the host's key shape.
        let lookup_sql = |pk_column: &str| {
          format!(
            "SELECT v.value_id,
                    v.value_text, v.value_float, v.value_int, v.value_date,
                    v.value_bool, v.value_object_type, v.value_object_id,
                    ev.value, v.value_json, v.value_csv
             FROM eav_values v
             LEFT JOIN enum_values ev ON ev.value_id = v.value_enum_id
             WHERE v.attribute_id = ?1 AND v.entity_type = ?2
               AND v.{pk_column} = ?3"
          )
        };
        let read_existing = |row: &rusqlite::Row<'_>| {
          Ok((row.get::<_, String>(0)?, Slots::from_row(row, 1)?))
        };

        let (pk_int, pk_text) = encode_key(&key);
        let existing: Option<(String, Slots)> = match &key {
          KeyValue::Int(n) => tx
            .query_row(
              &lookup_sql("entity_pk_int"),
              rusqlite::params![attr_id_str, entity_type, n],
              read_existing,
            )
            .optional()?,
          KeyValue::Text(s) => tx
            .query_row(
              &lookup_sql("entity_pk_text"),
              rusqlite::params![attr_id_str, entity_type, s],
              read_existing,
            )
            .optional()?,
        };

        let outcome = match (existing, new_slots) {
          (None, None) => WriteOutcome::Noop,

          (None, Some(slots)) => {
            let enum_id = resolve_enum_id(&tx, &slots)?;
            tx.execute(
              "INSERT INTO eav_values (
                 value_id, attribute_id, entity_type,
                 entity_pk_int, entity_pk_text,
                 value_text, value_float, value_int, value_date, value_bool,
                 value_object_type, value_object_id, value_enum_id,
                 value_json, value_csv, created_at, modified_at
               ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                         ?13, ?14, ?15, ?16, ?17)",
              rusqlite::params![
                value_id_str,
                attr_id_str,
                entity_type,
                pk_int,
                pk_text,
                slots.text,
                slots.float,
                slots.int,
                slots.date,
                slots.boolean,
                slots.object_type,
                slots.object_key,
                enum_id,
                slots.json,
                slots.csv,
                now_str,
                now_str,
              ],
            )?;
            WriteOutcome::Created
          }

          (Some((existing_id, _)), None) => {
            tx.execute(
              "DELETE FROM eav_values WHERE value_id = ?1",
              rusqlite::params![existing_id],
            )?;
            WriteOutcome::Deleted
          }

          (Some((_, stored)), Some(slots)) if stored == slots => {
            WriteOutcome::Unchanged
          }

          (Some((existing_id, _)), Some(slots)) => {
            let enum_id = resolve_enum_id(&tx, &slots)?;
            tx.execute(
              "UPDATE eav_values
               SET value_text = ?2, value_float = ?3, value_int = ?4,
                   value_date = ?5, value_bool = ?6, value_object_type = ?7,
                   value_object_id = ?8, value_enum_id = ?9, value_json = ?10,
                   value_csv = ?11, modified_at = ?12
               WHERE value_id = ?1",
              rusqlite::params![
                existing_id,
                slots.text,
                slots.float,
                slots.int,
                slots.date,
                slots.boolean,
                slots.object_type,
                slots.object_key,
                enum_id,
                slots.json,
                slots.csv,
                now_str,
              ],
            )?;
            WriteOutcome::Updated
          }
        };

        tx.commit()?;
        Ok(outcome)
      })
      .await
      .map_err(|e| {
        if is_unique_violation(&e, "eav_values") {
          tracing::warn!(
            attribute = %attribute.slug,
            entity = %entity,
            "value write lost an insert race"
          );
          Error::IdentityConflict {
            attribute: attribute.slug.clone(),
            entity:    entity.to_string(),
          }
        } else {
          Error::Database(e)
        }
      })?;

    tracing::debug!(
      attribute = %attribute.slug,
      entity = %entity,
      ?outcome,
      "value write"
    );
    Ok(outcome)
  }

  async fn get_value(
    &self,
    attribute: &Attribute,
    entity: &EntityRef,
  ) -> Result<Option<Value>> {
    let attr_id_str = encode_uuid(attribute.attribute_id);
    let entity_type = entity.type_tag.clone();
    let key         = entity.pk.clone();

    let raw = self
      .conn
      .call(move |conn| {
        let sql = |pk_column: &str| {
          format!(
            "SELECT {VALUE_COLUMNS}
             FROM eav_values v
             JOIN attributes a ON a.attribute_id = v.attribute_id
             LEFT JOIN enum_values ev ON ev.value_id = v.value_enum_id
             WHERE v.attribute_id = ?1 AND v.entity_type = ?2
               AND v.{pk_column} = ?3"
          )
        };

        let raw = match &key {
          KeyValue::Int(n) => conn
            .query_row(
              &sql("entity_pk_int"),
              rusqlite::params![attr_id_str, entity_type, n],
              RawValue::from_row,
            )
            .optional()?,
          KeyValue::Text(s) => conn
            .query_row(
              &sql("entity_pk_text"),
              rusqlite::params![attr_id_str, entity_type, s],
              RawValue::from_row,
            )
            .optional()?,
        };

        Ok(raw)
      })
      .await?;

    raw
      .map(|raw| raw.into_value(entity.clone()))
      .transpose()
  }

  async fn list_values(&self, entity: &EntityRef) -> Result<Vec<Value>> {
    let entity_type = entity.type_tag.clone();
    let key         = entity.pk.clone();

    let raws = self
      .conn
      .call(move |conn| {
        let sql_int = format!(
          "SELECT {VALUE_COLUMNS}
           FROM eav_values v
           JOIN attributes a ON a.attribute_id = v.attribute_id
           LEFT JOIN enum_values ev ON ev.value_id = v.value_enum_id
           WHERE v.entity_type = ?1 AND v.entity_pk_int = ?2"
        );
        let sql_text = format!(
          "SELECT {VALUE_COLUMNS}
           FROM eav_values v
           JOIN attributes a ON a.attribute_id = v.attribute_id
           LEFT JOIN enum_values ev ON ev.value_id = v.value_enum_id
           WHERE v.entity_type = ?1 AND v.entity_pk_text = ?2"
        );

        let rows = match &key {
          KeyValue::Int(n) => {
            let mut stmt = conn.prepare(&sql_int)?;
            stmt
              .query_map(rusqlite::params![entity_type, n], RawValue::from_row)?
              .collect::<rusqlite::Result<Vec<_>>>()?
          }
          KeyValue::Text(s) => {
            let mut stmt = conn.prepare(&sql_text)?;
            stmt
              .query_map(rusqlite::params![entity_type, s], RawValue::from_row)?
              .collect::<rusqlite::Result<Vec<_>>>()?
          }
        };

        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(|raw| raw.into_value(entity.clone()))
      .collect()
  }
}
