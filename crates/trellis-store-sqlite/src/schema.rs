//! SQL schema for the trellis SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Choice labels are global; a label may belong to any number of groups.
CREATE TABLE IF NOT EXISTS enum_values (
    value_id TEXT PRIMARY KEY,
    value    TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS enum_groups (
    group_id TEXT PRIMARY KEY,
    name     TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS enum_group_members (
    group_id TEXT NOT NULL REFERENCES enum_groups(group_id),
    value_id TEXT NOT NULL REFERENCES enum_values(value_id),
    PRIMARY KEY (group_id, value_id)
);

CREATE TABLE IF NOT EXISTS attributes (
    attribute_id  TEXT PRIMARY KEY,
    name          TEXT NOT NULL,
    slug          TEXT NOT NULL UNIQUE,
    datatype      TEXT NOT NULL,    -- 'text' | 'float' | ... | 'csv'
    required      INTEGER NOT NULL DEFAULT 0,
    description   TEXT,
    display_order INTEGER NOT NULL DEFAULT 1,
    enum_group_id TEXT REFERENCES enum_groups(group_id),
    entity_types  TEXT NOT NULL DEFAULT '[]',   -- JSON array of type tags
    created       TEXT NOT NULL,
    modified      TEXT NOT NULL
);

-- One row per (attribute, entity). Exactly one value_* slot is populated,
-- selected by the owning attribute's datatype. The entity's primary key
-- lands in the column matching its shape.
CREATE TABLE IF NOT EXISTS eav_values (
    value_id          TEXT PRIMARY KEY,
    attribute_id      TEXT NOT NULL REFERENCES attributes(attribute_id),
    entity_type       TEXT NOT NULL,
    entity_pk_int     INTEGER,        -- integer-keyed hosts
    entity_pk_text    TEXT,           -- string-keyed hosts
    value_text        TEXT,
    value_float       REAL,
    value_int         INTEGER,
    value_date        TEXT,           -- YYYY-MM-DD
    value_bool        INTEGER,
    value_object_type TEXT,
    value_object_id   TEXT,           -- JSON-encoded key, keeps the shape
    value_enum_id     TEXT REFERENCES enum_values(value_id),
    value_json        TEXT,
    value_csv         TEXT,           -- JSON array of strings
    created_at        TEXT NOT NULL,
    modified_at       TEXT NOT NULL,
    CHECK ((entity_pk_int IS NULL) != (entity_pk_text IS NULL))
);

-- The composite identity, one unique index per key shape. The constraint is
-- the backstop that turns a lost insert race into a conflict error instead
-- of silent duplication.
CREATE UNIQUE INDEX IF NOT EXISTS eav_values_int_identity
  ON eav_values(attribute_id, entity_type, entity_pk_int)
  WHERE entity_pk_int IS NOT NULL;
CREATE UNIQUE INDEX IF NOT EXISTS eav_values_text_identity
  ON eav_values(attribute_id, entity_type, entity_pk_text)
  WHERE entity_pk_text IS NOT NULL;

CREATE INDEX IF NOT EXISTS eav_values_attribute_idx ON eav_values(attribute_id);
CREATE INDEX IF NOT EXISTS eav_values_entity_idx
  ON eav_values(entity_type, entity_pk_int, entity_pk_text);

PRAGMA user_version = 1;
";
