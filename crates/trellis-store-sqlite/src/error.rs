//! Error type for `trellis-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] trellis_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown datatype tag: {0:?}")]
  UnknownDatatype(String),

  /// Another attribute already owns this slug. The candidate slug is
  /// deterministic; resolving the collision is the caller's call.
  #[error("attribute slug already taken: {0:?}")]
  SlugConflict(String),

  /// Two concurrent writes raced on the same (attribute, entity) identity.
  /// Retrying the whole call takes the update branch.
  #[error("value already exists for {attribute} on {entity}")]
  IdentityConflict { attribute: String, entity: String },

  /// The attribute still has stored values; deletion never cascades.
  #[error("attribute {0} still has stored values")]
  AttributeInUse(String),

  /// The choice label is still referenced by a group or a stored value.
  #[error("enum value {0:?} is still referenced")]
  EnumValueInUse(String),

  #[error("attribute not found: {0}")]
  AttributeNotFound(String),

  #[error("enum value not found: {0:?}")]
  EnumValueNotFound(String),

  /// A stored row violates the one-slot-per-datatype contract.
  #[error("corrupt value row {value_id}: {reason}")]
  CorruptRow { value_id: String, reason: String },
}

/// True when `err` is a SQLite uniqueness violation whose message names
/// `needle` (a table or column).
pub(crate) fn is_unique_violation(
  err: &tokio_rusqlite::Error,
  needle: &str,
) -> bool {
  match err {
    tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(
      e,
      Some(msg),
    )) => e.code == rusqlite::ErrorCode::ConstraintViolation && msg.contains(needle),
    _ => false,
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
