//! Error types for `trellis-core`.

use thiserror::Error;

use crate::datatype::Datatype;

#[derive(Debug, Error)]
pub enum Error {
  /// A raw value has the wrong shape for the attribute's datatype.
  #[error("invalid {datatype} value: {reason}")]
  InvalidValue { datatype: Datatype, reason: String },

  /// An enum-typed attribute was given a label outside its choice group.
  #[error("{value:?} is not a valid choice for {attribute}")]
  InvalidChoice { value: String, attribute: String },

  #[error("enum attributes must have a choice group")]
  EnumGroupMissing,

  #[error("only enum attributes may have a choice group")]
  EnumGroupForbidden,

  /// No slug could be derived from the attribute name.
  #[error("cannot derive a slug from name {0:?}")]
  SlugEmpty(String),

  /// The attribute's datatype cannot change while stored values reference it.
  #[error("attribute {0} has stored values; its datatype cannot change")]
  DatatypeLocked(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
