//! Choice groups for enum-typed attributes.
//!
//! An [`EnumGroup`] is a named, unordered set of allowed labels. Labels are
//! globally unique and may be shared between any number of groups; stored
//! values for enum-typed attributes reference a label of the owning
//! attribute's group.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single allowed choice label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumValue {
  pub value_id: Uuid,
  pub value:    String,
}

/// A named, unordered set of [`EnumValue`] choices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumGroup {
  pub group_id: Uuid,
  pub name:     String,
  pub values:   Vec<EnumValue>,
}

impl EnumGroup {
  /// Membership query used by the enum branch of attribute validation.
  pub fn contains(&self, label: &str) -> bool {
    self.values.iter().any(|v| v.value == label)
  }

  pub fn value_by_label(&self, label: &str) -> Option<&EnumValue> {
    self.values.iter().find(|v| v.value == label)
  }
}
