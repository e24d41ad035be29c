//! Deterministic slug derivation for attribute identities.

/// Derive a slug from a display name: lowercase ASCII alphanumerics with a
/// single underscore between runs.
///
/// Deterministic and pure. Collisions are rejected by the store's unique
/// constraint on the slug column, never suffixed away.
pub fn slugify(name: &str) -> String {
  let mut slug = String::with_capacity(name.len());
  let mut gap = false;
  for c in name.chars() {
    if c.is_ascii_alphanumeric() {
      if gap && !slug.is_empty() {
        slug.push('_');
      }
      gap = false;
      slug.push(c.to_ascii_lowercase());
    } else {
      gap = true;
    }
  }
  slug
}
