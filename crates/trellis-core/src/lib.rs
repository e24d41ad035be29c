//! Core types and trait definitions for the trellis EAV layer.
//!
//! Trellis attaches a dynamic, admin-defined set of typed attributes to
//! arbitrary pre-existing record types without touching their fixed schema.
//! This crate holds the attribute/value model, the per-datatype validators,
//! and the [`store::EavStore`] trait; it is deliberately free of database
//! dependencies. Backends (e.g. `trellis-store-sqlite`) implement the trait.

pub mod attribute;
pub mod datatype;
pub mod entity;
pub mod enums;
pub mod error;
pub mod slug;
pub mod store;
pub mod validators;
pub mod value;

pub use error::{Error, Result};
