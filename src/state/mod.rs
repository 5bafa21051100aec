//! State document addressing and merging.
//!
//! Typed keys select a section of the document at compile time; the merge
//! module overlays persisted or remote JSON onto the defaults and rejects
//! sections that do not fit the schema.

pub mod keys;
mod merge;

pub use keys::{NestedSection, Section};
pub use merge::{deep_merge, merge_validated, MergeReport};
