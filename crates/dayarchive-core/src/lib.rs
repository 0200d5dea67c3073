//! Day Archive Core Types
//!
//! Shared vocabulary for the day archive pipeline:
//! - [`Statement`]: the immutable record being archived and its public attributes
//! - [`Variant`]: the `full` / `light` field subsets and their header rows
//! - [`Scope`]: the filter dimension of an archive (global, platform, category, ground)
//! - [`ArchivePaths`]: the deterministic artifact names of one archive job

pub mod error;
pub mod paths;
pub mod scope;
pub mod statement;

pub use error::{Error, Result};
pub use paths::ArchivePaths;
pub use scope::{slugify, Scope, Variant, CATEGORIES, DECISION_GROUNDS};
pub use statement::{headings, headings_light, Statement, StatementAttributes, FULL_HEADINGS, LIGHT_EXCLUDED};
