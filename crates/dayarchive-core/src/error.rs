//! Error Types for Day Archive Core
//!
//! Errors raised while parsing the persisted forms of scopes and variants.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid variant: {0}")]
    InvalidVariant(String),

    #[error("Invalid scope: {0}")]
    InvalidScope(String),
}

pub type Result<T> = std::result::Result<T, Error>;
