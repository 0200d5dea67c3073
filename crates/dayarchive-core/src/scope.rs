//! Archive Scopes and Variants
//!
//! An archive job is identified by a day, a [`Scope`] and a [`Variant`].
//!
//! ## Scopes
//! - **Global**: every statement of the day
//! - **Platform**: statements submitted by one platform
//! - **Category**: statements with one content category
//! - **DecisionGround**: statements with one decision ground
//!
//! Each scope has a slug used in artifact names and for listing filters.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::statement::{headings, headings_light, Statement};

/// Statement category vocabulary.
pub const CATEGORIES: &[&str] = &[
    "STATEMENT_CATEGORY_ANIMAL_WELFARE",
    "STATEMENT_CATEGORY_DATA_PROTECTION_AND_PRIVACY_VIOLATIONS",
    "STATEMENT_CATEGORY_ILLEGAL_OR_HARMFUL_SPEECH",
    "STATEMENT_CATEGORY_INTELLECTUAL_PROPERTY_INFRINGEMENTS",
    "STATEMENT_CATEGORY_NEGATIVE_EFFECTS_ON_CIVIC_DISCOURSE_OR_ELECTIONS",
    "STATEMENT_CATEGORY_NON_CONSENSUAL_BEHAVIOUR",
    "STATEMENT_CATEGORY_PORNOGRAPHY_OR_SEXUALIZED_CONTENT",
    "STATEMENT_CATEGORY_PROTECTION_OF_MINORS",
    "STATEMENT_CATEGORY_RISK_FOR_PUBLIC_SECURITY",
    "STATEMENT_CATEGORY_SCAMS_AND_FRAUD",
    "STATEMENT_CATEGORY_SELF_HARM",
    "STATEMENT_CATEGORY_SCOPE_OF_PLATFORM_SERVICE",
    "STATEMENT_CATEGORY_UNSAFE_AND_ILLEGAL_PRODUCTS",
    "STATEMENT_CATEGORY_VIOLENCE",
];

/// Decision ground vocabulary.
pub const DECISION_GROUNDS: &[&str] = &[
    "DECISION_GROUND_ILLEGAL_CONTENT",
    "DECISION_GROUND_INCOMPATIBLE_CONTENT",
];

/// Field subset of an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Full,
    Light,
}

impl Variant {
    pub const ALL: [Variant; 2] = [Variant::Full, Variant::Light];

    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Full => "full",
            Variant::Light => "light",
        }
    }

    /// Header row of this variant.
    pub fn headings(&self) -> Vec<&'static str> {
        match self {
            Variant::Full => headings(),
            Variant::Light => headings_light(),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "full" => Ok(Variant::Full),
            "light" => Ok(Variant::Light),
            other => Err(Error::InvalidVariant(other.to_string())),
        }
    }
}

/// Filter dimension of an archive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scope {
    Global,
    Platform { id: i64, name: String },
    Category { key: String },
    DecisionGround { key: String },
}

impl Scope {
    /// Rebuild a scope from its column form. All-null means global.
    pub fn from_columns(
        platform: Option<(i64, String)>,
        category: Option<String>,
        decision_ground: Option<String>,
    ) -> Result<Self> {
        match (platform, category, decision_ground) {
            (None, None, None) => Ok(Scope::Global),
            (Some((id, name)), None, None) => Ok(Scope::Platform { id, name }),
            (None, Some(key), None) => Ok(Scope::Category { key }),
            (None, None, Some(key)) => Ok(Scope::DecisionGround { key }),
            (p, c, g) => Err(Error::InvalidScope(format!(
                "more than one scope column set: platform={:?} category={:?} ground={:?}",
                p.map(|(id, _)| id),
                c,
                g
            ))),
        }
    }

    /// Stable key: `global`, `platform:<id>`, `category:<key>`, `decision_ground:<key>`.
    pub fn key(&self) -> String {
        match self {
            Scope::Global => "global".to_string(),
            Scope::Platform { id, .. } => format!("platform:{}", id),
            Scope::Category { key } => format!("category:{}", key),
            Scope::DecisionGround { key } => format!("decision_ground:{}", key),
        }
    }

    pub fn platform_id(&self) -> Option<i64> {
        match self {
            Scope::Platform { id, .. } => Some(*id),
            _ => None,
        }
    }

    pub fn category(&self) -> Option<&str> {
        match self {
            Scope::Category { key } => Some(key),
            _ => None,
        }
    }

    pub fn decision_ground(&self) -> Option<&str> {
        match self {
            Scope::DecisionGround { key } => Some(key),
            _ => None,
        }
    }

    /// Slug before collision handling.
    pub fn default_slug(&self) -> String {
        match self {
            Scope::Global => "global".to_string(),
            Scope::Platform { name, .. } => slugify(name),
            Scope::Category { key } => format!(
                "category-{}",
                slugify(key.trim_start_matches("STATEMENT_CATEGORY_"))
            ),
            Scope::DecisionGround { key } => format!(
                "ground-{}",
                slugify(key.trim_start_matches("DECISION_GROUND_"))
            ),
        }
    }

    /// Whether the statement belongs in an archive of this scope.
    pub fn matches(&self, statement: &Statement) -> bool {
        match self {
            Scope::Global => true,
            Scope::Platform { id, .. } => statement.platform_id == *id,
            Scope::Category { key } => statement.attributes.category == *key,
            Scope::DecisionGround { key } => statement.attributes.decision_ground == *key,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Lower-kebab-case a display name. Runs of non-alphanumerics become one `-`.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;

    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}
