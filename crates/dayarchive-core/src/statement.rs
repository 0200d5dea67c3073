//! Statement Data Structure
//!
//! A statement is the immutable record archived by the pipeline. Statements are
//! created by the submission API and never change afterwards, so the archive of a
//! closed day is stable.
//!
//! ## Structure
//! - **id**: monotonically increasing identifier, roughly ordered by creation time
//! - **created_at**: creation timestamp with second precision (UTC)
//! - **platform**: the submitting platform (id and display name)
//! - **attributes**: the public attribute schema written to the archive files
//!
//! ## Header Rows
//! The column order of [`FULL_HEADINGS`] is a stable contract with downstream
//! consumers. The light variant drops the free text fields that may exceed 2000
//! characters and the territorial scope, see [`LIGHT_EXCLUDED`].

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::scope::Variant;

/// Column order of the full archive variant.
pub const FULL_HEADINGS: &[&str] = &[
    "uuid",
    "decision_visibility",
    "decision_visibility_other",
    "end_date_visibility_restriction",
    "decision_monetary",
    "decision_monetary_other",
    "end_date_monetary_restriction",
    "decision_provision",
    "end_date_service_restriction",
    "decision_account",
    "end_date_account_restriction",
    "account_type",
    "decision_ground",
    "decision_ground_reference_url",
    "illegal_content_legal_ground",
    "illegal_content_explanation",
    "incompatible_content_ground",
    "incompatible_content_explanation",
    "incompatible_content_illegal",
    "category",
    "category_addition",
    "category_specification",
    "content_type",
    "content_type_other",
    "content_language",
    "content_date",
    "territorial_scope",
    "application_date",
    "decision_facts",
    "source_type",
    "automated_detection",
    "automated_decision",
    "platform_name",
    "platform_uid",
    "created_at",
];

/// Columns removed from the light variant.
pub const LIGHT_EXCLUDED: [&str; 4] = [
    "illegal_content_explanation",
    "incompatible_content_explanation",
    "decision_facts",
    "territorial_scope",
];

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Header row of the full variant.
pub fn headings() -> Vec<&'static str> {
    FULL_HEADINGS.to_vec()
}

/// Header row of the light variant.
pub fn headings_light() -> Vec<&'static str> {
    FULL_HEADINGS
        .iter()
        .copied()
        .filter(|h| !LIGHT_EXCLUDED.contains(h))
        .collect()
}

/// Public attributes of a statement.
///
/// Everything except the identity and placement fields held directly on
/// [`Statement`]. Persisted as a JSON document by the record store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementAttributes {
    #[serde(default)]
    pub decision_visibility: Vec<String>,
    pub decision_visibility_other: Option<String>,
    pub end_date_visibility_restriction: Option<NaiveDate>,
    pub decision_monetary: Option<String>,
    pub decision_monetary_other: Option<String>,
    pub end_date_monetary_restriction: Option<NaiveDate>,
    pub decision_provision: Option<String>,
    pub end_date_service_restriction: Option<NaiveDate>,
    pub decision_account: Option<String>,
    pub end_date_account_restriction: Option<NaiveDate>,
    pub account_type: Option<String>,
    pub decision_ground: String,
    pub decision_ground_reference_url: Option<String>,
    pub illegal_content_legal_ground: Option<String>,
    pub illegal_content_explanation: Option<String>,
    pub incompatible_content_ground: Option<String>,
    pub incompatible_content_explanation: Option<String>,
    pub incompatible_content_illegal: Option<String>,
    pub category: String,
    #[serde(default)]
    pub category_addition: Vec<String>,
    #[serde(default)]
    pub category_specification: Vec<String>,
    #[serde(default)]
    pub content_type: Vec<String>,
    pub content_type_other: Option<String>,
    pub content_language: Option<String>,
    pub content_date: Option<NaiveDate>,
    #[serde(default)]
    pub territorial_scope: Vec<String>,
    pub application_date: Option<NaiveDate>,
    pub decision_facts: Option<String>,
    pub source_type: Option<String>,
    pub automated_detection: Option<String>,
    pub automated_decision: Option<String>,
}

/// A single archived record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    /// Monotonic record identifier
    pub id: i64,

    /// Public unique identifier
    pub uuid: String,

    /// Submitting platform
    pub platform_id: i64,

    /// Submitting platform display name
    pub platform_name: String,

    /// Platform-side unique identifier of the moderated item
    pub puid: String,

    /// Creation timestamp, second precision, UTC
    pub created_at: NaiveDateTime,

    pub attributes: StatementAttributes,
}

impl Statement {
    /// Value of one archive column, as written to the delimited file.
    ///
    /// Unknown column names render as an empty cell.
    pub fn field(&self, name: &str) -> String {
        let a = &self.attributes;
        match name {
            "uuid" => self.uuid.clone(),
            "decision_visibility" => a.decision_visibility.join(","),
            "decision_visibility_other" => opt(&a.decision_visibility_other),
            "end_date_visibility_restriction" => date(a.end_date_visibility_restriction),
            "decision_monetary" => opt(&a.decision_monetary),
            "decision_monetary_other" => opt(&a.decision_monetary_other),
            "end_date_monetary_restriction" => date(a.end_date_monetary_restriction),
            "decision_provision" => opt(&a.decision_provision),
            "end_date_service_restriction" => date(a.end_date_service_restriction),
            "decision_account" => opt(&a.decision_account),
            "end_date_account_restriction" => date(a.end_date_account_restriction),
            "account_type" => opt(&a.account_type),
            "decision_ground" => a.decision_ground.clone(),
            "decision_ground_reference_url" => opt(&a.decision_ground_reference_url),
            "illegal_content_legal_ground" => opt(&a.illegal_content_legal_ground),
            "illegal_content_explanation" => opt(&a.illegal_content_explanation),
            "incompatible_content_ground" => opt(&a.incompatible_content_ground),
            "incompatible_content_explanation" => opt(&a.incompatible_content_explanation),
            "incompatible_content_illegal" => opt(&a.incompatible_content_illegal),
            "category" => a.category.clone(),
            "category_addition" => a.category_addition.join(","),
            "category_specification" => a.category_specification.join(","),
            "content_type" => a.content_type.join(","),
            "content_type_other" => opt(&a.content_type_other),
            "content_language" => opt(&a.content_language),
            "content_date" => date(a.content_date),
            "territorial_scope" => a.territorial_scope.join(","),
            "application_date" => date(a.application_date),
            "decision_facts" => opt(&a.decision_facts),
            "source_type" => opt(&a.source_type),
            "automated_detection" => opt(&a.automated_detection),
            "automated_decision" => opt(&a.automated_decision),
            "platform_name" => self.platform_name.clone(),
            "platform_uid" => self.puid.clone(),
            "created_at" => self.created_at.format(DATETIME_FORMAT).to_string(),
            _ => String::new(),
        }
    }

    /// Row cells for the given variant, aligned with its header row.
    pub fn to_row(&self, variant: Variant) -> Vec<String> {
        variant
            .headings()
            .into_iter()
            .map(|name| self.field(name))
            .collect()
    }
}

fn opt(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn date(value: Option<NaiveDate>) -> String {
    value
        .map(|d| d.format(DATE_FORMAT).to_string())
        .unwrap_or_default()
}
