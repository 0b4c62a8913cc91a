//! Owner-scoped record persistence.
//!
//! Every mutating call takes the caller's email and only ever touches rows
//! owned by that email.

pub mod scholarships;
pub mod students;

pub use scholarships::{ScholarshipInput, ScholarshipStore};
pub use students::{NewStudent, StudentStore, StudentUpdate};

use crate::error::StoreError;
use sea_orm::{DbErr, SqlErr};
use time::Date;
use time::macros::format_description;

/// Parse a `YYYY-MM-DD` field value.
pub fn parse_date(field: &str, value: &str) -> Result<Date, StoreError> {
    Date::parse(value.trim(), format_description!("[year]-[month]-[day]"))
        .map_err(|_| StoreError::Invalid(format!("{field} must be a date in YYYY-MM-DD format")))
}

/// Parse an optional date field; blank strings count as absent.
pub fn parse_optional_date(field: &str, value: Option<&str>) -> Result<Option<Date>, StoreError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => parse_date(field, v).map(Some),
    }
}

fn require_text(field: &str, value: &str) -> Result<String, StoreError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(StoreError::Invalid(format!("{field} is required")));
    }
    Ok(value.to_string())
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}
