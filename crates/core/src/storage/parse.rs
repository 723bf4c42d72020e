//! Column decoding for stored rows
//!
//! Text columns hold UUIDs, RFC3339 timestamps and kebab-case entry types.
//! Decode failures surface as `FromSqlConversionFailure` carrying the
//! offending column index.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Error as SqlError, Row};
use uuid::Uuid;

use crate::models::EntryType;

fn conversion<E>(idx: usize, e: E) -> SqlError
where
    E: std::error::Error + Send + Sync + 'static,
{
    SqlError::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

pub fn uuid_at(row: &Row<'_>, idx: usize) -> Result<Uuid, SqlError> {
    let text: String = row.get(idx)?;
    Uuid::parse_str(&text).map_err(|e| conversion(idx, e))
}

pub fn datetime_at(row: &Row<'_>, idx: usize) -> Result<DateTime<Utc>, SqlError> {
    let text: String = row.get(idx)?;
    parse_rfc3339(idx, &text)
}

/// Nullable timestamp column
pub fn datetime_opt_at(row: &Row<'_>, idx: usize) -> Result<Option<DateTime<Utc>>, SqlError> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| parse_rfc3339(idx, &t)).transpose()
}

/// Nullable UUID column
pub fn uuid_opt_at(row: &Row<'_>, idx: usize) -> Result<Option<Uuid>, SqlError> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| Uuid::parse_str(&t).map_err(|e| conversion(idx, e)))
        .transpose()
}

fn parse_rfc3339(idx: usize, text: &str) -> Result<DateTime<Utc>, SqlError> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion(idx, e))
}

pub fn entry_type_at(row: &Row<'_>, idx: usize) -> Result<EntryType, SqlError> {
    let text: String = row.get(idx)?;
    text.parse::<EntryType>().map_err(|e| conversion(idx, e))
}

/// `QueryReturnedNoRows` becomes `None`
pub trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, SqlError>;
}

impl<T> OptionalExt<T> for Result<T, SqlError> {
    fn optional(self) -> Result<Option<T>, SqlError> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(SqlError::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
