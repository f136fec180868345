//! Hand-written sqlx repositories.
//!
//! Every function takes `&mut SqliteConnection` so the engine can compose
//! several writes inside one transaction. Ids and timestamps are stored as
//! TEXT (UUID hyphenated form, RFC 3339) and parsed back on read.

pub mod audit;
pub mod items;
pub mod notifications;
pub mod requests;
pub mod transfers;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::DomainParseError;

pub(crate) fn decode_err(
    e: impl std::error::Error + Send + Sync + 'static,
) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(e))
}

pub(crate) fn uuid_col(row: &SqliteRow, col: &str) -> Result<Uuid, sqlx::Error> {
    let s: String = row.try_get(col)?;
    Uuid::parse_str(&s).map_err(decode_err)
}

pub(crate) fn opt_uuid_col(row: &SqliteRow, col: &str) -> Result<Option<Uuid>, sqlx::Error> {
    let s: Option<String> = row.try_get(col)?;
    s.map(|s| Uuid::parse_str(&s).map_err(decode_err)).transpose()
}

pub(crate) fn time_col(row: &SqliteRow, col: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    let s: String = row.try_get(col)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(decode_err)
}

pub(crate) fn opt_time_col(
    row: &SqliteRow,
    col: &str,
) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    let s: Option<String> = row.try_get(col)?;
    s.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|d| d.with_timezone(&Utc))
            .map_err(decode_err)
    })
    .transpose()
}

pub(crate) fn status_col<T>(row: &SqliteRow, col: &str) -> Result<T, sqlx::Error>
where
    T: FromStr<Err = DomainParseError>,
{
    let s: String = row.try_get(col)?;
    s.parse::<T>().map_err(decode_err)
}

pub(crate) fn opt_id(id: Option<Uuid>) -> Option<String> {
    id.map(|u| u.to_string())
}

pub(crate) fn rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339()
}
