use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite};

use super::RepositoryError;

pub(crate) fn decode_error(column: &str, error: impl Display) -> RepositoryError {
    RepositoryError::Decode(format!("{column}: {error}"))
}

pub(crate) fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(name).map_err(|error| decode_error(name, error))
}

/// Fixed-width UTC form so that text ordering matches time ordering.
pub(crate) fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|error| decode_error(column, error))
}

pub(crate) fn parse_date(column: &str, raw: &str) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|error| decode_error(column, error))
}

pub(crate) fn parse_decimal(column: &str, raw: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(raw).map_err(|error| decode_error(column, error))
}

pub(crate) fn parse_version(raw: i64) -> Result<u32, RepositoryError> {
    u32::try_from(raw).map_err(|error| decode_error("version", error))
}

pub(crate) fn to_json<T: Serialize>(column: &str, value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|error| decode_error(column, error))
}

pub(crate) fn from_json<T: DeserializeOwned>(column: &str, raw: &str) -> Result<T, RepositoryError> {
    serde_json::from_str(raw).map_err(|error| decode_error(column, error))
}

pub(crate) fn unknown_value(column: &str, raw: &str) -> RepositoryError {
    RepositoryError::Decode(format!("{column}: unknown value `{raw}`"))
}
