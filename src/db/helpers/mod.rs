use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};

/// RFC 3339 with millisecond precision and a `Z` suffix, which SQLite's
/// date functions understand.
pub fn to_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_optional_datetime(
    value: Option<String>,
    field: &str,
) -> Result<Option<DateTime<Utc>>> {
    match value {
        Some(raw) => parse_datetime(&raw, field).map(Some),
        None => Ok(None),
    }
}

pub fn to_u16(value: i64, field: &str) -> Result<u16> {
    u16::try_from(value).map_err(|_| anyhow!("{field} value {value} is out of range"))
}

pub fn to_optional_u16(value: Option<i64>, field: &str) -> Result<Option<u16>> {
    value.map(|raw| to_u16(raw, field)).transpose()
}
