//! Row-mapping helpers shared by the store modules.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use std::str::FromStr;

use certwatch_core::error::CertWatchError;

/// Parse a stored RFC 3339 timestamp.
pub(crate) fn parse_utc(idx: usize, s: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Parse a stored YYYY-MM-DD date.
pub(crate) fn parse_date(idx: usize, s: String) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(&s, "%Y-%m-%d")
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Parse a stored enum TEXT column into its typed form.
pub(crate) fn text_to<T>(idx: usize, s: String) -> rusqlite::Result<T>
where
    T: FromStr<Err = CertWatchError>,
{
    s.parse()
        .map_err(|e: CertWatchError| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Decode a JSON string-list column.
pub(crate) fn json_to_strings(idx: usize, s: String) -> rusqlite::Result<Vec<String>> {
    serde_json::from_str(&s)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
