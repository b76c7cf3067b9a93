use atelier_common::{Error, Result};
use chrono::{DateTime, NaiveDateTime, Utc};

/// Parse the timestamp formats that appear in our columns: RFC 3339
/// written by the stores, and SQLite's `datetime('now')` form written
/// by column defaults.
pub(crate) fn parse(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc));
    }

    Err(Error::Database(format!("invalid timestamp format: {raw}")))
}

/// Wrap a domain error for use inside a rusqlite row mapper.
pub(crate) fn conversion_err(e: Error) -> rusqlite::Error {
    rusqlite::Error::ToSqlConversionFailure(Box::new(std::io::Error::other(e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::parse;

    #[test]
    fn parses_rfc3339_and_sqlite_formats() {
        assert!(parse("2026-08-06T12:00:00+00:00").is_ok());
        assert!(parse("2026-08-06 12:00:00").is_ok());
        assert!(parse("yesterday").is_err());
    }
}
