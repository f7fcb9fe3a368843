//! Timestamp handling for the API surface.
//!
//! Changes are scheduled with `"YYYY-MM-DD HH:MM:SS"` strings, interpreted
//! as UTC. Internally everything is `DateTime<Utc>`.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::{ChangeflowError, Result};

/// Wire format for implementation times.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a wire-format datetime string into a UTC instant.
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(s, DATETIME_FORMAT).map_err(|_| {
        ChangeflowError::InvalidTime(format!(
            "Invalid datetime format: {s}. Use YYYY-MM-DD HH:MM:SS"
        ))
    })?;
    Ok(naive.and_utc())
}

/// Render a UTC instant in the wire format.
pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

/// Whether a wire-format datetime string lies in the future.
pub fn is_future(s: &str) -> Result<bool> {
    Ok(parse_datetime(s)? > Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_format() {
        let dt = parse_datetime("2026-05-06 10:30:00").unwrap();
        assert_eq!(format_datetime(dt), "2026-05-06 10:30:00");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_datetime("not-a-date").is_err());
        assert!(parse_datetime("2026-05-06").is_err());
        assert!(parse_datetime("2026-05-06T10:30:00Z").is_err());
    }

    #[test]
    fn test_is_future() {
        assert!(is_future("2099-01-01 00:00:00").unwrap());
        assert!(!is_future("2000-01-01 00:00:00").unwrap());
        assert!(is_future("soon").is_err());
    }
}
