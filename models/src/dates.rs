// models/src/dates.rs

use chrono::{DateTime, NaiveDate, Utc};

use crate::errors::{ValidationError, ValidationResult};

/// Parses a date-only value in the canonical `YYYY-MM-DD` form.
///
/// Exactly one format is accepted. Day-first shapes such as
/// `DD-MM-YYYY` are rejected rather than guessed at, since for days
/// twelve and below the two readings are indistinguishable.
pub fn parse_date(input: &str) -> ValidationResult<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|_| ValidationError::InvalidDateFormat(input.to_string()))
}

/// Parses an expiry instant: either a full RFC 3339 timestamp or a
/// canonical `YYYY-MM-DD` date, which is taken to mean the end of that
/// day in UTC.
pub fn parse_expiry(input: &str) -> ValidationResult<DateTime<Utc>> {
    let trimmed = input.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(instant.with_timezone(&Utc));
    }
    let date = parse_date(trimmed)?;
    end_of_day(date)
}

/// Last representable second of `date` in UTC.
pub fn end_of_day(date: NaiveDate) -> ValidationResult<DateTime<Utc>> {
    date.and_hms_opt(23, 59, 59)
        .map(|dt| dt.and_utc())
        .ok_or(ValidationError::InvalidValue)
}

/// Parses an expiry and additionally requires it to lie strictly in the
/// future relative to `now`.
pub fn parse_future_expiry(input: &str, now: DateTime<Utc>) -> ValidationResult<DateTime<Utc>> {
    let expiry = parse_expiry(input)?;
    if expiry <= now {
        return Err(ValidationError::DateNotInFuture("expires_at".to_string()));
    }
    Ok(expiry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn accepts_canonical_date() {
        let date = parse_date("2026-01-31").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2026, 1, 31).unwrap());
    }

    #[test]
    fn rejects_day_first_date() {
        assert!(matches!(
            parse_date("31-01-2026"),
            Err(ValidationError::InvalidDateFormat(_))
        ));
    }

    #[test]
    fn rejects_slash_separated_date() {
        assert!(parse_date("2026/01/31").is_err());
    }

    #[test]
    fn expiry_accepts_rfc3339() {
        let instant = parse_expiry("2026-12-31T23:00:00Z").unwrap();
        assert_eq!(instant, Utc.with_ymd_and_hms(2026, 12, 31, 23, 0, 0).unwrap());
    }

    #[test]
    fn expiry_date_means_end_of_day() {
        let instant = parse_expiry("2026-06-15").unwrap();
        assert_eq!(instant, Utc.with_ymd_and_hms(2026, 6, 15, 23, 59, 59).unwrap());
    }

    #[test]
    fn future_expiry_rejects_past() {
        let now = Utc.with_ymd_and_hms(2026, 6, 16, 0, 0, 0).unwrap();
        assert!(matches!(
            parse_future_expiry("2026-06-15", now),
            Err(ValidationError::DateNotInFuture(_))
        ));
    }

    #[test]
    fn future_expiry_boundary_is_not_future() {
        let now = Utc.with_ymd_and_hms(2026, 6, 15, 23, 59, 59).unwrap();
        assert!(parse_future_expiry("2026-06-15", now).is_err());
        let earlier = Utc.with_ymd_and_hms(2026, 6, 15, 23, 59, 58).unwrap();
        assert!(parse_future_expiry("2026-06-15", earlier).is_ok());
    }
}
