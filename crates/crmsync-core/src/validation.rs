//! # Validation Module
//!
//! Turns raw run options (date strings, interval text, limits) into a
//! validated [`SyncWindow`].
//!
//! ## Window Resolution
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Window Resolution                                  │
//! │                                                                         │
//! │  end   = --end-date            or now                                   │
//! │  start = epoch                 if --fetch-all                           │
//! │        = --start-date          if given                                 │
//! │        = now - --time-interval otherwise ("15 minutes")                 │
//! │                                                                         │
//! │  start > end  ──►  ValidationError::InvalidDateRange                    │
//! │  limit == 0   ──►  ValidationError::MustBePositive                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use chrono::Utc;
//! use crmsync_core::validation::{parse_interval, WindowRequest};
//!
//! assert_eq!(parse_interval("15 minutes").unwrap().num_minutes(), 15);
//!
//! let window = WindowRequest::default().resolve(Utc::now()).unwrap();
//! assert!(window.start < window.end);
//! ```

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};

use crate::error::ValidationError;
use crate::types::{ObjectType, SyncWindow};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Default window size when no start date is given.
pub const DEFAULT_TIME_INTERVAL: &str = "15 minutes";

/// Default push page size.
pub const DEFAULT_LIMIT: u32 = 100;

// =============================================================================
// Date Parsing
// =============================================================================

/// Parses a date or timestamp given on the command line.
///
/// ## Accepted Formats (all interpreted as UTC unless an offset is given)
/// - RFC 3339: `2024-03-05T14:30:00Z`, `2024-03-05T14:30:00+02:00`
/// - `2024-03-05 14:30:00`
/// - `2024-03-05T14:30:00`
/// - `2024-03-05` (midnight)
pub fn parse_datetime(field: &str, input: &str) -> ValidationResult<DateTime<Utc>> {
    let input = input.trim();

    if input.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }

    for layout in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, layout) {
            return Ok(naive.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }

    Err(ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: format!("'{}' is not a recognised date", input),
    })
}

// =============================================================================
// Interval Parsing
// =============================================================================

/// Parses a relative interval such as `15 minutes`, `2 hours` or `1d`.
///
/// ## Rules
/// - Amount must be a positive integer
/// - Units: seconds, minutes, hours, days, weeks (singular, plural or
///   abbreviated)
pub fn parse_interval(input: &str) -> ValidationResult<Duration> {
    let invalid = |reason: &str| ValidationError::InvalidFormat {
        field: "time_interval".to_string(),
        reason: format!("'{}': {}", input, reason),
    };

    let trimmed = input.trim().to_lowercase();
    let split_at = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| invalid("missing unit"))?;

    let (amount, unit) = trimmed.split_at(split_at);
    let amount: i64 = amount.parse().map_err(|_| invalid("missing amount"))?;

    if amount <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "time_interval".to_string(),
        });
    }

    let duration = match unit.trim() {
        "s" | "sec" | "secs" | "second" | "seconds" => Duration::seconds(amount),
        "m" | "min" | "mins" | "minute" | "minutes" => Duration::minutes(amount),
        "h" | "hr" | "hrs" | "hour" | "hours" => Duration::hours(amount),
        "d" | "day" | "days" => Duration::days(amount),
        "w" | "week" | "weeks" => Duration::weeks(amount),
        _ => return Err(invalid("unknown unit")),
    };

    Ok(duration)
}

// =============================================================================
// Window Request
// =============================================================================

/// Raw window options as a caller (CLI, scheduler) provides them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowRequest {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub fetch_all: bool,
    pub time_interval: String,
    pub limit: u32,
    pub objects: Vec<ObjectType>,
}

impl Default for WindowRequest {
    fn default() -> Self {
        WindowRequest {
            start_date: None,
            end_date: None,
            fetch_all: false,
            time_interval: DEFAULT_TIME_INTERVAL.to_string(),
            limit: DEFAULT_LIMIT,
            objects: ObjectType::ALL.to_vec(),
        }
    }
}

impl WindowRequest {
    /// Resolves the request against `now` into an immutable window.
    ///
    /// ## Returns
    /// * `Ok(SyncWindow)` - Validated window
    /// * `Err(ValidationError::InvalidDateRange)` - start lies after end
    /// * `Err(ValidationError)` - Unparsable date/interval or zero limit
    pub fn resolve(&self, now: DateTime<Utc>) -> ValidationResult<SyncWindow> {
        if self.limit == 0 {
            return Err(ValidationError::MustBePositive {
                field: "limit".to_string(),
            });
        }

        let end = match self.end_date {
            Some(ref raw) => parse_datetime("end_date", raw)?,
            None => now,
        };

        let start = if self.fetch_all {
            DateTime::<Utc>::UNIX_EPOCH
        } else {
            match self.start_date {
                Some(ref raw) => parse_datetime("start_date", raw)?,
                None => now - parse_interval(&self.time_interval)?,
            }
        };

        if start > end {
            return Err(ValidationError::InvalidDateRange {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }

        let mut objects = self.objects.clone();
        objects.sort();
        objects.dedup();

        Ok(SyncWindow {
            start,
            end,
            limit: self.limit,
            fetch_all: self.fetch_all,
            objects,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_datetime_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 5, 14, 30, 0).unwrap();

        assert_eq!(parse_datetime("d", "2024-03-05T14:30:00Z").unwrap(), expected);
        assert_eq!(parse_datetime("d", "2024-03-05T16:30:00+02:00").unwrap(), expected);
        assert_eq!(parse_datetime("d", "2024-03-05 14:30:00").unwrap(), expected);
        assert_eq!(parse_datetime("d", "2024-03-05T14:30:00").unwrap(), expected);
        assert_eq!(
            parse_datetime("d", "2024-03-05").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap()
        );

        assert!(parse_datetime("d", "").is_err());
        assert!(parse_datetime("d", "yesterday").is_err());
    }

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval("15 minutes").unwrap(), Duration::minutes(15));
        assert_eq!(parse_interval("2 hours").unwrap(), Duration::hours(2));
        assert_eq!(parse_interval("1 day").unwrap(), Duration::days(1));
        assert_eq!(parse_interval("30s").unwrap(), Duration::seconds(30));
        assert_eq!(parse_interval(" 1 Week ").unwrap(), Duration::weeks(1));

        assert!(parse_interval("minutes").is_err());
        assert!(parse_interval("15").is_err());
        assert!(parse_interval("0 minutes").is_err());
        assert!(parse_interval("3 fortnights").is_err());
    }

    #[test]
    fn test_default_window_uses_interval() {
        let window = WindowRequest::default().resolve(now()).unwrap();

        assert_eq!(window.end, now());
        assert_eq!(window.start, now() - Duration::minutes(15));
        assert_eq!(window.limit, 100);
        assert_eq!(window.objects, vec![ObjectType::Contact, ObjectType::Company]);
    }

    #[test]
    fn test_explicit_dates_and_fetch_all() {
        let request = WindowRequest {
            start_date: Some("2024-01-01".into()),
            end_date: Some("2024-02-01".into()),
            ..Default::default()
        };
        let window = request.resolve(now()).unwrap();
        assert_eq!(window.start, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());

        let all = WindowRequest {
            fetch_all: true,
            start_date: Some("2024-05-01".into()),
            ..Default::default()
        };
        let window = all.resolve(now()).unwrap();
        assert_eq!(window.start, DateTime::<Utc>::UNIX_EPOCH);
        assert!(window.fetch_all);
    }

    #[test]
    fn test_invalid_range_and_limit() {
        let backwards = WindowRequest {
            start_date: Some("2024-02-01".into()),
            end_date: Some("2024-01-01".into()),
            ..Default::default()
        };
        assert!(matches!(
            backwards.resolve(now()),
            Err(ValidationError::InvalidDateRange { .. })
        ));

        let zero = WindowRequest {
            limit: 0,
            ..Default::default()
        };
        assert!(matches!(
            zero.resolve(now()),
            Err(ValidationError::MustBePositive { .. })
        ));
    }
}
