//! Time and timestamp helpers.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};

use crate::error::ValidationError;

/// UTC timestamp used for history records and schedule triggers.
pub type Timestamp = DateTime<Utc>;

/// Layout used by dashboard forms (`<input type="datetime-local">`).
const FORM_LAYOUT: &str = "%Y-%m-%dT%H:%M";

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Parse a trigger time given either as RFC 3339 or in the form layout
/// `YYYY-MM-DDTHH:MM` (interpreted in the local time zone).
///
/// # Errors
///
/// Returns [`ValidationError::InvalidTriggerTime`] if neither format matches
/// or the local time does not exist (DST gap).
pub fn parse_trigger_time(input: &str) -> Result<Timestamp, ValidationError> {
    let input = input.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Ok(ts.to_utc());
    }
    let naive = NaiveDateTime::parse_from_str(input, FORM_LAYOUT)
        .map_err(|_| ValidationError::InvalidTriggerTime(input.to_string()))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|ts| ts.to_utc())
        .ok_or_else(|| ValidationError::InvalidTriggerTime(input.to_string()))
}
