//! Chart series extracted from telemetry history.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::telemetry::{TelemetryRecord, as_number};
use crate::time::Timestamp;

/// Number of history records charted when the caller gives no limit.
pub const DEFAULT_CHART_LIMIT: usize = 20;

/// One charted reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub recorded_at: Timestamp,
    pub value: f64,
}

/// Extract `property` from history records, oldest first.
///
/// Records that do not carry the property, or whose payload is not a JSON
/// object, are skipped. Values must be JSON numbers or numeric strings.
///
/// # Errors
///
/// Returns [`ValidationError::NonNumericValue`] on the first value that is
/// not numeric.
pub fn chart_series(
    records: &[TelemetryRecord],
    property: &str,
) -> Result<Vec<ChartPoint>, ValidationError> {
    let mut points = Vec::with_capacity(records.len());
    for record in records {
        let Ok(snapshot) = record.snapshot() else {
            continue;
        };
        let Some(value) = snapshot.get(property) else {
            continue;
        };
        let value = as_number(value).ok_or_else(|| ValidationError::NonNumericValue {
            property: property.to_string(),
        })?;
        points.push(ChartPoint {
            recorded_at: record.recorded_at,
            value,
        });
    }
    points.sort_by_key(|point| point.recorded_at);
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::DeviceAddress;
    use chrono::{Duration, Utc};

    fn record(minutes_ago: i64, payload: &str) -> TelemetryRecord {
        TelemetryRecord {
            device: DeviceAddress::new("0x01"),
            recorded_at: Utc::now() - Duration::minutes(minutes_ago),
            payload: payload.to_string(),
        }
    }

    #[test]
    fn should_return_points_oldest_first() {
        let records = vec![
            record(1, r#"{"soil_moisture": 30}"#),
            record(5, r#"{"soil_moisture": "12.5"}"#),
        ];
        let points = chart_series(&records, "soil_moisture").unwrap();
        assert_eq!(points.len(), 2);
        assert!((points[0].value - 12.5).abs() < f64::EPSILON);
        assert!((points[1].value - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn should_skip_records_without_property() {
        let records = vec![
            record(1, r#"{"battery": 90}"#),
            record(2, r#"{"soil_moisture": 40}"#),
            record(3, "not json"),
        ];
        let points = chart_series(&records, "soil_moisture").unwrap();
        assert_eq!(points.len(), 1);
    }

    #[test]
    fn should_fail_on_non_numeric_value() {
        let records = vec![record(1, r#"{"state": "ON"}"#)];
        assert_eq!(
            chart_series(&records, "state"),
            Err(ValidationError::NonNumericValue {
                property: "state".to_string()
            })
        );
    }
}
