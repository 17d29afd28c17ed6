//! Schedule: a time-triggered single actuation command.
//!
//! A schedule is keyed by an absolute trigger instant. Recurrence is opt-in:
//! a [`Recurrence::Once`] schedule fires exactly once, [`Recurrence::Daily`]
//! repeats at the same local wall-clock time, and [`Recurrence::Yearly`]
//! repeats on the same local month, day, hour, and minute.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GreenHubError, ValidationError};
use crate::id::{DeviceAddress, ScheduleId};
use crate::telemetry::Properties;
use crate::time::Timestamp;

/// How often a schedule fires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recurrence {
    #[default]
    Once,
    Daily,
    Yearly,
}

impl Recurrence {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Once => "once",
            Self::Daily => "daily",
            Self::Yearly => "yearly",
        }
    }
}

impl fmt::Display for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Recurrence {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "once" => Ok(Self::Once),
            "daily" => Ok(Self::Daily),
            "yearly" => Ok(Self::Yearly),
            _ => Err(ValidationError::UnknownRecurrence(s.to_string())),
        }
    }
}

/// A command to send to one device at a given time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    /// Row id; the default (`0`) until the schedule has been persisted.
    #[serde(default)]
    pub id: ScheduleId,
    pub device: DeviceAddress,
    pub property: String,
    pub value: Value,
    pub trigger_at: Timestamp,
    #[serde(default)]
    pub recurrence: Recurrence,
}

impl Schedule {
    #[must_use]
    pub fn new(
        device: DeviceAddress,
        property: impl Into<String>,
        value: Value,
        trigger_at: Timestamp,
        recurrence: Recurrence,
    ) -> Self {
        Self {
            id: ScheduleId::default(),
            device,
            property: property.into(),
            value,
            trigger_at,
            recurrence,
        }
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyName`] for an empty device address and
    /// [`ValidationError::EmptyProperty`] for an empty property.
    pub fn validate(&self) -> Result<(), GreenHubError> {
        if self.device.as_str().trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if self.property.trim().is_empty() {
            return Err(ValidationError::EmptyProperty.into());
        }
        Ok(())
    }

    /// Return a copy carrying the given persisted id.
    #[must_use]
    pub fn with_id(mut self, id: ScheduleId) -> Self {
        self.id = id;
        self
    }

    /// Single-property payload sent when the schedule fires.
    #[must_use]
    pub fn command_payload(&self) -> Properties {
        let mut payload = Properties::new();
        payload.insert(self.property.clone(), self.value.clone());
        payload
    }

    /// First firing instant strictly after `after`, or `None` when a
    /// one-shot schedule has already elapsed.
    #[must_use]
    pub fn next_fire_after(&self, after: Timestamp) -> Option<Timestamp> {
        if self.trigger_at > after {
            return Some(self.trigger_at);
        }
        let local = self.trigger_at.with_timezone(&Local);
        let time = local.time();
        let from = after.with_timezone(&Local).date_naive();
        match self.recurrence {
            Recurrence::Once => None,
            // two extra days cover a skipped DST gap
            Recurrence::Daily => from
                .iter_days()
                .take(3)
                .filter_map(|date| local_instant(date, time))
                .find(|candidate| *candidate > after),
            // Feb 29 only comes back every four years, eight covers the century gap
            Recurrence::Yearly => (from.year()..=from.year() + 8)
                .filter_map(|year| NaiveDate::from_ymd_opt(year, local.month(), local.day()))
                .filter_map(|date| local_instant(date, time))
                .find(|candidate| *candidate > after),
        }
    }

    /// Calendar-field cron form of the trigger (`"m h dom mon *"`) in local
    /// time, as shown by dashboards.
    #[must_use]
    pub fn cron_expression(&self) -> String {
        let local = self.trigger_at.with_timezone(&Local);
        format!(
            "{} {} {} {} *",
            local.minute(),
            local.hour(),
            local.day(),
            local.month()
        )
    }
}

fn local_instant(date: NaiveDate, time: NaiveTime) -> Option<Timestamp> {
    Local
        .from_local_datetime(&NaiveDateTime::new(date, time))
        .earliest()
        .map(|ts| ts.to_utc())
}
