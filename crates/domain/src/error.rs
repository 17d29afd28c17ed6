//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into
//! [`GreenHubError`] at port boundaries.

/// Boxed source error carried across port boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Top-level error shared by every layer.
#[derive(Debug, thiserror::Error)]
pub enum GreenHubError {
    /// A domain invariant was violated by caller input.
    #[error("validation error")]
    Validation(#[from] ValidationError),

    /// A referenced device, scenario, or schedule does not exist.
    #[error("not found")]
    NotFound(#[from] NotFoundError),

    /// The persistence gateway failed.
    #[error("storage error")]
    Storage(#[source] BoxError),

    /// The message bus failed (publish, subscribe, connect).
    #[error("message bus error")]
    Bus(#[source] BoxError),
}

/// Invariant violations detected while building or decoding domain values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("property must not be empty")]
    EmptyProperty,

    #[error("target topic must not be empty")]
    EmptyTopic,

    #[error("action payload must contain at least one property")]
    EmptyPayload,

    #[error("unknown comparison operator {0:?}")]
    UnknownOperator(String),

    #[error("unknown recurrence {0:?}")]
    UnknownRecurrence(String),

    #[error("invalid trigger time {0:?}")]
    InvalidTriggerTime(String),

    #[error("trigger time is in the past")]
    TriggerInPast,

    #[error("invalid identifier {0:?}")]
    InvalidId(String),

    #[error("property {property:?} holds a non-numeric value")]
    NonNumericValue { property: String },
}

/// A lookup by identity found nothing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} {id} not found")]
pub struct NotFoundError {
    /// Kind of thing that was looked up (`"Device"`, `"Scenario"`, …).
    pub entity: &'static str,
    /// Identity that was looked up.
    pub id: String,
}

impl GreenHubError {
    /// Whether this error is a [`GreenHubError::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_display_not_found_with_entity_and_id() {
        let err = NotFoundError {
            entity: "Device",
            id: "plant-sensor-1".to_string(),
        };
        assert_eq!(err.to_string(), "Device plant-sensor-1 not found");
    }

    #[test]
    fn should_convert_validation_error_into_top_level() {
        let err: GreenHubError = ValidationError::EmptyProperty.into();
        assert!(matches!(
            err,
            GreenHubError::Validation(ValidationError::EmptyProperty)
        ));
    }

    #[test]
    fn should_report_not_found_kind() {
        let err: GreenHubError = NotFoundError {
            entity: "Scenario",
            id: "7".to_string(),
        }
        .into();
        assert!(err.is_not_found());
        assert!(!GreenHubError::from(ValidationError::EmptyName).is_not_found());
    }

    #[test]
    fn should_display_unknown_operator() {
        let err = ValidationError::UnknownOperator("=~".to_string());
        assert_eq!(err.to_string(), "unknown comparison operator \"=~\"");
    }
}
