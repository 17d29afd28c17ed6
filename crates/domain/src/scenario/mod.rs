//! Scenario: a single-condition automation rule.
//!
//! A scenario watches one property of one *source* device. When a telemetry
//! report from that device satisfies the condition, the scenario's action
//! payload is published to its target topic, unless the report already shows
//! the action's effect (feedback guard).

mod operator;

pub use operator::Operator;

use serde::{Deserialize, Serialize};

use crate::error::{GreenHubError, ValidationError};
use crate::id::{DeviceAddress, ScenarioId};
use crate::telemetry::{Properties, Telemetry};

/// A condition → action rule bound to one source device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Row id; the default (`0`) until the scenario has been persisted.
    #[serde(default)]
    pub id: ScenarioId,
    pub source: DeviceAddress,
    pub property: String,
    pub operator: Operator,
    pub comparison_value: String,
    pub target_topic: String,
    pub action_payload: Properties,
}

impl Scenario {
    /// Create a builder for constructing a [`Scenario`].
    #[must_use]
    pub fn builder() -> ScenarioBuilder {
        ScenarioBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`GreenHubError::Validation`] when:
    /// - `source` is empty ([`ValidationError::EmptyName`])
    /// - `property` is empty ([`ValidationError::EmptyProperty`])
    /// - `target_topic` is empty ([`ValidationError::EmptyTopic`])
    /// - `action_payload` is empty ([`ValidationError::EmptyPayload`])
    pub fn validate(&self) -> Result<(), GreenHubError> {
        if self.source.as_str().trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if self.property.trim().is_empty() {
            return Err(ValidationError::EmptyProperty.into());
        }
        if self.target_topic.trim().is_empty() {
            return Err(ValidationError::EmptyTopic.into());
        }
        if self.action_payload.is_empty() {
            return Err(ValidationError::EmptyPayload.into());
        }
        Ok(())
    }

    /// Whether the watched property of `telemetry` satisfies the condition.
    /// A report lacking the property never matches.
    #[must_use]
    pub fn condition_holds(&self, telemetry: &Telemetry) -> bool {
        telemetry
            .get(&self.property)
            .is_some_and(|actual| self.operator.evaluate(actual, &self.comparison_value))
    }

    /// Feedback guard: the report already carries every key/value of the
    /// action payload.
    #[must_use]
    pub fn is_already_applied(&self, telemetry: &Telemetry) -> bool {
        telemetry.contains_all(&self.action_payload)
    }

    /// Return a copy carrying the given persisted id.
    #[must_use]
    pub fn with_id(mut self, id: ScenarioId) -> Self {
        self.id = id;
        self
    }
}

/// Step-by-step builder for [`Scenario`].
#[derive(Debug, Default)]
pub struct ScenarioBuilder {
    id: Option<ScenarioId>,
    source: Option<DeviceAddress>,
    property: Option<String>,
    operator: Option<Operator>,
    comparison_value: Option<String>,
    target_topic: Option<String>,
    action_payload: Properties,
}

impl ScenarioBuilder {
    #[must_use]
    pub fn id(mut self, id: ScenarioId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn source(mut self, source: impl Into<DeviceAddress>) -> Self {
        self.source = Some(source.into());
        self
    }

    #[must_use]
    pub fn property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }

    #[must_use]
    pub fn operator(mut self, operator: Operator) -> Self {
        self.operator = Some(operator);
        self
    }

    #[must_use]
    pub fn comparison_value(mut self, value: impl Into<String>) -> Self {
        self.comparison_value = Some(value.into());
        self
    }

    #[must_use]
    pub fn target_topic(mut self, topic: impl Into<String>) -> Self {
        self.target_topic = Some(topic.into());
        self
    }

    /// Add one key of the action payload.
    #[must_use]
    pub fn action(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.action_payload.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn action_payload(mut self, payload: Properties) -> Self {
        self.action_payload = payload;
        self
    }

    /// Consume the builder, validate, and return a [`Scenario`].
    ///
    /// The operator defaults to equality.
    ///
    /// # Errors
    ///
    /// Returns [`GreenHubError::Validation`] if required fields are missing or empty.
    pub fn build(self) -> Result<Scenario, GreenHubError> {
        let scenario = Scenario {
            id: self.id.unwrap_or_default(),
            source: self
                .source
                .unwrap_or_else(|| DeviceAddress::new(String::new())),
            property: self.property.unwrap_or_default(),
            operator: self.operator.unwrap_or(Operator::Eq),
            comparison_value: self.comparison_value.unwrap_or_default(),
            target_topic: self.target_topic.unwrap_or_default(),
            action_payload: self.action_payload,
        };
        scenario.validate()?;
        Ok(scenario)
    }
}
