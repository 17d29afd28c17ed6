//! Comparison operator of a scenario condition.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;
use crate::telemetry::{as_number, scalar_text};

/// How a reported value is compared against the scenario's literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}

impl Operator {
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    /// Compare a reported value against a literal.
    ///
    /// When both sides read as numbers the comparison is numeric. Otherwise
    /// only `==` and `!=` apply, on the textual form of the reported scalar;
    /// ordering operators never match non-numeric operands.
    #[must_use]
    pub fn evaluate(self, actual: &Value, literal: &str) -> bool {
        let literal_number = literal.trim().parse::<f64>().ok();
        if let (Some(a), Some(b)) = (as_number(actual), literal_number) {
            return a.partial_cmp(&b).is_some_and(|ord| self.accepts(ord));
        }
        let Some(text) = scalar_text(actual) else {
            return false;
        };
        match self {
            Self::Eq => text == literal,
            Self::Ne => text != literal,
            Self::Lt | Self::Le | Self::Gt | Self::Ge => false,
        }
    }

    fn accepts(self, ord: Ordering) -> bool {
        match self {
            Self::Eq => ord == Ordering::Equal,
            Self::Ne => ord != Ordering::Equal,
            Self::Lt => ord == Ordering::Less,
            Self::Le => ord != Ordering::Greater,
            Self::Gt => ord == Ordering::Greater,
            Self::Ge => ord != Ordering::Less,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Operator {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "==" | "=" | "eq" => Ok(Self::Eq),
            "!=" | "<>" | "ne" => Ok(Self::Ne),
            "<" | "lt" => Ok(Self::Lt),
            "<=" | "le" => Ok(Self::Le),
            ">" | "gt" => Ok(Self::Gt),
            ">=" | "ge" => Ok(Self::Ge),
            other => Err(ValidationError::UnknownOperator(other.to_string())),
        }
    }
}
