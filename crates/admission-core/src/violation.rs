//! Field-level violations and the aggregated admission decision.
//!
//! A `Violation` mirrors the field error of the cluster API: a path into the
//! object, the offending value rendered as a string, a category and a human
//! readable detail. The category is what lets operators tell an expected
//! policy block (`Invalid`/`Required`) from a plugin malfunction (`Internal`).

use std::fmt;

use serde::Serialize;

/// Category of a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorType {
    /// The value at the path is not acceptable.
    Invalid,
    /// A value is missing at the path.
    Required,
    /// The plugin could not reach a verdict (timeout, script fault, lookup failure).
    Internal,
}

impl ErrorType {
    /// Reason string used in admission response causes.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorType::Invalid => "FieldValueInvalid",
            ErrorType::Required => "FieldValueRequired",
            ErrorType::Internal => "InternalError",
        }
    }
}

/// One structured denial reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub field: String,
    pub bad_value: String,
    pub error_type: ErrorType,
    pub detail: String,
    /// Originating plugin, filled in by the dispatcher.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
}

impl Violation {
    pub fn invalid(
        field: impl Into<String>,
        bad_value: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            bad_value: bad_value.into(),
            error_type: ErrorType::Invalid,
            detail: detail.into(),
            plugin: None,
        }
    }

    pub fn required(field: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            bad_value: String::new(),
            error_type: ErrorType::Required,
            detail: detail.into(),
            plugin: None,
        }
    }

    /// Internal error, carrying the failure message as the detail.
    pub fn internal(field: impl Into<String>, err: impl fmt::Display) -> Self {
        Self {
            field: field.into(),
            bad_value: String::new(),
            error_type: ErrorType::Internal,
            detail: err.to_string(),
            plugin: None,
        }
    }

    pub fn with_plugin(mut self, plugin: &str) -> Self {
        self.plugin = Some(plugin.to_string());
        self
    }

    pub fn is_internal(&self) -> bool {
        self.error_type == ErrorType::Internal
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.field.is_empty() {
            write!(f, "{}: ", self.field)?;
        }
        match self.error_type {
            ErrorType::Invalid => {
                write!(f, "Invalid value: \"{}\": {}", self.bad_value, self.detail)
            }
            ErrorType::Required => write!(f, "Required value: {}", self.detail),
            ErrorType::Internal => write!(f, "Internal error: {}", self.detail),
        }
    }
}

/// Final verdict for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub allowed: bool,
    pub violations: Vec<Violation>,
}

impl Decision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            violations: Vec::new(),
        }
    }

    /// Allow iff the list is empty.
    pub fn from_violations(violations: Vec<Violation>) -> Self {
        Self {
            allowed: violations.is_empty(),
            violations,
        }
    }

    /// Human readable summary of every violation, in order.
    pub fn message(&self) -> String {
        self.violations
            .iter()
            .map(|v| match &v.plugin {
                Some(p) => format!("[{p}] {v}"),
                None => v.to_string(),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn has_internal_errors(&self) -> bool {
        self.violations.iter().any(Violation::is_internal)
    }
}
