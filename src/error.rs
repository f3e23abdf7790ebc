//! Error types for the policy engine.
//!
//! All errors are strongly typed using thiserror. Validation failures
//! reject an entire fragment (fail closed) and identify the fragment
//! name and offending rule index so authors can locate the problem.

use thiserror::Error;

/// Errors produced while parsing a schedule recurrence string.
///
/// Schedule strings are parsed at load time only; evaluation of an
/// already-loaded schedule never fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleParseError {
    #[error("schedule string is empty")]
    Empty,

    #[error("expected 'after' or 'before' boundary, got '{got}'")]
    MissingBoundary {
        got: String,
    },

    #[error("invalid time of day '{got}' (expected HH:MM)")]
    InvalidTime {
        got: String,
    },

    #[error("unknown day of week '{got}'")]
    UnknownDay {
        got: String,
    },

    #[error("unexpected trailing input '{got}'")]
    TrailingInput {
        got: String,
    },
}

/// Validation errors raised while normalizing a policy fragment.
///
/// Any variant rejects the whole fragment; no partially valid fragment
/// is ever activated.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("fragment '{fragment}' rule {rule_index}: stability_days {value} is negative")]
    NegativeStabilityDays {
        fragment: String,
        rule_index: usize,
        value: i64,
    },

    #[error("fragment '{fragment}' rule {rule_index}: invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        fragment: String,
        rule_index: usize,
        pattern: String,
        reason: String,
    },

    #[error("fragment '{fragment}' rule {rule_index}: invalid schedule '{spec}': {source}")]
    InvalidSchedule {
        fragment: String,
        rule_index: usize,
        spec: String,
        source: ScheduleParseError,
    },

    #[error("fragment '{fragment}' rule {rule_index}: matcher '{matcher}' has an empty value list")]
    EmptyMatcherList {
        fragment: String,
        rule_index: usize,
        matcher: &'static str,
    },

    #[error("fragment '{fragment}' rule {rule_index}: label cannot be empty")]
    EmptyLabel {
        fragment: String,
        rule_index: usize,
    },

    #[error("fragment '{fragment}': unknown timezone '{timezone}' (expected 'UTC' or a fixed offset like '+05:30')")]
    UnknownTimezone {
        fragment: String,
        timezone: String,
    },

    #[error("fragment '{fragment}': default label cannot be empty")]
    EmptyDefaultLabel {
        fragment: String,
    },

    #[error("fragment '{fragment}': invalid schedule '{spec}': {source}")]
    InvalidFragmentSchedule {
        fragment: String,
        spec: String,
        source: ScheduleParseError,
    },

    #[error("fragment name cannot be empty")]
    EmptyFragmentName,

    #[error("duplicate fragment name '{fragment}' in stack")]
    DuplicateFragmentName {
        fragment: String,
    },
}

impl ValidationError {
    /// Returns the name of the rejected fragment, if the error is
    /// attributable to one.
    #[must_use]
    pub fn fragment(&self) -> Option<&str> {
        match self {
            Self::NegativeStabilityDays { fragment, .. }
            | Self::InvalidPattern { fragment, .. }
            | Self::InvalidSchedule { fragment, .. }
            | Self::EmptyMatcherList { fragment, .. }
            | Self::EmptyLabel { fragment, .. }
            | Self::UnknownTimezone { fragment, .. }
            | Self::EmptyDefaultLabel { fragment }
            | Self::InvalidFragmentSchedule { fragment, .. }
            | Self::DuplicateFragmentName { fragment } => Some(fragment),
            Self::EmptyFragmentName => None,
        }
    }

    /// Returns the index of the offending rule, if the error is
    /// attributable to one.
    #[must_use]
    pub fn rule_index(&self) -> Option<usize> {
        match self {
            Self::NegativeStabilityDays { rule_index, .. }
            | Self::InvalidPattern { rule_index, .. }
            | Self::InvalidSchedule { rule_index, .. }
            | Self::EmptyMatcherList { rule_index, .. }
            | Self::EmptyLabel { rule_index, .. } => Some(*rule_index),
            _ => None,
        }
    }
}

/// Top-level error type for the policy engine.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("internal error: {message}")]
    Internal {
        message: String,
    },
}

impl PolicyError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Result type alias for policy engine operations.
pub type PolicyResult<T> = Result<T, PolicyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_names_fragment_and_rule() {
        let err = ValidationError::NegativeStabilityDays {
            fragment: "base".to_string(),
            rule_index: 3,
            value: -1,
        };
        assert_eq!(err.fragment(), Some("base"));
        assert_eq!(err.rule_index(), Some(3));
        let msg = format!("{err}");
        assert!(msg.contains("base"));
        assert!(msg.contains("-1"));
    }

    #[test]
    fn test_schedule_parse_error_display() {
        let err = ScheduleParseError::UnknownDay {
            got: "moonday".to_string(),
        };
        assert!(format!("{err}").contains("moonday"));
    }

    #[test]
    fn test_invalid_schedule_wraps_parse_error() {
        let err = ValidationError::InvalidSchedule {
            fragment: "ci".to_string(),
            rule_index: 0,
            spec: "whenever".to_string(),
            source: ScheduleParseError::MissingBoundary {
                got: "whenever".to_string(),
            },
        };
        let msg = format!("{err}");
        assert!(msg.contains("whenever"));
        assert!(msg.contains("ci"));
    }

    #[test]
    fn test_policy_error_from_validation() {
        let err: PolicyError = ValidationError::EmptyFragmentName.into();
        assert!(err.is_validation());
    }

    #[test]
    fn test_policy_error_internal() {
        let err = PolicyError::internal("unexpected state");
        assert!(!err.is_validation());
        assert!(format!("{err}").contains("unexpected state"));
    }
}
