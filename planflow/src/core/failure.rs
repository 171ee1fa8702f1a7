//! Typed failure classification attached to failed node executions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a node failure, used by advisers to decide applicability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    /// The step's own logic failed.
    Application,
    /// The step exceeded a deadline.
    Timeout,
    /// A network or infrastructure dependency was unreachable.
    Connectivity,
    /// The step was not permitted to perform its work.
    Authorization,
    /// A post-execution verification check failed.
    Verification,
    /// A delegate/remote executor could not be provisioned.
    DelegateProvisioning,
    /// The failure could not be classified.
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Application => write!(f, "application"),
            Self::Timeout => write!(f, "timeout"),
            Self::Connectivity => write!(f, "connectivity"),
            Self::Authorization => write!(f, "authorization"),
            Self::Verification => write!(f, "verification"),
            Self::DelegateProvisioning => write!(f, "delegate_provisioning"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Failure details recorded on a node execution.
///
/// Domain failures are data, not errors: they travel through the adviser
/// path rather than through `Result`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureInfo {
    /// Human-readable failure message.
    pub message: String,
    /// Categories the failure falls into.
    #[serde(default)]
    pub failure_types: Vec<FailureType>,
}

impl FailureInfo {
    /// Creates failure info with an unclassified type.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            failure_types: vec![FailureType::Unknown],
        }
    }

    /// Creates failure info with the given categories.
    #[must_use]
    pub fn with_types(message: impl Into<String>, failure_types: Vec<FailureType>) -> Self {
        Self {
            message: message.into(),
            failure_types,
        }
    }

    /// Creates an application failure.
    #[must_use]
    pub fn application(message: impl Into<String>) -> Self {
        Self::with_types(message, vec![FailureType::Application])
    }

    /// Creates a timeout failure.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::with_types(message, vec![FailureType::Timeout])
    }

    /// Returns true if the failure carries the given category.
    #[must_use]
    pub fn has_type(&self, failure_type: FailureType) -> bool {
        self.failure_types.contains(&failure_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_defaults_to_unknown() {
        let info = FailureInfo::new("boom");
        assert!(info.has_type(FailureType::Unknown));
        assert!(!info.has_type(FailureType::Timeout));
    }

    #[test]
    fn test_typed_constructors() {
        assert!(FailureInfo::application("x").has_type(FailureType::Application));
        assert!(FailureInfo::timeout("x").has_type(FailureType::Timeout));
    }

    #[test]
    fn test_serde_round_trip() {
        let info = FailureInfo::with_types("boom", vec![FailureType::Connectivity, FailureType::Timeout]);
        let json = serde_json::to_string(&info).unwrap();
        let back: FailureInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(info, back);
    }
}
