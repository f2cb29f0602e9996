//! Error types for objective configuration, gradient computation and lookup.

/// Result alias used throughout the crate.
pub type Result<T, E = ObjectiveError> = std::result::Result<T, E>;

/// Errors raised by objectives and the objective registry.
///
/// Every variant is surfaced synchronously to the caller. Numerical edge
/// cases (overflow at transform extremes, vanishing Hessians) are handled by
/// clamping and never produce an error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ObjectiveError {
    /// An option is malformed or outside its valid range.
    #[error("{objective}: invalid value for `{key}`: {reason}")]
    Config {
        objective: &'static str,
        key: String,
        reason: String,
    },

    /// A required option was never supplied.
    #[error("{objective}: required option `{key}` is not set")]
    NotConfigured {
        objective: &'static str,
        key: &'static str,
    },

    /// Label, prediction, weight or margin dimensions disagree.
    #[error("shape mismatch for {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: String,
        actual: String,
    },

    /// A sample weight is negative or not finite.
    #[error("weight {value} at row {index} is invalid, expected a finite value >= 0")]
    InvalidWeight { index: usize, value: f32 },

    /// A label lies outside the domain of the objective.
    #[error("{objective}: label {value} at row {index} is invalid, expected {expected}")]
    InvalidLabel {
        objective: &'static str,
        index: usize,
        value: f32,
        expected: &'static str,
    },

    /// Query group boundaries are malformed.
    #[error("invalid query groups: {0}")]
    InvalidGroups(String),

    /// Multi-target data given to an objective that does not support it.
    #[error("{objective} does not support multiple targets, got {n_targets} label columns")]
    UnsupportedTargets {
        objective: &'static str,
        n_targets: usize,
    },

    /// A base score cannot be mapped to margin space.
    #[error("{objective}: base_score {value} is invalid, expected {expected}")]
    InvalidBaseScore {
        objective: &'static str,
        value: f32,
        expected: &'static str,
    },

    /// No objective with this name is registered.
    #[error("unknown objective `{name}`, expected one of: {}", known.join(", "))]
    UnknownObjective { name: String, known: Vec<String> },

    /// An objective with this name is already registered.
    #[error("objective `{0}` is already registered")]
    DuplicateObjective(String),

    /// A leaf assignment references a node that is not a leaf of the tree.
    #[error("row assigned to node {node}, which is not a leaf of a tree with {n_nodes} nodes")]
    InvalidLeaf { node: u32, n_nodes: usize },
}

impl ObjectiveError {
    pub(crate) fn config(
        objective: &'static str,
        key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Config {
            objective,
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn shape(
        what: &'static str,
        expected: impl std::fmt::Display,
        actual: impl std::fmt::Display,
    ) -> Self {
        Self::ShapeMismatch {
            what,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_names_key() {
        let err = ObjectiveError::config("count:poisson", "max_delta_step", "must be >= 0, got -1");
        let msg = err.to_string();
        assert!(msg.contains("max_delta_step"));
        assert!(msg.contains("count:poisson"));
    }

    #[test]
    fn unknown_objective_lists_names() {
        let err = ObjectiveError::UnknownObjective {
            name: "reg:nope".into(),
            known: vec!["binary:logistic".into(), "reg:squarederror".into()],
        };
        assert_eq!(
            err.to_string(),
            "unknown objective `reg:nope`, expected one of: binary:logistic, reg:squarederror"
        );
    }
}
