//! Task descriptor reported by objectives.
//!
//! The boosting loop uses [`ObjectiveTask`] to pick compatible tree growing
//! strategies, e.g. whether leaf values need a post-hoc update.

/// Type of machine learning task served by an objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskKind {
    /// Regression (continuous target).
    #[default]
    Regression,
    /// Binary classification (2 classes).
    BinaryClassification,
    /// Multi-class classification.
    MulticlassClassification {
        /// Number of classes.
        n_classes: usize,
    },
    /// Ranking task. Gradients depend on the order of rows within a group.
    Ranking,
    /// Anything else (custom objectives).
    Other,
}

impl TaskKind {
    /// Returns the number of output groups for this task.
    pub fn n_groups(&self) -> usize {
        match self {
            Self::MulticlassClassification { n_classes } => *n_classes,
            _ => 1,
        }
    }

    /// Returns true if this is a classification task.
    pub fn is_classification(&self) -> bool {
        matches!(
            self,
            Self::BinaryClassification | Self::MulticlassClassification { .. }
        )
    }
}

/// Immutable description of the task an objective serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ObjectiveTask {
    pub kind: TaskKind,
    /// The Hessian is constant (equal to the sample weight).
    pub const_hess: bool,
    /// The true Hessian is zero almost everywhere; leaf values are
    /// recomputed by `update_tree_leaf` after growing.
    pub zero_hess: bool,
    /// Predictions pass through a non-identity, monotone transform.
    pub transforms_output: bool,
}

impl ObjectiveTask {
    pub const fn new(kind: TaskKind) -> Self {
        Self {
            kind,
            const_hess: false,
            zero_hess: false,
            transforms_output: false,
        }
    }

    pub const fn with_const_hess(mut self) -> Self {
        self.const_hess = true;
        self
    }

    pub const fn with_zero_hess(mut self) -> Self {
        self.zero_hess = true;
        self
    }

    pub const fn with_output_transform(mut self) -> Self {
        self.transforms_output = true;
        self
    }

    /// Ranking objectives compare rows within a group.
    pub fn is_order_dependent(&self) -> bool {
        matches!(self.kind, TaskKind::Ranking)
    }

    /// Whether the boosting loop should call `update_tree_leaf`.
    pub fn updates_leaves(&self) -> bool {
        self.zero_hess
    }
}
