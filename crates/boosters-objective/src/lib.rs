//! boosters-objective: objective functions for gradient boosted trees.
//!
//! An objective turns the current model margins into per-example gradient
//! pairs for the tree grower, maps raw margins to the objective's natural
//! output space, and optionally corrects leaf values after a tree is grown.
//!
//! # Key Types
//!
//! - [`ObjectiveFunction`] - The objective capability set
//! - [`ObjectiveRegistry`] - Name to factory lookup (`"reg:squarederror"`, ...)
//! - [`GradientPair`] / [`GradientBuffer`] - Gradient storage
//! - [`MetaInfo`] - Labels, weights, groups consumed by objectives
//! - [`RegTree`] - Leaf-value slots written by leaf updates
//!
//! # Example
//!
//! ```
//! use boosters_objective::{Args, Context, GradientBuffer, MetaInfo, ObjectiveRegistry};
//! use ndarray::array;
//!
//! let registry = ObjectiveRegistry::builtin();
//! let mut obj = registry.create("reg:squarederror", &Context::default()).unwrap();
//! obj.configure(&Args::new()).unwrap();
//!
//! let info = MetaInfo::new(array![[1.0f32], [2.0], [3.0]]);
//! let preds = array![[0.0f32], [0.0], [0.0]];
//! let mut gpair = GradientBuffer::default();
//! obj.get_gradient(preds.view(), &info, 0, &mut gpair).unwrap();
//!
//! assert_eq!(gpair.get(0, 0).grad, -1.0);
//! assert_eq!(gpair.get(2, 0).hess, 1.0);
//! ```

// Re-export approx traits for users who want to compare gradients
pub use approx;

pub mod context;
pub mod data;
pub mod error;
pub mod gradients;
pub mod objective;
pub mod registry;
pub mod task;
pub mod tree;

// =============================================================================
// Convenience Re-exports
// =============================================================================

pub use context::{Context, Parallelism};
pub use data::MetaInfo;
pub use error::{ObjectiveError, Result};
pub use gradients::{GradientBuffer, GradientPair};
pub use objective::{Args, MetricKind, ObjectiveFunction, PredictionKind};
pub use registry::{ObjectiveFactory, ObjectiveRegistry};
pub use task::{ObjectiveTask, TaskKind};
pub use tree::{NodeId, RegTree, TreeBuilder};
