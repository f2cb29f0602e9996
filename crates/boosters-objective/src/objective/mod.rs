//! Objective (loss) functions for gradient boosting.
//!
//! An objective computes gradient pairs from margins, maps margins to its
//! natural output space, and may correct leaf values after a tree is grown.
//!
//! # Layout
//!
//! Predictions, labels and gradients are **example-major** `[n_rows, n_targets]`
//! arrays: all targets of one example are adjacent. Callers always pass raw
//! margins; the link function is applied inside the objective.
//!
//! # Weighted Training
//!
//! Both gradient and Hessian of a row are multiplied by its weight.
//! Rows without explicit weights have weight 1.0.
//!
//! # Available Objectives
//!
//! ## Regression
//! - [`SquaredError`] (`reg:squarederror`), [`SquaredLogError`] (`reg:squaredlogerror`)
//! - [`PseudoHuberError`] (`reg:pseudohubererror`)
//! - [`PoissonRegression`], [`GammaRegression`], [`TweedieRegression`]
//! - [`AbsoluteError`], [`QuantileError`]: leaf values refit after growing
//!
//! ## Classification
//! - [`LogisticRegression`] (`reg:logistic`, `binary:logistic`, `binary:logitraw`)
//! - [`HingeLoss`] (`binary:hinge`)
//! - [`SoftmaxMulticlass`] (`multi:softmax`, `multi:softprob`)
//!
//! ## Ranking
//! - [`LambdaRank`] (`rank:pairwise`, `rank:ndcg`, `rank:map`)

mod args;
mod multiclass;
mod quantile;
mod rank;
mod regression;

pub use args::Args;
pub use multiclass::SoftmaxMulticlass;
pub use quantile::{AbsoluteError, QuantileError};
pub use rank::{LambdaRank, RankMetric};
pub use regression::{
    GammaRegression, HingeLoss, LogisticKind, LogisticRegression, PoissonRegression,
    PseudoHuberError, SquaredError, SquaredLogError, TweedieRegression,
};

use std::fmt;

use ndarray::{Array2, ArrayView2, ArrayViewMut1, ArrayViewMut2, Zip};

use crate::context::Parallelism;
use crate::data::MetaInfo;
use crate::error::{ObjectiveError, Result};
use crate::gradients::{GradientBuffer, GradientPair};
use crate::task::ObjectiveTask;
use crate::tree::{NodeId, RegTree};

// =============================================================================
// Output Semantics
// =============================================================================

/// Semantic kind of values produced by a prediction transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionKind {
    /// Raw margin (identity link on a margin-space objective).
    Margin,
    /// Regression value.
    Value,
    /// Probability in (0, 1).
    Probability,
    /// Predicted class index.
    ClassIndex,
    /// Ranking score, only meaningful relative to its group.
    RankScore,
}

/// Evaluation metric an objective pairs with by default.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricKind {
    Rmse,
    Rmsle,
    /// Mean pseudo-Huber error.
    Mphe,
    Mae,
    LogLoss,
    Auc,
    /// Binary classification error rate.
    Error,
    PoissonNloglik,
    GammaNloglik,
    TweedieNloglik { rho: f32 },
    /// Pinball loss.
    Quantile,
    MulticlassLogLoss,
    Ndcg,
    Map,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rmse => f.write_str("rmse"),
            Self::Rmsle => f.write_str("rmsle"),
            Self::Mphe => f.write_str("mphe"),
            Self::Mae => f.write_str("mae"),
            Self::LogLoss => f.write_str("logloss"),
            Self::Auc => f.write_str("auc"),
            Self::Error => f.write_str("error"),
            Self::PoissonNloglik => f.write_str("poisson-nloglik"),
            Self::GammaNloglik => f.write_str("gamma-nloglik"),
            Self::TweedieNloglik { rho } => write!(f, "tweedie-nloglik@{rho}"),
            Self::Quantile => f.write_str("quantile"),
            Self::MulticlassLogLoss => f.write_str("mlogloss"),
            Self::Ndcg => f.write_str("ndcg"),
            Self::Map => f.write_str("map"),
        }
    }
}

// =============================================================================
// Objective Trait
// =============================================================================

/// An objective (loss) function for training gradient boosted trees.
///
/// Instances are created unconfigured by the
/// [`ObjectiveRegistry`](crate::ObjectiveRegistry); [`configure`](Self::configure)
/// must be called before training. Objectives with a required option return
/// [`ObjectiveError::NotConfigured`] until it is supplied.
///
/// Only [`name`](Self::name), [`configure`](Self::configure),
/// [`get_gradient`](Self::get_gradient), [`default_eval_metric`](Self::default_eval_metric)
/// and [`task`](Self::task) are required; every other method has a default
/// that suits most objectives.
pub trait ObjectiveFunction: Send + Sync + fmt::Debug {
    /// Registered identifier, e.g. `"binary:logistic"`.
    fn name(&self) -> &'static str;

    /// Apply recognised options. Unknown keys are ignored.
    ///
    /// Calling again with an empty map is a no-op. Options named in a later
    /// call overwrite earlier values; reconfiguring while a training run is
    /// in progress is not supported.
    fn configure(&mut self, args: &Args) -> Result<()>;

    /// Compute gradient pairs at the current margins.
    ///
    /// `predictions` is `[n_rows, n_targets]` with `n_targets == self.targets(info)`.
    /// `out` is resized to the same shape and fully overwritten. On error
    /// nothing is guaranteed about `out`.
    fn get_gradient(
        &self,
        predictions: ArrayView2<'_, f32>,
        info: &MetaInfo,
        iteration: usize,
        out: &mut GradientBuffer,
    ) -> Result<()>;

    /// Metric used when the user names none.
    fn default_eval_metric(&self) -> MetricKind;

    /// Map margins to the natural output space, in place.
    ///
    /// Safe on empty input. Saturates instead of overflowing.
    fn pred_transform(&self, _predictions: ArrayViewMut2<'_, f32>) -> PredictionKind {
        PredictionKind::Value
    }

    /// Transform applied before evaluation. Delegates to
    /// [`pred_transform`](Self::pred_transform) unless overridden.
    fn eval_transform(&self, predictions: ArrayViewMut2<'_, f32>) -> PredictionKind {
        self.pred_transform(predictions)
    }

    /// Map a user supplied base score from output space to margin space.
    fn prob_to_margin(&self, base_score: f32) -> Result<f32> {
        Ok(base_score)
    }

    /// Task descriptor. Constant after configuration.
    fn task(&self) -> ObjectiveTask;

    /// Number of model outputs for this label matrix.
    ///
    /// Defaults to 1 and rejects multi-column labels; multi-target support is
    /// opt-in per objective.
    fn targets(&self, info: &MetaInfo) -> Result<usize> {
        single_target(self.name(), info)
    }

    /// Recompute leaf values of a freshly grown tree from the rows routed to
    /// each leaf.
    ///
    /// `position[i]` is the leaf of row `i`, `None` if the row was not used
    /// to grow the tree. `predictions` are transformed predictions before
    /// this tree is added, and `target` is the output the tree belongs to.
    /// Only leaf values change; leaves without local rows keep their value.
    fn update_tree_leaf(
        &self,
        _position: &[Option<NodeId>],
        _info: &MetaInfo,
        _predictions: ArrayView2<'_, f32>,
        _target: usize,
        _tree: &mut RegTree,
    ) -> Result<()> {
        Ok(())
    }

    /// Initial margin per target, used as the base score.
    ///
    /// Defaults to one Newton step from zero margins.
    fn init_estimation(&self, info: &MetaInfo) -> Result<Vec<f32>> {
        newton_init(self, info)
    }
}

// =============================================================================
// Shared Helpers
// =============================================================================

/// Numerical floor for Hessians of losses that need a Newton step.
pub(crate) const HESS_EPS: f32 = 1e-16;

/// Margins are clamped to this magnitude before `exp`.
pub(crate) const MAX_EXP: f32 = 88.0;

/// Output probabilities are kept within `[PROB_EPS, 1 - PROB_EPS]`.
pub(crate) const PROB_EPS: f32 = 1e-7;

pub(crate) fn single_target(objective: &'static str, info: &MetaInfo) -> Result<usize> {
    match info.require_label_cols()? {
        1 => Ok(1),
        n_targets => Err(ObjectiveError::UnsupportedTargets {
            objective,
            n_targets,
        }),
    }
}

/// Sigmoid without overflow for large magnitudes.
#[inline]
pub(crate) fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// `exp` with the argument clamped to `±MAX_EXP`.
#[inline]
pub(crate) fn safe_exp(x: f32) -> f32 {
    x.clamp(-MAX_EXP, MAX_EXP).exp()
}

/// Apply softmax in place to one row of logits.
#[inline]
pub(crate) fn softmax_inplace(mut row: ArrayViewMut1<'_, f32>) {
    if row.is_empty() {
        return;
    }

    // Subtract the max for numerical stability
    let max_val = row.fold(f32::NEG_INFINITY, |m, &x| m.max(x));
    row.mapv_inplace(|x| (x - max_val).exp());

    let sum = row.sum();
    if sum > 0.0 {
        row.mapv_inplace(|x| x / sum);
    }
}

/// Apply `f` element-wise, in parallel when allowed.
pub(crate) fn map_inplace<F>(parallelism: Parallelism, mut values: ArrayViewMut2<'_, f32>, f: F)
where
    F: Fn(f32) -> f32 + Sync + Send,
{
    if parallelism.is_parallel() {
        values.par_mapv_inplace(f);
    } else {
        values.mapv_inplace(f);
    }
}

/// Valid label range for an objective.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LabelDomain {
    pub check: fn(f32) -> bool,
    pub expected: &'static str,
}

impl LabelDomain {
    pub const ANY: Self = Self {
        check: f32::is_finite,
        expected: "a finite value",
    };
    pub const UNIT_INTERVAL: Self = Self {
        check: |y| (0.0..=1.0).contains(&y),
        expected: "a value in [0, 1]",
    };
    pub const NON_NEGATIVE: Self = Self {
        check: |y| y >= 0.0 && y.is_finite(),
        expected: "a finite value >= 0",
    };
    pub const POSITIVE: Self = Self {
        check: |y| y > 0.0 && y.is_finite(),
        expected: "a finite value > 0",
    };
}

/// Reject the first label outside `domain`.
pub(crate) fn validate_labels(
    objective: &'static str,
    labels: ArrayView2<'_, f32>,
    domain: LabelDomain,
) -> Result<()> {
    let n_cols = labels.ncols().max(1);
    match labels.iter().position(|&y| !(domain.check)(y)) {
        Some(pos) => {
            let index = pos / n_cols;
            Err(ObjectiveError::InvalidLabel {
                objective,
                index,
                value: labels[[index, pos % n_cols]],
                expected: domain.expected,
            })
        }
        None => Ok(()),
    }
}

/// Check predictions against `[info.n_rows(), n_targets]`.
pub(crate) fn check_prediction_shape(
    info: &MetaInfo,
    predictions: ArrayView2<'_, f32>,
    n_targets: usize,
) -> Result<()> {
    info.check_predictions(predictions)?;
    if predictions.ncols() != n_targets {
        return Err(ObjectiveError::shape(
            "prediction columns",
            n_targets,
            predictions.ncols(),
        ));
    }
    Ok(())
}

/// Element-wise gradient for losses where each (row, target) depends only on
/// its own margin and label. Labels and predictions share their shape.
///
/// `kernel(margin, label)` returns the unweighted pair; the row weight is
/// applied here and the weighted pair saturates at `±f32::MAX`.
pub(crate) fn pointwise_gradient<F>(
    parallelism: Parallelism,
    predictions: ArrayView2<'_, f32>,
    info: &MetaInfo,
    out: &mut GradientBuffer,
    kernel: F,
) where
    F: Fn(f32, f32) -> GradientPair + Sync + Send,
{
    let (n_rows, n_targets) = predictions.dim();
    debug_assert_eq!(info.labels().dim(), (n_rows, n_targets));
    out.resize(n_rows, n_targets);

    let labels = info.labels();
    let mut pairs = out.view_mut();
    let zip = Zip::indexed(&mut pairs).and(&predictions).and(&labels);
    let body = |(row, _): (usize, usize), g: &mut GradientPair, &p: &f32, &y: &f32| {
        *g = kernel(p, y).weighted(info.weight(row)).saturated();
    };

    if parallelism.is_parallel() {
        zip.par_for_each(body);
    } else {
        zip.for_each(body);
    }
}

/// One Newton step from zero margins: `-Σg / Σh` per target.
pub(crate) fn newton_init<O>(objective: &O, info: &MetaInfo) -> Result<Vec<f32>>
where
    O: ObjectiveFunction + ?Sized,
{
    let n_targets = objective.targets(info)?;
    if info.n_rows() == 0 {
        return Ok(vec![0.0; n_targets]);
    }

    let zeros = Array2::<f32>::zeros((info.n_rows(), n_targets));
    let mut gpair = GradientBuffer::new(info.n_rows(), n_targets);
    objective.get_gradient(zeros.view(), info, 0, &mut gpair)?;

    Ok((0..n_targets)
        .map(|t| {
            let (sum_g, sum_h) = gpair
                .target(t)
                .iter()
                .fold((0.0f64, 0.0f64), |(g, h), p| (g + p.grad as f64, h + p.hess as f64));
            if sum_h > 0.0 {
                (-sum_g / sum_h) as f32
            } else {
                0.0
            }
        })
        .collect())
}

/// Compute the weighted quantile of a slice using a step function.
///
/// No interpolation: returns the value at which the cumulative weight, in
/// ascending value order, first reaches `alpha * total_weight`. Ties in value
/// keep input order. Returns `NaN` for empty input.
pub(crate) fn weighted_quantile(
    values: &[f32],
    weights: Option<&[f32]>,
    alpha: f32,
    scratch: &mut Vec<usize>,
) -> f32 {
    let n = values.len();
    if n == 0 {
        return f32::NAN;
    }
    if n == 1 {
        return values[0];
    }

    scratch.clear();
    scratch.extend(0..n);
    scratch.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let total_weight: f64 = match weights {
        Some(w) => w.iter().map(|&x| x as f64).sum(),
        None => n as f64,
    };
    let threshold = total_weight * alpha as f64;

    let mut cumulative = 0.0f64;
    for &idx in scratch.iter() {
        cumulative += weights.map_or(1.0, |w| w[idx] as f64);
        if cumulative >= threshold {
            return values[idx];
        }
    }

    values[scratch[n - 1]]
}

// =============================================================================
// Tests
// =============================================================================
