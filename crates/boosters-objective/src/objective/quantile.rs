//! Absolute error and quantile (pinball) objectives.
//!
//! Both losses have a piecewise-constant gradient, so Newton steps from the
//! tree grower are only a direction. After a tree is grown, each leaf value is
//! replaced by the weighted α-quantile of the residuals of its rows, scaled by
//! the learning rate.

use ndarray::{ArrayView2, Zip};

use super::{check_prediction_shape, validate_labels, weighted_quantile, Args, LabelDomain};
use super::{MetricKind, ObjectiveFunction};
use crate::context::{Context, Parallelism};
use crate::data::MetaInfo;
use crate::error::{ObjectiveError, Result};
use crate::gradients::{GradientBuffer, GradientPair};
use crate::task::{ObjectiveTask, TaskKind};
use crate::tree::{NodeId, RegTree};

const DEFAULT_LEARNING_RATE: f32 = 0.3;

/// `learning_rate`, falling back to its `eta` alias.
fn parse_learning_rate(objective: &'static str, args: &Args) -> Result<Option<f32>> {
    let key = if args.contains("learning_rate") {
        "learning_rate"
    } else {
        "eta"
    };
    args.parse_f32_checked(objective, key, |v| v > 0.0, "> 0")
}

/// Sign with `sign(0) = 0`.
#[inline]
fn sign(x: f32) -> f32 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Where one output of the model reads its labels and quantile level.
#[derive(Debug, Clone, Copy)]
struct TargetSlot {
    label_col: usize,
    alpha: f32,
}

/// Gradient of the pinball loss at level `alpha`, written for every target.
///
/// `slot(t)` maps output column `t` to its label column and level.
fn pinball_gradient<S>(
    parallelism: Parallelism,
    predictions: ArrayView2<'_, f32>,
    info: &MetaInfo,
    out: &mut GradientBuffer,
    slot: S,
) where
    S: Fn(usize) -> TargetSlot + Sync + Send,
{
    let (n_rows, n_targets) = predictions.dim();
    out.resize(n_rows, n_targets);

    let mut pairs = out.view_mut();
    let zip = Zip::indexed(&mut pairs).and(&predictions);
    let body = |(row, t): (usize, usize), g: &mut GradientPair, &p: &f32| {
        let TargetSlot { label_col, alpha } = slot(t);
        let w = info.weight(row);
        let y = info.label(row, label_col);
        let grad = if p >= y { 1.0 - alpha } else { -alpha };
        *g = GradientPair::new(grad * w, w);
    };

    if parallelism.is_parallel() {
        zip.par_for_each(body);
    } else {
        zip.for_each(body);
    }
}

/// Weighted α-quantile of one label column. 0 for an empty dataset.
fn label_quantile(info: &MetaInfo, label_col: usize, alpha: f32) -> f32 {
    if info.n_rows() == 0 {
        return 0.0;
    }
    let labels = info.label_col(label_col).to_vec();
    let weights = info.weights().map(|w| w.to_vec());
    weighted_quantile(&labels, weights.as_deref(), alpha, &mut Vec::new())
}

/// Check leaf-update inputs against `[n_rows, n_targets]` and the target index.
fn check_refit_target(
    info: &MetaInfo,
    predictions: ArrayView2<'_, f32>,
    n_targets: usize,
    target: usize,
) -> Result<()> {
    check_prediction_shape(info, predictions, n_targets)?;
    if target >= n_targets {
        return Err(ObjectiveError::shape("target index", format!("< {n_targets}"), target));
    }
    Ok(())
}

/// Replace each leaf value with `learning_rate × q_alpha(label - prediction)`
/// over the rows assigned to that leaf.
///
/// Predictions and `target` must already be checked with
/// [`check_refit_target`]. Rows with `position[i] == None` are ignored.
/// Leaves without rows keep their current value.
#[allow(clippy::too_many_arguments)]
fn refit_leaves(
    objective: &'static str,
    parallelism: Parallelism,
    position: &[Option<NodeId>],
    info: &MetaInfo,
    predictions: ArrayView2<'_, f32>,
    target: usize,
    slot: TargetSlot,
    learning_rate: f32,
    tree: &mut RegTree,
) -> Result<()> {
    if position.len() != info.n_rows() {
        return Err(ObjectiveError::shape("leaf positions", info.n_rows(), position.len()));
    }

    // Bucket rows by leaf
    let mut rows_by_node: Vec<Vec<usize>> = vec![Vec::new(); tree.n_nodes()];
    for (row, node) in position.iter().enumerate() {
        if let Some(node) = *node {
            tree.check_leaf(node)?;
            rows_by_node[node as usize].push(row);
        }
    }

    let leaves: Vec<NodeId> = tree.leaves().collect();
    let weighted = info.has_weights();
    let new_values = parallelism.maybe_par_map(0..leaves.len(), |i| {
        let rows = &rows_by_node[leaves[i] as usize];
        if rows.is_empty() {
            return None;
        }
        let residuals: Vec<f32> = rows
            .iter()
            .map(|&r| info.label(r, slot.label_col) - predictions[[r, target]])
            .collect();
        let weights: Option<Vec<f32>> =
            weighted.then(|| rows.iter().map(|&r| info.weight(r)).collect());
        let q = weighted_quantile(&residuals, weights.as_deref(), slot.alpha, &mut Vec::new());
        Some(q * learning_rate)
    });

    for (&leaf, value) in leaves.iter().zip(new_values) {
        match value {
            Some(v) => {
                log::trace!("{objective}: leaf {leaf} -> {v}");
                tree.set_leaf_value(leaf, v)?;
            }
            None => log::debug!("{objective}: leaf {leaf} has no local rows, keeping value"),
        }
    }
    Ok(())
}

// =============================================================================
// Absolute Error
// =============================================================================

/// Absolute error loss (L1), `|pred - label|`.
///
/// - Gradient: `sign(pred - label)`
/// - Hessian: `1.0`
///
/// Leaf values are refit to the weighted median residual. Supports one target
/// per label column.
#[derive(Debug, Clone)]
pub struct AbsoluteError {
    ctx: Context,
    pub learning_rate: f32,
}

impl Default for AbsoluteError {
    fn default() -> Self {
        Self::new(&Context::default())
    }
}

impl AbsoluteError {
    pub const NAME: &'static str = "reg:absoluteerror";

    pub fn new(ctx: &Context) -> Self {
        Self {
            ctx: *ctx,
            learning_rate: DEFAULT_LEARNING_RATE,
        }
    }
}

impl ObjectiveFunction for AbsoluteError {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn configure(&mut self, args: &Args) -> Result<()> {
        if let Some(lr) = parse_learning_rate(Self::NAME, args)? {
            self.learning_rate = lr;
        }
        args.log_ignored(Self::NAME, &["learning_rate", "eta"]);
        Ok(())
    }

    fn get_gradient(
        &self,
        predictions: ArrayView2<'_, f32>,
        info: &MetaInfo,
        _iteration: usize,
        out: &mut GradientBuffer,
    ) -> Result<()> {
        check_prediction_shape(info, predictions, self.targets(info)?)?;
        validate_labels(Self::NAME, info.labels(), LabelDomain::ANY)?;

        super::pointwise_gradient(self.ctx.parallelism(), predictions, info, out, |p, y| {
            GradientPair::new(sign(p - y), 1.0)
        });
        Ok(())
    }

    fn default_eval_metric(&self) -> MetricKind {
        MetricKind::Mae
    }

    fn task(&self) -> ObjectiveTask {
        ObjectiveTask::new(TaskKind::Regression)
            .with_const_hess()
            .with_zero_hess()
    }

    fn targets(&self, info: &MetaInfo) -> Result<usize> {
        info.require_label_cols()
    }

    fn update_tree_leaf(
        &self,
        position: &[Option<NodeId>],
        info: &MetaInfo,
        predictions: ArrayView2<'_, f32>,
        target: usize,
        tree: &mut RegTree,
    ) -> Result<()> {
        check_refit_target(info, predictions, self.targets(info)?, target)?;
        let slot = TargetSlot {
            label_col: target,
            alpha: 0.5,
        };
        refit_leaves(
            Self::NAME,
            self.ctx.parallelism(),
            position,
            info,
            predictions,
            target,
            slot,
            self.learning_rate,
            tree,
        )
    }

    fn init_estimation(&self, info: &MetaInfo) -> Result<Vec<f32>> {
        let n_targets = self.targets(info)?;
        Ok((0..n_targets).map(|t| label_quantile(info, t, 0.5)).collect())
    }
}

// =============================================================================
// Quantile Error
// =============================================================================

/// Pinball loss for one or more quantile levels.
///
/// - Loss: `α * (label - pred)` if `pred < label`, else `(1 - α) * (pred - label)`
/// - Gradient: `-α` if `pred < label`, else `1 - α`
/// - Hessian: `1.0`
///
/// With `A` levels and `L` label columns the model has `A × L` outputs.
/// Output `t` fits level `alphas[t / L]` on label column `t % L`.
#[derive(Debug, Clone)]
pub struct QuantileError {
    ctx: Context,
    alphas: Vec<f32>,
    pub learning_rate: f32,
}

impl Default for QuantileError {
    fn default() -> Self {
        Self::new(&Context::default())
    }
}

impl QuantileError {
    pub const NAME: &'static str = "reg:quantileerror";

    pub fn new(ctx: &Context) -> Self {
        Self {
            ctx: *ctx,
            alphas: vec![0.5],
            learning_rate: DEFAULT_LEARNING_RATE,
        }
    }

    /// Configured quantile levels, in output order.
    pub fn alphas(&self) -> &[f32] {
        &self.alphas
    }

    fn slot(&self, n_label_cols: usize, target: usize) -> TargetSlot {
        let n_label_cols = n_label_cols.max(1);
        TargetSlot {
            label_col: target % n_label_cols,
            alpha: self.alphas[target / n_label_cols],
        }
    }
}

impl ObjectiveFunction for QuantileError {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn configure(&mut self, args: &Args) -> Result<()> {
        let alphas = args.parse_f32_list(Self::NAME, "quantile_alpha")?;
        if let Some(bad) = alphas.iter().flatten().find(|a| !(**a > 0.0 && **a < 1.0)) {
            return Err(ObjectiveError::config(
                Self::NAME,
                "quantile_alpha",
                format!("each level must be in (0, 1), got {bad}"),
            ));
        }
        let learning_rate = parse_learning_rate(Self::NAME, args)?;

        if let Some(alphas) = alphas {
            self.alphas = alphas;
        }
        if let Some(lr) = learning_rate {
            self.learning_rate = lr;
        }
        args.log_ignored(Self::NAME, &["quantile_alpha", "learning_rate", "eta"]);
        Ok(())
    }

    fn get_gradient(
        &self,
        predictions: ArrayView2<'_, f32>,
        info: &MetaInfo,
        _iteration: usize,
        out: &mut GradientBuffer,
    ) -> Result<()> {
        check_prediction_shape(info, predictions, self.targets(info)?)?;
        validate_labels(Self::NAME, info.labels(), LabelDomain::ANY)?;

        let n_label_cols = info.n_label_cols();
        pinball_gradient(self.ctx.parallelism(), predictions, info, out, |t| {
            self.slot(n_label_cols, t)
        });
        Ok(())
    }

    fn default_eval_metric(&self) -> MetricKind {
        MetricKind::Quantile
    }

    fn task(&self) -> ObjectiveTask {
        ObjectiveTask::new(TaskKind::Regression)
            .with_const_hess()
            .with_zero_hess()
    }

    fn targets(&self, info: &MetaInfo) -> Result<usize> {
        Ok(self.alphas.len() * info.require_label_cols()?)
    }

    fn update_tree_leaf(
        &self,
        position: &[Option<NodeId>],
        info: &MetaInfo,
        predictions: ArrayView2<'_, f32>,
        target: usize,
        tree: &mut RegTree,
    ) -> Result<()> {
        check_refit_target(info, predictions, self.targets(info)?, target)?;
        refit_leaves(
            Self::NAME,
            self.ctx.parallelism(),
            position,
            info,
            predictions,
            target,
            self.slot(info.n_label_cols(), target),
            self.learning_rate,
            tree,
        )
    }

    fn init_estimation(&self, info: &MetaInfo) -> Result<Vec<f32>> {
        let n_targets = self.targets(info)?;
        Ok((0..n_targets)
            .map(|t| {
                let slot = self.slot(info.n_label_cols(), t);
                label_quantile(info, slot.label_col, slot.alpha)
            })
            .collect())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TreeBuilder;
    use ndarray::{array, Array2};

    /// root: x0 < 0.5 ? leaf 1 : leaf 2
    fn two_leaf_tree() -> RegTree {
        let mut b = TreeBuilder::new();
        b.add_split(0, 0.5, true, 1, 2);
        b.add_leaf(0.1);
        b.add_leaf(0.2);
        b.build()
    }

    #[test]
    fn absolute_error_gradient_is_sign() {
        let obj = AbsoluteError::new(&Context::sequential());
        let info = MetaInfo::from_labels(&[1.0, 1.0, 1.0]);
        let mut out = GradientBuffer::default();
        obj.get_gradient(array![[2.0f32], [0.0], [1.0]].view(), &info, 0, &mut out)
            .unwrap();

        assert_eq!(out.target_grads(0), vec![1.0, -1.0, 0.0]);
        assert_eq!(out.target_hess(0), vec![1.0; 3]);
    }

    #[test]
    fn absolute_error_refits_leaves_to_median() {
        let mut obj = AbsoluteError::default();
        obj.configure(&Args::from([("learning_rate", "1.0")])).unwrap();

        let info = MetaInfo::from_labels(&[1.0, 2.0, 9.0, 10.0, 20.0]);
        let preds = Array2::<f32>::zeros((5, 1));
        let position = [Some(1), Some(1), Some(1), Some(2), Some(2)];
        let mut tree = two_leaf_tree();
        let before = tree.topology();

        obj.update_tree_leaf(&position, &info, preds.view(), 0, &mut tree)
            .unwrap();

        assert_eq!(tree.leaf_value(1), 2.0);
        assert_eq!(tree.leaf_value(2), 10.0);
        assert_eq!(tree.topology(), before);
    }

    #[test]
    fn learning_rate_scales_leaf_and_eta_alias() {
        let mut obj = AbsoluteError::default();
        obj.configure(&Args::from([("eta", "0.5")])).unwrap();
        assert_eq!(obj.learning_rate, 0.5);

        let info = MetaInfo::from_labels(&[4.0]);
        let mut tree = RegTree::stump(0.0);
        obj.update_tree_leaf(&[Some(0)], &info, array![[0.0f32]].view(), 0, &mut tree)
            .unwrap();
        assert_eq!(tree.leaf_value(0), 2.0);
    }

    #[test]
    fn empty_leaf_keeps_value() {
        let obj = AbsoluteError::default();
        let info = MetaInfo::from_labels(&[1.0, 2.0]);
        let mut tree = two_leaf_tree();

        obj.update_tree_leaf(&[Some(1), None], &info, array![[0.0f32], [0.0]].view(), 0, &mut tree)
            .unwrap();
        assert_eq!(tree.leaf_value(2), 0.2);
    }

    #[test]
    fn leaf_update_rejects_bad_positions() {
        let obj = AbsoluteError::default();
        let info = MetaInfo::from_labels(&[1.0, 2.0]);
        let preds = array![[0.0f32], [0.0]];
        let mut tree = two_leaf_tree();

        let err = obj
            .update_tree_leaf(&[Some(1)], &info, preds.view(), 0, &mut tree)
            .unwrap_err();
        assert!(matches!(err, ObjectiveError::ShapeMismatch { what: "leaf positions", .. }));

        let err = obj
            .update_tree_leaf(&[Some(0), Some(1)], &info, preds.view(), 0, &mut tree)
            .unwrap_err();
        assert!(matches!(err, ObjectiveError::InvalidLeaf { node: 0, .. }));
    }

    #[test]
    fn quantile_gradient_asymmetry() {
        let mut obj = QuantileError::new(&Context::sequential());
        obj.configure(&Args::from([("quantile_alpha", "0.9")])).unwrap();
        let info = MetaInfo::from_labels(&[1.0, 1.0]);
        let mut out = GradientBuffer::default();
        obj.get_gradient(array![[2.0f32], [0.0]].view(), &info, 0, &mut out)
            .unwrap();

        approx::assert_abs_diff_eq!(out.get(0, 0).grad, 0.1, epsilon = 1e-6);
        approx::assert_abs_diff_eq!(out.get(1, 0).grad, -0.9, epsilon = 1e-6);
    }

    #[test]
    fn multi_quantile_targets() {
        let mut obj = QuantileError::default();
        obj.configure(&Args::from([("quantile_alpha", "[0.1, 0.9]")])).unwrap();
        let info = MetaInfo::new(array![[1.0, 10.0], [2.0, 20.0]]);
        assert_eq!(obj.targets(&info).unwrap(), 4);

        // Output 3 is level 0.9 on label column 1
        let preds = Array2::<f32>::zeros((2, 4));
        let mut out = GradientBuffer::default();
        obj.get_gradient(preds.view(), &info, 0, &mut out).unwrap();
        approx::assert_abs_diff_eq!(out.get(0, 3).grad, -0.9, epsilon = 1e-6);
        approx::assert_abs_diff_eq!(out.get(0, 0).grad, -0.1, epsilon = 1e-6);

        assert!(obj
            .update_tree_leaf(&[None, None], &info, preds.view(), 4, &mut RegTree::stump(0.0))
            .is_err());
    }

    #[test]
    fn multi_quantile_leaf_update_reads_its_column_and_level() {
        let mut obj = QuantileError::default();
        obj.configure(&Args::from([("quantile_alpha", "[0.1, 0.9]"), ("learning_rate", "1")]))
            .unwrap();
        let info = MetaInfo::new(array![
            [1.0, 10.0],
            [2.0, 20.0],
            [3.0, 30.0],
            [4.0, 40.0],
            [5.0, 50.0]
        ]);
        // Only outputs 0 and 3 start at zero; the rest would skew the residuals
        let preds = Array2::from_shape_fn((5, 4), |(_, t)| if t == 0 || t == 3 { 0.0 } else { 100.0 });
        let position = [Some(0); 5];

        // Output 3: level 0.9 on label column 1
        let mut tree = RegTree::stump(0.0);
        obj.update_tree_leaf(&position, &info, preds.view(), 3, &mut tree)
            .unwrap();
        assert_eq!(tree.leaf_value(0), 50.0);

        // Output 0: level 0.1 on label column 0
        let mut tree = RegTree::stump(0.0);
        obj.update_tree_leaf(&position, &info, preds.view(), 0, &mut tree)
            .unwrap();
        assert_eq!(tree.leaf_value(0), 1.0);

        // Output 1: level 0.1 on label column 1, shifted by its predictions
        let mut tree = RegTree::stump(0.0);
        obj.update_tree_leaf(&position, &info, preds.view(), 1, &mut tree)
            .unwrap();
        assert_eq!(tree.leaf_value(0), -90.0);
    }

    #[test]
    fn absolute_error_leaf_update_checks_prediction_width() {
        let obj = AbsoluteError::default();
        let info = MetaInfo::from_labels(&[1.0, 2.0]);
        let preds = Array2::<f32>::zeros((2, 2));
        let mut tree = RegTree::stump(0.0);

        let err = obj
            .update_tree_leaf(&[Some(0), Some(0)], &info, preds.view(), 1, &mut tree)
            .unwrap_err();
        assert!(matches!(err, ObjectiveError::ShapeMismatch { what: "prediction columns", .. }));

        let err = obj
            .update_tree_leaf(&[Some(0), Some(0)], &info, array![[0.0f32], [0.0]].view(), 1, &mut tree)
            .unwrap_err();
        assert!(matches!(err, ObjectiveError::ShapeMismatch { what: "target index", .. }));
        assert_eq!(tree.leaf_value(0), 0.0);
    }

    #[test]
    fn quantile_rejects_bad_alpha() {
        let mut obj = QuantileError::default();
        let err = obj
            .configure(&Args::from([("quantile_alpha", "[0.5, 1.0]")]))
            .unwrap_err();
        assert!(matches!(err, ObjectiveError::Config { ref key, .. } if key == "quantile_alpha"));
        assert_eq!(obj.alphas(), &[0.5]);
    }

    #[test]
    fn failed_configure_leaves_options_untouched() {
        let mut obj = QuantileError::default();
        let err = obj
            .configure(&Args::from([("quantile_alpha", "[0.2, 0.8]"), ("learning_rate", "-1")]))
            .unwrap_err();
        assert!(matches!(err, ObjectiveError::Config { ref key, .. } if key == "learning_rate"));
        assert_eq!(obj.alphas(), &[0.5]);
        assert_eq!(obj.learning_rate, DEFAULT_LEARNING_RATE);
    }

    #[test]
    fn init_estimation_uses_label_quantile() {
        let info = MetaInfo::from_labels(&[1.0, 2.0, 3.0, 4.0, 100.0]);
        assert_eq!(AbsoluteError::default().init_estimation(&info).unwrap(), vec![3.0]);

        let mut obj = QuantileError::default();
        obj.configure(&Args::from([("quantile_alpha", "[0.2, 1e-3]")])).unwrap();
        assert_eq!(obj.init_estimation(&info).unwrap(), vec![1.0, 1.0]);
    }
}
