//! Softmax cross-entropy for multiclass classification.

use ndarray::{ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2, Zip};

use super::{check_prediction_shape, softmax_inplace, Args, MetricKind, ObjectiveFunction};
use super::{PredictionKind, HESS_EPS, PROB_EPS};
use crate::context::Context;
use crate::data::MetaInfo;
use crate::error::{ObjectiveError, Result};
use crate::gradients::{GradientBuffer, GradientPair};
use crate::task::{ObjectiveTask, TaskKind};

/// Gradient pairs of one row from its logits.
fn softmax_row_gradient(
    info: &MetaInfo,
    row: usize,
    mut grads: ArrayViewMut1<'_, GradientPair>,
    logits: ArrayView1<'_, f32>,
) {
    let label = info.label(row, 0) as usize;
    let w = info.weight(row);

    let max_logit = logits.fold(f32::NEG_INFINITY, |m, &x| m.max(x));
    let exp_sum: f32 = logits.iter().map(|&x| (x - max_logit).exp()).sum();

    for (k, (g, &x)) in grads.iter_mut().zip(logits.iter()).enumerate() {
        let p = (x - max_logit).exp() / exp_sum;
        let indicator = if k == label { 1.0 } else { 0.0 };
        *g = GradientPair::new(p - indicator, (2.0 * p * (1.0 - p)).max(HESS_EPS)).weighted(w);
    }
}

/// Overwrite a row of logits with the index of its largest entry.
fn argmax_row(mut row: ArrayViewMut1<'_, f32>) {
    let mut best = 0usize;
    for (k, &x) in row.iter().enumerate() {
        if x > row[best] {
            best = k;
        }
    }
    row.fill(best as f32);
}

/// Softmax cross-entropy loss (`multi:softmax`, `multi:softprob`).
///
/// Labels are class indices `0..num_class` stored as `f32` in a single label
/// column. The model has `num_class` outputs per row, holding raw logits.
///
/// - Gradient: `p_k - 1[k == label]`
/// - Hessian: `2 * p_k * (1 - p_k)`, floored to stay positive
///
/// `multi:softprob` predicts the class probabilities. `multi:softmax` predicts
/// the arg-max class, written to every output of the row; its evaluation
/// transform still yields probabilities.
#[derive(Debug, Clone)]
pub struct SoftmaxMulticlass {
    ctx: Context,
    num_class: Option<usize>,
    output_prob: bool,
}

impl SoftmaxMulticlass {
    pub const SOFTMAX: &'static str = "multi:softmax";
    pub const SOFTPROB: &'static str = "multi:softprob";

    /// Unconfigured objective; `num_class` must be set through `configure`.
    pub fn new(ctx: &Context, output_prob: bool) -> Self {
        Self {
            ctx: *ctx,
            num_class: None,
            output_prob,
        }
    }

    /// Configured objective with a known class count.
    pub fn with_classes(ctx: &Context, num_class: usize, output_prob: bool) -> Self {
        assert!(num_class >= 1, "num_class must be >= 1");
        Self {
            ctx: *ctx,
            num_class: Some(num_class),
            output_prob,
        }
    }

    pub fn num_class(&self) -> Option<usize> {
        self.num_class
    }

    fn require_classes(&self) -> Result<usize> {
        self.num_class.ok_or(ObjectiveError::NotConfigured {
            objective: self.name(),
            key: "num_class",
        })
    }

    fn validate_class_labels(&self, info: &MetaInfo, n_classes: usize) -> Result<()> {
        let bad = info
            .label_col(0)
            .iter()
            .position(|&y| !(y >= 0.0 && y.fract() == 0.0 && (y as usize) < n_classes));
        match bad {
            Some(index) => Err(ObjectiveError::InvalidLabel {
                objective: self.name(),
                index,
                value: info.label(index, 0),
                expected: "an integer class index in [0, num_class)",
            }),
            None => Ok(()),
        }
    }

    fn softmax_rows(&self, mut predictions: ArrayViewMut2<'_, f32>) {
        let zip = Zip::from(predictions.rows_mut());
        if self.ctx.parallelism().is_parallel() {
            zip.par_for_each(softmax_inplace);
        } else {
            zip.for_each(softmax_inplace);
        }
    }
}

impl ObjectiveFunction for SoftmaxMulticlass {
    fn name(&self) -> &'static str {
        if self.output_prob {
            Self::SOFTPROB
        } else {
            Self::SOFTMAX
        }
    }

    fn configure(&mut self, args: &Args) -> Result<()> {
        if let Some(n) = args.parse::<usize>(self.name(), "num_class")? {
            if n == 0 {
                return Err(ObjectiveError::config(self.name(), "num_class", "must be >= 1, got 0"));
            }
            self.num_class = Some(n);
        }
        args.log_ignored(self.name(), &["num_class"]);
        Ok(())
    }

    fn get_gradient(
        &self,
        predictions: ArrayView2<'_, f32>,
        info: &MetaInfo,
        _iteration: usize,
        out: &mut GradientBuffer,
    ) -> Result<()> {
        let n_classes = self.targets(info)?;
        check_prediction_shape(info, predictions, n_classes)?;
        self.validate_class_labels(info, n_classes)?;

        out.resize(info.n_rows(), n_classes);
        let mut pairs = out.view_mut();
        let zip = Zip::indexed(pairs.rows_mut()).and(predictions.rows());
        let body = |row, grads, logits| softmax_row_gradient(info, row, grads, logits);

        if self.ctx.parallelism().is_parallel() {
            zip.par_for_each(body);
        } else {
            zip.for_each(body);
        }
        Ok(())
    }

    fn default_eval_metric(&self) -> MetricKind {
        MetricKind::MulticlassLogLoss
    }

    fn pred_transform(&self, mut predictions: ArrayViewMut2<'_, f32>) -> PredictionKind {
        if self.output_prob {
            self.softmax_rows(predictions);
            return PredictionKind::Probability;
        }

        let zip = Zip::from(predictions.rows_mut());
        if self.ctx.parallelism().is_parallel() {
            zip.par_for_each(argmax_row);
        } else {
            zip.for_each(argmax_row);
        }
        PredictionKind::ClassIndex
    }

    fn eval_transform(&self, predictions: ArrayViewMut2<'_, f32>) -> PredictionKind {
        self.softmax_rows(predictions);
        PredictionKind::Probability
    }

    fn task(&self) -> ObjectiveTask {
        ObjectiveTask::new(TaskKind::MulticlassClassification {
            n_classes: self.num_class.unwrap_or(0),
        })
        .with_output_transform()
    }

    fn targets(&self, info: &MetaInfo) -> Result<usize> {
        let n_classes = self.require_classes()?;
        if info.require_label_cols()? > 1 {
            return Err(ObjectiveError::UnsupportedTargets {
                objective: self.name(),
                n_targets: info.n_label_cols(),
            });
        }
        Ok(n_classes)
    }

    /// Log of the weighted class frequencies.
    fn init_estimation(&self, info: &MetaInfo) -> Result<Vec<f32>> {
        let n_classes = self.targets(info)?;
        if info.n_rows() == 0 {
            return Ok(vec![0.0; n_classes]);
        }
        self.validate_class_labels(info, n_classes)?;

        let mut class_weights = vec![0.0f64; n_classes];
        let mut total = 0.0f64;
        for (row, w) in info.weights_iter().enumerate() {
            class_weights[info.label(row, 0) as usize] += w as f64;
            total += w as f64;
        }
        if total <= 0.0 {
            return Ok(vec![0.0; n_classes]);
        }
        Ok(class_weights
            .into_iter()
            .map(|cw| ((cw / total) as f32).max(PROB_EPS).ln())
            .collect())
    }
}
