//! Point-wise regression and binary classification objectives.
//!
//! Every objective here computes the gradient of a (row, target) from its own
//! margin and label only, so rows are processed in parallel.

use ndarray::{ArrayView2, ArrayViewMut2};

use super::{
    check_prediction_shape, map_inplace, pointwise_gradient, safe_exp, sigmoid, validate_labels,
    Args, LabelDomain, MetricKind, ObjectiveFunction, PredictionKind, HESS_EPS, MAX_EXP, PROB_EPS,
};
use crate::context::Context;
use crate::data::MetaInfo;
use crate::error::{ObjectiveError, Result};
use crate::gradients::{GradientBuffer, GradientPair};
use crate::task::{ObjectiveTask, TaskKind};

/// One target per label column.
fn label_targets(info: &MetaInfo) -> Result<usize> {
    info.require_label_cols()
}

/// `ln(base_score)` for log-link objectives.
fn log_margin(objective: &'static str, base_score: f32) -> Result<f32> {
    if base_score > 0.0 && base_score.is_finite() {
        Ok(base_score.ln())
    } else {
        Err(ObjectiveError::InvalidBaseScore {
            objective,
            value: base_score,
            expected: "a finite value > 0",
        })
    }
}

// =============================================================================
// Squared Error
// =============================================================================

/// Squared error loss (L2) for regression.
///
/// - Loss: `0.5 * (pred - label)²`
/// - Gradient: `pred - label`
/// - Hessian: `1.0`
///
/// Supports one target per label column.
#[derive(Debug, Clone, Default)]
pub struct SquaredError {
    ctx: Context,
}

impl SquaredError {
    pub const NAME: &'static str = "reg:squarederror";

    pub fn new(ctx: &Context) -> Self {
        Self { ctx: *ctx }
    }
}

impl ObjectiveFunction for SquaredError {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn configure(&mut self, args: &Args) -> Result<()> {
        args.log_ignored(Self::NAME, &[]);
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

        pointwise_gradient(self.ctx.parallelism(), predictions, info, out, |p, y| {
            GradientPair::new(p - y, 1.0)
        });
        Ok(())
    }

    fn default_eval_metric(&self) -> MetricKind {
        MetricKind::Rmse
    }

    fn task(&self) -> ObjectiveTask {
        ObjectiveTask::new(TaskKind::Regression).with_const_hess()
    }

    fn targets(&self, info: &MetaInfo) -> Result<usize> {
        label_targets(info)
    }
}

// =============================================================================
// Squared Log Error
// =============================================================================

/// Squared log error: `0.5 * (ln(1 + pred) - ln(1 + label))²`.
///
/// Labels must be greater than -1; margins are clamped above -1.
#[derive(Debug, Clone, Default)]
pub struct SquaredLogError {
    ctx: Context,
}

impl SquaredLogError {
    pub const NAME: &'static str = "reg:squaredlogerror";

    const LABEL_DOMAIN: LabelDomain = LabelDomain {
        check: |y| y > -1.0 && y.is_finite(),
        expected: "a finite value > -1",
    };

    pub fn new(ctx: &Context) -> Self {
        Self { ctx: *ctx }
    }
}

impl ObjectiveFunction for SquaredLogError {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn configure(&mut self, args: &Args) -> Result<()> {
        args.log_ignored(Self::NAME, &[]);
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
        validate_labels(Self::NAME, info.labels(), Self::LABEL_DOMAIN)?;

        pointwise_gradient(self.ctx.parallelism(), predictions, info, out, |p, y| {
            let p = p.max(-1.0 + 1e-6);
            let diff = p.ln_1p() - y.ln_1p();
            let grad = diff / (p + 1.0);
            let hess = ((1.0 - diff) / ((p + 1.0) * (p + 1.0))).max(1e-6);
            GradientPair::new(grad, hess)
        });
        Ok(())
    }

    fn default_eval_metric(&self) -> MetricKind {
        MetricKind::Rmsle
    }

    fn task(&self) -> ObjectiveTask {
        ObjectiveTask::new(TaskKind::Regression)
    }

    fn targets(&self, info: &MetaInfo) -> Result<usize> {
        label_targets(info)
    }
}

// =============================================================================
// Pseudo-Huber Error
// =============================================================================

/// Pseudo-Huber loss for robust regression.
///
/// A smooth approximation to Huber loss with slope `δ` (`huber_slope`):
/// - Loss: `δ² * (sqrt(1 + (r/δ)²) - 1)`
/// - Gradient: `r / sqrt(1 + (r/δ)²)`
/// - Hessian: `1 / (1 + (r/δ)²)^1.5`
#[derive(Debug, Clone)]
pub struct PseudoHuberError {
    ctx: Context,
    pub huber_slope: f32,
}

impl Default for PseudoHuberError {
    fn default() -> Self {
        Self::new(&Context::default())
    }
}

impl PseudoHuberError {
    pub const NAME: &'static str = "reg:pseudohubererror";

    pub fn new(ctx: &Context) -> Self {
        Self {
            ctx: *ctx,
            huber_slope: 1.0,
        }
    }
}

impl ObjectiveFunction for PseudoHuberError {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn configure(&mut self, args: &Args) -> Result<()> {
        if let Some(slope) = args.parse_f32_checked(Self::NAME, "huber_slope", |v| v > 0.0, "> 0")? {
            self.huber_slope = slope;
        }
        args.log_ignored(Self::NAME, &["huber_slope"]);
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

        let inv_slope_sq = 1.0 / (self.huber_slope * self.huber_slope);
        pointwise_gradient(self.ctx.parallelism(), predictions, info, out, |p, y| {
            let residual = p - y;
            let factor = 1.0 + residual * residual * inv_slope_sq;
            let sqrt_factor = factor.sqrt();
            GradientPair::new(residual / sqrt_factor, (1.0 / (factor * sqrt_factor)).max(HESS_EPS))
        });
        Ok(())
    }

    fn default_eval_metric(&self) -> MetricKind {
        MetricKind::Mphe
    }

    fn task(&self) -> ObjectiveTask {
        ObjectiveTask::new(TaskKind::Regression)
    }

    fn targets(&self, info: &MetaInfo) -> Result<usize> {
        label_targets(info)
    }
}

// =============================================================================
// Logistic Regression
// =============================================================================

/// Which flavour of logistic loss is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogisticKind {
    /// `reg:logistic`: probability regression, evaluated with RMSE.
    Regression,
    /// `binary:logistic`: outputs probabilities.
    Binary,
    /// `binary:logitraw`: outputs raw log-odds.
    BinaryRaw,
}

/// Logistic loss (binary cross-entropy) on log-odds margins.
///
/// Labels must be in `[0, 1]`.
/// - Gradient: `σ(pred) - label`
/// - Hessian: `σ(pred) * (1 - σ(pred))`, floored to stay positive
///
/// Gradients of rows with label 1 are scaled by `scale_pos_weight`.
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    ctx: Context,
    kind: LogisticKind,
    pub scale_pos_weight: f32,
}

impl LogisticRegression {
    pub fn new(ctx: &Context, kind: LogisticKind) -> Self {
        Self {
            ctx: *ctx,
            kind,
            scale_pos_weight: 1.0,
        }
    }

    pub fn kind(&self) -> LogisticKind {
        self.kind
    }
}

impl ObjectiveFunction for LogisticRegression {
    fn name(&self) -> &'static str {
        match self.kind {
            LogisticKind::Regression => "reg:logistic",
            LogisticKind::Binary => "binary:logistic",
            LogisticKind::BinaryRaw => "binary:logitraw",
        }
    }

    fn configure(&mut self, args: &Args) -> Result<()> {
        if let Some(w) =
            args.parse_f32_checked(self.name(), "scale_pos_weight", |v| v > 0.0, "> 0")?
        {
            self.scale_pos_weight = w;
        }
        args.log_ignored(self.name(), &["scale_pos_weight"]);
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
        validate_labels(self.name(), info.labels(), LabelDomain::UNIT_INTERVAL)?;

        let scale_pos_weight = self.scale_pos_weight;
        pointwise_gradient(self.ctx.parallelism(), predictions, info, out, |margin, y| {
            let p = sigmoid(margin);
            let pair = GradientPair::new(p - y, (p * (1.0 - p)).max(HESS_EPS));
            if y == 1.0 {
                pair.weighted(scale_pos_weight)
            } else {
                pair
            }
        });
        Ok(())
    }

    fn default_eval_metric(&self) -> MetricKind {
        match self.kind {
            LogisticKind::Regression => MetricKind::Rmse,
            LogisticKind::Binary => MetricKind::LogLoss,
            LogisticKind::BinaryRaw => MetricKind::Auc,
        }
    }

    fn pred_transform(&self, predictions: ArrayViewMut2<'_, f32>) -> PredictionKind {
        match self.kind {
            LogisticKind::BinaryRaw => PredictionKind::Margin,
            LogisticKind::Regression | LogisticKind::Binary => {
                map_inplace(self.ctx.parallelism(), predictions, |x| {
                    sigmoid(x).clamp(PROB_EPS, 1.0 - PROB_EPS)
                });
                PredictionKind::Probability
            }
        }
    }

    fn prob_to_margin(&self, base_score: f32) -> Result<f32> {
        if base_score > 0.0 && base_score < 1.0 {
            Ok((base_score / (1.0 - base_score)).ln())
        } else {
            Err(ObjectiveError::InvalidBaseScore {
                objective: self.name(),
                value: base_score,
                expected: "a probability in (0, 1)",
            })
        }
    }

    fn task(&self) -> ObjectiveTask {
        let kind = match self.kind {
            LogisticKind::Regression => TaskKind::Regression,
            LogisticKind::Binary | LogisticKind::BinaryRaw => TaskKind::BinaryClassification,
        };
        let task = ObjectiveTask::new(kind);
        match self.kind {
            LogisticKind::BinaryRaw => task,
            _ => task.with_output_transform(),
        }
    }

    fn targets(&self, info: &MetaInfo) -> Result<usize> {
        label_targets(info)
    }
}

// =============================================================================
// Hinge Loss
// =============================================================================

/// Hinge loss for SVM-style binary classification.
///
/// Labels in `{0, 1}` are mapped to `{-1, +1}`.
/// - Loss: `max(0, 1 - y * pred)`
/// - Gradient: `-y` if `y * pred < 1`, else `0`
/// - Hessian: `1` inside the margin, `f32::MIN_POSITIVE` outside
///
/// Predictions are the class (`0` or `1`) on the margin side.
#[derive(Debug, Clone, Default)]
pub struct HingeLoss {
    ctx: Context,
}

impl HingeLoss {
    pub const NAME: &'static str = "binary:hinge";

    pub fn new(ctx: &Context) -> Self {
        Self { ctx: *ctx }
    }
}

impl ObjectiveFunction for HingeLoss {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn configure(&mut self, args: &Args) -> Result<()> {
        args.log_ignored(Self::NAME, &[]);
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
        validate_labels(Self::NAME, info.labels(), LabelDomain::UNIT_INTERVAL)?;

        pointwise_gradient(self.ctx.parallelism(), predictions, info, out, |p, label| {
            let y = if label > 0.5 { 1.0 } else { -1.0 };
            if p * y < 1.0 {
                GradientPair::new(-y, 1.0)
            } else {
                GradientPair::new(0.0, f32::MIN_POSITIVE)
            }
        });
        Ok(())
    }

    fn default_eval_metric(&self) -> MetricKind {
        MetricKind::Error
    }

    fn pred_transform(&self, predictions: ArrayViewMut2<'_, f32>) -> PredictionKind {
        map_inplace(self.ctx.parallelism(), predictions, |x| {
            if x > 0.0 {
                1.0
            } else {
                0.0
            }
        });
        PredictionKind::ClassIndex
    }

    fn task(&self) -> ObjectiveTask {
        ObjectiveTask::new(TaskKind::BinaryClassification).with_output_transform()
    }
}

// =============================================================================
// Poisson Regression
// =============================================================================

/// Poisson regression for count data, margins in log space.
///
/// - Gradient: `exp(pred) - label`
/// - Hessian: `exp(pred + max_delta_step)`
///
/// `max_delta_step` (default 0.7) inflates the Hessian, which bounds the
/// Newton step and keeps early rounds stable.
#[derive(Debug, Clone)]
pub struct PoissonRegression {
    ctx: Context,
    pub max_delta_step: f32,
}

impl Default for PoissonRegression {
    fn default() -> Self {
        Self::new(&Context::default())
    }
}

impl PoissonRegression {
    pub const NAME: &'static str = "count:poisson";

    pub fn new(ctx: &Context) -> Self {
        Self {
            ctx: *ctx,
            max_delta_step: 0.7,
        }
    }
}

impl ObjectiveFunction for PoissonRegression {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn configure(&mut self, args: &Args) -> Result<()> {
        if let Some(step) =
            args.parse_f32_checked(Self::NAME, "max_delta_step", |v| v >= 0.0, ">= 0")?
        {
            self.max_delta_step = step;
        }
        args.log_ignored(Self::NAME, &["max_delta_step"]);
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
        validate_labels(Self::NAME, info.labels(), LabelDomain::NON_NEGATIVE)?;

        let max_delta_step = self.max_delta_step;
        pointwise_gradient(self.ctx.parallelism(), predictions, info, out, |p, y| {
            let p = p.clamp(-MAX_EXP, MAX_EXP);
            GradientPair::new(
                p.exp() - y,
                safe_exp(p + max_delta_step).max(HESS_EPS),
            )
        });
        Ok(())
    }

    fn default_eval_metric(&self) -> MetricKind {
        MetricKind::PoissonNloglik
    }

    fn pred_transform(&self, predictions: ArrayViewMut2<'_, f32>) -> PredictionKind {
        map_inplace(self.ctx.parallelism(), predictions, safe_exp);
        PredictionKind::Value
    }

    fn prob_to_margin(&self, base_score: f32) -> Result<f32> {
        log_margin(Self::NAME, base_score)
    }

    fn task(&self) -> ObjectiveTask {
        ObjectiveTask::new(TaskKind::Regression).with_output_transform()
    }
}

// =============================================================================
// Gamma Regression
// =============================================================================

/// Gamma regression with log link. Labels must be positive.
///
/// - Gradient: `1 - label / exp(pred)`
/// - Hessian: `label / exp(pred)`
#[derive(Debug, Clone, Default)]
pub struct GammaRegression {
    ctx: Context,
}

impl GammaRegression {
    pub const NAME: &'static str = "reg:gamma";

    pub fn new(ctx: &Context) -> Self {
        Self { ctx: *ctx }
    }
}

impl ObjectiveFunction for GammaRegression {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn configure(&mut self, args: &Args) -> Result<()> {
        args.log_ignored(Self::NAME, &[]);
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
        validate_labels(Self::NAME, info.labels(), LabelDomain::POSITIVE)?;

        pointwise_gradient(self.ctx.parallelism(), predictions, info, out, |p, y| {
            let ratio = y * safe_exp(-p);
            GradientPair::new(1.0 - ratio, ratio.max(HESS_EPS))
        });
        Ok(())
    }

    fn default_eval_metric(&self) -> MetricKind {
        MetricKind::GammaNloglik
    }

    fn pred_transform(&self, predictions: ArrayViewMut2<'_, f32>) -> PredictionKind {
        map_inplace(self.ctx.parallelism(), predictions, safe_exp);
        PredictionKind::Value
    }

    fn prob_to_margin(&self, base_score: f32) -> Result<f32> {
        log_margin(Self::NAME, base_score)
    }

    fn task(&self) -> ObjectiveTask {
        ObjectiveTask::new(TaskKind::Regression).with_output_transform()
    }
}

// =============================================================================
// Tweedie Regression
// =============================================================================

/// Tweedie regression with log link and variance power `ρ ∈ [1, 2)`.
///
/// - Gradient: `-label * exp((1-ρ) pred) + exp((2-ρ) pred)`
/// - Hessian: `-label (1-ρ) exp((1-ρ) pred) + (2-ρ) exp((2-ρ) pred)`
#[derive(Debug, Clone)]
pub struct TweedieRegression {
    ctx: Context,
    pub variance_power: f32,
}

impl Default for TweedieRegression {
    fn default() -> Self {
        Self::new(&Context::default())
    }
}

impl TweedieRegression {
    pub const NAME: &'static str = "reg:tweedie";

    pub fn new(ctx: &Context) -> Self {
        Self {
            ctx: *ctx,
            variance_power: 1.5,
        }
    }
}

impl ObjectiveFunction for TweedieRegression {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn configure(&mut self, args: &Args) -> Result<()> {
        if let Some(rho) = args.parse_f32_checked(
            Self::NAME,
            "tweedie_variance_power",
            |v| (1.0..2.0).contains(&v),
            "in [1, 2)",
        )? {
            self.variance_power = rho;
        }
        args.log_ignored(Self::NAME, &["tweedie_variance_power"]);
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
        validate_labels(Self::NAME, info.labels(), LabelDomain::NON_NEGATIVE)?;

        let rho = self.variance_power;
        pointwise_gradient(self.ctx.parallelism(), predictions, info, out, |p, y| {
            let a = safe_exp((1.0 - rho) * p);
            let b = safe_exp((2.0 - rho) * p);
            GradientPair::new(-y * a + b, (-y * (1.0 - rho) * a + (2.0 - rho) * b).max(HESS_EPS))
        });
        Ok(())
    }

    fn default_eval_metric(&self) -> MetricKind {
        MetricKind::TweedieNloglik {
            rho: self.variance_power,
        }
    }

    fn pred_transform(&self, predictions: ArrayViewMut2<'_, f32>) -> PredictionKind {
        map_inplace(self.ctx.parallelism(), predictions, safe_exp);
        PredictionKind::Value
    }

    fn prob_to_margin(&self, base_score: f32) -> Result<f32> {
        log_margin(Self::NAME, base_score)
    }

    fn task(&self) -> ObjectiveTask {
        ObjectiveTask::new(TaskKind::Regression).with_output_transform()
    }
}

// =============================================================================
// Tests
// =============================================================================
