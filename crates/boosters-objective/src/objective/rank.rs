//! LambdaMART ranking objectives.
//!
//! Gradients are computed per query group: each pair of documents with
//! different relevance contributes a RankNet lambda, scaled by how much the
//! target metric would change if the pair swapped positions.

use std::cmp::Ordering;

use ndarray::{ArrayView2, ArrayViewMut2};

use super::{check_prediction_shape, validate_labels, Args, LabelDomain, MetricKind};
use super::{ObjectiveFunction, PredictionKind, HESS_EPS};
use crate::context::Context;
use crate::data::MetaInfo;
use crate::error::Result;
use crate::gradients::{GradientBuffer, GradientPair};
use crate::task::{ObjectiveTask, TaskKind};

/// Metric whose change weights each document pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankMetric {
    /// Plain RankNet: every pair has weight 1.
    Pairwise,
    /// `|ΔNDCG|` with exponential gain `2^label - 1`.
    Ndcg,
    /// `|ΔMAP|` with binary relevance (`label > 0`).
    Map,
}

impl RankMetric {
    pub fn objective_name(self) -> &'static str {
        match self {
            Self::Pairwise => "rank:pairwise",
            Self::Ndcg => "rank:ndcg",
            Self::Map => "rank:map",
        }
    }

    fn label_domain(self) -> LabelDomain {
        match self {
            Self::Pairwise => LabelDomain::ANY,
            Self::Ndcg => LabelDomain {
                check: |y| (0.0..=31.0).contains(&y),
                expected: "a relevance degree in [0, 31]",
            },
            Self::Map => LabelDomain::NON_NEGATIVE,
        }
    }
}

/// LambdaMART objective for learning to rank.
///
/// Rows of a query group are `group_ptr[g]..group_ptr[g + 1]` of the
/// [`MetaInfo`]; without groups the whole dataset is one query.
///
/// For a pair `(i, j)` with `label_i > label_j` and score difference `s_ij`:
/// - `λ = -σ (1 - sigmoid(σ s_ij)) Δ`
/// - `h = σ² sigmoid(σ s_ij) (1 - sigmoid(σ s_ij)) Δ`
///
/// where `Δ` comes from [`RankMetric`]. `λ` is added to `i` and subtracted
/// from `j`; `h` is added to both. The pair is weighted by the weight of the
/// more relevant row.
#[derive(Debug, Clone)]
pub struct LambdaRank {
    ctx: Context,
    metric: RankMetric,
    /// Sigmoid steepness (`lambdarank_sigma`).
    pub sigma: f32,
    /// When non-zero, gradients of a group are scaled by
    /// `fix_list_weight / group_size`.
    pub fix_list_weight: f32,
}

impl LambdaRank {
    pub fn new(ctx: &Context, metric: RankMetric) -> Self {
        Self {
            ctx: *ctx,
            metric,
            sigma: 1.0,
            fix_list_weight: 0.0,
        }
    }

    pub fn metric(&self) -> RankMetric {
        self.metric
    }

    /// Gradient pairs of one query group, in row order.
    fn group_gradient(&self, preds: &[f32], labels: &[f32], weights: &[f32]) -> Vec<GradientPair> {
        let n = preds.len();
        let mut grad = vec![0.0f64; n];
        let mut hess = vec![0.0f64; n];

        if n >= 2 {
            // Current ranking; ties keep row order
            let mut order: Vec<usize> = (0..n).collect();
            order.sort_by(|&a, &b| preds[b].partial_cmp(&preds[a]).unwrap_or(Ordering::Equal));

            let delta = PairDelta::new(self.metric, &order, labels);
            let sigma = self.sigma as f64;

            for (pos_i, &i) in order.iter().enumerate() {
                for (pos_j, &j) in order.iter().enumerate() {
                    if labels[i] <= labels[j] {
                        continue;
                    }
                    let d = delta.get(pos_i, pos_j, labels[i], labels[j]);
                    if d == 0.0 {
                        continue;
                    }

                    let s_ij = (preds[i] - preds[j]) as f64;
                    let p = sigmoid64(sigma * s_ij);
                    let w = weights[i] as f64;

                    let lambda = w * -sigma * (1.0 - p) * d;
                    let h = w * sigma * sigma * p * (1.0 - p) * d;
                    grad[i] += lambda;
                    grad[j] -= lambda;
                    hess[i] += h;
                    hess[j] += h;
                }
            }
        }

        let scale = if self.fix_list_weight != 0.0 && n > 0 {
            self.fix_list_weight as f64 / n as f64
        } else {
            1.0
        };
        grad.iter()
            .zip(&hess)
            .map(|(&g, &h)| GradientPair::new((g * scale) as f32, ((h * scale) as f32).max(HESS_EPS)))
            .collect()
    }
}

#[inline]
fn sigmoid64(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

#[inline]
fn gain(label: f32) -> f64 {
    2.0f64.powf(label as f64) - 1.0
}

#[inline]
fn discount(pos: usize) -> f64 {
    1.0 / (2.0 + pos as f64).log2()
}

/// Running average-precision terms at each ranked position.
#[derive(Debug, Clone, Copy, Default)]
struct MapStats {
    /// Σ hits/(k+1) over relevant positions up to here.
    ap_acc: f64,
    /// Same, had one relevant document above been removed.
    ap_acc_miss: f64,
    /// Same, had one relevant document been inserted above.
    ap_acc_add: f64,
    hits: f64,
}

/// Per-group metric change for swapping two ranked positions.
enum PairDelta {
    Unit,
    Ndcg { idcg: f64 },
    Map { stats: Vec<MapStats>, relevant: Vec<bool> },
}

impl PairDelta {
    fn new(metric: RankMetric, order: &[usize], labels: &[f32]) -> Self {
        match metric {
            RankMetric::Pairwise => Self::Unit,
            RankMetric::Ndcg => {
                let mut ideal = labels.to_vec();
                ideal.sort_by(|a, b| b.partial_cmp(a).unwrap_or(Ordering::Equal));
                let idcg = ideal
                    .iter()
                    .enumerate()
                    .map(|(pos, &y)| gain(y) * discount(pos))
                    .sum();
                Self::Ndcg { idcg }
            }
            RankMetric::Map => {
                let relevant: Vec<bool> = order.iter().map(|&r| labels[r] > 0.0).collect();
                let mut acc = MapStats::default();
                let stats = relevant
                    .iter()
                    .enumerate()
                    .map(|(k, &rel)| {
                        if rel {
                            acc.hits += 1.0;
                            let rank = (k + 1) as f64;
                            acc.ap_acc += acc.hits / rank;
                            acc.ap_acc_miss += (acc.hits - 1.0) / rank;
                            acc.ap_acc_add += (acc.hits + 1.0) / rank;
                        }
                        acc
                    })
                    .collect();
                Self::Map { stats, relevant }
            }
        }
    }

    /// `pos_i`/`pos_j` are ranked positions of the more/less relevant row.
    fn get(&self, pos_i: usize, pos_j: usize, label_i: f32, label_j: f32) -> f64 {
        match self {
            Self::Unit => 1.0,
            Self::Ndcg { idcg } => {
                if *idcg <= 0.0 {
                    return 0.0;
                }
                ((gain(label_i) - gain(label_j)) * (discount(pos_i) - discount(pos_j)) / idcg).abs()
            }
            Self::Map { stats, relevant } => map_delta(stats, relevant, pos_i, pos_j),
        }
    }
}

/// `|ΔAP|` when the documents at two ranked positions swap.
fn map_delta(stats: &[MapStats], relevant: &[bool], a: usize, b: usize) -> f64 {
    let total_hits = stats.last().map_or(0.0, |s| s.hits);
    if a == b || total_hits == 0.0 || relevant[a] == relevant[b] {
        return 0.0;
    }
    let (lo, hi) = if a < b { (a, b) } else { (b, a) };

    let mut original = stats[hi].ap_acc;
    if lo > 0 {
        original -= stats[lo - 1].ap_acc;
    }

    let changed = if relevant[hi] {
        // Relevant document moves up to `lo`
        stats[hi - 1].ap_acc_add - stats[lo].ap_acc_add + (stats[lo].hits + 1.0) / (lo + 1) as f64
    } else {
        // Relevant document moves down to `hi`
        stats[hi - 1].ap_acc_miss - stats[lo].ap_acc_miss + stats[hi].hits / (hi + 1) as f64
    };
    ((changed - original) / total_hits).abs()
}

impl ObjectiveFunction for LambdaRank {
    fn name(&self) -> &'static str {
        self.metric.objective_name()
    }

    fn configure(&mut self, args: &Args) -> Result<()> {
        let sigma = args.parse_f32_checked(self.name(), "lambdarank_sigma", |v| v > 0.0, "> 0")?;
        let list_weight =
            args.parse_f32_checked(self.name(), "fix_list_weight", |v| v >= 0.0, ">= 0")?;

        if let Some(sigma) = sigma {
            self.sigma = sigma;
        }
        if let Some(w) = list_weight {
            self.fix_list_weight = w;
        }
        args.log_ignored(self.name(), &["lambdarank_sigma", "fix_list_weight"]);
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
        validate_labels(self.name(), info.labels(), self.metric.label_domain())?;

        let n_rows = info.n_rows();
        let whole = [0, n_rows];
        let group_ptr = info.group_ptr().unwrap_or(&whole);
        let n_groups = group_ptr.len().saturating_sub(1);

        let preds: Vec<f32> = predictions.column(0).to_vec();
        let labels: Vec<f32> = info.label_col(0).to_vec();
        let weights: Vec<f32> = info.weights_iter().collect();

        let per_group = self.ctx.parallelism().maybe_par_map(0..n_groups, |g| {
            let rows = group_ptr[g]..group_ptr[g + 1];
            self.group_gradient(&preds[rows.clone()], &labels[rows.clone()], &weights[rows])
        });

        out.resize(n_rows, 1);
        for (g, pairs) in per_group.into_iter().enumerate() {
            for (offset, pair) in pairs.into_iter().enumerate() {
                out.set(group_ptr[g] + offset, 0, pair);
            }
        }
        Ok(())
    }

    fn default_eval_metric(&self) -> MetricKind {
        match self.metric {
            RankMetric::Pairwise | RankMetric::Map => MetricKind::Map,
            RankMetric::Ndcg => MetricKind::Ndcg,
        }
    }

    fn pred_transform(&self, _predictions: ArrayViewMut2<'_, f32>) -> PredictionKind {
        PredictionKind::RankScore
    }

    fn task(&self) -> ObjectiveTask {
        ObjectiveTask::new(TaskKind::Ranking)
    }

    /// Scores are only compared within a group, so start at zero.
    fn init_estimation(&self, info: &MetaInfo) -> Result<Vec<f32>> {
        Ok(vec![0.0; self.targets(info)?])
    }
}
