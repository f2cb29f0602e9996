//! Behaviour shared by every registered objective, plus end-to-end scenarios.

use approx::assert_abs_diff_eq;
use boosters_objective::{
    Args, Context, GradientBuffer, GradientPair, MetaInfo, ObjectiveError, ObjectiveFunction,
    ObjectiveRegistry, PredictionKind,
};
use ndarray::{array, Array2};
use rstest::rstest;

// =============================================================================
// Helpers
// =============================================================================

const N_ROWS: usize = 6;

/// Labels valid for `name`: binary relevance, except where the loss needs
/// strictly positive values.
fn labels_for(name: &str) -> Vec<f32> {
    let base = [1.0f32, 0.0, 1.0, 1.0, 0.0, 1.0];
    match name {
        "reg:gamma" => base.iter().map(|y| y + 0.5).collect(),
        _ => base.to_vec(),
    }
}

fn configured(name: &str) -> Box<dyn ObjectiveFunction> {
    let registry = ObjectiveRegistry::builtin();
    let mut obj = registry.create(name, &Context::default()).unwrap();
    obj.configure(&Args::from([("num_class", "2"), ("max_depth", "6")]))
        .unwrap();
    obj
}

/// Deterministic spread of margins in `[-0.8, 0.8]`.
fn margins(n_rows: usize, n_targets: usize) -> Array2<f32> {
    Array2::from_shape_fn((n_rows, n_targets), |(i, t)| {
        ((i * 7 + t * 3) % 5) as f32 * 0.4 - 0.8
    })
}

// =============================================================================
// Shared Contract
// =============================================================================

#[rstest]
#[case("reg:squarederror")]
#[case("reg:squaredlogerror")]
#[case("reg:pseudohubererror")]
#[case("reg:absoluteerror")]
#[case("reg:quantileerror")]
#[case("reg:logistic")]
#[case("binary:logistic")]
#[case("binary:logitraw")]
#[case("binary:hinge")]
#[case("count:poisson")]
#[case("reg:gamma")]
#[case("reg:tweedie")]
#[case("multi:softmax")]
#[case("multi:softprob")]
#[case("rank:pairwise")]
#[case("rank:ndcg")]
#[case("rank:map")]
fn gradients_cover_predictions(#[case] name: &str, #[values(1.0, 1e6)] scale: f32) {
    let obj = configured(name);
    let info = MetaInfo::from_labels(&labels_for(name))
        .with_weights(array![1.0, 2.0, 0.5, 1.0, 1.0, 3.0])
        .unwrap();
    let n_targets = obj.targets(&info).unwrap();
    // Large scales push log-link losses past exp overflow
    let preds = margins(N_ROWS, n_targets) * scale;

    let mut out = GradientBuffer::default();
    obj.get_gradient(preds.view(), &info, 0, &mut out).unwrap();

    assert_eq!(out.len(), preds.len());
    assert_eq!((out.n_rows(), out.n_targets()), preds.dim());
    for row in 0..N_ROWS {
        for t in 0..n_targets {
            let pair = out.get(row, t);
            assert!(pair.is_finite(), "{name}: non-finite pair {pair:?} at ({row}, {t})");
            assert!(pair.hess >= 0.0, "{name}: negative hessian at ({row}, {t})");
        }
    }

    // Buffer from a previous round is reused
    obj.get_gradient(preds.view(), &info, 1, &mut out).unwrap();
    assert_eq!(out.len(), preds.len());
}

#[rstest]
#[case("reg:squarederror")]
#[case("reg:absoluteerror")]
#[case("reg:quantileerror")]
#[case("binary:logistic")]
#[case("binary:hinge")]
#[case("count:poisson")]
#[case("reg:tweedie")]
#[case("multi:softmax")]
#[case("multi:softprob")]
#[case("rank:ndcg")]
fn transforms_are_finite_and_empty_safe(#[case] name: &str) {
    let obj = configured(name);
    let info = MetaInfo::from_labels(&labels_for(name));
    let n_targets = obj.targets(&info).unwrap();

    let mut preds = margins(N_ROWS, n_targets);
    obj.pred_transform(preds.view_mut());
    assert!(preds.iter().all(|p| p.is_finite()), "{name}");

    let mut preds = margins(N_ROWS, n_targets);
    obj.eval_transform(preds.view_mut());
    assert!(preds.iter().all(|p| p.is_finite()), "{name}");

    let mut empty = Array2::<f32>::zeros((0, n_targets));
    obj.pred_transform(empty.view_mut());
    obj.eval_transform(empty.view_mut());
}

#[rstest]
#[case("reg:squarederror", "rmse")]
#[case("reg:squaredlogerror", "rmsle")]
#[case("reg:pseudohubererror", "mphe")]
#[case("reg:absoluteerror", "mae")]
#[case("reg:quantileerror", "quantile")]
#[case("reg:logistic", "rmse")]
#[case("binary:logistic", "logloss")]
#[case("binary:logitraw", "auc")]
#[case("binary:hinge", "error")]
#[case("count:poisson", "poisson-nloglik")]
#[case("reg:gamma", "gamma-nloglik")]
#[case("reg:tweedie", "tweedie-nloglik@1.5")]
#[case("multi:softmax", "mlogloss")]
#[case("multi:softprob", "mlogloss")]
#[case("rank:pairwise", "map")]
#[case("rank:ndcg", "ndcg")]
#[case("rank:map", "map")]
fn default_metric_before_any_data(#[case] name: &str, #[case] metric: &str) {
    let registry = ObjectiveRegistry::builtin();
    let obj = registry.create(name, &Context::default()).unwrap();
    assert_eq!(obj.default_eval_metric().to_string(), metric);
}

#[rstest]
#[case("reg:squarederror", Some(2))]
#[case("reg:squaredlogerror", Some(2))]
#[case("reg:pseudohubererror", Some(2))]
#[case("reg:absoluteerror", Some(2))]
#[case("reg:quantileerror", Some(2))]
#[case("binary:logistic", Some(2))]
#[case("binary:hinge", None)]
#[case("count:poisson", None)]
#[case("reg:gamma", None)]
#[case("reg:tweedie", None)]
#[case("multi:softprob", None)]
#[case("rank:pairwise", None)]
fn multi_column_labels_are_opt_in(#[case] name: &str, #[case] expected: Option<usize>) {
    let obj = configured(name);
    let single = MetaInfo::new(array![[1.0f32], [2.0]]);
    let double = MetaInfo::new(array![[1.0f32, 1.0], [1.0, 1.0]]);

    let n_single = obj.targets(&single).unwrap();
    assert_eq!(n_single, if name == "multi:softprob" { 2 } else { 1 });

    match expected {
        Some(n) => assert_eq!(obj.targets(&double).unwrap(), n),
        None => {
            let err = obj.targets(&double).unwrap_err();
            assert_eq!(
                err,
                ObjectiveError::UnsupportedTargets {
                    objective: obj.name(),
                    n_targets: 2
                }
            );
            assert!(err.to_string().contains(name));
        }
    }
}

#[rstest]
#[case("reg:squarederror")]
#[case("binary:logistic")]
#[case("count:poisson")]
#[case("multi:softprob")]
#[case("rank:pairwise")]
fn empty_reconfigure_is_noop(#[case] name: &str) {
    let mut obj = configured(name);
    let before = format!("{obj:?}");
    obj.configure(&Args::new()).unwrap();
    assert_eq!(format!("{obj:?}"), before);
}

#[rstest]
#[case("reg:pseudohubererror", "huber_slope", "-1")]
#[case("binary:logistic", "scale_pos_weight", "0")]
#[case("count:poisson", "max_delta_step", "nope")]
#[case("reg:tweedie", "tweedie_variance_power", "2.5")]
#[case("reg:absoluteerror", "learning_rate", "0")]
#[case("reg:quantileerror", "quantile_alpha", "[0.5, 0]")]
#[case("multi:softmax", "num_class", "-3")]
#[case("rank:ndcg", "lambdarank_sigma", "inf")]
fn configuration_errors_name_the_key(#[case] name: &str, #[case] key: &str, #[case] value: &str) {
    let registry = ObjectiveRegistry::builtin();
    let mut obj = registry.create(name, &Context::default()).unwrap();
    let err = obj.configure(&Args::from([(key, value)])).unwrap_err();

    assert!(matches!(err, ObjectiveError::Config { key: ref k, .. } if k == key), "{err}");
    assert!(err.to_string().contains(key));
}

// =============================================================================
// End-to-end Scenarios
// =============================================================================

#[test]
fn squared_error_scenario() {
    let registry = ObjectiveRegistry::builtin();
    let mut obj = registry
        .create("reg:squarederror", &Context::default())
        .unwrap();
    obj.configure(&Args::new()).unwrap();

    let info = MetaInfo::from_labels(&[1.0, 2.0, 3.0])
        .with_weights(array![1.0, 1.0, 1.0])
        .unwrap();
    let mut preds = Array2::<f32>::zeros((3, 1));
    let mut gpair = GradientBuffer::default();
    obj.get_gradient(preds.view(), &info, 0, &mut gpair).unwrap();

    assert_eq!(gpair.target_grads(0), vec![-1.0, -2.0, -3.0]);
    assert_eq!(gpair.target_hess(0), vec![1.0, 1.0, 1.0]);

    assert_eq!(obj.pred_transform(preds.view_mut()), PredictionKind::Value);
    assert_eq!(preds, Array2::<f32>::zeros((3, 1)));
    assert!(obj.task().const_hess);
}

#[test]
fn logistic_scenario() {
    let registry = ObjectiveRegistry::builtin();
    let mut obj = registry.create("binary:logistic", &Context::default()).unwrap();
    obj.configure(&Args::new()).unwrap();

    let info = MetaInfo::from_labels(&[1.0]);
    let mut preds = array![[0.0f32]];
    let mut gpair = GradientBuffer::default();
    obj.get_gradient(preds.view(), &info, 0, &mut gpair).unwrap();

    assert_abs_diff_eq!(gpair.get(0, 0), GradientPair::new(-0.5, 0.25), epsilon = 1e-7);

    assert_eq!(obj.pred_transform(preds.view_mut()), PredictionKind::Probability);
    assert_abs_diff_eq!(preds[[0, 0]], 0.5);
}

#[test]
fn registry_scenario() {
    let registry = ObjectiveRegistry::builtin();
    let ctx = Context::default();

    let err = registry.create("reg:nonexistent", &ctx).unwrap_err();
    match &err {
        ObjectiveError::UnknownObjective { name, known } => {
            assert_eq!(name, "reg:nonexistent");
            assert!(known.iter().any(|k| k == "reg:squarederror"));
            assert_eq!(known.len(), registry.len());
        }
        other => panic!("unexpected error: {other}"),
    }

    let mut a = registry.create("binary:logistic", &ctx).unwrap();
    let mut b = registry.create("binary:logistic", &ctx).unwrap();
    a.configure(&Args::from([("scale_pos_weight", "4")])).unwrap();
    b.configure(&Args::from([("scale_pos_weight", "2")])).unwrap();

    let info = MetaInfo::from_labels(&[1.0]);
    let preds = array![[0.0f32]];
    let (mut ga, mut gb) = (GradientBuffer::default(), GradientBuffer::default());
    a.get_gradient(preds.view(), &info, 0, &mut ga).unwrap();
    b.get_gradient(preds.view(), &info, 0, &mut gb).unwrap();

    assert_abs_diff_eq!(ga.get(0, 0).grad, -2.0);
    assert_abs_diff_eq!(gb.get(0, 0).grad, -1.0);
}

#[test]
fn custom_objective_registration() {
    let mut registry = ObjectiveRegistry::builtin();
    registry
        .register("custom:l2", "Squared error under another name.", |ctx| {
            Box::new(boosters_objective::objective::SquaredError::new(ctx))
        })
        .unwrap();
    assert!(registry.contains("custom:l2"));

    let err = registry
        .register("custom:l2", "", |ctx| {
            Box::new(boosters_objective::objective::HingeLoss::new(ctx))
        })
        .unwrap_err();
    assert_eq!(err, ObjectiveError::DuplicateObjective("custom:l2".into()));
}

#[test]
fn args_from_json_config() {
    let args: Args =
        serde_json::from_str(r#"{"scale_pos_weight": "3", "eval_metric": "auc"}"#).unwrap();
    assert_eq!(args.len(), 2);

    let registry = ObjectiveRegistry::builtin();
    let mut obj = registry.create("binary:logistic", &Context::default()).unwrap();
    obj.configure(&args).unwrap();

    let info = MetaInfo::from_labels(&[1.0]);
    let mut gpair = GradientBuffer::default();
    obj.get_gradient(array![[0.0f32]].view(), &info, 0, &mut gpair)
        .unwrap();
    assert_abs_diff_eq!(gpair.get(0, 0).grad, -1.5);

    assert_eq!(serde_json::to_value(&args).unwrap()["eval_metric"], "auc");
}

#[test]
fn shape_mismatch_is_fatal() {
    let obj = configured("reg:squarederror");
    let info = MetaInfo::from_labels(&[1.0, 2.0, 3.0]);
    let mut gpair = GradientBuffer::default();

    let err = obj
        .get_gradient(Array2::<f32>::zeros((2, 1)).view(), &info, 0, &mut gpair)
        .unwrap_err();
    assert!(matches!(err, ObjectiveError::ShapeMismatch { .. }));
}

#[rstest]
#[case("reg:squarederror")]
#[case("reg:absoluteerror")]
#[case("reg:quantileerror")]
#[case("binary:logistic")]
#[case("multi:softprob")]
#[case("rank:ndcg")]
fn labels_without_columns_are_rejected(#[case] name: &str) {
    let obj = configured(name);
    let info = MetaInfo::new(Array2::zeros((2, 0)));

    let err = obj.targets(&info).unwrap_err();
    assert!(matches!(err, ObjectiveError::ShapeMismatch { what: "label columns", .. }));

    let mut gpair = GradientBuffer::default();
    let err = obj
        .get_gradient(Array2::<f32>::zeros((2, 1)).view(), &info, 0, &mut gpair)
        .unwrap_err();
    assert!(matches!(err, ObjectiveError::ShapeMismatch { .. }), "{name}: {err}");
}

#[test]
fn base_score_round_trip() {
    let info = MetaInfo::from_labels(&[1.0, 1.0, 0.0, 1.0]);
    let obj = configured("binary:logistic");

    let base = obj.init_estimation(&info).unwrap();
    let mut margin = array![[base[0]]];
    obj.pred_transform(margin.view_mut());
    // One Newton step from zero moves towards the positive rate
    assert!(margin[[0, 0]] > 0.5);

    let m = obj.prob_to_margin(0.75).unwrap();
    assert_abs_diff_eq!(m, 3.0f32.ln(), epsilon = 1e-6);
}
