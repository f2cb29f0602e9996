//! Name-keyed construction of objectives.
//!
//! The registry is an explicit value built once at startup (usually with
//! [`ObjectiveRegistry::builtin`]) and passed by reference; there is no global
//! state. Custom objectives are added with [`ObjectiveRegistry::register`].

use std::collections::BTreeMap;
use std::fmt;

use crate::context::Context;
use crate::error::{ObjectiveError, Result};
use crate::objective::{
    AbsoluteError, GammaRegression, HingeLoss, LambdaRank, LogisticKind, LogisticRegression,
    ObjectiveFunction, PoissonRegression, PseudoHuberError, QuantileError, RankMetric,
    SoftmaxMulticlass, SquaredError, SquaredLogError, TweedieRegression,
};

/// Creates a fresh, unconfigured objective.
pub type ObjectiveFactory = Box<dyn Fn(&Context) -> Box<dyn ObjectiveFunction> + Send + Sync>;

struct Entry {
    description: &'static str,
    factory: ObjectiveFactory,
}

/// Map from objective name to factory.
///
/// # Example
///
/// ```
/// use boosters_objective::{Context, ObjectiveError, ObjectiveRegistry};
///
/// let registry = ObjectiveRegistry::builtin();
/// let obj = registry.create("binary:logistic", &Context::default()).unwrap();
/// assert_eq!(obj.name(), "binary:logistic");
///
/// let err = registry.create("no:such", &Context::default()).unwrap_err();
/// assert!(matches!(err, ObjectiveError::UnknownObjective { .. }));
/// ```
#[derive(Default)]
pub struct ObjectiveRegistry {
    entries: BTreeMap<String, Entry>,
}

impl fmt::Debug for ObjectiveRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectiveRegistry")
            .field("names", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

impl ObjectiveRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in objective.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for (name, description, factory) in builtin_entries() {
            if let Err(e) = registry.register(name, description, factory) {
                panic!("built-in objectives must have unique names: {e}");
            }
        }
        registry
    }

    /// Add an objective under `name`.
    ///
    /// Fails with [`ObjectiveError::DuplicateObjective`] if the name is taken;
    /// the existing entry is kept.
    pub fn register<F>(&mut self, name: &str, description: &'static str, factory: F) -> Result<()>
    where
        F: Fn(&Context) -> Box<dyn ObjectiveFunction> + Send + Sync + 'static,
    {
        if self.entries.contains_key(name) {
            return Err(ObjectiveError::DuplicateObjective(name.to_string()));
        }
        self.entries.insert(
            name.to_string(),
            Entry {
                description,
                factory: Box::new(factory),
            },
        );
        Ok(())
    }

    /// Construct a new, unconfigured instance of `name`.
    ///
    /// Every call returns an independent instance.
    pub fn create(&self, name: &str, ctx: &Context) -> Result<Box<dyn ObjectiveFunction>> {
        match self.entries.get(name) {
            Some(entry) => {
                log::debug!("creating objective `{name}`");
                Ok((entry.factory)(ctx))
            }
            None => Err(ObjectiveError::UnknownObjective {
                name: name.to_string(),
                known: self.names().map(str::to_string).collect(),
            }),
        }
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.keys().map(String::as_str)
    }

    pub fn description(&self, name: &str) -> Option<&'static str> {
        self.entries.get(name).map(|e| e.description)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

type BuiltinEntry = (&'static str, &'static str, fn(&Context) -> Box<dyn ObjectiveFunction>);

fn builtin_entries() -> [BuiltinEntry; 17] {
    [
        ("reg:squarederror", "Squared error regression.", |ctx| {
            Box::new(SquaredError::new(ctx))
        }),
        ("reg:squaredlogerror", "Squared log error regression.", |ctx| {
            Box::new(SquaredLogError::new(ctx))
        }),
        ("reg:pseudohubererror", "Pseudo-Huber regression, robust to outliers.", |ctx| {
            Box::new(PseudoHuberError::new(ctx))
        }),
        ("reg:absoluteerror", "Absolute error (L1) regression.", |ctx| {
            Box::new(AbsoluteError::new(ctx))
        }),
        ("reg:quantileerror", "Quantile (pinball loss) regression.", |ctx| {
            Box::new(QuantileError::new(ctx))
        }),
        ("reg:logistic", "Logistic regression for probabilities.", |ctx| {
            Box::new(LogisticRegression::new(ctx, LogisticKind::Regression))
        }),
        ("binary:logistic", "Binary classification, outputs probabilities.", |ctx| {
            Box::new(LogisticRegression::new(ctx, LogisticKind::Binary))
        }),
        ("binary:logitraw", "Binary classification, outputs log-odds.", |ctx| {
            Box::new(LogisticRegression::new(ctx, LogisticKind::BinaryRaw))
        }),
        ("binary:hinge", "Hinge loss binary classification, outputs 0 or 1.", |ctx| {
            Box::new(HingeLoss::new(ctx))
        }),
        ("count:poisson", "Poisson regression for count data.", |ctx| {
            Box::new(PoissonRegression::new(ctx))
        }),
        ("reg:gamma", "Gamma regression with log link.", |ctx| {
            Box::new(GammaRegression::new(ctx))
        }),
        ("reg:tweedie", "Tweedie regression with log link.", |ctx| {
            Box::new(TweedieRegression::new(ctx))
        }),
        ("multi:softmax", "Multiclass classification, outputs the class index.", |ctx| {
            Box::new(SoftmaxMulticlass::new(ctx, false))
        }),
        ("multi:softprob", "Multiclass classification, outputs class probabilities.", |ctx| {
            Box::new(SoftmaxMulticlass::new(ctx, true))
        }),
        ("rank:pairwise", "LambdaMART with pairwise loss.", |ctx| {
            Box::new(LambdaRank::new(ctx, RankMetric::Pairwise))
        }),
        ("rank:ndcg", "LambdaMART optimising NDCG.", |ctx| {
            Box::new(LambdaRank::new(ctx, RankMetric::Ndcg))
        }),
        ("rank:map", "LambdaMART optimising mean average precision.", |ctx| {
            Box::new(LambdaRank::new(ctx, RankMetric::Map))
        }),
    ]
}
