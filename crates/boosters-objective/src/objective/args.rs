//! String key/value configuration handed to [`ObjectiveFunction::configure`].
//!
//! [`ObjectiveFunction::configure`]: super::ObjectiveFunction::configure

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ObjectiveError, Result};

/// Ordered map of configuration options.
///
/// The same map usually carries general training parameters as well, so
/// objectives ignore keys they do not recognise.
///
/// # Example
///
/// ```
/// use boosters_objective::Args;
///
/// let args = Args::new()
///     .with("scale_pos_weight", "2.5")
///     .with("max_depth", "6");
/// assert_eq!(args.get("scale_pos_weight"), Some("2.5"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Args(BTreeMap<String, String>);

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parse a scalar option, `None` if the key is absent.
    pub fn parse<T>(&self, objective: &'static str, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(key)
            .map(|raw| {
                raw.trim().parse::<T>().map_err(|e| {
                    ObjectiveError::config(objective, key, format!("cannot parse `{raw}`: {e}"))
                })
            })
            .transpose()
    }

    /// Parse an `f32` option and check it against `check`.
    ///
    /// `expected` describes the valid range in the error message.
    pub fn parse_f32_checked(
        &self,
        objective: &'static str,
        key: &str,
        check: impl Fn(f32) -> bool,
        expected: &str,
    ) -> Result<Option<f32>> {
        match self.parse::<f32>(objective, key)? {
            Some(v) if !v.is_finite() || !check(v) => Err(ObjectiveError::config(
                objective,
                key,
                format!("must be {expected}, got {v}"),
            )),
            other => Ok(other),
        }
    }

    /// Parse a list of `f32`, written either as a scalar (`0.5`) or a
    /// bracketed / comma separated list (`[0.1, 0.9]`).
    pub fn parse_f32_list(&self, objective: &'static str, key: &str) -> Result<Option<Vec<f32>>> {
        let Some(raw) = self.get(key) else {
            return Ok(None);
        };
        let inner = raw.trim().trim_start_matches('[').trim_end_matches(']');
        let values = inner
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<f32>().map_err(|e| {
                    ObjectiveError::config(objective, key, format!("cannot parse `{s}`: {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        if values.is_empty() {
            return Err(ObjectiveError::config(objective, key, "list is empty"));
        }
        Ok(Some(values))
    }

    /// Log keys an objective does not use.
    pub(crate) fn log_ignored(&self, objective: &'static str, known: &[&str]) {
        for key in self.0.keys().filter(|k| !known.contains(&k.as_str())) {
            log::debug!("{objective}: ignoring option `{key}`");
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Args {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for Args {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}
