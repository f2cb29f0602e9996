//! Label and weight metadata consumed by objectives.
//!
//! [`MetaInfo`] holds everything an objective reads besides predictions:
//! an `[n_rows, n_targets]` label matrix, optional per-row weights, optional
//! and optional query group boundaries (ranking). Shapes are
//! validated when the optional parts are attached, so objectives only need to
//! check predictions against [`MetaInfo::n_rows`].

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::error::{ObjectiveError, Result};

/// Labels, weights and groups for one training (or evaluation) set.
#[derive(Debug, Clone)]
pub struct MetaInfo {
    labels: Array2<f32>,
    weights: Option<Array1<f32>>,
    group_ptr: Option<Vec<usize>>,
}

impl MetaInfo {
    /// Create from a `[n_rows, n_targets]` label matrix.
    pub fn new(labels: Array2<f32>) -> Self {
        Self {
            labels,
            weights: None,
            group_ptr: None,
        }
    }

    /// Create from a single label column.
    pub fn from_labels(labels: &[f32]) -> Self {
        Self::new(Array2::from_shape_fn((labels.len(), 1), |(i, _)| labels[i]))
    }

    /// Attach per-row weights. Length must equal the number of rows and
    /// every weight must be finite and non-negative.
    pub fn with_weights(mut self, weights: Array1<f32>) -> Result<Self> {
        if weights.len() != self.n_rows() {
            return Err(ObjectiveError::shape("weights", self.n_rows(), weights.len()));
        }
        if let Some(index) = weights.iter().position(|&w| !(w.is_finite() && w >= 0.0)) {
            return Err(ObjectiveError::InvalidWeight {
                index,
                value: weights[index],
            });
        }
        self.weights = Some(weights);
        Ok(self)
    }

    /// Attach query group boundaries.
    ///
    /// `group_ptr[g]..group_ptr[g + 1]` are the rows of group `g`. The pointer
    /// must start at 0, be non-decreasing and end at `n_rows`.
    pub fn with_groups(mut self, group_ptr: Vec<usize>) -> Result<Self> {
        validate_group_ptr(&group_ptr, self.n_rows())?;
        self.group_ptr = Some(group_ptr);
        Ok(self)
    }

    /// Attach query groups given as group sizes (`[3, 2]` = rows 0..3, 3..5).
    pub fn with_group_sizes(self, sizes: &[usize]) -> Result<Self> {
        let mut ptr = Vec::with_capacity(sizes.len() + 1);
        ptr.push(0);
        let mut acc = 0;
        for &s in sizes {
            acc += s;
            ptr.push(acc);
        }
        self.with_groups(ptr)
    }

    /// Number of rows (examples).
    #[inline]
    pub fn n_rows(&self) -> usize {
        self.labels.nrows()
    }

    /// Number of label columns.
    #[inline]
    pub fn n_label_cols(&self) -> usize {
        self.labels.ncols()
    }

    /// Number of label columns, rejecting a label matrix without columns.
    pub(crate) fn require_label_cols(&self) -> Result<usize> {
        match self.labels.ncols() {
            0 => Err(ObjectiveError::shape("label columns", "at least 1", 0)),
            n => Ok(n),
        }
    }

    #[inline]
    pub fn labels(&self) -> ArrayView2<'_, f32> {
        self.labels.view()
    }

    /// One label column across all rows.
    #[inline]
    pub fn label_col(&self, col: usize) -> ArrayView1<'_, f32> {
        self.labels.column(col)
    }

    #[inline]
    pub fn label(&self, row: usize, col: usize) -> f32 {
        self.labels[[row, col]]
    }

    /// Weight of a row; 1.0 when no weights are attached.
    #[inline]
    pub fn weight(&self, row: usize) -> f32 {
        match &self.weights {
            Some(w) => w[row],
            None => 1.0,
        }
    }

    #[inline]
    pub fn weights(&self) -> Option<ArrayView1<'_, f32>> {
        self.weights.as_ref().map(|w| w.view())
    }

    #[inline]
    pub fn has_weights(&self) -> bool {
        self.weights.is_some()
    }

    /// Iterate over row weights (1.0 for every row when unweighted).
    pub fn weights_iter(&self) -> impl Iterator<Item = f32> + '_ {
        (0..self.n_rows()).map(move |i| self.weight(i))
    }

    #[inline]
    pub fn group_ptr(&self) -> Option<&[usize]> {
        self.group_ptr.as_deref()
    }

    /// Number of query groups (0 when no groups are attached).
    pub fn n_groups(&self) -> usize {
        self.group_ptr.as_ref().map_or(0, |p| p.len().saturating_sub(1))
    }

    /// Check that predictions have one row per example.
    pub(crate) fn check_predictions(&self, predictions: ArrayView2<'_, f32>) -> Result<()> {
        if predictions.nrows() != self.n_rows() {
            return Err(ObjectiveError::shape(
                "prediction rows",
                self.n_rows(),
                predictions.nrows(),
            ));
        }
        Ok(())
    }
}

fn validate_group_ptr(ptr: &[usize], n_rows: usize) -> Result<()> {
    match (ptr.first(), ptr.last()) {
        (Some(0), Some(&last)) if last == n_rows => {}
        _ => {
            return Err(ObjectiveError::InvalidGroups(format!(
                "group pointer must start at 0 and end at {n_rows}, got {ptr:?}"
            )))
        }
    }
    if let Some(w) = ptr.windows(2).find(|w| w[1] < w[0]) {
        return Err(ObjectiveError::InvalidGroups(format!(
            "group pointer must be non-decreasing, found {} after {}",
            w[1], w[0]
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn defaults_to_unit_weights() {
        let info = MetaInfo::from_labels(&[1.0, 2.0, 3.0]);
        assert_eq!(info.n_rows(), 3);
        assert_eq!(info.n_label_cols(), 1);
        assert!(!info.has_weights());
        assert_eq!(info.weights_iter().collect::<Vec<_>>(), vec![1.0; 3]);
    }

    #[test]
    fn rejects_weight_length_mismatch() {
        let info = MetaInfo::from_labels(&[1.0, 2.0, 3.0]);
        let err = info.with_weights(array![1.0, 2.0]).unwrap_err();
        assert!(matches!(err, ObjectiveError::ShapeMismatch { what: "weights", .. }));
    }

    #[test]
    fn rejects_negative_and_nan_weights() {
        let info = MetaInfo::from_labels(&[1.0, 2.0, 3.0]);
        let err = info.clone().with_weights(array![1.0, -0.5, 2.0]).unwrap_err();
        assert_eq!(err, ObjectiveError::InvalidWeight { index: 1, value: -0.5 });
        assert!(matches!(
            info.clone().with_weights(array![1.0, 1.0, f32::NAN]),
            Err(ObjectiveError::InvalidWeight { index: 2, .. })
        ));
        assert!(info.with_weights(array![0.0, 1.0, 2.0]).is_ok());
    }

    #[test]
    fn zero_label_columns_are_rejected() {
        let info = MetaInfo::new(Array2::zeros((2, 0)));
        assert!(matches!(
            info.require_label_cols(),
            Err(ObjectiveError::ShapeMismatch { what: "label columns", .. })
        ));
        assert_eq!(MetaInfo::from_labels(&[1.0]).require_label_cols().unwrap(), 1);
    }

    #[test]
    fn group_sizes_build_pointer() {
        let info = MetaInfo::from_labels(&[0.0; 5])
            .with_group_sizes(&[3, 2])
            .unwrap();
        assert_eq!(info.group_ptr(), Some(&[0, 3, 5][..]));
        assert_eq!(info.n_groups(), 2);
    }

    #[test]
    fn rejects_bad_groups() {
        let info = MetaInfo::from_labels(&[0.0; 4]);
        assert!(info.clone().with_groups(vec![0, 3]).is_err());
        assert!(info.clone().with_groups(vec![1, 4]).is_err());
        assert!(info.with_groups(vec![0, 3, 2, 4]).is_err());
    }

    #[test]
    fn check_predictions_rows() {
        let info = MetaInfo::new(array![[1.0f32, 2.0], [3.0, 4.0]]);
        assert!(info.check_predictions(array![[0.0f32, 0.0], [0.0, 0.0]].view()).is_ok());
        assert!(info.check_predictions(array![[0.0f32, 0.0]].view()).is_err());
    }
}
