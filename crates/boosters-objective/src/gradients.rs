//! Gradient pair type and the example-major gradient buffer.
//!
//! # Layout
//!
//! For `n_rows` examples and `n_targets` outputs the buffer is a row-major
//! `[n_rows, n_targets]` array, so all targets of one example are adjacent:
//!
//! ```text
//! [r0_t0, r0_t1, ..., r0_tK, r1_t0, r1_t1, ..., r1_tK, ...]
//! |------ example 0 -------| |------ example 1 -------|
//! ```
//!
//! Index formula: `pairs[row * n_targets + target]`

use std::ops::{Add, AddAssign};

use approx::AbsDiffEq;
use ndarray::{Array2, ArrayView1, ArrayView2, ArrayViewMut2};

/// First and second order derivative of the loss for one (example, target).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GradientPair {
    /// Gradient (∂L/∂margin).
    pub grad: f32,
    /// Hessian (∂²L/∂margin²).
    pub hess: f32,
}

impl GradientPair {
    #[inline]
    pub const fn new(grad: f32, hess: f32) -> Self {
        Self { grad, hess }
    }

    /// Scale both components by a sample weight.
    #[inline]
    pub fn weighted(self, w: f32) -> Self {
        Self {
            grad: self.grad * w,
            hess: self.hess * w,
        }
    }

    /// Clamp both components to the finite `f32` range.
    #[inline]
    pub fn saturated(self) -> Self {
        Self {
            grad: self.grad.clamp(-f32::MAX, f32::MAX),
            hess: self.hess.clamp(-f32::MAX, f32::MAX),
        }
    }

    /// True when both components are finite.
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.grad.is_finite() && self.hess.is_finite()
    }
}

impl Add for GradientPair {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.grad + rhs.grad, self.hess + rhs.hess)
    }
}

impl AddAssign for GradientPair {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        self.grad += rhs.grad;
        self.hess += rhs.hess;
    }
}

impl AbsDiffEq for GradientPair {
    type Epsilon = f32;

    fn default_epsilon() -> f32 {
        f32::EPSILON
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: f32) -> bool {
        self.grad.abs_diff_eq(&other.grad, epsilon) && self.hess.abs_diff_eq(&other.hess, epsilon)
    }
}

/// Example-major gradient buffer, one [`GradientPair`] per (row, target).
///
/// Owned by the boosting loop and overwritten every round.
///
/// # Example
///
/// ```
/// use boosters_objective::{GradientBuffer, GradientPair};
///
/// let mut buffer = GradientBuffer::new(4, 2);
/// buffer.set(1, 0, GradientPair::new(-0.5, 0.25));
///
/// assert_eq!(buffer.len(), 8);
/// assert_eq!(buffer.get(1, 0).grad, -0.5);
/// assert_eq!(buffer.target_grads(0), vec![0.0, -0.5, 0.0, 0.0]);
/// ```
#[derive(Debug, Clone)]
pub struct GradientBuffer {
    pairs: Array2<GradientPair>,
}

impl Default for GradientBuffer {
    fn default() -> Self {
        Self::new(0, 1)
    }
}

impl GradientBuffer {
    /// Create a zeroed buffer for `n_rows` examples and `n_targets` outputs.
    pub fn new(n_rows: usize, n_targets: usize) -> Self {
        Self {
            pairs: Array2::default((n_rows, n_targets)),
        }
    }

    /// Number of examples.
    #[inline]
    pub fn n_rows(&self) -> usize {
        self.pairs.nrows()
    }

    /// Number of outputs per example.
    #[inline]
    pub fn n_targets(&self) -> usize {
        self.pairs.ncols()
    }

    /// Total number of gradient pairs (n_rows × n_targets).
    #[inline]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Reshape to `(n_rows, n_targets)`.
    ///
    /// Contents are unspecified after a shape change; objectives overwrite
    /// every pair they own.
    pub fn resize(&mut self, n_rows: usize, n_targets: usize) {
        if self.pairs.dim() != (n_rows, n_targets) {
            self.pairs = Array2::default((n_rows, n_targets));
        }
    }

    #[inline]
    pub fn get(&self, row: usize, target: usize) -> GradientPair {
        self.pairs[[row, target]]
    }

    #[inline]
    pub fn set(&mut self, row: usize, target: usize, pair: GradientPair) {
        self.pairs[[row, target]] = pair;
    }

    /// All pairs as a `[n_rows, n_targets]` view.
    #[inline]
    pub fn view(&self) -> ArrayView2<'_, GradientPair> {
        self.pairs.view()
    }

    #[inline]
    pub fn view_mut(&mut self) -> ArrayViewMut2<'_, GradientPair> {
        self.pairs.view_mut()
    }

    /// Pairs of one target across all examples (strided).
    #[inline]
    pub fn target(&self, target: usize) -> ArrayView1<'_, GradientPair> {
        self.pairs.column(target)
    }

    /// Gradients of one target gathered into a contiguous vector.
    pub fn target_grads(&self, target: usize) -> Vec<f32> {
        self.target(target).iter().map(|p| p.grad).collect()
    }

    /// Hessians of one target gathered into a contiguous vector.
    pub fn target_hess(&self, target: usize) -> Vec<f32> {
        self.target(target).iter().map(|p| p.hess).collect()
    }

    /// Sum of all pairs of one target.
    pub fn sum_target(&self, target: usize) -> GradientPair {
        self.target(target)
            .iter()
            .fold(GradientPair::default(), |acc, &p| acc + p)
    }
}
