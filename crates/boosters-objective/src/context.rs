//! Runtime context shared by objectives, and the parallelism flag derived from it.

use rayon::prelude::*;

/// Whether parallel execution is allowed.
///
/// When `Parallel`, objectives may use `rayon` parallel iterators over rows
/// (or query groups). When `Sequential` they iterate on the calling thread.
/// The thread pool itself is owned by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parallelism {
    Sequential,
    Parallel,
}

impl Parallelism {
    /// Create from thread count semantics.
    ///
    /// - 0 = auto (parallel if rayon pool has multiple threads, sequential otherwise)
    /// - 1 = sequential
    /// - >1 = parallel
    #[inline]
    pub fn from_threads(n_threads: usize) -> Self {
        if n_threads == 1 || (n_threads == 0 && rayon::current_num_threads() == 1) {
            Parallelism::Sequential
        } else {
            Parallelism::Parallel
        }
    }

    #[inline]
    pub fn is_parallel(self) -> bool {
        matches!(self, Parallelism::Parallel)
    }

    /// Map over an indexed range and collect, in order.
    #[inline]
    pub fn maybe_par_map<T, F>(self, range: std::ops::Range<usize>, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        if self.is_parallel() {
            range.into_par_iter().map(f).collect()
        } else {
            range.map(f).collect()
        }
    }
}

/// Generic runtime parameters handed to every objective at creation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Context {
    /// Requested thread count (0 = auto).
    pub n_threads: usize,
}

impl Context {
    pub fn new(n_threads: usize) -> Self {
        Self { n_threads }
    }

    /// Single-threaded context, mostly useful for deterministic tests.
    pub fn sequential() -> Self {
        Self::new(1)
    }

    #[inline]
    pub fn parallelism(&self) -> Parallelism {
        Parallelism::from_threads(self.n_threads)
    }
}
