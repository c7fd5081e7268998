//! Closed set of numeric sample types
//!
//! Series and statistics are generic over [`Numeric`], which is sealed and
//! implemented for `i32`, `i64`, `f32` and `f64`. Aggregates are always
//! accumulated in `f64` regardless of the element type.

use std::cmp::Ordering;
use std::fmt::Debug;

mod sealed {
    pub trait Sealed {}
    impl Sealed for i32 {}
    impl Sealed for i64 {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
}

/// Numeric element type usable in ring buffers and data series
pub trait Numeric:
    sealed::Sealed + Copy + Default + PartialOrd + Debug + Send + Sync + 'static
{
    fn to_f64(self) -> f64;

    /// Converts back from the `f64` accumulation type; integer types round
    /// to nearest and saturate at their bounds
    fn from_f64(value: f64) -> Self;

    /// Total ordering, used where samples are kept in ordered structures
    fn total_cmp(&self, other: &Self) -> Ordering;
}

impl Numeric for i32 {
    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(value: f64) -> Self {
        value.round() as i32
    }

    fn total_cmp(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }
}

impl Numeric for i64 {
    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(value: f64) -> Self {
        value.round() as i64
    }

    fn total_cmp(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }
}

impl Numeric for f32 {
    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(value: f64) -> Self {
        value as f32
    }

    fn total_cmp(&self, other: &Self) -> Ordering {
        f32::total_cmp(self, other)
    }
}

impl Numeric for f64 {
    fn to_f64(self) -> f64 {
        self
    }

    fn from_f64(value: f64) -> Self {
        value
    }

    fn total_cmp(&self, other: &Self) -> Ordering {
        f64::total_cmp(self, other)
    }
}

/// Wrapper giving any [`Numeric`] a total `Ord`
#[derive(Debug, Clone, Copy)]
pub(crate) struct Ordered<T>(pub T);

impl<T: Numeric> PartialEq for Ordered<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl<T: Numeric> Eq for Ordered<T> {}

impl<T: Numeric> PartialOrd for Ordered<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: Numeric> Ord for Ordered<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}
