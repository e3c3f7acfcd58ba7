use nalgebra::{SMatrix, SVector};

/// Scalar used for intensities, weights and coordinates.
pub type Value = f64;

/// A physical-space point with [`Value`] components.
pub type Point<const D: usize> = nalgebra::Point<Value, D>;

/// A D-vector with [`Value`] components (sigma, spacing, gradients).
pub type Vector<const D: usize> = SVector<Value, D>;

/// A D×D matrix with [`Value`] components (covariance, direction).
pub type Matrix<const D: usize> = SMatrix<Value, D, D>;

/// A location in buffer-relative grid-index space with real-valued coordinates.
///
/// Coordinate `0.0` along an axis is the centre of the first stored voxel.
pub type ContinuousIndex<const D: usize> = SVector<Value, D>;

/// A stored voxel, one offset per axis.
pub type DiscreteIndex<const D: usize> = [usize; D];
