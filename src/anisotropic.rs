use crate::{
    kernel::GaussianKernel,
    types::{ContinuousIndex, DiscreteIndex, Matrix, Value, Vector},
};

/// Point-sampled oriented Gaussian in voxel-index space.
///
/// Holds `A = S·Σ⁻¹·S` (`S = diag(spacing)`) and evaluates
///
/// ```text
/// diff = index − center
/// w    = exp(−½ · diffᵀ · A · diff)
/// ```
///
/// Unlike the separable path this handles any positive-definite covariance,
/// including kernels rotated relative to the grid axes.
#[derive(Debug, Clone, PartialEq)]
pub struct AnisotropicKernel<const D: usize> {
    scaled_inverse_covariance: Matrix<D>,
}

impl<const D: usize> AnisotropicKernel<D> {
    /// Prepares `kernel` for a grid with the given spacing.
    pub fn new(kernel: &GaussianKernel<D>, spacing: &Vector<D>) -> Self {
        Self::from_scaled_inverse_covariance(kernel.scaled_inverse_covariance(spacing))
    }

    /// Wraps an already scaled quadratic form `S·Σ⁻¹·S`.
    pub fn from_scaled_inverse_covariance(scaled_inverse_covariance: Matrix<D>) -> Self {
        Self {
            scaled_inverse_covariance,
        }
    }

    pub fn scaled_inverse_covariance(&self) -> &Matrix<D> {
        &self.scaled_inverse_covariance
    }

    /// Kernel value at voxel `index` for a kernel centred at `center`.
    #[inline]
    pub fn weight(&self, index: &DiscreteIndex<D>, center: &ContinuousIndex<D>) -> Value {
        let diff = offset(index, center);
        (-0.5 * diff.dot(&(self.scaled_inverse_covariance * diff))).exp()
    }

    /// Kernel value and its derivative with respect to `center`:
    /// `∂w/∂c = w · A · (index − center)`.
    #[inline]
    pub fn weight_and_derivative(
        &self,
        index: &DiscreteIndex<D>,
        center: &ContinuousIndex<D>,
    ) -> (Value, Vector<D>) {
        let diff = offset(index, center);
        let a_diff = self.scaled_inverse_covariance * diff;
        let w = (-0.5 * diff.dot(&a_diff)).exp();
        (w, a_diff * w)
    }
}

#[inline]
fn offset<const D: usize>(index: &DiscreteIndex<D>, center: &ContinuousIndex<D>) -> Vector<D> {
    Vector::<D>::from_fn(|d, _| index[d] as Value - center[d])
}
