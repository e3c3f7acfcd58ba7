use nalgebra::Cholesky;

use crate::{
    config::{DEFAULT_ALPHA, DEFAULT_SIGMA},
    error::{InterpolationError, Result},
    types::{Matrix, Value, Vector},
};

/// Relative tolerance used when checking a covariance for symmetry.
const SYMMETRY_TOLERANCE: Value = 1e-12;

/// Validated parameters of a truncated Gaussian kernel.
///
/// The covariance is expressed in physical units along the grid axes. Sigma is
/// always the square root of its diagonal, so the two views never disagree.
///
/// ```text
///  sigma  = [s0, s1]        covariance = | s0²  c01 |
///  alpha  = cutoff in σ                  | c01  s1² |
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianKernel<const D: usize> {
    sigma: Vector<D>,
    covariance: Matrix<D>,
    inverse_covariance: Matrix<D>,
    alpha: Value,
}

impl<const D: usize> Default for GaussianKernel<D> {
    fn default() -> Self {
        let sigma = Vector::<D>::from_element(DEFAULT_SIGMA);
        let variance = sigma.component_mul(&sigma);
        Self {
            sigma,
            covariance: Matrix::<D>::from_diagonal(&variance),
            inverse_covariance: Matrix::<D>::from_diagonal(&variance.map(|v| 1.0 / v)),
            alpha: DEFAULT_ALPHA,
        }
    }
}

impl<const D: usize> GaussianKernel<D> {
    /// Creates an axis-aligned kernel from per-axis standard deviations.
    ///
    /// Returns [`InterpolationError::InvalidKernelParameter`] if any sigma is not
    /// strictly positive or `alpha` is not a positive finite number.
    pub fn from_sigma(sigma: Vector<D>, alpha: Value) -> Result<Self> {
        if let Some(d) = sigma.iter().position(|s| !(s.is_finite() && *s > 0.0)) {
            return Err(InterpolationError::InvalidKernelParameter(format!(
                "sigma[{d}] = {} must be positive",
                sigma[d]
            )));
        }
        let variance = sigma.component_mul(&sigma);
        Self::from_covariance(Matrix::<D>::from_diagonal(&variance), alpha)
    }

    /// Creates a possibly rotated kernel from a full covariance matrix.
    ///
    /// The covariance must be symmetric and positive-definite; positive
    /// definiteness is established by a successful Cholesky factorization.
    pub fn from_covariance(covariance: Matrix<D>, alpha: Value) -> Result<Self> {
        validate_alpha(alpha)?;

        if covariance.iter().any(|c| !c.is_finite()) {
            return Err(InterpolationError::InvalidKernelParameter(
                "covariance has non-finite entries".into(),
            ));
        }
        for i in 0..D {
            for j in (i + 1)..D {
                let (a, b) = (covariance[(i, j)], covariance[(j, i)]);
                let scale = a.abs().max(b.abs()).max(1.0);
                if (a - b).abs() > SYMMETRY_TOLERANCE * scale {
                    return Err(InterpolationError::InvalidKernelParameter(format!(
                        "covariance is not symmetric at ({i}, {j})"
                    )));
                }
            }
        }

        let cholesky = Cholesky::new(covariance).ok_or_else(|| {
            InterpolationError::InvalidKernelParameter(
                "covariance is not positive-definite".into(),
            )
        })?;

        Ok(Self {
            sigma: covariance.diagonal().map(Value::sqrt),
            covariance,
            inverse_covariance: cholesky.inverse(),
            alpha,
        })
    }

    /// Returns a copy of this kernel with a different cutoff multiplier.
    pub fn with_alpha(&self, alpha: Value) -> Result<Self> {
        validate_alpha(alpha)?;
        Ok(Self {
            alpha,
            ..self.clone()
        })
    }

    /// Per-axis standard deviations, the square root of the covariance diagonal.
    pub fn sigma(&self) -> &Vector<D> {
        &self.sigma
    }

    /// Covariance in physical units along the grid axes.
    pub fn covariance(&self) -> &Matrix<D> {
        &self.covariance
    }

    /// Truncation radius in standard deviations.
    pub fn alpha(&self) -> Value {
        self.alpha
    }

    /// `true` when every off-diagonal covariance entry is exactly zero, i.e. the
    /// kernel factors into a product of 1-D Gaussians along the grid axes.
    pub fn is_diagonal(&self) -> bool {
        (0..D).all(|i| (0..D).all(|j| i == j || self.covariance[(i, j)] == 0.0))
    }

    /// Returns `S·Σ⁻¹·S` with `S = diag(spacing)`, the quadratic form of this
    /// kernel in voxel-index units of a grid with the given spacing.
    pub fn scaled_inverse_covariance(&self, spacing: &Vector<D>) -> Matrix<D> {
        let s = Matrix::<D>::from_diagonal(spacing);
        s * self.inverse_covariance * s
    }
}

fn validate_alpha(alpha: Value) -> Result<()> {
    if alpha.is_finite() && alpha > 0.0 {
        Ok(())
    } else {
        Err(InterpolationError::InvalidKernelParameter(format!(
            "alpha = {alpha} must be positive"
        )))
    }
}
