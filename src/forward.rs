use std::{
    array,
    f64::consts::SQRT_2,
    sync::{Arc, OnceLock},
};

use tracing::trace;

use crate::{
    anisotropic::AnisotropicKernel,
    bounds::KernelBounds,
    error::{InterpolationError, Result},
    grid::{Grid, Image, Region},
    kernel::GaussianKernel,
    separable::AxisWeights,
    types::{ContinuousIndex, Matrix, Point, Value, Vector},
};

/// How the forward interpolator evaluates the kernel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KernelStrategy {
    /// [`Separable`](KernelStrategy::Separable) for a diagonal covariance,
    /// [`Anisotropic`](KernelStrategy::Anisotropic) otherwise.
    #[default]
    Auto,
    /// Per-axis error-function cell integrals combined by outer product.
    /// Only valid for a diagonal covariance.
    Separable,
    /// Point-sampled oriented Gaussian, the exact transpose of the adjoint
    /// splatting pass.
    Anisotropic,
}

/// Result of a successful forward evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation<const D: usize> {
    pub value: Value,
    /// Derivative of `value` with respect to physical position along each grid
    /// axis, present when requested.
    pub gradient: Option<Vector<D>>,
}

/// Bounds and quadratic form derived from the kernel and the bound image.
#[derive(Debug)]
struct Derived<const D: usize> {
    bounds: KernelBounds<D>,
    anisotropic: AnisotropicKernel<D>,
}

/// Gaussian interpolation of an image at continuous indices.
///
/// Kernel parameters are owned here and may be changed between calls. The
/// derived per-axis bounds are rebuilt lazily on the first evaluation after any
/// change to the kernel or the image.
///
/// ```rust,ignore
/// let mut interpolator = GaussianInterpolator::new();
/// interpolator.set_input_image(Arc::new(image));
/// interpolator.set_parameters(Vector::<3>::from_element(0.8), 3.0)?;
/// let (value, gradient) = interpolator.evaluate_with_gradient(&cindex)?;
/// ```
///
/// When no voxel lies within the cutoff of a query, [`evaluate`] returns the
/// [default value](GaussianInterpolator::set_default_value) (`0.0` unless set)
/// and a zero gradient; [`try_evaluate`] reports
/// [`InterpolationError::DegenerateLocalSupport`] instead.
///
/// [`evaluate`]: GaussianInterpolator::evaluate
/// [`try_evaluate`]: GaussianInterpolator::try_evaluate
#[derive(Debug, Default)]
pub struct GaussianInterpolator<const D: usize> {
    image: Option<Arc<Image<D>>>,
    kernel: GaussianKernel<D>,
    strategy: KernelStrategy,
    default_value: Value,
    derived: OnceLock<Derived<D>>,
}

impl<const D: usize> GaussianInterpolator<D> {
    /// Creates an interpolator with the default kernel (sigma 1, alpha 1).
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds the image to interpolate.
    pub fn with_image(mut self, image: Arc<Image<D>>) -> Self {
        self.set_input_image(image);
        self
    }

    /// Sets the kernel; see [`set_kernel`](Self::set_kernel).
    pub fn with_kernel(mut self, kernel: GaussianKernel<D>) -> Result<Self> {
        self.set_kernel(kernel)?;
        Ok(self)
    }

    /// Sets the evaluation strategy; see [`set_strategy`](Self::set_strategy).
    pub fn with_strategy(mut self, strategy: KernelStrategy) -> Result<Self> {
        self.set_strategy(strategy)?;
        Ok(self)
    }

    /// Binds the image to interpolate and drops the derived bounds.
    pub fn set_input_image(&mut self, image: Arc<Image<D>>) {
        self.image = Some(image);
        self.invalidate();
    }

    /// The bound image, if any.
    pub fn input_image(&self) -> Option<&Arc<Image<D>>> {
        self.image.as_ref()
    }

    pub fn kernel(&self) -> &GaussianKernel<D> {
        &self.kernel
    }

    /// Replaces the kernel.
    ///
    /// Fails with [`InterpolationError::InvalidKernelParameter`] if the kernel
    /// is not diagonal while the strategy is
    /// [`Separable`](KernelStrategy::Separable); the previous kernel is kept.
    pub fn set_kernel(&mut self, kernel: GaussianKernel<D>) -> Result<()> {
        check_strategy(self.strategy, &kernel)?;
        if kernel != self.kernel {
            self.kernel = kernel;
            self.invalidate();
        }
        Ok(())
    }

    /// Sets an axis-aligned kernel, keeping alpha.
    pub fn set_sigma(&mut self, sigma: Vector<D>) -> Result<()> {
        self.set_kernel(GaussianKernel::from_sigma(sigma, self.kernel.alpha())?)
    }

    /// Sets a full covariance, keeping alpha.
    pub fn set_covariance(&mut self, covariance: Matrix<D>) -> Result<()> {
        self.set_kernel(GaussianKernel::from_covariance(covariance, self.kernel.alpha())?)
    }

    /// Sets the cutoff multiplier, keeping the covariance.
    pub fn set_alpha(&mut self, alpha: Value) -> Result<()> {
        self.set_kernel(self.kernel.with_alpha(alpha)?)
    }

    /// Sets an axis-aligned kernel and its cutoff multiplier together.
    pub fn set_parameters(&mut self, sigma: Vector<D>, alpha: Value) -> Result<()> {
        self.set_kernel(GaussianKernel::from_sigma(sigma, alpha)?)
    }

    pub fn strategy(&self) -> KernelStrategy {
        self.strategy
    }

    /// Selects the evaluation strategy. [`KernelStrategy::Separable`] is
    /// rejected while the covariance is not diagonal.
    pub fn set_strategy(&mut self, strategy: KernelStrategy) -> Result<()> {
        check_strategy(strategy, &self.kernel)?;
        self.strategy = strategy;
        Ok(())
    }

    /// The strategy actually used for the current kernel.
    pub fn resolved_strategy(&self) -> KernelStrategy {
        match self.strategy {
            KernelStrategy::Auto if self.kernel.is_diagonal() => KernelStrategy::Separable,
            KernelStrategy::Auto => KernelStrategy::Anisotropic,
            explicit => explicit,
        }
    }

    pub fn default_value(&self) -> Value {
        self.default_value
    }

    /// Value returned for queries whose truncated support is empty.
    pub fn set_default_value(&mut self, default_value: Value) {
        self.default_value = default_value;
    }

    /// Interpolated intensity at `cindex`.
    pub fn evaluate(&self, cindex: &ContinuousIndex<D>) -> Result<Value> {
        match self.try_evaluate(cindex, false) {
            Ok(evaluation) => Ok(evaluation.value),
            Err(InterpolationError::DegenerateLocalSupport) => Ok(self.default_value),
            Err(e) => Err(e),
        }
    }

    /// Interpolated intensity and its physical-space gradient at `cindex`.
    pub fn evaluate_with_gradient(&self, cindex: &ContinuousIndex<D>) -> Result<(Value, Vector<D>)> {
        match self.try_evaluate(cindex, true) {
            Ok(evaluation) => Ok((
                evaluation.value,
                evaluation.gradient.unwrap_or_else(Vector::<D>::zeros),
            )),
            Err(InterpolationError::DegenerateLocalSupport) => {
                Ok((self.default_value, Vector::<D>::zeros()))
            }
            Err(e) => Err(e),
        }
    }

    /// Interpolated intensity at a physical point.
    pub fn evaluate_at_point(&self, point: &Point<D>) -> Result<Value> {
        let image = self.image.as_ref().ok_or(InterpolationError::MissingInput("image"))?;
        self.evaluate(&image.physical_to_continuous_index(point))
    }

    /// Like [`evaluate`](GaussianInterpolator::evaluate) but reports an empty
    /// support as [`InterpolationError::DegenerateLocalSupport`].
    pub fn try_evaluate(&self, cindex: &ContinuousIndex<D>, with_gradient: bool) -> Result<Evaluation<D>> {
        let image = self.image.as_ref().ok_or(InterpolationError::MissingInput("image"))?;
        let derived = self.derived(image)?;

        match self.resolved_strategy() {
            KernelStrategy::Anisotropic => {
                evaluate_anisotropic(image, derived, cindex, with_gradient)
            }
            _ => evaluate_separable(image, &derived.bounds, self.kernel.sigma(), cindex, with_gradient),
        }
    }

    fn derived(&self, image: &Image<D>) -> Result<&Derived<D>> {
        if let Some(derived) = self.derived.get() {
            return Ok(derived);
        }
        let spacing = image.spacing();
        let computed = Derived {
            bounds: KernelBounds::compute(image.size(), &spacing, &self.kernel)?,
            anisotropic: AnisotropicKernel::new(&self.kernel, &spacing),
        };
        trace!(size = ?image.size(), alpha = self.kernel.alpha(), "recomputed kernel bounds");
        Ok(self.derived.get_or_init(|| computed))
    }

    fn invalidate(&mut self) {
        self.derived = OnceLock::new();
    }
}

fn check_strategy<const D: usize>(strategy: KernelStrategy, kernel: &GaussianKernel<D>) -> Result<()> {
    if strategy == KernelStrategy::Separable && !kernel.is_diagonal() {
        return Err(InterpolationError::InvalidKernelParameter(
            "separable evaluation requires a diagonal covariance".into(),
        ));
    }
    Ok(())
}

/// Outer product of per-axis error-function weights over the active box.
///
/// ```text
/// w(i)      = Π_d  weight_d[i_d]
/// ∂w/∂c_q   ∝ gradient_q[i_q] · Π_{d≠q} weight_d[i_d]
/// value     = Σ w·V / Σ w
/// grad[q]   = (Σ ∂w_q·V − value · Σ ∂w_q) / Σ w / (−√2 σ_q)
/// ```
fn evaluate_separable<const D: usize>(
    image: &Image<D>,
    bounds: &KernelBounds<D>,
    sigma: &Vector<D>,
    cindex: &ContinuousIndex<D>,
    with_gradient: bool,
) -> Result<Evaluation<D>> {
    let weights: [AxisWeights; D] =
        array::from_fn(|d| AxisWeights::compute(bounds.axis(d), cindex[d], with_gradient));
    let region = Region::new(
        array::from_fn(|d| weights[d].range().start),
        array::from_fn(|d| weights[d].range().end),
    );
    if region.is_empty() {
        return Err(InterpolationError::DegenerateLocalSupport);
    }

    let mut sum_value = 0.0;
    let mut sum_weight = 0.0;
    let mut dsum_value = Vector::<D>::zeros();
    let mut dsum_weight = Vector::<D>::zeros();

    for index in region.iter() {
        let v = image.get(&index);
        let w: Value = (0..D).map(|d| weights[d].weight(index[d])).product();
        sum_value += v * w;
        sum_weight += w;

        if with_gradient {
            for q in 0..D {
                let dw: Value = (0..D)
                    .map(|d| {
                        if d == q {
                            weights[d].gradient(index[d])
                        } else {
                            weights[d].weight(index[d])
                        }
                    })
                    .product();
                dsum_value[q] += v * dw;
                dsum_weight[q] += dw;
            }
        }
    }

    // Catches an all-zero support (underflow) as well as NaN.
    if !(sum_weight > 0.0) {
        return Err(InterpolationError::DegenerateLocalSupport);
    }
    let value = sum_value / sum_weight;

    let gradient = with_gradient.then(|| {
        Vector::<D>::from_fn(|q, _| {
            (dsum_value[q] - value * dsum_weight[q]) / sum_weight / (-SQRT_2 * sigma[q])
        })
    });

    Ok(Evaluation { value, gradient })
}

/// Locally normalized oriented Gaussian over the active box, the same weights
/// the adjoint pass splats with.
fn evaluate_anisotropic<const D: usize>(
    image: &Image<D>,
    derived: &Derived<D>,
    cindex: &ContinuousIndex<D>,
    with_gradient: bool,
) -> Result<Evaluation<D>> {
    let region = derived.bounds.region(cindex);
    if region.is_empty() {
        return Err(InterpolationError::DegenerateLocalSupport);
    }

    let mut sum_value = 0.0;
    let mut sum_weight = 0.0;
    let mut dsum_value = Vector::<D>::zeros();
    let mut dsum_weight = Vector::<D>::zeros();

    for index in region.iter() {
        let v = image.get(&index);
        if with_gradient {
            let (w, dw) = derived.anisotropic.weight_and_derivative(&index, cindex);
            sum_value += v * w;
            sum_weight += w;
            dsum_value += dw * v;
            dsum_weight += dw;
        } else {
            let w = derived.anisotropic.weight(&index, cindex);
            sum_value += v * w;
            sum_weight += w;
        }
    }

    if !(sum_weight > 0.0) {
        return Err(InterpolationError::DegenerateLocalSupport);
    }
    let value = sum_value / sum_weight;

    let gradient = with_gradient.then(|| {
        let spacing = image.spacing();
        Vector::<D>::from_fn(|q, _| {
            (dsum_value[q] - value * dsum_weight[q]) / sum_weight / spacing[q]
        })
    });

    Ok(Evaluation { value, gradient })
}
