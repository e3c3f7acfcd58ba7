use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use ndarray::{ArrayD, IxDyn, ShapeBuilder, Zip};
use tracing::{debug, instrument, warn};

use crate::{
    anisotropic::AnisotropicKernel,
    bounds::KernelBounds,
    config::AdjointConfig,
    error::{InterpolationError, Result},
    grid::{Grid, GridSpec, Image},
    kernel::GaussianKernel,
    partition::ThreadPartitioner,
    transform::{IdentityTransform, Transform},
    types::{ContinuousIndex, Matrix, Point, Value, Vector},
};

/// Destination buffer of one splatting worker.
///
/// Tracks which voxels received any weight so untouched voxels can be given
/// the default fill value once all partial buffers are merged.
#[derive(Debug, Clone)]
pub struct SplatAccumulator {
    values: ArrayD<Value>,
    touched: ArrayD<bool>,
    dropped: usize,
}

impl SplatAccumulator {
    /// Creates a zeroed accumulator for a destination grid of `size`, laid out
    /// column-major like [`Image`] buffers.
    pub fn new(size: &[usize]) -> Self {
        Self {
            values: ArrayD::zeros(IxDyn(size).f()),
            touched: ArrayD::from_elem(IxDyn(size).f(), false),
            dropped: 0,
        }
    }

    /// Splats `value`, centred at destination index `center`, into the box
    /// `bounds` selects around it.
    ///
    /// ```text
    /// pass 1:  localSum  = Σ_box w(i)
    /// pass 2:  acc[i]   += value · w(i) / localSum
    /// ```
    ///
    /// Returns `false` and leaves the values unchanged if the box is empty or
    /// carries no weight.
    pub fn splat<const D: usize>(
        &mut self,
        bounds: &KernelBounds<D>,
        kernel: &AnisotropicKernel<D>,
        center: &ContinuousIndex<D>,
        value: Value,
    ) -> bool {
        let region = bounds.region(center);
        let local_sum: Value = region.iter().map(|index| kernel.weight(&index, center)).sum();
        if !(local_sum > 0.0 && local_sum.is_finite()) {
            self.dropped += 1;
            return false;
        }

        for index in region.iter() {
            let w = kernel.weight(&index, center);
            if w > 0.0 {
                self.values[&index[..]] += value * w / local_sum;
                self.touched[&index[..]] = true;
            }
        }
        true
    }

    /// Adds another worker's contributions into this one.
    pub fn merge(&mut self, other: &SplatAccumulator) {
        self.values += &other.values;
        Zip::from(&mut self.touched)
            .and(&other.touched)
            .for_each(|touched, &other| *touched |= other);
        self.dropped += other.dropped;
    }

    /// Number of samples whose support was empty.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Accumulated values; untouched voxels are still zero.
    pub fn values(&self) -> &ArrayD<Value> {
        &self.values
    }

    /// Finishes the buffer as an image on `grid`, writing `default_value` to
    /// every voxel that received no contribution.
    pub fn into_image<const D: usize>(self, grid: GridSpec<D>, default_value: Value) -> Result<Image<D>> {
        let Self {
            mut values,
            touched,
            ..
        } = self;
        Zip::from(&mut values).and(&touched).for_each(|value, &touched| {
            if !touched {
                *value = default_value;
            }
        });
        Image::from_array(grid, values)
    }
}

/// Scatters every voxel of `source` onto the `output` grid through
/// `transform`, weighting each sample by the locally normalized oriented
/// Gaussian `kernel`.
///
/// This is the transpose of [`GaussianInterpolator`] with the
/// [`Anisotropic`](crate::forward::KernelStrategy::Anisotropic) strategy:
/// for any `x` on the source grid and `y` on the output grid,
/// `⟨adjoint(x), y⟩ = ⟨x, forward(y)⟩` where `forward` samples `y` at the
/// transformed source voxel centres.
///
/// The source voxels are split into one contiguous range per worker. Each
/// worker accumulates into a private [`SplatAccumulator`]; the partial buffers
/// are summed in partition order after all workers have joined, so the result
/// is reproducible for a given thread count.
///
/// [`GaussianInterpolator`]: crate::forward::GaussianInterpolator
#[instrument(skip_all, fields(samples = source.len(), output = ?output.size()))]
pub fn evaluate_adjoint<const D: usize>(
    source: &Image<D>,
    output: &GridSpec<D>,
    transform: &dyn Transform<D>,
    kernel: &GaussianKernel<D>,
    config: &AdjointConfig,
) -> Result<Image<D>> {
    if output.is_empty() {
        return Err(InterpolationError::MissingInput("output grid"));
    }

    let spacing = output.spacing();
    let bounds = KernelBounds::compute(output.size(), &spacing, kernel)?;
    let anisotropic = AnisotropicKernel::new(kernel, &spacing);
    let source_region = source.region();
    let cancel: Option<&AtomicBool> = config.cancel.as_deref();
    let partitioner = ThreadPartitioner::new(config.worker_count());
    debug!(
        workers = partitioner.workers(),
        scratch_voxels = partitioner.workers().min(source_region.len()) * output.len(),
        "splatting"
    );

    let partials = partitioner
        .run(source_region.len(), |_, range| {
            let mut accumulator = SplatAccumulator::new(&output.size());
            for index in source_region.iter_range(range) {
                if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                    return Err(InterpolationError::Cancelled);
                }
                let point = transform.transform_point(&source.discrete_to_physical(&index));
                let center = output.physical_to_continuous_index(&point);
                accumulator.splat(&bounds, &anisotropic, &center, source.get(&index));
            }
            Ok(accumulator)
        })
        .inspect_err(|e| warn!(error = %e, "adjoint pass aborted"))?;

    let total = partials
        .into_iter()
        .reduce(|mut total, partial| {
            total.merge(&partial);
            total
        })
        .unwrap_or_else(|| SplatAccumulator::new(&output.size()));
    if total.dropped() > 0 {
        debug!(dropped = total.dropped(), "samples with empty support");
    }

    total.into_image(output.clone(), config.default_value)
}

/// Adjoint oriented Gaussian interpolation as a configurable filter.
///
/// Defaults: sigma 1, alpha 1, identity transform, an unset output grid,
/// default fill value 0 and rayon's default thread count.
///
/// ```rust,ignore
/// let mut filter = AdjointGaussianFilter::new();
/// filter.set_input(Arc::new(source));
/// filter.set_transform(Arc::new(AffineTransform::new(rotation, offset)));
/// filter.set_output_parameters_from_image(&reference);
/// filter.set_covariance(covariance)?;
/// let projected = filter.update()?;
/// ```
pub struct AdjointGaussianFilter<const D: usize> {
    input: Option<Arc<Image<D>>>,
    transform: Arc<dyn Transform<D>>,
    kernel: GaussianKernel<D>,
    output: GridSpec<D>,
    config: AdjointConfig,
}

impl<const D: usize> Default for AdjointGaussianFilter<D> {
    fn default() -> Self {
        Self {
            input: None,
            transform: Arc::new(IdentityTransform),
            kernel: GaussianKernel::default(),
            output: GridSpec::new([0; D]),
            config: AdjointConfig::default(),
        }
    }
}

impl<const D: usize> AdjointGaussianFilter<D> {
    /// Creates a filter with the defaults listed above.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the image whose voxels are splatted.
    pub fn set_input(&mut self, image: Arc<Image<D>>) {
        self.input = Some(image);
    }

    /// Sets the source-to-output point mapping. Default: identity.
    pub fn set_transform(&mut self, transform: Arc<dyn Transform<D>>) {
        self.transform = transform;
    }

    /// The kernel splatted around each sample.
    pub fn kernel(&self) -> &GaussianKernel<D> {
        &self.kernel
    }

    /// Replaces the kernel, including alpha.
    pub fn set_kernel(&mut self, kernel: GaussianKernel<D>) {
        self.kernel = kernel;
    }

    /// Sets an axis-aligned kernel, keeping alpha.
    pub fn set_sigma(&mut self, sigma: Vector<D>) -> Result<()> {
        self.kernel = GaussianKernel::from_sigma(sigma, self.kernel.alpha())?;
        Ok(())
    }

    /// Sets a full covariance, keeping alpha.
    pub fn set_covariance(&mut self, covariance: Matrix<D>) -> Result<()> {
        self.kernel = GaussianKernel::from_covariance(covariance, self.kernel.alpha())?;
        Ok(())
    }

    /// Sets the cutoff multiplier, keeping the covariance.
    pub fn set_alpha(&mut self, alpha: Value) -> Result<()> {
        self.kernel = self.kernel.with_alpha(alpha)?;
        Ok(())
    }

    /// Geometry of the image [`update`](Self::update) produces.
    pub fn output_grid(&self) -> &GridSpec<D> {
        &self.output
    }

    /// Replaces the whole output geometry.
    pub fn set_output_grid(&mut self, grid: GridSpec<D>) {
        self.output = grid;
    }

    /// Copies origin, spacing, direction, size and start index from `image`.
    pub fn set_output_parameters_from_image(&mut self, image: &Image<D>) {
        self.output = image.grid().clone();
    }

    /// Sets the number of output voxels per axis.
    pub fn set_size(&mut self, size: [usize; D]) {
        self.output = self.output.clone().with_size(size);
    }

    /// Sets the physical position of output index zero.
    pub fn set_output_origin(&mut self, origin: Point<D>) {
        self.output = self.output.clone().with_origin(origin);
    }

    /// Sets the output start index used by the physical mapping.
    pub fn set_output_start_index(&mut self, start_index: [i64; D]) {
        self.output = self.output.clone().with_start_index(start_index);
    }

    /// Sets the output voxel spacing; fails on non-positive entries.
    pub fn set_output_spacing(&mut self, spacing: Vector<D>) -> Result<()> {
        self.output = self.output.clone().with_spacing(spacing)?;
        Ok(())
    }

    /// Sets the output direction cosines; fails on a singular matrix.
    pub fn set_output_direction(&mut self, direction: Matrix<D>) -> Result<()> {
        self.output = self.output.clone().with_direction(direction)?;
        Ok(())
    }

    /// Execution options of the splatting pass.
    pub fn config(&self) -> &AdjointConfig {
        &self.config
    }

    /// Replaces all execution options at once.
    pub fn set_config(&mut self, config: AdjointConfig) {
        self.config = config;
    }

    /// Value written to output voxels no sample reached.
    pub fn set_default_value(&mut self, default_value: Value) {
        self.config.default_value = default_value;
    }

    /// Worker count; see [`AdjointConfig::threads`].
    pub fn set_threads(&mut self, threads: usize) {
        self.config.threads = threads;
    }

    /// Runs the splatting pass and returns the accumulated output image.
    ///
    /// Returns [`InterpolationError::MissingInput`] if no input image is set
    /// or the output grid has no voxels.
    pub fn update(&self) -> Result<Image<D>> {
        let input = self
            .input
            .as_ref()
            .ok_or(InterpolationError::MissingInput("input image"))?;
        evaluate_adjoint(
            input,
            &self.output,
            self.transform.as_ref(),
            &self.kernel,
            &self.config,
        )
    }
}
