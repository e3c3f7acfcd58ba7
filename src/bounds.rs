use std::{array, f64::consts::SQRT_2, ops::Range};

use crate::{
    error::{InterpolationError, Result},
    grid::Region,
    kernel::GaussianKernel,
    types::{ContinuousIndex, Value, Vector},
};

/// Truncation data for one grid axis.
///
/// ```text
///   start = -0.5                                end = size - 0.5
///     |-----|-----|-----|-----|-----|-----|-----|
///                    <---cutoff--- c ---cutoff--->
///                   begin                       end (exclusive)
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisBounds {
    /// Lower edge of the first voxel cell, always `-0.5`.
    pub start: Value,
    /// Upper edge of the last voxel cell, `size - 0.5`.
    pub end: Value,
    /// Truncation radius in index units, `sigma * alpha / spacing`.
    pub cutoff: Value,
    /// Converts index distance to the error-function argument,
    /// `1 / (sqrt(2) * sigma / spacing)`.
    pub scaling: Value,
}

impl AxisBounds {
    /// Computes the bounds of one axis.
    ///
    /// Returns [`InterpolationError::InvalidKernelParameter`] if `sigma` or
    /// `spacing` is not strictly positive.
    pub fn compute(size: usize, spacing: Value, sigma: Value, alpha: Value) -> Result<Self> {
        if !(sigma.is_finite() && sigma > 0.0) {
            return Err(InterpolationError::InvalidKernelParameter(format!(
                "sigma = {sigma} must be positive"
            )));
        }
        if !(spacing.is_finite() && spacing > 0.0) {
            return Err(InterpolationError::InvalidKernelParameter(format!(
                "spacing = {spacing} must be positive"
            )));
        }

        Ok(Self {
            start: -0.5,
            end: size as Value - 0.5,
            cutoff: sigma * alpha / spacing,
            scaling: 1.0 / (SQRT_2 * sigma / spacing),
        })
    }

    /// Number of voxels along this axis.
    #[inline]
    pub fn box_size(&self) -> usize {
        (self.end - self.start + 0.5) as usize
    }

    /// Voxels within the cutoff of `c`, clamped to `[0, box_size)`.
    ///
    /// The range is empty when `c` lies further than the cutoff outside the
    /// grid or is not finite; it never panics for far-away centres.
    #[inline]
    pub fn support(&self, c: Value) -> Range<usize> {
        if !c.is_finite() {
            return 0..0;
        }
        let size = self.box_size() as Value;
        let begin = (c - self.start - self.cutoff).floor().clamp(0.0, size);
        let end = (c - self.start + self.cutoff).ceil().clamp(0.0, size);
        if end <= begin {
            return 0..0;
        }
        begin as usize..end as usize
    }
}

/// Per-axis [`AxisBounds`] of one kernel on one grid.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelBounds<const D: usize> {
    axes: [AxisBounds; D],
}

impl<const D: usize> KernelBounds<D> {
    /// Computes the bounds of every axis of a grid with `size` and `spacing`.
    pub fn compute(size: [usize; D], spacing: &Vector<D>, kernel: &GaussianKernel<D>) -> Result<Self> {
        let mut axes = [AxisBounds {
            start: -0.5,
            end: -0.5,
            cutoff: 0.0,
            scaling: 0.0,
        }; D];
        for (d, axis) in axes.iter_mut().enumerate() {
            *axis = AxisBounds::compute(size[d], spacing[d], kernel.sigma()[d], kernel.alpha())?;
        }
        Ok(Self { axes })
    }

    /// Bounds of axis `d`.
    pub fn axis(&self, d: usize) -> &AxisBounds {
        &self.axes[d]
    }

    /// The box of voxels within the cutoff of `center` on every axis.
    pub fn region(&self, center: &ContinuousIndex<D>) -> Region<D> {
        let ranges: [Range<usize>; D] = array::from_fn(|d| self.axes[d].support(center[d]));
        Region::new(
            array::from_fn(|d| ranges[d].start),
            array::from_fn(|d| ranges[d].end),
        )
    }
}
