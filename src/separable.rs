use std::{f64::consts::FRAC_2_SQRT_PI, ops::Range};

use crate::{bounds::AxisBounds, types::Value};

/// Per-voxel Gaussian mass along one axis around a continuous coordinate.
///
/// Only voxels inside [`range`](AxisWeights::range) carry weight; every other
/// voxel along the axis is implicitly zero. The arrays are a pure function of
/// the coordinate and the bounds and are rebuilt for every query.
///
/// ```text
///   t_i = (start - c + i) · scaling
///   weight[i]   = ½ (erf(t_{i+1}) − erf(t_i))
///   gradient[i] = ½ (g(t_{i+1}) − g(t_i)),   g(t) = 2/√π · exp(−t²)
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AxisWeights {
    range: Range<usize>,
    weights: Vec<Value>,
    gradient: Option<Vec<Value>>,
}

impl AxisWeights {
    /// Builds the weights of `bounds` around `c`, plus the derivative weights
    /// when `with_gradient` is set.
    pub fn compute(bounds: &AxisBounds, c: Value, with_gradient: bool) -> Self {
        let range = bounds.support(c);
        let len = range.len();
        let boundary = |i: usize| (bounds.start - c + i as Value) * bounds.scaling;

        let mut weights = Vec::with_capacity(len);
        let mut gradient = with_gradient.then(|| Vec::with_capacity(len));

        let mut t = boundary(range.start);
        let mut e_last = libm::erf(t);
        let mut g_last = gaussian_slope(t);
        for i in range.clone() {
            t = boundary(i + 1);
            let e_now = libm::erf(t);
            weights.push(0.5 * (e_now - e_last));
            e_last = e_now;

            if let Some(gradient) = gradient.as_mut() {
                let g_now = gaussian_slope(t);
                gradient.push(0.5 * (g_now - g_last));
                g_last = g_now;
            }
        }

        Self {
            range,
            weights,
            gradient,
        }
    }

    /// Voxels with non-zero weight.
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Weight of voxel `i`, zero outside [`range`](AxisWeights::range).
    #[inline]
    pub fn weight(&self, i: usize) -> Value {
        if self.range.contains(&i) {
            self.weights[i - self.range.start]
        } else {
            0.0
        }
    }

    /// Derivative weight of voxel `i`; zero outside the range or when the
    /// gradient was not requested.
    #[inline]
    pub fn gradient(&self, i: usize) -> Value {
        match &self.gradient {
            Some(gradient) if self.range.contains(&i) => gradient[i - self.range.start],
            _ => 0.0,
        }
    }

    pub fn weights(&self) -> &[Value] {
        &self.weights
    }
}

#[inline]
fn gaussian_slope(t: Value) -> Value {
    FRAC_2_SQRT_PI * (-t * t).exp()
}
