use crate::types::{Matrix, Point, Vector};

/// Maps a physical point in the source space to a physical point in the
/// destination space. No inverse is required.
pub trait Transform<const D: usize>: Send + Sync {
    fn transform_point(&self, point: &Point<D>) -> Point<D>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransform;

impl<const D: usize> Transform<D> for IdentityTransform {
    #[inline]
    fn transform_point(&self, point: &Point<D>) -> Point<D> {
        *point
    }
}

/// Matrix-plus-offset transform about a fixed centre:
///
/// ```text
/// p' = matrix · (p − center) + center + translation
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AffineTransform<const D: usize> {
    matrix: Matrix<D>,
    center: Point<D>,
    translation: Vector<D>,
}

impl<const D: usize> Default for AffineTransform<D> {
    fn default() -> Self {
        Self {
            matrix: Matrix::<D>::identity(),
            center: Point::<D>::origin(),
            translation: Vector::<D>::zeros(),
        }
    }
}

impl<const D: usize> AffineTransform<D> {
    /// Creates `p' = matrix · p + translation` about the origin.
    pub fn new(matrix: Matrix<D>, translation: Vector<D>) -> Self {
        Self {
            matrix,
            translation,
            ..Default::default()
        }
    }

    /// A pure shift.
    pub fn from_translation(translation: Vector<D>) -> Self {
        Self::new(Matrix::<D>::identity(), translation)
    }

    /// Sets the fixed point about which `matrix` is applied.
    pub fn with_center(mut self, center: Point<D>) -> Self {
        self.center = center;
        self
    }

    pub fn matrix(&self) -> &Matrix<D> {
        &self.matrix
    }
}

impl<const D: usize> Transform<D> for AffineTransform<D> {
    #[inline]
    fn transform_point(&self, point: &Point<D>) -> Point<D> {
        Point::from(
            self.matrix * (point.coords - self.center.coords)
                + self.center.coords
                + self.translation,
        )
    }
}

/// Adapts a closure into a [`Transform`].
///
/// ```rust,ignore
/// let swirl = FnTransform(|p: &Point<2>| Point::new(p.x + 0.1 * p.y, p.y));
/// ```
pub struct FnTransform<F>(pub F);

impl<const D: usize, F> Transform<D> for FnTransform<F>
where
    F: Fn(&Point<D>) -> Point<D> + Send + Sync,
{
    #[inline]
    fn transform_point(&self, point: &Point<D>) -> Point<D> {
        (self.0)(point)
    }
}
