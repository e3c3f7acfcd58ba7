use std::ops::Range;

use ndarray::{ArrayD, IxDyn, ShapeBuilder};

use crate::{
    error::{InterpolationError, Result},
    types::{ContinuousIndex, DiscreteIndex, Matrix, Point, Value, Vector},
};

/// Geometry collaborator consumed by both evaluators.
///
/// Index space is buffer-relative: index `0` along an axis is the first stored
/// voxel, whatever the grid's start index is.
pub trait Grid<const D: usize> {
    /// Number of voxels along each axis.
    fn size(&self) -> [usize; D];

    /// Physical distance between neighbouring voxel centres along each axis.
    fn spacing(&self) -> Vector<D>;

    /// Maps a continuous index to a physical point.
    fn index_to_physical(&self, index: &ContinuousIndex<D>) -> Point<D>;

    /// Maps a physical point to a continuous index. Points outside the grid
    /// map to indices outside `[0, size)`.
    fn physical_to_continuous_index(&self, point: &Point<D>) -> ContinuousIndex<D>;

    fn discrete_to_physical(&self, index: &DiscreteIndex<D>) -> Point<D> {
        self.index_to_physical(&ContinuousIndex::<D>::from_fn(|d, _| index[d] as Value))
    }

    /// Total number of voxels.
    fn len(&self) -> usize {
        self.size().iter().product()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The region covering every stored voxel.
    fn region(&self) -> Region<D> {
        Region::new([0; D], self.size())
    }
}

/// Origin, spacing, direction, size and start index of a regular grid.
///
/// ```text
/// physical = origin + direction · diag(spacing) · (start_index + index)
/// ```
///
/// The combined matrix and its inverse are rebuilt by every setter that
/// touches spacing or direction, so the mappings never read stale state.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSpec<const D: usize> {
    size: [usize; D],
    origin: Point<D>,
    spacing: Vector<D>,
    direction: Matrix<D>,
    start_index: [i64; D],
    index_to_physical: Matrix<D>,
    physical_to_index: Matrix<D>,
}

impl<const D: usize> GridSpec<D> {
    /// Creates a grid with unit spacing, zero origin and identity direction.
    pub fn new(size: [usize; D]) -> Self {
        Self {
            size,
            origin: Point::<D>::origin(),
            spacing: Vector::<D>::from_element(1.0),
            direction: Matrix::<D>::identity(),
            start_index: [0; D],
            index_to_physical: Matrix::<D>::identity(),
            physical_to_index: Matrix::<D>::identity(),
        }
    }

    /// Sets the number of voxels per axis.
    pub fn with_size(mut self, size: [usize; D]) -> Self {
        self.size = size;
        self
    }

    /// Sets the physical position of the voxel at `start_index`.
    pub fn with_origin(mut self, origin: Point<D>) -> Self {
        self.origin = origin;
        self
    }

    /// Sets the index of the first stored voxel, used only by the physical mapping.
    pub fn with_start_index(mut self, start_index: [i64; D]) -> Self {
        self.start_index = start_index;
        self
    }

    /// Sets the voxel spacing.
    ///
    /// Returns [`InterpolationError::InvalidGrid`] if any component is not a
    /// positive finite number.
    pub fn with_spacing(mut self, spacing: Vector<D>) -> Result<Self> {
        if let Some(d) = spacing.iter().position(|s| !(s.is_finite() && *s > 0.0)) {
            return Err(InterpolationError::InvalidGrid(format!(
                "spacing[{d}] = {} must be positive",
                spacing[d]
            )));
        }
        self.spacing = spacing;
        self.rebuild_mapping()?;
        Ok(self)
    }

    /// Sets the direction cosines. The matrix must be invertible.
    pub fn with_direction(mut self, direction: Matrix<D>) -> Result<Self> {
        self.direction = direction;
        self.rebuild_mapping()?;
        Ok(self)
    }

    fn rebuild_mapping(&mut self) -> Result<()> {
        let forward = self.direction * Matrix::<D>::from_diagonal(&self.spacing);
        let inverse = forward
            .try_inverse()
            .ok_or_else(|| InterpolationError::InvalidGrid("direction is singular".into()))?;
        self.index_to_physical = forward;
        self.physical_to_index = inverse;
        Ok(())
    }

    pub fn origin(&self) -> &Point<D> {
        &self.origin
    }

    pub fn direction(&self) -> &Matrix<D> {
        &self.direction
    }

    pub fn start_index(&self) -> [i64; D] {
        self.start_index
    }

    fn start_vector(&self) -> Vector<D> {
        Vector::<D>::from_fn(|d, _| self.start_index[d] as Value)
    }
}

impl<const D: usize> Grid<D> for GridSpec<D> {
    fn size(&self) -> [usize; D] {
        self.size
    }

    fn spacing(&self) -> Vector<D> {
        self.spacing
    }

    fn index_to_physical(&self, index: &ContinuousIndex<D>) -> Point<D> {
        Point::from(self.origin.coords + self.index_to_physical * (self.start_vector() + index))
    }

    fn physical_to_continuous_index(&self, point: &Point<D>) -> ContinuousIndex<D> {
        self.physical_to_index * (point.coords - self.origin.coords) - self.start_vector()
    }
}

/// A scalar image: a [`GridSpec`] plus one [`Value`] per voxel.
///
/// Values are stored in an [`ArrayD`] whose shape equals the grid size, so
/// `data[[i0, i1, ...]]` is the voxel at discrete index `[i0, i1, ...]`.
/// Buffers created here use column-major (Fortran) layout, matching the
/// axis-0-fastest order of [`Region`] iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct Image<const D: usize> {
    grid: GridSpec<D>,
    data: ArrayD<Value>,
}

impl<const D: usize> Image<D> {
    /// Creates an image with every voxel set to `0.0`.
    pub fn new(grid: GridSpec<D>) -> Self {
        Self::filled(grid, 0.0)
    }

    /// Creates an image with every voxel set to `value`.
    pub fn filled(grid: GridSpec<D>, value: Value) -> Self {
        let data = ArrayD::from_elem(IxDyn(&grid.size).f(), value);
        Self { grid, data }
    }

    /// Wraps an existing buffer. Any memory layout is accepted.
    ///
    /// Returns [`InterpolationError::DimensionMismatch`] if the array shape
    /// differs from the grid size.
    pub fn from_array(grid: GridSpec<D>, data: ArrayD<Value>) -> Result<Self> {
        if data.shape() != grid.size.as_slice() {
            return Err(InterpolationError::DimensionMismatch {
                expected: grid.size.to_vec(),
                actual: data.shape().to_vec(),
            });
        }
        Ok(Self { grid, data })
    }

    pub fn grid(&self) -> &GridSpec<D> {
        &self.grid
    }

    pub fn data(&self) -> &ArrayD<Value> {
        &self.data
    }

    /// Mutable access to the voxel buffer. The shape must not change.
    pub fn data_mut(&mut self) -> &mut ArrayD<Value> {
        &mut self.data
    }

    pub fn into_array(self) -> ArrayD<Value> {
        self.data
    }

    /// Returns the value at `index`.
    ///
    /// # Panics
    /// Panics if `index` is outside the grid.
    #[inline]
    pub fn get(&self, index: &DiscreteIndex<D>) -> Value {
        self.data[&index[..]]
    }

    /// Sets the value at `index`.
    #[inline]
    pub fn set(&mut self, index: &DiscreteIndex<D>, value: Value) {
        self.data[&index[..]] = value;
    }

    /// Calls `f(index, physical_point, &mut value)` for every voxel.
    pub fn for_each_voxel<F>(&mut self, mut f: F)
    where
        F: FnMut(&DiscreteIndex<D>, Point<D>, &mut Value),
    {
        for index in self.grid.region().iter() {
            let point = self.grid.discrete_to_physical(&index);
            f(&index, point, &mut self.data[&index[..]]);
        }
    }

    /// Fills the image by evaluating `function` at every voxel centre.
    pub fn fill(&mut self, function: &dyn Fn(Point<D>) -> Value) {
        self.for_each_voxel(|_, point, value| *value = function(point));
    }

    /// Voxel-wise inner product `Σ self·other`.
    ///
    /// Returns [`InterpolationError::DimensionMismatch`] if the sizes differ.
    pub fn dot(&self, other: &Image<D>) -> Result<Value> {
        if self.data.shape() != other.data.shape() {
            return Err(InterpolationError::DimensionMismatch {
                expected: self.data.shape().to_vec(),
                actual: other.data.shape().to_vec(),
            });
        }
        Ok(self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| a * b)
            .sum())
    }
}

impl<const D: usize> Grid<D> for Image<D> {
    fn size(&self) -> [usize; D] {
        self.grid.size()
    }

    fn spacing(&self) -> Vector<D> {
        self.grid.spacing()
    }

    fn index_to_physical(&self, index: &ContinuousIndex<D>) -> Point<D> {
        self.grid.index_to_physical(index)
    }

    fn physical_to_continuous_index(&self, point: &Point<D>) -> ContinuousIndex<D> {
        self.grid.physical_to_continuous_index(point)
    }
}

/// A half-open box of discrete indices, `[begin, end)` on every axis.
///
/// Iteration is in linear order with axis 0 varying fastest:
///
/// ```text
/// begin = [0, 0], end = [3, 2]
///   (0,0) (1,0) (2,0) (0,1) (1,1) (2,1)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region<const D: usize> {
    begin: [usize; D],
    end: [usize; D],
}

impl<const D: usize> Region<D> {
    /// Creates a region. An axis with `end < begin` is treated as empty.
    pub fn new(begin: [usize; D], end: [usize; D]) -> Self {
        let mut end = end;
        for d in 0..D {
            end[d] = end[d].max(begin[d]);
        }
        Self { begin, end }
    }

    pub fn begin(&self) -> [usize; D] {
        self.begin
    }

    pub fn end(&self) -> [usize; D] {
        self.end
    }

    pub fn extent(&self, axis: usize) -> usize {
        self.end[axis] - self.begin[axis]
    }

    pub fn len(&self) -> usize {
        (0..D).map(|d| self.extent(d)).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the index at linear position `offset`, or `None` past the end.
    pub fn index_at(&self, offset: usize) -> Option<DiscreteIndex<D>> {
        if offset >= self.len() {
            return None;
        }
        let mut rest = offset;
        let mut index = self.begin;
        for (d, slot) in index.iter_mut().enumerate() {
            let extent = self.extent(d);
            *slot += rest % extent;
            rest /= extent;
        }
        Some(index)
    }

    pub fn iter(&self) -> RegionIter<D> {
        self.iter_range(0..self.len())
    }

    /// Iterates the linear sub-range `range` of this region.
    pub fn iter_range(&self, range: Range<usize>) -> RegionIter<D> {
        let end = range.end.min(self.len());
        RegionIter {
            region: *self,
            next: self.index_at(range.start),
            remaining: end.saturating_sub(range.start),
        }
    }
}

impl<const D: usize> IntoIterator for &Region<D> {
    type Item = DiscreteIndex<D>;
    type IntoIter = RegionIter<D>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Odometer over a [`Region`].
pub struct RegionIter<const D: usize> {
    region: Region<D>,
    next: Option<DiscreteIndex<D>>,
    remaining: usize,
}

impl<const D: usize> Iterator for RegionIter<D> {
    type Item = DiscreteIndex<D>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let current = self.next?;
        self.remaining -= 1;

        let mut advanced = current;
        self.next = None;
        for d in 0..D {
            advanced[d] += 1;
            if advanced[d] < self.region.end[d] {
                self.next = Some(advanced);
                break;
            }
            advanced[d] = self.region.begin[d];
        }
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<const D: usize> ExactSizeIterator for RegionIter<D> {}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn region_iterates_axis_zero_fastest() {
        let region = Region::new([1, 0], [3, 2]);
        let visited: Vec<[usize; 2]> = region.iter().collect();

        assert_eq!(visited, vec![[1, 0], [2, 0], [1, 1], [2, 1]]);
        assert_eq!(region.len(), 4);
        assert_eq!(region.index_at(3), Some([2, 1]));
        assert_eq!(region.index_at(4), None);
    }

    #[test]
    fn region_sub_ranges_cover_the_whole_region() {
        let region = Region::new([0, 0, 0], [3, 2, 4]);
        let whole: Vec<_> = region.iter().collect();
        let mut pieces: Vec<_> = region.iter_range(0..7).collect();
        pieces.extend(region.iter_range(7..20));
        pieces.extend(region.iter_range(20..24));

        assert_eq!(whole, pieces);
    }

    #[test]
    fn empty_axis_makes_empty_region() {
        let region = Region::new([4, 0], [2, 5]);
        assert!(region.is_empty());
        assert_eq!(region.iter().count(), 0);
    }

    #[test]
    fn physical_mapping_round_trips() {
        let rotation = Matrix::<2>::new(0.0, -1.0, 1.0, 0.0);
        let grid = GridSpec::new([5, 7])
            .with_spacing(Vector::<2>::new(0.5, 2.0))
            .and_then(|g| g.with_direction(rotation))
            .expect("valid grid")
            .with_origin(Point::<2>::new(10.0, -3.0))
            .with_start_index([2, -1]);

        let index = ContinuousIndex::<2>::new(1.25, 3.5);
        let point = grid.index_to_physical(&index);
        // direction · diag(spacing) · (start + index) = R · (1.625, 5.0)
        assert_relative_eq!(point.x, 10.0 - 5.0, epsilon = 1e-12);
        assert_relative_eq!(point.y, -3.0 + 1.625, epsilon = 1e-12);

        let back = grid.physical_to_continuous_index(&point);
        assert_relative_eq!(back, index, epsilon = 1e-12);
    }

    #[test]
    fn invalid_spacing_and_direction_are_rejected() {
        assert!(matches!(
            GridSpec::<2>::new([2, 2]).with_spacing(Vector::<2>::new(1.0, 0.0)),
            Err(InterpolationError::InvalidGrid(_))
        ));
        assert!(matches!(
            GridSpec::<2>::new([2, 2]).with_direction(Matrix::<2>::zeros()),
            Err(InterpolationError::InvalidGrid(_))
        ));
    }

    #[test]
    fn image_fill_and_dot() {
        let grid = GridSpec::new([3, 2]);
        let mut image = Image::new(grid.clone());
        image.fill(&|p: Point<2>| p.x + 10.0 * p.y);

        assert_eq!(image.get(&[2, 1]), 12.0);
        image.set(&[0, 0], 5.0);
        assert_eq!(image.get(&[0, 0]), 5.0);

        let ones = Image::filled(grid, 1.0);
        let total = image.dot(&ones).expect("same size");
        assert_relative_eq!(total, 5.0 + 1.0 + 2.0 + 10.0 + 11.0 + 12.0);
    }

    #[test]
    fn region_order_follows_memory_order() {
        let grid = GridSpec::new([4, 3, 2]);
        let mut image = Image::new(grid.clone());
        for (n, index) in grid.region().iter().enumerate() {
            image.set(&index, n as Value);
        }

        let memory = image.data().as_slice_memory_order().expect("contiguous buffer");
        let expected: Vec<Value> = (0..grid.len()).map(|n| n as Value).collect();
        assert_eq!(memory, expected.as_slice());
    }

    #[test]
    fn from_array_checks_shape() {
        let grid = GridSpec::new([3, 2]);
        let wrong = ArrayD::zeros(IxDyn(&[2, 3]));
        assert!(matches!(
            Image::from_array(grid, wrong),
            Err(InterpolationError::DimensionMismatch { .. })
        ));
    }
}
