use std::sync::Arc;

use approx::assert_relative_eq;
use nalgebra::{Rotation2, Rotation3};
use oriented_gaussian::{
    AdjointConfig, AdjointGaussianFilter, GaussianInterpolator, GaussianKernel, Grid, GridSpec,
    Image, KernelStrategy,
    transform::{AffineTransform, IdentityTransform, Transform},
    types::{Matrix, Point, Value, Vector},
};
use rand::{Rng, SeedableRng, rngs::StdRng};

fn random_image<const D: usize>(grid: GridSpec<D>, rng: &mut StdRng, range: std::ops::Range<Value>) -> Image<D> {
    let mut image = Image::new(grid);
    image.for_each_voxel(|_, _, value| *value = rng.random_range(range.clone()));
    image
}

/// Samples `forward` at every transformed voxel centre of `source_grid`.
fn pull_back<const D: usize>(
    forward: &GaussianInterpolator<D>,
    source_grid: &GridSpec<D>,
    transform: &dyn Transform<D>,
) -> Image<D> {
    let mut pulled = Image::new(source_grid.clone());
    for index in source_grid.region().iter() {
        let point = transform.transform_point(&source_grid.discrete_to_physical(&index));
        pulled.set(&index, forward.evaluate_at_point(&point).expect("forward evaluation"));
    }
    pulled
}

#[test]
fn anisotropic_adjoint_is_the_exact_transpose() {
    let mut rng = StdRng::seed_from_u64(0xA11CE);

    let source_grid = GridSpec::new([12, 10])
        .with_spacing(Vector::<2>::new(1.0, 0.8))
        .expect("valid spacing");
    let output_grid = GridSpec::new([14, 11])
        .with_spacing(Vector::<2>::new(0.9, 1.1))
        .and_then(|g| g.with_direction(Rotation2::new(0.2).into_inner()))
        .expect("valid grid")
        .with_origin(Point::<2>::new(-1.0, 0.5))
        .with_start_index([1, -2]);
    let transform = AffineTransform::new(Rotation2::new(0.3).into_inner(), Vector::<2>::new(0.4, -0.3))
        .with_center(Point::<2>::new(5.0, 4.0));
    let kernel = GaussianKernel::from_covariance(Matrix::<2>::new(2.0, 0.5, 0.5, 1.0), 3.0)
        .expect("valid kernel");

    let x = random_image(source_grid.clone(), &mut rng, -1.0..1.0);
    let y = random_image(output_grid.clone(), &mut rng, -1.0..1.0);

    let mut adjoint = AdjointGaussianFilter::new();
    adjoint.set_input(Arc::new(x.clone()));
    adjoint.set_transform(Arc::new(transform.clone()));
    adjoint.set_output_grid(output_grid);
    adjoint.set_kernel(kernel.clone());
    adjoint.set_threads(3);
    let ax = adjoint.update().expect("adjoint pass");

    let forward = GaussianInterpolator::new()
        .with_image(Arc::new(y.clone()))
        .with_kernel(kernel)
        .and_then(|f| f.with_strategy(KernelStrategy::Anisotropic))
        .expect("valid forward setup");
    let fy = pull_back(&forward, &source_grid, &transform);

    let lhs = ax.dot(&y).expect("same grid");
    let rhs = x.dot(&fy).expect("same grid");
    assert_relative_eq!(lhs, rhs, max_relative = 1e-10);
}

#[test]
fn anisotropic_adjoint_is_exact_in_three_dimensions() {
    let mut rng = StdRng::seed_from_u64(42);

    let grid = GridSpec::new([7, 6, 5])
        .with_spacing(Vector::<3>::new(1.0, 1.2, 0.9))
        .expect("valid spacing");
    let rotation = Rotation3::from_euler_angles(0.1, -0.2, 0.3).into_inner();
    let transform = AffineTransform::new(rotation, Vector::<3>::new(0.2, 0.1, -0.1))
        .with_center(Point::<3>::new(3.0, 3.0, 2.0));
    let covariance = rotation * Matrix::<3>::from_diagonal(&Vector::<3>::new(1.5, 0.8, 1.0)) * rotation.transpose();
    let kernel = GaussianKernel::from_covariance(covariance, 2.5).expect("valid kernel");

    let x = random_image(grid.clone(), &mut rng, -1.0..1.0);
    let y = random_image(grid.clone(), &mut rng, -1.0..1.0);

    let ax = oriented_gaussian::evaluate_adjoint(&x, &grid, &transform, &kernel, &AdjointConfig::default())
        .expect("adjoint pass");
    let forward = GaussianInterpolator::new()
        .with_image(Arc::new(y.clone()))
        .with_kernel(kernel)
        .and_then(|f| f.with_strategy(KernelStrategy::Anisotropic))
        .expect("valid forward setup");
    let fy = pull_back(&forward, &grid, &transform);

    assert_relative_eq!(
        ax.dot(&y).expect("same grid"),
        x.dot(&fy).expect("same grid"),
        max_relative = 1e-10
    );
}

#[test]
fn separable_forward_is_close_to_the_adjoint_transpose() {
    let mut rng = StdRng::seed_from_u64(7);

    let grid = GridSpec::new([24, 20]);
    let transform = AffineTransform::from_translation(Vector::<2>::new(0.3, -0.2));
    let kernel = GaussianKernel::from_sigma(Vector::<2>::new(2.0, 1.5), 3.0).expect("valid kernel");

    let x = random_image(grid.clone(), &mut rng, 0.5..1.5);
    let y = random_image(grid.clone(), &mut rng, 0.5..1.5);

    let ax = oriented_gaussian::evaluate_adjoint(&x, &grid, &transform, &kernel, &AdjointConfig::default())
        .expect("adjoint pass");
    let forward = GaussianInterpolator::new()
        .with_image(Arc::new(y.clone()))
        .with_kernel(kernel)
        .and_then(|f| f.with_strategy(KernelStrategy::Separable))
        .expect("valid forward setup");
    let fy = pull_back(&forward, &grid, &transform);

    assert_relative_eq!(
        ax.dot(&y).expect("same grid"),
        x.dot(&fy).expect("same grid"),
        max_relative = 1e-2
    );
}

#[test]
fn thread_count_does_not_change_the_result() {
    let mut rng = StdRng::seed_from_u64(1234);

    let grid = GridSpec::new([16, 13]);
    let kernel = GaussianKernel::from_covariance(Matrix::<2>::new(1.5, -0.4, -0.4, 0.9), 2.0)
        .expect("valid kernel");
    let x = random_image(grid.clone(), &mut rng, -1.0..1.0);
    let transform = AffineTransform::new(Rotation2::new(-0.4).into_inner(), Vector::<2>::zeros())
        .with_center(Point::<2>::new(8.0, 6.0));

    let single = oriented_gaussian::evaluate_adjoint(
        &x,
        &grid,
        &transform,
        &kernel,
        &AdjointConfig::default().with_threads(1),
    )
    .expect("single-threaded pass");

    for threads in [2, 3, 8, 64] {
        let multi = oriented_gaussian::evaluate_adjoint(
            &x,
            &grid,
            &transform,
            &kernel,
            &AdjointConfig::default().with_threads(threads),
        )
        .expect("multi-threaded pass");
        for (a, b) in single.data().iter().zip(multi.data().iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }

        let again = oriented_gaussian::evaluate_adjoint(
            &x,
            &grid,
            &transform,
            &kernel,
            &AdjointConfig::default().with_threads(threads),
        )
        .expect("repeat pass");
        assert_eq!(multi, again);
    }
}

#[test]
fn mass_is_conserved_when_every_sample_lands_inside() {
    let mut rng = StdRng::seed_from_u64(99);

    let source = random_image(GridSpec::new([6, 6]), &mut rng, 0.0..2.0);
    let output = GridSpec::new([20, 20]).with_origin(Point::<2>::new(-7.0, -7.0));
    let kernel = GaussianKernel::from_sigma(Vector::<2>::new(1.2, 0.7), 3.0).expect("valid kernel");

    let out = oriented_gaussian::evaluate_adjoint(
        &source,
        &output,
        &IdentityTransform,
        &kernel,
        &AdjointConfig::default().with_threads(4),
    )
    .expect("adjoint pass");

    assert_relative_eq!(out.data().sum(), source.data().sum(), max_relative = 1e-12);
}
