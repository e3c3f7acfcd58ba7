use std::{f64::consts::FRAC_PI_6, sync::Arc};

use nalgebra::Rotation2;
use oriented_gaussian::{
    AdjointGaussianFilter, GaussianInterpolator, GaussianKernel, Grid, GridSpec, Image,
    KernelStrategy, Result,
    transform::{AffineTransform, Transform},
    types::{Matrix, Point, Vector},
};

fn main() -> Result<()> {
    const RESOLUTION: usize = 64;

    let grid = GridSpec::new([RESOLUTION, RESOLUTION])
        .with_spacing(Vector::<2>::new(0.5, 0.5))?
        .with_origin(Point::<2>::new(-16.0, -16.0));

    // A soft disc with radius 8.
    let mut source = Image::new(grid.clone());
    source.fill(&|p: Point<2>| 1.0 / (1.0 + ((p.coords.norm() - 8.0) * 2.0).exp()));
    let source = Arc::new(source);

    let rotation = Rotation2::new(FRAC_PI_6).into_inner();
    let transform = Arc::new(AffineTransform::new(rotation, Vector::<2>::new(2.0, -1.0)));
    // Stretched along the x axis, then rotated with the transform.
    let covariance: Matrix<2> =
        rotation * Matrix::<2>::from_diagonal(&Vector::<2>::new(1.0, 0.25)) * rotation.transpose();

    let mut adjoint = AdjointGaussianFilter::new();
    adjoint.set_input(source.clone());
    adjoint.set_transform(transform.clone());
    adjoint.set_output_parameters_from_image(&source);
    adjoint.set_covariance(covariance)?;
    adjoint.set_alpha(3.0)?;
    let splatted = adjoint.update()?;

    let probe = {
        let mut probe = Image::new(grid.clone());
        probe.fill(&|p: Point<2>| (0.3 * p.x).sin() * (0.2 * p.y).cos());
        probe
    };

    // ⟨adjoint(source), probe⟩ against ⟨source, forward(probe)⟩
    let forward = GaussianInterpolator::new()
        .with_image(Arc::new(probe.clone()))
        .with_kernel(GaussianKernel::from_covariance(covariance, 3.0)?)?
        .with_strategy(KernelStrategy::Anisotropic)?;
    let mut pulled = Image::new(grid);
    for index in source.region().iter() {
        let point = transform.transform_point(&source.discrete_to_physical(&index));
        pulled.set(&index, forward.evaluate_at_point(&point)?);
    }

    let lhs = splatted.dot(&probe)?;
    let rhs = source.dot(&pulled)?;
    println!("source mass     {:>12.6}", source.data().sum());
    println!("splatted mass   {:>12.6}", splatted.data().sum());
    println!("<A x, y>        {lhs:>12.6}");
    println!("<x, F y>        {rhs:>12.6}");
    println!("relative error  {:>12.3e}", (lhs - rhs).abs() / lhs.abs().max(1e-300));

    Ok(())
}
