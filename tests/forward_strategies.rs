use std::sync::Arc;

use approx::assert_relative_eq;
use oriented_gaussian::{
    GaussianInterpolator, GaussianKernel, GridSpec, Image, InterpolationError, KernelStrategy,
    types::{ContinuousIndex, Point, Vector},
};

fn smooth_image() -> Arc<Image<2>> {
    let grid = GridSpec::new([40, 36])
        .with_spacing(Vector::<2>::new(0.5, 0.75))
        .expect("valid spacing");
    let mut image = Image::new(grid);
    image.fill(&|p: Point<2>| (0.3 * p.x).sin() + 0.5 * (0.2 * p.y).cos());
    Arc::new(image)
}

#[test]
fn strategies_agree_on_a_diagonal_kernel() {
    let image = smooth_image();
    let kernel = GaussianKernel::from_sigma(Vector::<2>::new(1.5, 2.0), 3.0).expect("valid kernel");

    let separable = GaussianInterpolator::new()
        .with_image(image.clone())
        .with_kernel(kernel.clone())
        .and_then(|f| f.with_strategy(KernelStrategy::Separable))
        .expect("valid setup");
    let anisotropic = GaussianInterpolator::new()
        .with_image(image)
        .with_kernel(kernel)
        .and_then(|f| f.with_strategy(KernelStrategy::Anisotropic))
        .expect("valid setup");

    for cindex in [
        ContinuousIndex::<2>::new(20.0, 18.0),
        ContinuousIndex::<2>::new(12.3, 20.7),
        ContinuousIndex::<2>::new(27.5, 14.25),
    ] {
        let (a, grad_a) = separable.evaluate_with_gradient(&cindex).expect("separable");
        let (b, grad_b) = anisotropic.evaluate_with_gradient(&cindex).expect("anisotropic");
        assert_relative_eq!(a, b, epsilon = 1e-2);
        assert_relative_eq!(grad_a, grad_b, epsilon = 2e-2);
    }
}

#[test]
fn auto_strategy_follows_the_covariance() {
    let mut interpolator = GaussianInterpolator::<3>::new();
    assert_eq!(interpolator.resolved_strategy(), KernelStrategy::Separable);

    let rotated = oriented_gaussian::types::Matrix::<3>::new(
        2.0, 0.3, 0.0, //
        0.3, 1.0, 0.0, //
        0.0, 0.0, 1.0,
    );
    interpolator.set_covariance(rotated).expect("valid covariance");
    assert_eq!(interpolator.resolved_strategy(), KernelStrategy::Anisotropic);

    assert!(matches!(
        interpolator.set_strategy(KernelStrategy::Separable),
        Err(InterpolationError::InvalidKernelParameter(_))
    ));
}

#[test]
fn far_outside_queries_fall_back_to_the_default_value() {
    let mut image = Image::filled(GridSpec::new([5, 5, 5]), 3.0);
    image.set(&[2, 2, 2], 10.0);

    let mut interpolator = GaussianInterpolator::new().with_image(Arc::new(image));
    interpolator.set_default_value(-5.0);
    let far = ContinuousIndex::<3>::new(-100.0, 2.0, 2.0);

    for strategy in [KernelStrategy::Separable, KernelStrategy::Anisotropic] {
        interpolator.set_strategy(strategy).expect("diagonal kernel");

        assert_eq!(interpolator.evaluate(&far).expect("fallback"), -5.0);
        let (value, gradient) = interpolator.evaluate_with_gradient(&far).expect("fallback");
        assert_eq!(value, -5.0);
        assert_eq!(gradient, Vector::<3>::zeros());
        assert!(matches!(
            interpolator.try_evaluate(&far, false),
            Err(InterpolationError::DegenerateLocalSupport)
        ));

        // Just outside the grid but within the cutoff only the border face
        // contributes, and it is uniformly 3.
        let near = ContinuousIndex::<3>::new(-0.8, 2.0, 2.0);
        let value = interpolator.evaluate(&near).expect("border support");
        assert_relative_eq!(value, 3.0, epsilon = 1e-12);
    }
}
