//! Forward and adjoint interpolation with oriented, truncated Gaussian
//! kernels on N-dimensional regular grids.
//!
//! [`GaussianInterpolator`] samples an image at continuous indices;
//! [`AdjointGaussianFilter`] scatters an image onto another grid through a
//! spatial [`Transform`](transform::Transform) using the same kernel.

pub mod adjoint;
pub mod anisotropic;
pub mod bounds;
pub mod config;
pub mod error;
pub mod forward;
pub mod grid;
pub mod kernel;
pub mod partition;
pub mod separable;
pub mod transform;
pub mod types;

pub use adjoint::{AdjointGaussianFilter, evaluate_adjoint};
pub use config::AdjointConfig;
pub use error::{InterpolationError, Result};
pub use forward::{GaussianInterpolator, KernelStrategy};
pub use grid::{Grid, GridSpec, Image};
pub use kernel::GaussianKernel;
