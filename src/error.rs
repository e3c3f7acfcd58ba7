use derive_more::{Display, From};

pub type Result<T> = core::result::Result<T, InterpolationError>;

#[derive(Debug, Display, From)]
pub enum InterpolationError {
    /// Sigma, alpha or covariance cannot describe a Gaussian kernel.
    #[display("invalid kernel parameter: {_0}")]
    InvalidKernelParameter(String),

    /// Spacing or direction cannot describe a regular grid.
    #[display("invalid grid: {_0}")]
    InvalidGrid(String),

    /// An evaluation was started without one of its inputs bound.
    #[display("missing input: {_0}")]
    MissingInput(&'static str),

    /// No voxel lies within the kernel cutoff around the query.
    #[display("no voxel within the kernel cutoff")]
    DegenerateLocalSupport,

    /// An image buffer or operand has a different shape than expected.
    #[display("dimension mismatch: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// The cancellation flag was raised during an adjoint pass.
    #[display("cancelled")]
    Cancelled,

    /// The worker pool could not be built.
    #[display("thread pool: {_0}")]
    #[from]
    ThreadPool(rayon::ThreadPoolBuildError),
}

impl std::error::Error for InterpolationError {}
