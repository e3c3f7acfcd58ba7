use std::sync::{Arc, atomic::AtomicBool};

use crate::types::Value;

/// Standard deviation applied to every axis of a freshly created kernel.
pub const DEFAULT_SIGMA: Value = 1.0;

/// Cutoff multiplier (in standard deviations) of a freshly created kernel.
pub const DEFAULT_ALPHA: Value = 1.0;

/// Execution options for the adjoint splatting pass.
///
/// ```rust,ignore
/// let config = AdjointConfig::default().with_threads(8).with_default_value(-1.0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct AdjointConfig {
    /// Value written to destination voxels that received no contribution.
    /// Default: `0.0`.
    pub default_value: Value,

    /// Number of worker threads, one partition each.
    ///
    /// `0` uses rayon's default thread count. Default: `0`.
    ///
    /// Every worker owns a scratch copy of the output volume (one `f64` and
    /// one `bool` per voxel), so peak memory grows linearly with this count.
    /// Set it explicitly for large outputs on machines with many cores.
    pub threads: usize,

    /// Optional cooperative cancellation flag, checked between samples.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl AdjointConfig {
    /// Sets the value for output voxels no sample reached.
    pub fn with_default_value(mut self, default_value: Value) -> Self {
        self.default_value = default_value;
        self
    }

    /// Sets the worker count; `0` means rayon's default.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Sets a flag that aborts the pass with
    /// [`Cancelled`](crate::error::InterpolationError::Cancelled) once raised.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Resolves [`threads`](AdjointConfig::threads) to a concrete worker count.
    pub fn worker_count(&self) -> usize {
        if self.threads == 0 {
            rayon::current_num_threads()
        } else {
            self.threads
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_threads_resolves_to_the_rayon_default() {
        let config = AdjointConfig::default();
        assert_eq!(config.threads, 0);
        assert_eq!(config.worker_count(), rayon::current_num_threads());

        let config = config.with_threads(3).with_default_value(-2.0);
        assert_eq!(config.worker_count(), 3);
        assert_eq!(config.default_value, -2.0);
        assert!(config.cancel.is_none());
    }
}
