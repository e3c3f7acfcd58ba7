use std::ops::Range;

use rayon::{
    ThreadPoolBuilder,
    iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator},
};
use tracing::debug;

use crate::error::Result;

/// Splits a linear domain into contiguous per-worker ranges and runs one task
/// per range in parallel.
///
/// The split depends only on the domain length and the worker count, so the
/// same inputs always give the same partitions:
///
/// ```text
/// len = 10, workers = 4
///   [0..3) [3..6) [6..8) [8..10)
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ThreadPartitioner {
    workers: usize,
}

impl ThreadPartitioner {
    /// Creates a partitioner for `workers` threads (at least one).
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    /// Upper bound on the number of partitions.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Disjoint ranges covering `0..len`, at most one per worker. Lengths
    /// differ by at most one; the longer ranges come first.
    pub fn split(&self, len: usize) -> Vec<Range<usize>> {
        let parts = self.workers.min(len);
        if parts == 0 {
            return Vec::new();
        }
        let base = len / parts;
        let extra = len % parts;

        let mut ranges = Vec::with_capacity(parts);
        let mut start = 0;
        for part in 0..parts {
            let end = start + base + usize::from(part < extra);
            ranges.push(start..end);
            start = end;
        }
        ranges
    }

    /// Runs `task(partition, range)` for every range of [`split`] on a
    /// dedicated pool with one thread per range.
    ///
    /// Returns once every task has finished, with the results in partition
    /// order. The first error reported by any task is returned instead.
    ///
    /// [`split`]: ThreadPartitioner::split
    pub fn run<T, F>(&self, len: usize, task: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(usize, Range<usize>) -> Result<T> + Sync,
    {
        let ranges = self.split(len);
        debug!(len, partitions = ranges.len(), "partitioned domain");

        if ranges.len() <= 1 {
            return ranges
                .into_iter()
                .enumerate()
                .map(|(partition, range)| task(partition, range))
                .collect();
        }

        let pool = ThreadPoolBuilder::new().num_threads(ranges.len()).build()?;
        pool.install(|| {
            ranges
                .into_par_iter()
                .enumerate()
                .map(|(partition, range)| task(partition, range))
                .collect()
        })
    }
}
