//! Parallel processing strategies

use rayon::prelude::*;
use tracing::warn;

/// Processing mode for tile iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingMode {
    /// Single-threaded processing, tiles in selection order
    #[default]
    Sequential,
    /// Parallel processing using all available cores
    Parallel,
    /// Parallel with specified number of threads
    ParallelWith(usize),
}

impl ProcessingMode {
    /// Mode for a `--jobs` style option: absent is sequential, `0` uses
    /// every core, `n` uses a pool of `n` threads.
    pub fn from_jobs(jobs: Option<usize>) -> Self {
        match jobs {
            None | Some(1) => ProcessingMode::Sequential,
            Some(0) => ProcessingMode::Parallel,
            Some(n) => ProcessingMode::ParallelWith(n),
        }
    }
}

/// Strategy for parallel execution
pub trait ParallelStrategy {
    /// Map a function over indices and collect results in index order
    fn par_map<T, F>(&self, range: std::ops::Range<usize>, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send;
}

impl ParallelStrategy for ProcessingMode {
    fn par_map<T, F>(&self, range: std::ops::Range<usize>, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        match self {
            ProcessingMode::Sequential => range.map(f).collect(),
            ProcessingMode::Parallel => range.into_par_iter().map(f).collect(),
            ProcessingMode::ParallelWith(threads) => {
                match rayon::ThreadPoolBuilder::new().num_threads(*threads).build() {
                    Ok(pool) => pool.install(|| range.into_par_iter().map(f).collect()),
                    Err(e) => {
                        warn!("Failed to build a {}-thread pool ({}), using the global pool", threads, e);
                        range.into_par_iter().map(f).collect()
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_jobs() {
        assert_eq!(ProcessingMode::from_jobs(None), ProcessingMode::Sequential);
        assert_eq!(ProcessingMode::from_jobs(Some(1)), ProcessingMode::Sequential);
        assert_eq!(ProcessingMode::from_jobs(Some(0)), ProcessingMode::Parallel);
        assert_eq!(ProcessingMode::from_jobs(Some(4)), ProcessingMode::ParallelWith(4));
    }

    #[test]
    fn test_par_map_keeps_order() {
        for mode in [
            ProcessingMode::Sequential,
            ProcessingMode::Parallel,
            ProcessingMode::ParallelWith(3),
        ] {
            let out = mode.par_map(0..100, |i| i * 2);
            assert_eq!(out, (0..100).map(|i| i * 2).collect::<Vec<_>>());
        }
    }
}
