//! Per-call worker pools for batch queries.
//!
//! Each batch runs on a dedicated rayon pool of exactly `num_threads`
//! workers. Indexed parallel collection keeps one output per input, in input
//! order, whatever the completion order.

use crate::config;
use crate::error::{Error, Result};
use rayon::prelude::*;

/// Check a caller-supplied worker count.
pub fn validate_threads(num_threads: usize) -> Result<()> {
    if num_threads == 0 || num_threads > config::MAX_QUERY_THREADS {
        return Err(Error::Validation(format!(
            "num_threads {num_threads} out of range [1, {}]",
            config::MAX_QUERY_THREADS
        )));
    }
    Ok(())
}

/// Apply `f` to every item on `num_threads` workers, preserving input order.
pub fn run_batch<T, R, F>(items: &[T], num_threads: usize, f: F) -> Result<Vec<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync + Send,
{
    validate_threads(num_threads)?;
    if num_threads == 1 || items.len() <= 1 {
        return Ok(items.iter().map(f).collect());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads.min(items.len()))
        .thread_name(|i| format!("nearstore-query-{i}"))
        .build()
        .map_err(|e| Error::Io(std::io::Error::other(e)))?;

    Ok(pool.install(|| items.par_iter().map(&f).collect()))
}
