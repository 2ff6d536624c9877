//! Batch executor: bounded fan-out of independent engine invocations.
//!
//! Items run on a dedicated pool of at most `workers` threads, so no more
//! than `workers` invocations are ever in flight. Results come back in input
//! order regardless of completion order, and a failing item only affects its
//! own slot.

use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::{GatewayError, GatewayResult};
use crate::genome::{MAX_WORKERS, MIN_WORKERS};

/// Run `invoke` over every item with at most `workers` concurrent calls.
///
/// `invoke` receives the item's index and the item. The returned vector has
/// exactly `items.len()` entries, entry `i` holding item `i`'s outcome. The
/// outer error is reserved for failing to start the workers themselves.
pub fn execute<T, R, F>(
    items: &[T],
    workers: usize,
    invoke: F,
) -> GatewayResult<Vec<GatewayResult<R>>>
where
    T: Sync,
    R: Send,
    F: Fn(usize, &T) -> GatewayResult<R> + Sync,
{
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let threads = workers.clamp(MIN_WORKERS, MAX_WORKERS).min(items.len());
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("batch-worker-{i}"))
        .build()
        .map_err(|e| GatewayError::WorkerPool(e.to_string()))?;

    info!(items = items.len(), workers = threads, "batch started");

    let results: Vec<GatewayResult<R>> = pool.install(|| {
        items
            .par_iter()
            .enumerate()
            .map(|(index, item)| {
                let result = invoke(index, item);
                if let Err(e) = &result {
                    debug!(index, kind = %e.kind(), "batch item failed");
                }
                result
            })
            .collect()
    });

    let failed = results.iter().filter(|r| r.is_err()).count();
    info!(items = results.len(), failed, "batch finished");
    Ok(results)
}
