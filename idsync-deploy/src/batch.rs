//! Bounded batch executor.
//!
//! Runs a worker over a list of items with at most `concurrency` futures in
//! flight. The first failure stops further dispatch; items already in flight
//! run to completion and their results are discarded.

use std::future::Future;

use futures::stream::{FuturesUnordered, StreamExt};

use crate::error::DeployError;

/// Run `worker` over `items` with at most `concurrency` calls in flight.
///
/// Results come back in completion order. `concurrency` below 1 is treated as
/// 1. On failure returns [`DeployError::Batch`] naming the first failing item.
pub async fn run_bounded<T, R, F, Fut>(
    phase: &'static str,
    items: Vec<T>,
    concurrency: usize,
    worker: F,
) -> Result<Vec<R>, DeployError>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R, DeployError>>,
{
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let limit = concurrency.max(1);
    let total = items.len();
    let mut pending = items.into_iter().enumerate();
    let mut in_flight = FuturesUnordered::new();
    let mut results = Vec::with_capacity(total);
    let mut failure: Option<(usize, DeployError)> = None;

    loop {
        while failure.is_none() && in_flight.len() < limit {
            let Some((index, item)) = pending.next() else {
                break;
            };
            tracing::debug!(phase, index, total, "dispatching batch item");
            let fut = worker(item);
            in_flight.push(async move { (index, fut.await) });
        }

        let Some((index, outcome)) = in_flight.next().await else {
            break;
        };
        match outcome {
            Ok(value) if failure.is_none() => results.push(value),
            Ok(_) => {}
            Err(err) => {
                if failure.is_none() {
                    tracing::warn!(phase, index, error = %err, "batch item failed; draining in-flight items");
                    failure = Some((index, err));
                } else {
                    tracing::debug!(phase, index, error = %err, "discarding failure while draining");
                }
            }
        }
    }

    match failure {
        Some((index, err)) => Err(DeployError::Batch {
            phase,
            index,
            source: Box::new(err),
        }),
        None => Ok(results),
    }
}
