//! Concurrency core (C7).
//!
//! Query and subscription selections evaluate their sibling fields
//! concurrently; mutations, and any selection under a schema-wide serial
//! override, evaluate strictly one at a time in selection order (§5).
//! "Concurrently" here means interleaved on the current task via
//! `try_join_all` — the same model the wider async-graphql ecosystem
//! uses for this (no per-field OS thread or `tokio::spawn`, which would
//! also be incompatible with resolvers borrowing the request context).

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::FieldError;

/// Evaluates `futures` either concurrently or strictly in order,
/// according to `parallel`, preserving input order in the result either
/// way (§4.5 "Ordering"). Concurrent evaluation stops collecting as soon
/// as one sibling fails: `try_join_all` drops the remaining futures,
/// cancelling whatever they hadn't yet completed (§5, §9's "stop on first
/// error" resolution applies uniformly to both modes).
pub async fn evaluate_siblings<T, Fut>(parallel: bool, futures: Vec<Fut>) -> Result<Vec<T>, FieldError>
where
    Fut: Future<Output = Result<T, FieldError>>,
{
    if parallel {
        futures::future::try_join_all(futures).await
    } else {
        let mut out = Vec::with_capacity(futures.len());
        for fut in futures {
            out.push(fut.await?);
        }
        Ok(out)
    }
}

/// Races `fut` against `token` firing, returning [`FieldError::Cancelled`]
/// if the token wins.
pub async fn with_cancellation<T>(
    token: &CancellationToken,
    fut: impl Future<Output = Result<T, FieldError>>,
) -> Result<T, FieldError> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(FieldError::Cancelled),
        result = fut => result,
    }
}
