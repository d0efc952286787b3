//! Poll a probe until it succeeds or a deadline passes.
//!
//! Used by verification code that waits for Prometheus (or anything else that is
//! eventually consistent) to reflect a change. The poll runs on the caller's task;
//! dropping the returned future cancels it.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::*;

#[derive(Error, Debug)]
pub enum PollError<E> {
    /// No probe call finished with an error before the deadline.
    #[error("timed out waiting for the condition after {timeout:?}")]
    Timeout { timeout: Duration },

    /// The deadline passed; `source` is the most recent probe failure.
    #[error("timed out waiting for the condition after {timeout:?}: {source}")]
    LastError { timeout: Duration, source: E },
}

impl<E> PollError<E> {
    pub fn last_error(&self) -> Option<&E> {
        match self {
            PollError::Timeout { .. } => None,
            PollError::LastError { source, .. } => Some(source),
        }
    }
}

/// Call `probe` right away and then every `interval` until it returns `Ok`.
///
/// Gives up once the next attempt could not start before `timeout` has elapsed.
/// A single probe call is never allowed to run past the deadline.
pub async fn poll<F, Fut, E>(
    interval: Duration,
    timeout: Duration,
    mut probe: F,
) -> Result<(), PollError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    // a timeout too large to represent means no deadline at all
    let deadline = Instant::now().checked_add(timeout);
    let mut last_error = None;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let outcome = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, probe()).await,
            None => Ok(probe().await),
        };

        match outcome {
            Ok(Ok(())) => {
                debug!(attempt, "Condition met");
                return Ok(());
            }
            Ok(Err(err)) => {
                debug!(attempt, error = %err, "Condition not met yet");
                last_error = Some(err);
            }
            // the probe itself ran into the deadline
            Err(_) => break,
        }

        match Instant::now().checked_add(interval) {
            Some(next_attempt) if deadline.is_none_or(|deadline| next_attempt <= deadline) => {
                tokio::time::sleep_until(next_attempt).await;
            }
            _ => break,
        }
    }

    Err(match last_error {
        Some(source) => PollError::LastError { timeout, source },
        None => PollError::Timeout { timeout },
    })
}
