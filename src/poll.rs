//! Poll-until-true primitive used by the blocking stages.

use crate::error::HarnessError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Result of a single polling attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready(T),
    NotReady(Option<String>),
}

impl<T> PollOutcome<T> {
    pub fn not_ready(reason: impl Into<String>) -> Self {
        PollOutcome::NotReady(Some(reason.into()))
    }
}

/// Interval between attempts and optional overall deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// `None` retries forever.
    pub deadline: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            deadline: Some(Duration::from_secs(900)),
        }
    }
}

impl PollPolicy {
    pub fn new(interval: Duration, deadline: Option<Duration>) -> Self {
        Self { interval, deadline }
    }

    pub fn unbounded(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }
}

/// Call `attempt` until it reports `Ready`, sleeping `policy.interval` between
/// attempts. The attempt number (starting at 1) is passed to the closure.
///
/// Transient `NotReady` outcomes are never surfaced. Exceeding the deadline
/// returns `HarnessError::PollTimeout`.
pub async fn poll_until<T, F, Fut>(
    what: &str,
    policy: PollPolicy,
    mut attempt: F,
) -> Result<T, HarnessError>
where
    F: FnMut(u64) -> Fut,
    Fut: Future<Output = PollOutcome<T>>,
{
    let started = Instant::now();
    let mut attempts: u64 = 0;

    loop {
        attempts += 1;
        match attempt(attempts).await {
            PollOutcome::Ready(value) => {
                debug!(what, attempts, "Poll condition met");
                return Ok(value);
            }
            PollOutcome::NotReady(reason) => {
                debug!(
                    what,
                    attempt = attempts,
                    reason = reason.as_deref().unwrap_or("not ready"),
                    "Poll condition not met yet"
                );
            }
        }

        if let Some(deadline) = policy.deadline {
            let elapsed = started.elapsed();
            if elapsed + policy.interval > deadline {
                return Err(HarnessError::PollTimeout {
                    what: what.to_string(),
                    attempts,
                    elapsed,
                });
            }
        }

        tokio::time::sleep(policy.interval).await;
    }
}
