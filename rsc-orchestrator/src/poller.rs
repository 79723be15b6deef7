use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

#[async_trait]
pub trait Clock: Send + Sync {
    /// Time since the clock was created.
    fn elapsed(&self) -> Duration;
    async fn sleep(&self, duration: Duration);
}

pub struct TokioClock {
    started: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for TokioClock {
    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "value", rename_all = "snake_case")]
pub enum PollOutcome<T> {
    Reached(T),
    /// Carries the last observation, if any was made.
    TimedOut(Option<T>),
}

impl<T> PollOutcome<T> {
    pub fn is_reached(&self) -> bool {
        matches!(self, PollOutcome::Reached(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            PollOutcome::Reached(v) => Some(v),
            PollOutcome::TimedOut(v) => v.as_ref(),
        }
    }
}

/// Observe with `check` until `is_done` holds or `timeout` has elapsed on
/// `clock`. The first observation is immediate; later ones are `interval`
/// apart, never sleeping past the deadline. Errors from `check` abort the poll.
pub async fn poll_until<T, F, Fut, P>(
    mut check: F,
    is_done: P,
    interval: Duration,
    timeout: Duration,
    clock: &(impl Clock + ?Sized),
) -> Result<PollOutcome<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&T) -> bool,
{
    let started = clock.elapsed();
    loop {
        let observed = check().await?;
        if is_done(&observed) {
            return Ok(PollOutcome::Reached(observed));
        }
        let spent = clock.elapsed().saturating_sub(started);
        if spent >= timeout {
            return Ok(PollOutcome::TimedOut(Some(observed)));
        }
        clock.sleep(interval.min(timeout - spent)).await;
    }
}
