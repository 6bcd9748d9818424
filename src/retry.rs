//! Cancellation-aware waiting.
//!
//! Every loop that waits on the server (state polling, re-fetching a result that has no
//! rows yet) goes through a [`RetryPolicy`]. The policy owns the interval, a [`Clock`]
//! used to sleep, and the [`CancelToken`] observed at every iteration boundary, so tests
//! can swap in a clock that never actually sleeps.
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use crate::error::{Error, Result};

/// Longest single sleep before the cancel flag is checked again.
const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// Shared flag flipped by a signal handler, timer or caller to abandon a wait.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Re-arms the token for the next statement.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Returns [`Error::Cancelled`] once the token has been triggered.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Source of sleeping.
pub trait Clock: Send + Sync {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration)
    }
}

/// Fixed-interval waiting between attempts.
#[derive(Clone)]
pub struct RetryPolicy {
    interval: Duration,
    clock: Arc<dyn Clock>,
    cancel: CancelToken,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("interval", &self.interval)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl RetryPolicy {
    pub fn new(interval: Duration, cancel: CancelToken) -> Self {
        Self::with_clock(interval, cancel, Arc::new(SystemClock))
    }

    pub fn with_clock(interval: Duration, cancel: CancelToken, clock: Arc<dyn Clock>) -> Self {
        Self {
            interval,
            clock,
            cancel,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Sleeps one interval.
    pub fn pause(&self) -> Result<()> {
        self.sleep(self.interval)
    }

    /// Sleeps `duration` in short slices, returning [`Error::Cancelled`] as soon as the
    /// token is observed instead of sleeping through it.
    pub fn sleep(&self, duration: Duration) -> Result<()> {
        self.cancel.check()?;

        let mut remaining = duration;
        while !remaining.is_zero() {
            let slice = remaining.min(SLEEP_SLICE);
            self.clock.sleep(slice);
            remaining -= slice;
            self.cancel.check()?;
        }
        Ok(())
    }
}

/// Bounded exponential backoff for re-fetching results that are not available yet.
///
/// Delays start at `initial`, double per attempt and never exceed `max`. With a `limit`
/// set, the attempt after the last allowed one fails instead of sleeping.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    limit: Option<u32>,
    current: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, limit: Option<u32>) -> Self {
        Self {
            initial,
            max,
            limit,
            current: initial,
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
        self.attempts = 0;
    }

    /// Delay to use for the next attempt, advancing the backoff.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.limit.is_some_and(|limit| self.attempts >= limit) {
            return None;
        }
        let delay = self.current.min(self.max);
        self.attempts += 1;
        self.current = self.current.saturating_mul(2).min(self.max);
        Some(delay)
    }

    /// Sleeps for the next delay through `policy`.
    pub fn wait(&mut self, policy: &RetryPolicy) -> Result<()> {
        match self.next_delay() {
            Some(delay) => policy.sleep(delay),
            None => Err(Error::Protocol(format!(
                "server reported pending results {} times without producing rows",
                self.attempts
            ))),
        }
    }
}
