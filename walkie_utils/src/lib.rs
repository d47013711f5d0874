//! Small building blocks shared by the relay's hardware, network and audio paths.
//!
//! Nothing in here allocates after construction, so every item may be used from
//! the real-time capture and playback loops.

use core::time::Duration;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

pub mod samples;

/// A lightweight wrapper around [`std::time::Instant`] used to bound waits.
/// Stores the instant at which it was started, and how long it lasts.
///
/// ```ignore
/// let deadline = Deadline::after(TIMEOUT);
///
/// while !hardware_done() {
///     if deadline.is_expired() {
///         return Err(Timeout);
///     }
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: std::time::Instant,
    timeout: Duration,
}

impl Deadline {
    /// Creates a deadline expiring `timeout` from now.
    #[inline(always)]
    pub fn after(timeout: Duration) -> Self {
        Self {
            start: std::time::Instant::now(),
            timeout,
        }
    }

    /// Returns the amount of time elapsed since the deadline was created.
    #[inline(always)]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    #[inline(always)]
    pub fn is_expired(&self) -> bool {
        self.elapsed() >= self.timeout
    }

    /// Time left before expiry, zero once expired.
    #[inline(always)]
    pub fn remaining(&self) -> Duration {
        self.timeout.saturating_sub(self.elapsed())
    }
}

/// Calls `done` every `interval` until it returns `true`, or `timeout` elapses.
///
/// `done` is always called at least once, and once more after the last sleep,
/// so a condition becoming true right at the deadline is still observed.
///
/// Returns whether `done` returned `true`.
pub fn poll_until(timeout: Duration, interval: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Deadline::after(timeout);

    loop {
        if done() {
            return true;
        }

        if deadline.is_expired() {
            return false;
        }

        std::thread::sleep(interval.min(deadline.remaining()));
    }
}

/// Cloneable, thread-safe stop request.
///
/// Every clone observes the same flag. Once cancelled, a token stays cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    #[inline(always)]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[inline(always)]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Sleeps for at most `duration`, waking up early if the token gets cancelled.
    ///
    /// Returns whether the token is cancelled.
    pub fn sleep(&self, duration: Duration, granularity: Duration) -> bool {
        let deadline = Deadline::after(duration);

        while !self.is_cancelled() {
            let remaining = deadline.remaining();
            if remaining.is_zero() {
                return false;
            }
            std::thread::sleep(granularity.min(remaining));
        }

        true
    }
}
