//! Bounded waits with cooperative cancellation.
//!
//! The scripting interface has no "idle" notification, so every workflow
//! step that mutates the UI is followed by a fixed settle sleep, and every
//! condition wait is a poll loop with a timeout and a [`CancelToken`] check
//! on each tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::errors::TechLocError;

/// Shared interrupt flag, cloned into every worker.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once the token has fired.
    pub fn check(&self) -> Result<(), TechLocError> {
        if self.is_cancelled() {
            Err(TechLocError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// How a [`poll_until`] loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Ready,
    TimedOut,
    Cancelled,
}

/// Evaluate `probe` every `interval` until it returns `true`, `timeout`
/// elapses or `cancel` fires.  The probe runs at least once.
///
/// The interval is clamped to at least one millisecond.
pub fn poll_until<F>(
    timeout: Duration,
    interval: Duration,
    cancel: &CancelToken,
    mut probe: F,
) -> PollOutcome
where
    F: FnMut() -> bool,
{
    let interval = interval.max(Duration::from_millis(1));
    let deadline = Instant::now() + timeout;
    loop {
        if cancel.is_cancelled() {
            return PollOutcome::Cancelled;
        }
        if probe() {
            return PollOutcome::Ready;
        }
        let now = Instant::now();
        if now >= deadline {
            return PollOutcome::TimedOut;
        }
        thread::sleep(interval.min(deadline - now));
    }
}

/// Fixed settle sleep after a UI-mutating action.
pub fn settle(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_on_first_probe() {
        let token = CancelToken::new();
        let out = poll_until(Duration::ZERO, Duration::from_millis(5), &token, || true);
        assert_eq!(out, PollOutcome::Ready);
    }

    #[test]
    fn test_times_out() {
        let token = CancelToken::new();
        let start = Instant::now();
        let out = poll_until(
            Duration::from_millis(30),
            Duration::from_millis(5),
            &token,
            || false,
        );
        assert_eq!(out, PollOutcome::TimedOut);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_ready_after_some_ticks() {
        let token = CancelToken::new();
        let mut calls = 0;
        let out = poll_until(Duration::from_secs(5), Duration::from_millis(1), &token, || {
            calls += 1;
            calls == 3
        });
        assert_eq!(out, PollOutcome::Ready);
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_cancel_observed() {
        let token = CancelToken::new();
        let remote = token.clone();
        let out = poll_until(Duration::from_secs(10), Duration::from_millis(1), &token, || {
            remote.cancel();
            false
        });
        assert_eq!(out, PollOutcome::Cancelled);
        assert!(matches!(token.check(), Err(TechLocError::Cancelled)));
    }
}
