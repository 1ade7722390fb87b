//! Pacing utilities for the frame capture loop.
//!
//! The capture loop is strictly sequential: seek, wait for the visual state to
//! settle, read pixels. This module provides:
//! - Bounded readiness polling (falls back to a fixed timeout)
//! - A cooperative cancellation flag checked between frames
//! - Progress throttling for high-frequency callbacks
//! - Frame-rate to frame-delay conversion

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{EngineError, EngineResult};

/// Cooperative cancellation signal shared between the caller and an export.
///
/// Cloning yields a handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    tripped: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tripped.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }

    /// Return `Err(EngineError::Cancelled)` once the flag has been tripped.
    pub fn check(&self) -> EngineResult<()> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// How a readiness wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    /// The readiness predicate resolved before the timeout.
    Ready,
    /// The timeout elapsed first; the caller proceeds with whatever is rendered.
    TimedOut,
}

impl SettleOutcome {
    pub fn timed_out(self) -> bool {
        self == SettleOutcome::TimedOut
    }
}

/// Poll `ready` every `poll_interval` until it returns true or `timeout` elapses.
///
/// The predicate is checked once before the first sleep, so an already-ready
/// target costs no delay.
pub async fn wait_until<F>(mut ready: F, poll_interval: Duration, timeout: Duration) -> SettleOutcome
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    let poll_interval = poll_interval.max(Duration::from_millis(1));

    loop {
        if ready() {
            return SettleOutcome::Ready;
        }
        let now = tokio::time::Instant::now();
        if now >= deadline {
            return SettleOutcome::TimedOut;
        }
        tokio::time::sleep(poll_interval.min(deadline - now)).await;
    }
}

/// Unconditional delay, used where no readiness predicate exists.
pub async fn settle_for(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Per-frame delay in milliseconds for a given frame rate: `round(1000 / fps)`.
pub fn frame_delay_ms(fps: f64) -> u32 {
    if fps <= 0.0 || !fps.is_finite() {
        return 0;
    }
    (1000.0 / fps).round() as u32
}

/// Emits on every `every`-th step and always on the final step.
#[derive(Debug)]
pub struct ProgressThrottle {
    every: usize,
    total: usize,
}

impl ProgressThrottle {
    /// Create a throttle for `total` steps firing every `every` steps.
    pub fn new(every: usize, total: usize) -> Self {
        Self {
            every: every.max(1),
            total,
        }
    }

    /// Whether the zero-based `index` step should be reported.
    pub fn should_emit(&self, index: usize) -> bool {
        index % self.every == 0 || index + 1 >= self.total
    }
}
