//! Core types shared across the tuning loop.

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One scalar sensor reading consumed from a [`FeedbackChannel`](crate::FeedbackChannel).
///
/// `seq` is the arrival counter assigned by the channel; measurements are
/// consumed strictly in arrival order and a measurement is fresh exactly
/// once, from delivery until consumption.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Measurement {
    /// The raw sensor value.
    pub value: f64,
    /// Arrival order, starting at 1 for the first delivered update.
    pub seq: u64,
}

/// Why a tuning run ended.
///
/// `IterationCap` is a normal terminal state, not an error: the caller can
/// inspect it and decide whether to re-tune.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum StopReason {
    /// A reversal past the first iteration bracketed the peak.
    Converged,
    /// The last three raw measurements all fell inside the goal band.
    Stabilized,
    /// The iteration budget ran out before any other condition fired.
    IterationCap,
    /// A progress hook requested an early stop.
    Stopped,
}

/// Summary of one hill-climbing run on one actuator.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TuneReport {
    /// The actuator that was tuned.
    pub actuator: String,
    /// The last accepted actuator value. On non-success stops the physical
    /// actuator is left at exactly this setting.
    pub value: f64,
    /// The running best fitness at the last accepted value.
    pub fitness: f64,
    /// Number of probe iterations performed.
    pub iterations: u32,
    /// Number of direction reversals, including one at iteration 0 if any.
    pub reversals: u32,
    /// The terminal state.
    pub stop: StopReason,
}

/// A clonable flag that cancels blocking waits.
///
/// Every blocking wait inside the crate checks its token, so an unresponsive
/// feedback source can always be abandoned from another thread.
///
/// # Examples
///
/// ```
/// use beamtune::CancelToken;
///
/// let token = CancelToken::new();
/// let worker = token.clone();
/// assert!(!worker.is_cancelled());
/// token.cancel();
/// assert!(worker.is_cancelled());
/// ```
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the token. Every clone observes the cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether the token has been tripped.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
