//! Single-slot mailbox between the notification context and the tuning loop.
//!
//! A control-system client delivers sensor updates by calling back on its
//! own notification thread; the optimizer wants a blocking "give me the next
//! fresh reading" pull. [`FeedbackChannel`] bridges the two: the callback
//! side posts into a latest-value slot with a freshness latch, the consumer
//! side waits on a condition variable with a bounded timeout. Reading the
//! slot, clearing the latch, and appending to the measurement history happen
//! under one lock, so the notification context and the consumer can never
//! race on the same update.

use core::time::Duration;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use crate::error::{Error, Result};
use crate::objective::Objective;
use crate::types::{CancelToken, Measurement};

/// How often a blocking wait wakes up to re-check the cancel token.
const CANCEL_POLL: Duration = Duration::from_millis(25);

type Filter = Box<dyn Fn(f64) -> bool + Send + Sync>;

struct Slot {
    latest: f64,
    seq: u64,
    fresh: bool,
    /// Every consumed measurement, in consumption order. Feeds the
    /// goal-band stability test.
    history: Vec<f64>,
}

struct Inner {
    slot: Mutex<Slot>,
    cond: Condvar,
    filter: Option<Filter>,
}

/// Blocking pull side of an asynchronously updated scalar sensor.
///
/// Create one per tuning session, hand its [`UpdateHandle`] to the
/// control-system subscription, and consume readings with
/// [`await_fresh`](Self::await_fresh).
///
/// # Examples
///
/// ```
/// use core::time::Duration;
///
/// use beamtune::FeedbackChannel;
///
/// let channel = FeedbackChannel::new();
/// let handle = channel.update_handle();
///
/// handle.post(0.57);
/// let m = channel.await_fresh(Duration::from_millis(10), None).unwrap();
/// assert_eq!(m.value, 0.57);
/// assert_eq!(m.seq, 1);
///
/// // The reading was fresh exactly once.
/// assert!(channel.await_fresh(Duration::from_millis(10), None).is_err());
/// ```
pub struct FeedbackChannel {
    inner: Arc<Inner>,
}

/// Push side of a [`FeedbackChannel`], held by the notification context.
///
/// Cloneable; posting only takes the slot lock briefly and never blocks on
/// the consumer.
#[derive(Clone)]
pub struct UpdateHandle {
    inner: Arc<Inner>,
}

impl FeedbackChannel {
    /// Create a channel that accepts every posted update.
    #[must_use]
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a channel that drops updates failing `accept` before they
    /// touch the freshness latch.
    ///
    /// Used when the raw feed contains readings that must not count as
    /// measurements at all, such as non-positive shot rates during beam-off
    /// gaps.
    ///
    /// # Examples
    ///
    /// ```
    /// use core::time::Duration;
    ///
    /// use beamtune::FeedbackChannel;
    ///
    /// let channel = FeedbackChannel::with_filter(|rate| rate > 0.0);
    /// channel.update_handle().post(-1.0);
    /// assert!(channel.await_fresh(Duration::from_millis(10), None).is_err());
    /// ```
    #[must_use]
    pub fn with_filter(accept: impl Fn(f64) -> bool + Send + Sync + 'static) -> Self {
        Self::build(Some(Box::new(accept)))
    }

    fn build(filter: Option<Filter>) -> Self {
        Self {
            inner: Arc::new(Inner {
                slot: Mutex::new(Slot {
                    latest: 0.0,
                    seq: 0,
                    fresh: false,
                    history: Vec::new(),
                }),
                cond: Condvar::new(),
                filter,
            }),
        }
    }

    /// Return a handle for the update source.
    #[must_use]
    pub fn update_handle(&self) -> UpdateHandle {
        UpdateHandle {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Block until a measurement newer than the last consumed one arrives,
    /// then consume it.
    ///
    /// Consuming clears the freshness latch and appends the raw value to the
    /// channel history atomically. If updates arrive faster than they are
    /// consumed, intermediate values are overwritten; the consumer always
    /// sees the latest.
    ///
    /// # Errors
    ///
    /// [`Error::MeasurementTimeout`] if no fresh update arrives within
    /// `timeout`; [`Error::Cancelled`] if `cancel` trips while waiting.
    pub fn await_fresh(
        &self,
        timeout: Duration,
        cancel: Option<&CancelToken>,
    ) -> Result<Measurement> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.inner.slot.lock();
        while !slot.fresh {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                return Err(Error::Cancelled);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::MeasurementTimeout { waited: timeout });
            }
            let wake = core::cmp::min(deadline, now + CANCEL_POLL);
            self.inner.cond.wait_until(&mut slot, wake);
        }
        slot.fresh = false;
        let measurement = Measurement {
            value: slot.latest,
            seq: slot.seq,
        };
        slot.history.push(measurement.value);
        Ok(measurement)
    }

    /// Consume `samples` consecutive fresh measurements and return the
    /// arithmetic mean of their fitness scores.
    ///
    /// This is the multi-sample averaging mode: it damps measurement noise
    /// without changing the control flow of the search. With `samples == 1`
    /// it reduces to scoring a single fresh reading.
    ///
    /// # Errors
    ///
    /// Propagates [`Error::MeasurementTimeout`] and [`Error::Cancelled`]
    /// from the underlying waits. `samples == 0` returns
    /// [`Error::ZeroSamples`].
    pub fn score_next(
        &self,
        objective: &dyn Objective,
        samples: usize,
        timeout: Duration,
        cancel: Option<&CancelToken>,
    ) -> Result<f64> {
        if samples == 0 {
            return Err(Error::ZeroSamples);
        }
        let mut total = 0.0;
        for _ in 0..samples {
            let m = self.await_fresh(timeout, cancel)?;
            total += objective.score(m.value);
        }
        #[allow(clippy::cast_precision_loss)]
        Ok(total / samples as f64)
    }

    /// Clear the freshness latch and the measurement history.
    ///
    /// Call when restarting a sweep so stale samples from a previous run are
    /// not counted toward the stability window.
    pub fn reset(&self) {
        let mut slot = self.inner.slot.lock();
        slot.fresh = false;
        slot.history.clear();
    }

    /// Snapshot of every consumed raw measurement, in consumption order.
    #[must_use]
    pub fn history(&self) -> Vec<f64> {
        self.inner.slot.lock().history.clone()
    }

    /// Whether the history holds at least `n` entries and the last `n` all
    /// lie inside `[min, max]`.
    #[must_use]
    pub fn last_within(&self, n: usize, min: f64, max: f64) -> bool {
        let slot = self.inner.slot.lock();
        if slot.history.len() < n {
            return false;
        }
        slot.history[slot.history.len() - n..]
            .iter()
            .all(|&v| v >= min && v <= max)
    }
}

impl Default for FeedbackChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateHandle {
    /// Deliver a new sensor value.
    ///
    /// Sets the latest-value slot and the freshness latch, then wakes the
    /// consumer. Values rejected by the channel's filter are dropped without
    /// touching the latch.
    pub fn post(&self, value: f64) {
        if let Some(accept) = &self.inner.filter {
            if !accept(value) {
                return;
            }
        }
        let mut slot = self.inner.slot.lock();
        slot.latest = value;
        slot.seq += 1;
        slot.fresh = true;
        self.inner.cond.notify_one();
    }
}
