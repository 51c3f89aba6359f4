//! The narrow interface to the surrounding control-system client.
//!
//! The tuning core never talks to hardware directly. It consumes exactly two
//! capabilities from an opaque collaborator: synchronous get/set of a named
//! scalar control point, and a push-style subscription delivering every new
//! sensor value to a callback. [`crate::sim::SimulatedControlSystem`]
//! implements this trait for tests; a production implementation wraps the
//! site's client library.

use crate::error::Result;

/// Callback invoked by the control system on every new sensor value.
///
/// Runs on the client library's notification context: it must only forward
/// the value (e.g. via [`UpdateHandle::post`](crate::UpdateHandle::post))
/// and must not block.
pub type UpdateFn = Box<dyn Fn(f64) + Send + Sync>;

/// Opaque handle for an active sensor subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

/// Synchronous access to named scalar control points plus push-style
/// sensor subscriptions.
///
/// Implementations may assume a single logical writer per control point:
/// the tuning session never overlaps writes and reads on the same actuator.
pub trait ControlSystem: Send + Sync {
    /// Read the current value of a named control point.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownControlPoint`](crate::Error::UnknownControlPoint) if
    /// the name does not resolve, or
    /// [`Error::ControlSystem`](crate::Error::ControlSystem) on an I/O
    /// failure.
    fn read(&self, name: &str) -> Result<f64>;

    /// Write a value to a named control point.
    ///
    /// With `confirm` set, the call blocks until the physical system has
    /// reached the new value; the tuning loop relies on this before taking
    /// the corresponding measurement.
    ///
    /// # Errors
    ///
    /// Same taxonomy as [`read`](Self::read). Failures propagate to the
    /// caller unretried.
    fn write(&self, name: &str, value: f64, confirm: bool) -> Result<()>;

    /// Register a callback invoked on every new value of `name`.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownControlPoint`](crate::Error::UnknownControlPoint) if
    /// the name does not resolve.
    fn subscribe(&self, name: &str, on_update: UpdateFn) -> Result<SubscriptionId>;

    /// Remove a subscription created by [`subscribe`](Self::subscribe).
    ///
    /// # Errors
    ///
    /// [`Error::ControlSystem`](crate::Error::ControlSystem) if the client
    /// library fails to clear the subscription.
    fn unsubscribe(&self, id: SubscriptionId) -> Result<()>;
}
