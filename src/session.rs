//! A tuning session owns the sensor subscription and the feedback channel.
//!
//! One session serves one sensor and any number of sequential tuning calls
//! against it. The design assumes a single global caller: no two sessions
//! may target the same actuator concurrently, and within one session writes
//! and measurements never overlap.

use std::sync::Arc;

use crate::channel::FeedbackChannel;
use crate::climb::ClimbBuilder;
use crate::control::{ControlSystem, SubscriptionId};
use crate::error::Result;
use crate::objective::Objective;
use crate::types::TuneReport;

/// One actuator in a sequential tuning pass, with its own step size.
///
/// Step sizes differ wildly between control points (a vertical steering
/// magnet may need a step three orders of magnitude smaller than a
/// horizontal one), so the step travels with the name.
#[derive(Clone, Debug)]
pub struct ActuatorSpec {
    /// Canonical control-point name.
    pub name: String,
    /// Probe step for this actuator.
    pub step: f64,
}

impl ActuatorSpec {
    /// Convenience constructor.
    #[must_use]
    pub fn new(name: impl Into<String>, step: f64) -> Self {
        Self {
            name: name.into(),
            step,
        }
    }
}

/// Long-lived pairing of a control system and one subscribed sensor.
///
/// Created once per tuning run; the subscription is cleared when the session
/// is dropped or explicitly [`close`](Self::close)d.
pub struct TuningSession {
    control: Arc<dyn ControlSystem>,
    channel: FeedbackChannel,
    sensor: String,
    subscription: Option<SubscriptionId>,
}

impl std::fmt::Debug for TuningSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TuningSession")
            .field("sensor", &self.sensor)
            .field("subscription", &self.subscription)
            .finish_non_exhaustive()
    }
}

impl TuningSession {
    /// Subscribe a fresh [`FeedbackChannel`] to `sensor`.
    ///
    /// # Errors
    ///
    /// Propagates subscription failures, including
    /// [`Error::UnknownControlPoint`](crate::Error::UnknownControlPoint) for
    /// an unresolvable sensor name.
    pub fn open(control: Arc<dyn ControlSystem>, sensor: &str) -> Result<Self> {
        Self::open_with(control, sensor, FeedbackChannel::new())
    }

    /// Subscribe a pre-configured channel (e.g. one with an acceptance
    /// filter) to `sensor`.
    ///
    /// # Errors
    ///
    /// Same as [`open`](Self::open).
    pub fn open_with(
        control: Arc<dyn ControlSystem>,
        sensor: &str,
        channel: FeedbackChannel,
    ) -> Result<Self> {
        let handle = channel.update_handle();
        let subscription = control.subscribe(sensor, Box::new(move |value| handle.post(value)))?;
        trace_debug!(sensor, "session opened");
        Ok(Self {
            control,
            channel,
            sensor: sensor.to_owned(),
            subscription: Some(subscription),
        })
    }

    /// The control system this session talks to.
    #[must_use]
    pub fn control(&self) -> &dyn ControlSystem {
        &*self.control
    }

    /// The channel receiving this session's sensor updates.
    #[must_use]
    pub fn channel(&self) -> &FeedbackChannel {
        &self.channel
    }

    /// The subscribed sensor name.
    #[must_use]
    pub fn sensor(&self) -> &str {
        &self.sensor
    }

    /// Tune several actuators one by one with per-actuator step sizes.
    ///
    /// Each actuator gets a climber built from `base` with its own step.
    /// A failure on one actuator is recorded in its slot and tuning moves on
    /// to the next; the caller inspects the results and decides whether the
    /// pass as a whole counts as failed.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    ///
    /// use beamtune::prelude::*;
    ///
    /// let sim = Arc::new(SimulatedControlSystem::new());
    /// sim.set_point("STV1400-01:adc", 4.0);
    /// sim.link("STV1400-01:adc", "ICT1400-01:eff", |v: f64| -(v - 3.0).powi(2));
    ///
    /// let session = TuningSession::open(sim, "ICT1400-01:eff").unwrap();
    /// let specs = [ActuatorSpec::new("STV1400-01:adc", 1.0)];
    /// let results = session.tune_each(HillClimber::builder(1.0), &specs, &Identity);
    /// assert!(results[0].1.is_ok());
    /// ```
    pub fn tune_each<O: Objective>(
        &self,
        base: ClimbBuilder,
        specs: &[ActuatorSpec],
        objective: &O,
    ) -> Vec<(String, Result<TuneReport>)> {
        specs
            .iter()
            .map(|spec| {
                let result = base
                    .clone()
                    .step(spec.step)
                    .build()
                    .and_then(|climber| climber.tune(self, &spec.name, objective));
                (spec.name.clone(), result)
            })
            .collect()
    }

    /// Unsubscribe explicitly and surface any failure doing so.
    ///
    /// Dropping the session also unsubscribes, but swallows errors.
    ///
    /// # Errors
    ///
    /// Propagates the control system's unsubscribe failure.
    pub fn close(mut self) -> Result<()> {
        if let Some(id) = self.subscription.take() {
            self.control.unsubscribe(id)?;
        }
        Ok(())
    }
}

impl Drop for TuningSession {
    fn drop(&mut self) {
        if let Some(id) = self.subscription.take() {
            let _ = self.control.unsubscribe(id);
        }
    }
}
