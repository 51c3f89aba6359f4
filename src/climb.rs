//! The hill-climbing search: step, measure, compare, reverse.
//!
//! One [`HillClimber`] run tunes one actuator. Starting from the current
//! setting, it probes one step in the current direction (negative first, by
//! convention), measures the resulting fitness through the feedback channel,
//! and either accepts the probe or reverses direction and restores the
//! pre-probe value. Variants differ only in configuration: step decay trades
//! early coarse search for late fine search, multi-sample averaging damps
//! measurement noise, and the stop policy selects between "converged on the
//! first bracketed peak" and "the last three raw measurements sit inside a
//! goal band".

use core::ops::ControlFlow;
use core::time::Duration;

use crate::channel::FeedbackChannel;
use crate::control::ControlSystem;
use crate::error::{Error, Result};
use crate::objective::Objective;
use crate::session::TuningSession;
use crate::types::{CancelToken, StopReason, TuneReport};

/// How the probe step shrinks on direction reversals.
///
/// The very first reversal never shrinks the step: the starting direction is
/// arbitrary, so a reversal at iteration 0 carries no information about the
/// peak.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StepDecay {
    /// Keep the step fixed for the whole run.
    None,
    /// Subtract `decrement` on every reversal past the first, never going
    /// below `floor`.
    Linear {
        /// Amount removed from the step per qualifying reversal.
        decrement: f64,
        /// Smallest step the search may use.
        floor: f64,
    },
    /// Multiply by `factor` on every reversal past the first, never going
    /// below `floor`.
    Geometric {
        /// Shrink factor in (0, 1).
        factor: f64,
        /// Smallest step the search may use.
        floor: f64,
    },
}

/// When the search declares itself done (besides the iteration cap).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StopPolicy {
    /// Stop on the first reversal past iteration 0: the peak has been
    /// bracketed to within one step.
    FirstPeak,
    /// Stop once the last three consumed raw measurements all lie inside
    /// `[min, max]`.
    GoalBand {
        /// Lower edge of the acceptable measurement band.
        min: f64,
        /// Upper edge of the acceptable measurement band.
        max: f64,
    },
}

/// Per-iteration progress snapshot handed to a [`ProgressHook`].
#[derive(Clone, Copy, Debug)]
pub struct Progress {
    /// Zero-based probe iteration that just finished.
    pub iteration: u32,
    /// Last accepted actuator value.
    pub value: f64,
    /// Running best fitness.
    pub fitness: f64,
    /// Current step size.
    pub step: f64,
    /// Current search direction, `-1.0` or `1.0`.
    pub direction: f64,
    /// Reversals so far, including one at iteration 0 if any.
    pub reversals: u32,
}

/// Observer invoked after every probe iteration.
///
/// Return `ControlFlow::Break(())` to stop the run; the report then carries
/// [`StopReason::Stopped`]. Plain closures work through the blanket impl:
///
/// ```
/// use core::ops::ControlFlow;
///
/// use beamtune::Progress;
///
/// let hook = |p: &Progress| {
///     if p.fitness > 0.99 {
///         ControlFlow::Break(())
///     } else {
///         ControlFlow::Continue(())
///     }
/// };
/// # let _ = &hook;
/// ```
pub trait ProgressHook {
    /// Called once per probe iteration with the post-decision state.
    fn on_iteration(&self, progress: &Progress) -> ControlFlow<()>;
}

impl<F> ProgressHook for F
where
    F: Fn(&Progress) -> ControlFlow<()>,
{
    fn on_iteration(&self, progress: &Progress) -> ControlFlow<()> {
        self(progress)
    }
}

struct NopHook;

impl ProgressHook for NopHook {
    fn on_iteration(&self, _progress: &Progress) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

/// Builder for [`HillClimber`]. Created via [`HillClimber::builder`].
///
/// # Defaults
///
/// - Stop policy: [`StopPolicy::FirstPeak`]
/// - Step decay: [`StepDecay::None`]
/// - Samples per probe: 1
/// - Iteration cap: 100
/// - Measurement timeout: 10 s
/// - No cancel token
#[derive(Clone, Debug)]
pub struct ClimbBuilder {
    step: f64,
    decay: StepDecay,
    samples_per_probe: usize,
    max_iterations: u32,
    stop: StopPolicy,
    measurement_timeout: Duration,
    cancel: Option<CancelToken>,
}

impl ClimbBuilder {
    fn new(step: f64) -> Self {
        Self {
            step,
            decay: StepDecay::None,
            samples_per_probe: 1,
            max_iterations: 100,
            stop: StopPolicy::FirstPeak,
            measurement_timeout: Duration::from_secs(10),
            cancel: None,
        }
    }

    /// Replace the initial probe step.
    #[must_use]
    pub fn step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }

    /// Shrink the step by `decrement` on every reversal past the first,
    /// floored at `floor`.
    #[must_use]
    pub fn linear_decay(mut self, decrement: f64, floor: f64) -> Self {
        self.decay = StepDecay::Linear { decrement, floor };
        self
    }

    /// Multiply the step by `factor` on every reversal past the first,
    /// floored at `floor`.
    #[must_use]
    pub fn geometric_decay(mut self, factor: f64, floor: f64) -> Self {
        self.decay = StepDecay::Geometric { factor, floor };
        self
    }

    /// Average this many fresh measurements per probe.
    #[must_use]
    pub fn samples_per_probe(mut self, samples: usize) -> Self {
        self.samples_per_probe = samples;
        self
    }

    /// Hard cap on probe iterations.
    #[must_use]
    pub fn max_iterations(mut self, cap: u32) -> Self {
        self.max_iterations = cap;
        self
    }

    /// Stop once the last three raw measurements all lie inside
    /// `[min, max]` instead of stopping on the first bracketed peak.
    #[must_use]
    pub fn goal_band(mut self, min: f64, max: f64) -> Self {
        self.stop = StopPolicy::GoalBand { min, max };
        self
    }

    /// Bound every wait for a fresh measurement.
    #[must_use]
    pub fn measurement_timeout(mut self, timeout: Duration) -> Self {
        self.measurement_timeout = timeout;
        self
    }

    /// Check this token inside every blocking wait.
    #[must_use]
    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Validate the configuration and build the climber.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidStep`] for a non-positive step,
    /// [`Error::InvalidStepDecay`] for a bad decay configuration,
    /// [`Error::InvalidBand`] for an empty goal band, and
    /// [`Error::ZeroSamples`] for a zero per-probe sample count.
    pub fn build(self) -> Result<HillClimber> {
        if !(self.step > 0.0 && self.step.is_finite()) {
            return Err(Error::InvalidStep);
        }
        match self.decay {
            StepDecay::None => {}
            StepDecay::Linear { decrement, floor } => {
                if !(decrement > 0.0 && floor > 0.0 && floor <= self.step) {
                    return Err(Error::InvalidStepDecay);
                }
            }
            StepDecay::Geometric { factor, floor } => {
                if !(factor > 0.0 && factor < 1.0 && floor > 0.0 && floor <= self.step) {
                    return Err(Error::InvalidStepDecay);
                }
            }
        }
        if let StopPolicy::GoalBand { min, max } = self.stop {
            if min > max || min.is_nan() || max.is_nan() {
                return Err(Error::InvalidBand { min, max });
            }
        }
        if self.samples_per_probe == 0 {
            return Err(Error::ZeroSamples);
        }
        Ok(HillClimber { cfg: self })
    }
}

/// The step/measure/compare/reverse search. One call to
/// [`tune`](Self::tune) runs one session on one actuator.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use beamtune::prelude::*;
///
/// let sim = Arc::new(SimulatedControlSystem::new());
/// sim.set_point("STV1400-01:adc", 17.0);
/// sim.link("STV1400-01:adc", "ICT1400-01:eff", |v| v);
///
/// let session = TuningSession::open(sim, "ICT1400-01:eff").unwrap();
/// let climber = HillClimber::builder(2.0).max_iterations(50).build().unwrap();
///
/// // Fitness peaks when the readback hits 10.
/// let objective = Parabola::new(10.0, 10.0).unwrap();
/// let report = climber.tune(&session, "STV1400-01:adc", &objective).unwrap();
/// assert_eq!(report.stop, StopReason::Converged);
/// assert!(report.value >= 8.0 && report.value <= 12.0);
/// ```
pub struct HillClimber {
    cfg: ClimbBuilder,
}

impl HillClimber {
    /// Start configuring a climber with the given initial step.
    #[must_use]
    pub fn builder(step: f64) -> ClimbBuilder {
        ClimbBuilder::new(step)
    }

    /// Tune `actuator` until a stop condition fires.
    ///
    /// # Errors
    ///
    /// Propagates control-system I/O failures, measurement timeouts, and
    /// cancellation. On any error the actuator is left at its last accepted
    /// setting.
    pub fn tune<O: Objective>(
        &self,
        session: &TuningSession,
        actuator: &str,
        objective: &O,
    ) -> Result<TuneReport> {
        self.tune_with(session, actuator, objective, &NopHook)
    }

    /// Like [`tune`](Self::tune), with a per-iteration [`ProgressHook`].
    ///
    /// # Errors
    ///
    /// Same as [`tune`](Self::tune).
    #[allow(clippy::too_many_lines)]
    pub fn tune_with<O: Objective, H: ProgressHook>(
        &self,
        session: &TuningSession,
        actuator: &str,
        objective: &O,
        hook: &H,
    ) -> Result<TuneReport> {
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("tune", actuator, step = self.cfg.step).entered();

        let control = session.control();
        let channel = session.channel();
        let timeout = self.cfg.measurement_timeout;
        let cancel = self.cfg.cancel.as_ref();
        let samples = self.cfg.samples_per_probe;

        // INIT: baseline from the current setting. Re-applying it with
        // confirmation syncs the physical system before the first reading.
        let mut val = control.read(actuator)?;
        channel.reset();
        control.write(actuator, val, true)?;
        let mut fitness = channel.score_next(objective, samples, timeout, cancel)?;

        // Negative-first by convention; the decision rule corrects it.
        let mut direction = -1.0;
        let mut step = self.cfg.step;
        let mut reversals = 0u32;
        let mut iterations = 0u32;

        let stop = loop {
            if iterations >= self.cfg.max_iterations {
                break StopReason::IterationCap;
            }
            let first = iterations == 0;

            let probe = val + step * direction;
            control.write(actuator, probe, true)?;
            let new_fitness = channel.score_next(objective, samples, timeout, cancel)?;
            iterations += 1;

            if new_fitness < fitness {
                // Overshot, or the initial direction was wrong: flip and
                // restore the pre-probe value exactly.
                direction = -direction;
                reversals += 1;
                control.write(actuator, val, true)?;

                if !first {
                    step = match self.cfg.decay {
                        StepDecay::None => step,
                        StepDecay::Linear { decrement, floor } => (step - decrement).max(floor),
                        StepDecay::Geometric { factor, floor } => (step * factor).max(floor),
                    };
                    if self.cfg.stop == StopPolicy::FirstPeak {
                        trace_info!(iterations, value = val, fitness, "peak bracketed");
                        break StopReason::Converged;
                    }
                }
            } else {
                val = probe;
                fitness = new_fitness;
            }

            trace_info!(
                iteration = iterations - 1,
                value = val,
                fitness = new_fitness,
                step,
                direction,
                "probe"
            );

            let progress = Progress {
                iteration: iterations - 1,
                value: val,
                fitness,
                step,
                direction,
                reversals,
            };
            if let ControlFlow::Break(()) = hook.on_iteration(&progress) {
                break StopReason::Stopped;
            }

            if let StopPolicy::GoalBand { min, max } = self.cfg.stop {
                if channel.last_within(3, min, max) {
                    trace_info!(iterations, value = val, "last three measurements in band");
                    break StopReason::Stabilized;
                }
            }
        };

        trace_debug!(?stop, iterations, reversals, "tuning finished");

        Ok(TuneReport {
            actuator: actuator.to_owned(),
            value: val,
            fitness,
            iterations,
            reversals,
            stop,
        })
    }
}
