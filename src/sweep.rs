//! The mirror-search variant: sweep both sides of a plateau, then center.
//!
//! Steering-magnet responses are flat-topped rather than single-peaked, so
//! hill climbing alone parks the actuator at an arbitrary point on the
//! plateau edge it happens to reach first. [`MirrorSweep`] instead sweeps
//! outward from the starting point until fitness drops below a fraction of
//! the running maximum, returns to the start, sweeps the opposite side to
//! the same threshold, and hands the position-ordered trace to a
//! [`FlatTopLocator`] which writes the plateau center back to the actuator
//! as the final action of the session.

use core::time::Duration;

use crate::error::{Error, Result};
use crate::flattop::{Centering, FlatTopLocator, Sample, Trace};
use crate::objective::Objective;
use crate::session::TuningSession;
use crate::types::{CancelToken, StopReason};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Summary of one mirror sweep, including the final centering write.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SweepReport {
    /// The actuator that was swept.
    pub actuator: String,
    /// The plateau center the actuator was finally set to.
    pub center: f64,
    /// The highest fitness observed during the sweep.
    pub peak_fitness: f64,
    /// Number of probe iterations performed.
    pub iterations: u32,
    /// Number of samples recorded in the trace before clipping.
    pub samples: usize,
    /// [`StopReason::Converged`] after the second threshold crossing, or
    /// [`StopReason::IterationCap`] if the budget ran out first (the partial
    /// trace is still centered).
    pub stop: StopReason,
}

/// Builder for [`MirrorSweep`]. Created via [`MirrorSweep::builder`].
///
/// # Defaults
///
/// - Plateau ratio: 0.8 (a sample ends a side once its fitness is at or
///   below 80% of the running maximum)
/// - Centering: [`Midpoint`](crate::flattop::Midpoint)
/// - Samples per probe: 1
/// - Iteration cap: 100
/// - Measurement timeout: 10 s
/// - No cancel token
pub struct SweepBuilder {
    step: f64,
    plateau_ratio: f64,
    samples_per_probe: usize,
    max_iterations: u32,
    measurement_timeout: Duration,
    cancel: Option<CancelToken>,
    locator: FlatTopLocator,
}

impl SweepBuilder {
    fn new(step: f64) -> Self {
        Self {
            step,
            plateau_ratio: 0.8,
            samples_per_probe: 1,
            max_iterations: 100,
            measurement_timeout: Duration::from_secs(10),
            cancel: None,
            locator: FlatTopLocator::default(),
        }
    }

    /// Fraction of the running maximum at which a side of the sweep ends.
    #[must_use]
    pub fn plateau_ratio(mut self, ratio: f64) -> Self {
        self.plateau_ratio = ratio;
        self
    }

    /// Average this many fresh measurements per probe.
    #[must_use]
    pub fn samples_per_probe(mut self, samples: usize) -> Self {
        self.samples_per_probe = samples;
        self
    }

    /// Hard cap on probe iterations across both sides.
    #[must_use]
    pub fn max_iterations(mut self, cap: u32) -> Self {
        self.max_iterations = cap;
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

    /// Replace the centering policy applied to the recorded trace.
    #[must_use]
    pub fn centering(mut self, centering: impl Centering + Send + Sync + 'static) -> Self {
        self.locator = FlatTopLocator::new(centering);
        self
    }

    /// Validate the configuration and build the sweep.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidStep`] for a non-positive step,
    /// [`Error::InvalidPlateauRatio`] for a ratio outside (0, 1), and
    /// [`Error::ZeroSamples`] for a zero per-probe sample count.
    pub fn build(self) -> Result<MirrorSweep> {
        if !(self.step > 0.0 && self.step.is_finite()) {
            return Err(Error::InvalidStep);
        }
        if !(self.plateau_ratio > 0.0 && self.plateau_ratio < 1.0) {
            return Err(Error::InvalidPlateauRatio(self.plateau_ratio));
        }
        if self.samples_per_probe == 0 {
            return Err(Error::ZeroSamples);
        }
        Ok(MirrorSweep { cfg: self })
    }
}

/// Two-sided plateau sweep with a final centering write.
///
/// Plateau detection compares each probe's fitness against
/// `plateau_ratio * running_max`, so it assumes the plateau's peak fitness
/// is positive (true for efficiency-style objectives and for parabola
/// scores near their peak).
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use beamtune::prelude::*;
///
/// let sim = Arc::new(SimulatedControlSystem::new());
/// sim.set_point("STH1400-02:adc", 10.0);
/// // Trapezoid response: flat top of 90 between 7 and 13, falling outside.
/// sim.link("STH1400-02:adc", "ICT1400-01:eff", |v: f64| {
///     let d = (v - 10.0).abs();
///     if d <= 3.0 { 90.0 } else { (90.0 - 10.0 * (d - 3.0)).max(0.0) }
/// });
///
/// let session = TuningSession::open(sim.clone(), "ICT1400-01:eff").unwrap();
/// let sweep = MirrorSweep::builder(1.0).build().unwrap();
/// let report = sweep.run(&session, "STH1400-02:adc", &Identity).unwrap();
///
/// assert_eq!(report.stop, StopReason::Converged);
/// assert_eq!(report.center, 10.0);
/// assert_eq!(sim.read("STH1400-02:adc").unwrap(), 10.0);
/// ```
pub struct MirrorSweep {
    cfg: SweepBuilder,
}

impl MirrorSweep {
    /// Start configuring a sweep with the given probe step.
    #[must_use]
    pub fn builder(step: f64) -> SweepBuilder {
        SweepBuilder::new(step)
    }

    /// Sweep `actuator`, center the recorded trace, and apply the center.
    ///
    /// # Errors
    ///
    /// Propagates control-system I/O failures, measurement timeouts,
    /// cancellation, and centering degeneracies ([`Error::NoPlateau`]).
    pub fn run<O: Objective>(
        &self,
        session: &TuningSession,
        actuator: &str,
        objective: &O,
    ) -> Result<SweepReport> {
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("mirror_sweep", actuator, step = self.cfg.step).entered();

        let control = session.control();
        let channel = session.channel();
        let timeout = self.cfg.measurement_timeout;
        let cancel = self.cfg.cancel.as_ref();
        let samples = self.cfg.samples_per_probe;

        let start = control.read(actuator)?;
        channel.reset();
        control.write(actuator, start, true)?;
        let start_fitness = channel.score_next(objective, samples, timeout, cancel)?;

        let mut trace = Trace::new();
        trace.push_right(Sample {
            value: start,
            fitness: start_fitness,
        });

        let mut peak = start_fitness;
        let mut val = start;
        let mut direction = -1.0;
        let mut drops = 0u8;
        let mut iterations = 0u32;
        let mut capped = false;

        while drops < 2 {
            if iterations >= self.cfg.max_iterations {
                capped = true;
                break;
            }
            let probe = val + self.cfg.step * direction;
            control.write(actuator, probe, true)?;
            let fitness = channel.score_next(objective, samples, timeout, cancel)?;
            iterations += 1;

            let sample = Sample {
                value: probe,
                fitness,
            };
            if direction < 0.0 {
                trace.push_left(sample);
            } else {
                trace.push_right(sample);
            }
            peak = peak.max(fitness);

            trace_info!(value = probe, fitness, peak, "sweep probe");

            if fitness <= self.cfg.plateau_ratio * peak {
                // This side of the plateau ends here. Return to the start
                // and sweep the other side; the second crossing finishes.
                drops += 1;
                direction = -direction;
                val = start;
                if drops < 2 {
                    control.write(actuator, start, true)?;
                }
                trace_debug!(drops, "plateau edge crossed");
            } else {
                val = probe;
            }
        }

        let samples_recorded = trace.len();
        let center = self.cfg.locator.locate(trace)?;
        control.write(actuator, center, true)?;

        trace_info!(center, iterations, "sweep centered");

        Ok(SweepReport {
            actuator: actuator.to_owned(),
            center,
            peak_fitness: peak,
            iterations,
            samples: samples_recorded,
            stop: if capped {
                StopReason::IterationCap
            } else {
                StopReason::Converged
            },
        })
    }
}
