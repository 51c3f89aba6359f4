//! Integration tests for the hill-climbing search.

use core::ops::ControlFlow;
use core::time::Duration;
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use beamtune::prelude::*;

const MAGNET: &str = "STV1400-01:adc";
const EFFICIENCY: &str = "ICT1400-01:eff";

/// Simulator with one actuator wired straight through to the sensor.
fn passthrough_sim(start: f64) -> Arc<SimulatedControlSystem> {
    let sim = Arc::new(SimulatedControlSystem::new());
    sim.set_point(MAGNET, start);
    sim.link(MAGNET, EFFICIENCY, |v| v);
    sim
}

// =============================================================================
// Convergence on a single-peaked objective
// =============================================================================

#[test]
fn converges_within_one_step_of_the_peak() {
    // Actuator range [0, 20], fitness 1 - 4*(m-10)^2/100, step 2: the final
    // value must land within [8, 12].
    let sim = passthrough_sim(17.0);
    let session = TuningSession::open(sim.clone(), EFFICIENCY).unwrap();
    let climber = HillClimber::builder(2.0).max_iterations(50).build().unwrap();
    let objective = Parabola::new(10.0, 10.0).unwrap();

    let report = climber.tune(&session, MAGNET, &objective).unwrap();

    assert_eq!(report.stop, StopReason::Converged);
    assert!(
        (8.0..=12.0).contains(&report.value),
        "final value {} outside [8, 12]",
        report.value
    );
    assert_eq!(sim.read(MAGNET).unwrap(), report.value);
}

#[test]
fn wrong_initial_direction_is_corrected() {
    // Starting left of the peak, the conventional negative first step is
    // wrong; the iteration-0 reversal must not count as convergence.
    let sim = passthrough_sim(3.0);
    let session = TuningSession::open(sim, EFFICIENCY).unwrap();
    let climber = HillClimber::builder(2.0).max_iterations(50).build().unwrap();
    let objective = Parabola::new(10.0, 10.0).unwrap();

    let report = climber.tune(&session, MAGNET, &objective).unwrap();

    assert_eq!(report.stop, StopReason::Converged);
    assert!((8.0..=12.0).contains(&report.value));
    assert!(report.reversals >= 2, "needs the initial flip plus the peak");
}

// =============================================================================
// Reversal idempotence: no drift
// =============================================================================

#[test]
fn double_reversal_returns_actuator_exactly() {
    // Starting exactly on the peak, both probes fail and both reversals
    // restore the pre-probe value bit-for-bit.
    let sim = passthrough_sim(10.0);
    let session = TuningSession::open(sim.clone(), EFFICIENCY).unwrap();
    let climber = HillClimber::builder(2.0).max_iterations(50).build().unwrap();
    let objective = Parabola::new(10.0, 10.0).unwrap();

    let report = climber.tune(&session, MAGNET, &objective).unwrap();

    assert_eq!(report.stop, StopReason::Converged);
    assert_eq!(report.value, 10.0);
    assert_eq!(report.iterations, 2);
    assert_eq!(report.reversals, 2);
    assert_eq!(sim.read(MAGNET).unwrap(), 10.0);
}

// =============================================================================
// Decreasing-step mode
// =============================================================================

#[test]
fn step_is_non_increasing_and_floored() {
    let sim = passthrough_sim(10.0);
    let session = TuningSession::open(sim, EFFICIENCY).unwrap();
    // An unreachable goal band keeps the search oscillating across the peak
    // so the step decays repeatedly.
    let climber = HillClimber::builder(2.0)
        .linear_decay(0.5, 0.5)
        .goal_band(100.0, 200.0)
        .max_iterations(30)
        .build()
        .unwrap();
    let objective = Parabola::new(10.0, 10.0).unwrap();

    let steps: Arc<Mutex<Vec<f64>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&steps);
    let hook = move |p: &Progress| {
        sink.lock().push(p.step);
        ControlFlow::Continue(())
    };

    let report = climber.tune_with(&session, MAGNET, &objective, &hook).unwrap();
    assert_eq!(report.stop, StopReason::IterationCap);

    let steps = steps.lock();
    assert!(steps.windows(2).all(|w| w[1] <= w[0]), "step increased");
    assert!(steps.iter().all(|&s| s >= 0.5), "step fell below the floor");
    assert_eq!(*steps.last().unwrap(), 0.5, "decay never reached the floor");
}

// =============================================================================
// Stability-window termination
// =============================================================================

#[test]
fn stops_exactly_when_third_in_band_value_is_consumed() {
    let sim = Arc::new(SimulatedControlSystem::new());
    sim.set_point(MAGNET, 0.0);

    // Scripted sensor: each confirmed write delivers the next value,
    // regardless of the actuator setting. Non-decreasing so every probe is
    // accepted and exactly one value is consumed per iteration.
    let script: Mutex<VecDeque<f64>> = Mutex::new(
        [0.0, 0.0, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5]
            .into_iter()
            .collect(),
    );
    sim.link(MAGNET, EFFICIENCY, move |_| {
        script.lock().pop_front().unwrap_or(0.5)
    });

    let session = TuningSession::open(sim, EFFICIENCY).unwrap();
    let climber = HillClimber::builder(1.0)
        .goal_band(0.4, 0.8)
        .max_iterations(50)
        .build()
        .unwrap();

    let report = climber.tune(&session, MAGNET, &Identity).unwrap();

    assert_eq!(report.stop, StopReason::Stabilized);
    // INIT consumes the first scripted value; the third in-band value
    // arrives on the fourth probe, and the run must stop right there.
    assert_eq!(report.iterations, 4);
}

// =============================================================================
// Iteration cap
// =============================================================================

#[test]
fn cap_is_reported_as_a_normal_terminal_state() {
    let sim = Arc::new(SimulatedControlSystem::new());
    sim.set_point(MAGNET, 0.0);
    // Fitness rises forever in the initial (negative) direction.
    sim.link(MAGNET, EFFICIENCY, |v| -v);

    let session = TuningSession::open(sim, EFFICIENCY).unwrap();
    let climber = HillClimber::builder(2.0).max_iterations(10).build().unwrap();

    let report = climber.tune(&session, MAGNET, &Identity).unwrap();

    assert_eq!(report.stop, StopReason::IterationCap);
    assert_eq!(report.iterations, 10);
    assert_eq!(report.value, -20.0);
}

// =============================================================================
// Multi-sample averaging
// =============================================================================

#[test]
fn multi_sample_mode_converges_on_a_noisy_readback() {
    let sim = Arc::new(SimulatedControlSystem::new());
    sim.set_point(MAGNET, 17.0);

    let rng = Mutex::new(StdRng::seed_from_u64(42));
    sim.link(MAGNET, EFFICIENCY, move |v| {
        v + rng.lock().gen_range(-0.05..0.05)
    });

    // The monitor keeps republishing the readback so each probe can consume
    // several fresh samples.
    let monitor = sim.start_monitor(EFFICIENCY, Duration::from_millis(5));

    let session = TuningSession::open(sim, EFFICIENCY).unwrap();
    let climber = HillClimber::builder(2.0)
        .samples_per_probe(3)
        .max_iterations(50)
        .build()
        .unwrap();
    let objective = Parabola::new(10.0, 10.0).unwrap();

    let report = climber.tune(&session, MAGNET, &objective).unwrap();
    drop(monitor);

    assert_eq!(report.stop, StopReason::Converged);
    assert!(
        (8.0..=12.0).contains(&report.value),
        "final value {} outside [8, 12]",
        report.value
    );
}

// =============================================================================
// Progress hooks
// =============================================================================

#[test]
fn hook_break_stops_the_run() {
    let sim = passthrough_sim(17.0);
    let session = TuningSession::open(sim, EFFICIENCY).unwrap();
    let climber = HillClimber::builder(2.0).max_iterations(50).build().unwrap();
    let objective = Parabola::new(10.0, 10.0).unwrap();

    let hook = |p: &Progress| {
        if p.iteration >= 3 {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    };
    let report = climber.tune_with(&session, MAGNET, &objective, &hook).unwrap();

    assert_eq!(report.stop, StopReason::Stopped);
    assert_eq!(report.iterations, 4);
}

// =============================================================================
// Failure modes
// =============================================================================

#[test]
fn silent_sensor_times_out_instead_of_hanging() {
    let sim = Arc::new(SimulatedControlSystem::new());
    sim.set_point(MAGNET, 5.0);
    sim.set_point(EFFICIENCY, 0.0); // exists, but never updates

    let session = TuningSession::open(sim, EFFICIENCY).unwrap();
    let climber = HillClimber::builder(1.0)
        .measurement_timeout(Duration::from_millis(50))
        .build()
        .unwrap();

    let err = climber.tune(&session, MAGNET, &Identity).unwrap_err();
    assert!(matches!(err, Error::MeasurementTimeout { .. }));
}

#[test]
fn unknown_actuator_fails_immediately() {
    let sim = passthrough_sim(5.0);
    let session = TuningSession::open(sim, EFFICIENCY).unwrap();
    let climber = HillClimber::builder(1.0).build().unwrap();

    let err = climber.tune(&session, "STV9999-99:adc", &Identity).unwrap_err();
    assert!(matches!(err, Error::UnknownControlPoint { .. }));
}

#[test]
fn cancellation_aborts_a_blocked_wait() {
    let sim = Arc::new(SimulatedControlSystem::new());
    sim.set_point(MAGNET, 5.0);
    sim.set_point(EFFICIENCY, 0.0); // never updates

    let token = CancelToken::new();
    let session = TuningSession::open(sim, EFFICIENCY).unwrap();
    let climber = HillClimber::builder(1.0)
        .measurement_timeout(Duration::from_secs(30))
        .cancel_token(token.clone())
        .build()
        .unwrap();

    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(40));
        token.cancel();
    });

    let err = climber.tune(&session, MAGNET, &Identity).unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    canceller.join().unwrap();
}

// =============================================================================
// Builder validation
// =============================================================================

#[test]
fn builder_rejects_invalid_configurations() {
    assert!(matches!(
        HillClimber::builder(0.0).build(),
        Err(Error::InvalidStep)
    ));
    assert!(matches!(
        HillClimber::builder(1.0).linear_decay(0.0, 0.5).build(),
        Err(Error::InvalidStepDecay)
    ));
    assert!(matches!(
        HillClimber::builder(1.0).linear_decay(0.5, 2.0).build(),
        Err(Error::InvalidStepDecay)
    ));
    assert!(matches!(
        HillClimber::builder(1.0).geometric_decay(1.5, 0.5).build(),
        Err(Error::InvalidStepDecay)
    ));
    assert!(matches!(
        HillClimber::builder(1.0).goal_band(0.8, 0.4).build(),
        Err(Error::InvalidBand { .. })
    ));
    assert!(matches!(
        HillClimber::builder(1.0).samples_per_probe(0).build(),
        Err(Error::ZeroSamples)
    ));
}
