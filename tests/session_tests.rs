//! Integration tests for tuning sessions and sequential multi-actuator runs.

use core::time::Duration;
use std::sync::Arc;

use parking_lot::Mutex;

use beamtune::prelude::*;

const VERTICAL: &str = "STV1400-01:adc";
const HORIZONTAL: &str = "STH1400-02:adc";
const EFFICIENCY: &str = "ICT1400-01:eff";

/// Simulator where both steerers feed one transmission readback.
///
/// Efficiency peaks at (3, 5); each steerer write recomputes it from the
/// shared beam state, so tuning one actuator sees the other's position.
fn coupled_sim() -> Arc<SimulatedControlSystem> {
    let sim = Arc::new(SimulatedControlSystem::new());
    sim.set_point(VERTICAL, 6.0);
    sim.set_point(HORIZONTAL, 8.0);

    let state = Arc::new(Mutex::new((6.0_f64, 8.0_f64)));
    let efficiency = |(v, h): (f64, f64)| 20.0 - (v - 3.0).powi(2) - (h - 5.0).powi(2);

    let shared = Arc::clone(&state);
    sim.link(VERTICAL, EFFICIENCY, move |value| {
        let mut s = shared.lock();
        s.0 = value;
        efficiency(*s)
    });
    let shared = Arc::clone(&state);
    sim.link(HORIZONTAL, EFFICIENCY, move |value| {
        let mut s = shared.lock();
        s.1 = value;
        efficiency(*s)
    });
    sim
}

// =============================================================================
// Sequential multi-actuator tuning
// =============================================================================

#[test]
fn tune_each_optimizes_both_steerers_in_order() {
    let sim = coupled_sim();
    let session = TuningSession::open(sim.clone(), EFFICIENCY).unwrap();

    let specs = [
        ActuatorSpec::new(VERTICAL, 1.0),
        ActuatorSpec::new(HORIZONTAL, 1.0),
    ];
    let results = session.tune_each(HillClimber::builder(1.0).max_iterations(50), &specs, &Identity);

    assert_eq!(results.len(), 2);
    for (name, result) in &results {
        let report = result.as_ref().unwrap_or_else(|e| panic!("{name}: {e}"));
        assert_eq!(report.stop, StopReason::Converged);
    }
    // Integer steps from integer starts land exactly on the peak.
    assert_eq!(sim.read(VERTICAL).unwrap(), 3.0);
    assert_eq!(sim.read(HORIZONTAL).unwrap(), 5.0);
}

#[test]
fn tune_each_records_per_actuator_failures_and_continues() {
    let sim = coupled_sim();
    let session = TuningSession::open(sim.clone(), EFFICIENCY).unwrap();

    let specs = [
        ActuatorSpec::new("STV9999-99:adc", 1.0),
        ActuatorSpec::new(HORIZONTAL, 1.0),
    ];
    let results = session.tune_each(HillClimber::builder(1.0).max_iterations(50), &specs, &Identity);

    assert!(matches!(
        results[0].1,
        Err(Error::UnknownControlPoint { .. })
    ));
    assert!(results[1].1.is_ok(), "second actuator must still be tuned");
    assert_eq!(sim.read(HORIZONTAL).unwrap(), 5.0);
}

#[test]
fn per_actuator_step_overrides_the_base_step() {
    let sim = Arc::new(SimulatedControlSystem::new());
    sim.set_point(VERTICAL, 0.5);
    sim.link(VERTICAL, EFFICIENCY, |v: f64| -(v - 0.3).powi(2));

    let session = TuningSession::open(sim.clone(), EFFICIENCY).unwrap();
    // Base step of 1.0 would overshoot the whole feature; the spec's 0.1
    // must win.
    let specs = [ActuatorSpec::new(VERTICAL, 0.1)];
    let results = session.tune_each(HillClimber::builder(1.0).max_iterations(50), &specs, &Identity);

    let report = results[0].1.as_ref().unwrap();
    assert_eq!(report.stop, StopReason::Converged);
    assert!((report.value - 0.3).abs() < 0.15, "value {}", report.value);
}

// =============================================================================
// Subscription lifecycle
// =============================================================================

#[test]
fn dropping_the_session_unsubscribes() {
    let sim = coupled_sim();
    let session = TuningSession::open(sim.clone(), EFFICIENCY).unwrap();
    assert_eq!(sim.subscriber_count(), 1);
    drop(session);
    assert_eq!(sim.subscriber_count(), 0);
}

#[test]
fn close_unsubscribes_and_reports_success() {
    let sim = coupled_sim();
    let session = TuningSession::open(sim.clone(), EFFICIENCY).unwrap();
    session.close().unwrap();
    assert_eq!(sim.subscriber_count(), 0);
}

#[test]
fn open_fails_for_an_unknown_sensor() {
    let sim = Arc::new(SimulatedControlSystem::new());
    let err = TuningSession::open(sim, "ICT9999-99:eff").unwrap_err();
    assert!(matches!(err, Error::UnknownControlPoint { .. }));
}

// =============================================================================
// Filtered channels
// =============================================================================

#[test]
fn acceptance_filter_discards_out_of_range_updates() {
    let sim = Arc::new(SimulatedControlSystem::new());
    sim.set_point(EFFICIENCY, 0.0);

    // Negative glitches from the readback are dropped before they can be
    // consumed as measurements.
    let channel = FeedbackChannel::with_filter(|v| v >= 0.0);
    let session = TuningSession::open_with(sim.clone(), EFFICIENCY, channel).unwrap();

    sim.post(EFFICIENCY, -5.0).unwrap();
    sim.post(EFFICIENCY, 0.7).unwrap();

    let m = session
        .channel()
        .await_fresh(Duration::from_millis(200), None)
        .unwrap();
    assert_eq!(m.value, 0.7);
}
