#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![deny(unreachable_pub)]
#![deny(clippy::correctness)]
#![deny(clippy::suspicious)]
#![deny(clippy::style)]
#![deny(clippy::complexity)]
#![deny(clippy::perf)]

//! Derivative-free 1-D feedback tuning for control-system actuators.
//!
//! `beamtune` closes the loop between a single scalar actuator (a steering
//! magnet current, an RF phase knob) and a single asynchronously updated
//! scalar sensor (an injection efficiency, a shot rate). It drives the
//! actuator toward the setting that maximizes a derived fitness score using
//! a family of one-dimensional hill-climbing searches that tolerate noisy,
//! delayed measurements, plus a plateau locator that centers the actuator
//! on a "flat top" rather than a single noisy peak.
//!
//! # Getting Started
//!
//! Tune a simulated RF phase knob until the shot rate stabilizes inside an
//! acceptable band:
//!
//! ```
//! use std::sync::Arc;
//!
//! use beamtune::prelude::*;
//!
//! let sim = Arc::new(SimulatedControlSystem::new());
//! sim.set_point("RF1032-06:degree", 150.0);
//! // Crude plant model: shot rate peaks at 0.6 when the knob sits at 117.25.
//! sim.link("RF1032-06:degree", "PCT1402-01:rate", |deg| {
//!     0.6 - (deg - 117.25).powi(2) / 200.0
//! });
//!
//! let session = TuningSession::open(sim, "PCT1402-01:rate").unwrap();
//! let climber = HillClimber::builder(2.0)
//!     .goal_band(0.4, 0.8)
//!     .max_iterations(200)
//!     .build()
//!     .unwrap();
//!
//! let objective = Parabola::new(0.6, 1.0).unwrap();
//! let report = climber.tune(&session, "RF1032-06:degree", &objective).unwrap();
//! assert_eq!(report.stop, StopReason::Stabilized);
//! ```
//!
//! # Core Concepts
//!
//! | Type | Role |
//! |------|------|
//! | [`ControlSystem`](control::ControlSystem) | Narrow interface to the surrounding control-system client: read/write named points, subscribe to sensor updates. |
//! | [`FeedbackChannel`](channel::FeedbackChannel) | Single-slot mailbox translating push-style sensor updates into a blocking "next fresh measurement" pull. |
//! | [`Objective`](objective::Objective) | Pure mapping from a raw measurement to a fitness score; higher is better. |
//! | [`HillClimber`](climb::HillClimber) | The step/measure/compare/reverse search with optional step decay and multi-sample averaging. |
//! | [`MirrorSweep`](sweep::MirrorSweep) | Sweeps both sides of a plateau, then hands the recorded trace to a centering strategy. |
//! | [`FlatTopLocator`](flattop::FlatTopLocator) | Clips a sweep trace to its symmetric core and picks a representative center value. |
//! | [`TuningSession`](session::TuningSession) | Owns the sensor subscription for the lifetime of a tuning run. |
//!
//! # Feature Flags
//!
//! | Flag | What it enables | Default |
//! |------|----------------|---------|
//! | `serde` | `Serialize`/`Deserialize` on report types | off |
//! | `tracing` | Structured log events via [`tracing`](https://docs.rs/tracing) at key tuning points | off |

/// Emit a `tracing::info!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_info {
    ($($arg:tt)*) => { tracing::info!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_info {
    ($($arg:tt)*) => {};
}

/// Emit a `tracing::debug!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_debug {
    ($($arg:tt)*) => { tracing::debug!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_debug {
    ($($arg:tt)*) => {};
}

pub mod channel;
pub mod climb;
pub mod control;
mod error;
pub mod flattop;
pub mod objective;
pub mod session;
pub mod sim;
pub mod sweep;
mod types;

pub use channel::{FeedbackChannel, UpdateHandle};
pub use climb::{ClimbBuilder, HillClimber, Progress, ProgressHook, StepDecay, StopPolicy};
pub use control::{ControlSystem, SubscriptionId};
pub use error::{Error, Result};
pub use flattop::{Centering, FlatTopLocator, Midpoint, Sample, Trace, WeightedMean};
pub use objective::{Identity, Objective, Parabola};
pub use session::{ActuatorSpec, TuningSession};
pub use sweep::{MirrorSweep, SweepBuilder, SweepReport};
pub use types::{CancelToken, Measurement, StopReason, TuneReport};

/// Convenient wildcard import for the most common types.
///
/// ```
/// use beamtune::prelude::*;
/// ```
pub mod prelude {
    pub use crate::channel::{FeedbackChannel, UpdateHandle};
    pub use crate::climb::{
        ClimbBuilder, HillClimber, Progress, ProgressHook, StepDecay, StopPolicy,
    };
    pub use crate::control::{ControlSystem, SubscriptionId};
    pub use crate::error::{Error, Result};
    pub use crate::flattop::{Centering, FlatTopLocator, Midpoint, Sample, Trace, WeightedMean};
    pub use crate::objective::{Identity, Objective, Parabola};
    pub use crate::session::{ActuatorSpec, TuningSession};
    pub use crate::sim::SimulatedControlSystem;
    pub use crate::sweep::{MirrorSweep, SweepBuilder, SweepReport};
    pub use crate::types::{CancelToken, Measurement, StopReason, TuneReport};
}
