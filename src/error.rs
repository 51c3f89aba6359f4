use core::time::Duration;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Returned when a named control point does not exist.
    ///
    /// Surfaced immediately; unknown names are never retried.
    #[error("unknown control point '{name}'")]
    UnknownControlPoint {
        /// The name that failed to resolve.
        name: String,
    },

    /// Returned when the control-system client fails a read, write, or
    /// subscription. Not retried internally; the caller decides whether to
    /// abort or skip to the next actuator.
    #[error("control point '{name}': {message}")]
    ControlSystem {
        /// The control point involved.
        name: String,
        /// The client library's description of the failure.
        message: String,
    },

    /// Returned when no fresh measurement arrived within the bounded wait.
    #[error("no fresh measurement within {waited:?}")]
    MeasurementTimeout {
        /// How long the channel waited before giving up.
        waited: Duration,
    },

    /// Returned when a blocking wait observed a triggered [`CancelToken`](crate::CancelToken).
    #[error("tuning cancelled")]
    Cancelled,

    /// Returned by weighted-mean centering when the total fitness weight of
    /// the clipped trace is not positive, so no centroid exists.
    #[error("no plateau found: total fitness weight is not positive")]
    NoPlateau,

    /// Returned when a trace with no samples is handed to the locator.
    #[error("trace contains no samples")]
    EmptyTrace,

    /// Returned when the step size is not positive.
    #[error("invalid step: step must be positive")]
    InvalidStep,

    /// Returned when a step-decay floor or decrement is not positive, or the
    /// floor exceeds the initial step.
    #[error("invalid step decay: floor and decrement must be positive and the floor must not exceed the initial step")]
    InvalidStepDecay,

    /// Returned when the goal band is empty.
    #[error("invalid goal band: min ({min}) must not exceed max ({max})")]
    InvalidBand {
        /// The lower edge of the band.
        min: f64,
        /// The upper edge of the band.
        max: f64,
    },

    /// Returned when the plateau ratio is not in the valid range (0.0, 1.0).
    #[error("invalid plateau ratio: {0} must be in (0.0, 1.0)")]
    InvalidPlateauRatio(f64),

    /// Returned when the per-probe sample count is zero.
    #[error("samples per probe must be at least 1")]
    ZeroSamples,
}

/// A specialized `Result` type for tuning operations.
pub type Result<T> = core::result::Result<T, Error>;
