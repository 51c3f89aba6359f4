//! The [`Objective`] trait maps raw measurements to fitness scores.
//!
//! The search only ever compares fitness values, so the objective shape is
//! what turns "keep the shot rate inside a band" into an ordinary
//! maximization problem: an inverted parabola scores the band's center
//! highest and falls off symmetrically, letting the hill-climber home in on
//! an interval target with plain comparisons.
//!
//! For simple shapes, pass a closure directly:
//!
//! ```
//! use beamtune::Objective;
//!
//! let efficiency_squared = |m: f64| m * m;
//! assert_eq!(efficiency_squared.score(3.0), 9.0);
//! ```

use crate::error::{Error, Result};

/// A pure, side-effect-free mapping from one raw measurement to a fitness
/// score. Higher is always better; no normalization across different
/// objectives is assumed.
pub trait Objective {
    /// Score a single raw measurement.
    fn score(&self, measurement: f64) -> f64;
}

impl<F> Objective for F
where
    F: Fn(f64) -> f64,
{
    fn score(&self, measurement: f64) -> f64 {
        self(measurement)
    }
}

/// Pass-through objective: the measurement is its own fitness.
///
/// Used when the sensor already reports the quantity to maximize, such as an
/// injection efficiency readback.
#[derive(Clone, Copy, Debug, Default)]
pub struct Identity;

impl Objective for Identity {
    fn score(&self, measurement: f64) -> f64 {
        measurement
    }
}

/// Inverted parabola centered on a target measurement.
///
/// `score = 1 - 4 * ((m - target) / width)^2`: maximal (1.0) exactly at
/// `m == target`, zero at `|m - target| == width / 2`. The shape is a design
/// choice, not a physical law — it makes an acceptable measurement *band*
/// comparable by ordinary fitness ordering.
///
/// # Examples
///
/// ```
/// use beamtune::{Objective, Parabola};
///
/// // Shot rate ideally 0.6; score crosses zero at 0.35 and 0.85.
/// let shape = Parabola::new(0.6, 1.0).unwrap();
/// assert_eq!(shape.score(0.6), 1.0);
/// assert!(shape.score(0.85).abs() < 1e-12);
/// assert!(shape.score(1.2) < 0.0);
/// ```
#[derive(Clone, Copy, Debug)]
pub struct Parabola {
    target: f64,
    width: f64,
}

impl Parabola {
    /// Create a parabola peaking at `target` with zero crossings at
    /// `target ± width / 2`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBand`] when `width` is not positive and
    /// finite or `target` is not finite.
    pub fn new(target: f64, width: f64) -> Result<Self> {
        if !(width > 0.0 && width.is_finite() && target.is_finite()) {
            return Err(Error::InvalidBand {
                min: target - width / 2.0,
                max: target + width / 2.0,
            });
        }
        Ok(Self { target, width })
    }

    /// The measurement at which the score is maximal.
    #[must_use]
    pub fn target(&self) -> f64 {
        self.target
    }

    /// The distance between the two zero crossings.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.width
    }
}

impl Objective for Parabola {
    fn score(&self, measurement: f64) -> f64 {
        let offset = (measurement - self.target) / self.width;
        1.0 - 4.0 * offset * offset
    }
}
