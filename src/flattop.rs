//! Plateau centering for mirror-sweep traces.
//!
//! A mirror sweep records every visited (value, fitness) pair into a
//! [`Trace`] ordered by physical position along the actuator range. The
//! sweep crosses the plateau's edge threshold on both sides, so the trace
//! carries asymmetric low-fitness tails. [`FlatTopLocator`] clips those
//! tails down to the symmetric core and then delegates to a [`Centering`]
//! policy to pick the representative center value.

use std::collections::VecDeque;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One recorded point of a directional sweep.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Sample {
    /// The actuator value that was applied.
    pub value: f64,
    /// The fitness measured at that value.
    pub fitness: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

/// Position-ordered sequence of [`Sample`]s from one sweep.
///
/// Order corresponds to physical position along the swept range
/// (left-to-right) regardless of the order the sweep visited them: samples
/// taken while moving in the negative direction are inserted at the front.
/// The locator consumes a trace destructively — clipping shrinks it.
#[derive(Clone, Debug, Default)]
pub struct Trace {
    samples: VecDeque<Sample>,
}

impl Trace {
    /// An empty trace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a trace from `(value, fitness)` pairs already in position order.
    #[must_use]
    pub fn from_samples(pairs: &[(f64, f64)]) -> Self {
        Self {
            samples: pairs
                .iter()
                .map(|&(value, fitness)| Sample { value, fitness })
                .collect(),
        }
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the trace holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Insert a sample taken while sweeping in the negative direction.
    pub fn push_left(&mut self, sample: Sample) {
        self.samples.push_front(sample);
    }

    /// Insert a sample taken while sweeping in the positive direction.
    pub fn push_right(&mut self, sample: Sample) {
        self.samples.push_back(sample);
    }

    /// The leftmost (lowest-position) sample.
    #[must_use]
    pub fn first(&self) -> Option<&Sample> {
        self.samples.front()
    }

    /// The rightmost (highest-position) sample.
    #[must_use]
    pub fn last(&self) -> Option<&Sample> {
        self.samples.back()
    }

    /// Sample at position index `i`.
    #[must_use]
    pub fn get(&self, i: usize) -> Option<&Sample> {
        self.samples.get(i)
    }

    /// Iterate samples left to right.
    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    /// Which boundary currently has the strictly lower fitness, if any.
    fn worst_side(&self) -> Option<Side> {
        let first = self.samples.front()?;
        let last = self.samples.back()?;
        if first.fitness < last.fitness {
            Some(Side::Left)
        } else if last.fitness < first.fitness {
            Some(Side::Right)
        } else {
            None
        }
    }

    fn drop_side(&mut self, side: Side) {
        match side {
            Side::Left => self.samples.pop_front(),
            Side::Right => self.samples.pop_back(),
        };
    }

    /// Clip the asymmetric tails off the trace.
    ///
    /// Repeatedly drops the extreme sample from whichever side has the lower
    /// boundary fitness, stopping the instant the worst side switches or the
    /// two boundary fitness values become equal. The trace shrinks by one
    /// sample per iteration, so termination is guaranteed; at least one
    /// sample always remains.
    ///
    /// # Examples
    ///
    /// ```
    /// use beamtune::Trace;
    ///
    /// let mut trace = Trace::from_samples(&[(1.0, 5.0), (2.0, 40.0), (3.0, 90.0), (4.0, 40.0)]);
    /// trace.clip_tails();
    /// // The low left tail is gone; the boundaries are now equal.
    /// assert_eq!(trace.first().unwrap().value, 2.0);
    /// assert_eq!(trace.len(), 3);
    /// ```
    pub fn clip_tails(&mut self) {
        let Some(mut side) = self.worst_side() else {
            return;
        };
        while self.len() >= 2 {
            self.drop_side(side);
            match self.worst_side() {
                Some(s) if s == side => {}
                // Worst side flipped, or the boundaries evened out.
                _ => break,
            }
        }
    }
}

impl<'a> IntoIterator for &'a Trace {
    type Item = &'a Sample;
    type IntoIter = std::collections::vec_deque::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

/// Strategy for picking the representative center of a clipped trace.
pub trait Centering {
    /// Return the actuator value at the plateau center.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyTrace`] for a trace with no samples; policy-specific
    /// degeneracy errors otherwise.
    fn center(&self, trace: &Trace) -> Result<f64>;
}

/// Structural-midpoint centering: the value at index `(len - 1) / 2`.
///
/// On even-length traces the tie breaks toward the earlier (left,
/// lower-value) of the two middle indices.
#[derive(Clone, Copy, Debug, Default)]
pub struct Midpoint;

impl Centering for Midpoint {
    fn center(&self, trace: &Trace) -> Result<f64> {
        let mid = trace.len().saturating_sub(1) / 2;
        trace
            .get(mid)
            .map(|s| s.value)
            .ok_or(Error::EmptyTrace)
    }
}

/// Noise-smoothed weighted-mean centering.
///
/// The raw weighted mean of a noisy plateau is easily skewed by one hot
/// sample or by unequal edge heights, so the policy first equalizes the two
/// boundary fitness values upward, pads the trace by duplicating both edge
/// samples once, and runs a 3-point moving average over every interior
/// fitness value. The center is then the 1-indexed weighted mean position
/// `sum(i * fitness_i) / sum(fitness_i)`, rounded to the nearest index.
///
/// The result is invariant under uniform positive scaling of all fitness
/// values. A trace whose total smoothed weight is not positive has no
/// defined centroid and fails with [`Error::NoPlateau`].
#[derive(Clone, Copy, Debug, Default)]
pub struct WeightedMean;

impl Centering for WeightedMean {
    fn center(&self, trace: &Trace) -> Result<f64> {
        let n = trace.len();
        let (Some(first), Some(last)) = (trace.first(), trace.last()) else {
            return Err(Error::EmptyTrace);
        };
        if n == 1 {
            return Ok(first.value);
        }

        // Equalize the boundaries upward so an asymmetric edge cannot skew
        // the centroid, then pad by duplicating both edges once.
        let hi = first.fitness.max(last.fitness);
        let mut fitness = Vec::with_capacity(n + 2);
        let mut values = Vec::with_capacity(n + 2);
        fitness.push(hi);
        values.push(first.value);
        for s in trace {
            fitness.push(s.fitness);
            values.push(s.value);
        }
        fitness[1] = hi;
        fitness[n] = hi;
        fitness.push(hi);
        values.push(last.value);

        // 3-point moving average over the interior, computed from a
        // pre-smoothing snapshot; the duplicated edges stay as-is.
        let snapshot = fitness.clone();
        for i in 1..=n {
            fitness[i] = (snapshot[i - 1] + snapshot[i] + snapshot[i + 1]) / 3.0;
        }

        let total: f64 = fitness.iter().sum();
        if total <= 0.0 {
            return Err(Error::NoPlateau);
        }
        #[allow(clippy::cast_precision_loss)]
        let weighted: f64 = fitness
            .iter()
            .enumerate()
            .map(|(i, f)| (i + 1) as f64 * f)
            .sum();
        let position = weighted / total;

        #[allow(clippy::cast_possible_truncation)]
        let index = (position.round() as isize - 1).clamp(0, values.len() as isize - 1);
        #[allow(clippy::cast_sign_loss)]
        Ok(values[index as usize])
    }
}

/// Clips a sweep trace and centers on the plateau.
///
/// # Examples
///
/// ```
/// use beamtune::{FlatTopLocator, Midpoint, Trace};
///
/// let trace = Trace::from_samples(&[
///     (1.0, 10.0),
///     (2.0, 40.0),
///     (3.0, 90.0),
///     (4.0, 90.0),
///     (5.0, 40.0),
///     (6.0, 10.0),
/// ]);
/// let locator = FlatTopLocator::new(Midpoint);
/// assert_eq!(locator.locate(trace).unwrap(), 3.0);
/// ```
pub struct FlatTopLocator {
    centering: Box<dyn Centering + Send + Sync>,
}

impl FlatTopLocator {
    /// Create a locator with the given centering policy.
    #[must_use]
    pub fn new(centering: impl Centering + Send + Sync + 'static) -> Self {
        Self {
            centering: Box::new(centering),
        }
    }

    /// Clip the trace's tails, then pick the plateau center.
    ///
    /// A single-sample trace degenerates to that sample's value.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyTrace`] for an empty trace, plus whatever the centering
    /// policy reports (e.g. [`Error::NoPlateau`]).
    pub fn locate(&self, mut trace: Trace) -> Result<f64> {
        if trace.is_empty() {
            return Err(Error::EmptyTrace);
        }
        trace.clip_tails();
        self.centering.center(&trace)
    }
}

impl Default for FlatTopLocator {
    fn default() -> Self {
        Self::new(Midpoint)
    }
}
