//! In-memory control system for tests, doctests, and dry runs.
//!
//! Stands in for the real control-system client the way the original
//! machine scripts were rehearsed against fake `caget`/`caput` shims before
//! touching hardware: named points live in a map, and a plant link maps each
//! confirmed actuator write to a sensor update delivered through the normal
//! subscription path.

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use core::time::Duration;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::thread;

use parking_lot::Mutex;

use crate::control::{ControlSystem, SubscriptionId, UpdateFn};
use crate::error::{Error, Result};

type Response = Box<dyn Fn(f64) -> f64 + Send + Sync>;

struct Link {
    actuator: String,
    sensor: String,
    response: Response,
}

struct Subscriber {
    point: String,
    callback: Arc<UpdateFn>,
}

/// Simulated control system: named scalar points, subscriptions, and
/// optional plant links from actuators to sensors.
///
/// Unknown names error immediately on every operation, matching the
/// propagation policy for unresolvable control points.
#[derive(Default)]
pub struct SimulatedControlSystem {
    points: Mutex<HashMap<String, f64>>,
    subscribers: Mutex<HashMap<u64, Subscriber>>,
    links: Mutex<Vec<Link>>,
    next_subscription: AtomicU64,
}

impl SimulatedControlSystem {
    /// An empty simulator with no points.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite a named point without notifying subscribers.
    pub fn set_point(&self, name: &str, value: f64) {
        self.points.lock().insert(name.to_owned(), value);
    }

    /// Current value of a point, if it exists.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<f64> {
        self.points.lock().get(name).copied()
    }

    /// Number of active subscriptions (all points).
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Wire `sensor` to respond to every confirmed write of `actuator`.
    ///
    /// The sensor point is created immediately, seeded from the actuator's
    /// current value if it exists. Each confirmed write of the actuator
    /// computes `response(new_value)` and delivers it to the sensor's
    /// subscribers, emulating the plant settling and the readback updating.
    pub fn link(
        &self,
        actuator: &str,
        sensor: &str,
        response: impl Fn(f64) -> f64 + Send + Sync + 'static,
    ) {
        let seed = match self.value(actuator) {
            Some(v) => response(v),
            None => 0.0,
        };
        self.set_point(sensor, seed);
        self.links.lock().push(Link {
            actuator: actuator.to_owned(),
            sensor: sensor.to_owned(),
            response: Box::new(response),
        });
    }

    /// Manually deliver a sensor update, as the asynchronous source would.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownControlPoint`] if the point does not exist.
    pub fn post(&self, name: &str, value: f64) -> Result<()> {
        {
            let mut points = self.points.lock();
            let Some(slot) = points.get_mut(name) else {
                return Err(Error::UnknownControlPoint {
                    name: name.to_owned(),
                });
            };
            *slot = value;
        }
        self.notify(name, value);
        Ok(())
    }

    /// Start a thread republishing `sensor`'s current value every `period`.
    ///
    /// Emulates a monitor that pushes readings continuously rather than only
    /// when something changes; multi-sample averaging needs this, since it
    /// consumes several fresh readings per probe. The thread stops when the
    /// returned guard is dropped or the simulator itself goes away.
    #[must_use]
    pub fn start_monitor(self: &Arc<Self>, sensor: &str, period: Duration) -> MonitorGuard {
        let stop = Arc::new(AtomicBool::new(false));
        let weak: Weak<Self> = Arc::downgrade(self);
        let name = sensor.to_owned();
        let flag = Arc::clone(&stop);
        thread::spawn(move || {
            while !flag.load(Ordering::SeqCst) {
                let Some(sim) = weak.upgrade() else { break };
                if let Some(value) = sim.value(&name) {
                    sim.notify(&name, value);
                }
                drop(sim);
                thread::sleep(period);
            }
        });
        MonitorGuard { stop }
    }

    fn notify(&self, name: &str, value: f64) {
        // Collect matching callbacks first so none run under the lock.
        let callbacks: Vec<Arc<UpdateFn>> = self
            .subscribers
            .lock()
            .values()
            .filter(|s| s.point == name)
            .map(|s| Arc::clone(&s.callback))
            .collect();
        for callback in callbacks {
            callback(value);
        }
    }
}

impl ControlSystem for SimulatedControlSystem {
    fn read(&self, name: &str) -> Result<f64> {
        self.value(name).ok_or_else(|| Error::UnknownControlPoint {
            name: name.to_owned(),
        })
    }

    fn write(&self, name: &str, value: f64, confirm: bool) -> Result<()> {
        {
            let mut points = self.points.lock();
            let Some(slot) = points.get_mut(name) else {
                return Err(Error::UnknownControlPoint {
                    name: name.to_owned(),
                });
            };
            *slot = value;
        }

        // A confirmed write means the physical system has settled, which is
        // when the readback responds.
        if confirm {
            let updates: Vec<(String, f64)> = self
                .links
                .lock()
                .iter()
                .filter(|l| l.actuator == name)
                .map(|l| (l.sensor.clone(), (l.response)(value)))
                .collect();
            for (sensor, reading) in updates {
                self.set_point(&sensor, reading);
                self.notify(&sensor, reading);
            }
        }
        Ok(())
    }

    fn subscribe(&self, name: &str, on_update: UpdateFn) -> Result<SubscriptionId> {
        if self.value(name).is_none() {
            return Err(Error::UnknownControlPoint {
                name: name.to_owned(),
            });
        }
        let id = self.next_subscription.fetch_add(1, Ordering::SeqCst);
        self.subscribers.lock().insert(
            id,
            Subscriber {
                point: name.to_owned(),
                callback: Arc::new(on_update),
            },
        );
        Ok(SubscriptionId(id))
    }

    fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        self.subscribers.lock().remove(&id.0);
        Ok(())
    }
}

/// Stops the matching monitor thread when dropped.
pub struct MonitorGuard {
    stop: Arc<AtomicBool>,
}

impl Drop for MonitorGuard {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_points_error_immediately() {
        let sim = SimulatedControlSystem::new();
        assert!(matches!(
            sim.read("missing"),
            Err(Error::UnknownControlPoint { .. })
        ));
        assert!(sim.write("missing", 1.0, true).is_err());
        assert!(sim.subscribe("missing", Box::new(|_| ())).is_err());
    }

    #[test]
    fn confirmed_write_drives_linked_sensor() {
        let sim = SimulatedControlSystem::new();
        sim.set_point("magnet", 2.0);
        sim.link("magnet", "eff", |v| v * 10.0);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        sim.subscribe("eff", Box::new(move |v| sink.lock().push(v)))
            .unwrap();

        sim.write("magnet", 3.0, true).unwrap();
        sim.write("magnet", 4.0, false).unwrap();

        assert_eq!(*seen.lock(), vec![30.0]);
        assert_eq!(sim.value("eff"), Some(30.0));
        assert_eq!(sim.read("magnet").unwrap(), 4.0);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let sim = SimulatedControlSystem::new();
        sim.set_point("eff", 0.0);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = sim
            .subscribe("eff", Box::new(move |v| sink.lock().push(v)))
            .unwrap();
        sim.post("eff", 1.0).unwrap();
        sim.unsubscribe(id).unwrap();
        sim.post("eff", 2.0).unwrap();

        assert_eq!(*seen.lock(), vec![1.0]);
        assert_eq!(sim.subscriber_count(), 0);
    }

    #[test]
    fn monitor_republishes_until_dropped() {
        let sim = Arc::new(SimulatedControlSystem::new());
        sim.set_point("rate", 0.6);

        let seen = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&seen);
        sim.subscribe("rate", Box::new(move |_| *sink.lock() += 1))
            .unwrap();

        let guard = sim.start_monitor("rate", Duration::from_millis(5));
        thread::sleep(Duration::from_millis(60));
        drop(guard);
        let after_drop = *seen.lock();
        assert!(after_drop >= 3, "expected several republishes");

        thread::sleep(Duration::from_millis(40));
        assert!(*seen.lock() <= after_drop + 1, "monitor kept running");
    }
}
