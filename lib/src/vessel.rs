//! Ships: staged propulsion, attitude and throttle.

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use time::Duration;
use tracing::trace;

use crate::maneuver::Maneuver;

/// Standard gravity (`m/s^2`)
pub const G0: f64 = 9.80665;

/// Angular rates below this are snapped to zero by stability assist.
const RATE_EPSILON: f64 = 1e-9;

/// One stage of a ship. Masses in `kg`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub dry_mass: f64,
    pub propellant: f64,
    /// Specific impulse (`s`)
    pub isp: f64,
    /// Full-throttle thrust (`N`)
    pub thrust: f64,
}

impl Stage {
    pub fn mass(&self) -> f64 {
        self.dry_mass + self.propellant
    }

    /// Propellant flow at full throttle (`kg/s`)
    pub fn mass_flow(&self) -> f64 {
        if self.isp > 0.0 {
            self.thrust / (G0 * self.isp)
        } else {
            0.0
        }
    }

    pub fn exhaust_velocity(&self) -> f64 {
        self.isp * G0
    }
}

/// Attitude and control inputs.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Motion {
    /// Rotation from the ship frame to the ecliptic frame. The ship's nose
    /// is its `+x` axis.
    pub orientation: UnitQuaternion<f64>,
    /// Rates about the ship's `y`, `z` and `x` axes (`rad/s`)
    pub pitch_rate: f64,
    pub yaw_rate: f64,
    pub roll_rate: f64,
    /// In `[0, 1]`
    pub throttle: f64,
    pub stability_assist: bool,
}

impl Default for Motion {
    fn default() -> Self {
        Self {
            orientation: UnitQuaternion::identity(),
            pitch_rate: 0.0,
            yaw_rate: 0.0,
            roll_rate: 0.0,
            throttle: 0.0,
            stability_assist: false,
        }
    }
}

/// The result of one tick of thrust.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Burn {
    /// Velocity change (`m/s`)
    pub delta_v: f64,
    pub propellant_used: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Ship {
    /// Mass above the stack (`kg`)
    pub payload_mass: f64,
    /// Bottom stage first; the first stage is the one that fires.
    pub stages: Vec<Stage>,
    #[serde(default)]
    pub motion: Motion,
    #[serde(default)]
    pub maneuvers: Vec<Maneuver>,
}

impl Ship {
    pub fn mass(&self) -> f64 {
        self.payload_mass + self.stages.iter().map(Stage::mass).sum::<f64>()
    }

    pub fn propellant(&self) -> f64 {
        self.stages.first().map_or(0.0, |s| s.propellant)
    }

    /// Unit vector along the ship's nose.
    pub fn heading(&self) -> Vector3<f64> {
        self.motion.orientation * Vector3::x()
    }

    pub fn set_throttle(&mut self, throttle: f64) {
        self.motion.throttle = throttle.clamp(0.0, 1.0);
    }

    pub fn set_rates(&mut self, pitch: f64, yaw: f64, roll: f64) {
        self.motion.pitch_rate = pitch;
        self.motion.yaw_rate = yaw;
        self.motion.roll_rate = roll;
    }

    /// Turn the nose toward `direction`, keeping the angular rates.
    pub fn point_at(&mut self, direction: &Vector3<f64>) {
        if direction.norm_squared() == 0.0 {
            return;
        }
        self.motion.orientation = UnitQuaternion::rotation_between(&Vector3::x(), direction)
            .unwrap_or_else(|| {
                UnitQuaternion::from_axis_angle(&Vector3::z_axis(), std::f64::consts::PI)
            });
    }

    /// Total ideal delta-v of the remaining stack (`m/s`).
    pub fn delta_v(&self) -> f64 {
        let mut mass = self.mass();
        let mut total = 0.0;
        for stage in &self.stages {
            let dry = mass - stage.propellant;
            if stage.propellant > 0.0 && dry > 0.0 {
                total += stage.exhaust_velocity() * libm::log(mass / dry);
            }
            mass -= stage.mass();
        }
        total
    }

    /// Drop the bottom stage. Returns whether there was one to drop.
    pub fn stage(&mut self) -> bool {
        if self.stages.is_empty() {
            return false;
        }
        let dropped = self.stages.remove(0);
        trace!(?dropped, remaining = self.stages.len(), "staged");
        true
    }

    /// Integrate the angular rates over `dt`, then bleed them off by
    /// `damping_step` each if stability assist is on.
    pub fn rotate(&mut self, dt: Duration, damping_step: f64) {
        let dt = dt.as_seconds_f64();
        let m = &mut self.motion;
        let delta = UnitQuaternion::from_euler_angles(
            m.roll_rate * dt,
            m.pitch_rate * dt,
            m.yaw_rate * dt,
        );
        m.orientation = m.orientation * delta;
        m.orientation.renormalize();

        if m.stability_assist {
            for rate in [&mut m.pitch_rate, &mut m.yaw_rate, &mut m.roll_rate] {
                *rate -= rate.signum() * damping_step.min(rate.abs());
                if rate.abs() < RATE_EPSILON {
                    *rate = 0.0;
                }
            }
        }
    }

    /// Burn the active stage for `dt` at the current throttle. `None` if
    /// the engine is idle or dry.
    pub fn burn(&mut self, dt: Duration) -> Option<Burn> {
        let throttle = self.motion.throttle;
        let m0 = self.mass();
        let stage = self.stages.first_mut()?;
        if throttle <= 0.0 || stage.propellant <= 0.0 || stage.thrust <= 0.0 {
            return None;
        }

        let used = (stage.mass_flow() * throttle * dt.as_seconds_f64()).min(stage.propellant);
        if used <= 0.0 {
            return None;
        }
        stage.propellant -= used;
        let m1 = m0 - used;
        let delta_v = stage.exhaust_velocity() * libm::log(m0 / m1);
        trace!(used, m0, m1, delta_v, "burn");

        Some(Burn {
            delta_v,
            propellant_used: used,
        })
    }
}

#[cfg(test)]
fn probe() -> Ship {
    Ship {
        payload_mass: 50.0,
        stages: vec![Stage {
            dry_mass: 50.0,
            propellant: 100.0,
            isp: 300.0,
            thrust: 1000.0,
        }],
        ..Default::default()
    }
}

#[test]
fn burn_follows_rocket_equation() {
    let mut ship = probe();
    ship.set_throttle(1.0);
    let burn = ship.burn(Duration::seconds(10)).unwrap();
    let used = 10.0 * 1000.0 / (G0 * 300.0);
    assert!((burn.propellant_used - used).abs() < 1e-12);
    let expected = 300.0 * G0 * libm::log(200.0 / (200.0 - used));
    assert!((burn.delta_v - expected).abs() < 1e-9);
    assert!((ship.mass() - (200.0 - used)).abs() < 1e-12);
}

#[test]
fn burn_stops_when_dry() {
    let mut ship = probe();
    ship.set_throttle(1.0);
    let burn = ship.burn(Duration::hours(1)).unwrap();
    assert_eq!(burn.propellant_used, 100.0);
    assert!((burn.delta_v - 300.0 * G0 * libm::log(2.0)).abs() < 1e-9);
    assert_eq!(ship.burn(Duration::seconds(1)), None);

    assert!(ship.stage());
    assert_eq!(ship.mass(), 50.0);
    assert!(!ship.stage());
}

#[test]
fn idle_engine_does_nothing() {
    let mut ship = probe();
    assert_eq!(ship.burn(Duration::seconds(10)), None);
    ship.set_throttle(-3.0);
    assert_eq!(ship.motion.throttle, 0.0);
    assert_eq!(ship.propellant(), 100.0);
}

#[test]
fn stack_delta_v() {
    let mut ship = probe();
    ship.stages.push(Stage {
        dry_mass: 10.0,
        propellant: 40.0,
        isp: 350.0,
        thrust: 100.0,
    });
    let lower = 300.0 * G0 * libm::log(250.0 / 150.0);
    let upper = 350.0 * G0 * libm::log(100.0 / 60.0);
    assert!((ship.delta_v() - (lower + upper)).abs() < 1e-9);
}

#[test]
fn rates_turn_the_heading() {
    let mut ship = probe();
    ship.set_rates(0.0, std::f64::consts::FRAC_PI_2, 0.0);
    ship.rotate(Duration::seconds(1), 0.0);
    assert!((ship.heading() - Vector3::y()).norm() < 1e-12);
}

#[test]
fn point_at_sets_heading() {
    let mut ship = probe();
    for dir in [Vector3::new(0.0, 3.0, 4.0), -Vector3::x(), Vector3::x()] {
        ship.point_at(&dir);
        assert!((ship.heading() - dir.normalize()).norm() < 1e-12, "{dir:?}");
    }
}

#[test]
fn stability_assist_damps_to_zero() {
    let mut ship = probe();
    ship.motion.stability_assist = true;
    ship.set_rates(0.0025, -0.001, 0.0);
    ship.rotate(Duration::milliseconds(100), 1e-3);
    assert!((ship.motion.pitch_rate - 0.0015).abs() < 1e-15);
    assert_eq!(ship.motion.yaw_rate, 0.0);
    for _ in 0..2 {
        ship.rotate(Duration::milliseconds(100), 1e-3);
    }
    assert_eq!(ship.motion.pitch_rate, 0.0);
    assert_eq!(ship.motion.roll_rate, 0.0);
}
