use std::{
    f64::consts,
    sync::atomic::{AtomicU64, Ordering},
};

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::kepler::orbits::{Orbit, Projection, StateVector};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(transparent)]
pub struct ManeuverId(u64);

impl ManeuverId {
    /// A process-wide unique id. Ids start at 1 and are never reused.
    pub fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A planned impulsive burn and the orbit it leads to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Maneuver {
    pub id: ManeuverId,
    /// Orbit right after the burn, with its mean anomaly at the burn point.
    pub target: Orbit,
    /// Delta-V vector in the ecliptic frame.
    pub delta_v: Vector3<f64>,
    /// Delta-V vector in the Frenet frame (prograde, normal, radial).
    pub delta_v_frenet: Vector3<f64>,
    /// Time from planning until the burn point.
    pub time_delta: time::Duration,
}

impl Maneuver {
    pub fn new(target: Orbit, delta_v: Vector3<f64>) -> Self {
        Self {
            id: ManeuverId::next(),
            target,
            delta_v,
            delta_v_frenet: Vector3::zeros(),
            time_delta: time::Duration::ZERO,
        }
    }

    /// Plan a burn of `delta_v_frenet` where `orbit`, about a primary at
    /// `focus`, next passes the direction of `point`.
    ///
    /// Returns `None` if the resulting eccentricity fits no orbit variant.
    pub fn plan(
        orbit: &Orbit,
        focus: &Vector3<f64>,
        point: &Vector3<f64>,
        delta_v_frenet: Vector3<f64>,
    ) -> Option<(Maneuver, Projection)> {
        let projection = orbit.project(point, focus);
        let stats = orbit.stats(projection.time_delta);
        let mut sv = StateVector::new(stats.position, stats.velocity);
        let delta_v = frenet(&sv) * delta_v_frenet;
        sv.velocity += delta_v;
        let target = Orbit::from_cartesian(orbit.mu(), &sv)?;

        let mut maneuver = Maneuver::new(target, delta_v);
        maneuver.delta_v_frenet = delta_v_frenet;
        maneuver.time_delta = projection.time_delta;
        Some((maneuver, projection))
    }

    /// Pitch and yaw to point at for the burn.
    pub fn attitude(&self) -> (f64, f64) {
        pitch_yaw(self.delta_v_frenet)
    }
}

/// Returns the Frenet frame to ecliptic conversion matrix for the given
/// state vector.
pub fn frenet(sv: &StateVector) -> Matrix3<f64> {
    let t = sv.velocity.normalize();
    let n = sv.position.cross(&sv.velocity).normalize();
    let b = t.cross(&n);
    Matrix3::from_columns(&[t, n, b])
}

/// Pitch and yaw of a maneuver in the Frenet frame.
pub fn pitch_yaw(deltav: Vector3<f64>) -> (f64, f64) {
    let theta = libm::acos(deltav[2] / deltav.norm());
    let psi = deltav[1].signum()
        * libm::acos(deltav[0] / libm::sqrt(deltav[0].powi(2) + deltav[1].powi(2)));
    let pitch = consts::FRAC_PI_2 - theta;
    (pitch, psi)
}

#[cfg(test)]
use crate::kepler::orbits::{KeplerElements, Regime};

#[cfg(test)]
fn circular(radius: f64) -> Orbit {
    Orbit::from_kepler_elements(
        1.0,
        &KeplerElements {
            p: radius,
            e: 0.0,
            i: 0.0,
            lan: 0.0,
            argpe: 0.0,
            ma: 0.0,
        },
    )
    .unwrap()
}

#[test]
fn prograde_burn_raises_apoapsis() {
    let orbit = circular(1.0);
    let (m, proj) = Maneuver::plan(
        &orbit,
        &Vector3::zeros(),
        &Vector3::new(0.0, 1.0, 0.0),
        Vector3::new(0.1, 0.0, 0.0),
    )
    .unwrap();
    assert!((proj.time_delta.as_seconds_f64() - consts::FRAC_PI_2).abs() < 1e-6);
    // At (0, 1, 0) prograde is -x.
    assert!((m.delta_v - Vector3::new(-0.1, 0.0, 0.0)).norm() < 1e-9);
    assert_eq!(m.target.regime(), Regime::Elliptical);
    assert!((m.target.periapsis_radius() - 1.0).abs() < 1e-9);
    assert!(m.target.apoapsis_radius() > 1.5);
    // Apoapsis opposite the burn point.
    let apo = m.target.stats(time::Duration::ZERO).apoapsis.unwrap();
    assert!((apo.normalize() - Vector3::new(0.0, -1.0, 0.0)).norm() < 1e-6);
}

#[test]
fn escape_burn_plans_hyperbola() {
    let orbit = circular(1.0);
    let (m, _) = Maneuver::plan(
        &orbit,
        &Vector3::zeros(),
        &Vector3::new(1.0, 0.0, 0.0),
        Vector3::new(1.0, 0.0, 0.0),
    )
    .unwrap();
    assert_eq!(m.target.regime(), Regime::Hyperbolic);
}

#[test]
fn maneuver_ids_are_unique() {
    let a = Maneuver::new(circular(1.0), Vector3::zeros());
    let b = Maneuver::new(circular(1.0), Vector3::zeros());
    assert_ne!(a.id, b.id);
    assert!(a.id.0 >= 1 && b.id > a.id);
}

#[test]
fn pitch_yaw_of_frenet_axes() {
    let (pitch, yaw) = pitch_yaw(Vector3::new(1.0, 0.0, 0.0));
    assert!(pitch.abs() < 1e-12 && yaw.abs() < 1e-12);
    let (pitch, _) = pitch_yaw(Vector3::new(0.0, 0.0, 1.0));
    assert!((pitch - consts::FRAC_PI_2).abs() < 1e-12);
    let (_, yaw) = pitch_yaw(Vector3::new(0.0, 1.0, 0.0));
    assert!((yaw - consts::FRAC_PI_2).abs() < 1e-12);
}
