//! Rectilinear trajectories: states with no angular momentum, which fall
//! straight toward or away from the primary.
//!
//! These are the `p = 0` limit of every conic, so they all measure `e = 1`,
//! but the motion along the line is set by the orbital energy instead:
//!
//! - bound: `r = a (1 - cos E)`, `M = E - sin E`
//! - unbound: `r = a (cosh H - 1)`, `M = sinh H - H`
//! - escape speed: `r = q (3 |M| / √2)^(2/3)`
//!
//! with `n = sqrt(mu / a³)` (or `sqrt(mu / q³)`) in each case. A bound
//! trajectory that reaches the primary comes back out along the same line.

use std::f64::consts;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use time::Duration;

use super::{
    orbits::{seconds, OrbitStats, Projection, StateVector, DEGENERATE_TOLERANCE, PARABOLIC_TOLERANCE},
    solve_hyperbolic_kepler_equation, solve_kepler_equation, wrap_tau,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RadialKind {
    Bound,
    Escape,
    Unbound,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RadialTrajectory {
    pub mu: f64,
    /// Unit vector from the primary along the line of motion.
    pub axis: Vector3<f64>,
    pub kind: RadialKind,
    /// `|a|` for bound and unbound motion; for escape speed, the distance
    /// the trajectory was set up at.
    pub scale: f64,
    /// In `[0, 2π)` for bound motion, with the primary at `0`. Otherwise
    /// unbounded and negative while falling in.
    pub ma: f64,
}

impl RadialTrajectory {
    /// The rectilinear trajectory through `sv`, or `None` if the state's
    /// semi-latus rectum is not negligible next to its distance.
    pub fn from_state(sv: &StateVector, mu: f64) -> Option<Self> {
        let r = sv.position.norm();
        let h2 = sv.position.cross(&sv.velocity).norm_squared();
        if r <= 0.0 || h2 > DEGENERATE_TOLERANCE * mu * r {
            return None;
        }
        let axis = sv.position / r;
        let rdot = sv.velocity.dot(&axis);
        let energy = sv.velocity.norm_squared() / 2.0 - mu / r;

        let (kind, scale, ma) = if energy.abs() * r <= PARABOLIC_TOLERANCE * mu {
            let ma = (consts::SQRT_2 / 3.0).copysign(rdot);
            (RadialKind::Escape, r, ma)
        } else if energy < 0.0 {
            let a = -mu / (2.0 * energy);
            let ea = libm::acos((1.0 - r / a).clamp(-1.0, 1.0));
            let ea = if rdot < 0.0 { consts::TAU - ea } else { ea };
            (RadialKind::Bound, a, wrap_tau(ea - libm::sin(ea)))
        } else {
            let a = mu / (2.0 * energy);
            let ha = libm::acosh(1.0 + r / a).copysign(rdot);
            (RadialKind::Unbound, a, libm::sinh(ha) - ha)
        };

        Some(Self {
            mu,
            axis,
            kind,
            scale,
            ma,
        })
    }

    pub fn mean_motion(&self) -> f64 {
        libm::sqrt(self.mu / self.scale.powi(3))
    }

    pub fn advance(&mut self, dt: Duration) {
        self.ma += self.mean_motion() * dt.as_seconds_f64();
        if self.kind == RadialKind::Bound {
            self.ma = wrap_tau(self.ma);
        }
    }

    /// Distance from the primary and its rate of change at `ma`.
    fn distance(&self, ma: f64) -> (f64, f64) {
        let a = self.scale;
        match self.kind {
            RadialKind::Bound => {
                let ea = solve_kepler_equation(1.0, ma).value;
                let r = a * (1.0 - libm::cos(ea));
                (r, libm::sqrt(self.mu * a) * libm::sin(ea) / r)
            }
            RadialKind::Unbound => {
                let ha = solve_hyperbolic_kepler_equation(1.0, ma).value;
                let r = a * (libm::cosh(ha) - 1.0);
                (r, libm::sqrt(self.mu * a) * libm::sinh(ha) / r)
            }
            RadialKind::Escape => {
                let r = a * libm::cbrt(3.0 * ma.abs() / consts::SQRT_2).powi(2);
                (r, libm::sqrt(2.0 * self.mu / r).copysign(ma))
            }
        }
    }

    /// Mean anomaly of the outbound pass through distance `r`.
    fn outbound(&self, r: f64) -> f64 {
        let a = self.scale;
        match self.kind {
            RadialKind::Bound => {
                let ea = libm::acos((1.0 - r / a).clamp(-1.0, 1.0));
                ea - libm::sin(ea)
            }
            RadialKind::Unbound => {
                let ha = libm::acosh(1.0 + r / a);
                libm::sinh(ha) - ha
            }
            RadialKind::Escape => consts::SQRT_2 / 3.0 * (r / a).powf(1.5),
        }
    }

    pub fn stats(&self, dt: Duration, focus: &Vector3<f64>) -> OrbitStats {
        let (r, rdot) = self.distance(self.ma + self.mean_motion() * dt.as_seconds_f64());
        let a = self.scale;
        let (semi_major_axis, orbital_period, center, apoapsis) = match self.kind {
            RadialKind::Bound => (
                a,
                consts::TAU / self.mean_motion(),
                Some(focus + self.axis * a),
                Some(focus + self.axis * (2.0 * a)),
            ),
            RadialKind::Unbound => (-a, f64::INFINITY, Some(focus - self.axis * a), None),
            RadialKind::Escape => (f64::INFINITY, f64::INFINITY, None, None),
        };
        OrbitStats {
            position: focus + self.axis * r,
            velocity: self.axis * rdot,
            semi_major_axis,
            semi_minor_axis: 0.0,
            orbital_period,
            center,
            periapsis: *focus,
            apoapsis,
        }
    }

    /// The next time the trajectory reaches the distance of `point` along
    /// its line. Open trajectories that are past it report a negative
    /// delta.
    pub fn project(&self, point: &Vector3<f64>, focus: &Vector3<f64>) -> Projection {
        let r = (point - focus).dot(&self.axis).max(0.0);
        let out = self.outbound(r);
        let ma = match self.kind {
            RadialKind::Bound => {
                let back = consts::TAU - out;
                if wrap_tau(out - self.ma) <= wrap_tau(back - self.ma) {
                    out
                } else {
                    back
                }
            }
            RadialKind::Unbound | RadialKind::Escape => {
                if self.ma <= -out {
                    -out
                } else {
                    out
                }
            }
        };
        let ahead = match self.kind {
            RadialKind::Bound => wrap_tau(ma - self.ma),
            RadialKind::Unbound | RadialKind::Escape => ma - self.ma,
        };
        Projection {
            ma,
            time_delta: seconds(ahead / self.mean_motion()),
        }
    }

    /// Inclination, longitude of the ascending node and argument of
    /// periapsis of the plane through the line that is closest to the
    /// ecliptic. Periapsis points back along the line, at the primary.
    pub fn orientation(&self) -> (f64, f64, f64) {
        let d = -self.axis;
        let tilt = Vector3::z() - d * d.z;
        let hv = if tilt.norm() > DEGENERATE_TOLERANCE {
            tilt.normalize()
        } else {
            Vector3::x()
        };
        let i = libm::acos(hv.z.clamp(-1.0, 1.0));
        let nv = Vector3::z().cross(&hv);
        if nv.norm() <= DEGENERATE_TOLERANCE {
            return (0.0, 0.0, wrap_tau(libm::atan2(d.y, d.x)));
        }
        let nv = nv.normalize();
        let lan = wrap_tau(libm::atan2(nv.y, nv.x));
        let argpe = wrap_tau(libm::atan2(d.dot(&hv.cross(&nv)), d.dot(&nv)));
        (i, lan, argpe)
    }
}

#[cfg(test)]
fn energy(sv: &StateVector, mu: f64) -> f64 {
    sv.velocity.norm_squared() / 2.0 - mu / sv.position.norm()
}

#[cfg(test)]
fn state_after(sv: &StateVector, mu: f64, secs: f64) -> (RadialTrajectory, StateVector) {
    let mut radial = RadialTrajectory::from_state(sv, mu).unwrap();
    radial.advance(Duration::seconds_f64(secs));
    let stats = radial.stats(Duration::ZERO, &Vector3::zeros());
    (radial, StateVector::new(stats.position, stats.velocity))
}

#[test]
fn released_at_rest_falls_in() {
    let sv = StateVector::new(Vector3::new(0.0, 4.0, 0.0), Vector3::zeros());
    let (radial, after) = state_after(&sv, 1.0, 0.5);
    assert_eq!(radial.kind, RadialKind::Bound);
    assert!((radial.scale - 2.0).abs() < 1e-12);

    let r = after.position.norm();
    assert!(r < 4.0);
    assert!(after.position.x.abs() < 1e-12 && after.position.y > 0.0);
    assert!(after.velocity.y < 0.0);
    assert!((energy(&after, 1.0) - energy(&sv, 1.0)).abs() < 1e-12);
    // Free fall from rest covers v²/2 = mu (1/r - 1/r0).
    assert!((after.velocity.norm_squared() / 2.0 - (1.0 / r - 0.25)).abs() < 1e-12);
}

#[test]
fn classified_by_energy() {
    let r = Vector3::new(2.0, 0.0, 0.0);
    for (speed, kind) in [
        (0.5, RadialKind::Bound),
        (1.0, RadialKind::Escape),
        (3.0, RadialKind::Unbound),
        (-3.0, RadialKind::Unbound),
    ] {
        let sv = StateVector::new(r, Vector3::new(speed, 0.0, 0.0));
        let (radial, after) = state_after(&sv, 1.0, 0.25);
        assert_eq!(radial.kind, kind, "v = {speed}");
        assert!(after.position.iter().all(|x| x.is_finite()));
        assert!((after.position.x - 2.0).signum() == speed.signum(), "v = {speed}");
        let drift = (energy(&after, 1.0) - energy(&sv, 1.0)).abs();
        assert!(drift < 1e-9, "v = {speed}: {drift}");
    }
}

#[test]
fn rebuilds_from_its_own_state() {
    let sv = StateVector::new(Vector3::new(1.0, -1.0, 2.0), Vector3::new(0.1, -0.1, 0.2));
    let (radial, after) = state_after(&sv, 3.0, 0.7);
    let again = RadialTrajectory::from_state(&after, 3.0).unwrap();
    assert_eq!(again.kind, radial.kind);
    assert!((again.scale - radial.scale).abs() < 1e-9);
    assert!((again.ma - radial.ma).abs() < 1e-9);
    assert!((again.axis - radial.axis).norm() < 1e-12);
}

#[test]
fn tangential_motion_is_not_radial() {
    let sv = StateVector::new(Vector3::new(1.0, 0.0, 0.0), Vector3::new(0.0, 1.0, 0.0));
    assert_eq!(RadialTrajectory::from_state(&sv, 1.0), None);
}

#[test]
fn orientation_points_periapsis_at_the_primary() {
    for axis in [
        Vector3::new(1.0, 0.0, 0.0),
        Vector3::new(-0.3, 0.4, 0.0),
        Vector3::new(0.2, -0.5, 0.7),
        Vector3::new(0.0, 0.0, -1.0),
    ] {
        let radial = RadialTrajectory {
            mu: 1.0,
            axis: axis.normalize(),
            kind: RadialKind::Bound,
            scale: 1.0,
            ma: 1.0,
        };
        let (i, lan, argpe) = radial.orientation();
        let periapsis = super::transform_to_ecliptic(&Vector3::zeros(), &Vector3::x(), argpe, lan, i);
        assert!((periapsis + radial.axis).norm() < 1e-12, "{axis:?}");
    }
}

#[test]
fn project_finds_next_pass() {
    let sv = StateVector::new(Vector3::new(3.0, 0.0, 0.0), Vector3::new(0.2, 0.0, 0.0));
    let radial = RadialTrajectory::from_state(&sv, 1.0).unwrap();
    let farther = radial.project(&Vector3::new(3.1, 0.0, 0.0), &Vector3::zeros());
    let nearer = radial.project(&Vector3::new(2.0, 0.0, 0.0), &Vector3::zeros());
    assert!(farther.time_delta.is_positive());
    // Outward now, so the nearer point comes on the way back down.
    assert!(nearer.time_delta > farther.time_delta);

    let stats = radial.stats(nearer.time_delta, &Vector3::zeros());
    assert!((stats.position.x - 2.0).abs() < 1e-6);
    assert!(stats.velocity.x < 0.0);
}
