//! Trajectories at exactly escape energy, `e ≈ 1`.
//!
//! The mean anomaly here is `M = (D + D³/3) / 2` with `D = tan(ν/2)`, which
//! grows at `n = sqrt(mu / p³)`. States with no angular momentum also
//! measure `e = 1`; they move along a line and are carried by a
//! [`RadialTrajectory`] instead.

use std::f64::consts;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use time::Duration;

use super::{
    orbits::{
        seconds, sv_pqw, to_ecliptic, KeplerElements, OrbitStats, Projection, Shape, StateVector,
        PARABOLIC_TOLERANCE,
    },
    radial::{RadialKind, RadialTrajectory},
    transform_to_perifocal,
};

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParabolicOrbit {
    pub mu: f64,
    /// Semi-latus rectum.
    pub p: f64,
    /// Eccentricity as measured; the geometry always uses `e = 1`.
    pub e: f64,
    pub i: f64,
    pub lan: f64,
    pub argpe: f64,
    pub ma: f64,
    /// Set while `p` is negligible; the elements above then only describe
    /// the line of motion.
    pub radial: Option<RadialTrajectory>,
}

impl ParabolicOrbit {
    pub fn new(mu: f64) -> Self {
        Self {
            mu,
            p: 0.0,
            e: 1.0,
            i: 0.0,
            lan: 0.0,
            argpe: 0.0,
            ma: 0.0,
            radial: None,
        }
    }

    pub fn supports(e: f64) -> bool {
        (e - 1.0).abs() <= PARABOLIC_TOLERANCE
    }

    pub fn set_from_kepler_elements(&mut self, el: &KeplerElements) -> &mut Self {
        self.p = el.p;
        self.e = el.e;
        self.i = el.i;
        self.lan = el.lan;
        self.argpe = el.argpe;
        self.ma = el.ma;
        self.radial = None;
        self
    }

    pub fn set_from_cartesian(&mut self, sv: &StateVector) -> &mut Self {
        let shape = Shape::new(sv, self.mu);
        if let Some(radial) = RadialTrajectory::from_state(sv, self.mu) {
            let (i, lan, argpe) = radial.orientation();
            self.p = 0.0;
            self.e = shape.e;
            self.i = i;
            self.lan = lan;
            self.argpe = argpe;
            self.ma = radial.ma;
            self.radial = Some(radial);
            return self;
        }
        // r·v = sqrt(mu p) tan(ν/2) on a parabola.
        let d = shape.rv.dot(&shape.vv) / libm::sqrt(self.mu * shape.p);
        let (lan, argpe) = shape.orientation(2.0 * libm::atan(d));

        self.p = shape.p;
        self.e = shape.e;
        self.i = shape.i;
        self.lan = lan;
        self.argpe = argpe;
        self.ma = d_to_ma(d);
        self.radial = None;
        self
    }

    pub fn mean_motion(&self) -> f64 {
        match &self.radial {
            Some(radial) => radial.mean_motion(),
            None => libm::sqrt(self.mu / self.p.powi(3)),
        }
    }

    pub fn advance(&mut self, dt: Duration) {
        if let Some(radial) = &mut self.radial {
            radial.advance(dt);
            self.ma = radial.ma;
        } else {
            self.ma += self.mean_motion() * dt.as_seconds_f64();
        }
    }

    /// Infinite unless the trajectory is a bound line.
    pub fn apoapsis_radius(&self) -> f64 {
        match &self.radial {
            Some(radial) if radial.kind == RadialKind::Bound => 2.0 * radial.scale,
            _ => f64::INFINITY,
        }
    }

    pub fn elements(&self) -> KeplerElements {
        KeplerElements {
            p: self.p,
            e: self.e,
            i: self.i,
            lan: self.lan,
            argpe: self.argpe,
            ma: self.ma,
        }
    }

    pub fn stats(&self, dt: Duration, focus: &Vector3<f64>) -> OrbitStats {
        if let Some(radial) = &self.radial {
            return radial.stats(dt, focus);
        }
        let el = self.elements();
        let ma = self.ma + self.mean_motion() * dt.as_seconds_f64();
        let ta = 2.0 * libm::atan(solve_barker(ma));
        let (rv, vv) = sv_pqw(self.p, 1.0, ta, self.mu);

        OrbitStats {
            position: to_ecliptic(focus, rv, &el),
            velocity: to_ecliptic(&Vector3::zeros(), vv, &el),
            semi_major_axis: f64::INFINITY,
            semi_minor_axis: f64::INFINITY,
            orbital_period: f64::INFINITY,
            center: None,
            periapsis: to_ecliptic(focus, Vector3::new(self.p / 2.0, 0.0, 0.0), &el),
            apoapsis: None,
        }
    }

    pub fn project(&self, point: &Vector3<f64>, focus: &Vector3<f64>) -> Projection {
        if let Some(radial) = &self.radial {
            return radial.project(point, focus);
        }
        let local = transform_to_perifocal(focus, point, self.argpe, self.lan, self.i);
        let limit = consts::PI * (1.0 - 1e-9);
        let ta = libm::atan2(local.y, local.x).clamp(-limit, limit);
        let ma = d_to_ma(libm::tan(ta / 2.0));
        Projection {
            ma,
            time_delta: seconds((ma - self.ma) / self.mean_motion()),
        }
    }
}

fn d_to_ma(d: f64) -> f64 {
    (d + d.powi(3) / 3.0) / 2.0
}

/// Closed-form root of Barker's equation `D + D³/3 = 2M`.
pub fn solve_barker(ma: f64) -> f64 {
    let m = ma.abs();
    let s = libm::cbrt(3.0 * m + libm::sqrt(9.0 * m * m + 1.0));
    (s - 1.0 / s).copysign(ma)
}

#[cfg(test)]
use super::wrap_pi;

#[test]
fn barker_root() {
    for ma in [-50.0, -1.0, -1e-8, 0.0, 0.3, 2.0, 1e4] {
        let d = solve_barker(ma);
        assert!((d_to_ma(d) - ma).abs() < 1e-10 * ma.abs().max(1.0), "M = {ma}");
    }
}

#[test]
fn cartesian_round_trip() {
    let mut src = ParabolicOrbit::new(2.0);
    src.set_from_kepler_elements(&KeplerElements {
        p: 3.0,
        e: 1.0,
        i: 0.4,
        lan: 0.9,
        argpe: 2.0,
        ma: -0.8,
    });
    let stats = src.stats(Duration::ZERO, &Vector3::zeros());
    let mut dst = ParabolicOrbit::new(2.0);
    dst.set_from_cartesian(&StateVector::new(stats.position, stats.velocity));
    assert!(ParabolicOrbit::supports(dst.e));
    assert!((dst.p - 3.0).abs() < 1e-9);
    assert!((dst.i - 0.4).abs() < 1e-9);
    assert!(wrap_pi(dst.lan - 0.9).abs() < 1e-9);
    assert!(wrap_pi(dst.argpe - 2.0).abs() < 1e-9);
    assert!((dst.ma + 0.8).abs() < 1e-9);
}

#[test]
fn periapsis_at_half_semi_latus_rectum() {
    let mut o = ParabolicOrbit::new(1.0);
    o.p = 4.0;
    let stats = o.stats(Duration::ZERO, &Vector3::zeros());
    assert!((stats.position - Vector3::new(2.0, 0.0, 0.0)).norm() < 1e-12);
    assert_eq!(stats.periapsis, stats.position);
    // Escape speed at periapsis.
    assert!((stats.velocity.norm() - libm::sqrt(2.0 / 2.0)).abs() < 1e-12);
    assert!(stats.center.is_none());
}

#[test]
fn radial_state_moves_along_its_line() {
    let sv = StateVector::new(Vector3::new(5.0, 0.0, 0.0), Vector3::new(0.1, 0.0, 0.0));
    let mut o = ParabolicOrbit::new(1.0);
    o.set_from_cartesian(&sv);
    assert!(o.radial.is_some());
    assert_eq!(o.elements().p, 0.0);
    assert!(o.mean_motion().is_finite());

    let start = o.stats(Duration::ZERO, &Vector3::zeros());
    assert!((start.position - sv.position).norm() < 1e-12);
    assert!((start.velocity - sv.velocity).norm() < 1e-12);

    o.advance(Duration::seconds(1));
    let stats = o.stats(Duration::ZERO, &Vector3::zeros());
    assert!(stats.position.x > 5.0);
    assert_eq!((stats.position.y, stats.position.z), (0.0, 0.0));
    assert!(stats.velocity.x < 0.1);
    assert!(o.apoapsis_radius().is_finite());

    // A regular parabola clears the line again.
    o.set_from_kepler_elements(&KeplerElements {
        p: 2.0,
        e: 1.0,
        i: 0.0,
        lan: 0.0,
        argpe: 0.0,
        ma: 0.0,
    });
    assert_eq!(o.radial, None);
    assert_eq!(o.apoapsis_radius(), f64::INFINITY);
}
