//! Closed orbits, `0 <= e < 1`.

use std::f64::consts;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use time::Duration;

use super::{
    orbits::{
        seconds, sv_pqw, to_ecliptic, KeplerElements, OrbitStats, Projection, Shape, StateVector,
        PARABOLIC_TOLERANCE,
    },
    solve_kepler_equation, transform_to_perifocal, wrap_tau,
};

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EllipticalOrbit {
    /// Gravitational parameter of the primary.
    pub mu: f64,
    /// Semi-major axis.
    pub a: f64,
    pub e: f64,
    pub i: f64,
    pub lan: f64,
    /// Zero for circular orbits, where the mean anomaly is measured from
    /// the ascending node instead.
    pub argpe: f64,
    /// Mean anomaly, kept in `[0, 2π)`.
    pub ma: f64,
}

impl EllipticalOrbit {
    pub fn new(mu: f64) -> Self {
        Self {
            mu,
            a: 0.0,
            e: 0.0,
            i: 0.0,
            lan: 0.0,
            argpe: 0.0,
            ma: 0.0,
        }
    }

    pub fn supports(e: f64) -> bool {
        (0.0..1.0 - PARABOLIC_TOLERANCE).contains(&e)
    }

    pub fn set_from_kepler_elements(&mut self, el: &KeplerElements) -> &mut Self {
        self.a = el.p / (1.0 - el.e.powi(2));
        self.e = el.e;
        self.i = el.i;
        self.lan = el.lan;
        self.argpe = el.argpe;
        self.ma = wrap_tau(el.ma);
        self
    }

    pub fn set_from_cartesian(&mut self, sv: &StateVector) -> &mut Self {
        let shape = Shape::new(sv, self.mu);
        let r = shape.rv.norm();
        let v2 = shape.vv.norm_squared();
        let a = 1.0 / (2.0 / r - v2 / self.mu);
        let e = shape.e;

        let (lan, argpe, ma) = if shape.is_circular() {
            let (lan, ta) = if shape.is_equatorial() {
                (0.0, shape.true_longitude())
            } else {
                (
                    wrap_tau(libm::atan2(shape.nv.y, shape.nv.x)),
                    shape.argument_of_latitude(),
                )
            };
            (lan, 0.0, ta_to_ma(ta, e))
        } else {
            let e_se = shape.rv.dot(&shape.vv) / libm::sqrt(self.mu * a);
            let e_ce = r * v2 / self.mu - 1.0;
            let ea = libm::atan2(e_se, e_ce);
            let (lan, argpe) = shape.orientation(ea_to_ta(ea, e));
            (lan, argpe, ea - e * libm::sin(ea))
        };

        self.a = a;
        self.e = e;
        self.i = shape.i;
        self.lan = lan;
        self.argpe = argpe;
        self.ma = wrap_tau(ma);
        self
    }

    pub fn mean_motion(&self) -> f64 {
        libm::sqrt(self.mu / self.a.powi(3))
    }

    pub fn period(&self) -> f64 {
        consts::TAU / self.mean_motion()
    }

    pub fn advance(&mut self, dt: Duration) {
        self.ma = wrap_tau(self.ma + self.mean_motion() * dt.as_seconds_f64());
    }

    pub fn elements(&self) -> KeplerElements {
        KeplerElements {
            p: self.a * (1.0 - self.e.powi(2)),
            e: self.e,
            i: self.i,
            lan: self.lan,
            argpe: self.argpe,
            ma: self.ma,
        }
    }

    pub fn stats(&self, dt: Duration, focus: &Vector3<f64>) -> OrbitStats {
        let el = self.elements();
        let ma = self.ma + self.mean_motion() * dt.as_seconds_f64();
        let ea = solve_kepler_equation(self.e, ma).value;
        let ta = ea_to_ta(ea, self.e);
        let (rv, vv) = sv_pqw(el.p, self.e, ta, self.mu);

        OrbitStats {
            position: to_ecliptic(focus, rv, &el),
            velocity: to_ecliptic(&Vector3::zeros(), vv, &el),
            semi_major_axis: self.a,
            semi_minor_axis: self.a * libm::sqrt(1.0 - self.e.powi(2)),
            orbital_period: self.period(),
            center: Some(to_ecliptic(
                focus,
                Vector3::new(-self.a * self.e, 0.0, 0.0),
                &el,
            )),
            periapsis: to_ecliptic(focus, Vector3::new(self.a * (1.0 - self.e), 0.0, 0.0), &el),
            apoapsis: Some(to_ecliptic(
                focus,
                Vector3::new(-self.a * (1.0 + self.e), 0.0, 0.0),
                &el,
            )),
        }
    }

    /// The next time the orbit passes the direction of `point` as seen from
    /// `focus`.
    pub fn project(&self, point: &Vector3<f64>, focus: &Vector3<f64>) -> Projection {
        let local = transform_to_perifocal(focus, point, self.argpe, self.lan, self.i);
        let ta = libm::atan2(local.y, local.x);
        let ma = wrap_tau(ta_to_ma(ta, self.e));
        let ahead = wrap_tau(ma - self.ma);
        Projection {
            ma,
            time_delta: seconds(ahead / self.mean_motion()),
        }
    }
}

pub fn ea_to_ta(ea: f64, e: f64) -> f64 {
    let beta = e / (1.0 + libm::sqrt(1.0 - e.powi(2)));
    ea + 2.0 * libm::atan2(beta * libm::sin(ea), 1.0 - beta * libm::cos(ea))
}

pub fn ta_to_ma(ta: f64, e: f64) -> f64 {
    let ea = libm::atan2(libm::sqrt(1.0 - e.powi(2)) * libm::sin(ta), e + libm::cos(ta));
    ea - e * libm::sin(ea)
}

#[cfg(test)]
use {
    super::{orbits::Orbit, wrap_pi},
    rand::{rngs::StdRng, Rng, SeedableRng},
};

#[cfg(test)]
fn orbit(a: f64, e: f64, i: f64, argpe: f64, lan: f64, ma: f64) -> EllipticalOrbit {
    *EllipticalOrbit::new(1.0).set_from_kepler_elements(&KeplerElements {
        p: a * (1.0 - e * e),
        e,
        i,
        lan,
        argpe,
        ma,
    })
}

#[test]
fn cartesian_round_trip() {
    let mut rng = StdRng::seed_from_u64(0x656c_6c69);
    for _ in 0..500 {
        let a = rng.gen_range(0.5..5.0);
        let e = rng.gen_range(0.05..0.9);
        let i = rng.gen_range(0.1..3.0);
        let argpe = rng.gen_range(0.0..consts::TAU);
        let lan = rng.gen_range(0.0..consts::TAU);
        let ma = rng.gen_range(0.0..consts::TAU);
        let src = orbit(a, e, i, argpe, lan, ma);
        let stats = src.stats(Duration::ZERO, &Vector3::zeros());
        let mut dst = EllipticalOrbit::new(1.0);
        dst.set_from_cartesian(&StateVector::new(stats.position, stats.velocity));

        assert!(((dst.a - a) / a).abs() < 1e-6, "a {a} -> {}", dst.a);
        assert!(((dst.e - e) / e).abs() < 1e-6, "e {e} -> {}", dst.e);
        assert!((dst.i - i).abs() < 1e-6, "i {i} -> {}", dst.i);
        for (name, x, y) in [("lan", lan, dst.lan), ("argpe", argpe, dst.argpe), ("ma", ma, dst.ma)] {
            assert!(wrap_pi(x - y).abs() < 1e-6, "{name} {x} -> {y}");
        }
    }
}

#[test]
fn circular_orbit_uses_argument_of_latitude() {
    let src = orbit(2.0, 0.0, 0.5, 0.0, 1.0, 0.7);
    let state = src.stats(Duration::ZERO, &Vector3::zeros());
    let mut dst = EllipticalOrbit::new(1.0);
    dst.set_from_cartesian(&StateVector::new(state.position, state.velocity));
    assert_eq!(dst.argpe, 0.0);
    assert!((dst.lan - 1.0).abs() < 1e-9);
    assert!((dst.ma - 0.7).abs() < 1e-9);
    assert!(dst.e < 1e-9);
}

#[test]
fn circular_equatorial_uses_true_longitude() {
    let src = orbit(1.0, 0.0, 0.0, 0.0, 0.0, 2.0);
    let state = src.stats(Duration::ZERO, &Vector3::zeros());
    let mut dst = EllipticalOrbit::new(1.0);
    dst.set_from_cartesian(&StateVector::new(state.position, state.velocity));
    assert_eq!((dst.lan, dst.argpe), (0.0, 0.0));
    assert!((dst.ma - 2.0).abs() < 1e-9);
}

#[test]
fn equatorial_orbit_keeps_periapsis_longitude() {
    let src = orbit(1.5, 0.3, 0.0, 0.0, 0.0, 1.0);
    let mut rotated = src;
    rotated.argpe = 0.4;
    rotated.lan = 0.6;
    let state = rotated.stats(Duration::ZERO, &Vector3::zeros());
    let mut dst = EllipticalOrbit::new(1.0);
    dst.set_from_cartesian(&StateVector::new(state.position, state.velocity));
    assert_eq!(dst.lan, 0.0);
    assert!((dst.argpe - 1.0).abs() < 1e-9);
    assert!((dst.ma - 1.0).abs() < 1e-9);
}

#[test]
fn advance_zero_is_a_no_op() {
    let mut o = Orbit::Elliptical(orbit(1.3, 0.2, 0.3, 0.1, 0.2, 5.9));
    let before = (o, o.stats(Duration::ZERO));
    o.advance(Duration::ZERO);
    assert_eq!(before, (o, o.stats(Duration::ZERO)));
}

#[test]
fn one_period_returns_to_start() {
    let mut o = orbit(1.0, 0.4, 0.2, 0.3, 0.4, 1.234);
    let period = Duration::seconds_f64(o.period());
    o.advance(period);
    assert!(wrap_pi(o.ma - 1.234).abs() < 1e-6);
    o.advance(period * 10);
    assert!(wrap_pi(o.ma - 1.234).abs() < 1e-6);
}

#[test]
fn stats_apses_and_center() {
    let o = orbit(2.0, 0.5, 0.0, 0.0, 0.0, 0.0);
    let stats = o.stats(Duration::ZERO, &Vector3::new(10.0, 0.0, 0.0));
    assert!((stats.periapsis - Vector3::new(11.0, 0.0, 0.0)).norm() < 1e-12);
    assert!((stats.position - stats.periapsis).norm() < 1e-12);
    assert!((stats.apoapsis.unwrap() - Vector3::new(7.0, 0.0, 0.0)).norm() < 1e-12);
    assert!((stats.center.unwrap() - Vector3::new(9.0, 0.0, 0.0)).norm() < 1e-12);
    assert!((stats.semi_minor_axis - libm::sqrt(3.0)).abs() < 1e-12);
    assert!((stats.orbital_period - consts::TAU * libm::sqrt(8.0)).abs() < 1e-9);
}

#[test]
fn project_finds_time_to_point() {
    let o = orbit(1.0, 0.0, 0.0, 0.0, 0.0, 0.0);
    // A quarter turn ahead on a circular orbit with mu = 1 takes π/2 seconds.
    let proj = o.project(&Vector3::new(0.0, 3.0, 0.0), &Vector3::zeros());
    assert!((proj.ma - consts::FRAC_PI_2).abs() < 1e-12);
    assert!((proj.time_delta.as_seconds_f64() - consts::FRAC_PI_2).abs() < 1e-6);
    // Points behind are reached on the next revolution.
    let behind = o.project(&Vector3::new(0.0, -1.0, 0.0), &Vector3::zeros());
    assert!((behind.time_delta.as_seconds_f64() - 1.5 * consts::PI).abs() < 1e-6);
}
