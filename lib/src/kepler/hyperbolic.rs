//! Escape trajectories, `e > 1`.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use time::Duration;

use super::{
    orbits::{
        seconds, sv_pqw, to_ecliptic, KeplerElements, OrbitStats, Projection, Shape, StateVector,
        PARABOLIC_TOLERANCE,
    },
    solve_hyperbolic_kepler_equation, transform_to_perifocal,
};

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HyperbolicOrbit {
    pub mu: f64,
    /// Semi-major axis, negative.
    pub a: f64,
    pub e: f64,
    pub i: f64,
    pub lan: f64,
    pub argpe: f64,
    /// Mean anomaly; unbounded, negative before periapsis.
    pub ma: f64,
}

impl HyperbolicOrbit {
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
        e > 1.0 + PARABOLIC_TOLERANCE
    }

    pub fn set_from_kepler_elements(&mut self, el: &KeplerElements) -> &mut Self {
        self.a = el.p / (1.0 - el.e.powi(2));
        self.e = el.e;
        self.i = el.i;
        self.lan = el.lan;
        self.argpe = el.argpe;
        self.ma = el.ma;
        self
    }

    pub fn set_from_cartesian(&mut self, sv: &StateVector) -> &mut Self {
        let shape = Shape::new(sv, self.mu);
        let r = shape.rv.norm();
        let v2 = shape.vv.norm_squared();
        let a = 1.0 / (2.0 / r - v2 / self.mu);
        let e = shape.e;

        let e_sh = shape.rv.dot(&shape.vv) / libm::sqrt(-self.mu * a);
        let e_ch = r * v2 / self.mu - 1.0;
        let ha = libm::atanh(e_sh / e_ch);
        let (lan, argpe) = shape.orientation(ha_to_ta(ha, e));

        self.a = a;
        self.e = e;
        self.i = shape.i;
        self.lan = lan;
        self.argpe = argpe;
        self.ma = e * libm::sinh(ha) - ha;
        self
    }

    pub fn mean_motion(&self) -> f64 {
        libm::sqrt(self.mu / (-self.a).powi(3))
    }

    pub fn advance(&mut self, dt: Duration) {
        self.ma += self.mean_motion() * dt.as_seconds_f64();
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

    /// True anomaly of the outgoing asymptote.
    pub fn asymptote(&self) -> f64 {
        libm::acos(-1.0 / self.e)
    }

    pub fn stats(&self, dt: Duration, focus: &Vector3<f64>) -> OrbitStats {
        let el = self.elements();
        let ma = self.ma + self.mean_motion() * dt.as_seconds_f64();
        let ha = solve_hyperbolic_kepler_equation(self.e, ma).value;
        let ta = ha_to_ta(ha, self.e);
        let (rv, vv) = sv_pqw(el.p, self.e, ta, self.mu);

        OrbitStats {
            position: to_ecliptic(focus, rv, &el),
            velocity: to_ecliptic(&Vector3::zeros(), vv, &el),
            semi_major_axis: self.a,
            semi_minor_axis: -self.a * libm::sqrt(self.e.powi(2) - 1.0),
            orbital_period: f64::INFINITY,
            center: Some(to_ecliptic(
                focus,
                Vector3::new(-self.a * self.e, 0.0, 0.0),
                &el,
            )),
            periapsis: to_ecliptic(focus, Vector3::new(self.a * (1.0 - self.e), 0.0, 0.0), &el),
            apoapsis: None,
        }
    }

    /// Directions outside the asymptotes are clamped onto them.
    pub fn project(&self, point: &Vector3<f64>, focus: &Vector3<f64>) -> Projection {
        let local = transform_to_perifocal(focus, point, self.argpe, self.lan, self.i);
        let limit = self.asymptote() * (1.0 - 1e-9);
        let ta = libm::atan2(local.y, local.x).clamp(-limit, limit);
        let ha = ta_to_ha(ta, self.e);
        let ma = self.e * libm::sinh(ha) - ha;
        Projection {
            ma,
            time_delta: seconds((ma - self.ma) / self.mean_motion()),
        }
    }
}

pub fn ha_to_ta(ha: f64, e: f64) -> f64 {
    2.0 * libm::atan(libm::sqrt((e + 1.0) / (e - 1.0)) * libm::tanh(ha / 2.0))
}

pub fn ta_to_ha(ta: f64, e: f64) -> f64 {
    2.0 * libm::atanh(libm::sqrt((e - 1.0) / (e + 1.0)) * libm::tan(ta / 2.0))
}

#[cfg(test)]
use super::{orbits::Orbit, wrap_pi};

#[cfg(test)]
fn orbit(a: f64, e: f64, i: f64, argpe: f64, lan: f64, ma: f64) -> HyperbolicOrbit {
    *HyperbolicOrbit::new(1.0).set_from_kepler_elements(&KeplerElements {
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
    for (e, ma) in [(1.2, -3.0), (1.5, 0.4), (3.0, 12.0), (1.01, -0.2)] {
        let src = orbit(-2.0, e, 0.7, 1.1, 2.3, ma);
        let stats = src.stats(Duration::ZERO, &Vector3::zeros());
        let mut dst = HyperbolicOrbit::new(1.0);
        dst.set_from_cartesian(&StateVector::new(stats.position, stats.velocity));
        assert!(((dst.a + 2.0) / 2.0).abs() < 1e-6, "a -> {}", dst.a);
        assert!(((dst.e - e) / e).abs() < 1e-6);
        assert!((dst.i - 0.7).abs() < 1e-6);
        assert!(wrap_pi(dst.lan - 2.3).abs() < 1e-6);
        assert!(wrap_pi(dst.argpe - 1.1).abs() < 1e-6);
        assert!((dst.ma - ma).abs() < 1e-6 * ma.abs().max(1.0), "ma {ma} -> {}", dst.ma);
    }
}

#[test]
fn mean_anomaly_is_unbounded() {
    let mut o = Orbit::Hyperbolic(orbit(-1.0, 2.0, 0.0, 0.0, 0.0, 0.0));
    o.advance(Duration::seconds(100));
    assert!((o.mean_anomaly() - 100.0).abs() < 1e-9);
    let stats = o.stats(Duration::ZERO);
    assert!(stats.orbital_period.is_infinite());
    assert!(stats.apoapsis.is_none());
    assert!(stats.position.norm() > 10.0);
}

#[test]
fn project_before_and_after_periapsis() {
    let o = orbit(-1.0, 2.0, 0.0, 0.0, 0.0, 0.0);
    let ahead = o.project(&Vector3::new(0.0, 5.0, 0.0), &Vector3::zeros());
    assert!(ahead.ma > 0.0);
    assert!(ahead.time_delta.is_positive());
    let behind = o.project(&Vector3::new(0.0, -5.0, 0.0), &Vector3::zeros());
    assert!((behind.ma + ahead.ma).abs() < 1e-12);
    assert!(behind.time_delta.is_negative());
    let beyond = o.project(&Vector3::new(-1.0, 0.0, 0.0), &Vector3::zeros());
    assert!(beyond.ma.is_finite());
}
