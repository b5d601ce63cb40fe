//! Keplerian orbits.
//!
//! [`Orbit`] is a closed set of variants, one per eccentricity regime. The
//! variant is always picked by [`Regime::for_eccentricity`]; a body whose
//! eccentricity crosses a regime boundary gets a new variant built from its
//! Cartesian state.

use std::f64::consts;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use time::Duration;

use super::{
    elliptical::EllipticalOrbit, hyperbolic::HyperbolicOrbit, parabolic::ParabolicOrbit,
    transform_to_ecliptic, wrap_tau,
};

/// Half-width of the eccentricity band treated as parabolic.
pub const PARABOLIC_TOLERANCE: f64 = 1e-9;
/// Eccentricities and inclinations below this are circular/equatorial.
pub const DEGENERATE_TOLERANCE: f64 = 1e-10;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Regime {
    Elliptical,
    Parabolic,
    Hyperbolic,
    Stationary,
}

impl Regime {
    /// The conic regime of an eccentricity, or `None` if it is negative or
    /// not a number. Never returns [`Regime::Stationary`].
    pub fn for_eccentricity(e: f64) -> Option<Regime> {
        if EllipticalOrbit::supports(e) {
            Some(Regime::Elliptical)
        } else if ParabolicOrbit::supports(e) {
            Some(Regime::Parabolic)
        } else if HyperbolicOrbit::supports(e) {
            Some(Regime::Hyperbolic)
        } else {
            None
        }
    }
}

/// Classical elements of a conic. `p` is the semi-latus rectum so that all
/// regimes share one representation; angles are radians.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeplerElements {
    pub p: f64,
    pub e: f64,
    pub i: f64,
    pub lan: f64,
    pub argpe: f64,
    pub ma: f64,
}

impl KeplerElements {
    /// Semi-major axis; infinite for parabolas, negative for hyperbolas.
    pub fn semi_major_axis(&self) -> f64 {
        if ParabolicOrbit::supports(self.e) {
            f64::INFINITY
        } else {
            self.p / (1.0 - self.e.powi(2))
        }
    }
}

/// Position and velocity relative to the primary.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateVector {
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
}

impl StateVector {
    pub fn new(position: Vector3<f64>, velocity: Vector3<f64>) -> Self {
        Self { position, velocity }
    }

    pub fn eccentricity(&self, mu: f64) -> f64 {
        super::eccentricity_from_state_vectors(
            &self.position,
            &self.velocity,
            &Vector3::zeros(),
            mu,
        )
    }
}

/// Derived quantities of an orbit at one instant. Computed fresh on every
/// request.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrbitStats {
    pub position: Vector3<f64>,
    /// Velocity relative to the primary.
    pub velocity: Vector3<f64>,
    pub semi_major_axis: f64,
    pub semi_minor_axis: f64,
    /// Seconds; infinite for open orbits.
    pub orbital_period: f64,
    pub center: Option<Vector3<f64>>,
    pub periapsis: Vector3<f64>,
    pub apoapsis: Option<Vector3<f64>>,
}

/// Where a point lands on an orbit.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Projection {
    pub ma: f64,
    /// Time from the orbit's current mean anomaly to the projected one.
    /// Open orbits report a negative delta for points already passed.
    pub time_delta: Duration,
}

/// Seconds as a [`Duration`], saturating instead of panicking on
/// non-finite values.
pub(crate) fn seconds(secs: f64) -> Duration {
    Duration::saturating_seconds_f64(secs)
}

/// Position and velocity in the perifocal frame at true anomaly `ta`.
pub(crate) fn sv_pqw(p: f64, e: f64, ta: f64, mu: f64) -> (Vector3<f64>, Vector3<f64>) {
    let r = p / (1.0 + e * libm::cos(ta));
    let rv = Vector3::new(r * libm::cos(ta), r * libm::sin(ta), 0.0);
    let vv = libm::sqrt(mu / p) * Vector3::new(-libm::sin(ta), e + libm::cos(ta), 0.0);
    (rv, vv)
}

/// Orientation of the orbital plane and shape of a relative state vector.
pub(crate) struct Shape {
    pub rv: Vector3<f64>,
    pub vv: Vector3<f64>,
    pub hv: Vector3<f64>,
    pub h: f64,
    pub nv: Vector3<f64>,
    pub ev: Vector3<f64>,
    pub e: f64,
    pub p: f64,
    pub i: f64,
}

impl Shape {
    pub fn new(sv: &StateVector, mu: f64) -> Self {
        let rv = sv.position;
        let vv = sv.velocity;
        let hv = rv.cross(&vv);
        let h = hv.norm();
        let nv = Vector3::z().cross(&hv);
        let ev = vv.cross(&hv) / mu - rv / rv.norm();
        // A radial trajectory has no orbital plane; treat it as equatorial.
        let i = if h > 0.0 {
            libm::acos((hv.z / h).clamp(-1.0, 1.0))
        } else {
            0.0
        };
        Self {
            rv,
            vv,
            hv,
            h,
            nv,
            e: ev.norm(),
            ev,
            p: h * h / mu,
            i,
        }
    }

    pub fn is_equatorial(&self) -> bool {
        self.i < DEGENERATE_TOLERANCE || consts::PI - self.i < DEGENERATE_TOLERANCE
    }

    pub fn is_circular(&self) -> bool {
        self.e < DEGENERATE_TOLERANCE
    }

    fn retrograde(&self) -> bool {
        self.hv.z < 0.0
    }

    /// Angle from the ascending node to the position.
    pub fn argument_of_latitude(&self) -> f64 {
        libm::atan2(self.rv.dot(&self.hv.cross(&self.nv)) / self.h, self.rv.dot(&self.nv))
    }

    /// Angle from the reference direction to the position, for equatorial
    /// orbits.
    pub fn true_longitude(&self) -> f64 {
        if self.retrograde() {
            libm::atan2(-self.rv.y, self.rv.x)
        } else {
            libm::atan2(self.rv.y, self.rv.x)
        }
    }

    /// Longitude of the ascending node and argument of periapsis of a
    /// non-circular orbit, given the true anomaly of the position.
    pub fn orientation(&self, ta: f64) -> (f64, f64) {
        if self.is_equatorial() {
            // Longitude of periapsis stands in for the argument of periapsis.
            let lonpe = if self.retrograde() {
                libm::atan2(-self.ev.y, self.ev.x)
            } else {
                libm::atan2(self.ev.y, self.ev.x)
            };
            (0.0, wrap_tau(lonpe))
        } else {
            let lan = wrap_tau(libm::atan2(self.nv.y, self.nv.x));
            (lan, wrap_tau(self.argument_of_latitude() - ta))
        }
    }
}

/// The root body's orbit: it stays where it is.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StationaryOrbit;

impl StationaryOrbit {
    pub fn stats(&self, focus: &Vector3<f64>) -> OrbitStats {
        OrbitStats {
            position: *focus,
            velocity: Vector3::zeros(),
            semi_major_axis: 0.0,
            semi_minor_axis: 0.0,
            orbital_period: f64::INFINITY,
            center: Some(*focus),
            periapsis: *focus,
            apoapsis: None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Orbit {
    Elliptical(EllipticalOrbit),
    Parabolic(ParabolicOrbit),
    Hyperbolic(HyperbolicOrbit),
    Stationary(StationaryOrbit),
}

impl Orbit {
    /// Build the variant matching `elements.e`.
    pub fn from_kepler_elements(mu: f64, elements: &KeplerElements) -> Option<Orbit> {
        let mut orbit = Orbit::empty(Regime::for_eccentricity(elements.e)?, mu);
        orbit.set_from_kepler_elements(elements);
        Some(orbit)
    }

    /// Build the variant matching the eccentricity of a relative state.
    pub fn from_cartesian(mu: f64, sv: &StateVector) -> Option<Orbit> {
        let mut orbit = Orbit::empty(Regime::for_eccentricity(sv.eccentricity(mu))?, mu);
        orbit.set_from_cartesian(sv);
        Some(orbit)
    }

    /// An orbit of the given regime with zeroed elements.
    pub fn empty(regime: Regime, mu: f64) -> Orbit {
        match regime {
            Regime::Elliptical => Orbit::Elliptical(EllipticalOrbit::new(mu)),
            Regime::Parabolic => Orbit::Parabolic(ParabolicOrbit::new(mu)),
            Regime::Hyperbolic => Orbit::Hyperbolic(HyperbolicOrbit::new(mu)),
            Regime::Stationary => Orbit::Stationary(StationaryOrbit),
        }
    }

    pub fn regime(&self) -> Regime {
        match self {
            Orbit::Elliptical(_) => Regime::Elliptical,
            Orbit::Parabolic(_) => Regime::Parabolic,
            Orbit::Hyperbolic(_) => Regime::Hyperbolic,
            Orbit::Stationary(_) => Regime::Stationary,
        }
    }

    pub fn supports(&self, e: f64) -> bool {
        match self {
            Orbit::Elliptical(_) => EllipticalOrbit::supports(e),
            Orbit::Parabolic(_) => ParabolicOrbit::supports(e),
            Orbit::Hyperbolic(_) => HyperbolicOrbit::supports(e),
            Orbit::Stationary(_) => true,
        }
    }

    pub fn set_from_kepler_elements(&mut self, elements: &KeplerElements) -> &mut Self {
        match self {
            Orbit::Elliptical(o) => {
                o.set_from_kepler_elements(elements);
            }
            Orbit::Parabolic(o) => {
                o.set_from_kepler_elements(elements);
            }
            Orbit::Hyperbolic(o) => {
                o.set_from_kepler_elements(elements);
            }
            Orbit::Stationary(_) => {}
        }
        self
    }

    /// Re-derive the elements from a state relative to the primary.
    pub fn set_from_cartesian(&mut self, sv: &StateVector) -> &mut Self {
        match self {
            Orbit::Elliptical(o) => {
                o.set_from_cartesian(sv);
            }
            Orbit::Parabolic(o) => {
                o.set_from_cartesian(sv);
            }
            Orbit::Hyperbolic(o) => {
                o.set_from_cartesian(sv);
            }
            Orbit::Stationary(_) => {}
        }
        self
    }

    pub fn advance(&mut self, dt: Duration) {
        match self {
            Orbit::Elliptical(o) => o.advance(dt),
            Orbit::Parabolic(o) => o.advance(dt),
            Orbit::Hyperbolic(o) => o.advance(dt),
            Orbit::Stationary(_) => {}
        }
    }

    /// Stats `dt` past the current mean anomaly, about a primary at the
    /// origin.
    pub fn stats(&self, dt: Duration) -> OrbitStats {
        self.stats_about(dt, &Vector3::zeros())
    }

    /// Stats `dt` past the current mean anomaly, with positions translated
    /// by the primary's position `focus`.
    pub fn stats_about(&self, dt: Duration, focus: &Vector3<f64>) -> OrbitStats {
        match self {
            Orbit::Elliptical(o) => o.stats(dt, focus),
            Orbit::Parabolic(o) => o.stats(dt, focus),
            Orbit::Hyperbolic(o) => o.stats(dt, focus),
            Orbit::Stationary(o) => o.stats(focus),
        }
    }

    /// Current state relative to the primary.
    pub fn state(&self) -> StateVector {
        let stats = self.stats(Duration::ZERO);
        StateVector::new(stats.position, stats.velocity)
    }

    /// Project `point` onto the orbit of a primary located at `focus`.
    pub fn project(&self, point: &Vector3<f64>, focus: &Vector3<f64>) -> Projection {
        match self {
            Orbit::Elliptical(o) => o.project(point, focus),
            Orbit::Parabolic(o) => o.project(point, focus),
            Orbit::Hyperbolic(o) => o.project(point, focus),
            Orbit::Stationary(_) => Projection {
                ma: 0.0,
                time_delta: Duration::ZERO,
            },
        }
    }

    pub fn elements(&self) -> Option<KeplerElements> {
        match self {
            Orbit::Elliptical(o) => Some(o.elements()),
            Orbit::Parabolic(o) => Some(o.elements()),
            Orbit::Hyperbolic(o) => Some(o.elements()),
            Orbit::Stationary(_) => None,
        }
    }

    pub fn eccentricity(&self) -> f64 {
        self.elements().map_or(0.0, |el| el.e)
    }

    pub fn mean_anomaly(&self) -> f64 {
        self.elements().map_or(0.0, |el| el.ma)
    }

    /// Mean motion (rad/s).
    pub fn mean_motion(&self) -> f64 {
        match self {
            Orbit::Elliptical(o) => o.mean_motion(),
            Orbit::Parabolic(o) => o.mean_motion(),
            Orbit::Hyperbolic(o) => o.mean_motion(),
            Orbit::Stationary(_) => 0.0,
        }
    }

    pub fn mu(&self) -> f64 {
        match self {
            Orbit::Elliptical(o) => o.mu,
            Orbit::Parabolic(o) => o.mu,
            Orbit::Hyperbolic(o) => o.mu,
            Orbit::Stationary(_) => 0.0,
        }
    }

    pub fn periapsis_radius(&self) -> f64 {
        self.elements().map_or(0.0, |el| el.p / (1.0 + el.e))
    }

    /// Infinite for open orbits.
    pub fn apoapsis_radius(&self) -> f64 {
        match self {
            Orbit::Elliptical(o) => o.a * (1.0 + o.e),
            Orbit::Parabolic(o) => o.apoapsis_radius(),
            Orbit::Hyperbolic(_) => f64::INFINITY,
            Orbit::Stationary(_) => 0.0,
        }
    }
}

/// Map a perifocal vector into the ecliptic frame of an orbit.
pub(crate) fn to_ecliptic(
    offset: &Vector3<f64>,
    vec: Vector3<f64>,
    el: &KeplerElements,
) -> Vector3<f64> {
    transform_to_ecliptic(offset, &vec, el.argpe, el.lan, el.i)
}

#[test]
fn exactly_one_regime_supports_each_eccentricity() {
    let samples = [
        0.0,
        0.5,
        0.999_999,
        1.0 - 2.0 * PARABOLIC_TOLERANCE,
        1.0 - PARABOLIC_TOLERANCE,
        1.0,
        1.0 + PARABOLIC_TOLERANCE,
        1.0 + 2.0 * PARABOLIC_TOLERANCE,
        1.5,
        1e6,
    ];
    for e in samples {
        let count = [
            EllipticalOrbit::supports(e),
            ParabolicOrbit::supports(e),
            HyperbolicOrbit::supports(e),
        ]
        .into_iter()
        .filter(|x| *x)
        .count();
        assert_eq!(count, 1, "e = {e}");
    }
    assert_eq!(Regime::for_eccentricity(f64::NAN), None);
    assert_eq!(Regime::for_eccentricity(-0.1), None);
    assert_eq!(Regime::for_eccentricity(1.0), Some(Regime::Parabolic));
}

#[test]
fn stationary_stays_put() {
    let mut sun = Orbit::Stationary(StationaryOrbit);
    sun.advance(Duration::days(365));
    let stats = sun.stats(Duration::days(1));
    assert_eq!(stats.position, Vector3::zeros());
    assert_eq!(stats.velocity, Vector3::zeros());
    assert!(sun.supports(f64::NAN));
}

#[test]
fn variant_follows_state_eccentricity() {
    let r = Vector3::new(1.0, 0.0, 0.0);
    let slow = StateVector::new(r, Vector3::new(0.0, 0.9, 0.1));
    let escape = StateVector::new(r, Vector3::new(0.0, libm::sqrt(2.0), 0.0));
    let fast = StateVector::new(r, Vector3::new(0.0, 2.0, 0.0));
    assert_eq!(Orbit::from_cartesian(1.0, &slow).map(|o| o.regime()), Some(Regime::Elliptical));
    assert_eq!(Orbit::from_cartesian(1.0, &escape).map(|o| o.regime()), Some(Regime::Parabolic));
    assert_eq!(Orbit::from_cartesian(1.0, &fast).map(|o| o.regime()), Some(Regime::Hyperbolic));
}
