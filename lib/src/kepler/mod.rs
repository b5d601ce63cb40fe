//! Two-body orbital element math.
//!
//! Everything here is a pure function of its inputs. The orbit variants in
//! [`orbits`] and the system step are built on top of these.

use std::f64::consts;

use nalgebra::{Rotation3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub mod elliptical;
pub mod hyperbolic;
pub mod orbits;
pub mod parabolic;
pub mod radial;

/// Convergence tolerance of the anomaly solvers (radians).
pub const TOLERANCE: f64 = 1e-12;
/// Lower bound of the tolerance once it is scaled down for tiny anomalies.
pub const TOLERANCE_FLOOR: f64 = 1e-15;
/// Iteration cap of the Newton iterations.
pub const MAX_ITERATIONS: u32 = 30;
/// Above this eccentricity the elliptic solver starts from a scaled guess
/// and may fall back to the near-parabolic series.
pub const HIGH_ECCENTRICITY: f64 = 0.99999;
/// A residual within this many ulps of the terms it is computed from is
/// as converged as the arithmetic allows.
const RESIDUAL_ULPS: f64 = 8.0;

/// Result of an iterative anomaly solve.
///
/// The solvers never fail: when the iteration cap is hit the best estimate is
/// returned with `converged` cleared.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Solution {
    pub value: f64,
    pub iterations: u32,
    pub converged: bool,
}

/// Extra long-period terms of the outer planets' mean anomaly.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Perturbations {
    /// Quadratic term (deg/century²).
    pub b: f64,
    /// Cosine amplitude (deg).
    pub c: f64,
    /// Sine amplitude (deg).
    pub s: f64,
    /// Frequency (deg/century).
    pub f: f64,
}

fn tolerance(ma: f64) -> f64 {
    (ma.abs() * TOLERANCE).clamp(TOLERANCE_FLOOR, TOLERANCE)
}

/// Wrap an angle into `(-π, π]`.
pub fn wrap_pi(angle: f64) -> f64 {
    let wrapped = (angle + consts::PI).rem_euclid(consts::TAU) - consts::PI;
    if wrapped <= -consts::PI {
        wrapped + consts::TAU
    } else {
        wrapped
    }
}

/// Wrap an angle into `[0, 2π)`.
pub fn wrap_tau(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(consts::TAU);
    if wrapped >= consts::TAU {
        0.0
    } else {
        wrapped
    }
}

/// Wrap an angle in degrees into `(-180, 180]`.
pub fn wrap_180(degrees: f64) -> f64 {
    let wrapped = (degrees + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped <= -180.0 {
        wrapped + 360.0
    } else {
        wrapped
    }
}

/// Solve Kepler's equation `E - e sin E = M` for `0 <= e < 1`.
pub fn solve_kepler_equation(e: f64, ma: f64) -> Solution {
    let wrapped = wrap_pi(ma);
    let turns = ma - wrapped;
    let sign = if wrapped < 0.0 { -1.0 } else { 1.0 };
    let m = wrapped.abs();
    let tol = tolerance(m);

    let seed = if e < HIGH_ECCENTRICITY {
        libm::atan2(libm::sin(m), libm::cos(m) - e)
    } else {
        (m + 0.85 * e).min(consts::PI)
    };

    let mut sol = newton_bisect(e, m, seed, tol);
    if !sol.converged {
        // E is small wherever plain Newton struggles near e = 1, so the
        // cubic truncation of the sine series is a good restart point.
        let series = near_parabolic_series(e, m);
        let retry = newton_bisect(e, m, series, tol);
        let iterations = sol.iterations + retry.iterations;
        if kepler_residual(e, retry.value, m).abs() < kepler_residual(e, sol.value, m).abs() {
            sol = retry;
        }
        sol.iterations = iterations;
        if !sol.converged {
            warn!(e, ma, estimate = sol.value, "Kepler's equation did not converge");
        }
    }

    Solution {
        value: turns + sign * sol.value,
        ..sol
    }
}

fn kepler_residual(e: f64, ea: f64, m: f64) -> f64 {
    ea - e * libm::sin(ea) - m
}

/// Newton-Raphson on `[0, π]`, falling back to bisection whenever a step
/// would leave the bracket.
fn newton_bisect(e: f64, m: f64, seed: f64, tol: f64) -> Solution {
    let mut lo = 0.0;
    let mut hi = consts::PI;
    let mut ea = seed.clamp(lo, hi);
    for iter in 1..=MAX_ITERATIONS {
        let f = kepler_residual(e, ea, m);
        if f.abs() <= RESIDUAL_ULPS * f64::EPSILON * (ea + e * libm::sin(ea).abs() + m) {
            return Solution {
                value: ea,
                iterations: iter,
                converged: true,
            };
        }
        if f < 0.0 {
            lo = ea;
        } else {
            hi = ea;
        }
        let fp = 1.0 - e * libm::cos(ea);
        let mut next = ea - f / fp;
        if !next.is_finite() || next <= lo || next >= hi {
            next = 0.5 * (lo + hi);
        }
        let delta = (next - ea).abs();
        ea = next;
        if delta < tol {
            return Solution {
                value: ea,
                iterations: iter,
                converged: true,
            };
        }
    }
    Solution {
        value: ea,
        iterations: MAX_ITERATIONS,
        converged: false,
    }
}

/// Root of `(1 - e) E + e E³ / 6 = M`.
fn near_parabolic_series(e: f64, m: f64) -> f64 {
    if e == 0.0 {
        return m;
    }
    let p = 6.0 * (1.0 - e) / e;
    let q = -6.0 * m / e;
    let disc = libm::sqrt(q * q / 4.0 + p * p * p / 27.0);
    libm::cbrt(-q / 2.0 + disc) + libm::cbrt(-q / 2.0 - disc)
}

/// Solve the hyperbolic Kepler equation `e sinh H - H = M` for `e > 1`.
pub fn solve_hyperbolic_kepler_equation(e: f64, ma: f64) -> Solution {
    let sign = if ma < 0.0 { -1.0 } else { 1.0 };
    let m = ma.abs();
    let tol = tolerance(m);

    // Each of these bounds the root from above, and the residual is convex
    // on H >= 0, so Newton descends monotonically onto the root.
    let seed = libm::asinh(m / (e - 1.0))
        .min(libm::cbrt(6.0 * m / e))
        .min(libm::asinh(m / (e - 0.5)).max(2.2));

    let mut h = seed;
    for iter in 1..=MAX_ITERATIONS {
        let f = e * libm::sinh(h) - h - m;
        if f.abs() <= RESIDUAL_ULPS * f64::EPSILON * (e * libm::sinh(h).abs() + h.abs() + m) {
            return Solution {
                value: sign * h,
                iterations: iter,
                converged: true,
            };
        }
        let fp = e * libm::cosh(h) - 1.0;
        let next = h - f / fp;
        if !next.is_finite() {
            break;
        }
        let delta = (next - h).abs();
        h = next;
        if delta < tol {
            return Solution {
                value: sign * h,
                iterations: iter,
                converged: true,
            };
        }
    }

    warn!(e, ma, estimate = h, "hyperbolic Kepler equation did not converge");
    Solution {
        value: sign * h,
        iterations: MAX_ITERATIONS,
        converged: false,
    }
}

/// Mean anomaly (deg) from the mean longitude `l` and longitude of
/// periapsis `w` (deg), plus the optional outer-planet terms evaluated at
/// `t` Julian centuries past J2000. Normalized to `(-180, 180]`.
pub fn mean_anomaly_from_elements(
    l: f64,
    w: f64,
    perturbations: Option<&Perturbations>,
    t: f64,
) -> f64 {
    let mut ma = l - w;
    if let Some(p) = perturbations {
        let ft = (p.f * t).to_radians();
        ma += p.b * t * t + p.c * libm::cos(ft) + p.s * libm::sin(ft);
    }
    wrap_180(ma)
}

/// Eccentricity vector of the relative state `position - primary_position`.
pub fn eccentricity_vector(
    position: &Vector3<f64>,
    velocity: &Vector3<f64>,
    primary_position: &Vector3<f64>,
    mu: f64,
) -> Vector3<f64> {
    let rv = position - primary_position;
    let hv = rv.cross(velocity);
    velocity.cross(&hv) / mu - rv / rv.norm()
}

pub fn eccentricity_from_state_vectors(
    position: &Vector3<f64>,
    velocity: &Vector3<f64>,
    primary_position: &Vector3<f64>,
    mu: f64,
) -> f64 {
    eccentricity_vector(position, velocity, primary_position, mu).norm()
}

/// Sphere-of-influence radius of a body on an orbit with semi-major axis
/// `a` and eccentricity `e` about a primary, from the ratio of their
/// gravitational parameters.
pub fn sphere_of_influence(a: f64, e: f64, mu: f64, primary_mu: f64) -> f64 {
    (a * (1.0 - e)).abs() * libm::cbrt(mu / (3.0 * primary_mu))
}

/// Perifocal to ecliptic rotation: about Z by the argument of periapsis,
/// about X by the inclination, then about Z by the longitude of the
/// ascending node.
pub fn perifocal_rotation(argpe: f64, lan: f64, i: f64) -> Rotation3<f64> {
    Rotation3::from_axis_angle(&Vector3::z_axis(), lan)
        * Rotation3::from_axis_angle(&Vector3::x_axis(), i)
        * Rotation3::from_axis_angle(&Vector3::z_axis(), argpe)
}

pub fn transform_to_ecliptic(
    offset: &Vector3<f64>,
    vec: &Vector3<f64>,
    argpe: f64,
    lan: f64,
    i: f64,
) -> Vector3<f64> {
    perifocal_rotation(argpe, lan, i) * vec + offset
}

/// Inverse of [`transform_to_ecliptic`].
pub fn transform_to_perifocal(
    offset: &Vector3<f64>,
    vec: &Vector3<f64>,
    argpe: f64,
    lan: f64,
    i: f64,
) -> Vector3<f64> {
    perifocal_rotation(argpe, lan, i).inverse() * (vec - offset)
}

#[cfg(test)]
use rand::{rngs::StdRng, Rng, SeedableRng};

#[test]
fn kepler_residual_grid() {
    let mut rng = StdRng::seed_from_u64(0x6b65_706c);
    let mut es = vec![0.0, 0.5, 0.9, 0.99, 0.999_99, 0.999_999_9];
    es.extend((0..200).map(|_| rng.gen_range(0.0..1.0)));
    for e in es {
        for k in 0..64 {
            let ma = consts::TAU * f64::from(k) / 64.0;
            let ea = solve_kepler_equation(e, ma).value;
            let residual = ea - e * ea.sin() - ma;
            assert!(residual.abs() < 1e-9, "e={e} M={ma} residual={residual}");
        }
        let ma = rng.gen_range(0.0..consts::TAU);
        let ea = solve_kepler_equation(e, ma).value;
        assert!((ea - e * ea.sin() - ma).abs() < 1e-9);
    }
}

#[test]
fn kepler_circular_is_identity() {
    let sol = solve_kepler_equation(0.0, 1.0);
    assert!(sol.converged);
    assert!((sol.value - 1.0).abs() < 1e-14);
}

#[test]
fn kepler_keeps_revolutions() {
    let ma = 3.0 * consts::TAU + 0.5;
    let ea = solve_kepler_equation(0.3, ma).value;
    assert!((ea - 0.3 * ea.sin() - ma).abs() < 1e-9);
    assert!(ea > 3.0 * consts::TAU);
}

#[test]
fn hyperbolic_residual() {
    let mut rng = StdRng::seed_from_u64(0x6879_7065);
    let mut es = vec![1.000_001, 1.01, 1.5, 3.0, 50.0];
    es.extend((0..100).map(|_| rng.gen_range(1.0001..20.0)));
    for e in es {
        for ma in [-1000.0, -30.0, -1.0, -1e-6, 0.0, 1e-6, 0.5, 2.0, 10.0, 400.0, 1e5] {
            let sol = solve_hyperbolic_kepler_equation(e, ma);
            let h = sol.value;
            let residual = e * h.sinh() - h - ma;
            assert!(residual.abs() < 1e-9 * ma.abs().max(1.0), "e={e} M={ma} residual={residual}");
        }
    }
}

#[test]
fn mean_anomaly_wraps_to_half_open_range() {
    assert_eq!(mean_anomaly_from_elements(100.0, 280.0, None, 0.0), 180.0);
    assert_eq!(mean_anomaly_from_elements(10.0, 5.0, None, 0.0), 5.0);
    assert!((mean_anomaly_from_elements(-350.0, 20.0, None, 0.0) - (-10.0)).abs() < 1e-12);
    let jupiter = Perturbations {
        b: -0.000_124_52,
        c: 0.060_640_60,
        s: -0.356_354_38,
        f: 38.351_25,
    };
    let plain = mean_anomaly_from_elements(34.0, 14.0, None, 0.0);
    let perturbed = mean_anomaly_from_elements(34.0, 14.0, Some(&jupiter), 0.0);
    assert!((perturbed - plain - jupiter.c).abs() < 1e-12);
}

#[test]
fn circular_state_has_zero_eccentricity() {
    let mu = 1.0;
    let r = Vector3::new(2.0, 0.0, 0.0);
    let v = Vector3::new(0.0, libm::sqrt(mu / 2.0), 0.0);
    let origin = Vector3::new(5.0, -1.0, 0.5);
    let e = eccentricity_from_state_vectors(&(r + origin), &v, &origin, mu);
    assert!(e < 1e-12);
    let escape = Vector3::new(0.0, libm::sqrt(2.0 * mu / 2.0), 0.0);
    assert!((eccentricity_from_state_vectors(&r, &escape, &Vector3::zeros(), mu) - 1.0).abs() < 1e-12);
}

#[test]
fn ecliptic_transform_round_trips() {
    let v = Vector3::new(0.3, -1.2, 0.0);
    let offset = Vector3::new(1.0, 2.0, 3.0);
    let w = transform_to_ecliptic(&offset, &v, 1.1, 0.4, 0.2);
    let back = transform_to_perifocal(&offset, &w, 1.1, 0.4, 0.2);
    assert!((back - v).norm() < 1e-14);
    // Periapsis direction of an equatorial orbit is the longitude of periapsis.
    let p = transform_to_ecliptic(&Vector3::zeros(), &Vector3::x(), 0.5, 0.25, 0.0);
    assert!((p - Vector3::new(0.75f64.cos(), 0.75f64.sin(), 0.0)).norm() < 1e-14);
}

#[test]
fn earth_sphere_of_influence() {
    let mu_sun = 1.327_124_400_18e20;
    let mu_earth = 3.986_004_418e14;
    let soi = sphere_of_influence(1.495_978_707e11, 0.0167, mu_earth, mu_sun);
    assert!((1.4e9..1.5e9).contains(&soi), "{soi}");
}
