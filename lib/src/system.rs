//! The simulation driver.
//!
//! [`SolarSystem::update`] advances every body by one tick in arena order,
//! which puts each primary before its secondaries and every planet before
//! every ship. Planets follow their orbits and spin; ships additionally
//! check which sphere of influence they are in, turn, and burn.

use std::f64::consts;

use nalgebra::{UnitQuaternion, Vector3};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use time::Duration;
use tracing::{debug, info, trace, warn};

use crate::{
    arena::IdLike,
    bodies::{Body, BodyGraph, BodyId, Ephemeris},
    ephemeris::AU_M,
    error::SimError,
    kepler::orbits::{KeplerElements, Orbit, OrbitStats, Regime, StateVector},
    maneuver::{Maneuver, ManeuverId},
    time::{Epoch, SECONDS_PER_DAY},
    vessel::Ship,
};

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Meters per simulation length unit. Thrust delta-v is computed in
    /// `m/s` and scaled by this before it touches a velocity.
    pub length_unit_m: f64,
    /// Angular rate removed per tick by stability assist (`rad/s`)
    pub stability_assist_step: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            length_unit_m: AU_M,
            stability_assist_step: 1e-3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BodySnapshot {
    pub id: BodyId,
    pub name: String,
    pub primary: Option<BodyId>,
    pub regime: Regime,
    /// Relative to the root.
    pub state: StateVector,
    pub elements: Option<KeplerElements>,
    pub rotation: f64,
    pub soi: Option<f64>,
    /// Ships only (`kg`)
    pub mass: Option<f64>,
    pub throttle: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub epoch: Option<Epoch>,
    pub bodies: Vec<BodySnapshot>,
}

#[derive(Clone, Debug)]
pub struct SolarSystem {
    config: SimConfig,
    graph: BodyGraph,
    /// Time the bodies are at; `None` before the first update.
    epoch: Option<Epoch>,
    /// Absolute states of the tick in progress, by raw body id.
    absolute: Vec<StateVector>,
}

fn zero_state() -> StateVector {
    StateVector::new(Vector3::zeros(), Vector3::zeros())
}

fn compose(primary: &StateVector, relative: &StateVector) -> StateVector {
    StateVector::new(
        primary.position + relative.position,
        primary.velocity + relative.velocity,
    )
}

impl SolarSystem {
    pub fn new(graph: BodyGraph, config: SimConfig) -> Self {
        Self {
            config,
            absolute: vec![zero_state(); graph.len()],
            graph,
            epoch: None,
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn graph(&self) -> &BodyGraph {
        &self.graph
    }

    pub fn epoch(&self) -> Option<Epoch> {
        self.epoch
    }

    pub fn is_initialized(&self) -> bool {
        self.epoch.is_some()
    }

    pub fn find(&self, name: &str) -> Option<BodyId> {
        self.graph.find(name)
    }

    pub fn body(&self, id: BodyId) -> Option<&Body> {
        self.graph.get(id)
    }

    /// Advance the system from `sim_time` by `dt`.
    ///
    /// The first call places every body from its ephemeris at `sim_time`.
    /// A body whose step fails keeps its previous orbit; the remaining
    /// bodies are still stepped and the first error is returned.
    pub fn update(&mut self, sim_time: Epoch, dt: Duration) -> Result<(), SimError> {
        if dt.is_negative() {
            return Err(SimError::NegativeTimeStep);
        }
        if self.epoch.is_none() {
            self.initialize(sim_time)?;
        }
        trace!(%sim_time, ?dt, "tick");

        self.absolute.clear();
        self.absolute.resize(self.graph.len(), zero_state());

        let mut result = Ok(());
        for raw in 0..self.graph.len() {
            let id = BodyId::from_raw(raw);
            if let Err(e) = self.step(id, dt) {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        self.epoch = Some(sim_time + dt);
        result
    }

    fn initialize(&mut self, sim_time: Epoch) -> Result<(), SimError> {
        let t = sim_time.julian_centuries_since_j2000();
        for raw in 0..self.graph.len() {
            let id = BodyId::from_raw(raw);
            let Some(primary) = self.graph[id].primary else {
                continue;
            };
            let mu = self.graph[primary].physical.mu;
            let orbit = match self.graph[id].ephemeris {
                Ephemeris::Root => None,
                Ephemeris::Elements(table) => {
                    let el = table.at(t);
                    Some(Orbit::from_kepler_elements(mu, &el).ok_or(
                        SimError::UnsupportedEccentricity {
                            body: id,
                            eccentricity: el.e,
                        },
                    )?)
                }
                Ephemeris::State(sv) => Some(Orbit::from_cartesian(mu, &sv).ok_or(
                    SimError::UnsupportedEccentricity {
                        body: id,
                        eccentricity: sv.eccentricity(mu),
                    },
                )?),
            };
            if let Some(orbit) = orbit {
                self.graph[id].orbit = orbit;
            }
            self.graph[id].soi = self.graph.sphere_of_influence(id);
        }
        info!("initialized {} bodies at {}", self.graph.len(), sim_time);
        Ok(())
    }

    fn primary_state(&self, id: BodyId) -> StateVector {
        self.graph[id]
            .primary
            .map_or_else(zero_state, |p| self.absolute[p.into_raw()])
    }

    /// Step one body. On failure the body is put back the way it was
    /// before the step.
    fn step(&mut self, id: BodyId, dt: Duration) -> Result<(), SimError> {
        let checkpoint = Checkpoint::of(&self.graph[id]);
        let result = self.advance_body(id, dt).and_then(|()| {
            let state = compose(&self.primary_state(id), &self.graph[id].orbit.state());
            if is_finite(&state) {
                self.absolute[id.into_raw()] = state;
                Ok(())
            } else {
                Err(SimError::NonFiniteState(id))
            }
        });
        if let Err(e) = &result {
            warn!("step of {} failed: {e}", self.graph[id].name);
            checkpoint.restore(&mut self.graph, id);
            let state = compose(&self.primary_state(id), &self.graph[id].orbit.state());
            self.absolute[id.into_raw()] = state;
        }
        result
    }

    fn advance_body(&mut self, id: BodyId, dt: Duration) -> Result<(), SimError> {
        self.graph[id].orbit.advance(dt);
        if self.graph[id].is_ship() {
            self.step_ship(id, dt)
        } else {
            spin(&mut self.graph[id], dt);
            Ok(())
        }
    }

    fn step_ship(&mut self, id: BodyId, dt: Duration) -> Result<(), SimError> {
        self.check_sphere_of_influence(id)?;

        let step = self.config.stability_assist_step;
        let unit = self.config.length_unit_m;
        let body = &mut self.graph[id];
        let Some(ship) = body.ship_mut() else {
            return Ok(());
        };
        ship.rotate(dt, step);
        let heading = ship.heading();
        let Some(burn) = ship.burn(dt) else {
            return Ok(());
        };

        let mut state = body.orbit.state();
        state.velocity += heading * (burn.delta_v / unit);
        let mu = body.orbit.mu();
        set_state(id, body, &state, mu)
    }

    /// Put a ship under the nearest non-root planet whose sphere of
    /// influence contains it, or under the root if there is none.
    fn check_sphere_of_influence(&mut self, id: BodyId) -> Result<(), SimError> {
        let Some(current) = self.graph[id].primary else {
            return Ok(());
        };
        let state = compose(&self.absolute[current.into_raw()], &self.graph[id].orbit.state());
        let root = self.graph.root();

        let nearest = self
            .graph
            .iter()
            .filter(|(c, b)| *c != root && !b.is_ship())
            .filter_map(|(c, b)| {
                let soi = b.soi?;
                let distance = (state.position - self.absolute[c.into_raw()].position).norm();
                (distance < soi).then_some((c, distance))
            })
            .min_by_key(|&(_, d)| OrderedFloat(d))
            .map(|(c, _)| c);

        let target = nearest.unwrap_or(root);
        if target == current {
            return Ok(());
        }

        let anchor = self.absolute[target.into_raw()];
        let relative = StateVector::new(
            state.position - anchor.position,
            state.velocity - anchor.velocity,
        );
        let mu = self.graph[target].physical.mu;
        let orbit = Orbit::from_cartesian(mu, &relative).ok_or(SimError::UnsupportedEccentricity {
            body: id,
            eccentricity: relative.eccentricity(mu),
        })?;
        debug!(
            "{} left {} for {} on a {:?} orbit",
            self.graph[id].name,
            self.graph[current].name,
            self.graph[target].name,
            orbit.regime()
        );
        self.graph[id].orbit = orbit;
        self.graph.reparent(id, target);
        Ok(())
    }

    /// Absolute state of a body, relative to the root.
    pub fn state(&self, id: BodyId) -> Option<StateVector> {
        let mut body = self.graph.get(id)?;
        let mut state = body.orbit.state();
        while let Some(p) = body.primary {
            body = &self.graph[p];
            state = compose(&body.orbit.state(), &state);
        }
        Some(state)
    }

    /// Orbit stats `dt` ahead, with positions about the primary's current
    /// absolute position.
    pub fn stats(&self, id: BodyId, dt: Duration) -> Option<OrbitStats> {
        let body = self.graph.get(id)?;
        let focus = body
            .primary
            .and_then(|p| self.state(p))
            .map_or_else(Vector3::zeros, |s| s.position);
        Some(body.orbit.stats_about(dt, &focus))
    }

    pub fn snapshot(&self) -> Snapshot {
        let bodies = self
            .graph
            .iter()
            .map(|(id, body)| BodySnapshot {
                id,
                name: body.name.clone(),
                primary: body.primary,
                regime: body.orbit.regime(),
                state: self.state(id).unwrap_or_else(zero_state),
                elements: body.orbit.elements(),
                rotation: body.rotation,
                soi: body.soi,
                mass: body.ship().map(Ship::mass),
                throttle: body.ship().map(|s| s.motion.throttle),
            })
            .collect();
        Snapshot {
            epoch: self.epoch,
            bodies,
        }
    }

    fn ship_mut(&mut self, id: BodyId) -> Result<&mut Ship, SimError> {
        self.graph
            .get_mut(id)
            .ok_or_else(|| SimError::UnknownBody(format!("{id:?}")))?
            .ship_mut()
            .ok_or(SimError::NotAShip(id))
    }

    pub fn set_throttle(&mut self, id: BodyId, throttle: f64) -> Result<(), SimError> {
        self.ship_mut(id)?.set_throttle(throttle);
        Ok(())
    }

    pub fn set_rates(&mut self, id: BodyId, pitch: f64, yaw: f64, roll: f64) -> Result<(), SimError> {
        self.ship_mut(id)?.set_rates(pitch, yaw, roll);
        Ok(())
    }

    pub fn set_stability_assist(&mut self, id: BodyId, on: bool) -> Result<(), SimError> {
        self.ship_mut(id)?.motion.stability_assist = on;
        Ok(())
    }

    pub fn set_orientation(
        &mut self,
        id: BodyId,
        orientation: UnitQuaternion<f64>,
    ) -> Result<(), SimError> {
        self.ship_mut(id)?.motion.orientation = orientation;
        Ok(())
    }

    /// Point a ship along (or against) its velocity about its primary.
    pub fn point_prograde(&mut self, id: BodyId, retrograde: bool) -> Result<(), SimError> {
        let velocity = self
            .graph
            .get(id)
            .ok_or_else(|| SimError::UnknownBody(format!("{id:?}")))?
            .orbit
            .state()
            .velocity;
        let direction = if retrograde { -velocity } else { velocity };
        self.ship_mut(id)?.point_at(&direction);
        Ok(())
    }

    /// Drop the bottom stage. Returns whether there was one.
    pub fn stage(&mut self, id: BodyId) -> Result<bool, SimError> {
        Ok(self.ship_mut(id)?.stage())
    }

    /// Plan a burn of `delta_v_frenet` at the next pass of `point`
    /// (absolute position) and attach it to the ship.
    pub fn add_maneuver(
        &mut self,
        id: BodyId,
        point: &Vector3<f64>,
        delta_v_frenet: Vector3<f64>,
    ) -> Result<ManeuverId, SimError> {
        let body = self
            .graph
            .get(id)
            .ok_or_else(|| SimError::UnknownBody(format!("{id:?}")))?;
        let focus = body
            .primary
            .and_then(|p| self.state(p))
            .map_or_else(Vector3::zeros, |s| s.position);
        let (maneuver, _) = Maneuver::plan(&body.orbit, &focus, point, delta_v_frenet)
            .ok_or(SimError::InvalidManeuver(id))?;
        let maneuver_id = maneuver.id;
        debug!("planned {:?} for {}", maneuver_id, body.name);
        self.ship_mut(id)?.maneuvers.push(maneuver);
        Ok(maneuver_id)
    }

    pub fn remove_maneuver(&mut self, id: BodyId, maneuver: ManeuverId) -> Result<bool, SimError> {
        let ship = self.ship_mut(id)?;
        let before = ship.maneuvers.len();
        ship.maneuvers.retain(|m| m.id != maneuver);
        Ok(ship.maneuvers.len() != before)
    }
}

/// What a body step may change.
struct Checkpoint {
    orbit: Orbit,
    primary: Option<BodyId>,
    rotation: f64,
    ship: Option<Ship>,
}

impl Checkpoint {
    fn of(body: &Body) -> Self {
        Self {
            orbit: body.orbit,
            primary: body.primary,
            rotation: body.rotation,
            ship: body.ship().cloned(),
        }
    }

    fn restore(self, graph: &mut BodyGraph, id: BodyId) {
        if let Some(primary) = self.primary {
            if graph[id].primary != Some(primary) {
                graph.reparent(id, primary);
            }
        }
        let body = &mut graph[id];
        body.orbit = self.orbit;
        body.rotation = self.rotation;
        if let (Some(saved), Some(ship)) = (self.ship, body.ship_mut()) {
            *ship = saved;
        }
    }
}

fn is_finite(state: &StateVector) -> bool {
    state.position.iter().chain(state.velocity.iter()).all(|x| x.is_finite())
}

/// Rotate a body about its spin axis by `dt` worth of its sidereal period.
fn spin(body: &mut Body, dt: Duration) {
    let period = body.physical.rotation_period * SECONDS_PER_DAY;
    if !period.is_normal() {
        return;
    }
    body.rotation =
        (body.rotation + consts::TAU * dt.as_seconds_f64() / period).rem_euclid(consts::TAU);
}

/// Replace a body's orbit elements from a new relative state, switching
/// variant when the eccentricity leaves the current one's range.
fn set_state(id: BodyId, body: &mut Body, state: &StateVector, mu: f64) -> Result<(), SimError> {
    let e = state.eccentricity(mu);
    if !body.orbit.supports(e) {
        let regime = Regime::for_eccentricity(e).ok_or(SimError::UnsupportedEccentricity {
            body: id,
            eccentricity: e,
        })?;
        debug!(
            "{} changed from {:?} to {:?} (e = {e})",
            body.name,
            body.orbit.regime(),
            regime
        );
        body.orbit = Orbit::empty(regime, mu);
    }
    body.orbit.set_from_cartesian(state);
    Ok(())
}

#[cfg(test)]
use crate::{
    bodies::{BodySpec, Physical},
    ephemeris::{solar_system, ElementTable, Linear, Size},
    vessel::{Stage, G0},
};

#[cfg(test)]
fn catalog() -> SolarSystem {
    SolarSystem::new(
        BodyGraph::from_seed(solar_system()).unwrap(),
        SimConfig::default(),
    )
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

/// The catalog plus a ship in a 7000 km circular equatorial orbit about
/// Earth.
#[cfg(test)]
fn catalog_with_probe(ship: Ship) -> SolarSystem {
    let r = 7.0e6;
    let v = libm::sqrt(3.986_004_418e14 / r);
    let mut specs = solar_system().flatten();
    specs.push(BodySpec {
        name: "Probe".into(),
        primary: Some("Earth".into()),
        physical: Physical::default(),
        ephemeris: Ephemeris::State(StateVector::new(
            Vector3::new(r / AU_M, 0.0, 0.0),
            Vector3::new(0.0, v / AU_M, 0.0),
        )),
        ship: Some(ship),
    });
    SolarSystem::new(BodyGraph::from_specs(specs).unwrap(), SimConfig::default())
}

/// A toy system in meters: a bare root with a ship in a circular orbit.
#[cfg(test)]
fn toy(ship: Ship) -> SolarSystem {
    let mu = 3.986_004_418e14;
    let r = 7.0e6;
    let specs = vec![
        BodySpec {
            name: "Earth".into(),
            primary: None,
            physical: Physical {
                mu,
                ..Default::default()
            },
            ephemeris: Ephemeris::Root,
            ship: None,
        },
        BodySpec {
            name: "Probe".into(),
            primary: Some("Earth".into()),
            physical: Physical::default(),
            ephemeris: Ephemeris::State(StateVector::new(
                Vector3::new(r, 0.0, 0.0),
                Vector3::new(0.0, libm::sqrt(mu / r), 0.0),
            )),
            ship: Some(ship),
        },
    ];
    SolarSystem::new(
        BodyGraph::from_specs(specs).unwrap(),
        SimConfig {
            length_unit_m: 1.0,
            ..Default::default()
        },
    )
}

/// Sun with `mu = 1` and one planet on a circular orbit of radius 10.
#[cfg(test)]
fn toy_planet(ship_primary: &str, ship_state: StateVector) -> SolarSystem {
    let circular = ElementTable {
        size: Size::SemiMajorAxis(Linear::constant(10.0)),
        e: Linear::default(),
        i: Linear::default(),
        l: Linear::default(),
        w: Linear::default(),
        lan: Linear::default(),
        perturbations: None,
    };
    let specs = vec![
        BodySpec {
            name: "Sun".into(),
            primary: None,
            physical: Physical {
                mu: 1.0,
                ..Default::default()
            },
            ephemeris: Ephemeris::Root,
            ship: None,
        },
        BodySpec {
            name: "Rock".into(),
            primary: Some("Sun".into()),
            physical: Physical {
                mu: 1e-3,
                ..Default::default()
            },
            ephemeris: Ephemeris::Elements(circular),
            ship: None,
        },
        BodySpec {
            name: "Probe".into(),
            primary: Some(ship_primary.into()),
            physical: Physical::default(),
            ephemeris: Ephemeris::State(ship_state),
            ship: Some(Ship::default()),
        },
    ];
    SolarSystem::new(BodyGraph::from_specs(specs).unwrap(), SimConfig::default())
}

#[test]
fn earth_orbit_at_j2000() {
    let mut sys = catalog();
    sys.update(Epoch::J2000, Duration::ZERO).unwrap();
    let earth = sys.find("Earth").unwrap();
    let body = sys.body(earth).unwrap();
    assert_eq!(body.orbit.regime(), Regime::Elliptical);
    assert!((body.orbit.eccentricity() - 0.0167).abs() < 1e-4);

    let stats = sys.stats(earth, Duration::ZERO).unwrap();
    assert!((stats.semi_major_axis - 1.0).abs() < 1e-3);
    let days = stats.orbital_period / SECONDS_PER_DAY;
    assert!(((days - 365.25) / 365.25).abs() < 1e-3, "{days} days");

    let sun = sys.graph().root();
    assert_eq!(sys.body(sun).unwrap().orbit.regime(), Regime::Stationary);
    assert_eq!(sys.state(sun).unwrap(), zero_state());

    // The Moon sits well inside Earth's sphere of influence.
    let soi = body.soi.unwrap();
    assert!((soi - 0.0098).abs() < 2e-4, "soi {soi}");
    let moon = sys.find("Moon").unwrap();
    let distance = (sys.state(moon).unwrap().position - sys.state(earth).unwrap().position).norm();
    assert!(distance < soi);
}

#[test]
fn earth_returns_after_one_period() {
    let mut sys = catalog();
    sys.update(Epoch::J2000, Duration::ZERO).unwrap();
    let earth = sys.find("Earth").unwrap();
    let start = sys.state(earth).unwrap().position;
    let period = sys.stats(earth, Duration::ZERO).unwrap().orbital_period;
    sys.update(Epoch::J2000, Duration::seconds_f64(period)).unwrap();
    assert!((sys.state(earth).unwrap().position - start).norm() < 1e-6);
}

#[test]
fn planets_spin() {
    let mut sys = catalog();
    let earth = sys.find("Earth").unwrap();
    let half_day = 0.997_269_68 * SECONDS_PER_DAY / 2.0;
    sys.update(Epoch::J2000, Duration::seconds_f64(half_day)).unwrap();
    assert!((sys.body(earth).unwrap().rotation - consts::PI).abs() < 1e-6);
    sys.update(Epoch::J2000, Duration::seconds_f64(3.0 * half_day)).unwrap();
    let rotation = sys.body(earth).unwrap().rotation;
    assert!(rotation.min(consts::TAU - rotation) < 1e-6);
    // Venus turns backwards but stays in [0, 2π).
    let venus = sys.body(sys.find("Venus").unwrap()).unwrap();
    assert!((0.0..consts::TAU).contains(&venus.rotation));
}

#[test]
fn update_rejects_negative_steps() {
    let mut sys = catalog();
    assert_eq!(
        sys.update(Epoch::J2000, Duration::seconds(-1)),
        Err(SimError::NegativeTimeStep)
    );
    assert!(!sys.is_initialized());
    sys.update(Epoch::J2000, Duration::seconds(60)).unwrap();
    assert_eq!(sys.epoch(), Some(Epoch::J2000 + Duration::seconds(60)));
}

#[test]
fn ship_enters_sphere_of_influence() {
    // Rock starts at (10, 0, 0) moving at sqrt(1/10); its SOI is ~0.69.
    let v_rock = libm::sqrt(0.1);
    let v_rel = libm::sqrt(1e-3 / 0.2);
    let mut sys = toy_planet(
        "Sun",
        StateVector::new(
            Vector3::new(10.2, 0.0, 0.0),
            Vector3::new(0.0, v_rock + v_rel, 0.0),
        ),
    );
    let sun = sys.find("Sun").unwrap();
    let rock = sys.find("Rock").unwrap();
    let probe = sys.find("Probe").unwrap();
    sys.update(Epoch::J2000, Duration::milliseconds(10)).unwrap();

    let body = sys.body(probe).unwrap();
    assert_eq!(body.primary, Some(rock));
    assert!((body.orbit.mu() - 1e-3).abs() < 1e-15);
    assert!(body.orbit.eccentricity() < 0.05);
    assert!(sys.body(rock).unwrap().secondaries.contains(&probe));
    assert!(!sys.body(sun).unwrap().secondaries.contains(&probe));

    let gap = sys.state(probe).unwrap().position - sys.state(rock).unwrap().position;
    assert!((gap.norm() - 0.2).abs() < 1e-3);
}

#[test]
fn ship_leaving_sphere_of_influence_falls_back_to_root() {
    let mut sys = toy_planet(
        "Rock",
        StateVector::new(Vector3::new(2.0, 0.0, 0.0), Vector3::new(0.0, 0.01, 0.0)),
    );
    let sun = sys.find("Sun").unwrap();
    let probe = sys.find("Probe").unwrap();
    sys.update(Epoch::J2000, Duration::milliseconds(10)).unwrap();

    let body = sys.body(probe).unwrap();
    assert_eq!(body.primary, Some(sun));
    assert!((body.orbit.mu() - 1.0).abs() < 1e-15);
    let gap = sys.state(probe).unwrap().position - Vector3::new(12.0, 0.0, 0.0);
    assert!(gap.norm() < 1e-2);
}

#[test]
fn thrust_follows_rocket_equation() {
    let mut idle = toy(probe());
    let mut burning = toy(probe());
    let probe_id = burning.find("Probe").unwrap();
    burning.set_throttle(probe_id, 1.0).unwrap();

    let dt = Duration::seconds(10);
    idle.update(Epoch::J2000, dt).unwrap();
    burning.update(Epoch::J2000, dt).unwrap();

    let used = 10.0 * 1000.0 / (G0 * 300.0);
    let expected = 300.0 * G0 * libm::log(200.0 / (200.0 - used));
    let a = idle.state(probe_id).unwrap();
    let b = burning.state(probe_id).unwrap();
    assert!((a.position - b.position).norm() < 1e-3);
    // Identity orientation: the nose points along +x.
    let dv = b.velocity - a.velocity;
    assert!((dv - Vector3::new(expected, 0.0, 0.0)).norm() < 1e-6, "{dv:?}");

    let ship = burning.body(probe_id).unwrap().ship().unwrap();
    assert!((ship.mass() - (200.0 - used)).abs() < 1e-9);
}

#[test]
fn escape_burn_switches_to_hyperbolic() {
    let ship = Ship {
        payload_mass: 10.0,
        stages: vec![Stage {
            dry_mass: 10.0,
            propellant: 1000.0,
            isp: 1000.0,
            thrust: 1e7,
        }],
        ..Default::default()
    };
    let mut idle = toy(ship.clone());
    let mut sys = toy(ship);
    let probe_id = sys.find("Probe").unwrap();
    sys.update(Epoch::J2000, Duration::ZERO).unwrap();
    idle.update(Epoch::J2000, Duration::ZERO).unwrap();
    sys.point_prograde(probe_id, false).unwrap();
    let heading = sys.body(probe_id).unwrap().ship().unwrap().heading();
    sys.set_throttle(probe_id, 1.0).unwrap();
    sys.update(Epoch::J2000, Duration::seconds(10)).unwrap();
    idle.update(Epoch::J2000, Duration::seconds(10)).unwrap();

    let body = sys.body(probe_id).unwrap();
    assert_eq!(body.orbit.regime(), Regime::Hyperbolic);
    assert!(body.orbit.eccentricity() > 1.0);
    assert_eq!(body.ship().unwrap().propellant(), 0.0);

    // The new variant starts from the same Cartesian state plus the burn.
    let dv = 1000.0 * G0 * libm::log(1020.0 / 20.0);
    let a = idle.state(probe_id).unwrap();
    let b = sys.state(probe_id).unwrap();
    assert!((a.position - b.position).norm() < 1e-3);
    assert!((b.velocity - (a.velocity + heading * dv)).norm() < 1e-6);

    // Coasting keeps the new variant.
    sys.set_throttle(probe_id, 0.0).unwrap();
    sys.update(Epoch::J2000 + Duration::seconds(10), Duration::seconds(10))
        .unwrap();
    assert_eq!(sys.body(probe_id).unwrap().orbit.regime(), Regime::Hyperbolic);
}

#[test]
fn failed_burn_leaves_ship_untouched() {
    let mut ship = probe();
    ship.payload_mass = f64::NAN;
    let mut sys = toy(ship);
    let probe_id = sys.find("Probe").unwrap();
    sys.update(Epoch::J2000, Duration::ZERO).unwrap();
    let before = sys.body(probe_id).unwrap().clone();
    sys.set_throttle(probe_id, 1.0).unwrap();

    let result = sys.update(Epoch::J2000, Duration::seconds(10));
    assert!(
        matches!(result, Err(SimError::UnsupportedEccentricity { body, .. }) if body == probe_id),
        "{result:?}"
    );
    let after = sys.body(probe_id).unwrap();
    assert_eq!(after.orbit, before.orbit);
    assert_eq!(after.ship().unwrap().propellant(), 100.0);
    assert_eq!(after.ship().unwrap().stages, before.ship().unwrap().stages);
    assert_eq!(sys.state(probe_id).unwrap(), before.orbit.state());
    assert_eq!(sys.epoch(), Some(Epoch::J2000 + Duration::seconds(10)));
}

/// Specific orbital energy about a unit-`mu` root at the origin.
#[cfg(test)]
fn unit_energy(sv: &StateVector) -> f64 {
    sv.velocity.norm_squared() / 2.0 - 1.0 / sv.position.norm()
}

#[test]
fn ship_at_rest_falls_straight_in() {
    let start = StateVector::new(Vector3::new(5.0, 0.0, 0.0), Vector3::zeros());
    let mut sys = toy_planet("Sun", start);
    let probe = sys.find("Probe").unwrap();
    sys.update(Epoch::J2000, Duration::seconds(1)).unwrap();

    let body = sys.body(probe).unwrap();
    assert_eq!(body.orbit.regime(), Regime::Parabolic);
    assert_eq!(body.orbit.elements().map(|el| el.p), Some(0.0));
    assert!(body.orbit.mean_motion().is_finite());

    let state = sys.state(probe).unwrap();
    assert!(state.position.iter().chain(state.velocity.iter()).all(|x| x.is_finite()));
    assert!(state.position.x < 5.0 && state.velocity.x < 0.0);
    assert_eq!((state.position.y, state.position.z), (0.0, 0.0));
    assert!((unit_energy(&state) - unit_energy(&start)).abs() < 1e-12);

    // Keeps falling on later ticks.
    sys.update(Epoch::J2000 + Duration::seconds(1), Duration::seconds(1))
        .unwrap();
    assert!(sys.state(probe).unwrap().position.x < state.position.x);
}

#[test]
fn radial_ship_keeps_its_energy() {
    for velocity in [Vector3::new(0.1, 0.0, 0.0), Vector3::new(-0.3, 0.0, 0.0)] {
        let start = StateVector::new(Vector3::new(5.0, 0.0, 0.0), velocity);
        let mut sys = toy_planet("Sun", start);
        let probe = sys.find("Probe").unwrap();
        sys.update(Epoch::J2000, Duration::seconds(1)).unwrap();

        let state = sys.state(probe).unwrap();
        assert!(state.position.iter().all(|x| x.is_finite()), "{velocity:?}");
        assert!(
            (state.position.x - 5.0).signum() == velocity.x.signum(),
            "{velocity:?}"
        );
        assert!((unit_energy(&state) - unit_energy(&start)).abs() < 1e-12);
        assert_eq!(sys.body(probe).unwrap().orbit.regime(), Regime::Parabolic);
    }
}

#[test]
fn stability_assist_stops_rotation() {
    let mut sys = toy(probe());
    let probe_id = sys.find("Probe").unwrap();
    sys.set_rates(probe_id, 0.01, -0.004, 0.002).unwrap();
    sys.set_stability_assist(probe_id, true).unwrap();
    let mut t = Epoch::J2000;
    for _ in 0..10 {
        sys.update(t, Duration::seconds(1)).unwrap();
        t += Duration::seconds(1);
    }
    let motion = sys.body(probe_id).unwrap().ship().unwrap().motion;
    assert_eq!(
        (motion.pitch_rate, motion.yaw_rate, motion.roll_rate),
        (0.0, 0.0, 0.0)
    );
}

#[test]
fn commands_need_a_ship() {
    let mut sys = catalog();
    let earth = sys.find("Earth").unwrap();
    assert_eq!(sys.set_throttle(earth, 1.0), Err(SimError::NotAShip(earth)));
    assert_eq!(sys.stage(earth), Err(SimError::NotAShip(earth)));
}

#[test]
fn unsupported_initial_state_is_reported() {
    let mut sys = toy_planet(
        "Sun",
        StateVector::new(Vector3::repeat(f64::NAN), Vector3::zeros()),
    );
    let probe = sys.find("Probe").unwrap();
    assert!(matches!(
        sys.update(Epoch::J2000, Duration::ZERO),
        Err(SimError::UnsupportedEccentricity { body, .. }) if body == probe
    ));
}

#[test]
fn maneuvers_attach_to_ships() {
    let mut sys = toy(probe());
    let probe_id = sys.find("Probe").unwrap();
    sys.update(Epoch::J2000, Duration::ZERO).unwrap();
    let id = sys
        .add_maneuver(probe_id, &Vector3::new(0.0, 7.0e6, 0.0), Vector3::new(100.0, 0.0, 0.0))
        .unwrap();
    let ship = sys.body(probe_id).unwrap().ship().unwrap();
    assert_eq!(ship.maneuvers.len(), 1);
    assert!(ship.maneuvers[0].target.apoapsis_radius() > 7.0e6);
    assert!(sys.remove_maneuver(probe_id, id).unwrap());
    assert!(!sys.remove_maneuver(probe_id, id).unwrap());
}

#[test]
fn runs_are_deterministic() {
    let run = || {
        let mut sys = catalog_with_probe(probe());
        let probe_id = sys.find("Probe").unwrap();
        let mut t = Epoch::J2000;
        let dt = Duration::seconds(30);
        for tick in 0..200 {
            match tick {
                10 => sys.set_rates(probe_id, 0.02, 0.0, 0.01).unwrap(),
                20 => sys.set_stability_assist(probe_id, true).unwrap(),
                40 => sys.set_throttle(probe_id, 1.0).unwrap(),
                120 => {
                    sys.stage(probe_id).unwrap();
                }
                _ => {}
            }
            sys.update(t, dt).unwrap();
            t += dt;
        }
        sys.snapshot()
    };
    let first = run();
    assert_eq!(first, run());
    let probe = first.bodies.iter().find(|b| b.name == "Probe").unwrap();
    assert_eq!(probe.mass, Some(50.0));
}
