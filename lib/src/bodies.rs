//! Definitions of celestial bodies and ships, and the primary/secondary
//! graph connecting them.

use std::collections::{HashMap, HashSet};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{
    arena::{Arena, IdLike},
    ephemeris::ElementTable,
    error::SimError,
    kepler::{
        orbits::{Orbit, StateVector, StationaryOrbit},
        sphere_of_influence,
    },
    vessel::Ship,
};

#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(transparent)]
pub struct BodyId(u64);

impl IdLike for BodyId {
    fn from_raw(index: usize) -> Self {
        Self(index as u64)
    }

    fn into_raw(self) -> usize {
        self.0 as usize
    }
}

/// Physical constants of a body.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Physical {
    /// Standard gravitational parameter (`AU^3/s^2`)
    pub mu: f64,
    /// Mean radius (`AU`)
    pub radius: f64,
    /// Sidereal rotation period (`days`); zero for bodies that do not spin
    pub rotation_period: f64,
    /// Obliquity (`rad`)
    pub axial_tilt: f64,
}

/// Where a body starts.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ephemeris {
    /// The root body, fixed at the origin.
    Root,
    /// Evaluated at the simulation time of the first update.
    Elements(ElementTable),
    /// Position and velocity relative to the primary.
    State(StateVector),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum BodyKind {
    Planet,
    Ship(Box<Ship>),
}

/// A celestial body or a ship.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Body {
    pub name: String,
    pub physical: Physical,
    pub ephemeris: Ephemeris,
    /// `None` only for the root.
    pub primary: Option<BodyId>,
    pub secondaries: Vec<BodyId>,
    /// Relative to the primary. Stationary until the first update.
    pub orbit: Orbit,
    /// Spin about the body axis (`rad`), in `[0, 2π)`
    pub rotation: f64,
    /// Radius of the sphere of influence (`AU`), set on the first update for
    /// planets on closed orbits.
    pub soi: Option<f64>,
    pub kind: BodyKind,
}

impl Body {
    pub fn is_ship(&self) -> bool {
        matches!(self.kind, BodyKind::Ship(_))
    }

    pub fn ship(&self) -> Option<&Ship> {
        match &self.kind {
            BodyKind::Ship(ship) => Some(ship),
            BodyKind::Planet => None,
        }
    }

    pub fn ship_mut(&mut self) -> Option<&mut Ship> {
        match &mut self.kind {
            BodyKind::Ship(ship) => Some(ship),
            BodyKind::Planet => None,
        }
    }
}

/// One body of a flat catalog, naming its primary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BodySpec {
    pub name: String,
    #[serde(default)]
    pub primary: Option<String>,
    #[serde(default)]
    pub physical: Physical,
    pub ephemeris: Ephemeris,
    #[serde(default)]
    pub ship: Option<Ship>,
}

/// A nested catalog: a body together with everything orbiting it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BodySeed {
    pub name: String,
    pub physical: Physical,
    pub ephemeris: Ephemeris,
    #[serde(default)]
    pub ship: Option<Ship>,
    #[serde(default)]
    pub secondaries: Vec<BodySeed>,
}

impl BodySeed {
    /// Depth-first, primaries before their secondaries.
    pub fn flatten(self) -> Vec<BodySpec> {
        let mut out = vec![];
        self.flatten_into(None, &mut out);
        out
    }

    fn flatten_into(self, primary: Option<String>, out: &mut Vec<BodySpec>) {
        let BodySeed {
            name,
            physical,
            ephemeris,
            ship,
            secondaries,
        } = self;
        out.push(BodySpec {
            name: name.clone(),
            primary,
            physical,
            ephemeris,
            ship,
        });
        for secondary in secondaries {
            secondary.flatten_into(Some(name.clone()), out);
        }
    }
}

/// The body graph. Bodies are stored primary-first with every planet ahead
/// of every ship, so one pass in arena order always sees a primary before
/// its secondaries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BodyGraph {
    bodies: Arena<BodyId, Body>,
    root: BodyId,
}

impl BodyGraph {
    pub fn from_seed(seed: BodySeed) -> Result<Self, SimError> {
        Self::from_specs(seed.flatten())
    }

    pub fn from_specs(specs: Vec<BodySpec>) -> Result<Self, SimError> {
        if let Some(name) = specs.iter().map(|s| &s.name).duplicates().next() {
            return Err(SimError::DuplicateBody { name: name.clone() });
        }

        let index: HashMap<String, usize> = specs
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.clone(), i))
            .collect();

        let mut root = None;
        let mut children = vec![vec![]; specs.len()];
        for (i, spec) in specs.iter().enumerate() {
            match (&spec.primary, &spec.ephemeris) {
                (None, Ephemeris::Root) => {
                    if root.replace(i).is_some() {
                        return Err(SimError::MultipleRoots);
                    }
                }
                (None, _) => {
                    return Err(SimError::MissingPrimary {
                        body: spec.name.clone(),
                    })
                }
                (Some(_), Ephemeris::Root) => {
                    return Err(SimError::MissingElements {
                        body: spec.name.clone(),
                    })
                }
                (Some(primary), _) => {
                    let &p = index.get(primary.as_str()).ok_or_else(|| {
                        SimError::UnknownPrimary {
                            body: spec.name.clone(),
                            primary: primary.clone(),
                        }
                    })?;
                    if specs[p].ship.is_some() {
                        return Err(SimError::ShipPrimary {
                            body: spec.name.clone(),
                            primary: primary.clone(),
                        });
                    }
                    children[p].push(i);
                }
            }
        }
        let root = root.ok_or(SimError::NoRoot)?;

        // Breadth-first from the root. Anything left over hangs off a cycle.
        let mut order = vec![root];
        let mut next = 0;
        while let Some(&i) = order.get(next) {
            order.extend(&children[i]);
            next += 1;
        }
        if order.len() != specs.len() {
            let reached = order.iter().copied().collect::<HashSet<_>>();
            let body = specs
                .iter()
                .enumerate()
                .find(|(i, _)| !reached.contains(i))
                .map(|(_, s)| s.name.clone())
                .unwrap_or_default();
            return Err(SimError::Cycle { body });
        }
        // Ships are leaves, so moving them last keeps primaries first.
        order.sort_by_key(|&i| specs[i].ship.is_some());

        let mut ids = vec![BodyId::default(); specs.len()];
        for (slot, &i) in order.iter().enumerate() {
            ids[i] = BodyId::from_raw(slot);
        }

        let mut specs: Vec<Option<BodySpec>> = specs.into_iter().map(Some).collect();
        let mut bodies = Arena::new();
        for &i in &order {
            let Some(spec) = specs[i].take() else {
                continue;
            };
            let primary = spec.primary.as_deref().map(|p| ids[index[p]]);
            trace!(name = %spec.name, ?primary, "adding body");
            bodies.push(Body {
                name: spec.name,
                physical: spec.physical,
                ephemeris: spec.ephemeris,
                primary,
                secondaries: children[i].iter().map(|&c| ids[c]).collect(),
                orbit: Orbit::Stationary(StationaryOrbit),
                rotation: 0.0,
                soi: None,
                kind: match spec.ship {
                    Some(ship) => BodyKind::Ship(Box::new(ship)),
                    None => BodyKind::Planet,
                },
            });
        }

        Ok(Self {
            bodies,
            root: ids[root],
        })
    }

    pub fn root(&self) -> BodyId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn get(&self, id: BodyId) -> Option<&Body> {
        self.bodies.get(id)
    }

    pub fn get_mut(&mut self, id: BodyId) -> Option<&mut Body> {
        self.bodies.get_mut(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = BodyId> {
        self.bodies.ids()
    }

    pub fn iter(&self) -> impl Iterator<Item = (BodyId, &Body)> {
        self.bodies.iter()
    }

    pub fn find(&self, name: &str) -> Option<BodyId> {
        self.bodies
            .iter()
            .find(|(_, b)| b.name == name)
            .map(|(id, _)| id)
    }

    /// Move `body` under `primary`, keeping both secondary lists in step.
    pub fn reparent(&mut self, body: BodyId, primary: BodyId) {
        if let Some(old) = self.bodies[body].primary.replace(primary) {
            self.bodies[old].secondaries.retain(|&s| s != body);
        }
        self.bodies[primary].secondaries.push(body);
    }

    /// Sphere of influence of a body about its primary, from its current
    /// orbit. `None` for the root, ships and open orbits.
    pub fn sphere_of_influence(&self, id: BodyId) -> Option<f64> {
        let body = &self.bodies[id];
        let primary = &self.bodies[body.primary?];
        match (&body.kind, &body.orbit) {
            (BodyKind::Planet, Orbit::Elliptical(o)) => Some(sphere_of_influence(
                o.a,
                o.e,
                body.physical.mu,
                primary.physical.mu,
            )),
            _ => None,
        }
    }
}

impl std::ops::Index<BodyId> for BodyGraph {
    type Output = Body;

    fn index(&self, index: BodyId) -> &Self::Output {
        &self.bodies[index]
    }
}

impl std::ops::IndexMut<BodyId> for BodyGraph {
    fn index_mut(&mut self, index: BodyId) -> &mut Self::Output {
        &mut self.bodies[index]
    }
}

#[cfg(test)]
use crate::ephemeris::solar_system;

#[cfg(test)]
fn spec(name: &str, primary: Option<&str>) -> BodySpec {
    BodySpec {
        name: name.to_owned(),
        primary: primary.map(str::to_owned),
        physical: Physical::default(),
        ephemeris: if primary.is_some() {
            Ephemeris::State(StateVector::new(
                nalgebra::Vector3::x(),
                nalgebra::Vector3::y(),
            ))
        } else {
            Ephemeris::Root
        },
        ship: None,
    }
}

#[test]
fn catalog_flattens_primaries_first() {
    let graph = BodyGraph::from_seed(solar_system()).unwrap();
    assert_eq!(graph.len(), 11);
    assert_eq!(graph[graph.root()].name, "Sun");
    for (id, body) in graph.iter() {
        if let Some(p) = body.primary {
            assert!(p < id, "{} precedes its primary", body.name);
            assert!(graph[p].secondaries.contains(&id));
        }
    }
    let earth = graph.find("Earth").unwrap();
    let moon = graph.find("Moon").unwrap();
    assert_eq!(graph[moon].primary, Some(earth));
}

#[test]
fn ships_are_stored_after_planets() {
    let mut specs = vec![spec("Sun", None)];
    let mut ship = spec("Probe", Some("Sun"));
    ship.ship = Some(Ship::default());
    specs.push(ship);
    specs.push(spec("Earth", Some("Sun")));
    specs.push(spec("Moon", Some("Earth")));
    let graph = BodyGraph::from_specs(specs).unwrap();
    let names = graph.iter().map(|(_, b)| b.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, ["Sun", "Earth", "Moon", "Probe"]);
}

#[test]
fn malformed_catalogs_are_rejected() {
    let cases = [
        (
            vec![spec("Sun", None), spec("Sun", None)],
            SimError::DuplicateBody { name: "Sun".into() },
        ),
        (
            vec![spec("Sun", None), spec("Other", None)],
            SimError::MultipleRoots,
        ),
        (vec![spec("Earth", Some("Sun"))], SimError::UnknownPrimary {
            body: "Earth".into(),
            primary: "Sun".into(),
        }),
        (
            vec![spec("Sun", None), spec("A", Some("B")), spec("B", Some("A"))],
            SimError::Cycle { body: "A".into() },
        ),
        (vec![spec("A", Some("A"))], SimError::NoRoot),
    ];
    for (specs, expected) in cases {
        assert_eq!(BodyGraph::from_specs(specs), Err(expected));
    }

    let mut stray = spec("Stray", None);
    stray.ephemeris = Ephemeris::State(StateVector::new(
        nalgebra::Vector3::x(),
        nalgebra::Vector3::y(),
    ));
    assert_eq!(
        BodyGraph::from_specs(vec![spec("Sun", None), stray]),
        Err(SimError::MissingPrimary {
            body: "Stray".into()
        })
    );

    let mut ship = spec("Probe", Some("Sun"));
    ship.ship = Some(Ship::default());
    assert_eq!(
        BodyGraph::from_specs(vec![spec("Sun", None), ship, spec("Rock", Some("Probe"))]),
        Err(SimError::ShipPrimary {
            body: "Rock".into(),
            primary: "Probe".into()
        })
    );
}

#[test]
fn reparent_moves_between_secondary_lists() {
    let mut graph = BodyGraph::from_specs(vec![
        spec("Sun", None),
        spec("Earth", Some("Sun")),
        spec("Rock", Some("Sun")),
    ])
    .unwrap();
    let sun = graph.root();
    let earth = graph.find("Earth").unwrap();
    let rock = graph.find("Rock").unwrap();
    graph.reparent(rock, earth);
    assert_eq!(graph[rock].primary, Some(earth));
    assert_eq!(graph[earth].secondaries, [rock]);
    assert_eq!(graph[sun].secondaries, [earth]);
}
