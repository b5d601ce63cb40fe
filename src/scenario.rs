use std::path::Path;

use color_eyre::eyre::{self, bail, WrapErr};
use nalgebra::Vector3;
use orbsim::{
    bodies::{BodyGraph, BodySpec, Ephemeris, Physical},
    ephemeris::solar_system,
    time::Epoch,
    vessel::{Motion, Ship, Stage},
    SimConfig, SolarSystem,
};
use serde::Deserialize;
use time::{Duration, OffsetDateTime};

/// A run read from a TOML file.
#[derive(Clone, Debug, Deserialize)]
pub struct Scenario {
    #[serde(with = "time::serde::rfc3339")]
    pub start: OffsetDateTime,
    pub step_seconds: f64,
    pub steps: u64,
    #[serde(default = "default_report_every")]
    pub report_every: u64,
    #[serde(default)]
    pub sim: SimConfig,
    /// Replaces the built-in catalog when non-empty.
    #[serde(default)]
    pub bodies: Vec<BodySpec>,
    #[serde(default)]
    pub ships: Vec<ShipEntry>,
    #[serde(default)]
    pub commands: Vec<Command>,
}

fn default_report_every() -> u64 {
    1
}

#[derive(Clone, Debug, Deserialize)]
pub struct ShipEntry {
    pub name: String,
    pub primary: String,
    pub ephemeris: Ephemeris,
    #[serde(default)]
    pub payload_mass: f64,
    #[serde(default)]
    pub stages: Vec<Stage>,
    #[serde(default)]
    pub stability_assist: bool,
}

/// Something to do to a ship right before the given tick.
#[derive(Clone, Debug, Deserialize)]
pub struct Command {
    pub tick: u64,
    pub ship: String,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    Throttle { value: f64 },
    Rates { pitch: f64, yaw: f64, roll: f64 },
    StabilityAssist { on: bool },
    Stage,
    Prograde,
    Retrograde,
    /// Burn `delta_v` (prograde, normal, radial; `m/s`) where the orbit
    /// next passes `point`.
    Maneuver { point: [f64; 3], delta_v: [f64; 3] },
}

impl Scenario {
    pub fn load(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read {}", path.display()))?;
        let scenario: Scenario =
            toml::from_str(&text).wrap_err_with(|| format!("failed to parse {}", path.display()))?;
        if scenario.step_seconds.is_nan() || scenario.step_seconds < 0.0 {
            bail!("step_seconds must be a non-negative number");
        }
        if scenario.report_every == 0 {
            bail!("report_every must be at least 1");
        }
        Ok(scenario)
    }

    pub fn epoch(&self) -> Epoch {
        Epoch::from_datetime(self.start)
    }

    pub fn step(&self) -> Duration {
        Duration::seconds_f64(self.step_seconds)
    }

    pub fn build(&self) -> eyre::Result<SolarSystem> {
        let mut specs = if self.bodies.is_empty() {
            solar_system().flatten()
        } else {
            self.bodies.clone()
        };
        specs.extend(self.ships.iter().map(ShipEntry::spec));
        let graph = BodyGraph::from_specs(specs).wrap_err("invalid body catalog")?;
        Ok(SolarSystem::new(graph, self.sim))
    }

    /// Commands due before `tick`, in file order.
    pub fn due(&self, tick: u64) -> impl Iterator<Item = &Command> {
        self.commands.iter().filter(move |c| c.tick == tick)
    }
}

impl ShipEntry {
    fn spec(&self) -> BodySpec {
        BodySpec {
            name: self.name.clone(),
            primary: Some(self.primary.clone()),
            physical: Physical::default(),
            ephemeris: self.ephemeris,
            ship: Some(Ship {
                payload_mass: self.payload_mass,
                stages: self.stages.clone(),
                motion: Motion {
                    stability_assist: self.stability_assist,
                    ..Default::default()
                },
                maneuvers: vec![],
            }),
        }
    }
}

impl Action {
    pub fn apply(&self, system: &mut SolarSystem, ship: &str) -> eyre::Result<()> {
        let Some(id) = system.find(ship) else {
            bail!("no body named `{ship}`");
        };
        match *self {
            Action::Throttle { value } => system.set_throttle(id, value)?,
            Action::Rates { pitch, yaw, roll } => system.set_rates(id, pitch, yaw, roll)?,
            Action::StabilityAssist { on } => system.set_stability_assist(id, on)?,
            Action::Stage => {
                if !system.stage(id)? {
                    bail!("`{ship}` has no stage left to drop");
                }
            }
            Action::Prograde => system.point_prograde(id, false)?,
            Action::Retrograde => system.point_prograde(id, true)?,
            Action::Maneuver { point, delta_v } => {
                let unit = system.config().length_unit_m;
                let delta_v = Vector3::from(delta_v) / unit;
                system.add_maneuver(id, &Vector3::from(point), delta_v)?;
            }
        }
        Ok(())
    }
}

#[test]
fn parses_scenario() {
    let scenario: Scenario = toml::from_str(
        r#"
        start = "2000-01-01T12:00:00Z"
        step_seconds = 60.0
        steps = 10

        [sim]
        stability_assist_step = 0.01

        [[ships]]
        name = "Probe"
        primary = "Earth"
        payload_mass = 50.0
        ephemeris.state = { position = [4.7e-5, 0.0, 0.0], velocity = [0.0, 5.0e-8, 0.0] }

        [[ships.stages]]
        dry_mass = 50.0
        propellant = 100.0
        isp = 300.0
        thrust = 1000.0

        [[commands]]
        tick = 2
        ship = "Probe"
        kind = "throttle"
        value = 1.0

        [[commands]]
        tick = 5
        ship = "Probe"
        kind = "stage"
        "#,
    )
    .unwrap();
    assert_eq!(scenario.epoch(), Epoch::J2000);
    assert_eq!(scenario.report_every, 1);
    assert_eq!(scenario.sim.stability_assist_step, 0.01);
    assert_eq!(scenario.sim.length_unit_m, SimConfig::default().length_unit_m);
    assert_eq!(scenario.ships[0].stages.len(), 1);
    assert!(matches!(scenario.commands[1].action, Action::Stage));
    assert_eq!(scenario.due(2).count(), 1);

    let system = scenario.build().unwrap();
    let probe = system.find("Probe").unwrap();
    assert!(system.body(probe).unwrap().is_ship());
}
