//! Static Kepler element tables and the built-in catalog.
//!
//! Planetary elements are the JPL "approximate positions of the planets"
//! set valid from 3000 BC to 3000 AD, with the extra mean-anomaly terms for
//! Jupiter through Pluto. The Moon uses mean geocentric elements. Distances
//! are in AU, times in seconds.

use serde::{Deserialize, Serialize};

use crate::{
    bodies::{BodySeed, Ephemeris, Physical},
    kepler::{
        mean_anomaly_from_elements, orbits::KeplerElements, wrap_tau, Perturbations,
    },
};

pub const AU_M: f64 = 1.495_978_707e11;
const AU3_M3: f64 = AU_M * AU_M * AU_M;
const KM_PER_AU: f64 = AU_M / 1e3;

/// A linear secular model `base + rate * T`, `T` in Julian centuries past
/// J2000.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Linear(pub [f64; 2]);

impl Linear {
    pub const fn constant(base: f64) -> Self {
        Self([base, 0.0])
    }

    pub fn at(&self, t: f64) -> f64 {
        self.0[0] + self.0[1] * t
    }
}

/// Size of the conic, as the semi-major axis or, for tables that must also
/// describe parabolas, the semi-latus rectum.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Size {
    SemiMajorAxis(Linear),
    SemiLatusRectum(Linear),
}

/// Element table of one body. Angles are in degrees.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ElementTable {
    pub size: Size,
    pub e: Linear,
    /// Inclination.
    pub i: Linear,
    /// Mean longitude.
    pub l: Linear,
    /// Longitude of periapsis.
    pub w: Linear,
    /// Longitude of the ascending node.
    pub lan: Linear,
    #[serde(default)]
    pub perturbations: Option<Perturbations>,
}

impl ElementTable {
    pub fn eccentricity_at(&self, t: f64) -> f64 {
        self.e.at(t)
    }

    /// Evaluate the table `t` Julian centuries past J2000.
    pub fn at(&self, t: f64) -> KeplerElements {
        let e = self.e.at(t);
        let w = self.w.at(t);
        let lan = self.lan.at(t);
        let ma = mean_anomaly_from_elements(self.l.at(t), w, self.perturbations.as_ref(), t);
        let p = match self.size {
            Size::SemiMajorAxis(a) => a.at(t) * (1.0 - e * e),
            Size::SemiLatusRectum(p) => p.at(t),
        };
        KeplerElements {
            p,
            e,
            i: self.i.at(t).to_radians(),
            lan: wrap_tau(lan.to_radians()),
            argpe: wrap_tau((w - lan).to_radians()),
            ma: ma.to_radians(),
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn planet(
    name: &str,
    mu_m3s2: f64,
    radius_km: f64,
    rotation_period: f64,
    axial_tilt: f64,
    table: ElementTable,
    secondaries: Vec<BodySeed>,
) -> BodySeed {
    BodySeed {
        name: name.to_owned(),
        physical: Physical {
            mu: mu_m3s2 / AU3_M3,
            radius: radius_km / KM_PER_AU,
            rotation_period,
            axial_tilt: axial_tilt.to_radians(),
        },
        ephemeris: Ephemeris::Elements(table),
        ship: None,
        secondaries,
    }
}

fn table(rows: [[f64; 2]; 6], perturbations: Option<Perturbations>) -> ElementTable {
    let [a, e, i, l, w, lan] = rows.map(Linear);
    ElementTable {
        size: Size::SemiMajorAxis(a),
        e,
        i,
        l,
        w,
        lan,
        perturbations,
    }
}

fn outer(b: f64, c: f64, s: f64, f: f64) -> Option<Perturbations> {
    Some(Perturbations { b, c, s, f })
}

/// The Sun with its planets, Pluto and the Moon.
///
/// Rows are `a` (AU), `e`, `I`, `L`, long. peri., long. node (deg), each
/// as `[J2000 value, rate per century]`.
pub fn solar_system() -> BodySeed {
    let moon = planet(
        "Moon",
        4.904_869_5e12,
        1_737.4,
        27.321_661,
        6.687,
        ElementTable {
            size: Size::SemiMajorAxis(Linear::constant(384_400.0 / KM_PER_AU)),
            e: Linear::constant(0.054_9),
            i: Linear::constant(5.145),
            l: Linear([218.316_447_7, 481_267.881_234_21]),
            w: Linear([83.353_246_5, 4_069.013_728_7]),
            lan: Linear([125.044_547_9, -1_934.136_289_1]),
            perturbations: None,
        },
        vec![],
    );

    let planets = vec![
        planet(
            "Mercury",
            2.203_2e13,
            2_439.7,
            58.646,
            0.034,
            table(
                [
                    [0.387_098_43, 0.0],
                    [0.205_636_61, 0.000_021_23],
                    [7.005_594_32, -0.005_901_58],
                    [252.251_667_24, 149_472.674_866_23],
                    [77.457_718_95, 0.159_400_13],
                    [48.339_618_19, -0.122_141_82],
                ],
                None,
            ),
            vec![],
        ),
        planet(
            "Venus",
            3.248_59e14,
            6_051.8,
            -243.025,
            177.36,
            table(
                [
                    [0.723_321_02, -0.000_000_26],
                    [0.006_763_99, -0.000_051_07],
                    [3.397_775_45, 0.000_434_94],
                    [181.979_708_50, 58_517.815_602_60],
                    [131.767_557_13, 0.056_796_48],
                    [76.672_614_96, -0.272_741_74],
                ],
                None,
            ),
            vec![],
        ),
        planet(
            "Earth",
            3.986_004_418e14,
            6_371.0,
            0.997_269_68,
            23.439_3,
            table(
                [
                    [1.000_000_18, -0.000_000_03],
                    [0.016_731_63, -0.000_036_61],
                    [-0.000_543_46, -0.013_371_78],
                    [100.466_915_72, 35_999.373_063_29],
                    [102.930_058_85, 0.317_952_60],
                    [-5.112_603_89, -0.241_238_56],
                ],
                None,
            ),
            vec![moon],
        ),
        planet(
            "Mars",
            4.282_837e13,
            3_389.5,
            1.025_956_76,
            25.19,
            table(
                [
                    [1.523_712_43, 0.000_000_97],
                    [0.093_365_11, 0.000_091_49],
                    [1.851_818_69, -0.007_247_57],
                    [-4.568_131_64, 19_140.299_342_43],
                    [-23.917_447_84, 0.452_236_25],
                    [49.713_209_84, -0.268_524_31],
                ],
                None,
            ),
            vec![],
        ),
        planet(
            "Jupiter",
            1.266_865_34e17,
            69_911.0,
            0.413_54,
            3.13,
            table(
                [
                    [5.202_480_19, -0.000_028_64],
                    [0.048_535_90, 0.000_180_26],
                    [1.298_614_16, -0.003_226_99],
                    [34.334_791_52, 3_034.903_717_57],
                    [14.274_952_44, 0.181_991_96],
                    [100.292_826_54, 0.130_246_19],
                ],
                outer(-0.000_124_52, 0.060_640_60, -0.356_354_38, 38.351_250_00),
            ),
            vec![],
        ),
        planet(
            "Saturn",
            3.793_118_7e16,
            58_232.0,
            0.444_01,
            26.73,
            table(
                [
                    [9.541_498_83, -0.000_030_65],
                    [0.055_508_25, -0.000_320_44],
                    [2.494_241_02, 0.004_519_69],
                    [50.075_713_29, 1_222.114_947_24],
                    [92.861_360_63, 0.541_794_78],
                    [113.639_987_02, -0.250_150_02],
                ],
                outer(0.000_258_99, -0.134_344_69, 0.873_201_47, 38.351_250_00),
            ),
            vec![],
        ),
        planet(
            "Uranus",
            5.793_939e15,
            25_362.0,
            -0.718_33,
            97.77,
            table(
                [
                    [19.187_979_48, -0.000_204_55],
                    [0.046_857_40, -0.000_015_50],
                    [0.772_981_27, -0.001_801_55],
                    [314.202_766_25, 428.495_125_95],
                    [172.434_044_41, 0.092_669_85],
                    [73.962_502_15, 0.057_396_99],
                ],
                outer(0.000_583_31, -0.977_318_48, 0.176_892_45, 7.670_250_00),
            ),
            vec![],
        ),
        planet(
            "Neptune",
            6.836_529e15,
            24_622.0,
            0.671_25,
            28.32,
            table(
                [
                    [30.069_527_52, 0.000_064_47],
                    [0.008_954_39, 0.000_008_18],
                    [1.770_055_20, 0.000_224_00],
                    [304.222_892_87, 218.465_153_14],
                    [46.681_587_24, 0.010_099_38],
                    [131.786_358_53, -0.006_063_02],
                ],
                outer(-0.000_413_48, 0.683_463_18, -0.101_625_47, 7.670_250_00),
            ),
            vec![],
        ),
        planet(
            "Pluto",
            8.71e11,
            1_188.3,
            -6.387_23,
            122.53,
            table(
                [
                    [39.486_860_35, 0.004_497_51],
                    [0.248_852_38, 0.000_060_16],
                    [17.141_042_60, 0.000_005_01],
                    [238.965_350_11, 145.180_429_03],
                    [224.097_025_98, -0.009_688_27],
                    [110.301_679_86, -0.008_096_98],
                ],
                outer(-0.012_627_24, 0.0, 0.0, 0.0),
            ),
            vec![],
        ),
    ];

    BodySeed {
        name: "Sun".to_owned(),
        physical: Physical {
            mu: 1.327_124_400_18e20 / AU3_M3,
            radius: 695_700.0 / KM_PER_AU,
            rotation_period: 25.38,
            axial_tilt: 7.25f64.to_radians(),
        },
        ephemeris: Ephemeris::Root,
        ship: None,
        secondaries: planets,
    }
}

#[test]
fn earth_at_j2000() {
    let sun = solar_system();
    let earth = sun.secondaries.iter().find(|b| b.name == "Earth").unwrap();
    let Ephemeris::Elements(table) = earth.ephemeris else {
        panic!("Earth has no element table");
    };
    let el = table.at(0.0);
    assert!((el.e - 0.0167).abs() < 1e-4);
    assert!((el.semi_major_axis() - 1.0).abs() < 1e-6);
    // M = L - w at T = 0.
    assert!((el.ma.to_degrees() - (100.466_915_72 - 102.930_058_85)).abs() < 1e-9);
}

#[test]
fn perturbations_only_shift_outer_planets() {
    let t = 0.25;
    let plain = table([[5.2, 0.0], [0.05, 0.0], [1.3, 0.0], [34.0, 3034.9], [14.0, 0.0], [100.0, 0.0]], None);
    let mut perturbed = plain;
    perturbed.perturbations = outer(-0.000_124_52, 0.060_640_60, -0.356_354_38, 38.351_25);
    let diff = (perturbed.at(t).ma - plain.at(t).ma).to_degrees();
    let ft = (38.351_25 * t).to_radians();
    let expected = -0.000_124_52 * t * t + 0.060_640_60 * ft.cos() - 0.356_354_38 * ft.sin();
    assert!((diff - expected).abs() < 1e-9);
}
