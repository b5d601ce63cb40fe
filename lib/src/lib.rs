#![warn(clippy::pedantic)]
#![allow(
    clippy::cast_lossless,
    clippy::cast_possible_truncation,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::many_single_char_names,
    clippy::module_name_repetitions,
    clippy::too_many_lines,
    clippy::similar_names,
    clippy::doc_markdown
)]
pub mod arena;
pub mod bodies;
pub mod ephemeris;
pub mod error;
pub mod kepler;
pub mod maneuver;
pub mod system;
pub mod time;
pub mod vessel;

pub use error::SimError;
pub use system::{SimConfig, SolarSystem};
