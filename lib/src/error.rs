use thiserror::Error;

use crate::bodies::BodyId;

#[derive(Clone, Debug, PartialEq, Error)]
pub enum SimError {
    #[error("no orbit variant supports eccentricity {eccentricity} of body {body:?}")]
    UnsupportedEccentricity { body: BodyId, eccentricity: f64 },
    #[error("body `{body}` has no primary but is not the root")]
    MissingPrimary { body: String },
    #[error("body `{body}` names unknown primary `{primary}`")]
    UnknownPrimary { body: String, primary: String },
    #[error("more than one body has no primary")]
    MultipleRoots,
    #[error("no root body")]
    NoRoot,
    #[error("primary chain of `{body}` forms a cycle")]
    Cycle { body: String },
    #[error("duplicate body name `{name}`")]
    DuplicateBody { name: String },
    #[error("ship `{primary}` cannot be the primary of `{body}`")]
    ShipPrimary { body: String, primary: String },
    #[error("body `{body}` has neither Kepler elements nor a state vector")]
    MissingElements { body: String },
    #[error("unknown body `{0}`")]
    UnknownBody(String),
    #[error("body {0:?} is not a ship")]
    NotAShip(BodyId),
    #[error("maneuver for body {0:?} does not lead to a valid orbit")]
    InvalidManeuver(BodyId),
    #[error("state of body {0:?} is no longer finite")]
    NonFiniteState(BodyId),
    #[error("time step must not be negative")]
    NegativeTimeStep,
}
