//! Arena simulation modules

pub mod arena;
pub mod collision;
pub mod combat;
pub mod physics;
pub mod simulation;
pub mod snapshot;

pub use arena::Letter;
pub use collision::Rect;
pub use simulation::{Simulation, Winner};

use serde::Deserialize;

/// Controller state for a single tank, replaced wholesale by each `tank_input`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TankInput {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub shoot: bool,
}
