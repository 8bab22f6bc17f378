//! Shared primitive types used across the entire crate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A simulation tick. One tick = one synchronous environment step.
pub type Tick = u64;

/// The canonical run identifier.
pub type RunId = String;

/// Opaque actor handle issued by the Simulation Environment.
///
/// Carries no meaning beyond equality and use as a lookup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub u32);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A point in world space, in metres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Location {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// A location plus a heading. Spawn points are transforms.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Transform {
    pub location: Location,
    /// Heading in degrees.
    pub yaw: f64,
}

impl Transform {
    pub const fn new(location: Location, yaw: f64) -> Self {
        Self { location, yaw }
    }

    pub const fn at(location: Location) -> Self {
        Self { location, yaw: 0.0 }
    }
}
