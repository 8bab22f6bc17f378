//! The Simulation Environment boundary.
//!
//! RULE: Nothing in this crate talks to a simulator except through
//! `SimulationEnvironment`. Every call is synchronous and blocking; timeouts
//! belong to the implementation, not to the callers here.

use crate::{
    error::ScenarioResult,
    types::{ActorId, Location, Tick, Transform},
    weather::WeatherParameters,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::{BitOr, BitOrAssign};

/// A spawnable actor template with optional configurable attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Blueprint {
    pub id: String,
    attributes: BTreeMap<String, BlueprintAttribute>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlueprintAttribute {
    pub value: String,
    pub recommended_values: Vec<String>,
}

impl Blueprint {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style attribute declaration.
    pub fn with_attribute(mut self, name: &str, value: &str, recommended: &[&str]) -> Self {
        self.attributes.insert(
            name.to_string(),
            BlueprintAttribute {
                value: value.to_string(),
                recommended_values: recommended.iter().map(|v| v.to_string()).collect(),
            },
        );
        self
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn attribute(&self, name: &str) -> Option<&BlueprintAttribute> {
        self.attributes.get(name)
    }

    pub fn attribute_value(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|a| a.value.as_str())
    }

    /// Set an attribute, declaring it if the template does not carry it yet.
    pub fn set_attribute(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.get_mut(name) {
            Some(attr) => attr.value = value,
            None => {
                self.attributes.insert(
                    name.to_string(),
                    BlueprintAttribute {
                        value,
                        recommended_values: Vec::new(),
                    },
                );
            }
        }
    }
}

/// One item of a batched remote call.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Spawn(SpawnCommand),
    Destroy(ActorId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpawnCommand {
    pub blueprint: Blueprint,
    pub transform: Transform,
    /// Attach the new actor to this parent (pedestrian controllers).
    pub parent: Option<ActorId>,
    /// When set, autopilot is enabled on the new actor against this
    /// traffic-control port as part of the same batch item.
    pub autopilot_port: Option<u16>,
}

impl SpawnCommand {
    pub fn new(blueprint: Blueprint, transform: Transform) -> Self {
        Self {
            blueprint,
            transform,
            parent: None,
            autopilot_port: None,
        }
    }

    pub fn attached_to(mut self, parent: ActorId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn then_autopilot(mut self, port: u16) -> Self {
        self.autopilot_port = Some(port);
        self
    }
}

/// Per-item batch result: the spawned actor or the reported cause.
pub type CommandResponse = Result<ActorId, String>;

/// Stepping settings of the world.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorldSettings {
    pub synchronous_mode: bool,
    pub no_rendering_mode: bool,
    pub fixed_delta_seconds: Option<f64>,
}

impl WorldSettings {
    /// Free-running defaults the world is reverted to on teardown.
    pub fn free_running() -> Self {
        Self::default()
    }
}

/// Per-vehicle set of independently togglable light flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleLightState(pub u32);

impl VehicleLightState {
    pub const NONE: Self = Self(0);
    pub const POSITION: Self = Self(0x1);
    pub const LOW_BEAM: Self = Self(0x1 << 1);
    pub const HIGH_BEAM: Self = Self(0x1 << 2);
    pub const BRAKE: Self = Self(0x1 << 3);
    pub const RIGHT_BLINKER: Self = Self(0x1 << 4);
    pub const LEFT_BLINKER: Self = Self(0x1 << 5);
    pub const REVERSE: Self = Self(0x1 << 6);
    pub const FOG: Self = Self(0x1 << 7);
    pub const INTERIOR: Self = Self(0x1 << 8);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for VehicleLightState {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for VehicleLightState {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Target lane of a forced lane change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaneChangeDirection {
    Left,
    Right,
}

/// Everything this crate consumes from the simulator and its
/// traffic-control service.
pub trait SimulationEnvironment {
    // ── World stepping ─────────────────────────────────────────

    fn settings(&self) -> ScenarioResult<WorldSettings>;

    fn apply_settings(&mut self, settings: &WorldSettings) -> ScenarioResult<()>;

    /// Advance one synchronous tick. Blocks; an external interrupt surfaces
    /// as `ScenarioError::Interrupted`.
    fn tick(&mut self) -> ScenarioResult<Tick>;

    // ── Map and catalog ────────────────────────────────────────

    /// Stable, ordered list of fixed spawn transforms for the loaded map.
    fn spawn_points(&self) -> ScenarioResult<Vec<Transform>>;

    fn filter_blueprints(&self, pattern: &str) -> ScenarioResult<Vec<Blueprint>>;

    fn find_blueprint(&self, id: &str) -> ScenarioResult<Option<Blueprint>>;

    // ── Batched commands ───────────────────────────────────────

    /// Exactly one response per submitted item, in submission order.
    fn apply_batch_sync(&mut self, batch: Vec<Command>) -> ScenarioResult<Vec<CommandResponse>>;

    /// Fire-and-forget batch; used for destruction.
    fn apply_batch(&mut self, batch: Vec<Command>) -> ScenarioResult<()>;

    /// Single spawn; `None` when the environment declined it.
    fn try_spawn_actor(
        &mut self,
        blueprint: &Blueprint,
        transform: &Transform,
    ) -> ScenarioResult<Option<ActorId>>;

    // ── Actors ─────────────────────────────────────────────────

    /// Every vehicle actor currently alive, regardless of who spawned it.
    fn vehicle_actors(&self) -> ScenarioResult<Vec<ActorId>>;

    fn actor_type_id(&self, actor: ActorId) -> Option<String>;

    fn set_autopilot(&mut self, actor: ActorId, enabled: bool, tm_port: u16)
        -> ScenarioResult<()>;

    fn light_state(&self, actor: ActorId) -> ScenarioResult<VehicleLightState>;

    fn set_light_state(&mut self, actor: ActorId, state: VehicleLightState)
        -> ScenarioResult<()>;

    fn random_navigable_location(&mut self) -> Option<Location>;

    fn set_weather(&mut self, weather: &WeatherParameters) -> ScenarioResult<()>;

    // ── Pedestrians ────────────────────────────────────────────

    fn set_pedestrians_seed(&mut self, seed: u64) -> ScenarioResult<()>;

    fn set_pedestrians_cross_factor(&mut self, factor: f64) -> ScenarioResult<()>;

    fn start_controller(&mut self, controller: ActorId) -> ScenarioResult<()>;

    fn stop_controller(&mut self, controller: ActorId) -> ScenarioResult<()>;

    fn controller_go_to(&mut self, controller: ActorId, target: Location) -> ScenarioResult<()>;

    fn controller_set_max_speed(&mut self, controller: ActorId, speed: f64)
        -> ScenarioResult<()>;

    // ── Traffic control ────────────────────────────────────────

    fn traffic_manager_port(&self) -> u16;

    fn tm_set_synchronous_mode(&mut self, enabled: bool) -> ScenarioResult<()>;

    fn tm_set_lead_vehicle_distance(&mut self, metres: f64) -> ScenarioResult<()>;

    fn tm_set_random_seed(&mut self, seed: u64) -> ScenarioResult<()>;

    fn tm_set_path(&mut self, actor: ActorId, path: &[Location]) -> ScenarioResult<()>;

    fn tm_set_auto_lane_change(&mut self, actor: ActorId, enabled: bool) -> ScenarioResult<()>;

    fn tm_force_lane_change(
        &mut self,
        actor: ActorId,
        direction: LaneChangeDirection,
    ) -> ScenarioResult<()>;

    fn tm_set_ignore_lights_percent(&mut self, actor: ActorId, percent: f64)
        -> ScenarioResult<()>;

    fn tm_set_ignore_signs_percent(&mut self, actor: ActorId, percent: f64)
        -> ScenarioResult<()>;

    fn tm_set_speed_difference_percent(&mut self, actor: ActorId, percent: f64)
        -> ScenarioResult<()>;

    fn tm_set_automatic_lights(&mut self, actor: ActorId, enabled: bool) -> ScenarioResult<()>;
}

/// `"<make> <model> (id: N)"` for log lines, falling back to the bare id.
pub fn describe_vehicle<E: SimulationEnvironment + ?Sized>(env: &E, actor: ActorId) -> String {
    match env.actor_type_id(actor) {
        Some(type_id) => {
            let mut parts = type_id.splitn(3, '.');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(_), Some(make), Some(model)) => format!("{make} {model} (id: {actor})"),
                _ => format!("{type_id} (id: {actor})"),
            }
        }
        None => format!("vehicle (id: {actor})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn light_state_or_preserves_existing_bits() {
        let mut state = VehicleLightState::BRAKE;
        state |= VehicleLightState::LOW_BEAM | VehicleLightState::FOG;
        assert!(state.contains(VehicleLightState::BRAKE));
        assert!(state.contains(VehicleLightState::LOW_BEAM));
        assert!(state.contains(VehicleLightState::FOG));
        assert!(!state.contains(VehicleLightState::HIGH_BEAM));
    }

    #[test]
    fn set_attribute_declares_missing_attributes() {
        let mut bp = Blueprint::new("vehicle.audi.a2").with_attribute("color", "0,0,0", &["1,1,1"]);
        bp.set_attribute("color", "1,1,1");
        bp.set_attribute("role_name", "hero");
        assert_eq!(bp.attribute_value("color"), Some("1,1,1"));
        assert_eq!(bp.attribute_value("role_name"), Some("hero"));
        assert!(!bp.has_attribute("driver_id"));
    }

    #[test]
    fn spawn_command_builder_sets_follow_ups() {
        let cmd = SpawnCommand::new(Blueprint::new("controller.ai.walker"), Transform::default())
            .attached_to(ActorId(4))
            .then_autopilot(8000);
        assert_eq!(cmd.parent, Some(ActorId(4)));
        assert_eq!(cmd.autopilot_port, Some(8000));
    }
}
