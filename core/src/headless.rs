//! HeadlessWorld — an in-process Simulation Environment.
//!
//! Keeps every actor in a map keyed by id and records each traffic-control
//! call per vehicle, so a run can be inspected after the fact. Nothing
//! moves; there is no physics. Faults are scripted up front through
//! `FaultPlan` and consumed in spawn order.

use crate::{
    environment::{
        Blueprint, Command, CommandResponse, LaneChangeDirection, SimulationEnvironment,
        SpawnCommand, VehicleLightState, WorldSettings,
    },
    error::{ScenarioError, ScenarioResult},
    rng::{SubsystemRng, SubsystemSlot},
    types::{ActorId, Location, Tick, Transform},
    weather::WeatherParameters,
};
use rand::Rng;
use std::collections::BTreeMap;

pub const DEFAULT_TRAFFIC_MANAGER_PORT: u16 = 8000;
const GRID_COLUMNS: usize = 20;
const GRID_SPACING: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActorKind {
    Vehicle,
    Walker,
    Controller,
    Other,
}

impl ActorKind {
    fn of(type_id: &str) -> Self {
        if type_id.starts_with("vehicle.") {
            Self::Vehicle
        } else if type_id.starts_with("walker.") {
            Self::Walker
        } else if type_id.starts_with("controller.") {
            Self::Controller
        } else {
            Self::Other
        }
    }
}

/// Last value of every traffic-control setting applied to one vehicle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrafficRecord {
    pub auto_lane_change: Option<bool>,
    pub forced_lane_change: Option<LaneChangeDirection>,
    pub ignore_lights_percent: Option<f64>,
    pub ignore_signs_percent: Option<f64>,
    pub speed_difference_percent: Option<f64>,
    pub automatic_lights: Option<bool>,
    pub path: Vec<Location>,
}

impl TrafficRecord {
    /// Whether any behavior trait was pushed to this vehicle.
    pub fn has_behavior(&self) -> bool {
        self.forced_lane_change.is_some()
            || self.ignore_lights_percent.is_some()
            || self.ignore_signs_percent.is_some()
            || self.speed_difference_percent.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControllerRecord {
    pub started: bool,
    pub stopped: bool,
    pub target: Option<Location>,
    pub max_speed: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActorRecord {
    pub blueprint: Blueprint,
    pub kind: ActorKind,
    pub transform: Transform,
    pub parent: Option<ActorId>,
    pub autopilot: bool,
    pub lights: VehicleLightState,
    pub traffic: TrafficRecord,
    pub controller: ControllerRecord,
}

/// Scripted failures. Each counter fails that many upcoming spawns of its kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultPlan {
    pub vehicle_failures: usize,
    pub walker_failures: usize,
    pub controller_failures: usize,
    pub single_spawn_failures: usize,
    pub navigation_misses: usize,
}

pub struct HeadlessWorld {
    spawn_points: Vec<Transform>,
    library: Vec<Blueprint>,
    actors: BTreeMap<ActorId, ActorRecord>,
    destroyed: Vec<(ActorId, ActorRecord)>,
    next_id: u32,
    tick: Tick,
    interrupt_after: Option<Tick>,
    settings: WorldSettings,
    weather: Option<WeatherParameters>,
    weather_pushes: usize,
    faults: FaultPlan,
    navigation: SubsystemRng,
    pedestrians_seed: Option<u64>,
    cross_factor: Option<f64>,
    tm_port: u16,
    tm_synchronous: bool,
    tm_lead_distance: Option<f64>,
    tm_seed: Option<u64>,
}

impl HeadlessWorld {
    /// A world with `spawn_points` grid transforms and the stock library.
    pub fn new(spawn_points: usize) -> Self {
        let spawn_points = (0..spawn_points)
            .map(|i| {
                Transform::new(
                    Location::new(
                        (i % GRID_COLUMNS) as f64 * GRID_SPACING,
                        (i / GRID_COLUMNS) as f64 * GRID_SPACING,
                        0.3,
                    ),
                    90.0 * (i % 4) as f64,
                )
            })
            .collect();
        Self {
            spawn_points,
            library: stock_library(),
            actors: BTreeMap::new(),
            destroyed: Vec::new(),
            next_id: 1,
            tick: 0,
            interrupt_after: None,
            settings: WorldSettings::free_running(),
            weather: None,
            weather_pushes: 0,
            faults: FaultPlan::default(),
            navigation: SubsystemRng::new(0, SubsystemSlot::Navigation as u64).with_name("navigation"),
            pedestrians_seed: None,
            cross_factor: None,
            tm_port: DEFAULT_TRAFFIC_MANAGER_PORT,
            tm_synchronous: false,
            tm_lead_distance: None,
            tm_seed: None,
        }
    }

    /// Vehicles already on the map before any scenario starts.
    pub fn with_background_vehicles(mut self, count: usize) -> Self {
        let template = Blueprint::new("vehicle.audi.a2").with_attribute("base_type", "car", &[]);
        for i in 0..count {
            let transform = self.spawn_points.get(i).copied().unwrap_or_default();
            self.insert_actor(template.clone(), transform, None);
        }
        self
    }

    pub fn with_faults(mut self, faults: FaultPlan) -> Self {
        self.faults = faults;
        self
    }

    /// Let `ticks` steps succeed, then deliver an interrupt on every later step.
    pub fn interrupt_after(mut self, ticks: Tick) -> Self {
        self.interrupt_after = Some(ticks);
        self
    }

    // ── Inspection ─────────────────────────────────────────────

    pub fn current_tick(&self) -> Tick {
        self.tick
    }

    pub fn actor(&self, id: ActorId) -> Option<&ActorRecord> {
        self.actors.get(&id)
    }

    pub fn live_count(&self, kind: ActorKind) -> usize {
        self.actors.values().filter(|a| a.kind == kind).count()
    }

    pub fn destroyed_count(&self, kind: ActorKind) -> usize {
        self.destroyed.iter().filter(|(_, r)| r.kind == kind).count()
    }

    pub fn destroyed(&self, kind: ActorKind) -> impl Iterator<Item = (ActorId, &ActorRecord)> {
        self.destroyed
            .iter()
            .filter(move |(_, r)| r.kind == kind)
            .map(|(id, r)| (*id, r))
    }

    pub fn destroyed_ids(&self) -> Vec<ActorId> {
        self.destroyed.iter().map(|(id, _)| *id).collect()
    }

    pub fn weather(&self) -> Option<&WeatherParameters> {
        self.weather.as_ref()
    }

    pub fn weather_pushes(&self) -> usize {
        self.weather_pushes
    }

    pub fn pedestrians_seed(&self) -> Option<u64> {
        self.pedestrians_seed
    }

    pub fn cross_factor(&self) -> Option<f64> {
        self.cross_factor
    }

    pub fn traffic_manager_synchronous(&self) -> bool {
        self.tm_synchronous
    }

    pub fn lead_vehicle_distance(&self) -> Option<f64> {
        self.tm_lead_distance
    }

    pub fn traffic_manager_seed(&self) -> Option<u64> {
        self.tm_seed
    }

    /// Overwrite a vehicle's light bits directly, as the simulator would
    /// when it brakes.
    pub fn force_light_state(&mut self, actor: ActorId, state: VehicleLightState) {
        if let Some(record) = self.actors.get_mut(&actor) {
            record.lights = state;
        }
    }

    // ── Internals ──────────────────────────────────────────────

    fn insert_actor(&mut self, blueprint: Blueprint, transform: Transform, parent: Option<ActorId>) -> ActorId {
        let id = ActorId(self.next_id);
        self.next_id += 1;
        let kind = ActorKind::of(&blueprint.id);
        self.actors.insert(
            id,
            ActorRecord {
                blueprint,
                kind,
                transform,
                parent,
                autopilot: false,
                lights: VehicleLightState::NONE,
                traffic: TrafficRecord::default(),
                controller: ControllerRecord::default(),
            },
        );
        id
    }

    fn spawn(&mut self, command: SpawnCommand) -> CommandResponse {
        let kind = ActorKind::of(&command.blueprint.id);
        let budget = match kind {
            ActorKind::Vehicle => &mut self.faults.vehicle_failures,
            ActorKind::Walker => &mut self.faults.walker_failures,
            ActorKind::Controller => &mut self.faults.controller_failures,
            ActorKind::Other => return Err(format!("unknown blueprint {}", command.blueprint.id)),
        };
        if *budget > 0 {
            *budget -= 1;
            return Err("Spawn failed because of collision at spawn position".to_string());
        }
        if let Some(parent) = command.parent {
            if !self.actors.contains_key(&parent) {
                return Err(format!("parent actor {parent} not found"));
            }
        }

        let id = self.insert_actor(command.blueprint, command.transform, command.parent);
        if let (Some(_), ActorKind::Vehicle) = (command.autopilot_port, kind) {
            if let Some(record) = self.actors.get_mut(&id) {
                record.autopilot = true;
            }
        }
        Ok(id)
    }

    fn destroy(&mut self, id: ActorId) -> CommandResponse {
        match self.actors.remove(&id) {
            Some(record) => {
                self.destroyed.push((id, record));
                Ok(id)
            }
            None => Err(format!("actor {id} not found")),
        }
    }

    fn record_mut(&mut self, actor: ActorId) -> ScenarioResult<&mut ActorRecord> {
        self.actors
            .get_mut(&actor)
            .ok_or_else(|| ScenarioError::Environment(format!("actor {actor} not found")))
    }

    fn vehicle_mut(&mut self, actor: ActorId) -> ScenarioResult<&mut ActorRecord> {
        let record = self.record_mut(actor)?;
        if record.kind != ActorKind::Vehicle {
            return Err(ScenarioError::Environment(format!("actor {actor} is not a vehicle")));
        }
        Ok(record)
    }

    fn controller_mut(&mut self, actor: ActorId) -> ScenarioResult<&mut ControllerRecord> {
        let record = self.record_mut(actor)?;
        if record.kind != ActorKind::Controller {
            return Err(ScenarioError::Environment(format!("actor {actor} is not a controller")));
        }
        Ok(&mut record.controller)
    }
}

impl SimulationEnvironment for HeadlessWorld {
    fn settings(&self) -> ScenarioResult<WorldSettings> {
        Ok(self.settings.clone())
    }

    fn apply_settings(&mut self, settings: &WorldSettings) -> ScenarioResult<()> {
        self.settings = settings.clone();
        Ok(())
    }

    fn tick(&mut self) -> ScenarioResult<Tick> {
        if self.interrupt_after.is_some_and(|limit| self.tick >= limit) {
            return Err(ScenarioError::Interrupted);
        }
        self.tick += 1;
        Ok(self.tick)
    }

    fn spawn_points(&self) -> ScenarioResult<Vec<Transform>> {
        Ok(self.spawn_points.clone())
    }

    fn filter_blueprints(&self, pattern: &str) -> ScenarioResult<Vec<Blueprint>> {
        Ok(self
            .library
            .iter()
            .filter(|bp| glob_match(pattern, &bp.id))
            .cloned()
            .collect())
    }

    fn find_blueprint(&self, id: &str) -> ScenarioResult<Option<Blueprint>> {
        Ok(self.library.iter().find(|bp| bp.id == id).cloned())
    }

    fn apply_batch_sync(&mut self, batch: Vec<Command>) -> ScenarioResult<Vec<CommandResponse>> {
        Ok(batch
            .into_iter()
            .map(|command| match command {
                Command::Spawn(spawn) => self.spawn(spawn),
                Command::Destroy(id) => self.destroy(id),
            })
            .collect())
    }

    fn apply_batch(&mut self, batch: Vec<Command>) -> ScenarioResult<()> {
        for response in self.apply_batch_sync(batch)? {
            if let Err(cause) = response {
                log::debug!("headless: batch item dropped: {cause}");
            }
        }
        Ok(())
    }

    fn try_spawn_actor(
        &mut self,
        blueprint: &Blueprint,
        transform: &Transform,
    ) -> ScenarioResult<Option<ActorId>> {
        if self.faults.single_spawn_failures > 0 {
            self.faults.single_spawn_failures -= 1;
            return Ok(None);
        }
        Ok(self.spawn(SpawnCommand::new(blueprint.clone(), *transform)).ok())
    }

    fn vehicle_actors(&self) -> ScenarioResult<Vec<ActorId>> {
        Ok(self
            .actors
            .iter()
            .filter(|(_, a)| a.kind == ActorKind::Vehicle)
            .map(|(id, _)| *id)
            .collect())
    }

    fn actor_type_id(&self, actor: ActorId) -> Option<String> {
        self.actors.get(&actor).map(|a| a.blueprint.id.clone())
    }

    fn set_autopilot(&mut self, actor: ActorId, enabled: bool, tm_port: u16) -> ScenarioResult<()> {
        if tm_port != self.tm_port {
            return Err(ScenarioError::Environment(format!(
                "no traffic manager on port {tm_port}"
            )));
        }
        self.vehicle_mut(actor)?.autopilot = enabled;
        Ok(())
    }

    fn light_state(&self, actor: ActorId) -> ScenarioResult<VehicleLightState> {
        self.actors
            .get(&actor)
            .filter(|a| a.kind == ActorKind::Vehicle)
            .map(|a| a.lights)
            .ok_or_else(|| ScenarioError::Environment(format!("vehicle {actor} not found")))
    }

    fn set_light_state(&mut self, actor: ActorId, state: VehicleLightState) -> ScenarioResult<()> {
        self.vehicle_mut(actor)?.lights = state;
        Ok(())
    }

    fn random_navigable_location(&mut self) -> Option<Location> {
        if self.faults.navigation_misses > 0 {
            self.faults.navigation_misses -= 1;
            return None;
        }
        let span = GRID_COLUMNS as f64 * GRID_SPACING;
        Some(Location::new(
            self.navigation.gen_range(0.0..span),
            self.navigation.gen_range(0.0..span),
            1.0,
        ))
    }

    fn set_weather(&mut self, weather: &WeatherParameters) -> ScenarioResult<()> {
        self.weather = Some(*weather);
        self.weather_pushes += 1;
        Ok(())
    }

    fn set_pedestrians_seed(&mut self, seed: u64) -> ScenarioResult<()> {
        self.pedestrians_seed = Some(seed);
        self.navigation.reseed(seed);
        Ok(())
    }

    fn set_pedestrians_cross_factor(&mut self, factor: f64) -> ScenarioResult<()> {
        self.cross_factor = Some(factor);
        Ok(())
    }

    fn start_controller(&mut self, controller: ActorId) -> ScenarioResult<()> {
        self.controller_mut(controller)?.started = true;
        Ok(())
    }

    fn stop_controller(&mut self, controller: ActorId) -> ScenarioResult<()> {
        self.controller_mut(controller)?.stopped = true;
        Ok(())
    }

    fn controller_go_to(&mut self, controller: ActorId, target: Location) -> ScenarioResult<()> {
        self.controller_mut(controller)?.target = Some(target);
        Ok(())
    }

    fn controller_set_max_speed(&mut self, controller: ActorId, speed: f64) -> ScenarioResult<()> {
        self.controller_mut(controller)?.max_speed = Some(speed);
        Ok(())
    }

    fn traffic_manager_port(&self) -> u16 {
        self.tm_port
    }

    fn tm_set_synchronous_mode(&mut self, enabled: bool) -> ScenarioResult<()> {
        self.tm_synchronous = enabled;
        Ok(())
    }

    fn tm_set_lead_vehicle_distance(&mut self, metres: f64) -> ScenarioResult<()> {
        self.tm_lead_distance = Some(metres);
        Ok(())
    }

    fn tm_set_random_seed(&mut self, seed: u64) -> ScenarioResult<()> {
        self.tm_seed = Some(seed);
        Ok(())
    }

    fn tm_set_path(&mut self, actor: ActorId, path: &[Location]) -> ScenarioResult<()> {
        self.vehicle_mut(actor)?.traffic.path = path.to_vec();
        Ok(())
    }

    fn tm_set_auto_lane_change(&mut self, actor: ActorId, enabled: bool) -> ScenarioResult<()> {
        self.vehicle_mut(actor)?.traffic.auto_lane_change = Some(enabled);
        Ok(())
    }

    fn tm_force_lane_change(
        &mut self,
        actor: ActorId,
        direction: LaneChangeDirection,
    ) -> ScenarioResult<()> {
        self.vehicle_mut(actor)?.traffic.forced_lane_change = Some(direction);
        Ok(())
    }

    fn tm_set_ignore_lights_percent(&mut self, actor: ActorId, percent: f64) -> ScenarioResult<()> {
        self.vehicle_mut(actor)?.traffic.ignore_lights_percent = Some(percent);
        Ok(())
    }

    fn tm_set_ignore_signs_percent(&mut self, actor: ActorId, percent: f64) -> ScenarioResult<()> {
        self.vehicle_mut(actor)?.traffic.ignore_signs_percent = Some(percent);
        Ok(())
    }

    fn tm_set_speed_difference_percent(&mut self, actor: ActorId, percent: f64) -> ScenarioResult<()> {
        self.vehicle_mut(actor)?.traffic.speed_difference_percent = Some(percent);
        Ok(())
    }

    fn tm_set_automatic_lights(&mut self, actor: ActorId, enabled: bool) -> ScenarioResult<()> {
        self.vehicle_mut(actor)?.traffic.automatic_lights = Some(enabled);
        Ok(())
    }
}

/// Wildcard match over the whole id: `*` spans any run, `?` one character.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            backtrack = Some((pi, ti));
            pi += 1;
        } else if let Some((star, matched)) = backtrack {
            pi = star + 1;
            ti = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|c| *c == '*')
}

fn stock_library() -> Vec<Blueprint> {
    const COLORS: &[&str] = &["17,37,103", "255,255,255", "0,0,0", "140,0,0"];
    const WALKER_SPEEDS: &[&str] = &["0.0", "1.3", "2.6"];

    let vehicle = |id: &str, base_type: &str, generation: &str| {
        Blueprint::new(id)
            .with_attribute("base_type", base_type, &[])
            .with_attribute("generation", generation, &[])
    };
    let walker = |id: &str, generation: &str| {
        Blueprint::new(id)
            .with_attribute("generation", generation, &[])
            .with_attribute("is_invincible", "true", &["true", "false"])
    };

    vec![
        vehicle("vehicle.audi.a2", "car", "1").with_attribute("color", COLORS[0], COLORS),
        vehicle("vehicle.tesla.model3", "car", "2").with_attribute("color", COLORS[1], COLORS),
        vehicle("vehicle.lincoln.mkz_2020", "car", "2"),
        vehicle("vehicle.carlamotors.carlacola", "truck", "1"),
        vehicle("vehicle.harley-davidson.low_rider", "motorcycle", "2")
            .with_attribute("color", COLORS[2], COLORS)
            .with_attribute("driver_id", "0", &["0", "1", "2"]),
        vehicle("vehicle.bh.crossbike", "bicycle", "1"),
        walker("walker.pedestrian.0001", "2").with_attribute("speed", "1.3", WALKER_SPEEDS),
        walker("walker.pedestrian.0002", "2").with_attribute("speed", "1.3", WALKER_SPEEDS),
        walker("walker.pedestrian.0030", "1"),
        Blueprint::new("controller.ai.walker"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_matches_whole_ids() {
        assert!(glob_match("vehicle.*", "vehicle.audi.a2"));
        assert!(glob_match("walker.pedestrian.000?", "walker.pedestrian.0002"));
        assert!(glob_match("*model3", "vehicle.tesla.model3"));
        assert!(!glob_match("vehicle.*", "walker.pedestrian.0001"));
        assert!(!glob_match("vehicle.tesla", "vehicle.tesla.model3"));
    }

    #[test]
    fn batch_responses_follow_submission_order() {
        let mut world = HeadlessWorld::new(4).with_faults(FaultPlan {
            vehicle_failures: 1,
            ..Default::default()
        });
        let bp = world.find_blueprint("vehicle.audi.a2").unwrap().unwrap();
        let batch = (0..3)
            .map(|_| Command::Spawn(SpawnCommand::new(bp.clone(), Transform::default())))
            .collect();
        let responses = world.apply_batch_sync(batch).unwrap();
        assert_eq!(responses.len(), 3);
        assert!(responses[0].is_err());
        assert!(responses[1].is_ok() && responses[2].is_ok());
    }

    #[test]
    fn interrupt_fires_after_scripted_ticks() {
        let mut world = HeadlessWorld::new(1).interrupt_after(2);
        assert_eq!(world.tick().unwrap(), 1);
        assert_eq!(world.tick().unwrap(), 2);
        assert!(matches!(world.tick(), Err(ScenarioError::Interrupted)));
    }

    #[test]
    fn controllers_need_a_live_parent() {
        let mut world = HeadlessWorld::new(1);
        let controller = world.find_blueprint("controller.ai.walker").unwrap().unwrap();
        let responses = world
            .apply_batch_sync(vec![Command::Spawn(
                SpawnCommand::new(controller, Transform::default()).attached_to(ActorId(99)),
            )])
            .unwrap();
        assert!(responses[0].is_err());
    }
}
