//! Population spawner — vehicles and pedestrian/controller pairs.
//!
//! Every spawn goes out as one batched, order-preserving remote call.
//! A failed item is logged with its reported cause and excluded from the
//! registry. Nothing is retried at this layer.
//!
//! Pedestrians spawn in two phases (bodies, then one AI controller per
//! spawned body). One environment tick must pass between the controller
//! batch and the first controller call; the simulator does not know the
//! controllers' transforms before that.

use crate::{
    catalog::ActorCatalog,
    config::{CatalogConfig, PedestrianConfig},
    environment::{Blueprint, Command, SimulationEnvironment, SpawnCommand},
    error::{ScenarioError, ScenarioResult},
    population::PopulationRegistry,
    types::{ActorId, Transform},
};
use rand::{seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};

/// Body class allowed in safe mode.
pub const SAFE_BASE_TYPE: &str = "car";
pub const ROLE_HERO: &str = "hero";
pub const ROLE_AUTOPILOT: &str = "autopilot";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnPhase {
    Vehicle,
    PedestrianBody,
    PedestrianController,
    Congestion,
}

/// One batch item that the environment rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnFailure {
    pub phase: SpawnPhase,
    /// Position of the item in its batch.
    pub index: usize,
    pub cause: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VehicleSpawnOptions {
    pub count: usize,
    /// Restrict candidates to the `car` body class.
    pub safe_mode: bool,
    /// Give the first vehicle the hero role.
    pub hero: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VehicleSpawnReport {
    pub requested: usize,
    /// Set when the request exceeded the available spawn points.
    pub clamped_to: Option<usize>,
    pub spawned: Vec<ActorId>,
    pub failures: Vec<SpawnFailure>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PedestrianSpawnReport {
    pub requested: usize,
    /// Navigation samples that resolved to a location.
    pub located: usize,
    pub bodies: usize,
    pub controllers: usize,
    pub failures: Vec<SpawnFailure>,
}

pub struct PopulationSpawner {
    vehicle_blueprints: Vec<Blueprint>,
    walker_blueprints: Vec<Blueprint>,
    controller_blueprint: Blueprint,
    pedestrians: PedestrianConfig,
}

impl PopulationSpawner {
    /// Resolve every blueprint set up front. Fails before anything spawns.
    pub fn new<E: SimulationEnvironment + ?Sized>(
        env: &E,
        catalog: &CatalogConfig,
        pedestrians: &PedestrianConfig,
    ) -> ScenarioResult<Self> {
        let mut vehicle_blueprints =
            ActorCatalog::resolve(env, &catalog.vehicle_filter, &catalog.vehicle_generation)?;
        vehicle_blueprints.sort_by(|a, b| a.id.cmp(&b.id));
        let walker_blueprints =
            ActorCatalog::resolve(env, &catalog.walker_filter, &catalog.walker_generation)?;
        let controller_blueprint = env
            .find_blueprint(&catalog.walker_controller)?
            .ok_or_else(|| {
                ScenarioError::configuration(&catalog.walker_controller, "controller blueprint not found")
            })?;

        Ok(Self {
            vehicle_blueprints,
            walker_blueprints,
            controller_blueprint,
            pedestrians: pedestrians.clone(),
        })
    }

    pub fn vehicle_blueprints(&self) -> &[Blueprint] {
        &self.vehicle_blueprints
    }

    /// Spawn up to `options.count` autopiloted vehicles in one batch.
    ///
    /// Final registry growth = requested − batch failures − spawn-point
    /// clamp deficit.
    pub fn spawn_vehicles<E, R>(
        &self,
        env: &mut E,
        registry: &mut PopulationRegistry,
        rng: &mut R,
        options: VehicleSpawnOptions,
    ) -> ScenarioResult<VehicleSpawnReport>
    where
        E: SimulationEnvironment + ?Sized,
        R: Rng + ?Sized,
    {
        let candidates: Vec<&Blueprint> = self
            .vehicle_blueprints
            .iter()
            .filter(|bp| !options.safe_mode || bp.attribute_value("base_type") == Some(SAFE_BASE_TYPE))
            .collect();
        if candidates.is_empty() {
            return Err(ScenarioError::configuration(
                "base_type",
                "safe mode left no car blueprints",
            ));
        }

        let mut spawn_points = env.spawn_points()?;
        let mut report = VehicleSpawnReport {
            requested: options.count,
            ..Default::default()
        };
        let mut count = options.count;
        if count < spawn_points.len() {
            spawn_points.shuffle(rng);
        } else if count > spawn_points.len() {
            log::warn!(
                "requested {} vehicles, but could only find {} spawn points",
                count,
                spawn_points.len()
            );
            count = spawn_points.len();
            report.clamped_to = Some(count);
        }

        let port = env.traffic_manager_port();
        let mut hero = options.hero;
        let mut batch = Vec::with_capacity(count);
        for transform in spawn_points.iter().take(count) {
            let Some(template) = candidates.choose(rng) else {
                break;
            };
            let mut blueprint = (*template).clone();
            randomize_attribute(&mut blueprint, "color", rng);
            randomize_attribute(&mut blueprint, "driver_id", rng);
            if hero {
                blueprint.set_attribute("role_name", ROLE_HERO);
                hero = false;
            } else {
                blueprint.set_attribute("role_name", ROLE_AUTOPILOT);
            }
            batch.push(Command::Spawn(
                SpawnCommand::new(blueprint, *transform).then_autopilot(port),
            ));
        }

        let submitted = batch.len();
        let responses = env.apply_batch_sync(batch)?;
        check_response_count(SpawnPhase::Vehicle, submitted, responses.len());

        for (index, response) in responses.into_iter().enumerate() {
            match response {
                Ok(id) => {
                    if registry.register_vehicle(id) {
                        report.spawned.push(id);
                    }
                }
                Err(cause) => {
                    log::error!("vehicle spawn #{index} failed: {cause}");
                    report.failures.push(SpawnFailure {
                        phase: SpawnPhase::Vehicle,
                        index,
                        cause,
                    });
                }
            }
        }

        log::info!(
            "Spawned {} vehicles ({} requested, {} failed)",
            report.spawned.len(),
            report.requested,
            report.failures.len()
        );
        Ok(report)
    }

    /// Spawn up to `count` pedestrians with AI controllers and send every
    /// paired pedestrian walking towards a random destination.
    pub fn spawn_pedestrians<E, R>(
        &self,
        env: &mut E,
        registry: &mut PopulationRegistry,
        rng: &mut R,
        count: usize,
    ) -> ScenarioResult<PedestrianSpawnReport>
    where
        E: SimulationEnvironment + ?Sized,
        R: Rng + ?Sized,
    {
        let mut report = PedestrianSpawnReport {
            requested: count,
            ..Default::default()
        };

        // Phase 1: bodies at resolved navigable locations.
        let locations: Vec<_> = (0..count)
            .filter_map(|_| env.random_navigable_location())
            .collect();
        report.located = locations.len();
        if locations.len() < count {
            log::warn!(
                "{} of {} pedestrian locations did not resolve",
                count - locations.len(),
                count
            );
        }

        let running_fraction = self.pedestrians.running_fraction.clamp(0.0, 1.0);
        let mut speeds = Vec::with_capacity(locations.len());
        let mut batch = Vec::with_capacity(locations.len());
        for location in &locations {
            let Some(template) = self.walker_blueprints.choose(rng) else {
                break;
            };
            let mut blueprint = template.clone();
            if blueprint.has_attribute("is_invincible") {
                blueprint.set_attribute("is_invincible", "false");
            }
            let running = rng.gen_bool(running_fraction);
            speeds.push(walker_speed(&blueprint, running));
            batch.push(Command::Spawn(SpawnCommand::new(blueprint, Transform::at(*location))));
        }

        let mut new_entries = Vec::new();
        if !batch.is_empty() {
            let submitted = batch.len();
            let responses = env.apply_batch_sync(batch)?;
            check_response_count(SpawnPhase::PedestrianBody, submitted, responses.len());
            for (index, response) in responses.into_iter().enumerate() {
                match response {
                    Ok(body) => {
                        let speed = speeds.get(index).copied().unwrap_or(0.0);
                        new_entries.push((registry.register_pedestrian(body, speed), body));
                    }
                    Err(cause) => {
                        log::error!("pedestrian spawn #{index} failed: {cause}");
                        report.failures.push(SpawnFailure {
                            phase: SpawnPhase::PedestrianBody,
                            index,
                            cause,
                        });
                    }
                }
            }
        }
        report.bodies = new_entries.len();

        // Phase 2: one controller per spawned body.
        let batch: Vec<_> = new_entries
            .iter()
            .map(|(_, body)| {
                Command::Spawn(
                    SpawnCommand::new(self.controller_blueprint.clone(), Transform::default())
                        .attached_to(*body),
                )
            })
            .collect();
        let mut paired = Vec::new();
        if !batch.is_empty() {
            let submitted = batch.len();
            let responses = env.apply_batch_sync(batch)?;
            check_response_count(SpawnPhase::PedestrianController, submitted, responses.len());
            for ((entry, body), (index, response)) in
                new_entries.iter().zip(responses.into_iter().enumerate())
            {
                match response {
                    Ok(controller) => {
                        registry.attach_controller(*entry, controller);
                        paired.push(*entry);
                    }
                    Err(cause) => {
                        log::error!("controller spawn #{index} for pedestrian {body} failed: {cause}");
                        report.failures.push(SpawnFailure {
                            phase: SpawnPhase::PedestrianController,
                            index,
                            cause,
                        });
                    }
                }
            }
        }
        report.controllers = paired.len();

        if !paired.is_empty() {
            // Controllers are only queryable after the environment has ticked.
            env.tick()?;
            env.set_pedestrians_cross_factor(self.pedestrians.crossing_factor)?;
            for &index in &paired {
                let entry = &registry.pedestrians()[index];
                let Some(controller) = entry.controller else {
                    continue;
                };
                env.start_controller(controller)?;
                match env.random_navigable_location() {
                    Some(target) => env.controller_go_to(controller, target)?,
                    None => log::warn!("no destination resolved for pedestrian {}", entry.body),
                }
                env.controller_set_max_speed(controller, entry.speed)?;
            }
        }

        log::info!(
            "Spawned {} pedestrians ({} with controllers, {} requested)",
            report.bodies,
            report.controllers,
            report.requested
        );
        Ok(report)
    }
}

/// Pick one of the attribute's recommended values, if it has any.
fn randomize_attribute<R: Rng + ?Sized>(blueprint: &mut Blueprint, name: &str, rng: &mut R) {
    let choice = blueprint
        .attribute(name)
        .and_then(|attr| attr.recommended_values.choose(rng).cloned());
    if let Some(value) = choice {
        blueprint.set_attribute(name, value);
    }
}

/// Walking tier is recommended value [1], running is [2].
fn walker_speed(blueprint: &Blueprint, running: bool) -> f64 {
    let Some(attr) = blueprint.attribute("speed") else {
        log::warn!("Walker {} has no speed, defaulting to 0", blueprint.id);
        return 0.0;
    };
    let tier = if running { 2 } else { 1 };
    match attr.recommended_values.get(tier).and_then(|v| v.parse::<f64>().ok()) {
        Some(speed) => speed,
        None => {
            log::warn!("Walker {} has no usable speed tier {tier}, defaulting to 0", blueprint.id);
            0.0
        }
    }
}

fn check_response_count(phase: SpawnPhase, submitted: usize, received: usize) {
    if submitted != received {
        log::error!("{phase:?} batch: submitted {submitted} items but received {received} responses");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walker_speed_uses_walking_tier() {
        let bp = Blueprint::new("walker.pedestrian.0001")
            .with_attribute("speed", "1.3", &["0.0", "1.3", "2.6"]);
        assert_eq!(walker_speed(&bp, false), 1.3);
        assert_eq!(walker_speed(&bp, true), 2.6);
    }

    #[test]
    fn walker_without_speed_defaults_to_zero() {
        let bp = Blueprint::new("walker.pedestrian.0030");
        assert_eq!(walker_speed(&bp, false), 0.0);
    }

    #[test]
    fn randomize_attribute_picks_a_recommended_value() {
        let mut rng = crate::rng::SubsystemRng::new(3, 0);
        let mut bp = Blueprint::new("vehicle.audi.a2")
            .with_attribute("color", "0,0,0", &["10,10,10", "20,20,20"]);
        randomize_attribute(&mut bp, "color", &mut rng);
        let color = bp.attribute_value("color").unwrap();
        assert!(color == "10,10,10" || color == "20,20,20");

        randomize_attribute(&mut bp, "driver_id", &mut rng);
        assert!(!bp.has_attribute("driver_id"));
    }
}
