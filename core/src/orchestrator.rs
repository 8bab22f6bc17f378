//! The scenario orchestrator — startup, tick loop, teardown.
//!
//! STARTUP ORDER (fixed, each step depends on the previous):
//!   1. Synchronous stepping + global traffic-control settings
//!   2. Blueprint resolution (PopulationSpawner), congestion routes
//!   3. `default` only: auto lane change off on pre-existing vehicles
//!   4. Vehicles (skipped when congestion is injected)
//!   5. Behavior mask or full-aggression override
//!   6. Automatic lights for the fleet unless car lights are disabled
//!   7. Pedestrians
//!   8. Weather preset
//!
//! RULES:
//!   - Configuration errors surface before any actor is spawned.
//!   - The tick loop ends only when the environment delivers an interrupt.
//!   - Teardown runs exactly once, on every exit path including panics.
//!   - The orchestrator is the only mutator of the registry.

use crate::{
    behavior::{BehaviorMask, BehaviorProfileAssigner, BehaviorTally},
    clock::SimClock,
    config::ScenarioConfig,
    congestion::{CongestionInjector, InjectionOptions, TickOutcome},
    environment::{Blueprint, Command, SimulationEnvironment, WorldSettings},
    error::{ScenarioError, ScenarioResult},
    event::{EventLogEntry, ScenarioEvent},
    population::PopulationRegistry,
    rng::{seed_from_clock, RngBank, SubsystemRng, SubsystemSlot},
    scenario::Scenario,
    spawner::{PopulationSpawner, SpawnFailure, SpawnPhase, VehicleSpawnOptions},
    store::EventJournal,
    types::{RunId, Tick},
    weather::{WeatherManager, WeatherPreset},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PopulationRequest {
    pub vehicles: usize,
    pub walkers: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BehaviorFlags {
    /// Replace the scenario's mask with every trait enabled.
    pub aggression: bool,
    /// Inject congestion regardless of scenario.
    pub congestion: bool,
    /// Cars only.
    pub safe: bool,
    pub hero: bool,
    pub disable_car_lights: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunRequest {
    pub scenario: Scenario,
    pub population: PopulationRequest,
    pub flags: BehaviorFlags,
    pub weather: WeatherPreset,
    /// Master seed; also forwarded to traffic control when set.
    pub seed: Option<u64>,
    /// Pedestrian seed; 0 leaves the environment's own seed alone.
    pub walker_seed: u64,
}

impl RunRequest {
    pub fn injects_congestion(&self) -> bool {
        self.scenario.injects_congestion() || self.flags.congestion
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TeardownSummary {
    pub vehicles_destroyed: usize,
    pub bodies_destroyed: usize,
    pub controllers_destroyed: usize,
    pub controllers_stopped: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub scenario: Scenario,
    pub seed: u64,
    pub ticks: Tick,
    pub vehicles_spawned: usize,
    pub vehicle_spawn_failures: usize,
    pub pedestrians_spawned: usize,
    pub controllers_spawned: usize,
    pub behavior: Option<BehaviorTally>,
    pub weather: WeatherPreset,
    pub congestion_injections: usize,
    pub teardown: TeardownSummary,
}

/// Per-run state the tick loop needs after startup.
struct LoopContext {
    injector: Option<CongestionInjector>,
    blueprints: Vec<Blueprint>,
    congestion_rng: SubsystemRng,
    injection: InjectionOptions,
}

pub struct ScenarioOrchestrator<'e, E: SimulationEnvironment> {
    pub run_id: RunId,
    pub clock: SimClock,
    env: &'e mut E,
    config: ScenarioConfig,
    journal: EventJournal,
    registry: PopulationRegistry,
    weather: WeatherManager,
    summary: RunSummary,
    started: bool,
    torn_down: bool,
}

impl<'e, E: SimulationEnvironment> ScenarioOrchestrator<'e, E> {
    pub fn new(run_id: RunId, env: &'e mut E, config: ScenarioConfig, journal: EventJournal) -> Self {
        Self {
            clock: SimClock::new(run_id.clone(), config.fixed_delta_seconds),
            summary: RunSummary {
                run_id: run_id.clone(),
                ..Default::default()
            },
            run_id,
            env,
            config,
            journal,
            registry: PopulationRegistry::new(),
            weather: WeatherManager::new(),
            started: false,
            torn_down: false,
        }
    }

    pub fn registry(&self) -> &PopulationRegistry {
        &self.registry
    }

    pub fn journal(&self) -> &EventJournal {
        &self.journal
    }

    pub fn weather(&self) -> &WeatherManager {
        &self.weather
    }

    /// Run startup and the tick loop until interrupted, then tear down.
    /// Blocks for the whole run.
    pub fn run(&mut self, request: &RunRequest) -> ScenarioResult<RunSummary> {
        if self.started {
            return Err(ScenarioError::StateOrdering {
                operation: "run a scenario",
                required: "a fresh orchestrator",
            });
        }
        self.started = true;

        let result = match self.startup(request) {
            Ok(mut ctx) => self.tick_loop(&mut ctx),
            Err(ScenarioError::Interrupted) => {
                log::info!("Interrupted during startup");
                Ok(())
            }
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            log::error!("Run {} aborted: {e}", self.run_id);
        }

        self.summary.teardown = self.teardown();
        result.map(|()| self.summary.clone())
    }

    fn startup(&mut self, request: &RunRequest) -> ScenarioResult<LoopContext> {
        let seed = request.seed.unwrap_or_else(seed_from_clock);
        self.summary.scenario = request.scenario;
        self.summary.seed = seed;
        self.journal
            .insert_run(&self.run_id, request.scenario.name(), seed, env!("CARGO_PKG_VERSION"))?;
        self.record(
            "orchestrator",
            &ScenarioEvent::RunInitialized {
                run_id: self.run_id.clone(),
                scenario: request.scenario,
                seed,
            },
        )?;

        let bank = RngBank::new(seed);
        let mut vehicle_rng = bank.for_slot(SubsystemSlot::Vehicles);
        let mut pedestrian_rng = bank.for_slot(SubsystemSlot::Pedestrians);
        let mut behavior_rng = bank.for_slot(SubsystemSlot::Behavior);

        // 1. Stepping and global traffic control.
        let mut settings = self.env.settings()?;
        settings.synchronous_mode = true;
        settings.fixed_delta_seconds = Some(self.config.fixed_delta_seconds);
        self.env.apply_settings(&settings)?;
        self.env.tm_set_synchronous_mode(true)?;
        self.env
            .tm_set_lead_vehicle_distance(self.config.lead_vehicle_distance)?;
        if let Some(seed) = request.seed {
            self.env.tm_set_random_seed(seed)?;
        }
        if request.walker_seed != 0 {
            self.env.set_pedestrians_seed(request.walker_seed)?;
            pedestrian_rng.reseed(request.walker_seed);
        }

        // 2. Everything that can fail on configuration, before any spawn.
        let spawner =
            PopulationSpawner::new(&*self.env, &self.config.catalog, &self.config.pedestrians)?;
        let injector = if request.injects_congestion() {
            let spawn_points = self.env.spawn_points()?;
            Some(CongestionInjector::new(&spawn_points, &self.config.congestion)?)
        } else {
            None
        };

        // 3. Baseline traffic.
        if request.scenario.disables_auto_lane_change() {
            for vehicle in self.env.vehicle_actors()? {
                self.env.tm_set_auto_lane_change(vehicle, false)?;
            }
        }

        // 4-6. Fleet.
        if injector.is_none() {
            let report = spawner.spawn_vehicles(
                &mut *self.env,
                &mut self.registry,
                &mut vehicle_rng,
                VehicleSpawnOptions {
                    count: request.population.vehicles,
                    safe_mode: request.flags.safe,
                    hero: request.flags.hero,
                },
            )?;
            self.summary.vehicles_spawned = report.spawned.len();
            self.summary.vehicle_spawn_failures = report.failures.len();
            self.record(
                "spawner",
                &ScenarioEvent::VehiclesSpawned {
                    requested: report.requested,
                    spawned: report.spawned.len(),
                    failed: report.failures.len(),
                },
            )?;
            self.record_failures(&report.failures)?;

            let mask = if request.flags.aggression {
                BehaviorMask::FULL
            } else {
                request.scenario.behavior_mask()
            };
            if !mask.is_empty() {
                let tally = BehaviorProfileAssigner::apply_aggression_to_all(
                    &mut *self.env,
                    self.registry.vehicles(),
                    mask,
                    &mut behavior_rng,
                )?;
                self.summary.behavior = Some(tally);
                self.record("behavior", &ScenarioEvent::BehaviorAssigned { tally })?;
            }

            if !request.flags.disable_car_lights {
                for &vehicle in self.registry.vehicles() {
                    self.env.tm_set_automatic_lights(vehicle, true)?;
                }
            }
        } else {
            log::info!("Vehicle spawn skipped, congestion injects vehicles on the tick loop");
        }

        // 7. Pedestrians.
        let report = spawner.spawn_pedestrians(
            &mut *self.env,
            &mut self.registry,
            &mut pedestrian_rng,
            request.population.walkers,
        )?;
        self.summary.pedestrians_spawned = report.bodies;
        self.summary.controllers_spawned = report.controllers;
        self.record(
            "spawner",
            &ScenarioEvent::PedestriansSpawned {
                requested: report.requested,
                bodies: report.bodies,
                controllers: report.controllers,
            },
        )?;
        self.record_failures(&report.failures)?;

        // 8. Weather.
        let preset = request.scenario.weather_preset(request.weather);
        self.weather.set_weather(preset.weather);
        self.weather.set_time_of_day(preset.time)?;
        let vehicles_updated = self.weather.apply(&mut *self.env, self.registry.vehicles())?;
        self.summary.weather = preset;
        self.record(
            "weather",
            &ScenarioEvent::WeatherApplied {
                weather: preset.weather,
                time: preset.time,
                vehicles_updated,
            },
        )?;

        Ok(LoopContext {
            injector,
            blueprints: spawner.vehicle_blueprints().to_vec(),
            congestion_rng: bank.for_slot(SubsystemSlot::Congestion),
            injection: InjectionOptions {
                aggression: request.flags.aggression,
                automatic_lights: !request.flags.disable_car_lights,
            },
        })
    }

    fn tick_loop(&mut self, ctx: &mut LoopContext) -> ScenarioResult<()> {
        log::info!("Scenario {} running", self.summary.scenario);
        loop {
            match self.env.tick() {
                Ok(_) => {}
                Err(ScenarioError::Interrupted) => {
                    log::info!("Interrupted after {} ticks", self.clock.current_tick);
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
            let tick = self.clock.advance();
            self.summary.ticks = tick;

            let Some(injector) = ctx.injector.as_mut() else {
                continue;
            };
            let outcome = injector.on_tick(
                &mut *self.env,
                &mut self.registry,
                &ctx.blueprints,
                &mut ctx.congestion_rng,
                ctx.injection,
            )?;
            match outcome {
                TickOutcome::Injected { actor, route_index } => {
                    self.summary.congestion_injections += 1;
                    self.record(
                        "congestion",
                        &ScenarioEvent::CongestionInjected {
                            tick,
                            actor,
                            route_index,
                        },
                    )?;
                    // Lights on the new arrival must match the active weather.
                    self.weather.apply(&mut *self.env, self.registry.vehicles())?;
                }
                TickOutcome::SpawnFailed { route_index } => {
                    self.record(
                        "congestion",
                        &ScenarioEvent::SpawnFailed {
                            phase: SpawnPhase::Congestion,
                            index: route_index,
                            cause: "no actor returned".into(),
                        },
                    )?;
                }
                TickOutcome::Waiting { .. } | TickOutcome::CapReached { .. } => {}
            }
        }
    }

    /// Destroy everything this run spawned. Runs at most once; later calls
    /// return an empty summary.
    pub fn teardown(&mut self) -> TeardownSummary {
        let mut summary = TeardownSummary::default();
        if self.torn_down {
            return summary;
        }
        self.torn_down = true;

        if let Err(e) = self.env.apply_settings(&WorldSettings::free_running()) {
            log::error!("Teardown: cannot revert world settings: {e}");
        }
        if let Err(e) = self.env.tm_set_synchronous_mode(false) {
            log::error!("Teardown: cannot release traffic control from synchronous mode: {e}");
        }

        let vehicles = self.registry.drain_vehicles();
        if !vehicles.is_empty() {
            let count = vehicles.len();
            let batch = vehicles.into_iter().map(Command::Destroy).collect();
            match self.env.apply_batch(batch) {
                Ok(()) => summary.vehicles_destroyed = count,
                Err(e) => log::error!("Teardown: vehicle destroy batch failed: {e}"),
            }
        }

        let combined = self.registry.combined_pedestrian_ids();
        let paired: Vec<_> = self.registry.paired().map(|(controller, _)| controller).collect();
        for controller in &paired {
            match self.env.stop_controller(*controller) {
                Ok(()) => summary.controllers_stopped += 1,
                Err(e) => log::error!("Teardown: cannot stop controller {controller}: {e}"),
            }
        }
        let bodies = self.registry.drain_pedestrians().len();
        if !combined.is_empty() {
            let batch = combined.into_iter().map(Command::Destroy).collect();
            match self.env.apply_batch(batch) {
                Ok(()) => {
                    summary.bodies_destroyed = bodies;
                    summary.controllers_destroyed = paired.len();
                }
                Err(e) => log::error!("Teardown: pedestrian destroy batch failed: {e}"),
            }
        }

        if self.config.teardown_grace_ms > 0 {
            std::thread::sleep(Duration::from_millis(self.config.teardown_grace_ms));
        }

        log::info!(
            "Destroyed {} vehicles, {} pedestrians and {} pedestrian controllers",
            summary.vehicles_destroyed,
            summary.bodies_destroyed,
            summary.controllers_destroyed
        );
        let event = ScenarioEvent::TeardownCompleted {
            vehicles_destroyed: summary.vehicles_destroyed,
            bodies_destroyed: summary.bodies_destroyed,
            controllers_destroyed: summary.controllers_destroyed,
            controllers_stopped: summary.controllers_stopped,
        };
        if let Err(e) = self.record("orchestrator", &event) {
            log::error!("Teardown: cannot journal summary: {e}");
        }
        summary
    }

    fn record(&self, source: &str, event: &ScenarioEvent) -> ScenarioResult<()> {
        let entry = EventLogEntry::new(&self.run_id, self.clock.current_tick, source, event)?;
        self.journal.append_event(&entry)
    }

    fn record_failures(&self, failures: &[SpawnFailure]) -> ScenarioResult<()> {
        for failure in failures {
            self.record(
                "spawner",
                &ScenarioEvent::SpawnFailed {
                    phase: failure.phase,
                    index: failure.index,
                    cause: failure.cause.clone(),
                },
            )?;
        }
        Ok(())
    }
}

impl<E: SimulationEnvironment> Drop for ScenarioOrchestrator<'_, E> {
    fn drop(&mut self) {
        if self.started && !self.torn_down {
            self.teardown();
        }
    }
}
