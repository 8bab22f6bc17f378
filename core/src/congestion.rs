//! Congestion injector — one vehicle per delay window along two fixed
//! routes, alternating between them.
//!
//! STATES:
//!   WAITING (counter > 0)  → decrement, nothing else.
//!   READY   (counter == 0) → at or over the cap: stay READY.
//!                            otherwise attempt one spawn; every attempt
//!                            counts as the first tick of the next delay
//!                            window, so attempts land `spawn_delay` apart.
//!
//! `alternate` selects both the spawn point and the route, and flips only
//! after a successful injection. A failed attempt retries the same
//! point/route after the next full delay.

use crate::{
    behavior::{BehaviorMask, BehaviorProfileAssigner},
    config::CongestionConfig,
    environment::{describe_vehicle, Blueprint, SimulationEnvironment},
    error::{ScenarioError, ScenarioResult},
    population::PopulationRegistry,
    types::{ActorId, Location, Transform},
};
use rand::{seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CongestionState {
    pub counter: u64,
    pub alternate: bool,
    pub cap: usize,
}

/// Follow-up settings for injected vehicles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InjectionOptions {
    /// Apply the full aggression mask to each injected vehicle.
    pub aggression: bool,
    /// Let traffic control manage the vehicle's lights.
    pub automatic_lights: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Waiting { remaining: u64 },
    CapReached { live: usize },
    Injected { actor: ActorId, route_index: usize },
    SpawnFailed { route_index: usize },
}

impl TickOutcome {
    pub fn injected(&self) -> Option<ActorId> {
        match self {
            Self::Injected { actor, .. } => Some(*actor),
            _ => None,
        }
    }
}

pub struct CongestionInjector {
    state: CongestionState,
    spawn_delay: u64,
    spawn_transforms: [Transform; 2],
    routes: [Vec<Location>; 2],
}

impl CongestionInjector {
    /// Precompute both spawn points and both route polylines.
    /// Fails if any configured index is outside the spawn-point list.
    pub fn new(spawn_points: &[Transform], config: &CongestionConfig) -> ScenarioResult<Self> {
        let lookup = |index: usize| {
            spawn_points.get(index).copied().ok_or_else(|| {
                ScenarioError::configuration(
                    "congestion",
                    format!(
                        "spawn point index {index} outside the {} available spawn points",
                        spawn_points.len()
                    ),
                )
            })
        };

        let spawn_transforms = [lookup(config.spawn_points[0])?, lookup(config.spawn_points[1])?];
        let mut routes: [Vec<Location>; 2] = [Vec::new(), Vec::new()];
        for (route, indices) in routes.iter_mut().zip(&config.routes) {
            for &index in indices {
                route.push(lookup(index)?.location);
            }
        }

        Ok(Self {
            state: CongestionState {
                counter: config.spawn_delay,
                alternate: false,
                cap: config.max_vehicles,
            },
            spawn_delay: config.spawn_delay,
            spawn_transforms,
            routes,
        })
    }

    pub fn state(&self) -> CongestionState {
        self.state
    }

    pub fn route(&self, index: usize) -> &[Location] {
        &self.routes[index.min(1)]
    }

    /// Advance the injector by one simulation step.
    pub fn on_tick<E, R>(
        &mut self,
        env: &mut E,
        registry: &mut PopulationRegistry,
        blueprints: &[Blueprint],
        rng: &mut R,
        options: InjectionOptions,
    ) -> ScenarioResult<TickOutcome>
    where
        E: SimulationEnvironment + ?Sized,
        R: Rng + ?Sized,
    {
        if self.state.counter > 0 {
            self.state.counter -= 1;
            return Ok(TickOutcome::Waiting {
                remaining: self.state.counter,
            });
        }

        let live = env.vehicle_actors()?.len().max(registry.vehicle_count());
        if live >= self.state.cap {
            log::debug!("congestion: {live} live vehicles, cap {} reached", self.state.cap);
            return Ok(TickOutcome::CapReached { live });
        }

        let route_index = usize::from(self.state.alternate);
        self.state.counter = self.spawn_delay.saturating_sub(1);

        let Some(template) = blueprints.choose(rng) else {
            return Err(ScenarioError::configuration(
                "congestion",
                "no vehicle blueprints to inject",
            ));
        };
        let transform = self.spawn_transforms[route_index];
        let Some(actor) = env.try_spawn_actor(template, &transform)? else {
            log::error!(
                "congestion spawn on route {route_index} failed: spawn point occupied or rejected"
            );
            return Ok(TickOutcome::SpawnFailed { route_index });
        };

        let port = env.traffic_manager_port();
        env.set_autopilot(actor, true, port)?;
        env.tm_set_auto_lane_change(actor, true)?;
        if options.aggression {
            BehaviorProfileAssigner::apply_aggression(env, actor, BehaviorMask::FULL, rng)?;
        }
        if options.automatic_lights {
            env.tm_set_automatic_lights(actor, true)?;
        }
        env.tm_set_path(actor, &self.routes[route_index])?;

        self.state.alternate = !self.state.alternate;
        registry.register_vehicle(actor);
        log::info!(
            "Injected \"{}\" on route {route_index} ({} tracked)",
            describe_vehicle(&*env, actor),
            registry.vehicle_count()
        );
        Ok(TickOutcome::Injected { actor, route_index })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(n: usize) -> Vec<Transform> {
        (0..n)
            .map(|i| Transform::at(Location::new(i as f64, 0.0, 0.0)))
            .collect()
    }

    #[test]
    fn routes_resolve_from_spawn_point_indices() {
        let injector = CongestionInjector::new(&grid(160), &CongestionConfig::default()).unwrap();
        assert_eq!(injector.route(0).len(), 6);
        assert_eq!(injector.route(1).len(), 9);
        assert_eq!(injector.route(0)[0], Location::new(21.0, 0.0, 0.0));
        assert_eq!(injector.route(1)[8], Location::new(147.0, 0.0, 0.0));
    }

    #[test]
    fn out_of_range_route_index_is_a_configuration_error() {
        let err = match CongestionInjector::new(&grid(100), &CongestionConfig::default()) {
            Err(e) => e,
            Ok(_) => panic!("route index 149 must not resolve on a 100-point map"),
        };
        assert!(err.is_fatal_configuration(), "got {err:?}");
    }

    #[test]
    fn initial_state_waits_full_delay() {
        let injector = CongestionInjector::new(&grid(160), &CongestionConfig::default()).unwrap();
        assert_eq!(
            injector.state(),
            CongestionState {
                counter: 20,
                alternate: false,
                cap: 200
            }
        );
    }
}
