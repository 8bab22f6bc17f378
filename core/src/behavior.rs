//! Probabilistic driving-behavior traits.
//!
//! A profile is not stored: each call flips four fair coins, one per trait,
//! and pushes the traits that both fired and are enabled by the mask to the
//! traffic-control service for that one vehicle.

use crate::{
    environment::{describe_vehicle, LaneChangeDirection, SimulationEnvironment},
    error::ScenarioResult,
    types::ActorId,
};
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const IGNORE_LIGHTS_PERCENT: f64 = 100.0;
pub const IGNORE_SIGNS_PERCENT: f64 = 100.0;
/// Negative differential: drive ~20% over the posted limit.
pub const SPEED_DIFFERENCE_PERCENT: f64 = -20.0;

/// Which traits a scenario allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BehaviorMask {
    pub lane_change: bool,
    pub ignore_lights: bool,
    pub ignore_signs: bool,
    pub overspeed: bool,
}

impl BehaviorMask {
    pub const NONE: Self = Self {
        lane_change: false,
        ignore_lights: false,
        ignore_signs: false,
        overspeed: false,
    };

    /// Explicit aggression override: every trait enabled.
    pub const FULL: Self = Self {
        lane_change: true,
        ignore_lights: true,
        ignore_signs: true,
        overspeed: true,
    };

    pub fn is_empty(&self) -> bool {
        *self == Self::NONE
    }
}

/// Traits that actually fired for one vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BehaviorProfile {
    pub lane_change: Option<LaneChangeDirection>,
    pub ignore_lights: bool,
    pub ignore_signs: bool,
    pub overspeed: bool,
}

/// Fleet-wide tally of fired traits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BehaviorTally {
    pub vehicles: usize,
    pub lane_change: usize,
    pub ignore_lights: usize,
    pub ignore_signs: usize,
    pub overspeed: usize,
}

impl BehaviorTally {
    fn record(&mut self, profile: &BehaviorProfile) {
        self.vehicles += 1;
        self.lane_change += usize::from(profile.lane_change.is_some());
        self.ignore_lights += usize::from(profile.ignore_lights);
        self.ignore_signs += usize::from(profile.ignore_signs);
        self.overspeed += usize::from(profile.overspeed);
    }
}

pub struct BehaviorProfileAssigner;

impl BehaviorProfileAssigner {
    /// Roll and apply one vehicle's profile under `mask`.
    pub fn apply_aggression<E, R>(
        env: &mut E,
        vehicle: ActorId,
        mask: BehaviorMask,
        rng: &mut R,
    ) -> ScenarioResult<BehaviorProfile>
    where
        E: SimulationEnvironment + ?Sized,
        R: Rng + ?Sized,
    {
        // All four coins are always drawn so the stream does not depend on the mask.
        let flips = [
            rng.gen_bool(0.5),
            rng.gen_bool(0.5),
            rng.gen_bool(0.5),
            rng.gen_bool(0.5),
        ];
        let mut profile = BehaviorProfile::default();

        if mask.lane_change && flips[0] {
            let direction = if rng.gen_bool(0.5) {
                LaneChangeDirection::Right
            } else {
                LaneChangeDirection::Left
            };
            env.tm_force_lane_change(vehicle, direction)?;
            profile.lane_change = Some(direction);
            log::info!(
                "Vehicle \"{}\" has force lane change behavior",
                describe_vehicle(&*env, vehicle)
            );
        }
        if mask.ignore_lights && flips[1] {
            env.tm_set_ignore_lights_percent(vehicle, IGNORE_LIGHTS_PERCENT)?;
            profile.ignore_lights = true;
            log::info!(
                "Vehicle \"{}\" has a {IGNORE_LIGHTS_PERCENT:.1} percent chance of ignoring traffic lights",
                describe_vehicle(&*env, vehicle)
            );
        }
        if mask.ignore_signs && flips[2] {
            env.tm_set_ignore_signs_percent(vehicle, IGNORE_SIGNS_PERCENT)?;
            profile.ignore_signs = true;
            log::info!(
                "Vehicle \"{}\" has a {IGNORE_SIGNS_PERCENT:.1} percent chance of ignoring traffic signs",
                describe_vehicle(&*env, vehicle)
            );
        }
        if mask.overspeed && flips[3] {
            env.tm_set_speed_difference_percent(vehicle, SPEED_DIFFERENCE_PERCENT)?;
            profile.overspeed = true;
            log::info!(
                "Vehicle \"{}\" will drive {:.1} percent faster than the speed limit",
                describe_vehicle(&*env, vehicle),
                -SPEED_DIFFERENCE_PERCENT
            );
        }
        Ok(profile)
    }

    /// Same mask, independently re-rolled, for every vehicle in `vehicles`.
    pub fn apply_aggression_to_all<E, R>(
        env: &mut E,
        vehicles: &[ActorId],
        mask: BehaviorMask,
        rng: &mut R,
    ) -> ScenarioResult<BehaviorTally>
    where
        E: SimulationEnvironment + ?Sized,
        R: Rng + ?Sized,
    {
        let mut tally = BehaviorTally::default();
        for &vehicle in vehicles {
            let profile = Self::apply_aggression(env, vehicle, mask, rng)?;
            tally.record(&profile);
        }
        Ok(tally)
    }
}
