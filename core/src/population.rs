//! Registries of every actor this run spawned.
//!
//! RULE: The orchestrator is the single mutator. Registries grow during the
//! spawn phase and the tick loop, never shrink except through `drain_*`,
//! which teardown calls exactly once.

use crate::types::ActorId;
use serde::{Deserialize, Serialize};

/// A pedestrian body and, if its controller spawned, the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PedestrianEntry {
    pub body: ActorId,
    pub controller: Option<ActorId>,
    /// Precomputed max speed in m/s, from the body blueprint.
    pub speed: f64,
}

impl PedestrianEntry {
    pub fn is_paired(&self) -> bool {
        self.controller.is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PopulationRegistry {
    vehicles: Vec<ActorId>,
    pedestrians: Vec<PedestrianEntry>,
}

impl PopulationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Vehicles ───────────────────────────────────────────────

    /// Append in spawn order. Returns false (and keeps the registry
    /// unchanged) if the id is already tracked.
    pub fn register_vehicle(&mut self, id: ActorId) -> bool {
        if self.vehicles.contains(&id) {
            log::warn!("vehicle {id} already registered, ignoring duplicate");
            return false;
        }
        self.vehicles.push(id);
        true
    }

    pub fn vehicles(&self) -> &[ActorId] {
        &self.vehicles
    }

    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    pub fn drain_vehicles(&mut self) -> Vec<ActorId> {
        std::mem::take(&mut self.vehicles)
    }

    // ── Pedestrians ────────────────────────────────────────────

    pub fn register_pedestrian(&mut self, body: ActorId, speed: f64) -> usize {
        self.pedestrians.push(PedestrianEntry {
            body,
            controller: None,
            speed,
        });
        self.pedestrians.len() - 1
    }

    /// Pair the entry at `index` with its controller.
    pub fn attach_controller(&mut self, index: usize, controller: ActorId) {
        if let Some(entry) = self.pedestrians.get_mut(index) {
            entry.controller = Some(controller);
        }
    }

    pub fn pedestrians(&self) -> &[PedestrianEntry] {
        &self.pedestrians
    }

    pub fn paired(&self) -> impl Iterator<Item = (ActorId, &PedestrianEntry)> {
        self.pedestrians
            .iter()
            .filter_map(|entry| entry.controller.map(|c| (c, entry)))
    }

    pub fn controller_count(&self) -> usize {
        self.pedestrians.iter().filter(|e| e.is_paired()).count()
    }

    /// `[controller, body, controller, body, ..., unpaired bodies]`.
    ///
    /// Paired entries come first as interleaved pairs, so the list is
    /// even-length except for the unpaired tail.
    pub fn combined_pedestrian_ids(&self) -> Vec<ActorId> {
        let mut ids = Vec::with_capacity(self.pedestrians.len() * 2);
        for (controller, entry) in self.paired() {
            ids.push(controller);
            ids.push(entry.body);
        }
        ids.extend(
            self.pedestrians
                .iter()
                .filter(|e| !e.is_paired())
                .map(|e| e.body),
        );
        ids
    }

    pub fn drain_pedestrians(&mut self) -> Vec<PedestrianEntry> {
        std::mem::take(&mut self.pedestrians)
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty() && self.pedestrians.is_empty()
    }
}
