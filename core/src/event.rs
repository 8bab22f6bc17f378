//! Run journal events.
//!
//! RULE: Every externally visible step of a run is recorded as exactly one
//! event. Variants are appended, never removed or reordered.

use crate::{
    behavior::BehaviorTally,
    scenario::Scenario,
    spawner::SpawnPhase,
    types::{ActorId, RunId, Tick},
    weather::{TimeOfDay, WeatherType},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioEvent {
    // ── Startup ────────────────────────────────────
    RunInitialized {
        run_id: RunId,
        scenario: Scenario,
        seed: u64,
    },
    VehiclesSpawned {
        requested: usize,
        spawned: usize,
        failed: usize,
    },
    PedestriansSpawned {
        requested: usize,
        bodies: usize,
        controllers: usize,
    },
    SpawnFailed {
        phase: SpawnPhase,
        index: usize,
        cause: String,
    },
    BehaviorAssigned {
        tally: BehaviorTally,
    },
    WeatherApplied {
        weather: WeatherType,
        time: TimeOfDay,
        vehicles_updated: usize,
    },

    // ── Tick loop ──────────────────────────────────
    CongestionInjected {
        tick: Tick,
        actor: ActorId,
        route_index: usize,
    },

    // ── Teardown ───────────────────────────────────
    TeardownCompleted {
        vehicles_destroyed: usize,
        bodies_destroyed: usize,
        controllers_destroyed: usize,
        controllers_stopped: usize,
    },
}

pub fn event_type_name(event: &ScenarioEvent) -> &'static str {
    match event {
        ScenarioEvent::RunInitialized { .. } => "run_initialized",
        ScenarioEvent::VehiclesSpawned { .. } => "vehicles_spawned",
        ScenarioEvent::PedestriansSpawned { .. } => "pedestrians_spawned",
        ScenarioEvent::SpawnFailed { .. } => "spawn_failed",
        ScenarioEvent::BehaviorAssigned { .. } => "behavior_assigned",
        ScenarioEvent::WeatherApplied { .. } => "weather_applied",
        ScenarioEvent::CongestionInjected { .. } => "congestion_injected",
        ScenarioEvent::TeardownCompleted { .. } => "teardown_completed",
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub run_id: RunId,
    pub tick: Tick,
    pub source: String,
    pub event_type: String,
    pub payload: String, // JSON-serialized ScenarioEvent
}

impl EventLogEntry {
    pub fn new(run_id: &str, tick: Tick, source: &str, event: &ScenarioEvent) -> serde_json::Result<Self> {
        Ok(Self {
            id: None,
            run_id: run_id.to_string(),
            tick,
            source: source.to_string(),
            event_type: event_type_name(event).to_string(),
            payload: serde_json::to_string(event)?,
        })
    }

    pub fn decode(&self) -> serde_json::Result<ScenarioEvent> {
        serde_json::from_str(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_tag_matches_event_type_name() {
        let event = ScenarioEvent::CongestionInjected {
            tick: 21,
            actor: ActorId(7),
            route_index: 1,
        };
        let entry = EventLogEntry::new("run-1", 21, "congestion", &event).unwrap();
        let json: serde_json::Value = serde_json::from_str(&entry.payload).unwrap();
        assert_eq!(json["type"], entry.event_type);
        assert_eq!(entry.decode().unwrap(), event);
    }
}
