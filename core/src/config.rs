use serde::{Deserialize, Serialize};

/// Blueprint filters for both fleets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CatalogConfig {
    pub vehicle_filter: String,
    /// `"All"` or `"1"`..`"3"`.
    pub vehicle_generation: String,
    pub walker_filter: String,
    pub walker_generation: String,
    pub walker_controller: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            vehicle_filter: "vehicle.*".into(),
            vehicle_generation: "All".into(),
            walker_filter: "walker.pedestrian.*".into(),
            walker_generation: "2".into(),
            walker_controller: "controller.ai.walker".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PedestrianConfig {
    /// Fraction of pedestrians given the running speed tier.
    pub running_fraction: f64,
    /// Fraction of pedestrians allowed to cross roads.
    pub crossing_factor: f64,
}

impl Default for PedestrianConfig {
    fn default() -> Self {
        Self {
            running_fraction: 0.0,
            crossing_factor: 0.0,
        }
    }
}

/// Fixed-route congestion injection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CongestionConfig {
    /// Ticks between injection attempts.
    pub spawn_delay: u64,
    /// Live-vehicle cap; no injection at or above it.
    pub max_vehicles: usize,
    /// Spawn-point indices, one per alternation value (`false`, `true`).
    pub spawn_points: [usize; 2],
    /// Route polylines as spawn-point indices, one per alternation value.
    pub routes: [Vec<usize>; 2],
}

impl Default for CongestionConfig {
    fn default() -> Self {
        Self {
            spawn_delay: 20,
            max_vehicles: 200,
            spawn_points: [149, 32],
            routes: [
                vec![21, 76, 38, 34, 90, 3],
                vec![129, 28, 124, 33, 97, 119, 58, 154, 147],
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScenarioConfig {
    pub catalog: CatalogConfig,
    /// Synchronous tick interval in seconds.
    pub fixed_delta_seconds: f64,
    /// Global distance to the leading vehicle, in metres.
    pub lead_vehicle_distance: f64,
    pub pedestrians: PedestrianConfig,
    pub congestion: CongestionConfig,
    /// Wait after teardown destroy commands so they flush.
    pub teardown_grace_ms: u64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            catalog: CatalogConfig::default(),
            fixed_delta_seconds: 0.05,
            lead_vehicle_distance: 2.5,
            pedestrians: PedestrianConfig::default(),
            congestion: CongestionConfig::default(),
            teardown_grace_ms: 500,
        }
    }
}

impl ScenarioConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    /// In tests, use ScenarioConfig::default_test().
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: ScenarioConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        Ok(config)
    }

    /// Defaults with no teardown grace period, for unit tests.
    pub fn default_test() -> Self {
        Self {
            teardown_grace_ms: 0,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let json = r#"{ "congestion": { "spawn_delay": 5 }, "teardown_grace_ms": 0 }"#;
        let config: ScenarioConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.congestion.spawn_delay, 5);
        assert_eq!(config.congestion.max_vehicles, 200);
        assert_eq!(config.catalog.vehicle_filter, "vehicle.*");
        assert_eq!(config.fixed_delta_seconds, 0.05);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = ScenarioConfig::load("/nonexistent/scenario.json").unwrap_err();
        assert!(err.to_string().contains("Cannot read"));
    }

    #[test]
    fn default_routes_match_spawn_point_alternation() {
        let config = CongestionConfig::default();
        assert_eq!(config.spawn_points, [149, 32]);
        assert_eq!(config.routes[0].first(), Some(&21));
        assert_eq!(config.routes[1].first(), Some(&129));
    }
}
