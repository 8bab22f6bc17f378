//! Named scenarios as lookup tables: behavior mask and weather preset.

use crate::{
    behavior::BehaviorMask,
    error::ScenarioError,
    weather::{TimeOfDay, WeatherPreset, WeatherType},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    #[default]
    Default,
    Night,
    Overspeeding,
    Distracted,
    Congestion,
}

impl Scenario {
    pub const ALL: [Self; 5] = [
        Self::Default,
        Self::Night,
        Self::Overspeeding,
        Self::Distracted,
        Self::Congestion,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Night => "night",
            Self::Overspeeding => "overspeeding",
            Self::Distracted => "distracted",
            Self::Congestion => "congestion",
        }
    }

    pub fn behavior_mask(&self) -> BehaviorMask {
        match self {
            Self::Overspeeding => BehaviorMask {
                overspeed: true,
                ..BehaviorMask::NONE
            },
            Self::Distracted => BehaviorMask {
                ignore_lights: true,
                ignore_signs: true,
                ..BehaviorMask::NONE
            },
            Self::Default | Self::Night | Self::Congestion => BehaviorMask::NONE,
        }
    }

    /// Effective preset for a requested one. `night` forces a clear night.
    pub fn weather_preset(&self, requested: WeatherPreset) -> WeatherPreset {
        match self {
            Self::Night => WeatherPreset::new(WeatherType::Clear, TimeOfDay::Night),
            _ => requested,
        }
    }

    /// Baseline traffic keeps to its lane.
    pub fn disables_auto_lane_change(&self) -> bool {
        matches!(self, Self::Default)
    }

    pub fn injects_congestion(&self) -> bool {
        matches!(self, Self::Congestion)
    }
}

impl FromStr for Scenario {
    type Err = ScenarioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|sc| s.eq_ignore_ascii_case(sc.name()))
            .ok_or_else(|| ScenarioError::invalid_enum("scenario", s))
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn behavior_mask_table() {
        let table = [
            (Scenario::Default, (false, false, false, false)),
            (Scenario::Night, (false, false, false, false)),
            (Scenario::Overspeeding, (false, false, false, true)),
            (Scenario::Distracted, (false, true, true, false)),
            (Scenario::Congestion, (false, false, false, false)),
        ];
        for (scenario, (lane_change, ignore_lights, ignore_signs, overspeed)) in table {
            assert_eq!(
                scenario.behavior_mask(),
                BehaviorMask {
                    lane_change,
                    ignore_lights,
                    ignore_signs,
                    overspeed
                },
                "{scenario}"
            );
        }
    }

    #[test]
    fn night_overrides_requested_weather() {
        let requested = WeatherPreset::new(WeatherType::Foggy, TimeOfDay::Noon);
        assert_eq!(
            Scenario::Night.weather_preset(requested),
            WeatherPreset::new(WeatherType::Clear, TimeOfDay::Night)
        );
        for scenario in Scenario::ALL.into_iter().filter(|s| *s != Scenario::Night) {
            assert_eq!(scenario.weather_preset(requested), requested);
        }
    }

    #[test]
    fn only_default_disables_lane_change_and_only_congestion_injects() {
        for scenario in Scenario::ALL {
            assert_eq!(scenario.disables_auto_lane_change(), scenario == Scenario::Default);
            assert_eq!(scenario.injects_congestion(), scenario == Scenario::Congestion);
        }
    }

    #[test]
    fn names_parse_and_unknown_is_invalid_enum() {
        for scenario in Scenario::ALL {
            assert_eq!(scenario.name().parse::<Scenario>().unwrap(), scenario);
        }
        assert!(matches!(
            "rushhour".parse::<Scenario>(),
            Err(ScenarioError::InvalidEnum { .. })
        ));
    }
}
