//! Weather manager — weather type × time of day → environment parameters,
//! plus the light bits every tracked vehicle must carry under that weather.
//!
//! State machine:
//!   UNSET → WEATHER_SET → TIME_SET
//!   set_weather() re-enters WEATHER_SET from either later state.
//!   set_time_of_day() from UNSET is logged and rejected, state unchanged.
//!   apply() requires TIME_SET and may be repeated freely.

use crate::{
    environment::{SimulationEnvironment, VehicleLightState},
    error::{ScenarioError, ScenarioResult},
    types::ActorId,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const NOON_SUN_ALTITUDE: f64 = 90.0;
pub const NIGHT_SUN_ALTITUDE: f64 = -90.0;
/// Fog reads thinner at night; compensate with extra density.
pub const NIGHT_FOG_DENSITY_OFFSET: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherParameters {
    pub cloudiness: f64,
    pub precipitation: f64,
    pub precipitation_deposits: f64,
    pub wind_intensity: f64,
    pub sun_azimuth_angle: f64,
    pub sun_altitude_angle: f64,
    pub fog_density: f64,
    pub fog_distance: f64,
    pub fog_falloff: f64,
    pub wetness: f64,
}

impl WeatherParameters {
    pub const CLEAR_NOON: Self = Self {
        cloudiness: 5.0,
        precipitation: 0.0,
        precipitation_deposits: 0.0,
        wind_intensity: 10.0,
        sun_azimuth_angle: -1.0,
        sun_altitude_angle: 45.0,
        fog_density: 2.0,
        fog_distance: 0.75,
        fog_falloff: 0.1,
        wetness: 0.0,
    };

    pub const CLOUDY_NOON: Self = Self {
        cloudiness: 60.0,
        precipitation: 0.0,
        precipitation_deposits: 0.0,
        wind_intensity: 10.0,
        sun_azimuth_angle: -1.0,
        sun_altitude_angle: 45.0,
        fog_density: 3.0,
        fog_distance: 0.75,
        fog_falloff: 0.1,
        wetness: 0.0,
    };

    pub const HARD_RAIN_NOON: Self = Self {
        cloudiness: 100.0,
        precipitation: 100.0,
        precipitation_deposits: 90.0,
        wind_intensity: 100.0,
        sun_azimuth_angle: -1.0,
        sun_altitude_angle: 45.0,
        fog_density: 7.0,
        fog_distance: 0.75,
        fog_falloff: 0.1,
        wetness: 100.0,
    };

    /// Clear-sky sun position with dense, close fog.
    pub const FOGGY: Self = Self {
        cloudiness: 0.0,
        precipitation: 0.0,
        precipitation_deposits: 0.0,
        wind_intensity: 0.0,
        sun_azimuth_angle: Self::CLEAR_NOON.sun_azimuth_angle,
        sun_altitude_angle: Self::CLEAR_NOON.sun_altitude_angle,
        fog_density: 40.0,
        fog_distance: 1.0,
        fog_falloff: 1.0,
        wetness: 0.0,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherType {
    Clear,
    Cloudy,
    Rainy,
    Foggy,
}

impl WeatherType {
    pub const ALL: [Self; 4] = [Self::Clear, Self::Cloudy, Self::Rainy, Self::Foggy];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Clear => "clear",
            Self::Cloudy => "cloudy",
            Self::Rainy => "rainy",
            Self::Foggy => "foggy",
        }
    }

    /// Immutable preset the working copy starts from.
    pub fn preset(&self) -> WeatherParameters {
        match self {
            Self::Clear => WeatherParameters::CLEAR_NOON,
            Self::Cloudy => WeatherParameters::CLOUDY_NOON,
            Self::Rainy => WeatherParameters::HARD_RAIN_NOON,
            Self::Foggy => WeatherParameters::FOGGY,
        }
    }

    /// Light bits every vehicle must carry under this weather.
    pub fn required_lights(&self) -> VehicleLightState {
        match self {
            Self::Foggy => VehicleLightState::FOG | VehicleLightState::LOW_BEAM,
            Self::Rainy => VehicleLightState::LOW_BEAM,
            Self::Clear | Self::Cloudy => VehicleLightState::NONE,
        }
    }
}

impl FromStr for WeatherType {
    type Err = ScenarioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|w| s.eq_ignore_ascii_case(w.name()))
            .ok_or_else(|| ScenarioError::invalid_enum("weather type", s))
    }
}

impl fmt::Display for WeatherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    Noon,
    Night,
}

impl TimeOfDay {
    pub const ALL: [Self; 2] = [Self::Noon, Self::Night];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Noon => "noon",
            Self::Night => "night",
        }
    }
}

impl FromStr for TimeOfDay {
    type Err = ScenarioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| s.eq_ignore_ascii_case(t.name()))
            .ok_or_else(|| ScenarioError::invalid_enum("time of day", s))
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A named weather × time combination, e.g. `"foggy night"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeatherPreset {
    pub weather: WeatherType,
    pub time: TimeOfDay,
}

impl WeatherPreset {
    pub const fn new(weather: WeatherType, time: TimeOfDay) -> Self {
        Self { weather, time }
    }

    /// Every combination, noon presets first.
    pub fn all() -> Vec<Self> {
        TimeOfDay::ALL
            .into_iter()
            .flat_map(|time| WeatherType::ALL.into_iter().map(move |weather| Self { weather, time }))
            .collect()
    }
}

impl Default for WeatherPreset {
    fn default() -> Self {
        Self::new(WeatherType::Clear, TimeOfDay::Noon)
    }
}

impl FromStr for WeatherPreset {
    type Err = ScenarioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        match (words.next(), words.next(), words.next()) {
            (Some(weather), Some(time), None) => Ok(Self {
                weather: weather.parse()?,
                time: time.parse()?,
            }),
            _ => Err(ScenarioError::invalid_enum("weather preset", s)),
        }
    }
}

impl fmt::Display for WeatherPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.weather, self.time)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeatherPhase {
    Unset,
    WeatherSet,
    TimeSet,
}

#[derive(Debug, Clone, Default)]
pub struct WeatherManager {
    weather_type: Option<WeatherType>,
    time_of_day: Option<TimeOfDay>,
    /// Working copy; `None` until a weather type is chosen.
    working: Option<WeatherParameters>,
}

impl WeatherManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// A manager already in TIME_SET for `preset`.
    pub fn for_preset(preset: WeatherPreset) -> ScenarioResult<Self> {
        let mut manager = Self::new();
        manager.set_weather(preset.weather);
        manager.set_time_of_day(preset.time)?;
        Ok(manager)
    }

    pub fn phase(&self) -> WeatherPhase {
        match (self.weather_type, self.time_of_day) {
            (None, _) => WeatherPhase::Unset,
            (Some(_), None) => WeatherPhase::WeatherSet,
            (Some(_), Some(_)) => WeatherPhase::TimeSet,
        }
    }

    pub fn weather_type(&self) -> Option<WeatherType> {
        self.weather_type
    }

    pub fn time_of_day(&self) -> Option<TimeOfDay> {
        self.time_of_day
    }

    /// Composed parameters; defined only once both weather and time are set.
    pub fn composed_parameters(&self) -> Option<&WeatherParameters> {
        match self.phase() {
            WeatherPhase::TimeSet => self.working.as_ref(),
            _ => None,
        }
    }

    /// Start a fresh working copy from the preset. Clears any time of day.
    pub fn set_weather(&mut self, weather: WeatherType) {
        self.weather_type = Some(weather);
        self.time_of_day = None;
        self.working = Some(weather.preset());
        log::debug!("weather: type set to {weather}");
    }

    pub fn set_time_of_day(&mut self, time: TimeOfDay) -> ScenarioResult<()> {
        let Some(weather) = self.weather_type else {
            log::error!("Set weather before setting time of day");
            return Err(ScenarioError::StateOrdering {
                operation: "set time of day",
                required: "weather type",
            });
        };

        // Recompose from the preset so repeated calls never stack offsets.
        let mut composed = weather.preset();
        match time {
            TimeOfDay::Noon => composed.sun_altitude_angle = NOON_SUN_ALTITUDE,
            TimeOfDay::Night => {
                composed.sun_altitude_angle = NIGHT_SUN_ALTITUDE;
                if weather == WeatherType::Foggy {
                    composed.fog_density += NIGHT_FOG_DENSITY_OFFSET;
                }
            }
        }
        self.working = Some(composed);
        self.time_of_day = Some(time);
        log::debug!("weather: time of day set to {time}");
        Ok(())
    }

    /// Light bits to OR into every tracked vehicle.
    pub fn light_addition(&self) -> VehicleLightState {
        self.weather_type
            .map(|w| w.required_lights())
            .unwrap_or(VehicleLightState::NONE)
    }

    /// OR the weather's light bits into each vehicle's current light state,
    /// then push the composed parameters. Returns the number of vehicles
    /// whose lights were updated.
    pub fn apply<E: SimulationEnvironment + ?Sized>(
        &self,
        env: &mut E,
        vehicles: &[ActorId],
    ) -> ScenarioResult<usize> {
        let (Some(weather), Some(time), Some(params)) =
            (self.weather_type, self.time_of_day, self.composed_parameters().copied())
        else {
            log::error!("Cannot apply weather before weather type and time of day are set");
            return Err(ScenarioError::StateOrdering {
                operation: "apply weather",
                required: "time of day",
            });
        };

        let addition = self.light_addition();
        let mut updated = 0;
        if vehicles.is_empty() {
            log::debug!("weather: no vehicles to set lights on");
        } else if !addition.is_empty() {
            for &vehicle in vehicles {
                let result = env
                    .light_state(vehicle)
                    .and_then(|current| env.set_light_state(vehicle, current | addition));
                match result {
                    Ok(()) => updated += 1,
                    Err(e) => log::error!("Cannot set lights on vehicle {vehicle}: {e}"),
                }
            }
        }

        env.set_weather(&params)?;
        log::info!("Weather set to {weather} {time}");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn composed(weather: WeatherType, time: TimeOfDay) -> WeatherParameters {
        let mut manager = WeatherManager::new();
        manager.set_weather(weather);
        manager.set_time_of_day(time).unwrap();
        *manager.composed_parameters().unwrap()
    }

    #[test]
    fn foggy_density_depends_on_time_of_day() {
        assert_eq!(composed(WeatherType::Foggy, TimeOfDay::Noon).fog_density, 40.0);
        assert_eq!(composed(WeatherType::Foggy, TimeOfDay::Night).fog_density, 60.0);
    }

    #[test]
    fn sun_altitude_follows_time_of_day() {
        assert_eq!(composed(WeatherType::Clear, TimeOfDay::Noon).sun_altitude_angle, 90.0);
        assert_eq!(composed(WeatherType::Clear, TimeOfDay::Night).sun_altitude_angle, -90.0);
    }

    #[test]
    fn time_before_weather_is_rejected_without_state_change() {
        let mut manager = WeatherManager::new();
        let err = manager.set_time_of_day(TimeOfDay::Night).unwrap_err();
        assert!(matches!(err, ScenarioError::StateOrdering { .. }));
        assert_eq!(manager.phase(), WeatherPhase::Unset);
        assert!(manager.composed_parameters().is_none());
    }

    #[test]
    fn repeated_night_does_not_stack_fog_offset() {
        let mut manager = WeatherManager::new();
        manager.set_weather(WeatherType::Foggy);
        manager.set_time_of_day(TimeOfDay::Night).unwrap();
        manager.set_time_of_day(TimeOfDay::Night).unwrap();
        assert_eq!(manager.composed_parameters().unwrap().fog_density, 60.0);
    }

    #[test]
    fn set_weather_reenters_weather_set() {
        let mut manager = WeatherManager::new();
        manager.set_weather(WeatherType::Rainy);
        manager.set_time_of_day(TimeOfDay::Noon).unwrap();
        assert_eq!(manager.phase(), WeatherPhase::TimeSet);
        manager.set_weather(WeatherType::Cloudy);
        assert_eq!(manager.phase(), WeatherPhase::WeatherSet);
        assert!(manager.composed_parameters().is_none());
    }

    #[test]
    fn presets_are_not_mutated_by_composition() {
        let _ = composed(WeatherType::Foggy, TimeOfDay::Night);
        assert_eq!(WeatherType::Foggy.preset().fog_density, 40.0);
    }

    #[test]
    fn light_requirements_per_weather() {
        assert_eq!(
            WeatherType::Foggy.required_lights(),
            VehicleLightState::FOG | VehicleLightState::LOW_BEAM
        );
        assert_eq!(WeatherType::Rainy.required_lights(), VehicleLightState::LOW_BEAM);
        assert!(WeatherType::Clear.required_lights().is_empty());
        assert!(WeatherType::Cloudy.required_lights().is_empty());
    }

    #[test]
    fn light_addition_tracks_the_selected_weather() {
        let mut manager = WeatherManager::new();
        assert_eq!(manager.light_addition(), VehicleLightState::NONE);
        manager.set_weather(WeatherType::Foggy);
        assert_eq!(
            manager.light_addition(),
            VehicleLightState::FOG | VehicleLightState::LOW_BEAM
        );
        manager.set_weather(WeatherType::Clear);
        assert!(manager.light_addition().is_empty());
    }

    #[test]
    fn unknown_names_are_invalid_enums() {
        assert!(matches!(
            "snowy".parse::<WeatherType>(),
            Err(ScenarioError::InvalidEnum { .. })
        ));
        assert!(matches!(
            "dusk".parse::<TimeOfDay>(),
            Err(ScenarioError::InvalidEnum { .. })
        ));
    }

    #[test]
    fn all_eight_presets_round_trip_through_names() {
        let presets = WeatherPreset::all();
        assert_eq!(presets.len(), 8);
        for preset in presets {
            assert_eq!(preset.to_string().parse::<WeatherPreset>().unwrap(), preset);
        }
        assert_eq!(
            "foggy night".parse::<WeatherPreset>().unwrap(),
            WeatherPreset::new(WeatherType::Foggy, TimeOfDay::Night)
        );
    }
}
