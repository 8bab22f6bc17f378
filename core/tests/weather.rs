//! Weather application and light synchronisation.

use scenario_core::{
    environment::{SimulationEnvironment, VehicleLightState},
    error::ScenarioError,
    headless::HeadlessWorld,
    types::{ActorId, Transform},
    weather::{TimeOfDay, WeatherManager, WeatherPreset, WeatherType},
};

fn world_with_car() -> (HeadlessWorld, ActorId) {
    let mut world = HeadlessWorld::new(4);
    let bp = world.find_blueprint("vehicle.audi.a2").unwrap().unwrap();
    let id = world.try_spawn_actor(&bp, &Transform::default()).unwrap().unwrap();
    (world, id)
}

#[test]
fn rainy_adds_low_beam_and_keeps_existing_bits() {
    let (mut world, car) = world_with_car();
    world.force_light_state(car, VehicleLightState::BRAKE);

    let manager =
        WeatherManager::for_preset(WeatherPreset::new(WeatherType::Rainy, TimeOfDay::Noon)).unwrap();
    let updated = manager.apply(&mut world, &[car]).unwrap();

    assert_eq!(updated, 1);
    let lights = world.light_state(car).unwrap();
    assert!(lights.contains(VehicleLightState::LOW_BEAM));
    assert!(lights.contains(VehicleLightState::BRAKE));
    assert!(!lights.contains(VehicleLightState::FOG));
    assert_eq!(world.weather().unwrap().precipitation, 100.0);
}

#[test]
fn foggy_night_adds_fog_lights_and_thicker_fog() {
    let (mut world, car) = world_with_car();
    let manager =
        WeatherManager::for_preset("foggy night".parse().unwrap()).unwrap();
    manager.apply(&mut world, &[car]).unwrap();

    assert_eq!(
        world.light_state(car).unwrap(),
        VehicleLightState::FOG | VehicleLightState::LOW_BEAM
    );
    let params = world.weather().unwrap();
    assert_eq!(params.fog_density, 60.0);
    assert_eq!(params.sun_altitude_angle, -90.0);
}

#[test]
fn clear_weather_adds_no_light_bits() {
    let (mut world, car) = world_with_car();
    let manager = WeatherManager::for_preset(WeatherPreset::default()).unwrap();
    assert_eq!(manager.apply(&mut world, &[car]).unwrap(), 0);
    assert!(world.light_state(car).unwrap().is_empty());
    assert_eq!(world.weather().unwrap().sun_altitude_angle, 90.0);
}

#[test]
fn apply_before_time_of_day_is_rejected() {
    let (mut world, car) = world_with_car();
    let mut manager = WeatherManager::new();
    manager.set_weather(WeatherType::Cloudy);

    let err = manager.apply(&mut world, &[car]).unwrap_err();
    assert!(matches!(err, ScenarioError::StateOrdering { .. }), "got {err:?}");
    assert!(world.weather().is_none());
}

#[test]
fn repeated_apply_pushes_identical_parameters() {
    let (mut world, car) = world_with_car();
    let manager =
        WeatherManager::for_preset(WeatherPreset::new(WeatherType::Cloudy, TimeOfDay::Night)).unwrap();

    manager.apply(&mut world, &[car]).unwrap();
    let first = *world.weather().unwrap();
    manager.apply(&mut world, &[car]).unwrap();

    assert_eq!(world.weather_pushes(), 2);
    assert_eq!(*world.weather().unwrap(), first);
}

#[test]
fn a_vanished_vehicle_does_not_block_the_rest() {
    let (mut world, car) = world_with_car();
    let manager =
        WeatherManager::for_preset(WeatherPreset::new(WeatherType::Rainy, TimeOfDay::Night)).unwrap();

    let updated = manager.apply(&mut world, &[ActorId(999), car]).unwrap();

    assert_eq!(updated, 1);
    assert!(world.light_state(car).unwrap().contains(VehicleLightState::LOW_BEAM));
    assert!(world.weather().is_some());
}
