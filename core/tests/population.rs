//! Vehicle and pedestrian spawning against the headless world.

use scenario_core::{
    config::{CatalogConfig, PedestrianConfig},
    environment::SimulationEnvironment,
    headless::{ActorKind, FaultPlan, HeadlessWorld},
    population::PopulationRegistry,
    rng::SubsystemRng,
    spawner::{PopulationSpawner, SpawnPhase, VehicleSpawnOptions, ROLE_HERO},
};

fn spawner(world: &HeadlessWorld) -> PopulationSpawner {
    PopulationSpawner::new(world, &CatalogConfig::default(), &PedestrianConfig::default())
        .expect("stock library resolves")
}

fn vehicles(count: usize) -> VehicleSpawnOptions {
    VehicleSpawnOptions {
        count,
        safe_mode: false,
        hero: false,
    }
}

#[test]
fn vehicle_request_above_spawn_points_is_clamped() {
    let mut world = HeadlessWorld::new(10);
    let spawner = spawner(&world);
    let mut registry = PopulationRegistry::new();
    let mut rng = SubsystemRng::new(1, 0);

    let report = spawner
        .spawn_vehicles(&mut world, &mut registry, &mut rng, vehicles(25))
        .unwrap();

    assert_eq!(report.requested, 25);
    assert_eq!(report.clamped_to, Some(10));
    assert_eq!(registry.vehicle_count(), 10);
    assert_eq!(world.live_count(ActorKind::Vehicle), 10);
}

#[test]
fn batch_failures_shrink_the_registry_without_error() {
    let mut world = HeadlessWorld::new(20).with_faults(FaultPlan {
        vehicle_failures: 3,
        ..Default::default()
    });
    let spawner = spawner(&world);
    let mut registry = PopulationRegistry::new();
    let mut rng = SubsystemRng::new(2, 0);

    let report = spawner
        .spawn_vehicles(&mut world, &mut registry, &mut rng, vehicles(8))
        .unwrap();

    assert_eq!(report.clamped_to, None);
    assert_eq!(report.spawned.len(), 5);
    assert_eq!(report.failures.len(), 3);
    assert!(report.failures.iter().all(|f| f.phase == SpawnPhase::Vehicle));
    assert_eq!(registry.vehicles(), report.spawned.as_slice());
}

#[test]
fn spawned_vehicles_are_on_autopilot() {
    let mut world = HeadlessWorld::new(12);
    let spawner = spawner(&world);
    let mut registry = PopulationRegistry::new();
    let mut rng = SubsystemRng::new(3, 0);

    spawner
        .spawn_vehicles(&mut world, &mut registry, &mut rng, vehicles(6))
        .unwrap();

    for &id in registry.vehicles() {
        assert!(world.actor(id).unwrap().autopilot, "vehicle {id} not on autopilot");
    }
}

#[test]
fn safe_mode_spawns_only_cars() {
    let mut world = HeadlessWorld::new(40);
    let spawner = spawner(&world);
    let mut registry = PopulationRegistry::new();
    let mut rng = SubsystemRng::new(4, 0);

    spawner
        .spawn_vehicles(
            &mut world,
            &mut registry,
            &mut rng,
            VehicleSpawnOptions {
                count: 30,
                safe_mode: true,
                hero: false,
            },
        )
        .unwrap();

    assert_eq!(registry.vehicle_count(), 30);
    for &id in registry.vehicles() {
        let record = world.actor(id).unwrap();
        assert_eq!(record.blueprint.attribute_value("base_type"), Some("car"));
    }
}

#[test]
fn hero_role_goes_to_the_first_vehicle_only() {
    let mut world = HeadlessWorld::new(10);
    let spawner = spawner(&world);
    let mut registry = PopulationRegistry::new();
    let mut rng = SubsystemRng::new(5, 0);

    spawner
        .spawn_vehicles(
            &mut world,
            &mut registry,
            &mut rng,
            VehicleSpawnOptions {
                count: 5,
                safe_mode: false,
                hero: true,
            },
        )
        .unwrap();

    let heroes: Vec<_> = registry
        .vehicles()
        .iter()
        .filter(|id| world.actor(**id).unwrap().blueprint.attribute_value("role_name") == Some(ROLE_HERO))
        .collect();
    assert_eq!(heroes, vec![&registry.vehicles()[0]]);
}

#[test]
fn controller_failures_leave_body_only_entries() {
    let mut world = HeadlessWorld::new(10).with_faults(FaultPlan {
        controller_failures: 3,
        ..Default::default()
    });
    let spawner = spawner(&world);
    let mut registry = PopulationRegistry::new();
    let mut rng = SubsystemRng::new(6, 1);

    let report = spawner
        .spawn_pedestrians(&mut world, &mut registry, &mut rng, 10)
        .unwrap();

    assert_eq!(report.bodies, 10);
    assert_eq!(report.controllers, 7);
    assert_eq!(
        report
            .failures
            .iter()
            .filter(|f| f.phase == SpawnPhase::PedestrianController)
            .count(),
        3
    );
    assert_eq!(registry.pedestrians().len(), 10);
    assert_eq!(registry.controller_count(), 7);

    let combined = registry.combined_pedestrian_ids();
    assert_eq!(combined.len(), 17);
    let mut unique = combined.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), combined.len(), "combined list has duplicates");

    // Controllers are only driven after one synchronisation tick.
    assert_eq!(world.current_tick(), 1);
    for (controller, entry) in registry.paired() {
        let record = world.actor(controller).unwrap();
        assert!(record.controller.started);
        assert!(record.controller.target.is_some());
        assert_eq!(record.controller.max_speed, Some(entry.speed));
        assert_eq!(record.parent, Some(entry.body));
    }
}

#[test]
fn pedestrians_walk_with_vulnerable_bodies() {
    let mut world = HeadlessWorld::new(10);
    let spawner = spawner(&world);
    let mut registry = PopulationRegistry::new();
    let mut rng = SubsystemRng::new(7, 1);

    spawner
        .spawn_pedestrians(&mut world, &mut registry, &mut rng, 4)
        .unwrap();

    assert_eq!(world.cross_factor(), Some(0.0));
    for entry in registry.pedestrians() {
        assert_eq!(entry.speed, 1.3, "walking tier expected");
        let body = world.actor(entry.body).unwrap();
        assert_eq!(body.blueprint.attribute_value("is_invincible"), Some("false"));
    }
}

#[test]
fn unresolved_locations_shrink_the_attempt() {
    let mut world = HeadlessWorld::new(10).with_faults(FaultPlan {
        navigation_misses: 2,
        ..Default::default()
    });
    let spawner = spawner(&world);
    let mut registry = PopulationRegistry::new();
    let mut rng = SubsystemRng::new(8, 1);

    let report = spawner
        .spawn_pedestrians(&mut world, &mut registry, &mut rng, 5)
        .unwrap();

    assert_eq!(report.located, 3);
    assert_eq!(report.bodies, 3);
    assert!(report.failures.is_empty());
}

#[test]
fn walker_without_speed_attribute_gets_zero_speed() {
    let mut world = HeadlessWorld::new(10);
    let catalog = CatalogConfig {
        walker_filter: "walker.pedestrian.0030".into(),
        ..Default::default()
    };
    let spawner = PopulationSpawner::new(&world, &catalog, &PedestrianConfig::default()).unwrap();
    let mut registry = PopulationRegistry::new();
    let mut rng = SubsystemRng::new(9, 1);

    spawner
        .spawn_pedestrians(&mut world, &mut registry, &mut rng, 2)
        .unwrap();

    assert!(registry.pedestrians().iter().all(|e| e.speed == 0.0));
}

#[test]
fn missing_controller_blueprint_is_fatal() {
    let world = HeadlessWorld::new(10);
    let catalog = CatalogConfig {
        walker_controller: "controller.ai.drone".into(),
        ..Default::default()
    };
    let err = match PopulationSpawner::new(&world, &catalog, &PedestrianConfig::default()) {
        Err(e) => e,
        Ok(_) => panic!("unknown controller must not resolve"),
    };
    assert!(err.is_fatal_configuration());
    assert!(world.vehicle_actors().unwrap().is_empty());
}
