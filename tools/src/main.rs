//! scenario-runner: headless traffic-scenario runner.
//!
//! Usage:
//!   scenario-runner overspeeding -n 30 -w 10 --seed 7 --ticks 600
//!   scenario-runner congestion --weather rainy --time night --db run.db
//!   scenario-runner --weather-only --weather foggy --time night

use anyhow::{Context, Result};
use scenario_core::{
    config::ScenarioConfig,
    headless::HeadlessWorld,
    orchestrator::{BehaviorFlags, PopulationRequest, RunRequest, RunSummary, ScenarioOrchestrator},
    rng::seed_from_clock,
    scenario::Scenario,
    store::EventJournal,
    weather::{TimeOfDay, WeatherManager, WeatherPreset, WeatherType},
};
use std::env;

#[derive(serde::Serialize)]
struct RunnerReport<'a> {
    db: &'a str,
    request: &'a RunRequest,
    summary: &'a RunSummary,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    let spawn_points = parse_arg(&args, "--spawn-points", 200usize);
    let ticks = parse_arg(&args, "--ticks", 600u64);
    let db = arg_value(&args, "--db").unwrap_or(":memory:");
    let json = has_flag(&args, "--json");

    let mut config = match arg_value(&args, "--config") {
        Some(path) => ScenarioConfig::load(path)?,
        None => ScenarioConfig::default(),
    };
    if let Some(filter) = arg_value(&args, "--filterv") {
        config.catalog.vehicle_filter = filter.to_string();
    }
    if let Some(generation) = arg_value(&args, "--generationv") {
        config.catalog.vehicle_generation = generation.to_string();
    }
    if let Some(filter) = arg_value(&args, "--filterw") {
        config.catalog.walker_filter = filter.to_string();
    }
    if let Some(generation) = arg_value(&args, "--generationw") {
        config.catalog.walker_generation = generation.to_string();
    }

    let weather = WeatherPreset {
        weather: arg_value(&args, "--weather")
            .map(str::parse::<WeatherType>)
            .transpose()?
            .unwrap_or(WeatherType::Clear),
        time: arg_value(&args, "--time")
            .map(str::parse::<TimeOfDay>)
            .transpose()?
            .unwrap_or(TimeOfDay::Noon),
    };

    let mut world = HeadlessWorld::new(spawn_points).interrupt_after(ticks);

    if has_flag(&args, "--weather-only") {
        let manager = WeatherManager::for_preset(weather)?;
        manager.apply(&mut world, &[])?;
        println!("Weather set to {weather}");
        return Ok(());
    }

    let scenario = match positional(&args) {
        Some(name) => name.parse::<Scenario>()?,
        None => Scenario::Default,
    };
    let request = RunRequest {
        scenario,
        population: PopulationRequest {
            vehicles: parse_arg(&args, "--vehicles", parse_arg(&args, "-n", 30usize)),
            walkers: parse_arg(&args, "--walkers", parse_arg(&args, "-w", 10usize)),
        },
        flags: BehaviorFlags {
            aggression: has_flag(&args, "--aggression"),
            congestion: has_flag(&args, "--congestion"),
            safe: has_flag(&args, "--safe"),
            hero: has_flag(&args, "--hero"),
            disable_car_lights: has_flag(&args, "--disable-car-lights"),
        },
        weather,
        seed: arg_value(&args, "--seed")
            .map(|s| s.parse::<u64>().with_context(|| format!("invalid --seed {s}")))
            .transpose()?,
        walker_seed: parse_arg(&args, "--seedw", 0u64),
    };

    if !json {
        println!("scenario-runner");
        println!("  scenario:      {scenario}");
        println!("  weather:       {weather}");
        println!("  spawn points:  {spawn_points}");
        println!("  ticks:         {ticks}");
        println!("  db:            {db}");
        println!();
    }

    let journal = EventJournal::open(db)?;
    journal.migrate()?;
    let seed_label = request.seed.unwrap_or_else(seed_from_clock);
    let run_id = format!("run-{seed_label}-{}", seed_from_clock());

    let summary = {
        let mut orchestrator = ScenarioOrchestrator::new(run_id, &mut world, config, journal);
        orchestrator.run(&request)?
    };

    if json {
        let report = RunnerReport {
            db,
            request: &request,
            summary: &summary,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("=== RUN SUMMARY ===");
    println!("  run_id:              {}", summary.run_id);
    println!("  seed:                {}", summary.seed);
    println!("  ticks run:           {}", summary.ticks);
    println!("  vehicles spawned:    {}", summary.vehicles_spawned);
    println!("  vehicle failures:    {}", summary.vehicle_spawn_failures);
    println!("  pedestrians:         {}", summary.pedestrians_spawned);
    println!("  controllers:         {}", summary.controllers_spawned);
    println!("  congestion arrivals: {}", summary.congestion_injections);
    println!("  weather:             {}", summary.weather);

    if let Some(tally) = &summary.behavior {
        println!();
        println!("=== BEHAVIOR ===");
        println!("  lane change:    {}/{}", tally.lane_change, tally.vehicles);
        println!("  ignore lights:  {}/{}", tally.ignore_lights, tally.vehicles);
        println!("  ignore signs:   {}/{}", tally.ignore_signs, tally.vehicles);
        println!("  overspeed:      {}/{}", tally.overspeed, tally.vehicles);
    }

    println!();
    println!("=== TEARDOWN ===");
    println!("  vehicles:       {}", summary.teardown.vehicles_destroyed);
    println!("  pedestrians:    {}", summary.teardown.bodies_destroyed);
    println!("  controllers:    {}", summary.teardown.controllers_destroyed);
}

/// Flags that take a value; used to skip that value when looking for the scenario.
const VALUE_FLAGS: &[&str] = &[
    "--vehicles", "-n", "--walkers", "-w", "--weather", "--time", "--filterv", "--generationv",
    "--filterw", "--generationw", "--seed", "--seedw", "--ticks", "--spawn-points", "--db",
    "--config",
];

fn positional(args: &[String]) -> Option<&str> {
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        if VALUE_FLAGS.contains(&arg.as_str()) {
            iter.next();
        } else if !arg.starts_with('-') {
            return Some(arg.as_str());
        }
    }
    None
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    let Some(raw) = arg_value(args, flag) else {
        return default;
    };
    raw.parse().unwrap_or_else(|_| {
        log::warn!("Ignoring {flag} {raw}: not a valid value, using the default");
        default
    })
}
