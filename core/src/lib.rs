pub mod behavior;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod congestion;
pub mod environment;
pub mod error;
pub mod event;
pub mod headless;
pub mod orchestrator;
pub mod population;
pub mod rng;
pub mod scenario;
pub mod spawner;
pub mod store;
pub mod types;
pub mod weather;
