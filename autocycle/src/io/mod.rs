//! Seams to the outside world: configuration, telemetry, world traits and
//! the simulated world used for dry runs.

pub mod config;
pub mod sim;
pub mod telemetry;
pub mod wait;
pub mod world;
