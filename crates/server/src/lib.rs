pub mod bootstrap;
pub mod desk;
pub mod health;
pub mod serpapi;
pub mod telemetry;

pub use bootstrap::{bootstrap, bootstrap_with_config, Application, BootstrapError};
pub use desk::{Repositories, TravelDesk};
