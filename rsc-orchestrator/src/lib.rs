pub mod cli;
pub mod config;
pub mod config_patch;
pub mod convergence;
pub mod dns_records;
pub mod fleet;
pub mod health_checks;
pub mod loadbalancer;
pub mod poller;
pub mod provider_manager;
pub mod provisioning;

pub use config::FleetConfig;
pub use convergence::{Convergence, ConvergenceReport};
