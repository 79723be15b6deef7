use thiserror::Error;

/// Lookup and validation failures. Each one is fatal for the store being
/// converged when it is raised; other stores are still attempted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FleetError {
    #[error("region {0} not found")]
    RegionNotFound(String),

    #[error("image {0} not found")]
    ImageNotFound(String),

    #[error("no {class} image for region {region}")]
    NoImageForRegion { class: String, region: String },

    #[error("hosted zone {0} not found")]
    HostedZoneNotFound(String),

    #[error("no DNS region mapped for {region} (instance {instance})")]
    RegionMappingMissing { region: String, instance: String },

    #[error("no health check monitors {ip} (instance {instance})")]
    HealthCheckMissing { ip: String, instance: String },

    #[error("ssh key {0} not found")]
    SshKeyNotFound(String),

    #[error("size {0} not found")]
    SizeNotFound(String),

    #[error("instance {0} has no IPv4 address yet")]
    MissingIpAddress(String),

    #[error("invalid region map entry: {0:?}")]
    InvalidRegionMapEntry(String),
}
