use anyhow::Result;
use async_trait::async_trait;
use rsc_common::{
    HealthCheck, HealthCheckSpec, HostedZone, Image, NewInstance, RecordChange, RecordSet, Region,
    Size, SshKey,
};

/// Compute side: droplets, images, regions, sizes, keys.
#[async_trait]
pub trait ComputeProvider: Send + Sync {
    /// Every instance on the account, unenriched.
    async fn list_instances(&self) -> Result<Vec<inventory::DiscoveredInstance>>;
    async fn find_instance(&self, instance_id: &str) -> Result<inventory::DiscoveredInstance>;
    async fn create_instance(&self, request: &NewInstance) -> Result<inventory::DiscoveredInstance>;
    async fn destroy_instance(&self, instance_id: &str) -> Result<bool>;

    // Optional: not every provider exposes power actions.
    // Default implementation returns Ok(false) (not supported).
    async fn power_cycle_instance(&self, _instance_id: &str) -> Result<bool> {
        Ok(false)
    }

    async fn list_images(&self) -> Result<Vec<Image>>;
    async fn find_image(&self, image_id: &str) -> Result<Option<Image>>;
    async fn destroy_image(&self, image_id: &str) -> Result<bool>;

    async fn list_regions(&self) -> Result<Vec<Region>>;

    /// Resolve a region by id. Default scans `list_regions`.
    async fn find_region(&self, region_id: &str) -> Result<Option<Region>> {
        Ok(self
            .list_regions()
            .await?
            .into_iter()
            .find(|r| r.id == region_id || r.slug == region_id))
    }

    async fn list_sizes(&self) -> Result<Vec<Size>>;
    async fn list_ssh_keys(&self) -> Result<Vec<SshKey>>;
}

/// DNS side: hosted zones, record sets, health checks.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Zones ordered by name starting at `dns_name` (provider semantics).
    async fn list_hosted_zones_by_name(&self, dns_name: &str) -> Result<Vec<HostedZone>>;
    async fn list_record_sets(&self, hosted_zone_id: &str) -> Result<Vec<RecordSet>>;
    /// Submit one atomic change batch. Returns the provider's change id.
    async fn change_record_sets(
        &self,
        hosted_zone_id: &str,
        changes: &[RecordChange],
    ) -> Result<String>;

    async fn list_health_checks(&self) -> Result<Vec<HealthCheck>>;
    async fn create_health_check(&self, spec: &HealthCheckSpec) -> Result<HealthCheck>;
    async fn delete_health_check(&self, health_check_id: &str) -> Result<()>;
}

/// File transfer and command execution on a single host.
#[async_trait]
pub trait RemoteHost: Send + Sync {
    async fn download(&self, host: &str, remote_path: &str) -> Result<String>;
    async fn upload(&self, host: &str, remote_path: &str, content: &str) -> Result<()>;
    async fn exec(&self, host: &str, command: &str) -> Result<inventory::CommandOutput>;
}

pub mod inventory {
    use serde::Serialize;

    /// An instance as the provider reports it, before region/image enrichment.
    #[derive(Clone, Debug, PartialEq, Eq, Serialize)]
    pub struct DiscoveredInstance {
        pub provider_id: String,
        pub name: String,
        pub region_id: String,
        pub image_id: String,
        pub status: String,
        pub ip_address: Option<String>,
    }

    #[derive(Clone, Debug, PartialEq, Eq, Serialize)]
    pub struct CommandOutput {
        /// None when the process was killed by a signal.
        pub exit_code: Option<i32>,
        pub stdout: String,
        pub stderr: String,
    }

    impl CommandOutput {
        pub fn success(&self) -> bool {
            self.exit_code == Some(0)
        }
    }
}

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "digitalocean")]
pub mod digitalocean;

#[cfg(feature = "route53")]
pub mod route53;

#[cfg(feature = "ssh")]
pub mod ssh;
