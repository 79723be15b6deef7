use anyhow::Result;
use rsc_providers::digitalocean::DigitalOceanProvider;
use rsc_providers::route53::Route53Provider;
use rsc_providers::ssh::SshRemote;
use rsc_providers::{ComputeProvider, DnsProvider, RemoteHost};
use std::sync::Arc;

use crate::config::FleetConfig;

pub struct ProviderManager;

impl ProviderManager {
    pub fn compute(config: &FleetConfig) -> Result<Arc<dyn ComputeProvider>> {
        let Some(token) = config.digitalocean_token.clone() else {
            anyhow::bail!("no DigitalOcean token: set DIGITALOCEAN_TOKEN or DIGITALOCEAN_TOKEN_FILE");
        };
        Ok(Arc::new(DigitalOceanProvider::new(token)?))
    }

    /// Credentials come from the standard AWS chain (env, profile, instance role).
    pub async fn dns(config: &FleetConfig) -> Arc<dyn DnsProvider> {
        Arc::new(Route53Provider::from_env(&config.aws_region).await)
    }

    pub fn remote(config: &FleetConfig) -> Arc<dyn RemoteHost> {
        if !config.ssh_private_key_file.exists() {
            tracing::warn!(
                "SSH private key {} does not exist; load balancer sync will fail",
                config.ssh_private_key_file.display()
            );
        }
        Arc::new(SshRemote::new(
            config.ssh_user.clone(),
            config.ssh_private_key_file.clone(),
            config.ssh_timeout,
        ))
    }
}
