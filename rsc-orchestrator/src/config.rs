use anyhow::{Context, Result};
use rsc_common::region_map::parse_region_map;
use rsc_common::RegionMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::dns_records::DnsSettings;
use crate::loadbalancer::LoadBalancerSettings;
use crate::provisioning::ProvisionSettings;

pub const DEFAULT_DOMAIN: &str = "runsomecode.com";
pub const DEFAULT_AWS_REGION: &str = "us-west-2";
pub const DEFAULT_TOKEN_FILE: &str = "/run/secrets/digitalocean_token";
pub const DEFAULT_SSH_KEY_FILE: &str = "/root/.ssh/digitalocean";
pub const DEFAULT_LB_CONFIG_PATH: &str = "/etc/haproxy/haproxy.cfg";
pub const DEFAULT_RELOAD_COMMAND: &str = "/etc/init.d/haproxyctl reload";

/// Everything a run needs, resolved once at startup and passed down explicitly.
#[derive(Debug, Clone)]
pub struct FleetConfig {
    pub domain: String,
    pub digitalocean_token: Option<String>,
    pub aws_region: String,
    pub ssh_user: String,
    pub ssh_private_key_file: PathBuf,
    pub ssh_timeout: Duration,
    pub lb_config_path: String,
    pub lb_reload_command: String,
    pub backend_port: u16,
    pub region_map: RegionMap,
    pub ssh_key_name: String,
    pub droplet_size: String,
    pub boot_poll_interval: Duration,
    pub boot_timeout: Duration,
}

impl FleetConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let get_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());
        let get_secs = |key: &str, default: u64| -> Result<Duration> {
            match get(key) {
                Some(v) => {
                    let secs = v
                        .parse::<u64>()
                        .with_context(|| format!("{} must be a number of seconds, got {:?}", key, v))?;
                    Ok(Duration::from_secs(secs))
                }
                None => Ok(Duration::from_secs(default)),
            }
        };

        // Prefer *_FILE for secrets (Docker/K8s friendly), fallback to env var.
        let token_file = get_or("DIGITALOCEAN_TOKEN_FILE", DEFAULT_TOKEN_FILE);
        let digitalocean_token = fs::read_to_string(&token_file)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| get("DIGITALOCEAN_TOKEN"));

        let backend_port = match get("RSC_BACKEND_PORT") {
            Some(v) => v
                .parse::<u16>()
                .with_context(|| format!("RSC_BACKEND_PORT must be a port number, got {:?}", v))?,
            None => 80,
        };

        let region_map = parse_region_map(get("RSC_DNS_REGION_MAP").as_deref())
            .context("RSC_DNS_REGION_MAP is malformed")?;

        Ok(Self {
            domain: get_or("RSC_DOMAIN", DEFAULT_DOMAIN)
                .trim_end_matches('.')
                .to_string(),
            digitalocean_token,
            aws_region: get_or("AWS_REGION", DEFAULT_AWS_REGION),
            ssh_user: get_or("RSC_SSH_USER", "root"),
            ssh_private_key_file: PathBuf::from(get_or("RSC_SSH_PRIVATE_KEY_FILE", DEFAULT_SSH_KEY_FILE)),
            ssh_timeout: get_secs("RSC_SSH_TIMEOUT_S", 60)?,
            lb_config_path: get_or("RSC_LB_CONFIG_PATH", DEFAULT_LB_CONFIG_PATH),
            lb_reload_command: get_or("RSC_LB_RELOAD_COMMAND", DEFAULT_RELOAD_COMMAND),
            backend_port,
            region_map,
            ssh_key_name: get_or("RSC_SSH_KEY_NAME", "Mill"),
            droplet_size: get_or("RSC_DROPLET_SIZE", "512mb"),
            boot_poll_interval: get_secs("RSC_BOOT_POLL_INTERVAL_S", 5)?,
            boot_timeout: get_secs("RSC_BOOT_TIMEOUT_S", 120)?,
        })
    }

    pub fn dns_settings(&self) -> DnsSettings {
        DnsSettings::new(&self.domain, self.region_map.clone())
    }

    pub fn load_balancer_settings(&self) -> LoadBalancerSettings {
        LoadBalancerSettings {
            config_path: self.lb_config_path.clone(),
            reload_command: self.lb_reload_command.clone(),
            backend_port: self.backend_port,
            ..LoadBalancerSettings::default()
        }
    }

    pub fn provision_settings(&self) -> ProvisionSettings {
        ProvisionSettings {
            domain: self.domain.clone(),
            ssh_key_name: self.ssh_key_name.clone(),
            size_slug: self.droplet_size.clone(),
            poll_interval: self.boot_poll_interval,
            boot_timeout: self.boot_timeout,
        }
    }
}
