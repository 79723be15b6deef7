use anyhow::{Context, Result};
use rsc_common::{FleetError, Instance};
use rsc_providers::inventory::CommandOutput;
use rsc_providers::RemoteHost;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::{DEFAULT_LB_CONFIG_PATH, DEFAULT_RELOAD_COMMAND};
use crate::config_patch::replace_between_markers;

pub const SERVER_BLOCK_START: &str = "# --- server block start ---";
pub const SERVER_BLOCK_END: &str = "# --- server block end ---";

#[derive(Debug, Clone)]
pub struct LoadBalancerSettings {
    pub config_path: String,
    pub reload_command: String,
    pub backend_port: u16,
    pub start_marker: String,
    pub end_marker: String,
}

impl Default for LoadBalancerSettings {
    fn default() -> Self {
        Self {
            config_path: DEFAULT_LB_CONFIG_PATH.to_string(),
            reload_command: DEFAULT_RELOAD_COMMAND.to_string(),
            backend_port: 80,
            start_marker: SERVER_BLOCK_START.to_string(),
            end_marker: SERVER_BLOCK_END.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadBalancerSync {
    pub load_balancer: String,
    pub host: String,
    pub changed: bool,
    pub before_sha256: String,
    pub after_sha256: String,
    pub reload: Option<CommandOutput>,
}

pub fn sha256_hex(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// One `server` line per backend, backends in the load balancer's own region
/// first. The sort is stable, so fleet order holds within each group.
pub fn backend_lines(lb: &Instance, backends: &[Instance], port: u16) -> Vec<String> {
    let mut ordered: Vec<&Instance> = backends.iter().collect();
    ordered.sort_by_key(|b| b.region_slug != lb.region_slug);
    ordered
        .into_iter()
        .filter_map(|b| {
            let Some(ip) = b.ip_address else {
                tracing::warn!("[LoadBalancer] Skipping backend {}: no address yet", b.name);
                return None;
            };
            Some(format!("    server {} {}:{} check", b.name, ip, port))
        })
        .collect()
}

/// Rewrite the server block on one load balancer and reload it when the
/// config actually changed. A non-zero reload exit is an error.
pub async fn sync_load_balancer(
    remote: &(impl RemoteHost + ?Sized),
    settings: &LoadBalancerSettings,
    lb: &Instance,
    backends: &[Instance],
) -> Result<LoadBalancerSync> {
    let host = lb
        .ip_string()
        .ok_or_else(|| FleetError::MissingIpAddress(lb.name.clone()))?;

    let lines = backend_lines(lb, backends, settings.backend_port);

    let original = remote
        .download(&host, &settings.config_path)
        .await
        .with_context(|| format!("downloading {} from {}", settings.config_path, lb.name))?;
    let patched = replace_between_markers(
        &original,
        &settings.start_marker,
        &settings.end_marker,
        &lines,
    )
    .with_context(|| format!("patching {} on {}", settings.config_path, lb.name))?;

    let before_sha256 = sha256_hex(&original);
    let after_sha256 = sha256_hex(&patched);
    let mut sync = LoadBalancerSync {
        load_balancer: lb.name.clone(),
        host: host.clone(),
        changed: before_sha256 != after_sha256,
        before_sha256,
        after_sha256,
        reload: None,
    };
    if !sync.changed {
        tracing::info!(
            "[LoadBalancer] {} already serves {} backend(s)",
            lb.name,
            lines.len()
        );
        return Ok(sync);
    }

    tracing::info!(
        "[LoadBalancer] Updating {} ({} backend(s), sha256 {} -> {})",
        lb.name,
        lines.len(),
        &sync.before_sha256[..12],
        &sync.after_sha256[..12]
    );
    remote
        .upload(&host, &settings.config_path, &patched)
        .await
        .with_context(|| format!("uploading {} to {}", settings.config_path, lb.name))?;

    let out = remote
        .exec(&host, &settings.reload_command)
        .await
        .with_context(|| format!("reloading {}", lb.name))?;
    if !out.stdout.trim().is_empty() {
        tracing::debug!("[LoadBalancer] {} reload stdout: {}", lb.name, out.stdout.trim());
    }
    if !out.stderr.trim().is_empty() {
        tracing::debug!("[LoadBalancer] {} reload stderr: {}", lb.name, out.stderr.trim());
    }
    if !out.success() {
        // The new config is already in place; keep what was uploaded in the error.
        anyhow::bail!(
            "reload on {} exited with {:?} after uploading sha256 {} (was {}): stdout={:?} stderr={:?}",
            lb.name,
            out.exit_code,
            sync.after_sha256,
            sync.before_sha256,
            out.stdout.trim(),
            out.stderr.trim()
        );
    }
    sync.reload = Some(out);
    Ok(sync)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsc_common::InstanceStatus;
    use std::net::Ipv4Addr;

    fn inst(name: &str, region: &str, ip: Option<[u8; 4]>) -> Instance {
        Instance {
            id: name.to_string(),
            name: name.to_string(),
            ip_address: ip.map(Ipv4Addr::from),
            region_slug: region.to_string(),
            image_id: "1".to_string(),
            image_name: format!("rsc run {}", region),
            status: InstanceStatus::Active,
        }
    }

    #[test]
    fn same_region_backends_come_first() {
        let lb = inst("lb", "sfo1", Some([10, 1, 0, 1]));
        let fleet = vec![
            inst("a", "lon1", Some([10, 0, 0, 1])),
            inst("b", "sfo1", Some([10, 0, 0, 2])),
            inst("c", "sgp1", Some([10, 0, 0, 3])),
            inst("d", "sfo1", Some([10, 0, 0, 4])),
            inst("e", "sfo1", None),
        ];
        assert_eq!(
            backend_lines(&lb, &fleet, 80),
            vec![
                "    server b 10.0.0.2:80 check",
                "    server d 10.0.0.4:80 check",
                "    server a 10.0.0.1:80 check",
                "    server c 10.0.0.3:80 check",
            ]
        );
    }

    #[test]
    fn digest_is_lowercase_hex() {
        assert_eq!(
            sha256_hex(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
