use anyhow::{Context, Result};
use rsc_common::{HealthCheck, HealthCheckSpec, Instance};
use rsc_providers::DnsProvider;
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HealthCheckChanges {
    pub deleted: Vec<HealthCheck>,
    pub created: Vec<HealthCheck>,
}

impl HealthCheckChanges {
    pub fn is_noop(&self) -> bool {
        self.deleted.is_empty() && self.created.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthCheckPlan {
    pub delete: Vec<HealthCheck>,
    pub create: Vec<String>,
}

/// Desired addresses in fleet order, deduplicated. Instances without an
/// address yet are skipped.
pub fn desired_ips(desired: &[Instance]) -> Vec<String> {
    let mut seen = HashSet::new();
    desired
        .iter()
        .filter_map(|i| i.ip_string())
        .filter(|ip| seen.insert(ip.clone()))
        .collect()
}

pub fn plan_health_checks(existing: &[HealthCheck], desired: &[Instance]) -> HealthCheckPlan {
    let wanted = desired_ips(desired);
    let wanted_set: HashSet<&str> = wanted.iter().map(|s| s.as_str()).collect();

    let mut plan = HealthCheckPlan::default();
    let mut kept: HashSet<&str> = HashSet::new();
    for hc in existing {
        // Checks on a domain name are not ours.
        let Some(ip) = hc.ip_address.as_deref() else {
            continue;
        };
        if !wanted_set.contains(ip) || !kept.insert(ip) {
            plan.delete.push(hc.clone());
        }
    }
    plan.create = wanted
        .into_iter()
        .filter(|ip| !kept.contains(ip.as_str()))
        .collect();
    plan
}

/// Make the set of monitored addresses equal the desired fleet's addresses.
/// All deletions are issued before any creation.
pub async fn reconcile_health_checks(
    dns: &(impl DnsProvider + ?Sized),
    desired: &[Instance],
) -> Result<HealthCheckChanges> {
    let existing = dns
        .list_health_checks()
        .await
        .context("listing health checks")?;
    let plan = plan_health_checks(&existing, desired);

    let mut changes = HealthCheckChanges::default();
    for hc in plan.delete {
        tracing::info!(
            "[HealthChecks] Deleting health check {} ({})",
            hc.id,
            hc.ip_address.as_deref().unwrap_or("-")
        );
        dns.delete_health_check(&hc.id)
            .await
            .with_context(|| format!("deleting health check {}", hc.id))?;
        changes.deleted.push(hc);
    }
    for ip in plan.create {
        tracing::info!("[HealthChecks] Creating health check for {}", ip);
        let hc = dns
            .create_health_check(&HealthCheckSpec::for_ip(&ip))
            .await
            .with_context(|| format!("creating health check for {}", ip))?;
        changes.created.push(hc);
    }

    if changes.is_noop() {
        tracing::info!(
            "[HealthChecks] {} check(s) already match the fleet",
            existing.len()
        );
    }
    Ok(changes)
}
