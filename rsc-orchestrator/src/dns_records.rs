use anyhow::{Context, Result};
use rsc_common::{
    ChangeAction, FleetError, HealthCheck, HostedZone, Instance, RecordChange, RecordSet,
    RegionMap, BACKEND_RECORD_TTL,
};
use rsc_providers::DnsProvider;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
pub struct DnsSettings {
    /// Zone name as the DNS provider reports it (`runsomecode.com.`).
    pub zone_name: String,
    /// Host name every weighted backend record shares (`backend.runsomecode.com.`).
    pub record_name: String,
    pub ttl: i64,
    pub region_map: RegionMap,
}

impl DnsSettings {
    pub fn new(domain: &str, region_map: RegionMap) -> Self {
        let domain = domain.trim_end_matches('.');
        Self {
            zone_name: format!("{}.", domain),
            record_name: format!("backend.{}.", domain),
            ttl: BACKEND_RECORD_TTL,
            region_map,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordPlan {
    pub delete: Vec<RecordSet>,
    pub create: Vec<RecordSet>,
}

impl RecordPlan {
    pub fn is_noop(&self) -> bool {
        self.delete.is_empty() && self.create.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DnsChanges {
    pub hosted_zone_id: String,
    pub deleted: Vec<RecordSet>,
    pub created: Vec<RecordSet>,
    pub change_ids: Vec<String>,
}

pub fn find_zone(zones: Vec<HostedZone>, zone_name: &str) -> Result<HostedZone, FleetError> {
    zones
        .into_iter()
        .find(|z| z.name == zone_name)
        .ok_or_else(|| FleetError::HostedZoneNotFound(zone_name.to_string()))
}

/// Compute the full change set. Nothing is returned unless every new record
/// could be resolved, so a lookup failure never leaves a half-applied zone.
pub fn plan_record_changes(
    settings: &DnsSettings,
    existing: &[RecordSet],
    health_checks: &[HealthCheck],
    desired: &[Instance],
) -> Result<RecordPlan, FleetError> {
    // Address -> owning instance name; the first instance wins on a shared address.
    let mut owners: HashMap<String, &str> = HashMap::new();
    for instance in desired {
        if let Some(ip) = instance.ip_string() {
            owners.entry(ip).or_insert(instance.name.as_str());
        }
    }

    // A backend record survives only if it points at a desired address and
    // still names that address's owner. A reused address therefore gets
    // delete + create. Other names in the zone are judged by address alone.
    let mut plan = RecordPlan::default();
    let mut covered: HashSet<String> = HashSet::new();
    for record in existing.iter().filter(|r| r.is_plain_a_record()) {
        if record.name != settings.record_name {
            let desired_ip = record.primary_value().is_some_and(|ip| owners.contains_key(ip));
            if !desired_ip {
                plan.delete.push(record.clone());
            }
            continue;
        }
        let owned = record.primary_value().and_then(|ip| {
            let owner = owners.get(ip)?;
            (record.set_identifier.as_deref() == Some(*owner)).then_some(ip)
        });
        match owned {
            Some(ip) if covered.insert(ip.to_string()) => {}
            _ => plan.delete.push(record.clone()),
        }
    }

    let checks_by_ip: HashMap<&str, &str> = health_checks
        .iter()
        .filter_map(|hc| hc.ip_address.as_deref().map(|ip| (ip, hc.id.as_str())))
        .collect();

    for instance in desired {
        let Some(ip) = instance.ip_string() else {
            continue;
        };
        if !covered.insert(ip.clone()) {
            continue;
        }
        let health_check_id = checks_by_ip.get(ip.as_str()).ok_or_else(|| {
            FleetError::HealthCheckMissing {
                ip: ip.clone(),
                instance: instance.name.clone(),
            }
        })?;
        let region = settings
            .region_map
            .dns_region(&instance.region_slug)
            .ok_or_else(|| FleetError::RegionMappingMissing {
                region: instance.region_slug.clone(),
                instance: instance.name.clone(),
            })?;
        plan.create.push(RecordSet {
            name: settings.record_name.clone(),
            record_type: "A".to_string(),
            set_identifier: Some(instance.name.clone()),
            region: Some(region.to_string()),
            ttl: Some(settings.ttl),
            values: vec![ip],
            health_check_id: Some(health_check_id.to_string()),
            is_alias: false,
        });
    }
    Ok(plan)
}

fn batch(action: ChangeAction, records: &[RecordSet]) -> Vec<RecordChange> {
    records
        .iter()
        .map(|record| RecordChange {
            action,
            record: record.clone(),
        })
        .collect()
}

/// Make the latency-routed backend records match the desired fleet. Health
/// checks must already exist for every desired address.
pub async fn reconcile_dns_records(
    dns: &(impl DnsProvider + ?Sized),
    settings: &DnsSettings,
    desired: &[Instance],
) -> Result<DnsChanges> {
    let zones = dns
        .list_hosted_zones_by_name(&settings.zone_name)
        .await
        .context("listing hosted zones")?;
    let zone = find_zone(zones, &settings.zone_name)?;

    let existing = dns
        .list_record_sets(&zone.id)
        .await
        .with_context(|| format!("listing record sets of {}", zone.id))?;
    let health_checks = dns
        .list_health_checks()
        .await
        .context("listing health checks")?;

    let plan = plan_record_changes(settings, &existing, &health_checks, desired)?;

    let mut changes = DnsChanges {
        hosted_zone_id: zone.id.clone(),
        ..DnsChanges::default()
    };
    if plan.is_noop() {
        tracing::info!("[Dns] {} already matches the fleet", settings.record_name);
        return Ok(changes);
    }

    if !plan.delete.is_empty() {
        for r in &plan.delete {
            tracing::info!(
                "[Dns] DELETE {} {:?} -> {}",
                r.name,
                r.set_identifier,
                r.primary_value().unwrap_or("-")
            );
        }
        let change_id = dns
            .change_record_sets(&zone.id, &batch(ChangeAction::Delete, &plan.delete))
            .await
            .context("submitting record deletions")?;
        changes.change_ids.push(change_id);
        changes.deleted = plan.delete;
    }

    if !plan.create.is_empty() {
        for r in &plan.create {
            tracing::info!(
                "[Dns] CREATE {} {:?} -> {} ({})",
                r.name,
                r.set_identifier,
                r.primary_value().unwrap_or("-"),
                r.region.as_deref().unwrap_or("-")
            );
        }
        let change_id = dns
            .change_record_sets(&zone.id, &batch(ChangeAction::Create, &plan.create))
            .await
            .context("submitting record creations")?;
        changes.change_ids.push(change_id);
        changes.created = plan.create;
    }

    Ok(changes)
}
