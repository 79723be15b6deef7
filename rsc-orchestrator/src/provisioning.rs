use anyhow::{Context, Result};
use rsc_common::naming::generate_instance_name;
use rsc_common::{FleetError, Image, Instance, InstanceClass, InstanceStatus, NewInstance};
use rsc_providers::inventory::DiscoveredInstance;
use rsc_providers::ComputeProvider;
use serde::Serialize;
use std::time::Duration;

use crate::fleet::{enrich_instance, latest_image};
use crate::poller::{poll_until, Clock, PollOutcome};

#[derive(Debug, Clone)]
pub struct ProvisionSettings {
    pub domain: String,
    pub ssh_key_name: String,
    pub size_slug: String,
    pub poll_interval: Duration,
    pub boot_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartReport {
    pub image: Image,
    pub request: NewInstance,
    pub outcome: PollOutcome<Instance>,
}

/// Boot a new instance of `class` in `region_slug` from the newest matching
/// image and wait for it to turn active. A boot timeout is reported in the
/// outcome; the instance is left running either way.
pub async fn start_instance_with_latest_image(
    compute: &(impl ComputeProvider + ?Sized),
    settings: &ProvisionSettings,
    clock: &(impl Clock + ?Sized),
    region_slug: &str,
    class: InstanceClass,
) -> Result<StartReport> {
    let image = latest_image(compute, region_slug, class)
        .await?
        .ok_or_else(|| FleetError::NoImageForRegion {
            class: class.to_string(),
            region: region_slug.to_string(),
        })?;

    let ssh_key = compute
        .list_ssh_keys()
        .await?
        .into_iter()
        .find(|k| k.name == settings.ssh_key_name)
        .ok_or_else(|| FleetError::SshKeyNotFound(settings.ssh_key_name.clone()))?;
    let size = compute
        .list_sizes()
        .await?
        .into_iter()
        .find(|s| s.slug == settings.size_slug)
        .ok_or_else(|| FleetError::SizeNotFound(settings.size_slug.clone()))?;
    let region = compute
        .find_region(region_slug)
        .await?
        .ok_or_else(|| FleetError::RegionNotFound(region_slug.to_string()))?;

    let request = NewInstance {
        name: generate_instance_name(class, &region.slug, &settings.domain),
        size_id: size.id,
        image_id: image.id.clone(),
        region_id: region.id,
        ssh_key_ids: vec![ssh_key.id],
    };
    tracing::info!(
        "[Provision] Creating {} from image {:?} ({})",
        request.name,
        image.name,
        image.id
    );
    let created = compute
        .create_instance(&request)
        .await
        .with_context(|| format!("creating {}", request.name))?;
    let instance_id = created.provider_id.clone();
    let instance_id = instance_id.as_str();

    let polled = poll_until(
        move || compute.find_instance(instance_id),
        |d: &DiscoveredInstance| InstanceStatus::from_provider(&d.status) == InstanceStatus::Active,
        settings.poll_interval,
        settings.boot_timeout,
        clock,
    )
    .await
    .with_context(|| format!("waiting for {} to boot", request.name))?;

    let outcome = match polled {
        PollOutcome::Reached(d) => {
            let instance = enrich_instance(compute, &d).await?;
            tracing::info!(
                "[Provision] {} is active at {}",
                instance.name,
                instance.ip_string().unwrap_or_else(|| "-".to_string())
            );
            PollOutcome::Reached(instance)
        }
        PollOutcome::TimedOut(last) => {
            let last = last.unwrap_or(created);
            tracing::warn!(
                "[Provision] {} still {:?} after {:?}, leaving it running",
                last.name,
                last.status,
                settings.boot_timeout
            );
            PollOutcome::TimedOut(Some(enrich_instance(compute, &last).await?))
        }
    };

    Ok(StartReport {
        image,
        request,
        outcome,
    })
}

pub async fn power_cycle(compute: &(impl ComputeProvider + ?Sized), instance_id: &str) -> Result<bool> {
    let done = compute
        .power_cycle_instance(instance_id)
        .await
        .with_context(|| format!("power cycling {}", instance_id))?;
    if done {
        tracing::info!("[Provision] Power cycle requested for {}", instance_id);
    } else {
        tracing::warn!("[Provision] Power cycle not performed for {}", instance_id);
    }
    Ok(done)
}

pub async fn destroy_instance(compute: &(impl ComputeProvider + ?Sized), instance_id: &str) -> Result<bool> {
    let done = compute
        .destroy_instance(instance_id)
        .await
        .with_context(|| format!("destroying instance {}", instance_id))?;
    if done {
        tracing::info!("[Provision] Destroyed instance {}", instance_id);
    } else {
        tracing::warn!("[Provision] Instance {} was already gone", instance_id);
    }
    Ok(done)
}

pub async fn destroy_image(compute: &(impl ComputeProvider + ?Sized), image_id: &str) -> Result<bool> {
    let done = compute
        .destroy_image(image_id)
        .await
        .with_context(|| format!("destroying image {}", image_id))?;
    if done {
        tracing::info!("[Provision] Destroyed image {}", image_id);
    } else {
        tracing::warn!("[Provision] Image {} was already gone", image_id);
    }
    Ok(done)
}
