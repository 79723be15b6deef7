use anyhow::Result;
use rsc_common::naming::parse_instance_name;
use rsc_common::{FleetError, Image, Instance, InstanceClass, InstanceStatus};
use rsc_providers::inventory::DiscoveredInstance;
use rsc_providers::ComputeProvider;
use std::collections::HashMap;
use std::net::Ipv4Addr;

/// Per-call lookup cache so a fleet of N droplets in R regions costs R region
/// lookups, not N.
#[derive(Default)]
struct Enricher {
    regions: HashMap<String, String>,
    images: HashMap<String, String>,
}

impl Enricher {
    async fn region_slug(
        &mut self,
        compute: &(impl ComputeProvider + ?Sized),
        region_id: &str,
    ) -> Result<String> {
        if let Some(slug) = self.regions.get(region_id) {
            return Ok(slug.clone());
        }
        let region = compute
            .find_region(region_id)
            .await?
            .ok_or_else(|| FleetError::RegionNotFound(region_id.to_string()))?;
        self.regions.insert(region_id.to_string(), region.slug.clone());
        Ok(region.slug)
    }

    async fn image_name(
        &mut self,
        compute: &(impl ComputeProvider + ?Sized),
        image_id: &str,
    ) -> Result<String> {
        if let Some(name) = self.images.get(image_id) {
            return Ok(name.clone());
        }
        let image = compute
            .find_image(image_id)
            .await?
            .ok_or_else(|| FleetError::ImageNotFound(image_id.to_string()))?;
        self.images.insert(image_id.to_string(), image.name.clone());
        Ok(image.name)
    }

    async fn enrich(
        &mut self,
        compute: &(impl ComputeProvider + ?Sized),
        d: &DiscoveredInstance,
    ) -> Result<Instance> {
        let region_slug = self.region_slug(compute, &d.region_id).await?;
        let image_name = self.image_name(compute, &d.image_id).await?;
        Ok(Instance {
            id: d.provider_id.clone(),
            name: d.name.clone(),
            ip_address: parse_ip(d),
            region_slug,
            image_id: d.image_id.clone(),
            image_name,
            status: InstanceStatus::from_provider(&d.status),
        })
    }
}

fn parse_ip(d: &DiscoveredInstance) -> Option<Ipv4Addr> {
    let raw = d.ip_address.as_deref()?.trim();
    // Strip CIDR suffix if present (e.g. "1.2.3.4/32" -> "1.2.3.4")
    let clean = raw.split('/').next().unwrap_or(raw);
    match clean.parse::<Ipv4Addr>() {
        Ok(ip) => Some(ip),
        Err(_) => {
            tracing::warn!("[Fleet] Instance {} has unparsable address {:?}", d.provider_id, raw);
            None
        }
    }
}

/// Resolve region slug and image name for one provider instance.
pub async fn enrich_instance(
    compute: &(impl ComputeProvider + ?Sized),
    d: &DiscoveredInstance,
) -> Result<Instance> {
    Enricher::default().enrich(compute, d).await
}

/// Fleet ordering: region, image name, address text (unassigned addresses first).
pub fn sort_fleet(instances: &mut [Instance]) {
    instances.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}

/// All instances of `class`, enriched and ordered. Any failed lookup fails the
/// whole call.
pub async fn list_fleet(
    compute: &(impl ComputeProvider + ?Sized),
    class: InstanceClass,
) -> Result<Vec<Instance>> {
    let discovered = compute.list_instances().await?;
    let marker = class.image_marker();

    let mut enricher = Enricher::default();
    let mut fleet = Vec::new();
    for d in &discovered {
        let instance = enricher.enrich(compute, d).await?;
        if !instance.image_name.contains(&marker) {
            continue;
        }
        if parse_instance_name(&instance.name).map(|n| n.class) != Some(class) {
            tracing::debug!(
                "[Fleet] {} runs a {} image but doesn't follow the naming convention",
                instance.name,
                class
            );
        }
        fleet.push(instance);
    }
    sort_fleet(&mut fleet);

    tracing::info!(
        "[Fleet] {} {} instance(s) out of {} on the account",
        fleet.len(),
        class,
        discovered.len()
    );
    Ok(fleet)
}

pub fn filter_images(images: Vec<Image>, class: InstanceClass) -> Vec<Image> {
    let marker = class.image_marker();
    let mut out: Vec<Image> = images
        .into_iter()
        .filter(|i| i.name.contains(&marker))
        .collect();
    out.sort_by(|a, b| a.name.cmp(&b.name));
    out
}

/// Lexicographically greatest image name for the region wins; names embed a
/// build date so this tracks recency as long as the naming stays monotonic.
pub fn select_latest_image(images: &[Image], region_slug: &str, class: InstanceClass) -> Option<Image> {
    let marker = class.region_image_marker(region_slug);
    images
        .iter()
        .filter(|i| i.name.contains(&marker))
        .max_by(|a, b| a.name.cmp(&b.name))
        .cloned()
}

pub async fn list_images(
    compute: &(impl ComputeProvider + ?Sized),
    class: InstanceClass,
) -> Result<Vec<Image>> {
    Ok(filter_images(compute.list_images().await?, class))
}

pub async fn latest_image(
    compute: &(impl ComputeProvider + ?Sized),
    region_slug: &str,
    class: InstanceClass,
) -> Result<Option<Image>> {
    let images = list_images(compute, class).await?;
    Ok(select_latest_image(&images, region_slug, class))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(name: &str, region: &str, image: &str, ip: Option<[u8; 4]>) -> Instance {
        Instance {
            id: name.to_string(),
            name: name.to_string(),
            ip_address: ip.map(Ipv4Addr::from),
            region_slug: region.to_string(),
            image_id: "1".to_string(),
            image_name: image.to_string(),
            status: InstanceStatus::Active,
        }
    }

    fn image(name: &str) -> Image {
        Image {
            id: name.to_string(),
            name: name.to_string(),
            regions: vec![],
        }
    }

    #[test]
    fn fleet_sorts_by_region_image_then_address() {
        let mut fleet = vec![
            instance("c", "sfo1", "rsc run sfo1 2014-10-01", Some([10, 0, 0, 1])),
            instance("b", "lon1", "rsc run lon1 2014-10-02", Some([10, 0, 0, 1])),
            instance("a2", "lon1", "rsc run lon1 2014-10-01", Some([10, 0, 0, 20])),
            instance("a1", "lon1", "rsc run lon1 2014-10-01", Some([10, 0, 0, 3])),
            instance("a0", "lon1", "rsc run lon1 2014-10-01", None),
        ];
        sort_fleet(&mut fleet);
        let names: Vec<&str> = fleet.iter().map(|i| i.name.as_str()).collect();
        // Addresses compare as text, not numerically.
        assert_eq!(names, vec!["a0", "a2", "a1", "b", "c"]);
    }

    #[test]
    fn image_filter_by_class() {
        let images = vec![
            image("rsc run lon1 2014-10-02"),
            image("rsc loadbalancer lon1 2014-10-01"),
            image("ubuntu 14.04"),
            image("rsc run lon1 2014-10-01"),
        ];
        let run = filter_images(images.clone(), InstanceClass::Run);
        assert_eq!(
            run.iter().map(|i| i.name.as_str()).collect::<Vec<_>>(),
            vec!["rsc run lon1 2014-10-01", "rsc run lon1 2014-10-02"]
        );
        assert_eq!(filter_images(images, InstanceClass::LoadBalancer).len(), 1);
    }

    #[test]
    fn latest_image_is_greatest_name_in_region() {
        let images = vec![
            image("rsc run lon1 2014-10-01"),
            image("rsc run lon1 2014-11-15"),
            image("rsc run sfo1 2014-12-01"),
            image("rsc loadbalancer lon1 2015-01-01"),
        ];
        let latest = select_latest_image(&images, "lon1", InstanceClass::Run).unwrap();
        assert_eq!(latest.name, "rsc run lon1 2014-11-15");
        assert_eq!(select_latest_image(&images, "sgp1", InstanceClass::Run), None);
    }

    #[test]
    fn cidr_suffix_is_stripped() {
        let d = DiscoveredInstance {
            provider_id: "1".to_string(),
            name: "x".to_string(),
            region_id: "lon1".to_string(),
            image_id: "2".to_string(),
            status: "active".to_string(),
            ip_address: Some("10.1.2.3/32".to_string()),
        };
        assert_eq!(parse_ip(&d), Some(Ipv4Addr::new(10, 1, 2, 3)));
        let bad = DiscoveredInstance {
            ip_address: Some("2001:db8::1".to_string()),
            ..d
        };
        assert_eq!(parse_ip(&bad), None);
    }
}
