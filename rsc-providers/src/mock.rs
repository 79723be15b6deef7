//! In-memory providers. Every call is recorded so tests can assert on what was
//! sent and in which order; DNS changes are validated the way Route 53 does
//! (a DELETE must match an existing record, a CREATE must not collide).

use crate::{inventory, ComputeProvider, DnsProvider, RemoteHost};
use anyhow::Result;
use async_trait::async_trait;
use rsc_common::{
    ChangeAction, HealthCheck, HealthCheckSpec, HostedZone, Image, NewInstance, RecordChange,
    RecordSet, Region, Size, SshKey,
};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ----------------------------------------------------------------------------
// Compute
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ComputeCall {
    ListInstances,
    FindInstance(String),
    CreateInstance(NewInstance),
    DestroyInstance(String),
    PowerCycle(String),
    ListImages,
    FindImage(String),
    DestroyImage(String),
    ListRegions,
    ListSizes,
    ListSshKeys,
}

#[derive(Default)]
struct ComputeState {
    instances: Vec<inventory::DiscoveredInstance>,
    images: Vec<Image>,
    regions: Vec<Region>,
    sizes: Vec<Size>,
    ssh_keys: Vec<SshKey>,
    /// Remaining `find_instance` calls before a created instance turns active.
    boot_countdown: HashMap<String, u32>,
    polls_until_active: u32,
    next_id: u64,
    fail_listing: bool,
    calls: Vec<ComputeCall>,
}

#[derive(Default)]
pub struct MockCompute {
    state: Mutex<ComputeState>,
}

impl MockCompute {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_region(&self, slug: &str) {
        lock(&self.state).regions.push(Region {
            id: slug.to_string(),
            slug: slug.to_string(),
            name: slug.to_uppercase(),
        });
    }

    pub fn add_image(&self, id: &str, name: &str) {
        lock(&self.state).images.push(Image {
            id: id.to_string(),
            name: name.to_string(),
            regions: vec![],
        });
    }

    pub fn add_size(&self, slug: &str) {
        lock(&self.state).sizes.push(Size {
            id: slug.to_string(),
            slug: slug.to_string(),
        });
    }

    pub fn add_ssh_key(&self, id: &str, name: &str) {
        lock(&self.state).ssh_keys.push(SshKey {
            id: id.to_string(),
            name: name.to_string(),
        });
    }

    pub fn add_instance(&self, id: &str, name: &str, region: &str, image_id: &str, ip: Option<&str>) {
        lock(&self.state).instances.push(inventory::DiscoveredInstance {
            provider_id: id.to_string(),
            name: name.to_string(),
            region_id: region.to_string(),
            image_id: image_id.to_string(),
            status: "active".to_string(),
            ip_address: ip.map(|s| s.to_string()),
        });
    }

    pub fn remove_instance(&self, id: &str) {
        lock(&self.state).instances.retain(|i| i.provider_id != id);
    }

    /// Newly created instances report `new` for this many polls, then `active`.
    pub fn set_polls_until_active(&self, polls: u32) {
        lock(&self.state).polls_until_active = polls;
    }

    pub fn fail_listing(&self, fail: bool) {
        lock(&self.state).fail_listing = fail;
    }

    pub fn instances(&self) -> Vec<inventory::DiscoveredInstance> {
        lock(&self.state).instances.clone()
    }

    pub fn images(&self) -> Vec<Image> {
        lock(&self.state).images.clone()
    }

    pub fn calls(&self) -> Vec<ComputeCall> {
        lock(&self.state).calls.clone()
    }
}

#[async_trait]
impl ComputeProvider for MockCompute {
    async fn list_instances(&self) -> Result<Vec<inventory::DiscoveredInstance>> {
        let mut st = lock(&self.state);
        st.calls.push(ComputeCall::ListInstances);
        if st.fail_listing {
            return Err(anyhow::anyhow!("mock compute unavailable"));
        }
        Ok(st.instances.clone())
    }

    async fn find_instance(&self, instance_id: &str) -> Result<inventory::DiscoveredInstance> {
        let mut st = lock(&self.state);
        st.calls.push(ComputeCall::FindInstance(instance_id.to_string()));
        if let Some(remaining) = st.boot_countdown.get_mut(instance_id) {
            if *remaining == 0 {
                st.boot_countdown.remove(instance_id);
                if let Some(inst) = st.instances.iter_mut().find(|i| i.provider_id == instance_id) {
                    inst.status = "active".to_string();
                }
            } else {
                *remaining -= 1;
            }
        }
        st.instances
            .iter()
            .find(|i| i.provider_id == instance_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("instance {} not found", instance_id))
    }

    async fn create_instance(&self, request: &NewInstance) -> Result<inventory::DiscoveredInstance> {
        let mut st = lock(&self.state);
        st.calls.push(ComputeCall::CreateInstance(request.clone()));
        st.next_id += 1;
        let id = format!("mock-{}", st.next_id);
        let created = inventory::DiscoveredInstance {
            provider_id: id.clone(),
            name: request.name.clone(),
            region_id: request.region_id.clone(),
            image_id: request.image_id.clone(),
            status: "new".to_string(),
            ip_address: Some(format!("192.0.2.{}", st.next_id)),
        };
        st.instances.push(created.clone());
        let polls = st.polls_until_active;
        st.boot_countdown.insert(id, polls);
        Ok(created)
    }

    async fn destroy_instance(&self, instance_id: &str) -> Result<bool> {
        let mut st = lock(&self.state);
        st.calls.push(ComputeCall::DestroyInstance(instance_id.to_string()));
        let before = st.instances.len();
        st.instances.retain(|i| i.provider_id != instance_id);
        Ok(st.instances.len() != before)
    }

    async fn power_cycle_instance(&self, instance_id: &str) -> Result<bool> {
        let mut st = lock(&self.state);
        st.calls.push(ComputeCall::PowerCycle(instance_id.to_string()));
        Ok(st.instances.iter().any(|i| i.provider_id == instance_id))
    }

    async fn list_images(&self) -> Result<Vec<Image>> {
        let mut st = lock(&self.state);
        st.calls.push(ComputeCall::ListImages);
        Ok(st.images.clone())
    }

    async fn find_image(&self, image_id: &str) -> Result<Option<Image>> {
        let mut st = lock(&self.state);
        st.calls.push(ComputeCall::FindImage(image_id.to_string()));
        Ok(st.images.iter().find(|i| i.id == image_id).cloned())
    }

    async fn destroy_image(&self, image_id: &str) -> Result<bool> {
        let mut st = lock(&self.state);
        st.calls.push(ComputeCall::DestroyImage(image_id.to_string()));
        let before = st.images.len();
        st.images.retain(|i| i.id != image_id);
        Ok(st.images.len() != before)
    }

    async fn list_regions(&self) -> Result<Vec<Region>> {
        let mut st = lock(&self.state);
        st.calls.push(ComputeCall::ListRegions);
        Ok(st.regions.clone())
    }

    async fn list_sizes(&self) -> Result<Vec<Size>> {
        let mut st = lock(&self.state);
        st.calls.push(ComputeCall::ListSizes);
        Ok(st.sizes.clone())
    }

    async fn list_ssh_keys(&self) -> Result<Vec<SshKey>> {
        let mut st = lock(&self.state);
        st.calls.push(ComputeCall::ListSshKeys);
        Ok(st.ssh_keys.clone())
    }
}

// ----------------------------------------------------------------------------
// DNS
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DnsCall {
    ListHostedZones(String),
    ListRecordSets(String),
    ChangeRecordSets(Vec<RecordChange>),
    ListHealthChecks,
    CreateHealthCheck(String),
    DeleteHealthCheck(String),
}

#[derive(Default)]
struct DnsState {
    zones: Vec<HostedZone>,
    records: HashMap<String, Vec<RecordSet>>,
    health_checks: Vec<HealthCheck>,
    next_id: u64,
    fail_changes: bool,
    calls: Vec<DnsCall>,
}

#[derive(Default)]
pub struct MockDns {
    state: Mutex<DnsState>,
}

fn same_record(a: &RecordSet, b: &RecordSet) -> bool {
    a.name == b.name && a.record_type == b.record_type && a.set_identifier == b.set_identifier
}

impl MockDns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a zone and return its id.
    pub fn add_zone(&self, name: &str) -> String {
        let mut st = lock(&self.state);
        st.next_id += 1;
        let id = format!("/hostedzone/Z{}", st.next_id);
        st.zones.push(HostedZone {
            id: id.clone(),
            name: name.to_string(),
        });
        st.records.insert(id.clone(), vec![]);
        id
    }

    pub fn add_record(&self, zone_id: &str, record: RecordSet) {
        lock(&self.state)
            .records
            .entry(zone_id.to_string())
            .or_default()
            .push(record);
    }

    pub fn add_health_check(&self, ip: Option<&str>) -> String {
        let mut st = lock(&self.state);
        st.next_id += 1;
        let id = format!("hc-{}", st.next_id);
        st.health_checks.push(HealthCheck {
            id: id.clone(),
            ip_address: ip.map(|s| s.to_string()),
        });
        id
    }

    pub fn fail_changes(&self, fail: bool) {
        lock(&self.state).fail_changes = fail;
    }

    pub fn records(&self, zone_id: &str) -> Vec<RecordSet> {
        lock(&self.state)
            .records
            .get(zone_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn health_checks(&self) -> Vec<HealthCheck> {
        lock(&self.state).health_checks.clone()
    }

    pub fn calls(&self) -> Vec<DnsCall> {
        lock(&self.state).calls.clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }

    /// Calls that would mutate provider state.
    pub fn mutating_calls(&self) -> Vec<DnsCall> {
        self.calls()
            .into_iter()
            .filter(|c| {
                matches!(
                    c,
                    DnsCall::ChangeRecordSets(_)
                        | DnsCall::CreateHealthCheck(_)
                        | DnsCall::DeleteHealthCheck(_)
                )
            })
            .collect()
    }
}

#[async_trait]
impl DnsProvider for MockDns {
    async fn list_hosted_zones_by_name(&self, dns_name: &str) -> Result<Vec<HostedZone>> {
        let mut st = lock(&self.state);
        st.calls.push(DnsCall::ListHostedZones(dns_name.to_string()));
        let mut zones: Vec<HostedZone> = st
            .zones
            .iter()
            .filter(|z| z.name.as_str() >= dns_name)
            .cloned()
            .collect();
        zones.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(zones)
    }

    async fn list_record_sets(&self, hosted_zone_id: &str) -> Result<Vec<RecordSet>> {
        let mut st = lock(&self.state);
        st.calls.push(DnsCall::ListRecordSets(hosted_zone_id.to_string()));
        st.records
            .get(hosted_zone_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("NoSuchHostedZone: {}", hosted_zone_id))
    }

    async fn change_record_sets(
        &self,
        hosted_zone_id: &str,
        changes: &[RecordChange],
    ) -> Result<String> {
        let mut st = lock(&self.state);
        st.calls.push(DnsCall::ChangeRecordSets(changes.to_vec()));
        if st.fail_changes {
            return Err(anyhow::anyhow!("mock route53 throttled"));
        }
        if changes.is_empty() {
            return Err(anyhow::anyhow!("InvalidChangeBatch: empty change batch"));
        }

        // The batch is atomic: validate against a copy, commit at the end.
        let mut records = st
            .records
            .get(hosted_zone_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("NoSuchHostedZone: {}", hosted_zone_id))?;
        for change in changes {
            match change.action {
                ChangeAction::Delete => {
                    let Some(pos) = records.iter().position(|r| r == &change.record) else {
                        return Err(anyhow::anyhow!(
                            "InvalidChangeBatch: record {:?} not found or fields differ",
                            change.record.set_identifier
                        ));
                    };
                    records.remove(pos);
                }
                ChangeAction::Create => {
                    if records.iter().any(|r| same_record(r, &change.record)) {
                        return Err(anyhow::anyhow!(
                            "InvalidChangeBatch: record {:?} already exists",
                            change.record.set_identifier
                        ));
                    }
                    records.push(change.record.clone());
                }
            }
        }
        st.records.insert(hosted_zone_id.to_string(), records);
        st.next_id += 1;
        Ok(format!("/change/C{}", st.next_id))
    }

    async fn list_health_checks(&self) -> Result<Vec<HealthCheck>> {
        let mut st = lock(&self.state);
        st.calls.push(DnsCall::ListHealthChecks);
        Ok(st.health_checks.clone())
    }

    async fn create_health_check(&self, spec: &HealthCheckSpec) -> Result<HealthCheck> {
        let mut st = lock(&self.state);
        st.calls.push(DnsCall::CreateHealthCheck(spec.ip_address.clone()));
        st.next_id += 1;
        let hc = HealthCheck {
            id: format!("hc-{}", st.next_id),
            ip_address: Some(spec.ip_address.clone()),
        };
        st.health_checks.push(hc.clone());
        Ok(hc)
    }

    async fn delete_health_check(&self, health_check_id: &str) -> Result<()> {
        let mut st = lock(&self.state);
        st.calls.push(DnsCall::DeleteHealthCheck(health_check_id.to_string()));
        let before = st.health_checks.len();
        st.health_checks.retain(|h| h.id != health_check_id);
        if st.health_checks.len() == before {
            return Err(anyhow::anyhow!("NoSuchHealthCheck: {}", health_check_id));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Remote host
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemoteCall {
    Download { host: String, path: String },
    Upload { host: String, path: String, content: String },
    Exec { host: String, command: String },
}

struct RemoteState {
    files: HashMap<(String, String), String>,
    exec_result: inventory::CommandOutput,
    unreachable: Vec<String>,
    calls: Vec<RemoteCall>,
}

pub struct MockRemote {
    state: Mutex<RemoteState>,
}

impl Default for MockRemote {
    fn default() -> Self {
        Self {
            state: Mutex::new(RemoteState {
                files: HashMap::new(),
                exec_result: inventory::CommandOutput {
                    exit_code: Some(0),
                    stdout: "Reloading haproxy: haproxy.\n".to_string(),
                    stderr: String::new(),
                },
                unreachable: vec![],
                calls: vec![],
            }),
        }
    }
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_file(&self, host: &str, path: &str, content: &str) {
        lock(&self.state)
            .files
            .insert((host.to_string(), path.to_string()), content.to_string());
    }

    pub fn file(&self, host: &str, path: &str) -> Option<String> {
        lock(&self.state)
            .files
            .get(&(host.to_string(), path.to_string()))
            .cloned()
    }

    pub fn set_exec_result(&self, exit_code: Option<i32>, stdout: &str, stderr: &str) {
        lock(&self.state).exec_result = inventory::CommandOutput {
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        };
    }

    pub fn set_unreachable(&self, host: &str) {
        lock(&self.state).unreachable.push(host.to_string());
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        lock(&self.state).calls.clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }
}

#[async_trait]
impl RemoteHost for MockRemote {
    async fn download(&self, host: &str, remote_path: &str) -> Result<String> {
        let mut st = lock(&self.state);
        st.calls.push(RemoteCall::Download {
            host: host.to_string(),
            path: remote_path.to_string(),
        });
        if st.unreachable.iter().any(|h| h == host) {
            return Err(anyhow::anyhow!("ssh: connect to host {} port 22: Connection refused", host));
        }
        st.files
            .get(&(host.to_string(), remote_path.to_string()))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("scp: {}: No such file or directory", remote_path))
    }

    async fn upload(&self, host: &str, remote_path: &str, content: &str) -> Result<()> {
        let mut st = lock(&self.state);
        st.calls.push(RemoteCall::Upload {
            host: host.to_string(),
            path: remote_path.to_string(),
            content: content.to_string(),
        });
        st.files
            .insert((host.to_string(), remote_path.to_string()), content.to_string());
        Ok(())
    }

    async fn exec(&self, host: &str, command: &str) -> Result<inventory::CommandOutput> {
        let mut st = lock(&self.state);
        st.calls.push(RemoteCall::Exec {
            host: host.to_string(),
            command: command.to_string(),
        });
        Ok(st.exec_result.clone())
    }
}
