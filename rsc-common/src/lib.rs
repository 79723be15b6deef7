use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

pub mod error;
pub mod naming;
pub mod region_map;

pub use error::FleetError;
pub use region_map::RegionMap;

// --- Enums ---

/// Instance class, encoded in image names (`rsc <class> <region> ...`) and in
/// instance display names (`<class>.<slug>.<region>.<domain>`).
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum InstanceClass {
    Run,
    #[serde(rename = "loadbalancer")]
    LoadBalancer,
}

impl InstanceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceClass::Run => "run",
            InstanceClass::LoadBalancer => "loadbalancer",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "run" => Some(InstanceClass::Run),
            "loadbalancer" => Some(InstanceClass::LoadBalancer),
            _ => None,
        }
    }

    /// Substring every image of this class carries in its name.
    pub fn image_marker(&self) -> String {
        format!("rsc {}", self.as_str())
    }

    /// Substring carried by images of this class built for one region.
    pub fn region_image_marker(&self, region_slug: &str) -> String {
        format!("rsc {} {}", self.as_str(), region_slug)
    }
}

impl fmt::Display for InstanceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Provisioning, // Reported by the provider, not booted yet
    Active,       // Booted and reachable
    Unknown,      // Off, archived, errored or anything we don't model
}

impl InstanceStatus {
    pub fn from_provider(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "new" | "provisioning" => InstanceStatus::Provisioning,
            "active" => InstanceStatus::Active,
            _ => InstanceStatus::Unknown,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeAction {
    Create,
    Delete,
}

// --- Compute entities ---

/// A compute instance enriched with its region slug and image name.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Instance {
    pub id: String,
    pub name: String,
    pub ip_address: Option<Ipv4Addr>,
    pub region_slug: String,
    pub image_id: String,
    pub image_name: String,
    pub status: InstanceStatus,
}

impl Instance {
    /// Fleet ordering key: region, then image name, then address as text
    /// (`10.0.0.20` sorts before `10.0.0.3`).
    pub fn sort_key(&self) -> (&str, &str, Option<String>) {
        (&self.region_slug, &self.image_name, self.ip_string())
    }

    pub fn ip_string(&self) -> Option<String> {
        self.ip_address.map(|ip| ip.to_string())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Image {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub regions: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Region {
    pub id: String,
    pub slug: String,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Size {
    pub id: String,
    pub slug: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SshKey {
    pub id: String,
    pub name: String,
}

/// Parameters for a create-instance call.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct NewInstance {
    pub name: String,
    pub size_id: String,
    pub image_id: String,
    pub region_id: String,
    pub ssh_key_ids: Vec<String>,
}

// --- DNS entities ---

pub const HEALTH_CHECK_PORT: u16 = 80;
pub const HEALTH_CHECK_PATH: &str = "/ping";
pub const HEALTH_CHECK_INTERVAL_S: i32 = 30;
pub const HEALTH_CHECK_FAILURE_THRESHOLD: i32 = 3;
pub const BACKEND_RECORD_TTL: i64 = 60;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct HealthCheck {
    pub id: String,
    /// None for checks monitoring a domain name instead of an address.
    pub ip_address: Option<String>,
}

/// Fixed monitoring parameters for one address.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct HealthCheckSpec {
    pub ip_address: String,
    pub port: u16,
    pub protocol: String,
    pub resource_path: String,
    pub request_interval_s: i32,
    pub failure_threshold: i32,
}

impl HealthCheckSpec {
    pub fn for_ip(ip_address: &str) -> Self {
        Self {
            ip_address: ip_address.to_string(),
            port: HEALTH_CHECK_PORT,
            protocol: "HTTP".to_string(),
            resource_path: HEALTH_CHECK_PATH.to_string(),
            request_interval_s: HEALTH_CHECK_INTERVAL_S,
            failure_threshold: HEALTH_CHECK_FAILURE_THRESHOLD,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct HostedZone {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RecordSet {
    pub name: String,
    pub record_type: String,
    pub set_identifier: Option<String>,
    pub region: Option<String>,
    pub ttl: Option<i64>,
    pub values: Vec<String>,
    pub health_check_id: Option<String>,
    #[serde(default)]
    pub is_alias: bool,
}

impl RecordSet {
    /// The address this record points at (the first resource value).
    pub fn primary_value(&self) -> Option<&str> {
        self.values.first().map(|v| v.as_str())
    }

    pub fn is_plain_a_record(&self) -> bool {
        self.record_type == "A" && !self.is_alias
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RecordChange {
    pub action: ChangeAction,
    pub record: RecordSet,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_parse_roundtrip() {
        for c in [InstanceClass::Run, InstanceClass::LoadBalancer] {
            assert_eq!(InstanceClass::parse(c.as_str()), Some(c));
            assert_eq!(InstanceClass::parse(&c.as_str().to_uppercase()), Some(c));
        }
        assert_eq!(InstanceClass::parse("judge"), None);
    }

    #[test]
    fn class_wire_names() {
        assert_eq!(
            serde_json::to_string(&InstanceClass::LoadBalancer).unwrap(),
            "\"loadbalancer\""
        );
        assert_eq!(serde_json::to_string(&ChangeAction::Delete).unwrap(), "\"DELETE\"");
    }

    #[test]
    fn image_markers() {
        assert_eq!(InstanceClass::Run.image_marker(), "rsc run");
        assert_eq!(
            InstanceClass::LoadBalancer.region_image_marker("lon1"),
            "rsc loadbalancer lon1"
        );
    }

    #[test]
    fn provider_status_mapping() {
        assert_eq!(InstanceStatus::from_provider("new"), InstanceStatus::Provisioning);
        assert_eq!(InstanceStatus::from_provider("active"), InstanceStatus::Active);
        assert_eq!(InstanceStatus::from_provider("off"), InstanceStatus::Unknown);
        assert_eq!(InstanceStatus::from_provider("archive"), InstanceStatus::Unknown);
    }

    #[test]
    fn health_check_spec_uses_fixed_parameters() {
        let spec = HealthCheckSpec::for_ip("10.0.0.1");
        assert_eq!(spec.port, 80);
        assert_eq!(spec.protocol, "HTTP");
        assert_eq!(spec.resource_path, "/ping");
        assert_eq!(spec.request_interval_s, 30);
        assert_eq!(spec.failure_threshold, 3);
    }

    #[test]
    fn plain_a_record_detection() {
        let mut rec = RecordSet {
            name: "backend.runsomecode.com.".to_string(),
            record_type: "A".to_string(),
            set_identifier: None,
            region: None,
            ttl: Some(60),
            values: vec!["10.0.0.1".to_string()],
            health_check_id: None,
            is_alias: false,
        };
        assert!(rec.is_plain_a_record());
        assert_eq!(rec.primary_value(), Some("10.0.0.1"));
        rec.is_alias = true;
        assert!(!rec.is_plain_a_record());
        rec.is_alias = false;
        rec.record_type = "CNAME".to_string();
        assert!(!rec.is_plain_a_record());
    }
}
