#![allow(dead_code)]

use async_trait::async_trait;
use rsc_common::{RecordSet, RegionMap};
use rsc_orchestrator::convergence::Convergence;
use rsc_orchestrator::dns_records::DnsSettings;
use rsc_orchestrator::loadbalancer::LoadBalancerSettings;
use rsc_orchestrator::poller::Clock;
use rsc_providers::mock::{MockCompute, MockDns, MockRemote};
use rsc_providers::{ComputeProvider, DnsProvider, RemoteHost};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DOMAIN: &str = "runsomecode.com";
pub const ZONE: &str = "runsomecode.com.";
pub const RECORD_NAME: &str = "backend.runsomecode.com.";
pub const HAPROXY_CFG: &str = "/etc/haproxy/haproxy.cfg";

pub struct World {
    pub compute: Arc<MockCompute>,
    pub dns: Arc<MockDns>,
    pub remote: Arc<MockRemote>,
    pub zone_id: String,
}

impl World {
    /// Three regions, one "run" and one "loadbalancer" image per region, an
    /// empty hosted zone, no instances.
    pub fn new() -> Self {
        let compute = Arc::new(MockCompute::new());
        for region in ["lon1", "sfo1", "sgp1"] {
            compute.add_region(region);
            compute.add_image(
                &format!("run-{}", region),
                &format!("rsc run {} 2014-10-01", region),
            );
            compute.add_image(
                &format!("lb-{}", region),
                &format!("rsc loadbalancer {} 2014-10-01", region),
            );
        }
        compute.add_image("ubuntu", "Ubuntu 14.04 x64");
        compute.add_size("512mb");
        compute.add_size("1gb");
        compute.add_ssh_key("4242", "Mill");

        let dns = Arc::new(MockDns::new());
        dns.add_zone("example.org.");
        let zone_id = dns.add_zone(ZONE);

        Self {
            compute,
            dns,
            remote: Arc::new(MockRemote::new()),
            zone_id,
        }
    }

    pub fn add_lb(&self, id: &str, region: &str, ip: &str) -> String {
        let name = format!("loadbalancer.{}.{}.{}", id, region, DOMAIN);
        self.compute
            .add_instance(id, &name, region, &format!("lb-{}", region), Some(ip));
        self.remote.put_file(ip, HAPROXY_CFG, &haproxy_cfg(&[]));
        name
    }

    pub fn add_run(&self, id: &str, region: &str, ip: &str) -> String {
        let name = format!("run.{}.{}.{}", id, region, DOMAIN);
        self.compute
            .add_instance(id, &name, region, &format!("run-{}", region), Some(ip));
        name
    }

    pub fn convergence(&self) -> Convergence {
        let compute: Arc<dyn ComputeProvider> = self.compute.clone();
        let dns: Arc<dyn DnsProvider> = self.dns.clone();
        let remote: Arc<dyn RemoteHost> = self.remote.clone();
        Convergence::new(
            compute,
            dns,
            remote,
            DnsSettings::new(DOMAIN, RegionMap::default()),
            LoadBalancerSettings::default(),
        )
    }

    /// Plain A records for the backend name, as (set identifier, address).
    pub fn backend_records(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = self
            .dns
            .records(&self.zone_id)
            .into_iter()
            .filter(|r| r.is_plain_a_record())
            .map(|r| {
                (
                    r.set_identifier.clone().unwrap_or_default(),
                    r.primary_value().unwrap_or_default().to_string(),
                )
            })
            .collect();
        out.sort();
        out
    }

    pub fn monitored_ips(&self) -> Vec<String> {
        let mut ips: Vec<String> = self
            .dns
            .health_checks()
            .into_iter()
            .filter_map(|h| h.ip_address)
            .collect();
        ips.sort();
        ips
    }

    pub fn server_lines(&self, lb_ip: &str) -> Vec<String> {
        self.remote
            .file(lb_ip, HAPROXY_CFG)
            .unwrap_or_default()
            .lines()
            .filter(|l| l.trim_start().starts_with("server "))
            .map(|l| l.to_string())
            .collect()
    }
}

pub fn haproxy_cfg(servers: &[&str]) -> String {
    let mut cfg = String::from(
        "global\n    daemon\n    maxconn 256\n\nfrontend http-in\n    bind *:80\n    default_backend runners\n\nbackend runners\n    balance leastconn\n    # --- server block start ---\n",
    );
    for s in servers {
        cfg.push_str(s);
        cfg.push('\n');
    }
    cfg.push_str("    # --- server block end ---\n    option httpchk GET /ping\n");
    cfg
}

pub fn soa_record() -> RecordSet {
    RecordSet {
        name: ZONE.to_string(),
        record_type: "SOA".to_string(),
        set_identifier: None,
        region: None,
        ttl: Some(900),
        values: vec!["ns-1.awsdns-00.com. awsdns-hostmaster.amazon.com. 1 7200 900 1209600 86400".to_string()],
        health_check_id: None,
        is_alias: false,
    }
}

/// Advances only when slept on.
#[derive(Default)]
pub struct FakeClock {
    now: Mutex<Duration>,
}

#[async_trait]
impl Clock for FakeClock {
    fn elapsed(&self) -> Duration {
        self.now.lock().map(|n| *n).unwrap_or_default()
    }

    async fn sleep(&self, duration: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += duration;
        }
    }
}
