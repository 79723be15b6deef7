use anyhow::Result;
use rsc_common::{Instance, InstanceClass};
use rsc_providers::{ComputeProvider, DnsProvider, RemoteHost};
use serde::Serialize;
use std::sync::Arc;

use crate::dns_records::{reconcile_dns_records, DnsChanges, DnsSettings};
use crate::fleet::list_fleet;
use crate::health_checks::{reconcile_health_checks, HealthCheckChanges};
use crate::loadbalancer::{sync_load_balancer, LoadBalancerSettings, LoadBalancerSync};

/// Result of one step. Failures are kept as text so the report stays
/// serializable and later steps still run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome<T> {
    Done { result: T },
    Failed { error: String },
}

impl<T> StepOutcome<T> {
    fn record(step: &str, res: Result<T>) -> Self {
        match res {
            Ok(result) => StepOutcome::Done { result },
            Err(e) => {
                tracing::error!("[Converge] {} failed: {:#}", step, e);
                StepOutcome::Failed {
                    error: format!("{:#}", e),
                }
            }
        }
    }

    fn failed(step: &str, error: &anyhow::Error) -> Self {
        tracing::error!("[Converge] {} skipped: {:#}", step, error);
        StepOutcome::Failed {
            error: format!("{:#}", error),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, StepOutcome::Done { .. })
    }

    pub fn result(&self) -> Option<&T> {
        match self {
            StepOutcome::Done { result } => Some(result),
            StepOutcome::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadBalancerOutcome {
    pub load_balancer: String,
    pub outcome: StepOutcome<LoadBalancerSync>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConvergenceReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_checks: Option<StepOutcome<HealthCheckChanges>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns_records: Option<StepOutcome<DnsChanges>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_balancers: Option<StepOutcome<Vec<LoadBalancerOutcome>>>,
}

impl ConvergenceReport {
    pub fn is_success(&self) -> bool {
        let hc = self.health_checks.as_ref().map_or(true, |s| s.is_done());
        let dns = self.dns_records.as_ref().map_or(true, |s| s.is_done());
        let lbs = self.load_balancers.as_ref().map_or(true, |s| match s {
            StepOutcome::Done { result } => result.iter().all(|lb| lb.outcome.is_done()),
            StepOutcome::Failed { .. } => false,
        });
        hc && dns && lbs
    }
}

/// Drives the three external stores toward the current fleet. Strictly
/// sequential; nothing is cached between calls.
pub struct Convergence {
    compute: Arc<dyn ComputeProvider>,
    dns: Arc<dyn DnsProvider>,
    remote: Arc<dyn RemoteHost>,
    dns_settings: DnsSettings,
    lb_settings: LoadBalancerSettings,
}

impl Convergence {
    pub fn new(
        compute: Arc<dyn ComputeProvider>,
        dns: Arc<dyn DnsProvider>,
        remote: Arc<dyn RemoteHost>,
        dns_settings: DnsSettings,
        lb_settings: LoadBalancerSettings,
    ) -> Self {
        Self {
            compute,
            dns,
            remote,
            dns_settings,
            lb_settings,
        }
    }

    /// Health checks, then records. The record step runs even when the
    /// health-check step failed.
    async fn reconcile_dns_stores(&self, desired: &[Instance], report: &mut ConvergenceReport) {
        let hc = reconcile_health_checks(self.dns.as_ref(), desired).await;
        report.health_checks = Some(StepOutcome::record("health checks", hc));

        let records = reconcile_dns_records(self.dns.as_ref(), &self.dns_settings, desired).await;
        report.dns_records = Some(StepOutcome::record("dns records", records));
    }

    async fn sync_all(&self, load_balancers: &[Instance]) -> Result<Vec<LoadBalancerOutcome>> {
        let backends = list_fleet(self.compute.as_ref(), InstanceClass::Run).await?;
        let mut outcomes = Vec::with_capacity(load_balancers.len());
        for lb in load_balancers {
            let res = sync_load_balancer(self.remote.as_ref(), &self.lb_settings, lb, &backends).await;
            outcomes.push(LoadBalancerOutcome {
                load_balancer: lb.name.clone(),
                outcome: StepOutcome::record(&format!("load balancer {}", lb.name), res),
            });
        }
        Ok(outcomes)
    }

    pub async fn refresh_dns(&self) -> ConvergenceReport {
        let mut report = ConvergenceReport::default();
        match list_fleet(self.compute.as_ref(), InstanceClass::LoadBalancer).await {
            Ok(lbs) => self.reconcile_dns_stores(&lbs, &mut report).await,
            Err(e) => {
                report.health_checks = Some(StepOutcome::failed("health checks", &e));
                report.dns_records = Some(StepOutcome::failed("dns records", &e));
            }
        }
        report
    }

    /// Take every load balancer in `region_slug` out of DNS. Nothing else
    /// changes, provided the rest of DNS already matched the fleet.
    pub async fn remove_region_from_dns(&self, region_slug: &str) -> ConvergenceReport {
        let mut report = ConvergenceReport::default();
        match list_fleet(self.compute.as_ref(), InstanceClass::LoadBalancer).await {
            Ok(lbs) => {
                let remaining: Vec<Instance> = lbs
                    .into_iter()
                    .filter(|i| i.region_slug != region_slug)
                    .collect();
                tracing::info!(
                    "[Converge] Removing {} from DNS, {} load balancer(s) stay",
                    region_slug,
                    remaining.len()
                );
                self.reconcile_dns_stores(&remaining, &mut report).await;
            }
            Err(e) => {
                report.health_checks = Some(StepOutcome::failed("health checks", &e));
                report.dns_records = Some(StepOutcome::failed("dns records", &e));
            }
        }
        report
    }

    pub async fn refresh_load_balancers(&self) -> ConvergenceReport {
        let res = match list_fleet(self.compute.as_ref(), InstanceClass::LoadBalancer).await {
            Ok(lbs) => self.sync_all(&lbs).await,
            Err(e) => Err(e),
        };
        ConvergenceReport {
            load_balancers: Some(StepOutcome::record("load balancers", res)),
            ..ConvergenceReport::default()
        }
    }

    /// Full pass: health checks, DNS records, then every load balancer.
    pub async fn converge(&self) -> ConvergenceReport {
        let mut report = ConvergenceReport::default();
        match list_fleet(self.compute.as_ref(), InstanceClass::LoadBalancer).await {
            Ok(lbs) => {
                self.reconcile_dns_stores(&lbs, &mut report).await;
                report.load_balancers =
                    Some(StepOutcome::record("load balancers", self.sync_all(&lbs).await));
            }
            Err(e) => {
                report.health_checks = Some(StepOutcome::failed("health checks", &e));
                report.dns_records = Some(StepOutcome::failed("dns records", &e));
                report.load_balancers = Some(StepOutcome::failed("load balancers", &e));
            }
        }
        if report.is_success() {
            tracing::info!("[Converge] Pass complete");
        } else {
            tracing::warn!("[Converge] Pass finished with failures");
        }
        report
    }
}
