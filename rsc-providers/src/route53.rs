use crate::DnsProvider;
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_route53::types::{
    Change, ChangeAction as AwsChangeAction, ChangeBatch, HealthCheckConfig, HealthCheckType,
    ResourceRecord, ResourceRecordSet, ResourceRecordSetRegion, RrType,
};
use aws_sdk_route53::Client;
use rsc_common::{ChangeAction, HealthCheck, HealthCheckSpec, HostedZone, RecordChange, RecordSet};

pub struct Route53Provider {
    client: Client,
}

impl Route53Provider {
    /// Credentials come from the SDK default chain (env, profile, instance role).
    pub async fn from_env(region: &str) -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;
        Self {
            client: Client::new(&config),
        }
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn to_record_set(r: &ResourceRecordSet) -> RecordSet {
    // Required members are Option<&T> in some SDK releases and &T in others.
    let record_type: Option<&RrType> = Option::from(r.r#type());
    RecordSet {
        name: r.name().to_string(),
        record_type: record_type.map(|t| t.as_str().to_string()).unwrap_or_default(),
        set_identifier: r.set_identifier().map(|s| s.to_string()),
        region: r.region().map(|reg| reg.as_str().to_string()),
        ttl: r.ttl(),
        values: r
            .resource_records()
            .iter()
            .map(|rr| rr.value().to_string())
            .collect(),
        health_check_id: r.health_check_id().map(|s| s.to_string()),
        is_alias: r.alias_target().is_some(),
    }
}

fn to_aws_record_set(r: &RecordSet) -> Result<ResourceRecordSet> {
    let mut builder = ResourceRecordSet::builder()
        .name(&r.name)
        .r#type(RrType::from(r.record_type.as_str()))
        .set_set_identifier(r.set_identifier.clone())
        .set_region(r.region.as_deref().map(ResourceRecordSetRegion::from))
        .set_ttl(r.ttl)
        .set_health_check_id(r.health_check_id.clone());
    for value in &r.values {
        builder = builder.resource_records(ResourceRecord::builder().value(value).build()?);
    }
    Ok(builder.build()?)
}

fn to_aws_change(change: &RecordChange) -> Result<Change> {
    let action = match change.action {
        ChangeAction::Create => AwsChangeAction::Create,
        ChangeAction::Delete => AwsChangeAction::Delete,
    };
    Ok(Change::builder()
        .action(action)
        .resource_record_set(to_aws_record_set(&change.record)?)
        .build()?)
}

fn to_health_check(h: &aws_sdk_route53::types::HealthCheck) -> HealthCheck {
    let config: Option<&HealthCheckConfig> = Option::from(h.health_check_config());
    HealthCheck {
        id: h.id().to_string(),
        ip_address: config
            .and_then(|c| c.ip_address())
            .map(|ip| ip.to_string()),
    }
}

#[async_trait]
impl DnsProvider for Route53Provider {
    async fn list_hosted_zones_by_name(&self, dns_name: &str) -> Result<Vec<HostedZone>> {
        let out = self
            .client
            .list_hosted_zones_by_name()
            .dns_name(dns_name)
            .send()
            .await
            .context("route53 list_hosted_zones_by_name failed")?;
        Ok(out
            .hosted_zones()
            .iter()
            .map(|z| HostedZone {
                id: z.id().to_string(),
                name: z.name().to_string(),
            })
            .collect())
    }

    async fn list_record_sets(&self, hosted_zone_id: &str) -> Result<Vec<RecordSet>> {
        let mut out = Vec::new();
        let mut next_name: Option<String> = None;
        let mut next_type: Option<RrType> = None;
        let mut next_identifier: Option<String> = None;

        loop {
            let resp = self
                .client
                .list_resource_record_sets()
                .hosted_zone_id(hosted_zone_id)
                .set_start_record_name(next_name.take())
                .set_start_record_type(next_type.take())
                .set_start_record_identifier(next_identifier.take())
                .send()
                .await
                .context("route53 list_resource_record_sets failed")?;

            out.extend(resp.resource_record_sets().iter().map(to_record_set));

            if !resp.is_truncated() {
                break;
            }
            next_name = resp.next_record_name().map(|s| s.to_string());
            next_type = resp.next_record_type().cloned();
            next_identifier = resp.next_record_identifier().map(|s| s.to_string());
            if next_name.is_none() {
                break;
            }
        }
        Ok(out)
    }

    async fn change_record_sets(
        &self,
        hosted_zone_id: &str,
        changes: &[RecordChange],
    ) -> Result<String> {
        let aws_changes = changes
            .iter()
            .map(to_aws_change)
            .collect::<Result<Vec<_>>>()?;
        let batch = ChangeBatch::builder().set_changes(Some(aws_changes)).build()?;

        let resp = self
            .client
            .change_resource_record_sets()
            .hosted_zone_id(hosted_zone_id)
            .change_batch(batch)
            .send()
            .await
            .context("route53 change_resource_record_sets failed")?;

        let info: Option<&aws_sdk_route53::types::ChangeInfo> = Option::from(resp.change_info());
        Ok(info.map(|i| i.id().to_string()).unwrap_or_default())
    }

    async fn list_health_checks(&self) -> Result<Vec<HealthCheck>> {
        let mut out = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let resp = self
                .client
                .list_health_checks()
                .set_marker(marker.take())
                .send()
                .await
                .context("route53 list_health_checks failed")?;

            out.extend(resp.health_checks().iter().map(to_health_check));

            if !resp.is_truncated() {
                break;
            }
            marker = resp.next_marker().map(|s| s.to_string());
            if marker.is_none() {
                break;
            }
        }
        Ok(out)
    }

    async fn create_health_check(&self, spec: &HealthCheckSpec) -> Result<HealthCheck> {
        let config = HealthCheckConfig::builder()
            .ip_address(&spec.ip_address)
            .port(i32::from(spec.port))
            .r#type(HealthCheckType::from(spec.protocol.as_str()))
            .resource_path(&spec.resource_path)
            .request_interval(spec.request_interval_s)
            .failure_threshold(spec.failure_threshold)
            .build()?;

        let resp = self
            .client
            .create_health_check()
            .caller_reference(uuid::Uuid::new_v4().to_string())
            .health_check_config(config)
            .send()
            .await
            .context("route53 create_health_check failed")?;

        let created: Option<&aws_sdk_route53::types::HealthCheck> = Option::from(resp.health_check());
        created
            .map(to_health_check)
            .ok_or_else(|| anyhow::anyhow!("route53 create_health_check returned no health check"))
    }

    async fn delete_health_check(&self, health_check_id: &str) -> Result<()> {
        self.client
            .delete_health_check()
            .health_check_id(health_check_id)
            .send()
            .await
            .context("route53 delete_health_check failed")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> RecordSet {
        RecordSet {
            name: "backend.runsomecode.com.".to_string(),
            record_type: "A".to_string(),
            set_identifier: Some("loadbalancer.abcd1234.lon1.runsomecode.com".to_string()),
            region: Some("eu-west-1".to_string()),
            ttl: Some(60),
            values: vec!["10.0.0.1".to_string()],
            health_check_id: Some("hc-1".to_string()),
            is_alias: false,
        }
    }

    #[test]
    fn record_set_conversion_keeps_every_field() {
        let original = record();
        let aws = to_aws_record_set(&original).unwrap();
        assert_eq!(to_record_set(&aws), original);
    }

    #[test]
    fn alias_free_record_without_ttl_converts() {
        let mut r = record();
        r.ttl = None;
        r.region = None;
        r.set_identifier = None;
        r.health_check_id = None;
        let aws = to_aws_record_set(&r).unwrap();
        assert_eq!(to_record_set(&aws), r);
    }
}
