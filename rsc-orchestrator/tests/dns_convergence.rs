mod common;

use common::{soa_record, World, RECORD_NAME};
use rsc_common::{ChangeAction, InstanceClass, RecordSet};
use rsc_orchestrator::dns_records::reconcile_dns_records;
use rsc_orchestrator::fleet::list_fleet;
use rsc_orchestrator::health_checks::reconcile_health_checks;
use rsc_providers::mock::DnsCall;

#[tokio::test]
async fn refresh_dns_creates_checks_and_records() {
    let world = World::new();
    let a = world.add_lb("aaaaaaaa", "lon1", "10.0.0.1");
    let b = world.add_lb("bbbbbbbb", "sfo1", "10.0.0.2");
    world.add_run("rrrrrrrr", "lon1", "10.1.0.1");
    world.dns.add_record(&world.zone_id, soa_record());

    let report = world.convergence().refresh_dns().await;
    assert!(report.is_success(), "{:?}", report);

    assert_eq!(world.monitored_ips(), vec!["10.0.0.1", "10.0.0.2"]);
    assert_eq!(
        world.backend_records(),
        vec![(a.clone(), "10.0.0.1".to_string()), (b, "10.0.0.2".to_string())]
    );

    let records = world.dns.records(&world.zone_id);
    let rec_a = records
        .iter()
        .find(|r| r.set_identifier.as_deref() == Some(a.as_str()))
        .unwrap();
    assert_eq!(rec_a.name, RECORD_NAME);
    assert_eq!(rec_a.ttl, Some(60));
    assert_eq!(rec_a.region.as_deref(), Some("eu-west-1"));
    let hc_a = world
        .dns
        .health_checks()
        .into_iter()
        .find(|h| h.ip_address.as_deref() == Some("10.0.0.1"))
        .unwrap();
    assert_eq!(rec_a.health_check_id.as_deref(), Some(hc_a.id.as_str()));

    // The SOA record is not ours to touch.
    assert!(records.iter().any(|r| r.record_type == "SOA"));
}

#[tokio::test]
async fn other_records_for_a_live_address_survive() {
    let world = World::new();
    let a = world.add_lb("aaaaaaaa", "lon1", "10.0.0.1");
    let www = RecordSet {
        name: format!("www.{}", common::ZONE),
        record_type: "A".to_string(),
        set_identifier: None,
        region: None,
        ttl: Some(300),
        values: vec!["10.0.0.1".to_string()],
        health_check_id: None,
        is_alias: false,
    };
    world.dns.add_record(&world.zone_id, www.clone());

    let driver = world.convergence();
    assert!(driver.refresh_dns().await.is_success());
    let records = world.dns.records(&world.zone_id);
    assert!(records.contains(&www));
    let backend: Vec<&RecordSet> = records.iter().filter(|r| r.name == RECORD_NAME).collect();
    assert_eq!(backend.len(), 1);
    assert_eq!(backend[0].set_identifier.as_deref(), Some(a.as_str()));

    // Stable on the next pass too.
    world.dns.clear_calls();
    assert!(driver.refresh_dns().await.is_success());
    assert!(world.dns.mutating_calls().is_empty());
}

#[tokio::test]
async fn second_pass_is_a_noop() {
    let world = World::new();
    world.add_lb("aaaaaaaa", "lon1", "10.0.0.1");
    world.add_lb("bbbbbbbb", "sgp1", "10.0.0.2");

    let driver = world.convergence();
    assert!(driver.refresh_dns().await.is_success());
    world.dns.clear_calls();

    let report = driver.refresh_dns().await;
    assert!(report.is_success());
    assert!(world.dns.mutating_calls().is_empty());

    let hc = report.health_checks.unwrap();
    assert!(hc.result().unwrap().is_noop());
    let dns = report.dns_records.unwrap();
    assert!(dns.result().unwrap().change_ids.is_empty());
}

#[tokio::test]
async fn new_load_balancer_is_added() {
    let world = World::new();
    let a = world.add_lb("aaaaaaaa", "lon1", "10.0.0.1");
    let driver = world.convergence();
    assert!(driver.refresh_dns().await.is_success());
    world.dns.clear_calls();

    let c = world.add_lb("cccccccc", "sfo1", "10.0.0.3");
    assert!(driver.refresh_dns().await.is_success());

    assert_eq!(world.monitored_ips(), vec!["10.0.0.1", "10.0.0.3"]);
    assert_eq!(
        world.backend_records(),
        vec![(a, "10.0.0.1".to_string()), (c, "10.0.0.3".to_string())]
    );
    // One health check created, one creation batch, nothing deleted.
    let mutating = world.dns.mutating_calls();
    assert_eq!(mutating.len(), 2);
    assert_eq!(mutating[0], DnsCall::CreateHealthCheck("10.0.0.3".to_string()));
    match &mutating[1] {
        DnsCall::ChangeRecordSets(changes) => {
            assert_eq!(changes.len(), 1);
            assert_eq!(changes[0].action, ChangeAction::Create);
        }
        other => panic!("unexpected call {:?}", other),
    }
}

#[tokio::test]
async fn destroyed_load_balancer_is_removed_with_original_fields() {
    let world = World::new();
    let a = world.add_lb("aaaaaaaa", "lon1", "10.0.0.1");
    world.add_lb("bbbbbbbb", "sfo1", "10.0.0.2");
    let driver = world.convergence();
    assert!(driver.refresh_dns().await.is_success());

    let before: Vec<RecordSet> = world.dns.records(&world.zone_id);
    world.compute.remove_instance("bbbbbbbb");
    world.dns.clear_calls();

    assert!(driver.refresh_dns().await.is_success());
    assert_eq!(world.monitored_ips(), vec!["10.0.0.1"]);
    assert_eq!(world.backend_records(), vec![(a, "10.0.0.1".to_string())]);

    let deleted_record = world
        .dns
        .mutating_calls()
        .into_iter()
        .find_map(|c| match c {
            DnsCall::ChangeRecordSets(changes) => Some(changes),
            _ => None,
        })
        .unwrap();
    assert_eq!(deleted_record.len(), 1);
    assert_eq!(deleted_record[0].action, ChangeAction::Delete);
    let original = before
        .iter()
        .find(|r| r.primary_value() == Some("10.0.0.2"))
        .unwrap();
    assert_eq!(&deleted_record[0].record, original);
}

#[tokio::test]
async fn reused_address_is_deleted_before_it_is_recreated() {
    let world = World::new();
    world.add_lb("aaaaaaaa", "lon1", "10.0.0.1");
    let driver = world.convergence();
    assert!(driver.refresh_dns().await.is_success());
    world.dns.clear_calls();

    // Old droplet gone, new one handed the same address in the same pass.
    world.compute.remove_instance("aaaaaaaa");
    let fresh = world.add_lb("dddddddd", "lon1", "10.0.0.1");
    assert!(driver.refresh_dns().await.is_success());

    let batches: Vec<ChangeAction> = world
        .dns
        .mutating_calls()
        .into_iter()
        .filter_map(|c| match c {
            DnsCall::ChangeRecordSets(changes) => Some(changes[0].action),
            _ => None,
        })
        .collect();
    assert_eq!(batches, vec![ChangeAction::Delete, ChangeAction::Create]);
    assert_eq!(world.backend_records(), vec![(fresh, "10.0.0.1".to_string())]);
}

#[tokio::test]
async fn stale_health_checks_go_before_new_ones() {
    let world = World::new();
    let stale = world.dns.add_health_check(Some("10.9.9.9"));
    let foreign = world.dns.add_health_check(None);
    world.add_lb("aaaaaaaa", "lon1", "10.0.0.1");

    let desired = list_fleet(world.compute.as_ref(), InstanceClass::LoadBalancer)
        .await
        .unwrap();
    let changes = reconcile_health_checks(world.dns.as_ref(), &desired)
        .await
        .unwrap();
    assert_eq!(changes.deleted.len(), 1);
    assert_eq!(changes.created.len(), 1);

    assert_eq!(
        world.dns.mutating_calls(),
        vec![
            DnsCall::DeleteHealthCheck(stale),
            DnsCall::CreateHealthCheck("10.0.0.1".to_string()),
        ]
    );
    // Checks without an address are left alone.
    assert!(world.dns.health_checks().iter().any(|h| h.id == foreign));
}

#[tokio::test]
async fn remove_region_only_touches_that_region() {
    let world = World::new();
    let a = world.add_lb("aaaaaaaa", "lon1", "10.0.0.1");
    world.add_lb("bbbbbbbb", "sfo1", "10.0.0.2");
    let c = world.add_lb("cccccccc", "sgp1", "10.0.0.3");
    let driver = world.convergence();
    assert!(driver.refresh_dns().await.is_success());
    world.dns.clear_calls();

    assert!(driver.remove_region_from_dns("sfo1").await.is_success());
    assert_eq!(world.monitored_ips(), vec!["10.0.0.1", "10.0.0.3"]);
    assert_eq!(
        world.backend_records(),
        vec![(a, "10.0.0.1".to_string()), (c, "10.0.0.3".to_string())]
    );
    // The droplet itself is untouched.
    assert!(world.compute.instances().iter().any(|i| i.provider_id == "bbbbbbbb"));
    assert!(world
        .dns
        .mutating_calls()
        .iter()
        .all(|c| !matches!(c, DnsCall::CreateHealthCheck(_))));
}

#[tokio::test]
async fn unmapped_region_leaves_the_zone_untouched() {
    let world = World::new();
    world.compute.add_region("nyc3");
    world.compute.add_image("lb-nyc3", "rsc loadbalancer nyc3 2014-10-01");
    world.add_lb("aaaaaaaa", "lon1", "10.0.0.1");
    world.add_lb("nnnnnnnn", "nyc3", "10.0.0.4");
    let desired = list_fleet(world.compute.as_ref(), InstanceClass::LoadBalancer)
        .await
        .unwrap();
    reconcile_health_checks(world.dns.as_ref(), &desired)
        .await
        .unwrap();
    world.dns.clear_calls();

    let settings = rsc_orchestrator::dns_records::DnsSettings::new(
        common::DOMAIN,
        rsc_common::RegionMap::default(),
    );
    let err = reconcile_dns_records(world.dns.as_ref(), &settings, &desired)
        .await
        .unwrap_err();
    assert!(format!("{:#}", err).contains("nyc3"));
    assert!(world.dns.mutating_calls().is_empty());
    assert!(world.backend_records().is_empty());
}

#[tokio::test]
async fn missing_zone_fails_the_record_step_only() {
    let world = World::new();
    world.add_lb("aaaaaaaa", "lon1", "10.0.0.1");
    let driver = rsc_orchestrator::convergence::Convergence::new(
        world.compute.clone(),
        world.dns.clone(),
        world.remote.clone(),
        rsc_orchestrator::dns_records::DnsSettings::new(
            "elsewhere.net",
            rsc_common::RegionMap::default(),
        ),
        Default::default(),
    );
    let report = driver.refresh_dns().await;
    assert!(!report.is_success());
    assert!(report.health_checks.unwrap().is_done());
    let dns = report.dns_records.unwrap();
    assert!(!dns.is_done());
    assert_eq!(world.monitored_ips(), vec!["10.0.0.1"]);
}
