use anyhow::Result;
use clap::Parser;
use rsc_orchestrator::cli::{Action, Cli};
use rsc_orchestrator::config::FleetConfig;
use rsc_orchestrator::convergence::{Convergence, ConvergenceReport};
use rsc_orchestrator::poller::TokioClock;
use rsc_orchestrator::provider_manager::ProviderManager;
use rsc_orchestrator::{fleet, provisioning};
use rsc_providers::ComputeProvider;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn finish(report: ConvergenceReport) -> Result<()> {
    print_json(&report)?;
    if !report.is_success() {
        anyhow::bail!("one or more steps failed");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let action = Cli::parse().action();
    let config = FleetConfig::from_env()?;
    tracing::debug!("Resolved configuration for domain {}", config.domain);

    let compute = ProviderManager::compute(&config)?;

    match action {
        Action::ListInstances(class) => {
            print_json(&fleet::list_fleet(compute.as_ref(), class).await?)
        }
        Action::ListImages(class) => {
            print_json(&fleet::list_images(compute.as_ref(), class).await?)
        }
        Action::LatestImage { class, region } => {
            let image = fleet::latest_image(compute.as_ref(), &region, class).await?;
            print_json(&image)
        }
        Action::StartInstance { class, region } => {
            let clock = TokioClock::new();
            let report = provisioning::start_instance_with_latest_image(
                compute.as_ref(),
                &config.provision_settings(),
                &clock,
                &region,
                class,
            )
            .await?;
            print_json(&report)
        }
        Action::DestroyImage(id) => {
            let destroyed = provisioning::destroy_image(compute.as_ref(), &id).await?;
            print_json(&json!({ "image_id": id, "destroyed": destroyed }))
        }
        Action::PowerCycleDroplet(id) => {
            let requested = provisioning::power_cycle(compute.as_ref(), &id).await?;
            print_json(&json!({ "droplet_id": id, "power_cycled": requested }))
        }
        Action::DestroyDroplet(id) => {
            let destroyed = provisioning::destroy_instance(compute.as_ref(), &id).await?;
            print_json(&json!({ "droplet_id": id, "destroyed": destroyed }))
        }
        Action::RefreshDns => {
            let driver = driver(&config, compute).await;
            finish(driver.refresh_dns().await)
        }
        Action::RemoveRegionFromDns(region) => {
            let driver = driver(&config, compute).await;
            finish(driver.remove_region_from_dns(&region).await)
        }
        Action::RefreshLoadBalancers => {
            let driver = driver(&config, compute).await;
            finish(driver.refresh_load_balancers().await)
        }
        Action::Converge => {
            let driver = driver(&config, compute).await;
            finish(driver.converge().await)
        }
    }
}

async fn driver(config: &FleetConfig, compute: Arc<dyn ComputeProvider>) -> Convergence {
    Convergence::new(
        compute,
        ProviderManager::dns(config).await,
        ProviderManager::remote(config),
        config.dns_settings(),
        config.load_balancer_settings(),
    )
}
