use clap::{ArgGroup, Parser};
use rsc_common::InstanceClass;

#[derive(Parser, Debug)]
#[command(
    name = "rsc-fleet",
    about = "Keeps DNS, health checks and load balancer configs in line with the droplet fleet",
    group(ArgGroup::new("action").required(true).multiple(false))
)]
pub struct Cli {
    /// List droplets running a "run" image
    #[arg(long, group = "action")]
    list_run_instances: bool,
    /// List droplets running a "loadbalancer" image
    #[arg(long, group = "action")]
    list_loadbalancer_instances: bool,
    /// List "run" images
    #[arg(long, group = "action")]
    list_run_images: bool,
    /// List "loadbalancer" images
    #[arg(long, group = "action")]
    list_loadbalancer_images: bool,
    /// Show the newest "run" image for a region
    #[arg(long, group = "action", value_name = "REGION")]
    get_latest_run_image: Option<String>,
    /// Show the newest "loadbalancer" image for a region
    #[arg(long, group = "action", value_name = "REGION")]
    get_latest_loadbalancer_image: Option<String>,
    /// Boot a droplet from the newest "run" image in a region
    #[arg(long, group = "action", value_name = "REGION")]
    start_instance_with_latest_run_image: Option<String>,
    /// Boot a droplet from the newest "loadbalancer" image in a region
    #[arg(long, group = "action", value_name = "REGION")]
    start_instance_with_latest_loadbalancer_image: Option<String>,
    /// Delete an image
    #[arg(long, group = "action", value_name = "ID")]
    destroy_image: Option<String>,
    /// Reconcile health checks and backend DNS records with the load balancers
    #[arg(long, group = "action")]
    refresh_dns: bool,
    /// Rewrite every load balancer's server block from the "run" fleet
    #[arg(long, group = "action")]
    refresh_loadbalancers: bool,
    /// Drop one region's load balancers from DNS
    #[arg(long, group = "action", value_name = "REGION")]
    remove_region_from_dns: Option<String>,
    /// Power cycle a droplet
    #[arg(long, group = "action", value_name = "ID")]
    power_cycle_droplet: Option<String>,
    /// Delete a droplet
    #[arg(long, group = "action", value_name = "ID")]
    destroy_droplet: Option<String>,
    /// Full pass: health checks, DNS records, load balancers
    #[arg(long, group = "action")]
    converge: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    ListInstances(InstanceClass),
    ListImages(InstanceClass),
    LatestImage { class: InstanceClass, region: String },
    StartInstance { class: InstanceClass, region: String },
    DestroyImage(String),
    RefreshDns,
    RefreshLoadBalancers,
    RemoveRegionFromDns(String),
    PowerCycleDroplet(String),
    DestroyDroplet(String),
    Converge,
}

impl Cli {
    pub fn action(self) -> Action {
        use InstanceClass::{LoadBalancer, Run};

        if self.list_run_instances {
            return Action::ListInstances(Run);
        }
        if self.list_loadbalancer_instances {
            return Action::ListInstances(LoadBalancer);
        }
        if self.list_run_images {
            return Action::ListImages(Run);
        }
        if self.list_loadbalancer_images {
            return Action::ListImages(LoadBalancer);
        }
        if self.refresh_dns {
            return Action::RefreshDns;
        }
        if self.refresh_loadbalancers {
            return Action::RefreshLoadBalancers;
        }
        if let Some(region) = self.get_latest_run_image {
            return Action::LatestImage { class: Run, region };
        }
        if let Some(region) = self.get_latest_loadbalancer_image {
            return Action::LatestImage { class: LoadBalancer, region };
        }
        if let Some(region) = self.start_instance_with_latest_run_image {
            return Action::StartInstance { class: Run, region };
        }
        if let Some(region) = self.start_instance_with_latest_loadbalancer_image {
            return Action::StartInstance { class: LoadBalancer, region };
        }
        if let Some(id) = self.destroy_image {
            return Action::DestroyImage(id);
        }
        if let Some(region) = self.remove_region_from_dns {
            return Action::RemoveRegionFromDns(region);
        }
        if let Some(id) = self.power_cycle_droplet {
            return Action::PowerCycleDroplet(id);
        }
        if let Some(id) = self.destroy_droplet {
            return Action::DestroyDroplet(id);
        }
        // The required group guarantees one of the above; --converge is the last.
        Action::Converge
    }
}
