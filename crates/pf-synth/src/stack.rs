//! The private static-website stack: a website bucket readable only through
//! a gateway endpoint, a proxy farm in front of it, and an internal network
//! load balancer exposing the farm.

use cfn_template::Template;
use pf_core::{
    ConfigValue, FleetConfig, IndexDocument, ListenerSpec, Protocol, TemplateProvisioner, compose,
    merge,
};
use tracing::info;

use crate::config::{AppConfig, Overrides};
use crate::error::Result;

const NETWORK_CIDR: &str = "10.0.0.0/16";
const FARM: &str = "s3-proxy-farm";
const WEBSITE_URL_OUTPUT: &str = "s3proxyfarmwebsiteurl";
/// This stack runs up to four proxies unless the overrides file says otherwise.
const STACK_MAX_CAPACITY: u32 = 4;

pub fn build(config: &AppConfig, overrides: Overrides) -> Result<Template> {
    let mut provisioner = TemplateProvisioner::new(&config.region)
        .with_description(format!("{}: private S3 static website", config.stack_name));

    let index_document: IndexDocument = match &config.index_document {
        Some(name) => name.parse()?,
        None => IndexDocument::default(),
    };

    let origin = provisioner.add_website_bucket(
        "s3-proxy-farm-website-bucket",
        &config.bucket_name,
        &index_document,
    )?;

    // Use a network with a VPN or direct connection to the remote network.
    let zones = [format!("{}a", config.region), format!("{}b", config.region)];
    let zones: Vec<&str> = zones.iter().map(String::as_str).collect();
    let network = provisioner.add_network("s3-proxy-farm-vpc", NETWORK_CIDR, &zones)?;

    let endpoint = provisioner.add_gateway_endpoint("s3-proxy-farm-s3-vpc-endpoint", &network)?;
    provisioner.grant_read_from_endpoint("s3-proxy-farm-website-bucket-policy", &origin, &endpoint)?;

    let stack_group =
        ConfigValue::record([("max_capacity", ConfigValue::from(STACK_MAX_CAPACITY))]);
    let scaling_group = merge(&stack_group, &overrides.scaling_group)?;

    let mut fleet_config = FleetConfig::new(network.clone(), origin)
        .with_scaling_group_override(scaling_group)
        .with_scaling_policy_override(overrides.scaling_policy)
        .with_allowed_cidr_ranges(config.allowed_cidrs.iter().cloned());
    if let Some(name) = &config.index_document {
        fleet_config = fleet_config.with_index_document(name.as_str());
    }
    let mut farm = compose(&mut provisioner, FARM, &fleet_config)?;

    let load_balancer =
        provisioner.add_network_load_balancer("s3-proxy-farm-load-balancer", &network, true, true)?;
    farm.expose(
        &mut provisioner,
        &load_balancer,
        ListenerSpec {
            port: config.listener_port,
            protocol: Protocol::Tcp,
        },
    )?;

    provisioner.add_output(
        WEBSITE_URL_OUTPUT,
        TemplateProvisioner::load_balancer_url(&load_balancer),
        Some("Use this URL to access the website from the remote network"),
    )?;

    let template = provisioner.into_template();
    info!(
        stack = %config.stack_name,
        resources = template.len(),
        allowed = farm.firewall_rules().allow_rules().len(),
        "stack synthesized"
    );
    Ok(template)
}
