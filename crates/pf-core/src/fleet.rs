//! Fleet compositor and load balancer exposure.
//!
//! [`compose`] resolves the caller's [`FleetConfig`] against the defaults,
//! validates everything, and only then asks the [`Provisioner`] for
//! resources: firewall, scaling group (with the bootstrap script as user
//! data) and scaling policy. A failed validation leaves the provisioner
//! untouched.

use std::time::Duration;

use tracing::{debug, info};

use crate::allowlist::{Cidr, FirewallRuleSet, parse_ranges};
use crate::bootstrap::{self, BackendUrl, BootstrapParams, BootstrapScript, IndexDocument};
use crate::merge::merge;
use crate::provisioner::Provisioner;
use crate::spec::{ScalingGroupSpec, ScalingPolicySpec, SubnetSelection};
use crate::types::{
    FirewallRef, ListenerRef, ListenerSpec, LoadBalancerRef, MachineImage, NetworkRef,
    ScalingGroupRef, SubnetType, WebsiteOrigin,
};
use crate::value::ConfigValue;
use crate::{Error, Result};

/// Port every proxy host listens on.
pub const PROXY_PORT: u16 = 8080;

pub const DEFAULT_INSTANCE_TYPE: &str = "t2.micro";
pub const DEFAULT_MIN_CAPACITY: u32 = 1;
pub const DEFAULT_MAX_CAPACITY: u32 = 3;
pub const DEFAULT_TARGET_UTILIZATION_PERCENT: u32 = 80;
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(300);

const FIREWALL: &str = "autoscaling-group-security-group";
const SCALING_GROUP: &str = "autoscaling-group";
const SCALING_POLICY: &str = "scaling-policy";
const LISTENER: &str = "load-balancer-listener";

/// Caller input for [`compose`].
#[derive(Debug, Clone)]
pub struct FleetConfig {
    pub network: NetworkRef,
    pub origin: WebsiteOrigin,
    pub scaling_group_override: ConfigValue,
    pub scaling_policy_override: ConfigValue,
    pub allowed_cidr_ranges: Vec<String>,
    pub index_document: Option<String>,
}

impl FleetConfig {
    pub fn new(network: NetworkRef, origin: WebsiteOrigin) -> Self {
        Self {
            network,
            origin,
            scaling_group_override: ConfigValue::empty(),
            scaling_policy_override: ConfigValue::empty(),
            allowed_cidr_ranges: Vec::new(),
            index_document: None,
        }
    }

    pub fn with_scaling_group_override(mut self, over: ConfigValue) -> Self {
        self.scaling_group_override = over;
        self
    }

    pub fn with_scaling_policy_override(mut self, over: ConfigValue) -> Self {
        self.scaling_policy_override = over;
        self
    }

    pub fn with_allowed_cidr_ranges<I, S>(mut self, ranges: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_cidr_ranges = ranges.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_index_document(mut self, name: impl Into<String>) -> Self {
        self.index_document = Some(name.into());
        self
    }
}

/// The realized fleet.
#[derive(Debug, Clone)]
pub struct FleetHandle {
    id: String,
    firewall: FirewallRef,
    firewall_rules: FirewallRuleSet,
    scaling_group: ScalingGroupRef,
    scaling_group_spec: ScalingGroupSpec,
    scaling_policy_spec: ScalingPolicySpec,
    index_document: IndexDocument,
    bootstrap: BootstrapScript,
    listeners: u32,
    /// Listener names handed out, including ones whose attach failed.
    listener_slots: u32,
}

impl FleetHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn proxy_port(&self) -> u16 {
        PROXY_PORT
    }

    pub fn firewall(&self) -> &FirewallRef {
        &self.firewall
    }

    pub fn firewall_rules(&self) -> &FirewallRuleSet {
        &self.firewall_rules
    }

    pub fn scaling_group(&self) -> &ScalingGroupRef {
        &self.scaling_group
    }

    pub fn scaling_group_spec(&self) -> &ScalingGroupSpec {
        &self.scaling_group_spec
    }

    pub fn scaling_policy_spec(&self) -> &ScalingPolicySpec {
        &self.scaling_policy_spec
    }

    pub fn index_document(&self) -> &IndexDocument {
        &self.index_document
    }

    pub fn bootstrap_script(&self) -> &BootstrapScript {
        &self.bootstrap
    }

    /// Number of listeners attached through [`FleetHandle::expose`].
    pub fn listener_count(&self) -> u32 {
        self.listeners
    }

    /// Add a listener to `load_balancer` and register the fleet as its only
    /// target on [`PROXY_PORT`], whatever the listener's external port.
    ///
    /// Every call adds a new listener under a fresh name; a name is used up
    /// even when the provisioner rejects the listener or its targets.
    pub fn expose<P: Provisioner + ?Sized>(
        &mut self,
        provisioner: &mut P,
        load_balancer: &LoadBalancerRef,
        listener: ListenerSpec,
    ) -> Result<ListenerRef> {
        let name = match self.listener_slots {
            0 => LISTENER.to_string(),
            n => format!("{LISTENER}-{}", n + 1),
        };
        self.listener_slots += 1;
        let targets = format!("{name}-targets");

        let listener_ref = provisioner.create_listener(
            &[self.id.as_str(), name.as_str()],
            load_balancer,
            &listener,
        )?;
        provisioner.register_targets(
            &[self.id.as_str(), targets.as_str()],
            &listener_ref,
            &self.scaling_group,
            PROXY_PORT,
        )?;
        self.listeners += 1;

        info!(
            fleet = %self.id,
            load_balancer = %load_balancer.id,
            port = listener.port,
            protocol = %listener.protocol,
            target_port = PROXY_PORT,
            "fleet exposed"
        );
        Ok(listener_ref)
    }
}

/// Scaling-group defaults, lowest layer of the merge.
fn scaling_group_defaults(network: &NetworkRef, firewall: &FirewallRef) -> ScalingGroupSpec {
    ScalingGroupSpec {
        network: network.clone(),
        instance_type: DEFAULT_INSTANCE_TYPE.to_string(),
        machine_image: MachineImage::AmazonLinux,
        associate_public_ip_address: false,
        firewall: firewall.clone(),
        subnets: SubnetSelection {
            subnet_type: SubnetType::Private,
        },
        min_capacity: DEFAULT_MIN_CAPACITY,
        max_capacity: DEFAULT_MAX_CAPACITY,
        desired_capacity: None,
    }
}

fn scaling_policy_defaults() -> ScalingPolicySpec {
    ScalingPolicySpec {
        target_utilization_percent: DEFAULT_TARGET_UTILIZATION_PERCENT,
        cooldown: DEFAULT_COOLDOWN,
        disable_scale_in: false,
    }
}

/// Everything resolved before the provisioner is touched.
struct FleetPlan {
    firewall_rules: FirewallRuleSet,
    scaling_group: ScalingGroupSpec,
    scaling_policy: ScalingPolicySpec,
    index_document: IndexDocument,
    bootstrap: BootstrapScript,
    /// The fleet's own firewall, until it exists.
    pending_firewall: FirewallRef,
}

fn plan(id: &str, config: &FleetConfig) -> Result<FleetPlan> {
    if id.is_empty() {
        return Err(Error::validation("id", "fleet id must not be empty"));
    }

    let ranges: Vec<Cidr> = parse_ranges(config.allowed_cidr_ranges.as_slice())?;
    let index_document: IndexDocument = match &config.index_document {
        Some(name) => name.parse()?,
        None => IndexDocument::default(),
    };
    let backend: BackendUrl = config.origin.website_url.parse()?;

    let firewall_rules = FirewallRuleSet::from_ranges(&ranges, PROXY_PORT);
    debug!(
        fleet = id,
        allowed = firewall_rules.allow_rules().len(),
        "derived allow-list rules"
    );

    let pending_firewall = FirewallRef::new(format!("{id}/{FIREWALL}"));
    let group_defaults = scaling_group_defaults(&config.network, &pending_firewall).to_config();
    let scaling_group = ScalingGroupSpec::from_config(merge(
        &group_defaults,
        &config.scaling_group_override,
    )?)?;

    let scaling_policy = ScalingPolicySpec::from_config(merge(
        &scaling_policy_defaults().to_config(),
        &config.scaling_policy_override,
    )?)?;

    let bootstrap = bootstrap::render(&BootstrapParams {
        port: PROXY_PORT,
        rules: firewall_rules.allow_rules(),
        index_document: &index_document,
        backend: &backend,
    })?;

    Ok(FleetPlan {
        firewall_rules,
        scaling_group,
        scaling_policy,
        index_document,
        bootstrap,
        pending_firewall,
    })
}

/// Build the proxy fleet described by `config` under the construct id `id`.
pub fn compose<P: Provisioner + ?Sized>(
    provisioner: &mut P,
    id: &str,
    config: &FleetConfig,
) -> Result<FleetHandle> {
    let FleetPlan {
        firewall_rules,
        mut scaling_group,
        scaling_policy,
        index_document,
        bootstrap,
        pending_firewall,
    } = plan(id, config)?;

    let firewall = provisioner.create_firewall(&[id, FIREWALL], &config.network, &firewall_rules)?;
    // An override may have supplied its own firewall; keep it if so.
    if scaling_group.firewall == pending_firewall {
        scaling_group.firewall = firewall.clone();
    }

    let group_ref = provisioner.create_scaling_group(&[id, SCALING_GROUP], &scaling_group, &bootstrap)?;
    provisioner.attach_scaling_policy(&[id, SCALING_POLICY], &group_ref, &scaling_policy)?;

    info!(
        fleet = id,
        min = scaling_group.min_capacity,
        max = scaling_group.max_capacity,
        target_cpu = scaling_policy.target_utilization_percent,
        cooldown_secs = scaling_policy.cooldown.as_secs(),
        allowed = firewall_rules.allow_rules().len(),
        index = %index_document,
        "proxy fleet composed"
    );

    Ok(FleetHandle {
        id: id.to_string(),
        firewall,
        firewall_rules,
        scaling_group: group_ref,
        scaling_group_spec: scaling_group,
        scaling_policy_spec: scaling_policy,
        index_document,
        bootstrap,
        listeners: 0,
        listener_slots: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LoadBalancerKind, Protocol, SubnetRef};

    /// Records every call instead of provisioning anything.
    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
        firewalls: Vec<FirewallRuleSet>,
        groups: Vec<(ScalingGroupSpec, BootstrapScript)>,
        policies: Vec<ScalingPolicySpec>,
        targets: Vec<(String, u16)>,
        fail_listener: bool,
        fail_targets_once: bool,
    }

    impl Provisioner for Recorder {
        fn create_firewall(
            &mut self,
            path: &[&str],
            _network: &NetworkRef,
            rules: &FirewallRuleSet,
        ) -> Result<FirewallRef> {
            self.calls.push(format!("firewall {}", path.join("/")));
            self.firewalls.push(rules.clone());
            Ok(FirewallRef::new("sg-0001"))
        }

        fn create_scaling_group(
            &mut self,
            path: &[&str],
            spec: &ScalingGroupSpec,
            user_data: &BootstrapScript,
        ) -> Result<ScalingGroupRef> {
            self.calls.push(format!("group {}", path.join("/")));
            self.groups.push((spec.clone(), user_data.clone()));
            Ok(ScalingGroupRef {
                id: "asg-0001".into(),
                network_id: spec.network.id.clone(),
            })
        }

        fn attach_scaling_policy(
            &mut self,
            path: &[&str],
            _group: &ScalingGroupRef,
            policy: &ScalingPolicySpec,
        ) -> Result<()> {
            self.calls.push(format!("policy {}", path.join("/")));
            self.policies.push(policy.clone());
            Ok(())
        }

        fn create_listener(
            &mut self,
            path: &[&str],
            load_balancer: &LoadBalancerRef,
            _listener: &ListenerSpec,
        ) -> Result<ListenerRef> {
            if self.fail_listener {
                return Err(Error::Provisioning("listener rejected".into()));
            }
            self.calls.push(format!("listener {}", path.join("/")));
            Ok(ListenerRef {
                id: path.join("/"),
                load_balancer_id: load_balancer.id.clone(),
            })
        }

        fn register_targets(
            &mut self,
            path: &[&str],
            listener: &ListenerRef,
            _group: &ScalingGroupRef,
            port: u16,
        ) -> Result<()> {
            if self.fail_targets_once {
                self.fail_targets_once = false;
                return Err(Error::Provisioning("target group rejected".into()));
            }
            self.calls.push(format!("targets {}", path.join("/")));
            self.targets.push((listener.id.clone(), port));
            Ok(())
        }
    }

    fn network() -> NetworkRef {
        NetworkRef {
            id: "vpc-1".into(),
            subnets: vec![SubnetRef {
                id: "subnet-priv-a".into(),
                subnet_type: SubnetType::Private,
                availability_zone: "us-east-1a".into(),
                route_table_id: None,
            }],
        }
    }

    fn origin() -> WebsiteOrigin {
        WebsiteOrigin {
            bucket_id: "bucket".into(),
            bucket_name: "example-bucket".into(),
            website_url: "http://example-bucket.s3-website.amazonaws.com".into(),
        }
    }

    fn lb() -> LoadBalancerRef {
        LoadBalancerRef {
            id: "nlb".into(),
            kind: LoadBalancerKind::Network,
            network_id: "vpc-1".into(),
        }
    }

    #[test]
    fn defaults_scenario() {
        let mut p = Recorder::default();
        let fleet = compose(&mut p, "farm", &FleetConfig::new(network(), origin())).unwrap();

        let spec = fleet.scaling_group_spec();
        assert_eq!((spec.min_capacity, spec.max_capacity), (1, 3));
        assert_eq!(spec.instance_type, "t2.micro");
        assert_eq!(spec.subnets.subnet_type, SubnetType::Private);
        assert!(!spec.associate_public_ip_address);
        assert_eq!(spec.firewall, FirewallRef::new("sg-0001"));

        assert_eq!(fleet.scaling_policy_spec(), &ScalingPolicySpec::default());
        assert!(fleet.firewall_rules().is_closed());
        assert_eq!(fleet.index_document().as_str(), "index.html");
        assert_eq!(
            p.calls,
            vec![
                "firewall farm/autoscaling-group-security-group",
                "group farm/autoscaling-group",
                "policy farm/scaling-policy",
            ]
        );
    }

    #[test]
    fn overrides_scenario() {
        let config = FleetConfig::new(network(), origin())
            .with_scaling_group_override(ConfigValue::record([(
                "max_capacity",
                ConfigValue::from(4u32),
            )]))
            .with_scaling_policy_override(ConfigValue::record([(
                "cooldown",
                ConfigValue::from(Duration::from_secs(100)),
            )]))
            .with_allowed_cidr_ranges(["10.0.128.0/18", "10.0.192.0/18"])
            .with_index_document("test_index.html");

        let mut p = Recorder::default();
        let fleet = compose(&mut p, "farm", &config).unwrap();

        let spec = fleet.scaling_group_spec();
        assert_eq!((spec.min_capacity, spec.max_capacity), (1, 4));

        let policy = fleet.scaling_policy_spec();
        assert_eq!(policy.cooldown, Duration::from_secs(100));
        assert_eq!(policy.target_utilization_percent, 80);

        assert_eq!(p.firewalls[0].allow_rules().len(), 2);
        assert_eq!(p.firewalls[0].entries().count(), 3);

        let (_, script) = &p.groups[0];
        assert_eq!(script, fleet.bootstrap_script());
        assert!(script.as_str().contains(
            "proxy_pass http://example-bucket.s3-website.amazonaws.com/test_index.html;"
        ));
    }

    #[test]
    fn invalid_input_provisions_nothing() {
        let bad_cidr = FleetConfig::new(network(), origin()).with_allowed_cidr_ranges(["10.0.0.0/40"]);
        let bad_group = FleetConfig::new(network(), origin()).with_scaling_group_override(
            ConfigValue::record([("min_capacity", ConfigValue::from(9u32))]),
        );
        let bad_key = FleetConfig::new(network(), origin()).with_scaling_policy_override(
            ConfigValue::record([("cool_down", ConfigValue::from(10u32))]),
        );
        let bad_url = FleetConfig::new(
            network(),
            WebsiteOrigin {
                website_url: "s3://bucket".into(),
                ..origin()
            },
        );
        let bad_index = FleetConfig::new(network(), origin()).with_index_document("../etc/passwd");

        for config in [bad_cidr, bad_group, bad_key, bad_url, bad_index] {
            let mut p = Recorder::default();
            assert!(compose(&mut p, "farm", &config).is_err());
            assert!(p.calls.is_empty());
        }
    }

    #[test]
    fn kind_conflict_is_reported() {
        let config = FleetConfig::new(network(), origin()).with_scaling_group_override(
            ConfigValue::record([(
                "network",
                ConfigValue::record([("id", ConfigValue::from("vpc-2"))]),
            )]),
        );
        let mut p = Recorder::default();
        let err = compose(&mut p, "farm", &config).unwrap_err();
        assert!(matches!(err, Error::KindConflict { ref path, .. } if path == "network"));
    }

    #[test]
    fn firewall_override_is_kept() {
        let custom = FirewallRef::new("sg-shared");
        let config = FleetConfig::new(network(), origin()).with_scaling_group_override(
            ConfigValue::record([("firewall", ConfigValue::from(custom.clone()))]),
        );
        let mut p = Recorder::default();
        let fleet = compose(&mut p, "farm", &config).unwrap();

        assert_eq!(fleet.scaling_group_spec().firewall, custom);
        // The fleet still owns the firewall it created.
        assert_eq!(fleet.firewall(), &FirewallRef::new("sg-0001"));
    }

    #[test]
    fn compose_is_repeatable() {
        let config = FleetConfig::new(network(), origin()).with_allowed_cidr_ranges(["10.0.0.0/8"]);
        let mut first = Recorder::default();
        let mut second = Recorder::default();

        let a = compose(&mut first, "farm", &config).unwrap();
        let b = compose(&mut second, "farm", &config).unwrap();

        assert_eq!(a.bootstrap_script(), b.bootstrap_script());
        assert_eq!(a.scaling_group_spec(), b.scaling_group_spec());
        assert_eq!(first.calls, second.calls);
    }

    #[test]
    fn each_expose_binds_one_listener_to_proxy_port() {
        let mut p = Recorder::default();
        let mut fleet = compose(&mut p, "farm", &FleetConfig::new(network(), origin())).unwrap();

        fleet
            .expose(&mut p, &lb(), ListenerSpec { port: 80, protocol: Protocol::Tcp })
            .unwrap();
        fleet
            .expose(&mut p, &lb(), ListenerSpec { port: 443, protocol: Protocol::Tls })
            .unwrap();

        assert_eq!(fleet.listener_count(), 2);
        assert_eq!(
            p.targets,
            vec![
                ("farm/load-balancer-listener".to_string(), 8080),
                ("farm/load-balancer-listener-2".to_string(), 8080),
            ]
        );
    }

    #[test]
    fn expose_surfaces_provisioner_errors() {
        let mut p = Recorder::default();
        let mut fleet = compose(&mut p, "farm", &FleetConfig::new(network(), origin())).unwrap();
        p.fail_listener = true;

        let err = fleet
            .expose(&mut p, &lb(), ListenerSpec { port: 80, protocol: Protocol::Tcp })
            .unwrap_err();
        assert_eq!(err.to_string(), "provisioning failed: listener rejected");
        assert_eq!(fleet.listener_count(), 0);
    }

    #[test]
    fn failed_attach_does_not_reuse_listener_name() {
        let mut p = Recorder::default();
        let mut fleet = compose(&mut p, "farm", &FleetConfig::new(network(), origin())).unwrap();
        p.fail_targets_once = true;

        let tcp = ListenerSpec { port: 80, protocol: Protocol::Tcp };
        assert!(fleet.expose(&mut p, &lb(), tcp).is_err());
        assert_eq!(fleet.listener_count(), 0);

        let listener = fleet.expose(&mut p, &lb(), tcp).unwrap();
        assert_eq!(listener.id, "farm/load-balancer-listener-2");
        assert_eq!(fleet.listener_count(), 1);
        assert_eq!(
            p.calls[3..],
            [
                "listener farm/load-balancer-listener",
                "listener farm/load-balancer-listener-2",
                "targets farm/load-balancer-listener-2-targets",
            ]
        );
    }
}
