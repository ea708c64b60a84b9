//! [`Provisioner`] that records the fleet into a provisioning template.
//!
//! Besides the provisioner operations, [`TemplateProvisioner`] can declare the
//! collaborators a deployment needs around the fleet: the network, the
//! website bucket and its gateway endpoint, and the load balancer.

use cfn_template::{
    Attribute, AutoScalingGroup, Bucket, BucketPolicy, EgressRule, Eip, Expr, IngressRule,
    InternetGateway, LaunchConfiguration, Listener, ListenerAction, LoadBalancer, NatGateway,
    Output, PolicyDocument, PolicyStatement, PredefinedMetricSpecification, PublicAccessBlock,
    Resource, Route, RouteTable, ScalingPolicy, SecurityGroup, Subnet, SubnetRouteTableAssociation,
    TargetGroup, TargetTrackingConfiguration, Template, Vpc, VpcEndpoint, VpcGatewayAttachment,
    WebsiteConfiguration,
};
use ipnet::IpNet;
use serde_json::json;
use tracing::{debug, info};

use crate::allowlist::{Cidr, FirewallRuleSet};
use crate::bootstrap::{BootstrapScript, IndexDocument};
use crate::provisioner::Provisioner;
use crate::spec::{ScalingGroupSpec, ScalingPolicySpec};
use crate::types::{
    FirewallRef, ListenerRef, ListenerSpec, LoadBalancerKind, LoadBalancerRef, MachineImage,
    NetworkRef, Protocol, ScalingGroupRef, SubnetRef, SubnetType, WebsiteOrigin,
};
use crate::{Error, Result};

const AMAZON_LINUX_IMAGE: &str =
    "{{resolve:ssm:/aws/service/ami-amazon-linux-latest/amzn-ami-hvm-x86_64-gp2}}";
const CPU_METRIC: &str = "ASGAverageCPUUtilization";
const LAUNCH_CONFIG: &str = "launch-config";
const SMALLEST_SUBNET_PREFIX: u8 = 28;

pub struct TemplateProvisioner {
    template: Template,
    region: String,
}

impl TemplateProvisioner {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            template: Template::new(),
            region: region.into(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.template = self.template.with_description(description);
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn into_template(self) -> Template {
        self.template
    }

    // ── Collaborators ───────────────────────────────────────────────

    /// Declare a network with one public and one private subnet per
    /// availability zone. Public subnets take the low half of `cidr`.
    ///
    /// Public subnets route to the internet through a gateway attached to the
    /// network; each zone's private subnet routes through a NAT gateway placed
    /// in that zone's public subnet.
    pub fn add_network(&mut self, id: &str, cidr: &str, zones: &[&str]) -> Result<NetworkRef> {
        let range: Cidr = cidr.parse()?;
        let IpNet::V4(range) = range.net().trunc() else {
            return Err(Error::validation("network.cidr", "only IPv4 networks are supported"));
        };
        if zones.is_empty() {
            return Err(Error::validation(
                "network.zones",
                "at least one availability zone is required",
            ));
        }

        let count = zones.len() * 2;
        let extra_bits = count.next_power_of_two().trailing_zeros() as u8;
        let prefix = range.prefix_len() + extra_bits;
        if prefix > SMALLEST_SUBNET_PREFIX {
            return Err(Error::validation(
                "network.cidr",
                format!("{cidr} is too small for {count} subnets"),
            ));
        }
        let mut blocks = range
            .subnets(prefix)
            .map_err(|e| Error::validation("network.cidr", e.to_string()))?;

        let vpc_id = self.template.add(
            &[id, "vpc"],
            Vpc {
                cidr_block: range.to_string(),
                enable_dns_hostnames: true,
                enable_dns_support: true,
            },
        )?;
        let igw_id = self.template.add(&[id, "igw"], InternetGateway {})?;
        let attachment_id = self.template.add(
            &[id, "vpc-gateway-attachment"],
            VpcGatewayAttachment {
                vpc_id: Expr::reference(&vpc_id),
                internet_gateway_id: Expr::reference(&igw_id),
            },
        )?;

        let mut subnets = Vec::with_capacity(count);
        let mut nat_gateways = Vec::with_capacity(zones.len());
        let placements = [SubnetType::Public, SubnetType::Private];
        for subnet_type in placements {
            for (i, zone) in zones.iter().enumerate() {
                let block = blocks.next().ok_or_else(|| {
                    Error::validation("network.cidr", format!("{cidr} ran out of subnet blocks"))
                })?;
                let name = format!("{}-subnet-{}", subnet_type, i + 1);
                let public = subnet_type == SubnetType::Public;

                let subnet_id = self.template.add(
                    &[id, name.as_str()],
                    Subnet {
                        vpc_id: Expr::reference(&vpc_id),
                        cidr_block: block.to_string(),
                        availability_zone: zone.to_string(),
                        map_public_ip_on_launch: public,
                    },
                )?;
                let table_id = self.template.add(
                    &[id, name.as_str(), "route-table"],
                    RouteTable {
                        vpc_id: Expr::reference(&vpc_id),
                    },
                )?;
                self.template.add(
                    &[id, name.as_str(), "route-table-association"],
                    SubnetRouteTableAssociation {
                        route_table_id: Expr::reference(&table_id),
                        subnet_id: Expr::reference(&subnet_id),
                    },
                )?;

                let (gateway_id, nat_gateway_id) = if public {
                    (Some(Expr::reference(&igw_id)), None)
                } else {
                    let nat = nat_gateways.get(i).ok_or_else(|| {
                        Error::Provisioning(format!("no NAT gateway for zone {zone}"))
                    })?;
                    (None, Some(Expr::reference(nat)))
                };
                let route_id = self.template.add(
                    &[id, name.as_str(), "default-route"],
                    Route {
                        route_table_id: Expr::reference(&table_id),
                        destination_cidr_block: "0.0.0.0/0".to_string(),
                        gateway_id,
                        nat_gateway_id,
                    },
                )?;

                if public {
                    // The gateway only routes once attached to the network.
                    self.template.depends_on(&route_id, &attachment_id)?;

                    let eip_id = self.template.add(
                        &[id, name.as_str(), "eip"],
                        Eip {
                            domain: "vpc".to_string(),
                        },
                    )?;
                    let nat_id = self.template.add(
                        &[id, name.as_str(), "nat-gateway"],
                        NatGateway {
                            allocation_id: Expr::get_att(&eip_id, "AllocationId"),
                            subnet_id: Expr::reference(&subnet_id),
                        },
                    )?;
                    nat_gateways.push(nat_id);
                }

                subnets.push(SubnetRef {
                    id: subnet_id,
                    subnet_type,
                    availability_zone: zone.to_string(),
                    route_table_id: Some(table_id),
                });
            }
        }

        debug!(
            network = %vpc_id,
            subnets = subnets.len(),
            nat_gateways = nat_gateways.len(),
            "declared network"
        );
        Ok(NetworkRef {
            id: vpc_id,
            subnets,
        })
    }

    /// Declare a website-hosting bucket with all public access blocked.
    pub fn add_website_bucket(
        &mut self,
        id: &str,
        bucket_name: &str,
        index_document: &IndexDocument,
    ) -> Result<WebsiteOrigin> {
        if bucket_name.is_empty() {
            return Err(Error::validation("bucket.name", "bucket name must not be empty"));
        }

        let bucket_id = self.template.add(
            &[id],
            Bucket {
                bucket_name: bucket_name.to_string(),
                website_configuration: Some(WebsiteConfiguration {
                    index_document: index_document.to_string(),
                }),
                public_access_block_configuration: Some(PublicAccessBlock::block_all()),
            },
        )?;

        Ok(WebsiteOrigin {
            bucket_id,
            bucket_name: bucket_name.to_string(),
            website_url: format!(
                "http://{bucket_name}.s3-website-{}.amazonaws.com",
                self.region
            ),
        })
    }

    /// Declare an S3 gateway endpoint in `network`, routed from every private
    /// subnet's route table; returns its logical id.
    pub fn add_gateway_endpoint(&mut self, id: &str, network: &NetworkRef) -> Result<String> {
        let route_table_ids: Vec<Expr> = network
            .route_tables(SubnetType::Private)
            .into_iter()
            .map(Expr::reference)
            .collect();
        if route_table_ids.is_empty() {
            return Err(Error::Provisioning(format!(
                "network {} has no private route tables for gateway endpoint {id}",
                network.id
            )));
        }

        Ok(self.template.add(
            &[id],
            VpcEndpoint {
                service_name: format!("com.amazonaws.{}.s3", self.region),
                vpc_id: Expr::reference(&network.id),
                vpc_endpoint_type: "Gateway".to_string(),
                route_table_ids,
            },
        )?)
    }

    /// Allow object reads from the bucket, only through `endpoint_id`.
    pub fn grant_read_from_endpoint(
        &mut self,
        id: &str,
        origin: &WebsiteOrigin,
        endpoint_id: &str,
    ) -> Result<String> {
        let objects = Expr::join(
            "",
            vec![
                Expr::get_att(&origin.bucket_id, "Arn"),
                Expr::from("/*"),
            ],
        );

        Ok(self.template.add(
            &[id],
            BucketPolicy {
                bucket: Expr::reference(&origin.bucket_id),
                policy_document: PolicyDocument {
                    version: "2012-10-17".to_string(),
                    statements: vec![PolicyStatement {
                        effect: "Allow".to_string(),
                        principal: json!({ "AWS": "*" }),
                        action: vec!["s3:GetObject".to_string()],
                        resource: vec![objects],
                        condition: Some(json!({
                            "StringEquals": { "aws:SourceVpce": { "Ref": endpoint_id } }
                        })),
                    }],
                },
            },
        )?)
    }

    /// Declare a network load balancer over `network`'s private subnets
    /// when `internal`, its public subnets otherwise.
    pub fn add_network_load_balancer(
        &mut self,
        id: &str,
        network: &NetworkRef,
        internal: bool,
        cross_zone: bool,
    ) -> Result<LoadBalancerRef> {
        let (scheme, placement) = if internal {
            ("internal", SubnetType::Private)
        } else {
            ("internet-facing", SubnetType::Public)
        };
        let subnets: Vec<Expr> = network
            .select(placement)
            .into_iter()
            .map(|s| Expr::reference(&s.id))
            .collect();
        if subnets.is_empty() {
            return Err(Error::Provisioning(format!(
                "network {} has no {placement} subnets for load balancer {id}",
                network.id
            )));
        }

        let lb_id = self.template.add(
            &[id],
            LoadBalancer {
                kind: LoadBalancerKind::Network.as_str().to_string(),
                scheme: scheme.to_string(),
                subnets,
                load_balancer_attributes: vec![Attribute {
                    key: "load_balancing.cross_zone.enabled".to_string(),
                    value: cross_zone.to_string(),
                }],
            },
        )?;

        Ok(LoadBalancerRef {
            id: lb_id,
            kind: LoadBalancerKind::Network,
            network_id: network.id.clone(),
        })
    }

    /// `http://<load balancer dns name>`
    pub fn load_balancer_url(load_balancer: &LoadBalancerRef) -> Expr {
        Expr::join(
            "",
            vec![
                Expr::from("http://"),
                Expr::get_att(&load_balancer.id, "DNSName"),
            ],
        )
    }

    pub fn add_output(&mut self, name: &str, value: Expr, description: Option<&str>) -> Result<()> {
        self.template.add_output(
            name,
            Output {
                value,
                description: description.map(str::to_string),
            },
        )?;
        Ok(())
    }

    fn scaling_group_mut(&mut self, id: &str) -> Result<&mut AutoScalingGroup> {
        match self.template.get_mut(id) {
            Some(Resource::AutoScalingGroup(group)) => Ok(group),
            _ => Err(Error::Provisioning(format!("unknown scaling group {id}"))),
        }
    }
}

impl Provisioner for TemplateProvisioner {
    fn create_firewall(
        &mut self,
        path: &[&str],
        network: &NetworkRef,
        rules: &FirewallRuleSet,
    ) -> Result<FirewallRef> {
        let ingress = rules
            .allow_rules()
            .iter()
            .map(|rule| {
                let range = rule.source.to_string();
                let (cidr_ip, cidr_ipv6) = if rule.source.is_ipv4() {
                    (Some(range), None)
                } else {
                    (None, Some(range))
                };
                IngressRule {
                    ip_protocol: "tcp".to_string(),
                    from_port: rule.port,
                    to_port: rule.port,
                    cidr_ip,
                    cidr_ipv6,
                    description: "allow proxy access from CIDR range".to_string(),
                }
            })
            .collect();

        // Security groups drop any ingress no rule matches.
        let id = self.template.add(
            path,
            SecurityGroup {
                group_description: path.join("/"),
                vpc_id: Expr::reference(&network.id),
                security_group_ingress: ingress,
                security_group_egress: vec![EgressRule::allow_all()],
            },
        )?;

        debug!(firewall = %id, allowed = rules.allow_rules().len(), "declared security group");
        Ok(FirewallRef::new(id))
    }

    fn create_scaling_group(
        &mut self,
        path: &[&str],
        spec: &ScalingGroupSpec,
        user_data: &BootstrapScript,
    ) -> Result<ScalingGroupRef> {
        let subnets: Vec<Expr> = spec
            .network
            .select(spec.subnets.subnet_type)
            .into_iter()
            .map(|s| Expr::reference(&s.id))
            .collect();
        if subnets.is_empty() {
            return Err(Error::Provisioning(format!(
                "network {} has no {} subnets",
                spec.network.id, spec.subnets.subnet_type
            )));
        }

        let image_id = match &spec.machine_image {
            MachineImage::AmazonLinux => Expr::from(AMAZON_LINUX_IMAGE),
            MachineImage::Ami(id) => Expr::from(id.as_str()),
        };

        let mut launch_path = path.to_vec();
        launch_path.push(LAUNCH_CONFIG);
        let launch_id = self.template.add(
            &launch_path,
            LaunchConfiguration {
                image_id,
                instance_type: spec.instance_type.clone(),
                security_groups: vec![Expr::get_att(&spec.firewall.id, "GroupId")],
                associate_public_ip_address: spec.associate_public_ip_address,
                user_data: Expr::from(user_data.to_base64()),
            },
        )?;

        let id = self.template.add(
            path,
            AutoScalingGroup {
                min_size: spec.min_capacity.to_string(),
                max_size: spec.max_capacity.to_string(),
                desired_capacity: spec.desired_capacity.map(|n| n.to_string()),
                launch_configuration_name: Expr::reference(&launch_id),
                vpc_zone_identifier: subnets,
                target_group_arns: Vec::new(),
            },
        )?;

        debug!(scaling_group = %id, launch_configuration = %launch_id, "declared scaling group");
        Ok(ScalingGroupRef {
            id,
            network_id: spec.network.id.clone(),
        })
    }

    fn attach_scaling_policy(
        &mut self,
        path: &[&str],
        group: &ScalingGroupRef,
        policy: &ScalingPolicySpec,
    ) -> Result<()> {
        self.scaling_group_mut(&group.id)?;

        self.template.add(
            path,
            ScalingPolicy {
                auto_scaling_group_name: Expr::reference(&group.id),
                policy_type: "TargetTrackingScaling".to_string(),
                cooldown: policy.cooldown.as_secs().to_string(),
                target_tracking_configuration: TargetTrackingConfiguration {
                    predefined_metric_specification: PredefinedMetricSpecification {
                        predefined_metric_type: CPU_METRIC.to_string(),
                    },
                    target_value: f64::from(policy.target_utilization_percent),
                    disable_scale_in: policy.disable_scale_in,
                },
            },
        )?;
        Ok(())
    }

    fn create_listener(
        &mut self,
        path: &[&str],
        load_balancer: &LoadBalancerRef,
        listener: &ListenerSpec,
    ) -> Result<ListenerRef> {
        if load_balancer.kind != LoadBalancerKind::Network {
            return Err(Error::Provisioning(format!(
                "load balancer {} is an {} load balancer; only network load balancers are supported",
                load_balancer.id,
                load_balancer.kind.as_str()
            )));
        }
        if !listener.protocol.is_layer4() {
            return Err(Error::Provisioning(format!(
                "network load balancers cannot listen on {}",
                listener.protocol
            )));
        }

        // Actions are filled in when targets are registered.
        let id = self.template.add(
            path,
            Listener {
                load_balancer_arn: Expr::reference(&load_balancer.id),
                port: listener.port,
                protocol: listener.protocol.to_string(),
                default_actions: Vec::new(),
            },
        )?;

        Ok(ListenerRef {
            id,
            load_balancer_id: load_balancer.id.clone(),
        })
    }

    fn register_targets(
        &mut self,
        path: &[&str],
        listener: &ListenerRef,
        group: &ScalingGroupRef,
        port: u16,
    ) -> Result<()> {
        let protocol = match self.template.get(&listener.id) {
            Some(Resource::Listener(l)) => l.protocol.parse::<Protocol>()?,
            _ => {
                return Err(Error::Provisioning(format!(
                    "unknown listener {}",
                    listener.id
                )));
            }
        };
        // TLS terminates at the load balancer; the hosts speak plain TCP.
        let target_protocol = match protocol {
            Protocol::Tls => Protocol::Tcp,
            other => other,
        };
        self.scaling_group_mut(&group.id)?;

        let target_group = self.template.add(
            path,
            TargetGroup {
                port,
                protocol: target_protocol.to_string(),
                vpc_id: Expr::reference(&group.network_id),
                target_type: "instance".to_string(),
            },
        )?;

        if let Some(Resource::Listener(l)) = self.template.get_mut(&listener.id) {
            l.default_actions.push(ListenerAction {
                kind: "forward".to_string(),
                target_group_arn: Expr::reference(&target_group),
            });
        }
        self.scaling_group_mut(&group.id)?
            .target_group_arns
            .push(Expr::reference(&target_group));

        info!(
            listener = %listener.id,
            target_group = %target_group,
            port,
            "registered scaling group as listener target"
        );
        Ok(())
    }
}
