use serde::Serialize;

use crate::Expr;

// ── Resources ───────────────────────────────────────────────────────

/// A single template resource, serialized as `{"Type": ..., "Properties": ...}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "Type", content = "Properties")]
pub enum Resource {
    #[serde(rename = "AWS::EC2::VPC")]
    Vpc(Vpc),
    #[serde(rename = "AWS::EC2::Subnet")]
    Subnet(Subnet),
    #[serde(rename = "AWS::EC2::InternetGateway")]
    InternetGateway(InternetGateway),
    #[serde(rename = "AWS::EC2::VPCGatewayAttachment")]
    VpcGatewayAttachment(VpcGatewayAttachment),
    #[serde(rename = "AWS::EC2::RouteTable")]
    RouteTable(RouteTable),
    #[serde(rename = "AWS::EC2::SubnetRouteTableAssociation")]
    SubnetRouteTableAssociation(SubnetRouteTableAssociation),
    #[serde(rename = "AWS::EC2::Route")]
    Route(Route),
    #[serde(rename = "AWS::EC2::EIP")]
    Eip(Eip),
    #[serde(rename = "AWS::EC2::NatGateway")]
    NatGateway(NatGateway),
    #[serde(rename = "AWS::EC2::VPCEndpoint")]
    VpcEndpoint(VpcEndpoint),
    #[serde(rename = "AWS::EC2::SecurityGroup")]
    SecurityGroup(SecurityGroup),
    #[serde(rename = "AWS::S3::Bucket")]
    Bucket(Bucket),
    #[serde(rename = "AWS::S3::BucketPolicy")]
    BucketPolicy(BucketPolicy),
    #[serde(rename = "AWS::AutoScaling::LaunchConfiguration")]
    LaunchConfiguration(LaunchConfiguration),
    #[serde(rename = "AWS::AutoScaling::AutoScalingGroup")]
    AutoScalingGroup(AutoScalingGroup),
    #[serde(rename = "AWS::AutoScaling::ScalingPolicy")]
    ScalingPolicy(ScalingPolicy),
    #[serde(rename = "AWS::ElasticLoadBalancingV2::LoadBalancer")]
    LoadBalancer(LoadBalancer),
    #[serde(rename = "AWS::ElasticLoadBalancingV2::Listener")]
    Listener(Listener),
    #[serde(rename = "AWS::ElasticLoadBalancingV2::TargetGroup")]
    TargetGroup(TargetGroup),
}

impl Resource {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Vpc(_) => "AWS::EC2::VPC",
            Self::Subnet(_) => "AWS::EC2::Subnet",
            Self::InternetGateway(_) => "AWS::EC2::InternetGateway",
            Self::VpcGatewayAttachment(_) => "AWS::EC2::VPCGatewayAttachment",
            Self::RouteTable(_) => "AWS::EC2::RouteTable",
            Self::SubnetRouteTableAssociation(_) => "AWS::EC2::SubnetRouteTableAssociation",
            Self::Route(_) => "AWS::EC2::Route",
            Self::Eip(_) => "AWS::EC2::EIP",
            Self::NatGateway(_) => "AWS::EC2::NatGateway",
            Self::VpcEndpoint(_) => "AWS::EC2::VPCEndpoint",
            Self::SecurityGroup(_) => "AWS::EC2::SecurityGroup",
            Self::Bucket(_) => "AWS::S3::Bucket",
            Self::BucketPolicy(_) => "AWS::S3::BucketPolicy",
            Self::LaunchConfiguration(_) => "AWS::AutoScaling::LaunchConfiguration",
            Self::AutoScalingGroup(_) => "AWS::AutoScaling::AutoScalingGroup",
            Self::ScalingPolicy(_) => "AWS::AutoScaling::ScalingPolicy",
            Self::LoadBalancer(_) => "AWS::ElasticLoadBalancingV2::LoadBalancer",
            Self::Listener(_) => "AWS::ElasticLoadBalancingV2::Listener",
            Self::TargetGroup(_) => "AWS::ElasticLoadBalancingV2::TargetGroup",
        }
    }
}

macro_rules! impl_into_resource {
    ($($ty:ident),* $(,)?) => {
        $(
            impl From<$ty> for Resource {
                fn from(props: $ty) -> Self {
                    Resource::$ty(props)
                }
            }
        )*
    };
}

impl_into_resource!(
    Vpc,
    Subnet,
    InternetGateway,
    VpcGatewayAttachment,
    RouteTable,
    SubnetRouteTableAssociation,
    Route,
    Eip,
    NatGateway,
    VpcEndpoint,
    SecurityGroup,
    Bucket,
    BucketPolicy,
    LaunchConfiguration,
    AutoScalingGroup,
    ScalingPolicy,
    LoadBalancer,
    Listener,
    TargetGroup,
);

// ── Network ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Vpc {
    pub cidr_block: String,
    pub enable_dns_hostnames: bool,
    pub enable_dns_support: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Subnet {
    pub vpc_id: Expr,
    pub cidr_block: String,
    pub availability_zone: String,
    pub map_public_ip_on_launch: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct VpcEndpoint {
    pub service_name: String,
    pub vpc_id: Expr,
    pub vpc_endpoint_type: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub route_table_ids: Vec<Expr>,
}

/// Takes no properties.
#[derive(Debug, Clone, Serialize)]
pub struct InternetGateway {}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct VpcGatewayAttachment {
    pub vpc_id: Expr,
    pub internet_gateway_id: Expr,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RouteTable {
    pub vpc_id: Expr,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubnetRouteTableAssociation {
    pub route_table_id: Expr,
    pub subnet_id: Expr,
}

/// A route; exactly one of the targets is set.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Route {
    pub route_table_id: Expr,
    pub destination_cidr_block: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_id: Option<Expr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nat_gateway_id: Option<Expr>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Eip {
    pub domain: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct NatGateway {
    pub allocation_id: Expr,
    pub subnet_id: Expr,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SecurityGroup {
    pub group_description: String,
    pub vpc_id: Expr,
    pub security_group_ingress: Vec<IngressRule>,
    pub security_group_egress: Vec<EgressRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct IngressRule {
    pub ip_protocol: String,
    pub from_port: u16,
    pub to_port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cidr_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cidr_ipv6: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct EgressRule {
    pub ip_protocol: String,
    pub cidr_ip: String,
    pub description: String,
}

impl EgressRule {
    /// Allow all outbound traffic.
    pub fn allow_all() -> Self {
        Self {
            ip_protocol: "-1".into(),
            cidr_ip: "0.0.0.0/0".into(),
            description: "Allow all outbound traffic by default".into(),
        }
    }
}

// ── Storage ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Bucket {
    pub bucket_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website_configuration: Option<WebsiteConfiguration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_access_block_configuration: Option<PublicAccessBlock>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct WebsiteConfiguration {
    pub index_document: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PublicAccessBlock {
    pub block_public_acls: bool,
    pub block_public_policy: bool,
    pub ignore_public_acls: bool,
    pub restrict_public_buckets: bool,
}

impl PublicAccessBlock {
    pub fn block_all() -> Self {
        Self {
            block_public_acls: true,
            block_public_policy: true,
            ignore_public_acls: true,
            restrict_public_buckets: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BucketPolicy {
    pub bucket: Expr,
    pub policy_document: PolicyDocument,
}

#[derive(Debug, Clone, Serialize)]
pub struct PolicyDocument {
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Statement")]
    pub statements: Vec<PolicyStatement>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    pub effect: String,
    pub principal: serde_json::Value,
    pub action: Vec<String>,
    pub resource: Vec<Expr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<serde_json::Value>,
}

// ── Auto scaling ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LaunchConfiguration {
    pub image_id: Expr,
    pub instance_type: String,
    pub security_groups: Vec<Expr>,
    pub associate_public_ip_address: bool,
    pub user_data: Expr,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AutoScalingGroup {
    pub min_size: String,
    pub max_size: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desired_capacity: Option<String>,
    pub launch_configuration_name: Expr,
    #[serde(rename = "VPCZoneIdentifier")]
    pub vpc_zone_identifier: Vec<Expr>,
    #[serde(rename = "TargetGroupARNs", skip_serializing_if = "Vec::is_empty")]
    pub target_group_arns: Vec<Expr>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScalingPolicy {
    pub auto_scaling_group_name: Expr,
    pub policy_type: String,
    pub cooldown: String,
    pub target_tracking_configuration: TargetTrackingConfiguration,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TargetTrackingConfiguration {
    pub predefined_metric_specification: PredefinedMetricSpecification,
    pub target_value: f64,
    pub disable_scale_in: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PredefinedMetricSpecification {
    pub predefined_metric_type: String,
}

// ── Load balancing ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoadBalancer {
    #[serde(rename = "Type")]
    pub kind: String,
    pub scheme: String,
    pub subnets: Vec<Expr>,
    pub load_balancer_attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Attribute {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Listener {
    pub load_balancer_arn: Expr,
    pub port: u16,
    pub protocol: String,
    pub default_actions: Vec<ListenerAction>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListenerAction {
    #[serde(rename = "Type")]
    pub kind: String,
    pub target_group_arn: Expr,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TargetGroup {
    pub port: u16,
    pub protocol: String,
    pub vpc_id: Expr,
    pub target_type: String,
}

// ── Outputs ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Output {
    pub value: Expr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
