//! Typed model of a declarative provisioning template.
//!
//! Covers the subset needed to describe a private static-website stack:
//! routed network, bucket, security group, auto-scaling group, scaling policy and
//! network load balancer resources, plus outputs. Rendering produces the
//! JSON document a provisioning engine consumes.
//!
//! Logical ids are derived from a construct path (`["farm", "asg"]`) and
//! carry a short hash suffix, so the same path always yields the same id.

mod expr;
mod types;

use std::collections::BTreeMap;

use serde::Serialize;
use sha2::{Digest, Sha256};

pub use expr::Expr;
pub use types::*;

const FORMAT_VERSION: &str = "2010-09-09";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("duplicate logical id: {0}")]
    DuplicateId(String),

    #[error("duplicate output: {0}")]
    DuplicateOutput(String),

    #[error("empty construct path")]
    EmptyPath,

    #[error("unknown logical id: {0}")]
    UnknownId(String),

    #[error("template serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Derive the logical id for a construct path.
///
/// Alphanumeric characters of every path component are concatenated and
/// suffixed with the first 8 hex digits of the SHA-256 of the `/`-joined path.
pub fn logical_id(path: &[&str]) -> Result<String> {
    if path.is_empty() {
        return Err(Error::EmptyPath);
    }

    let human: String = path
        .iter()
        .flat_map(|part| part.chars())
        .filter(char::is_ascii_alphanumeric)
        .collect();

    let digest = Sha256::digest(path.join("/").as_bytes());
    let suffix: String = digest.iter().take(4).map(|b| format!("{b:02X}")).collect();

    Ok(format!("{human}{suffix}"))
}

/// A resource entry plus its resource-level attributes.
#[derive(Debug, Clone, Serialize)]
struct Declared {
    #[serde(flatten)]
    resource: Resource,
    #[serde(rename = "DependsOn", skip_serializing_if = "Vec::is_empty")]
    depends_on: Vec<String>,
}

/// An in-memory template document.
#[derive(Debug, Clone, Serialize)]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    format_version: &'static str,
    #[serde(rename = "Description", skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(rename = "Resources")]
    resources: BTreeMap<String, Declared>,
    #[serde(rename = "Outputs", skip_serializing_if = "BTreeMap::is_empty")]
    outputs: BTreeMap<String, Output>,
}

impl Template {
    pub fn new() -> Self {
        Self {
            format_version: FORMAT_VERSION,
            description: None,
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a resource under the logical id derived from `path`.
    pub fn add(&mut self, path: &[&str], resource: impl Into<Resource>) -> Result<String> {
        let id = logical_id(path)?;
        if self.resources.contains_key(&id) {
            return Err(Error::DuplicateId(id));
        }
        self.resources.insert(
            id.clone(),
            Declared {
                resource: resource.into(),
                depends_on: Vec::new(),
            },
        );
        Ok(id)
    }

    /// Order creation of `logical_id` after `dependency`.
    ///
    /// Needed where the engine cannot infer the ordering from references,
    /// e.g. a default route through a gateway that must be attached first.
    pub fn depends_on(&mut self, logical_id: &str, dependency: &str) -> Result<()> {
        if !self.resources.contains_key(dependency) {
            return Err(Error::UnknownId(dependency.to_string()));
        }
        let entry = self
            .resources
            .get_mut(logical_id)
            .ok_or_else(|| Error::UnknownId(logical_id.to_string()))?;
        if !entry.depends_on.iter().any(|d| d == dependency) {
            entry.depends_on.push(dependency.to_string());
        }
        Ok(())
    }

    pub fn add_output(&mut self, name: &str, output: Output) -> Result<()> {
        if self.outputs.contains_key(name) {
            return Err(Error::DuplicateOutput(name.to_string()));
        }
        self.outputs.insert(name.to_string(), output);
        Ok(())
    }

    pub fn get(&self, logical_id: &str) -> Option<&Resource> {
        self.resources.get(logical_id).map(|d| &d.resource)
    }

    pub fn get_mut(&mut self, logical_id: &str) -> Option<&mut Resource> {
        self.resources.get_mut(logical_id).map(|d| &mut d.resource)
    }

    /// All resources of the given type name, in logical-id order.
    pub fn resources_of_type<'a>(
        &'a self,
        type_name: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a Resource)> + 'a {
        self.resources
            .iter()
            .filter(move |(_, d)| d.resource.type_name() == type_name)
            .map(|(id, d)| (id.as_str(), &d.resource))
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Default for Template {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vpc() -> Vpc {
        Vpc {
            cidr_block: "10.0.0.0/16".into(),
            enable_dns_hostnames: true,
            enable_dns_support: true,
        }
    }

    #[test]
    fn logical_id_is_stable_and_path_sensitive() {
        let a = logical_id(&["farm", "autoscaling-group"]).unwrap();
        let b = logical_id(&["farm", "autoscaling-group"]).unwrap();
        let c = logical_id(&["farm", "autoscaling", "group"]).unwrap();

        assert_eq!(a, b);
        assert!(a.starts_with("farmautoscalinggroup"));
        assert_eq!(a.len(), "farmautoscalinggroup".len() + 8);
        // Same alphanumerics, different path: the hash keeps them apart.
        assert_ne!(a, c);
    }

    #[test]
    fn empty_path_is_rejected() {
        assert!(matches!(logical_id(&[]), Err(Error::EmptyPath)));
    }

    #[test]
    fn duplicate_resource_is_rejected() {
        let mut template = Template::new();
        template.add(&["net", "vpc"], vpc()).unwrap();
        let err = template.add(&["net", "vpc"], vpc()).unwrap_err();
        assert!(matches!(err, Error::DuplicateId(_)));
        assert_eq!(template.len(), 1);
    }

    #[test]
    fn resources_render_with_type_and_properties() {
        let mut template = Template::new().with_description("test");
        let id = template.add(&["net", "vpc"], vpc()).unwrap();

        let json = template.to_json().unwrap();
        assert_eq!(json["AWSTemplateFormatVersion"], "2010-09-09");
        assert_eq!(json["Description"], "test");
        assert_eq!(json["Resources"][&id]["Type"], "AWS::EC2::VPC");
        assert_eq!(json["Resources"][&id]["Properties"]["CidrBlock"], "10.0.0.0/16");
        assert!(json.get("Outputs").is_none());
    }

    #[test]
    fn filters_by_type() {
        let mut template = Template::new();
        let vpc_id = template.add(&["net", "vpc"], vpc()).unwrap();
        template
            .add(
                &["net", "subnet-a"],
                Subnet {
                    vpc_id: Expr::reference(&vpc_id),
                    cidr_block: "10.0.0.0/18".into(),
                    availability_zone: "us-east-1a".into(),
                    map_public_ip_on_launch: false,
                },
            )
            .unwrap();

        let subnets: Vec<_> = template.resources_of_type("AWS::EC2::Subnet").collect();
        assert_eq!(subnets.len(), 1);
    }

    #[test]
    fn depends_on_renders_next_to_properties() {
        let mut template = Template::new();
        let vpc_id = template.add(&["net", "vpc"], vpc()).unwrap();
        let igw = template.add(&["net", "igw"], InternetGateway {}).unwrap();
        let attach = template
            .add(
                &["net", "attach"],
                VpcGatewayAttachment {
                    vpc_id: Expr::reference(&vpc_id),
                    internet_gateway_id: Expr::reference(&igw),
                },
            )
            .unwrap();
        let table = template
            .add(&["net", "rt"], RouteTable { vpc_id: Expr::reference(&vpc_id) })
            .unwrap();
        let route = template
            .add(
                &["net", "rt", "default"],
                Route {
                    route_table_id: Expr::reference(&table),
                    destination_cidr_block: "0.0.0.0/0".into(),
                    gateway_id: Some(Expr::reference(&igw)),
                    nat_gateway_id: None,
                },
            )
            .unwrap();

        template.depends_on(&route, &attach).unwrap();
        // Repeating the same edge is a no-op.
        template.depends_on(&route, &attach).unwrap();

        let json = template.to_json().unwrap();
        let rendered = &json["Resources"][&route];
        assert_eq!(rendered["Type"], "AWS::EC2::Route");
        assert_eq!(rendered["Properties"]["GatewayId"], serde_json::json!({"Ref": igw}));
        assert!(rendered["Properties"].get("NatGatewayId").is_none());
        assert_eq!(rendered["DependsOn"], serde_json::json!([attach]));
        assert_eq!(json["Resources"][&igw]["Properties"], serde_json::json!({}));
        assert!(json["Resources"][&vpc_id].get("DependsOn").is_none());

        assert!(matches!(
            template.depends_on(&route, "Missing00000000"),
            Err(Error::UnknownId(_))
        ));
        assert!(matches!(
            template.depends_on("Missing00000000", &igw),
            Err(Error::UnknownId(_))
        ));
    }
}
