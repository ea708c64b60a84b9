//! Resolved scaling-group and scaling-policy configuration.
//!
//! Both specs round-trip through [`ConfigValue`] records so that defaults and
//! caller overrides can be combined by the merge engine before being decoded
//! and validated here.

use std::time::Duration;

use crate::types::{FirewallRef, MachineImage, NetworkRef, SubnetType};
use crate::value::{ConfigValue, RecordReader};
use crate::{Error, Result};

pub const SCALING_GROUP: &str = "scaling_group";
pub const SCALING_POLICY: &str = "scaling_policy";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetSelection {
    pub subnet_type: SubnetType,
}

/// Compute fleet definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalingGroupSpec {
    pub network: NetworkRef,
    pub instance_type: String,
    pub machine_image: MachineImage,
    pub associate_public_ip_address: bool,
    pub firewall: FirewallRef,
    pub subnets: SubnetSelection,
    pub min_capacity: u32,
    pub max_capacity: u32,
    pub desired_capacity: Option<u32>,
}

impl ScalingGroupSpec {
    pub fn to_config(&self) -> ConfigValue {
        let mut entries = vec![
            ("network", ConfigValue::from(self.network.clone())),
            ("instance_type", self.instance_type.as_str().into()),
            ("machine_image", self.machine_image.clone().into()),
            (
                "associate_public_ip_address",
                self.associate_public_ip_address.into(),
            ),
            ("firewall", self.firewall.clone().into()),
            (
                "subnets",
                ConfigValue::record([("subnet_type", self.subnets.subnet_type.as_str().into())]),
            ),
            ("min_capacity", self.min_capacity.into()),
            ("max_capacity", self.max_capacity.into()),
        ];
        if let Some(desired) = self.desired_capacity {
            entries.push(("desired_capacity", desired.into()));
        }
        ConfigValue::record(entries)
    }

    /// Decode and validate a merged record.
    pub fn from_config(value: ConfigValue) -> Result<Self> {
        let mut r = RecordReader::new(SCALING_GROUP, value)?;

        let network = r.network("network")?;
        let instance_type = r.string("instance_type")?;
        let machine_image = r.image("machine_image")?;
        let associate_public_ip_address = r.bool("associate_public_ip_address")?;
        let firewall = r.firewall("firewall")?;

        let mut subnets = r.record("subnets")?;
        let subnet_type = subnets.string("subnet_type")?.parse()?;
        subnets.finish()?;

        let min_capacity = r.u32("min_capacity")?;
        let max_capacity = r.u32("max_capacity")?;
        let desired_capacity = r.opt_u32("desired_capacity")?;
        r.finish()?;

        let spec = Self {
            network,
            instance_type,
            machine_image,
            associate_public_ip_address,
            firewall,
            subnets: SubnetSelection { subnet_type },
            min_capacity,
            max_capacity,
            desired_capacity,
        };
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<()> {
        let field = |name: &str| format!("{SCALING_GROUP}.{name}");

        if self.instance_type.is_empty()
            || !self
                .instance_type
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '.')
        {
            return Err(Error::validation(
                field("instance_type"),
                format!("`{}` is not an instance type", self.instance_type),
            ));
        }
        if self.max_capacity == 0 {
            return Err(Error::validation(
                field("max_capacity"),
                "must be at least 1",
            ));
        }
        if self.min_capacity > self.max_capacity {
            return Err(Error::validation(
                field("min_capacity"),
                format!(
                    "min_capacity {} exceeds max_capacity {}",
                    self.min_capacity, self.max_capacity
                ),
            ));
        }
        match self.desired_capacity {
            Some(desired) if !(self.min_capacity..=self.max_capacity).contains(&desired) => {
                Err(Error::validation(
                    field("desired_capacity"),
                    format!(
                        "desired_capacity {desired} is outside [{}, {}]",
                        self.min_capacity, self.max_capacity
                    ),
                ))
            }
            _ => Ok(()),
        }
    }
}

/// CPU target-tracking policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalingPolicySpec {
    pub target_utilization_percent: u32,
    pub cooldown: Duration,
    pub disable_scale_in: bool,
}

impl Default for ScalingPolicySpec {
    fn default() -> Self {
        Self {
            target_utilization_percent: 80,
            cooldown: Duration::from_secs(300),
            disable_scale_in: false,
        }
    }
}

impl ScalingPolicySpec {
    pub fn to_config(&self) -> ConfigValue {
        ConfigValue::record([
            (
                "target_utilization_percent",
                ConfigValue::from(self.target_utilization_percent),
            ),
            ("cooldown", self.cooldown.into()),
            ("disable_scale_in", self.disable_scale_in.into()),
        ])
    }

    pub fn from_config(value: ConfigValue) -> Result<Self> {
        let mut r = RecordReader::new(SCALING_POLICY, value)?;
        let spec = Self {
            target_utilization_percent: r.u32("target_utilization_percent")?,
            cooldown: r.duration("cooldown")?,
            disable_scale_in: r.bool("disable_scale_in")?,
        };
        r.finish()?;

        if !(1..=100).contains(&spec.target_utilization_percent) {
            return Err(Error::validation(
                format!("{SCALING_POLICY}.target_utilization_percent"),
                format!("{} is not a percentage in 1..=100", spec.target_utilization_percent),
            ));
        }
        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SubnetRef;

    fn group() -> ScalingGroupSpec {
        ScalingGroupSpec {
            network: NetworkRef {
                id: "vpc".into(),
                subnets: vec![SubnetRef {
                    id: "priv-a".into(),
                    subnet_type: SubnetType::Private,
                    availability_zone: "us-east-1a".into(),
                    route_table_id: None,
                }],
            },
            instance_type: "t2.micro".into(),
            machine_image: MachineImage::AmazonLinux,
            associate_public_ip_address: false,
            firewall: FirewallRef::new("sg"),
            subnets: SubnetSelection {
                subnet_type: SubnetType::Private,
            },
            min_capacity: 1,
            max_capacity: 3,
            desired_capacity: None,
        }
    }

    #[test]
    fn group_survives_config_round_trip() {
        let spec = group();
        assert_eq!(ScalingGroupSpec::from_config(spec.to_config()).unwrap(), spec);

        let mut with_desired = group();
        with_desired.desired_capacity = Some(2);
        assert_eq!(
            ScalingGroupSpec::from_config(with_desired.to_config()).unwrap(),
            with_desired
        );
    }

    #[test]
    fn capacity_bounds_are_validated() {
        let mut spec = group();
        spec.min_capacity = 4;
        assert!(spec.validate().is_err());

        let mut spec = group();
        spec.max_capacity = 0;
        spec.min_capacity = 0;
        assert!(spec.validate().is_err());

        let mut spec = group();
        spec.desired_capacity = Some(5);
        let err = spec.validate().unwrap_err();
        assert!(err.to_string().contains("scaling_group.desired_capacity"));
    }

    #[test]
    fn bad_instance_type_is_rejected() {
        let mut spec = group();
        spec.instance_type = "t2.micro; reboot".into();
        assert!(spec.validate().is_err());
    }

    #[test]
    fn unknown_subnet_type_is_rejected() {
        let mut config = group().to_config();
        if let ConfigValue::Record(entries) = &mut config {
            entries.insert(
                "subnets".into(),
                ConfigValue::record([("subnet_type", ConfigValue::from("dmz"))]),
            );
        }
        assert!(ScalingGroupSpec::from_config(config).is_err());
    }

    #[test]
    fn policy_defaults_and_bounds() {
        let spec = ScalingPolicySpec::default();
        assert_eq!(spec.target_utilization_percent, 80);
        assert_eq!(spec.cooldown, Duration::from_secs(300));
        assert_eq!(ScalingPolicySpec::from_config(spec.to_config()).unwrap(), spec);

        let over = ConfigValue::record([
            ("target_utilization_percent", ConfigValue::from(150u32)),
            ("cooldown", ConfigValue::from(60u32)),
            ("disable_scale_in", ConfigValue::from(false)),
        ]);
        assert!(ScalingPolicySpec::from_config(over).is_err());
    }
}
