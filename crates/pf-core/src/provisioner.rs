use crate::Result;
use crate::allowlist::FirewallRuleSet;
use crate::bootstrap::BootstrapScript;
use crate::spec::{ScalingGroupSpec, ScalingPolicySpec};
use crate::types::{
    FirewallRef, ListenerRef, ListenerSpec, LoadBalancerRef, NetworkRef, ScalingGroupRef,
};

/// Backend that realizes the fleet's resources.
///
/// Each call gets a construct path (`["s3-proxy-farm", "autoscaling-group"]`)
/// that names the resource within the deployment. Implementations report
/// structural failures as [`crate::Error::Provisioning`]; the compositor
/// passes them through untouched.
pub trait Provisioner {
    /// Create a firewall in `network` carrying `rules`, including the
    /// trailing deny-all.
    fn create_firewall(
        &mut self,
        path: &[&str],
        network: &NetworkRef,
        rules: &FirewallRuleSet,
    ) -> Result<FirewallRef>;

    /// Create the scaling group with `user_data` run once by every instance.
    fn create_scaling_group(
        &mut self,
        path: &[&str],
        spec: &ScalingGroupSpec,
        user_data: &BootstrapScript,
    ) -> Result<ScalingGroupRef>;

    fn attach_scaling_policy(
        &mut self,
        path: &[&str],
        group: &ScalingGroupRef,
        policy: &ScalingPolicySpec,
    ) -> Result<()>;

    fn create_listener(
        &mut self,
        path: &[&str],
        load_balancer: &LoadBalancerRef,
        listener: &ListenerSpec,
    ) -> Result<ListenerRef>;

    /// Route `listener` traffic to `group` instances on `port`.
    fn register_targets(
        &mut self,
        path: &[&str],
        listener: &ListenerRef,
        group: &ScalingGroupRef,
        port: u16,
    ) -> Result<()>;
}
