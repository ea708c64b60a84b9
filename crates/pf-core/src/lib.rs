//! Proxy farm compositor.
//!
//! Builds a small, self-scaling fleet of nginx reverse-proxy hosts that front
//! a privately hosted static-website bucket, and exposes it behind a load
//! balancer listener. Everything here runs once, at provisioning time, and
//! emits a resource graph through a [`Provisioner`].
//!
//! # Components
//!
//! - **`merge`**: deep merge of defaults and caller overrides over
//!   [`ConfigValue`] trees; plain records merge key by key, handles never do
//! - **`allowlist`**: CIDR allow-list to firewall rules, with a mandatory
//!   trailing deny-all
//! - **`bootstrap`**: launch-time shell script that installs and configures
//!   the proxy
//! - **`fleet`**: the compositor and the load balancer exposure
//! - **`template`**: a [`Provisioner`] that records everything into a
//!   `cfn_template::Template`

pub mod allowlist;
pub mod bootstrap;
pub mod fleet;
pub mod merge;
pub mod provisioner;
pub mod spec;
pub mod template;
pub mod types;
pub mod value;

pub use allowlist::{AllowListRule, Cidr, FirewallEntry, FirewallRuleSet, derive_rules};
pub use bootstrap::{BackendUrl, BootstrapParams, BootstrapScript, IndexDocument, render};
pub use fleet::{FleetConfig, FleetHandle, PROXY_PORT, compose};
pub use merge::merge;
pub use provisioner::Provisioner;
pub use spec::{ScalingGroupSpec, ScalingPolicySpec, SubnetSelection};
pub use template::TemplateProvisioner;
pub use types::*;
pub use value::{ConfigValue, Handle, RecordReader, Scalar, ValueKind};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid configuration at `{path}`: {reason}")]
    Validation { path: String, reason: String },

    #[error("override at `{path}` is {found} but the default is {expected}")]
    KindConflict {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("invalid CIDR range `{range}`: {reason}")]
    InvalidCidr { range: String, reason: String },

    #[error("invalid backend url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid index document `{name}`: {reason}")]
    InvalidIndexDocument { name: String, reason: String },

    #[error("bootstrap script template is malformed: {0}")]
    ScriptTemplate(#[from] handlebars::TemplateError),

    #[error("bootstrap script rendering failed: {0}")]
    Script(#[from] handlebars::RenderError),

    #[error("provisioning failed: {0}")]
    Provisioning(String),

    #[error("template error: {0}")]
    Template(#[from] cfn_template::Error),
}

impl Error {
    pub(crate) fn validation(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
