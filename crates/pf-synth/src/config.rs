use std::env;
use std::fs;
use std::path::PathBuf;

use pf_core::ConfigValue;
use serde::Deserialize;

use crate::error::{Result, SynthError};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub stack_name: String,
    pub region: String,
    pub bucket_name: String,
    pub allowed_cidrs: Vec<String>,
    pub index_document: Option<String>,
    pub listener_port: u16,
    pub overrides_file: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Build the configuration from any variable source.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |name: &str| var(name).filter(|v| !v.trim().is_empty());

        let listener_port: u16 = match non_empty("PF_LISTENER_PORT") {
            Some(port) => port.trim().parse().map_err(|_| SynthError::InvalidEnv {
                name: "PF_LISTENER_PORT".into(),
                reason: format!("`{port}` is not a port number"),
            })?,
            None => 80,
        };

        Ok(Self {
            stack_name: non_empty("PF_STACK_NAME")
                .unwrap_or_else(|| "private-s3-static-website".into()),
            region: non_empty("PF_REGION").unwrap_or_else(|| "us-east-1".into()),
            bucket_name: non_empty("PF_BUCKET_NAME")
                .ok_or_else(|| SynthError::MissingEnv("PF_BUCKET_NAME".into()))?,
            allowed_cidrs: non_empty("PF_ALLOWED_CIDRS")
                .map(|list| {
                    list.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            index_document: non_empty("PF_INDEX_DOCUMENT"),
            listener_port,
            overrides_file: non_empty("PF_OVERRIDES_FILE").map(PathBuf::from),
            output: non_empty("PF_OUTPUT").map(PathBuf::from),
        })
    }

    pub fn overrides(&self) -> Result<Overrides> {
        match &self.overrides_file {
            Some(path) => {
                let text = fs::read_to_string(path)?;
                Overrides::parse(&path.display().to_string(), &text)
            }
            None => Ok(Overrides::default()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct OverridesFile {
    #[serde(default)]
    scaling_group: Option<serde_json::Value>,
    #[serde(default)]
    scaling_policy: Option<serde_json::Value>,
}

/// Caller overrides for the fleet, as plain configuration records.
#[derive(Debug, Clone, PartialEq)]
pub struct Overrides {
    pub scaling_group: ConfigValue,
    pub scaling_policy: ConfigValue,
}

impl Default for Overrides {
    fn default() -> Self {
        Self {
            scaling_group: ConfigValue::empty(),
            scaling_policy: ConfigValue::empty(),
        }
    }
}

impl Overrides {
    /// Parse an overrides document; `origin` names it in errors.
    pub fn parse(origin: &str, text: &str) -> Result<Self> {
        let file: OverridesFile =
            serde_json::from_str(text).map_err(|source| SynthError::Overrides {
                path: origin.to_string(),
                source,
            })?;

        let convert = |value: Option<serde_json::Value>| match value {
            Some(v) => ConfigValue::from_json(v),
            None => Ok(ConfigValue::empty()),
        };

        Ok(Self {
            scaling_group: convert(file.scaling_group)?,
            scaling_policy: convert(file.scaling_policy)?,
        })
    }
}
