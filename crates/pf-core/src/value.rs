//! Configuration values that the merge engine operates on.
//!
//! A [`ConfigValue`] is either plain data (scalars, lists, records) or an
//! opaque [`Handle`] to a live resource. Typed specs convert to and from
//! records; [`RecordReader`] does the decoding and reports the dotted key
//! path of anything malformed.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::types::{FirewallRef, MachineImage, NetworkRef};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Str(String),
    Duration(Duration),
}

/// Reference to a live resource. Replaced wholesale during a merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handle {
    Network(NetworkRef),
    Firewall(FirewallRef),
    Image(MachineImage),
}

impl Handle {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Network(_) => "network handle",
            Self::Firewall(_) => "firewall handle",
            Self::Image(_) => "machine image handle",
        }
    }
}

/// Merge classification of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    PlainRecord,
    OpaqueHandle,
    Scalar,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
    Scalar(Scalar),
    Record(BTreeMap<String, ConfigValue>),
    /// Lists are atomic: an override list replaces the default list.
    List(Vec<ConfigValue>),
    Handle(Handle),
}

impl ConfigValue {
    /// An empty record, the "no overrides" value.
    pub fn empty() -> Self {
        Self::Record(BTreeMap::new())
    }

    pub fn record<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, ConfigValue)>,
        K: Into<String>,
    {
        Self::Record(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Record(_) => ValueKind::PlainRecord,
            Self::Handle(_) => ValueKind::OpaqueHandle,
            Self::Scalar(_) | Self::List(_) => ValueKind::Scalar,
        }
    }

    /// Short human description used in error messages.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Scalar(Scalar::Bool(_)) => "a boolean",
            Self::Scalar(Scalar::Int(_)) => "an integer",
            Self::Scalar(Scalar::Str(_)) => "a string",
            Self::Scalar(Scalar::Duration(_)) => "a duration",
            Self::Record(_) => "a record",
            Self::List(_) => "a list",
            Self::Handle(h) => h.kind_name(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        match self {
            Self::Record(entries) => entries.get(key),
            _ => None,
        }
    }

    /// Build plain data from a JSON document.
    ///
    /// `null` and non-integral numbers have no configuration meaning and are
    /// rejected.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        from_json_at("", value)
    }
}

fn from_json_at(path: &str, value: serde_json::Value) -> Result<ConfigValue> {
    use serde_json::Value;

    match value {
        Value::Null => Err(Error::validation(path, "null is not a configuration value")),
        Value::Bool(b) => Ok(b.into()),
        Value::Number(n) => n
            .as_i64()
            .map(ConfigValue::from)
            .ok_or_else(|| Error::validation(path, format!("{n} is not an integer"))),
        Value::String(s) => Ok(s.into()),
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| from_json_at(&format!("{path}[{i}]"), item))
            .collect::<Result<Vec<_>>>()
            .map(ConfigValue::List),
        Value::Object(map) => {
            let mut entries = BTreeMap::new();
            for (k, v) in map {
                let child = join_path(path, &k);
                entries.insert(k, from_json_at(&child, v)?);
            }
            Ok(ConfigValue::Record(entries))
        }
    }
}

pub(crate) fn join_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

impl From<bool> for ConfigValue {
    fn from(v: bool) -> Self {
        Self::Scalar(Scalar::Bool(v))
    }
}

impl From<i64> for ConfigValue {
    fn from(v: i64) -> Self {
        Self::Scalar(Scalar::Int(v))
    }
}

impl From<u32> for ConfigValue {
    fn from(v: u32) -> Self {
        Self::Scalar(Scalar::Int(i64::from(v)))
    }
}

impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self {
        Self::Scalar(Scalar::Str(v.to_string()))
    }
}

impl From<String> for ConfigValue {
    fn from(v: String) -> Self {
        Self::Scalar(Scalar::Str(v))
    }
}

impl From<Duration> for ConfigValue {
    fn from(v: Duration) -> Self {
        Self::Scalar(Scalar::Duration(v))
    }
}

impl From<Handle> for ConfigValue {
    fn from(v: Handle) -> Self {
        Self::Handle(v)
    }
}

impl From<NetworkRef> for ConfigValue {
    fn from(v: NetworkRef) -> Self {
        Self::Handle(Handle::Network(v))
    }
}

impl From<FirewallRef> for ConfigValue {
    fn from(v: FirewallRef) -> Self {
        Self::Handle(Handle::Firewall(v))
    }
}

impl From<MachineImage> for ConfigValue {
    fn from(v: MachineImage) -> Self {
        Self::Handle(Handle::Image(v))
    }
}

// ── Decoding ────────────────────────────────────────────────────────

/// Consumes a record key by key and decodes typed fields.
///
/// Every key must be taken before [`RecordReader::finish`]; leftovers are
/// reported as unknown keys.
pub struct RecordReader {
    path: String,
    entries: BTreeMap<String, ConfigValue>,
}

impl RecordReader {
    pub fn new(path: &str, value: ConfigValue) -> Result<Self> {
        match value {
            ConfigValue::Record(entries) => Ok(Self {
                path: path.to_string(),
                entries,
            }),
            other => Err(Error::validation(
                path,
                format!("expected a record, found {}", other.describe()),
            )),
        }
    }

    fn key_path(&self, key: &str) -> String {
        join_path(&self.path, key)
    }

    fn require(&mut self, key: &str) -> Result<ConfigValue> {
        self.entries
            .remove(key)
            .ok_or_else(|| Error::validation(self.key_path(key), "missing required key"))
    }

    fn mismatch(&self, key: &str, expected: &str, found: &ConfigValue) -> Error {
        Error::validation(
            self.key_path(key),
            format!("expected {expected}, found {}", found.describe()),
        )
    }

    pub fn bool(&mut self, key: &str) -> Result<bool> {
        match self.require(key)? {
            ConfigValue::Scalar(Scalar::Bool(b)) => Ok(b),
            other => Err(self.mismatch(key, "a boolean", &other)),
        }
    }

    pub fn u32(&mut self, key: &str) -> Result<u32> {
        let value = self.require(key)?;
        self.to_u32(key, value)
    }

    pub fn opt_u32(&mut self, key: &str) -> Result<Option<u32>> {
        match self.entries.remove(key) {
            Some(value) => self.to_u32(key, value).map(Some),
            None => Ok(None),
        }
    }

    fn to_u32(&self, key: &str, value: ConfigValue) -> Result<u32> {
        match value {
            ConfigValue::Scalar(Scalar::Int(n)) => u32::try_from(n).map_err(|_| {
                Error::validation(self.key_path(key), format!("{n} is out of range"))
            }),
            other => Err(self.mismatch(key, "an integer", &other)),
        }
    }

    pub fn string(&mut self, key: &str) -> Result<String> {
        match self.require(key)? {
            ConfigValue::Scalar(Scalar::Str(s)) => Ok(s),
            other => Err(self.mismatch(key, "a string", &other)),
        }
    }

    /// Accepts a duration, integer seconds, or `"<n>s"` / `"<n>m"`.
    pub fn duration(&mut self, key: &str) -> Result<Duration> {
        match self.require(key)? {
            ConfigValue::Scalar(Scalar::Duration(d)) => Ok(d),
            ConfigValue::Scalar(Scalar::Int(n)) => u64::try_from(n)
                .map(Duration::from_secs)
                .map_err(|_| Error::validation(self.key_path(key), "negative duration")),
            ConfigValue::Scalar(Scalar::Str(s)) => parse_duration(&s)
                .ok_or_else(|| {
                    Error::validation(self.key_path(key), format!("invalid duration `{s}`"))
                }),
            other => Err(self.mismatch(key, "a duration", &other)),
        }
    }

    pub fn network(&mut self, key: &str) -> Result<NetworkRef> {
        match self.require(key)? {
            ConfigValue::Handle(Handle::Network(n)) => Ok(n),
            other => Err(self.mismatch(key, "a network handle", &other)),
        }
    }

    pub fn firewall(&mut self, key: &str) -> Result<FirewallRef> {
        match self.require(key)? {
            ConfigValue::Handle(Handle::Firewall(f)) => Ok(f),
            other => Err(self.mismatch(key, "a firewall handle", &other)),
        }
    }

    /// Accepts an image handle, or a string naming a fixed image id.
    pub fn image(&mut self, key: &str) -> Result<MachineImage> {
        match self.require(key)? {
            ConfigValue::Handle(Handle::Image(i)) => Ok(i),
            ConfigValue::Scalar(Scalar::Str(id)) => {
                if id.is_empty() || id.contains(char::is_whitespace) {
                    return Err(Error::validation(
                        self.key_path(key),
                        format!("invalid image id `{id}`"),
                    ));
                }
                Ok(MachineImage::Ami(id))
            }
            other => Err(self.mismatch(key, "a machine image", &other)),
        }
    }

    pub fn record(&mut self, key: &str) -> Result<RecordReader> {
        let value = self.require(key)?;
        RecordReader::new(&self.key_path(key), value)
    }

    /// Fails if any key was not consumed.
    pub fn finish(self) -> Result<()> {
        match self.entries.keys().next() {
            Some(unknown) => Err(Error::validation(
                join_path(&self.path, unknown),
                "unknown key",
            )),
            None => Ok(()),
        }
    }
}

/// Parse `"30s"`, `"5m"` or bare seconds.
fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let (digits, scale) = if let Some(secs) = s.strip_suffix('s') {
        (secs, 1)
    } else if let Some(mins) = s.strip_suffix('m') {
        (mins, 60)
    } else {
        (s, 1)
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    digits
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(scale))
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classification() {
        assert_eq!(ConfigValue::empty().kind(), ValueKind::PlainRecord);
        assert_eq!(ConfigValue::from(3u32).kind(), ValueKind::Scalar);
        assert_eq!(ConfigValue::List(vec![]).kind(), ValueKind::Scalar);
        assert_eq!(
            ConfigValue::from(FirewallRef::new("sg")).kind(),
            ValueKind::OpaqueHandle
        );
    }

    #[test]
    fn from_json_maps_shapes() {
        let value = ConfigValue::from_json(json!({
            "max_capacity": 4,
            "subnets": {"subnet_type": "isolated"},
            "tags": ["a", "b"],
            "associate_public_ip_address": true,
        }))
        .unwrap();

        assert_eq!(value.get("max_capacity"), Some(&ConfigValue::from(4u32)));
        assert_eq!(
            value.get("subnets").and_then(|s| s.get("subnet_type")),
            Some(&ConfigValue::from("isolated"))
        );
        assert_eq!(value.get("tags").map(ConfigValue::kind), Some(ValueKind::Scalar));
    }

    #[test]
    fn from_json_rejects_null_and_fractions() {
        let err = ConfigValue::from_json(json!({"a": {"b": null}})).unwrap_err();
        assert!(err.to_string().contains("a.b"), "{err}");

        assert!(ConfigValue::from_json(json!({"cooldown": 1.5})).is_err());
    }

    #[test]
    fn reader_decodes_and_flags_unknown_keys() {
        let value = ConfigValue::record([
            ("min_capacity", ConfigValue::from(1u32)),
            ("cooldown", ConfigValue::from("5m")),
            ("typo", ConfigValue::from(true)),
        ]);
        let mut reader = RecordReader::new("group", value).unwrap();

        assert_eq!(reader.u32("min_capacity").unwrap(), 1);
        assert_eq!(reader.duration("cooldown").unwrap(), Duration::from_secs(300));
        assert_eq!(reader.opt_u32("desired_capacity").unwrap(), None);

        let err = reader.finish().unwrap_err();
        assert_eq!(err.to_string(), "invalid configuration at `group.typo`: unknown key");
    }

    #[test]
    fn reader_reports_type_mismatch_with_path() {
        let value = ConfigValue::record([("max_capacity", ConfigValue::from("four"))]);
        let mut reader = RecordReader::new("scaling_group", value).unwrap();

        let err = reader.u32("max_capacity").unwrap_err();
        assert!(err.to_string().contains("scaling_group.max_capacity"));
        assert!(err.to_string().contains("expected an integer, found a string"));
    }

    #[test]
    fn reader_rejects_negative_and_missing() {
        let value = ConfigValue::record([("min_capacity", ConfigValue::from(-1i64))]);
        let mut reader = RecordReader::new("", value).unwrap();
        assert!(reader.u32("min_capacity").is_err());
        assert!(reader.bool("associate_public_ip_address").is_err());
    }

    #[test]
    fn image_accepts_handle_or_id_string() {
        let value = ConfigValue::record([
            ("from_file", ConfigValue::from("ami-0abcdef1234567890")),
            ("handle", ConfigValue::from(MachineImage::AmazonLinux)),
            ("blank", ConfigValue::from("")),
            ("number", ConfigValue::from(7u32)),
        ]);
        let mut reader = RecordReader::new("group", value).unwrap();

        assert_eq!(
            reader.image("from_file").unwrap(),
            MachineImage::Ami("ami-0abcdef1234567890".into())
        );
        assert_eq!(reader.image("handle").unwrap(), MachineImage::AmazonLinux);

        let err = reader.image("blank").unwrap_err();
        assert!(err.to_string().contains("group.blank"), "{err}");
        let err = reader.image("number").unwrap_err();
        assert!(err.to_string().contains("expected a machine image, found"), "{err}");
    }

    #[test]
    fn duration_strings() {
        assert_eq!(parse_duration("100s"), Some(Duration::from_secs(100)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("42"), Some(Duration::from_secs(42)));
        assert_eq!(parse_duration("s"), None);
        assert_eq!(parse_duration("-5s"), None);
        assert_eq!(parse_duration("1h"), None);
    }
}
