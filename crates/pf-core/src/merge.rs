//! Deep merge of a default configuration with a caller override.
//!
//! Only pairs of plain records are merged key by key. Everything else is
//! atomic: the override wins if present, the default is kept otherwise. A
//! handle meeting a record on the same key is a kind conflict and fails.

use tracing::debug;

use crate::value::{ConfigValue, ValueKind, join_path};
use crate::{Error, Result};

/// Merge `over` on top of `default`, returning a new value.
///
/// Neither input is modified.
pub fn merge(default: &ConfigValue, over: &ConfigValue) -> Result<ConfigValue> {
    merge_at("", default, over)
}

fn merge_at(path: &str, default: &ConfigValue, over: &ConfigValue) -> Result<ConfigValue> {
    match (default, over) {
        (ConfigValue::Record(base), ConfigValue::Record(layer)) => {
            let mut merged = base.clone();
            for (key, value) in layer {
                let child = join_path(path, key);
                let resolved = match base.get(key) {
                    Some(existing) => merge_at(&child, existing, value)?,
                    None => value.clone(),
                };
                merged.insert(key.clone(), resolved);
            }
            Ok(ConfigValue::Record(merged))
        }
        _ if is_kind_conflict(default.kind(), over.kind()) => {
            debug!(path, "merge kind conflict");
            Err(Error::KindConflict {
                path: path.to_string(),
                expected: default.describe(),
                found: over.describe(),
            })
        }
        _ => Ok(over.clone()),
    }
}

fn is_kind_conflict(default: ValueKind, over: ValueKind) -> bool {
    matches!(
        (default, over),
        (ValueKind::PlainRecord, ValueKind::OpaqueHandle)
            | (ValueKind::OpaqueHandle, ValueKind::PlainRecord)
    )
}
