//! First difference between the desired descriptor and the live record.

use consul_sync_types::{RegisterDescriptor, ServiceInfo};
use std::collections::BTreeMap;
use std::fmt;

/// One mismatching field. `field` is `id`, `name`, `port`, `address` or `meta.<key>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDiff {
    pub field: String,
    pub desired: String,
    pub current: String,
}

impl ConfigDiff {
    fn new(field: impl Into<String>, desired: impl ToString, current: impl ToString) -> Self {
        Self { field: field.into(), desired: desired.to_string(), current: current.to_string() }
    }
}

impl fmt::Display for ConfigDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "New: config.{}={} / Current: config.{}={}",
            self.field, self.desired, self.field, self.current
        )
    }
}

/// Returns the first mismatch, checking id, name, port, address and then
/// metadata (descriptor keys first, then keys only the registry has).
///
/// A missing record differs on `id`.
pub fn service_config_diff(
    descriptor: &RegisterDescriptor,
    info: Option<&ServiceInfo>,
) -> Option<ConfigDiff> {
    let Some(info) = info else {
        return Some(ConfigDiff::new("id", &descriptor.id, ""));
    };

    if descriptor.id != info.id {
        return Some(ConfigDiff::new("id", &descriptor.id, &info.id));
    }
    if descriptor.name != info.service {
        return Some(ConfigDiff::new("name", &descriptor.name, &info.service));
    }
    if descriptor.port != info.port {
        return Some(ConfigDiff::new("port", descriptor.port, info.port));
    }
    if descriptor.address != info.address {
        return Some(ConfigDiff::new("address", &descriptor.address, &info.address));
    }

    let empty = BTreeMap::new();
    let live = info.meta.as_ref().unwrap_or(&empty);
    let keys = descriptor.meta.keys().chain(live.keys().filter(|k| !descriptor.meta.contains_key(*k)));
    for key in keys {
        let desired = descriptor.meta.get(key);
        let current = live.get(key);
        if desired != current {
            return Some(ConfigDiff::new(
                format!("meta.{}", key),
                desired.map_or("", String::as_str),
                current.map_or("", String::as_str),
            ));
        }
    }
    None
}
