//! Named table of access points with change tracking.

use consul_sync_types::{
    normalize_port, normalize_protocol, AccessPoint, AccessPointData, FieldChange, ServiceInfo,
};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const PREFIX: &str = "ACCESS-POINT:";

/// Default freshness window after a successful poll.
pub const UPDATE_INTERVAL_IF_SUCCESS: Duration = Duration::from_secs(120);

/// Keys owned by [`AccessPoint`] itself; never stored as extra fields.
const RESERVED_FIELDS: [&str; 8] = [
    "id",
    "title",
    "consulServiceName",
    "host",
    "port",
    "protocol",
    "updateIntervalIfSuccessMillis",
    "lastSuccessUpdate",
];

fn is_reserved(field: &str) -> bool {
    RESERVED_FIELDS.contains(&field)
}

/// Turns a discovered service record into a patch for one access point.
pub type PropsExtractor = Arc<dyn Fn(&AccessPoint, &ServiceInfo) -> AccessPointData + Send + Sync>;

/// Host from the service address; port from `Meta.port`, else the current port.
pub fn default_extractor(point: &AccessPoint, service: &ServiceInfo) -> AccessPointData {
    let port = service
        .meta_value("port")
        .and_then(|p| normalize_port(&Value::from(p)))
        .or(point.port);
    AccessPointData::endpoint(Some(service.address.clone()), port)
}

/// Result of [`AccessPoints::set`].
#[derive(Debug, Clone, PartialEq)]
pub struct AccessPointUpdate {
    pub point: AccessPoint,
    /// Fields whose normalized value changed; empty when nothing did
    pub changes: Vec<FieldChange>,
}

struct Entry {
    point: AccessPoint,
    last_success_update: Option<Instant>,
    extractor: Option<PropsExtractor>,
}

impl Entry {
    fn is_stale(&self, now: Instant) -> bool {
        let window = self
            .point
            .update_interval_if_success_millis
            .map_or(UPDATE_INTERVAL_IF_SUCCESS, Duration::from_millis);
        self.last_success_update.map_or(true, |at| now.saturating_duration_since(at) >= window)
    }
}

/// The access point table.
///
/// Readers always get copies; entries change only through [`AccessPoints::set`].
/// Entries are never removed.
#[derive(Default)]
pub struct AccessPoints {
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl AccessPoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the table from the `accessPoints` config section.
    pub fn from_config(seed: &BTreeMap<String, Option<AccessPointData>>) -> Self {
        let table = Self::new();
        for (key, data) in seed {
            table.add(key, data.as_ref());
        }
        table
    }

    /// Declares (or redeclares) an access point.
    ///
    /// `None` data is ignored silently; data without `consulServiceName` is
    /// rejected with an error log.
    pub fn add(&self, key: &str, data: Option<&AccessPointData>) -> Option<AccessPoint> {
        let data = data?;
        let Some(consul_service_name) =
            data.consul_service_name.as_deref().filter(|n| !n.is_empty())
        else {
            tracing::error!(
                "\"{}\" access point not added because it lacks \"consulServiceName\" property",
                key
            );
            return None;
        };

        let point = AccessPoint {
            id: key.to_string(),
            title: data.title.clone().filter(|t| !t.is_empty()).unwrap_or_else(|| key.to_string()),
            consul_service_name: consul_service_name.to_string(),
            host: data.host.clone().flatten(),
            port: data.port.as_ref().and_then(normalize_port),
            protocol: normalize_protocol(data.protocol.as_deref()),
            update_interval_if_success_millis: data.update_interval_if_success_millis,
            extra: data
                .extra
                .iter()
                .filter(|(field, _)| !is_reserved(field))
                .map(|(field, value)| (field.clone(), value.clone()))
                .collect(),
        };

        let mut entries = self.entries.write();
        let extractor = entries.get(key).and_then(|e| e.extractor.clone());
        entries.insert(
            key.to_string(),
            Entry { point: point.clone(), last_success_update: None, extractor },
        );
        Some(point)
    }

    /// Merges the present fields of `patch` into the entry.
    ///
    /// Unknown keys are added instead (with an empty change list).
    pub fn set(&self, key: &str, patch: Option<&AccessPointData>) -> Option<AccessPointUpdate> {
        let patch = patch?;
        let mut entries = self.entries.write();
        if !entries.contains_key(key) {
            drop(entries);
            return self
                .add(key, Some(patch))
                .map(|point| AccessPointUpdate { point, changes: Vec::new() });
        }
        let entry = entries.get_mut(key)?;

        let point = &mut entry.point;
        let mut changes = Vec::new();

        if let Some(name) = &patch.consul_service_name {
            track(&mut changes, "consulServiceName", &mut point.consul_service_name, name.clone());
        }
        if let Some(title) = &patch.title {
            track(&mut changes, "title", &mut point.title, title.clone());
        }
        if let Some(host) = &patch.host {
            track(&mut changes, "host", &mut point.host, host.clone());
        }
        if let Some(raw) = &patch.port {
            track(&mut changes, "port", &mut point.port, normalize_port(raw));
        }
        if let Some(protocol) = &patch.protocol {
            track(&mut changes, "protocol", &mut point.protocol, normalize_protocol(Some(protocol)));
        }
        if let Some(millis) = patch.update_interval_if_success_millis {
            track(
                &mut changes,
                "updateIntervalIfSuccessMillis",
                &mut point.update_interval_if_success_millis,
                Some(millis),
            );
        }
        for (field, value) in patch.extra.iter().filter(|(field, _)| !is_reserved(field)) {
            let old = point.extra.get(field).cloned().unwrap_or(Value::Null);
            if &old != value {
                changes.push(FieldChange::new(field.clone(), old, value.clone()));
            }
            point.extra.insert(field.clone(), value.clone());
        }

        if !changes.is_empty() {
            let render = |pick: fn(&FieldChange) -> &Value| {
                changes
                    .iter()
                    .map(|c| format!("{}: {}", c.field, display(pick(c))))
                    .collect::<Vec<_>>()
                    .join("; ")
            };
            tracing::info!(
                "{} Change AP for {} to {}  from  {}",
                PREFIX,
                point.consul_service_name,
                render(|c| &c.new),
                render(|c| &c.old)
            );
        }

        Some(AccessPointUpdate { point: point.clone(), changes })
    }

    /// Copy of one entry.
    pub fn get(&self, key: &str) -> Option<AccessPoint> {
        self.entries.read().get(key).map(|e| e.point.clone())
    }

    /// Copies of all entries, keyed by id.
    pub fn all(&self) -> BTreeMap<String, AccessPoint> {
        self.entries.read().iter().map(|(k, e)| (k.clone(), e.point.clone())).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Replaces the extractor of one entry. Returns `false` for unknown keys.
    pub fn set_extractor(&self, key: &str, extractor: PropsExtractor) -> bool {
        match self.entries.write().get_mut(key) {
            Some(entry) => {
                entry.extractor = Some(extractor);
                true
            },
            None => false,
        }
    }

    pub(crate) fn extractor(&self, key: &str) -> Option<PropsExtractor> {
        self.entries.read().get(key).and_then(|e| e.extractor.clone())
    }

    /// `(key, consulServiceName)` of every entry due for polling.
    pub(crate) fn stale(&self, now: Instant) -> Vec<(String, String)> {
        self.entries
            .read()
            .iter()
            .filter(|(_, e)| e.is_stale(now))
            .map(|(k, e)| (k.clone(), e.point.consul_service_name.clone()))
            .collect()
    }

    pub(crate) fn mark_success(&self, key: &str, at: Instant) {
        if let Some(entry) = self.entries.write().get_mut(key) {
            entry.last_success_update = Some(at);
        }
    }

    /// Forgets the last success so the next cycle polls again.
    pub(crate) fn mark_failure(&self, key: &str) {
        if let Some(entry) = self.entries.write().get_mut(key) {
            entry.last_success_update = None;
        }
    }

    pub fn last_success_update(&self, key: &str) -> Option<Instant> {
        self.entries.read().get(key).and_then(|e| e.last_success_update)
    }
}

/// Assigns `new` and records a change when it differs from the current value.
fn track<T>(changes: &mut Vec<FieldChange>, field: &str, slot: &mut T, new: T)
where
    T: PartialEq + serde::Serialize,
{
    if *slot != new {
        changes.push(FieldChange::new(field, to_json(slot), to_json(&new)));
        *slot = new;
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
