//! Access point records: remote dependencies whose address comes from the registry.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A resolved (or still unresolved) remote dependency.
///
/// This is the shape handed out by the access point table. It is always a
/// copy; mutating it does not touch the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessPoint {
    pub id: String,
    pub title: String,
    pub consul_service_name: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Always `http` or `https`
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_interval_if_success_millis: Option<u64>,
    /// Fields the table does not interpret (`user`, `pass`, ...)
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl AccessPoint {
    /// `protocol://host:port` once both host and port are known.
    pub fn url(&self) -> Option<String> {
        match (&self.host, self.port) {
            (Some(host), Some(port)) => Some(format!("{}://{}:{}", self.protocol, host, port)),
            _ => None,
        }
    }
}

/// Input used to declare or patch an access point.
///
/// Every field is optional: an absent field leaves the stored value alone.
/// `host: Some(None)` and `port: Some(Value::Null)` explicitly clear the value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessPointData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consul_service_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub host: Option<Option<String>>,
    /// Raw port, number or numeric string
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub port: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_interval_if_success_millis: Option<u64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Keeps `null` distinguishable from a missing key.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl AccessPointData {
    pub fn new(consul_service_name: impl Into<String>) -> Self {
        Self { consul_service_name: Some(consul_service_name.into()), ..Self::default() }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(Some(host.into()));
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(Value::from(port));
        self
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// A patch that only moves the endpoint.
    pub fn endpoint(host: Option<String>, port: Option<u16>) -> Self {
        Self {
            host: Some(host),
            port: Some(port.map_or(Value::Null, Value::from)),
            ..Self::default()
        }
    }
}

/// One changed field: `(field, old, new)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub old: Value,
    pub new: Value,
}

impl FieldChange {
    pub fn new(field: impl Into<String>, old: Value, new: Value) -> Self {
        Self { field: field.into(), old, new }
    }
}

/// Coerces a number or numeric string to a port; anything else (and 0) is `None`.
pub fn normalize_port(raw: &Value) -> Option<u16> {
    let n = match raw {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }?;
    u16::try_from(n).ok().filter(|p| *p != 0)
}

/// Lower-cases `http`/`https`; everything else becomes `http`.
pub fn normalize_protocol(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        Some(p) if p.eq_ignore_ascii_case("https") => "https".to_string(),
        _ => "http".to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_port() {
        assert_eq!(normalize_port(&json!(9000)), Some(9000));
        assert_eq!(normalize_port(&json!(" 9100 ")), Some(9100));
        assert_eq!(normalize_port(&json!(9100.0)), Some(9100));
        assert_eq!(normalize_port(&json!("abc")), None);
        assert_eq!(normalize_port(&json!(0)), None);
        assert_eq!(normalize_port(&json!(70000)), None);
        assert_eq!(normalize_port(&Value::Null), None);
    }

    #[test]
    fn test_normalize_protocol() {
        assert_eq!(normalize_protocol(Some("HTTPS")), "https");
        assert_eq!(normalize_protocol(Some("http")), "http");
        assert_eq!(normalize_protocol(Some("grpc")), "http");
        assert_eq!(normalize_protocol(None), "http");
    }

    #[test]
    fn test_data_null_vs_missing() {
        let data: AccessPointData = serde_json::from_str(
            r#"{"consulServiceName": "svc", "host": null, "user": "admin"}"#,
        )
        .unwrap();
        assert_eq!(data.host, Some(None));
        assert_eq!(data.port, None);
        assert_eq!(data.extra.get("user"), Some(&json!("admin")));

        let data: AccessPointData = serde_json::from_str(r#"{"port": null}"#).unwrap();
        assert_eq!(data.port, Some(Value::Null));
        assert!(data.consul_service_name.is_none());
    }

    #[test]
    fn test_url() {
        let point = AccessPoint {
            id: "a".into(),
            title: "a".into(),
            consul_service_name: "svc".into(),
            host: Some("h".into()),
            port: Some(443),
            protocol: "https".into(),
            update_interval_if_success_millis: None,
            extra: BTreeMap::new(),
        };
        assert_eq!(point.url().as_deref(), Some("https://h:443"));
    }
}
