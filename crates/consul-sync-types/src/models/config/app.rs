//! Top-level configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

use super::consul::{ConsulSection, WebServerConfig};
use crate::models::access_point::AccessPointData;

/// Everything the core needs, already parsed.
///
/// Environment-dependent values (`production`, `hostHostname`, ...) are plain
/// fields here; reading them from the process environment is the caller's job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ConsulSyncConfig {
    #[validate(nested)]
    pub consul: ConsulSection,
    #[serde(default)]
    pub web_server: WebServerConfig,
    /// Access point seed; `null` entries are ignored
    #[serde(default)]
    pub access_points: BTreeMap<String, Option<AccessPointData>>,
    /// Project code inserted into the service id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Selects `prd`/`r` instead of `dev`/`e` in the service id
    #[serde(default)]
    pub production: bool,
    /// Use this service id verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id_override: Option<String>,
    /// Register with `force` on every cyclic tick, ignoring health-check skips
    #[serde(default)]
    pub force_every_register_attempt: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_points_update_interval_millis: Option<u64>,
    /// Host of the registry UI, used for log links
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consul_ui_host: Option<String>,
    /// Hostname of the container host, fallback for the agent host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_hostname: Option<String>,
    /// Service socket lookups return the caller's defaults without asking the registry
    #[serde(default)]
    pub use_default_service_socket: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::config::PortValue;

    const SAMPLE: &str = r#"{
        "consul": {
            "agent": {
                "reg": {"host": "consul.local", "port": "8500", "token": "secret"},
                "dev": {"dc": "dc-dev", "host": "consul-dev.local"},
                "prd": {"dc": "dc-prd", "secure": "yes", "port": 443}
            },
            "service": {
                "name": "api", "instance": "01", "version": "1.2.3",
                "description": "API", "tags": "x;y", "meta": {"TEAM": "core"}
            },
            "check": {"interval": "15s"}
        },
        "webServer": {"port": 8080},
        "accessPoints": {
            "db": {"consulServiceName": "pg", "port": 5432},
            "off": null
        },
        "projectId": "ab"
    }"#;

    #[test]
    fn test_parse_sample_config() {
        let config: ConsulSyncConfig = serde_json::from_str(SAMPLE).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.consul.agent.reg.host.as_deref(), Some("consul.local"));
        assert_eq!(config.consul.agent.datacenters.len(), 2);
        assert_eq!(config.consul.agent.datacenters["prd"].dc.as_deref(), Some("dc-prd"));
        assert_eq!(config.web_server.port, Some(PortValue::Number(8080)));
        assert!(config.access_points["off"].is_none());
        assert_eq!(config.project_id.as_deref(), Some("ab"));
        assert!(!config.production);
    }

    #[test]
    fn test_validation_rejects_empty_name() {
        let mut config: ConsulSyncConfig = serde_json::from_str(SAMPLE).unwrap();
        config.consul.service.name.clear();
        assert!(config.validate().is_err());
    }
}
