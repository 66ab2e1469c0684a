//! Shapes returned by the registry agent.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A service instance as the agent reports it (`/v1/agent/services`,
/// `Service` field of `/v1/health/service/<name>`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceInfo {
    #[serde(rename = "ID")]
    pub id: String,
    pub service: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub meta: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datacenter: Option<String>,
}

impl ServiceInfo {
    pub fn meta_value(&self, key: &str) -> Option<&str> {
        self.meta.as_ref().and_then(|m| m.get(key)).map(String::as_str)
    }
}

/// Node part of a health entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HealthNode {
    #[serde(default)]
    pub node: String,
    #[serde(default)]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datacenter: Option<String>,
}

/// One element of `/v1/health/service/<name>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HealthServiceEntry {
    #[serde(default)]
    pub node: HealthNode,
    pub service: ServiceInfo,
}

/// Parameters of a health query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HealthQuery {
    pub service: String,
    /// Only instances whose checks pass
    pub passing: bool,
    /// `None` means "the datacenter of the routed agent"
    pub datacenter: Option<String>,
}

impl HealthQuery {
    pub fn passing(service: impl Into<String>) -> Self {
        Self { service: service.into(), passing: true, datacenter: None }
    }

    pub fn any(service: impl Into<String>) -> Self {
        Self { service: service.into(), passing: false, datacenter: None }
    }
}

/// One element of `/v1/agent/members`: a node of the agent's gossip pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AgentMember {
    pub name: String,
    #[serde(default)]
    pub addr: String,
    #[serde(default)]
    pub port: u16,
    /// Role, datacenter, build ...
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Serf status; 1 is alive
    #[serde(default)]
    pub status: i64,
}

impl AgentMember {
    pub fn datacenter(&self) -> Option<&str> {
        self.tags.get("dc").map(String::as_str)
    }
}
