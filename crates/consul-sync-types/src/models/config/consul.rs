//! `consul` and `webServer` sections.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

use super::values::{FlagValue, MetaValue, PortValue, TagsValue};
use crate::models::register::RegisterCheck;

/// Connection settings of one agent class as written in config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<PortValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<FlagValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Datacenter tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dc: Option<String>,
}

/// `consul.agent`: the primary `reg` agent plus any number of datacenter classes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSection {
    #[serde(default)]
    pub reg: AgentConfig,
    /// Secondary classes keyed by their routing tag (`dev`, `prd`, ...)
    #[serde(flatten)]
    pub datacenters: BTreeMap<String, AgentConfig>,
}

/// `consul.service`: identity of the local service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct ServiceConfig {
    #[validate(length(min = 1_u64))]
    pub name: String,
    #[validate(length(min = 1_u64))]
    pub instance: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<TagsValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<MetaValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<PortValue>,
}

/// `consul` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct ConsulSection {
    #[serde(default)]
    pub agent: AgentSection,
    #[validate(nested)]
    pub service: ServiceConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<RegisterCheck>,
}

/// `webServer` section; only its port is used, as the fallback service port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebServerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<PortValue>,
}
