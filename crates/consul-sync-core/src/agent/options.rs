//! Resolution of `consul.agent.*` into normalized [`AgentOptions`].

use consul_sync_types::{AgentConfig, AgentOptions, ConfigError, ConsulSyncConfig, PRIMARY_AGENT};
use std::collections::BTreeMap;

use crate::error::ConsulResult;

pub const DEFAULT_PORT: u16 = 8500;
pub const DEFAULT_SECURE_PORT: u16 = 443;
const FALLBACK_HOST: &str = "127.0.0.1";

/// The primary agent plus the secondary datacenter classes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSet {
    pub primary: AgentOptions,
    pub secondaries: BTreeMap<String, AgentOptions>,
}

impl AgentSet {
    pub fn single(primary: AgentOptions) -> Self {
        Self { primary, secondaries: BTreeMap::new() }
    }

    /// Options of a routing class; `reg` is the primary.
    pub fn get(&self, agent_type: &str) -> Option<&AgentOptions> {
        if agent_type == PRIMARY_AGENT {
            return Some(&self.primary);
        }
        self.secondaries.get(agent_type)
    }

    /// Primary first, then secondaries in tag order.
    pub fn iter(&self) -> impl Iterator<Item = &AgentOptions> {
        std::iter::once(&self.primary).chain(self.secondaries.values())
    }
}

/// Resolves every configured agent class.
///
/// Without a configured host the primary falls back to `local_fqdn`, the host
/// name of the deployment and the service host, in that order. Secondaries
/// inherit host, port, secure flag and token from the primary when they do
/// not set them.
pub fn resolve_agent_options(
    config: &ConsulSyncConfig,
    local_fqdn: Option<&str>,
) -> ConsulResult<AgentSet> {
    let agents = &config.consul.agent;
    let reg = &agents.reg;

    let host = non_empty(reg.host.as_deref())
        .or_else(|| non_empty(local_fqdn))
        .map(String::from)
        .or_else(|| non_empty(config.host_hostname.as_deref()).map(String::from))
        .or_else(|| non_empty(config.consul.service.host.as_deref()).map(String::from))
        .unwrap_or_else(|| FALLBACK_HOST.to_string());
    let secure = reg.secure.as_ref().is_some_and(|s| s.as_bool());
    let port = resolve_port(PRIMARY_AGENT, reg, secure, None)?;

    let primary = AgentOptions {
        agent_type: PRIMARY_AGENT.to_string(),
        host,
        port,
        secure,
        token: non_empty(reg.token.as_deref()).map(String::from),
        datacenter: non_empty(reg.dc.as_deref()).map(String::from),
    };

    let mut secondaries = BTreeMap::new();
    for (tag, agent) in &agents.datacenters {
        let secure = agent.secure.as_ref().map_or(primary.secure, |s| s.as_bool());
        let port = resolve_port(tag, agent, secure, Some(primary.port))?;
        let options = AgentOptions {
            agent_type: tag.clone(),
            host: non_empty(agent.host.as_deref()).map_or_else(|| primary.host.clone(), String::from),
            port,
            secure,
            token: non_empty(agent.token.as_deref())
                .map(String::from)
                .or_else(|| primary.token.clone()),
            datacenter: non_empty(agent.dc.as_deref()).map(String::from),
        };
        secondaries.insert(tag.clone(), options);
    }

    Ok(AgentSet { primary, secondaries })
}

fn resolve_port(
    agent_type: &str,
    agent: &AgentConfig,
    secure: bool,
    inherited: Option<u16>,
) -> ConsulResult<u16> {
    match &agent.port {
        Some(raw) => raw.as_port().ok_or_else(|| {
            ConfigError::invalid(
                format!("consul.agent.{}.port", agent_type),
                format!("The port for consul agent[{}] is invalid: [{}]", agent_type, raw.raw()),
            )
            .into()
        }),
        None => Ok(inherited.unwrap_or(if secure { DEFAULT_SECURE_PORT } else { DEFAULT_PORT })),
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
