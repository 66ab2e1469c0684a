//! Normalized connection options of one registry agent.

use serde::{Deserialize, Serialize};

/// Name of the primary (registration) agent class.
pub const PRIMARY_AGENT: &str = "reg";

/// Fully resolved options for one routing class.
///
/// Built once from configuration; the router hashes this struct to key its
/// client cache, so every field that changes the connection must live here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentOptions {
    /// Routing class (`reg`, `dev`, `prd`, ...)
    pub agent_type: String,
    pub host: String,
    pub port: u16,
    pub secure: bool,
    /// ACL token sent as `X-Consul-Token`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Datacenter tag passed to health queries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datacenter: Option<String>,
}

impl AgentOptions {
    pub fn new(agent_type: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            agent_type: agent_type.into(),
            host: host.into(),
            port,
            secure: false,
            token: None,
            datacenter: None,
        }
    }

    /// `http(s)://host:port`
    pub fn base_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    pub fn is_primary(&self) -> bool {
        self.agent_type == PRIMARY_AGENT
    }

    /// First characters of the token, safe for logs.
    pub fn masked_token(&self) -> String {
        match &self.token {
            Some(token) => format!("{}***", token.chars().take(4).collect::<String>()),
            None => "-".to_string(),
        }
    }
}
