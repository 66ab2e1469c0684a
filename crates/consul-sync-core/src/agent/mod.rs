//! Registry agent transport.
//!
//! [`AgentClient`] is the call surface the rest of the crate talks to.
//! [`HttpAgentClient`] speaks the agent's v1 HTTP API; tests plug in their own
//! implementation through [`AgentConnector`].

mod http;
mod options;

pub use http::{HttpAgentClient, HttpConnector};
pub use options::{resolve_agent_options, AgentSet, DEFAULT_PORT, DEFAULT_SECURE_PORT};

use async_trait::async_trait;
use consul_sync_types::{
    AgentMember, AgentOptions, HealthQuery, HealthServiceEntry, RegisterDescriptor, RegistryError,
    ServiceInfo,
};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ConsulResult;

/// Client handle bound to one agent.
#[async_trait]
pub trait AgentClient: Send + Sync {
    /// Options this handle was built from.
    fn options(&self) -> &AgentOptions;

    /// `GET /v1/agent/services`
    async fn service_list(&self) -> Result<HashMap<String, ServiceInfo>, RegistryError>;

    /// `GET /v1/catalog/services?dc=<dc>`: service names and their tags.
    async fn catalog_service_list(
        &self,
        datacenter: &str,
    ) -> Result<HashMap<String, Vec<String>>, RegistryError>;

    /// `GET /v1/agent/members`
    async fn agent_members(&self) -> Result<Vec<AgentMember>, RegistryError>;

    /// `GET /v1/health/service/<name>`. An unknown service yields an empty list.
    async fn health_service(
        &self,
        query: &HealthQuery,
    ) -> Result<Vec<HealthServiceEntry>, RegistryError>;

    /// `PUT /v1/agent/service/register`
    async fn register(&self, descriptor: &RegisterDescriptor) -> Result<(), RegistryError>;

    /// `PUT /v1/agent/service/deregister/<id>`
    async fn deregister(&self, service_id: &str) -> Result<(), RegistryError>;
}

/// Builds client handles from resolved options.
pub trait AgentConnector: Send + Sync {
    fn connect(&self, options: &AgentOptions) -> ConsulResult<Arc<dyn AgentClient>>;
}
