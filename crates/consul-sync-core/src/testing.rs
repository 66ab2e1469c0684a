//! In-memory agent doubles shared by unit tests.

use async_trait::async_trait;
use consul_sync_types::{
    AgentMember, AgentOptions, HealthQuery, HealthServiceEntry, RegisterDescriptor, RegistryError,
    ServiceInfo,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::agent::{AgentClient, AgentConnector};
use crate::error::ConsulResult;
use crate::utils::HostResolver;

#[derive(Default)]
struct MockState {
    health: HashMap<String, Vec<HealthServiceEntry>>,
    registered: Vec<RegisterDescriptor>,
    deregistered: Vec<String>,
    health_queries: Vec<HealthQuery>,
    members: Vec<AgentMember>,
    catalog_queries: Vec<String>,
    failure: Option<RegistryError>,
}

/// Agent that keeps its catalog in memory and records every call.
///
/// Registering a descriptor makes it visible to later health queries;
/// deregistering removes it again.
pub(crate) struct MockAgentClient {
    options: AgentOptions,
    state: Mutex<MockState>,
}

impl MockAgentClient {
    pub(crate) fn new(options: AgentOptions) -> Self {
        Self { options, state: Mutex::new(MockState::default()) }
    }

    pub(crate) fn set_health(&self, service: &str, entries: Vec<HealthServiceEntry>) {
        self.state.lock().health.insert(service.to_string(), entries);
    }

    pub(crate) fn set_members(&self, members: Vec<AgentMember>) {
        self.state.lock().members = members;
    }

    /// Datacenters passed to catalog calls, in call order.
    pub(crate) fn catalog_queries(&self) -> Vec<String> {
        self.state.lock().catalog_queries.clone()
    }

    /// Every following call fails with `error`.
    pub(crate) fn fail_with(&self, error: RegistryError) {
        self.state.lock().failure = Some(error);
    }

    pub(crate) fn recover(&self) {
        self.state.lock().failure = None;
    }

    pub(crate) fn registered(&self) -> Vec<RegisterDescriptor> {
        self.state.lock().registered.clone()
    }

    pub(crate) fn deregistered(&self) -> Vec<String> {
        self.state.lock().deregistered.clone()
    }

    pub(crate) fn health_queries(&self) -> Vec<HealthQuery> {
        self.state.lock().health_queries.clone()
    }

    fn check_failure(&self) -> Result<(), RegistryError> {
        match &self.state.lock().failure {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AgentClient for MockAgentClient {
    fn options(&self) -> &AgentOptions {
        &self.options
    }

    async fn service_list(&self) -> Result<HashMap<String, ServiceInfo>, RegistryError> {
        self.check_failure()?;
        let state = self.state.lock();
        Ok(state
            .health
            .values()
            .flatten()
            .map(|e| (e.service.id.clone(), e.service.clone()))
            .collect())
    }

    async fn catalog_service_list(
        &self,
        datacenter: &str,
    ) -> Result<HashMap<String, Vec<String>>, RegistryError> {
        self.state.lock().catalog_queries.push(datacenter.to_string());
        self.check_failure()?;
        let state = self.state.lock();
        Ok(state
            .health
            .values()
            .flatten()
            .map(|e| (e.service.service.clone(), e.service.tags.clone()))
            .collect())
    }

    async fn agent_members(&self) -> Result<Vec<AgentMember>, RegistryError> {
        self.check_failure()?;
        Ok(self.state.lock().members.clone())
    }

    async fn health_service(
        &self,
        query: &HealthQuery,
    ) -> Result<Vec<HealthServiceEntry>, RegistryError> {
        self.state.lock().health_queries.push(query.clone());
        self.check_failure()?;
        Ok(self.state.lock().health.get(&query.service).cloned().unwrap_or_default())
    }

    async fn register(&self, descriptor: &RegisterDescriptor) -> Result<(), RegistryError> {
        self.check_failure()?;
        let mut state = self.state.lock();
        state.registered.push(descriptor.clone());
        let entry = HealthServiceEntry {
            node: Default::default(),
            service: ServiceInfo {
                id: descriptor.id.clone(),
                service: descriptor.name.clone(),
                tags: descriptor.tags.clone(),
                meta: Some(descriptor.meta.clone()),
                port: descriptor.port,
                address: descriptor.address.clone(),
                datacenter: None,
            },
        };
        state.health.insert(descriptor.id.clone(), vec![entry]);
        Ok(())
    }

    async fn deregister(&self, service_id: &str) -> Result<(), RegistryError> {
        self.check_failure()?;
        let mut state = self.state.lock();
        state.deregistered.push(service_id.to_string());
        state.health.remove(service_id);
        Ok(())
    }
}

/// Hands out one [`MockAgentClient`] per routing class and counts builds.
#[derive(Default)]
pub(crate) struct MockConnector {
    clients: Mutex<HashMap<String, Arc<MockAgentClient>>>,
    connects: AtomicUsize,
}

impl MockConnector {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn client(&self, agent_type: &str) -> Option<Arc<MockAgentClient>> {
        self.clients.lock().get(agent_type).cloned()
    }

    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl AgentConnector for MockConnector {
    fn connect(&self, options: &AgentOptions) -> ConsulResult<Arc<dyn AgentClient>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let client: Arc<dyn AgentClient> = self
            .clients
            .lock()
            .entry(options.agent_type.clone())
            .or_insert_with(|| Arc::new(MockAgentClient::new(options.clone())))
            .clone();
        Ok(client)
    }
}

/// Resolver answering from a fixed table; unknown hosts do not resolve.
pub(crate) struct StaticResolver {
    local: String,
    hosts: HashMap<String, String>,
}

impl StaticResolver {
    pub(crate) fn new(local: &str) -> Self {
        Self { local: local.to_string(), hosts: HashMap::new() }
    }

    pub(crate) fn with_host(mut self, host: &str, fqdn: &str) -> Self {
        self.hosts.insert(host.to_string(), fqdn.to_string());
        self
    }
}

#[async_trait]
impl HostResolver for StaticResolver {
    async fn fqdn(&self, host: Option<&str>) -> Option<String> {
        match host {
            Some(host) => self.hosts.get(host).cloned(),
            None => Some(self.local.clone()),
        }
    }
}

pub(crate) fn entry(service: &str, address: &str, port: u16) -> HealthServiceEntry {
    HealthServiceEntry {
        node: Default::default(),
        service: ServiceInfo {
            id: service.to_string(),
            service: service.to_string(),
            port,
            address: address.to_string(),
            ..ServiceInfo::default()
        },
    }
}

pub(crate) fn descriptor() -> RegisterDescriptor {
    RegisterDescriptor {
        id: "dev-e01-api-1".into(),
        name: "dev-e01-api-1".into(),
        address: "10.0.0.1".into(),
        port: 8080,
        tags: vec!["api".into()],
        meta: BTreeMap::from([("host".to_string(), "10.0.0.1".to_string())]),
        check: None,
    }
}
