//! Routes registry calls to the right agent handle.
//!
//! Service ids start with their environment tag (`dev-...`, `prd-...`). The
//! first three characters select a secondary datacenter agent when one with
//! that tag is configured; everything else goes to the primary `reg` agent.

use consul_sync_types::{
    AgentMember, AgentOptions, HealthQuery, HealthServiceEntry, RegisterDescriptor, ServiceInfo,
    PRIMARY_AGENT,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::agent::{AgentClient, AgentConnector, AgentSet};
use crate::error::{ConsulError, ConsulResult};
use crate::utils::{config_hash, DnsResolver, HostResolver, SharedCache, MAX_API_CACHED};

const ROUTING_PREFIX_LEN: usize = 3;
/// Agent class that serves catalog calls for unknown datacenters.
const CATALOG_FALLBACK_AGENT: &str = "dev";

/// Agent handles memoized by the structural hash of their options.
///
/// Concurrent first requests for the same options build a single handle.
pub struct ClientCache {
    connector: Arc<dyn AgentConnector>,
    cache: SharedCache<Arc<dyn AgentClient>>,
}

impl ClientCache {
    pub fn new(connector: Arc<dyn AgentConnector>) -> Self {
        Self::with_bound(connector, MAX_API_CACHED)
    }

    pub fn with_bound(connector: Arc<dyn AgentConnector>, bound: usize) -> Self {
        Self { connector, cache: SharedCache::new(bound) }
    }

    pub async fn get(&self, options: &AgentOptions) -> ConsulResult<Arc<dyn AgentClient>> {
        let key = config_hash(options);
        self.cache
            .get_or_try_insert_with(&key, || async {
                tracing::debug!(
                    "building consul client for agent '{}' at {}",
                    options.agent_type,
                    options.base_url()
                );
                self.connector.connect(options)
            })
            .await
    }

    pub async fn len(&self) -> usize {
        self.cache.len().await
    }
}

/// A client handle plus the options it was built from.
#[derive(Clone)]
pub struct AgentHandle {
    options: AgentOptions,
    client: Arc<dyn AgentClient>,
}

impl AgentHandle {
    pub fn new(options: AgentOptions, client: Arc<dyn AgentClient>) -> Self {
        Self { options, client }
    }

    pub fn options(&self) -> &AgentOptions {
        &self.options
    }

    pub fn agent_type(&self) -> &str {
        &self.options.agent_type
    }

    pub fn client(&self) -> &Arc<dyn AgentClient> {
        &self.client
    }
}

impl fmt::Debug for AgentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentHandle").field("options", &self.options).finish_non_exhaustive()
    }
}

/// Host and port of a discovered service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSocket {
    pub host: String,
    pub port: u16,
}

/// Uniform operation surface over all configured agents.
///
/// Every call exists twice: `try_*` propagates the error, the plain variant
/// logs it with the call name and returns `None`/`false`.
pub struct AgentRouter {
    agents: AgentSet,
    clients: Arc<ClientCache>,
    resolver: Arc<dyn HostResolver>,
    use_default_service_socket: bool,
}

impl AgentRouter {
    pub fn new(agents: AgentSet, clients: Arc<ClientCache>) -> Self {
        Self {
            agents,
            clients,
            resolver: Arc::new(DnsResolver::new()),
            use_default_service_socket: false,
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn HostResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// When set, [`get_service_socket`](Self::get_service_socket) never
    /// queries the registry.
    pub fn with_default_service_socket(mut self, enabled: bool) -> Self {
        self.use_default_service_socket = enabled;
        self
    }

    pub fn agents(&self) -> &AgentSet {
        &self.agents
    }

    pub fn primary_options(&self) -> &AgentOptions {
        &self.agents.primary
    }

    /// Routing class for a service id (or name).
    pub fn agent_type_for(&self, service_id: &str) -> &str {
        let prefix: String = service_id.chars().take(ROUTING_PREFIX_LEN).collect();
        match self.agents.secondaries.get_key_value(prefix.as_str()) {
            Some((tag, _)) => tag,
            None => PRIMARY_AGENT,
        }
    }

    /// Options of the agent that serves `service_id`.
    pub fn route(&self, service_id: &str) -> &AgentOptions {
        self.agents.get(self.agent_type_for(service_id)).unwrap_or(&self.agents.primary)
    }

    /// Agent configured for `datacenter`, else the `dev` class, else the primary.
    pub fn agent_for_datacenter(&self, datacenter: &str) -> &AgentOptions {
        self.agents
            .iter()
            .find(|o| o.datacenter.as_deref() == Some(datacenter))
            .or_else(|| self.agents.get(CATALOG_FALLBACK_AGENT))
            .unwrap_or(&self.agents.primary)
    }

    pub async fn resolve(&self, service_id: &str) -> ConsulResult<AgentHandle> {
        self.handle_for(self.route(service_id)).await
    }

    pub async fn primary(&self) -> ConsulResult<AgentHandle> {
        self.handle_for(&self.agents.primary).await
    }

    pub async fn handle_for(&self, options: &AgentOptions) -> ConsulResult<AgentHandle> {
        let client = self.clients.get(options).await?;
        Ok(AgentHandle::new(options.clone(), client))
    }

    // ---- list ----

    pub async fn try_service_list(
        &self,
        handle: &AgentHandle,
    ) -> ConsulResult<HashMap<String, ServiceInfo>> {
        Ok(handle.client.service_list().await?)
    }

    pub async fn service_list(&self, handle: &AgentHandle) -> Option<HashMap<String, ServiceInfo>> {
        translate("agent.service.list", self.try_service_list(handle).await)
    }

    /// Service names of a datacenter with their tags.
    pub async fn try_catalog_service_list(
        &self,
        datacenter: &str,
    ) -> ConsulResult<HashMap<String, Vec<String>>> {
        let handle = self.handle_for(self.agent_for_datacenter(datacenter)).await?;
        Ok(handle.client.catalog_service_list(datacenter).await?)
    }

    pub async fn catalog_service_list(
        &self,
        datacenter: &str,
    ) -> Option<HashMap<String, Vec<String>>> {
        translate("catalog.service.list", self.try_catalog_service_list(datacenter).await)
    }

    // ---- members ----

    pub async fn try_agent_members(&self, handle: &AgentHandle) -> ConsulResult<Vec<AgentMember>> {
        Ok(handle.client.agent_members().await?)
    }

    pub async fn agent_members(&self, handle: &AgentHandle) -> Option<Vec<AgentMember>> {
        translate("agent.members", self.try_agent_members(handle).await)
    }

    // ---- health ----

    /// Health query routed by service name. A query without a datacenter
    /// takes the `dc` of the routed agent.
    pub async fn try_health_service(
        &self,
        query: &HealthQuery,
    ) -> ConsulResult<Vec<HealthServiceEntry>> {
        let handle = self.resolve(&query.service).await?;
        self.try_health_service_on(&handle, query).await
    }

    pub async fn try_health_service_on(
        &self,
        handle: &AgentHandle,
        query: &HealthQuery,
    ) -> ConsulResult<Vec<HealthServiceEntry>> {
        let mut query = query.clone();
        if query.datacenter.is_none() {
            query.datacenter = self.route(&query.service).datacenter.clone();
        }
        Ok(handle.client.health_service(&query).await?)
    }

    pub async fn health_service(&self, query: &HealthQuery) -> Option<Vec<HealthServiceEntry>> {
        translate("health.service", self.try_health_service(query).await)
    }

    // ---- register / deregister ----

    pub async fn try_register(
        &self,
        handle: &AgentHandle,
        descriptor: &RegisterDescriptor,
    ) -> ConsulResult<()> {
        Ok(handle.client.register(descriptor).await?)
    }

    pub async fn register(&self, handle: &AgentHandle, descriptor: &RegisterDescriptor) -> bool {
        translate("agent.service.register", self.try_register(handle, descriptor).await).is_some()
    }

    pub async fn try_deregister(&self, handle: &AgentHandle, service_id: &str) -> ConsulResult<()> {
        Ok(handle.client.deregister(service_id).await?)
    }

    pub async fn deregister(&self, handle: &AgentHandle, service_id: &str) -> bool {
        translate("agent.service.deregister", self.try_deregister(handle, service_id).await)
            .is_some()
    }

    // ---- lookups ----

    /// First health entry of the id or name, whatever its status.
    pub async fn check_if_service_registered(
        &self,
        service_id_or_name: &str,
    ) -> Option<HealthServiceEntry> {
        self.health_service(&HealthQuery::any(service_id_or_name))
            .await
            .and_then(|entries| entries.into_iter().next())
    }

    /// Service record of the first passing instance.
    pub async fn get_service_info(&self, service_name: &str) -> Option<ServiceInfo> {
        let info = self
            .health_service(&HealthQuery::passing(service_name))
            .await
            .and_then(|entries| entries.into_iter().next())
            .map(|entry| entry.service);
        if info.is_none() {
            tracing::debug!("No info about service ID {}", service_name);
        }
        info
    }

    /// Host and port of the first passing instance, or `defaults`.
    ///
    /// The service address is reported by its FQDN when it resolves; an empty
    /// address falls back to the node name.
    pub async fn get_service_socket(
        &self,
        service_name: &str,
        defaults: ServiceSocket,
    ) -> ServiceSocket {
        if self.use_default_service_socket {
            return defaults;
        }
        let first = self
            .health_service(&HealthQuery::passing(service_name))
            .await
            .and_then(|entries| entries.into_iter().next());
        match first {
            Some(entry) => {
                let address = entry.service.address;
                let host = if address.is_empty() {
                    entry.node.node
                } else {
                    let fqdn = self.resolver.fqdn(Some(address.as_str())).await;
                    fqdn.unwrap_or(address)
                };
                ServiceSocket { host, port: entry.service.port }
            },
            None => {
                tracing::warn!(
                    "CONSUL: No working service found: {}. Return defaults {}:{}",
                    service_name,
                    defaults.host,
                    defaults.port
                );
                defaults
            },
        }
    }

    /// Removes `service_id` from the agent that holds it, if registered.
    ///
    /// The agent is the one whose host starts with the node's short name.
    /// Returns `false` only when a deregister call was made and failed.
    pub async fn deregister_if_needed(&self, service_id: &str) -> bool {
        let Some(entry) = self.check_if_service_registered(service_id).await else {
            tracing::info!("Service '{}' is not registered in Consul", service_id);
            return true;
        };

        let node = entry.node.node.to_lowercase();
        let short = node.split('.').next().unwrap_or_default();
        let options = self
            .agents
            .iter()
            .find(|o| o.host.to_lowercase().starts_with(short))
            .unwrap_or(&self.agents.primary);

        let deregistered = match self.handle_for(options).await {
            Ok(handle) => self.deregister(&handle, service_id).await,
            Err(e) => {
                tracing::error!("[consul.agent.service.deregister] ERROR: {}", e);
                false
            },
        };
        if deregistered {
            tracing::info!(
                "Previous registration of service '{}' removed from consul agent {}",
                service_id,
                options.host
            );
        } else {
            tracing::error!(
                "Previous registration of service '{}' was NOT removed from consul agent {}",
                service_id,
                options.host
            );
        }
        deregistered
    }
}

fn translate<T>(call: &str, result: ConsulResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(ConsulError::Registry(e)) => {
            tracing::error!("{}", e);
            None
        },
        Err(e) => {
            tracing::error!("[consul.{}] ERROR: {}", call, e);
            None
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::{entry, MockConnector, StaticResolver};
    use consul_sync_types::RegistryError;

    fn agents() -> AgentSet {
        let mut set = AgentSet::single(AgentOptions::new("reg", "consul-reg.local", 8500));
        let mut dev = AgentOptions::new("dev", "node-dev.local", 8500);
        dev.datacenter = Some("dc-dev".into());
        set.secondaries.insert("dev".into(), dev);
        set.secondaries.insert("prd".into(), AgentOptions::new("prd", "node-prd.local", 8500));
        set
    }

    fn router(connector: &Arc<MockConnector>) -> AgentRouter {
        let resolver = StaticResolver::new("box.dc.internal")
            .with_host("10.0.0.5", "api-5.dc.internal");
        AgentRouter::new(agents(), Arc::new(ClientCache::new(connector.clone())))
            .with_resolver(Arc::new(resolver))
    }

    #[test]
    fn test_routing_by_prefix() {
        let connector = MockConnector::new();
        let router = router(&connector);
        assert_eq!(router.agent_type_for("dev-ab-e01-api-1"), "dev");
        assert_eq!(router.agent_type_for("prd-r01-api"), "prd");
        assert_eq!(router.agent_type_for("tst-e01-api"), "reg");
        assert_eq!(router.agent_type_for("de"), "reg");
        assert_eq!(router.route("dev-x").host, "node-dev.local");
    }

    #[tokio::test]
    async fn test_handles_are_built_once() {
        let connector = MockConnector::new();
        let router = router(&connector);
        let (a, b) = tokio::join!(router.resolve("dev-1"), router.resolve("dev-2"));
        assert!(Arc::ptr_eq(a.unwrap().client(), b.unwrap().client()));
        router.primary().await.unwrap();
        assert_eq!(connector.connects(), 2);
    }

    #[tokio::test]
    async fn test_health_query_fills_datacenter() {
        let connector = MockConnector::new();
        let router = router(&connector);
        router.try_health_service(&HealthQuery::passing("dev-svc")).await.unwrap();
        let client = connector.client("dev").unwrap();
        let queries = client.health_queries();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].datacenter.as_deref(), Some("dc-dev"));
    }

    #[tokio::test]
    async fn test_translating_variants_swallow_errors() {
        let connector = MockConnector::new();
        let router = router(&connector);
        let handle = router.primary().await.unwrap();
        connector.client("reg").unwrap().fail_with(RegistryError::Status {
            call: "agent.service.register".into(),
            status: 500,
            body: "boom".into(),
        });
        let descriptor = crate::testing::descriptor();
        assert!(!router.register(&handle, &descriptor).await);
        assert!(router.try_register(&handle, &descriptor).await.is_err());
        assert!(router.service_list(&handle).await.is_none());
    }

    #[tokio::test]
    async fn test_get_service_socket() {
        let connector = MockConnector::new();
        let router = router(&connector);
        let defaults = ServiceSocket { host: "localhost".into(), port: 1 };
        let socket = router.get_service_socket("svc", defaults.clone()).await;
        assert_eq!(socket, defaults);

        let mut e = entry("svc", "", 9000);
        e.node.node = "node-7".into();
        router.primary().await.unwrap();
        connector.client("reg").unwrap().set_health("svc", vec![e]);
        let socket = router.get_service_socket("svc", defaults).await;
        assert_eq!(socket, ServiceSocket { host: "node-7".into(), port: 9000 });
    }

    #[tokio::test]
    async fn test_get_service_socket_reports_fqdn() {
        let connector = MockConnector::new();
        let router = router(&connector);
        router.primary().await.unwrap();
        let client = connector.client("reg").unwrap();
        let defaults = ServiceSocket { host: "localhost".into(), port: 1 };

        client.set_health("svc", vec![entry("svc", "10.0.0.5", 9000)]);
        let socket = router.get_service_socket("svc", defaults.clone()).await;
        assert_eq!(socket, ServiceSocket { host: "api-5.dc.internal".into(), port: 9000 });

        client.set_health("svc", vec![entry("svc", "10.0.0.6", 9000)]);
        let socket = router.get_service_socket("svc", defaults).await;
        assert_eq!(socket.host, "10.0.0.6");
    }

    #[tokio::test]
    async fn test_default_service_socket_skips_registry() {
        let connector = MockConnector::new();
        let router = router(&connector).with_default_service_socket(true);
        router.primary().await.unwrap();
        let client = connector.client("reg").unwrap();
        client.set_health("svc", vec![entry("svc", "10.0.0.5", 9000)]);

        let defaults = ServiceSocket { host: "localhost".into(), port: 1 };
        assert_eq!(router.get_service_socket("svc", defaults.clone()).await, defaults);
        assert!(client.health_queries().is_empty());
    }

    #[tokio::test]
    async fn test_catalog_routes_by_datacenter() {
        let connector = MockConnector::new();
        let router = router(&connector);
        assert_eq!(router.agent_for_datacenter("dc-dev").agent_type, "dev");
        assert_eq!(router.agent_for_datacenter("dc-unknown").agent_type, "dev");

        router.try_catalog_service_list("dc-dev").await.unwrap();
        let services = router.catalog_service_list("dc-other").await.unwrap();
        assert!(services.is_empty());
        let dev = connector.client("dev").unwrap();
        assert_eq!(dev.catalog_queries(), vec!["dc-dev", "dc-other"]);
        assert!(connector.client("reg").is_none());

        let primary_only = AgentRouter::new(
            AgentSet::single(AgentOptions::new("reg", "consul.local", 8500)),
            Arc::new(ClientCache::new(connector.clone())),
        );
        assert_eq!(primary_only.agent_for_datacenter("dc-dev").agent_type, "reg");
        primary_only.catalog_service_list("dc-dev").await.unwrap();
        assert_eq!(connector.client("reg").unwrap().catalog_queries(), vec!["dc-dev"]);
    }

    #[tokio::test]
    async fn test_agent_members() {
        let connector = MockConnector::new();
        let router = router(&connector);
        let handle = router.primary().await.unwrap();
        let client = connector.client("reg").unwrap();
        let mut member = AgentMember { name: "node-1".into(), ..AgentMember::default() };
        member.tags.insert("dc".into(), "dc-dev".into());
        client.set_members(vec![member.clone()]);

        assert_eq!(router.try_agent_members(&handle).await.unwrap(), vec![member]);

        client.fail_with(RegistryError::Transport {
            call: "agent.members".into(),
            message: "connection refused".into(),
        });
        assert!(router.agent_members(&handle).await.is_none());
        client.recover();
        assert_eq!(router.agent_members(&handle).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_deregister_if_needed_picks_agent_by_node() {
        let connector = MockConnector::new();
        let router = router(&connector);
        for tag in ["reg", "dev", "prd"] {
            router.handle_for(router.agents().get(tag).unwrap()).await.unwrap();
        }
        assert!(router.deregister_if_needed("prd-r01-api").await);
        assert!(connector.client("prd").unwrap().deregistered().is_empty());

        let mut e = entry("prd-r01-api", "10.0.0.9", 80);
        e.node.node = "NODE-PRD.dc.internal".into();
        connector.client("prd").unwrap().set_health("prd-r01-api", vec![e]);
        assert!(router.deregister_if_needed("prd-r01-api").await);
        assert_eq!(connector.client("prd").unwrap().deregistered(), vec!["prd-r01-api"]);
        assert!(connector.client("reg").unwrap().deregistered().is_empty());
    }
}
