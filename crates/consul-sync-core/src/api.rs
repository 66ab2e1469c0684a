//! Per-configuration facade and its cache.

use consul_sync_types::{ConsulSyncConfig, RegisterDescriptor, RegisterOptions, RegisterOutcome, RegisterType};
use std::sync::Arc;

use crate::agent::{resolve_agent_options, AgentConnector};
use crate::error::ConsulResult;
use crate::events::EventBus;
use crate::register::{
    build_register_descriptor, consul_ui_address, CyclicOptions, CyclicRegistrar, Reconciler,
};
use crate::router::{AgentRouter, ClientCache};
use crate::utils::{config_hash, DnsResolver, HostResolver, SharedCache, MAX_API_CACHED};

/// Router, descriptor, reconciler and cyclic loop of one configuration.
pub struct ConsulApi {
    router: Arc<AgentRouter>,
    descriptor: Arc<RegisterDescriptor>,
    reconciler: Arc<Reconciler>,
    cyclic: Arc<CyclicRegistrar>,
    force_every_register_attempt: bool,
}

impl ConsulApi {
    pub async fn new(
        config: &ConsulSyncConfig,
        clients: Arc<ClientCache>,
        resolver: Arc<dyn HostResolver>,
        events: EventBus,
    ) -> ConsulResult<Self> {
        let local_fqdn = if needs_local_fqdn(config) { resolver.fqdn(None).await } else { None };
        let agents = resolve_agent_options(config, local_fqdn.as_deref())?;
        let descriptor = Arc::new(build_register_descriptor(config, local_fqdn.as_deref())?);
        let router = Arc::new(
            AgentRouter::new(agents, clients)
                .with_resolver(resolver)
                .with_default_service_socket(config.use_default_service_socket),
        );
        let reconciler = Arc::new(Reconciler::new(Arc::clone(&router)));
        let cyclic = CyclicRegistrar::new(Arc::clone(&reconciler), Arc::clone(&descriptor), events);

        if let Some(ui) = consul_ui_address(config, &descriptor.id) {
            tracing::info!("Consul UI: {}", ui);
        }
        Ok(Self {
            router,
            descriptor,
            reconciler,
            cyclic,
            force_every_register_attempt: config.force_every_register_attempt,
        })
    }

    pub fn service_id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn register_descriptor(&self) -> &Arc<RegisterDescriptor> {
        &self.descriptor
    }

    pub fn router(&self) -> &Arc<AgentRouter> {
        &self.router
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub fn cyclic(&self) -> &Arc<CyclicRegistrar> {
        &self.cyclic
    }

    /// Cyclic options with the configured force flag applied.
    pub fn cyclic_options(&self, register_type: RegisterType) -> CyclicOptions {
        CyclicOptions {
            register_type,
            force_every_register_attempt: self.force_every_register_attempt,
            ..CyclicOptions::default()
        }
    }

    /// One reconciliation pass of the own descriptor.
    pub async fn register_once(&self, register_type: RegisterType) -> ConsulResult<RegisterOutcome> {
        self.reconciler
            .register_service(&self.descriptor, RegisterOptions::with_type(register_type))
            .await
    }

    /// Deregisters `service_id`, or the own service when `None`.
    pub async fn deregister(&self, service_id: Option<&str>) -> bool {
        let id = service_id.unwrap_or(&self.descriptor.id);
        self.router.deregister_if_needed(id).await
    }
}

fn needs_local_fqdn(config: &ConsulSyncConfig) -> bool {
    let blank = |v: Option<&str>| v.map_or(true, |v| v.trim().is_empty());
    blank(config.consul.agent.reg.host.as_deref()) || blank(config.consul.service.host.as_deref())
}

/// [`ConsulApi`] instances memoized by configuration hash.
pub struct ApiCache {
    clients: Arc<ClientCache>,
    resolver: Arc<dyn HostResolver>,
    events: EventBus,
    cache: SharedCache<Arc<ConsulApi>>,
}

impl ApiCache {
    pub fn new(connector: Arc<dyn AgentConnector>, events: EventBus) -> Self {
        Self {
            clients: Arc::new(ClientCache::new(connector)),
            resolver: Arc::new(DnsResolver::new()),
            events,
            cache: SharedCache::new(MAX_API_CACHED),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn HostResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn clients(&self) -> &Arc<ClientCache> {
        &self.clients
    }

    pub async fn get(&self, config: &ConsulSyncConfig) -> ConsulResult<Arc<ConsulApi>> {
        let key = config_hash(config);
        self.cache
            .get_or_try_insert_with(&key, || async {
                let api = ConsulApi::new(
                    config,
                    Arc::clone(&self.clients),
                    Arc::clone(&self.resolver),
                    self.events.clone(),
                )
                .await?;
                Ok(Arc::new(api))
            })
            .await
    }

    pub async fn len(&self) -> usize {
        self.cache.len().await
    }
}
