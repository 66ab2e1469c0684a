//! Polling loop that keeps access points in sync with the registry.

use consul_sync_types::{HealthQuery, HealthServiceEntry, ServiceInfo};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use super::table::{default_extractor, AccessPoints};
use crate::events::{ConsulEvent, EventBus};
use crate::register::StartOutcome;
use crate::router::AgentRouter;

const PREFIX: &str = "AP-UPDATER:";

/// Pause between polling cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
const WAIT_STEP: Duration = Duration::from_millis(100);

/// What polling did to one access point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollResult {
    /// Still fresh, not queried
    Fresh,
    /// No passing instance with an address and meta
    NoData,
    UpToDate,
    Updated,
}

#[derive(Default)]
struct LoopState {
    is_started: bool,
    shutdown_tx: Option<watch::Sender<bool>>,
}

/// Refreshes stale access points from health queries.
pub struct AccessPointsUpdater {
    table: Arc<AccessPoints>,
    router: Arc<AgentRouter>,
    events: EventBus,
    poll_interval: Duration,
    /// Health query results of the running cycle, by service name
    query_cache: Mutex<HashMap<String, Option<Vec<HealthServiceEntry>>>>,
    any_updated: AtomicBool,
    state: Mutex<LoopState>,
}

impl AccessPointsUpdater {
    pub fn new(table: Arc<AccessPoints>, router: Arc<AgentRouter>, events: EventBus) -> Arc<Self> {
        Self::with_interval(table, router, events, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_interval(
        table: Arc<AccessPoints>,
        router: Arc<AgentRouter>,
        events: EventBus,
        poll_interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            table,
            router,
            events,
            poll_interval,
            query_cache: Mutex::new(HashMap::new()),
            any_updated: AtomicBool::new(false),
            state: Mutex::new(LoopState::default()),
        })
    }

    pub fn table(&self) -> &Arc<AccessPoints> {
        &self.table
    }

    pub fn is_any_updated(&self) -> bool {
        self.any_updated.load(Ordering::SeqCst)
    }

    /// Runs one polling cycle over every stale entry. Returns how many changed.
    pub async fn update_all(&self) -> usize {
        self.query_cache.lock().clear();
        let mut updated = 0;
        for (key, service_name) in self.table.stale(Instant::now()) {
            if self.update_one(&key, &service_name).await == PollResult::Updated {
                updated += 1;
            }
        }
        if updated > 0 {
            tracing::debug!("{} updated {} access point(s)", PREFIX, updated);
            self.any_updated.store(true, Ordering::SeqCst);
            self.events.emit(ConsulEvent::AccessPointsUpdated);
        }
        updated
    }

    /// Polls a single entry, respecting its freshness window. Runs as its own
    /// cycle, so earlier query results are not reused.
    pub async fn update_access_point(&self, key: &str) -> PollResult {
        self.query_cache.lock().clear();
        let due = self.table.stale(Instant::now()).into_iter().find(|(k, _)| k == key);
        match due {
            Some((key, service_name)) => self.update_one(&key, &service_name).await,
            None => PollResult::Fresh,
        }
    }

    async fn update_one(&self, key: &str, service_name: &str) -> PollResult {
        tracing::trace!("{} Polling {}", PREFIX, service_name);
        let Some(service) = self.lookup(service_name).await else {
            tracing::warn!("{} There is no information for {}", PREFIX, service_name);
            self.table.mark_failure(key);
            return PollResult::NoData;
        };
        self.table.mark_success(key, Instant::now());

        let Some(point) = self.table.get(key) else {
            return PollResult::NoData;
        };
        let patch = match self.table.extractor(key) {
            Some(extract) => extract(&point, &service),
            None => default_extractor(&point, &service),
        };
        match self.table.set(key, Some(&patch)) {
            Some(update) if !update.changes.is_empty() => {
                self.events.emit(ConsulEvent::AccessPointUpdated {
                    point: update.point,
                    changes: update.changes,
                });
                PollResult::Updated
            },
            _ => {
                tracing::trace!("{} The data is up-to-date {}", PREFIX, service_name);
                PollResult::UpToDate
            },
        }
    }

    /// First passing instance that has both an address and meta.
    async fn lookup(&self, service_name: &str) -> Option<ServiceInfo> {
        let cached = self.query_cache.lock().get(service_name).cloned();
        let entries = match cached {
            Some(entries) => entries,
            None => {
                let entries = self.router.health_service(&HealthQuery::passing(service_name)).await;
                self.query_cache.lock().insert(service_name.to_string(), entries.clone());
                entries
            },
        };
        entries?
            .into_iter()
            .next()
            .map(|entry| entry.service)
            .filter(|service| !service.address.is_empty() && service.meta.is_some())
    }

    /// Starts the polling loop; the first cycle runs immediately.
    pub fn start(self: &Arc<Self>) -> StartOutcome {
        let shutdown_rx = {
            let mut state = self.state.lock();
            if state.is_started {
                return StartOutcome::AlreadyRunning;
            }
            let (tx, rx) = watch::channel(false);
            state.shutdown_tx = Some(tx);
            state.is_started = true;
            rx
        };
        drop(tokio::spawn(Arc::clone(self).run(shutdown_rx)));
        tracing::info!(
            "{} started for {} access point(s), interval {:?}",
            PREFIX,
            self.table.len(),
            self.poll_interval
        );
        StartOutcome::Started
    }

    /// Stops the loop and drops the per-cycle query cache.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if let Some(tx) = state.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        state.is_started = false;
        self.query_cache.lock().clear();
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().is_started
    }

    async fn run(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        loop {
            self.update_all().await;
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => break,
                () = tokio::time::sleep(self.poll_interval) => {},
            }
        }
        tracing::debug!("{} loop finished", PREFIX);
    }

    /// Resolves `true` once any cycle changed an access point, `false` after `timeout`.
    pub async fn wait_for_any_updated(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_any_updated() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            tokio::time::sleep(WAIT_STEP.min(deadline - now)).await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::agent::AgentSet;
    use crate::router::ClientCache;
    use crate::testing::{entry, MockAgentClient, MockConnector};
    use consul_sync_types::{
        AccessPoint, AccessPointData, AgentOptions, FieldChange, RegistryError,
    };
    use serde_json::json;
    use std::collections::BTreeMap;

    async fn setup(
        seed: serde_json::Value,
    ) -> (Arc<AccessPointsUpdater>, Arc<MockAgentClient>, EventBus) {
        let connector = MockConnector::new();
        let router = Arc::new(AgentRouter::new(
            AgentSet::single(AgentOptions::new("reg", "consul.local", 8500)),
            Arc::new(ClientCache::new(connector.clone())),
        ));
        router.primary().await.unwrap();
        let client = connector.client("reg").unwrap();
        let seed: BTreeMap<String, Option<AccessPointData>> = serde_json::from_value(seed).unwrap();
        let table = Arc::new(AccessPoints::from_config(&seed));
        let bus = EventBus::new();
        (AccessPointsUpdater::new(table, router, bus.clone()), client, bus)
    }

    fn with_meta_port(address: &str, port: &str) -> HealthServiceEntry {
        let mut e = entry("svc", address, 1);
        e.service.meta = Some(BTreeMap::from([("port".to_string(), port.to_string())]));
        e
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_resolves_host_and_port() {
        let (updater, client, bus) =
            setup(json!({"svc-key": {"consulServiceName": "svc", "port": 9000}})).await;
        let mut rx = bus.subscribe();
        client.set_health("svc", vec![with_meta_port("h", "9100")]);

        assert_eq!(updater.update_all().await, 1);
        let point = updater.table().get("svc-key").unwrap();
        assert_eq!(point.host.as_deref(), Some("h"));
        assert_eq!(point.port, Some(9100));

        match rx.recv().await.unwrap() {
            ConsulEvent::AccessPointUpdated { point, changes } => {
                assert_eq!(point.id, "svc-key");
                assert_eq!(changes, vec![
                    FieldChange::new("host", serde_json::Value::Null, json!("h")),
                    FieldChange::new("port", json!(9000), json!(9100)),
                ]);
            },
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(rx.recv().await.unwrap(), ConsulEvent::AccessPointsUpdated);
        assert!(updater.is_any_updated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_service_name_queried_once_per_cycle() {
        let (updater, client, _bus) = setup(json!({
            "a": {"consulServiceName": "svc"},
            "b": {"consulServiceName": "svc"}
        }))
        .await;
        client.set_health("svc", vec![with_meta_port("h", "80")]);
        assert_eq!(updater.update_all().await, 2);
        assert_eq!(client.health_queries().len(), 1);

        // both fresh now: nothing queried
        assert_eq!(updater.update_all().await, 0);
        assert_eq!(client.health_queries().len(), 1);

        // after the freshness window one more query per cycle
        tokio::time::advance(Duration::from_secs(121)).await;
        assert_eq!(updater.update_all().await, 0);
        assert_eq!(client.health_queries().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_data_forces_retry_next_cycle() {
        let (updater, client, _bus) =
            setup(json!({"x": {"consulServiceName": "svc", "port": 1}})).await;
        assert_eq!(updater.update_access_point("x").await, PollResult::NoData);
        assert!(updater.table().last_success_update("x").is_none());

        // address without meta is still "no data"
        client.set_health("svc", vec![entry("svc", "h", 1)]);
        assert_eq!(updater.update_access_point("x").await, PollResult::NoData);

        client.set_health("svc", vec![with_meta_port("h", "1")]);
        assert_eq!(updater.update_access_point("x").await, PollResult::Updated);
        assert_eq!(updater.update_access_point("x").await, PollResult::Fresh);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_resets_freshness() {
        let (updater, client, _bus) =
            setup(json!({"x": {"consulServiceName": "svc", "port": 1}})).await;
        client.set_health("svc", vec![with_meta_port("h", "1")]);
        assert_eq!(updater.update_all().await, 1);
        assert!(updater.table().last_success_update("x").is_some());

        tokio::time::advance(Duration::from_secs(121)).await;
        client.fail_with(RegistryError::Transport {
            call: "health.service".into(),
            message: "connection refused".into(),
        });
        assert_eq!(updater.update_access_point("x").await, PollResult::NoData);
        assert!(updater.table().last_success_update("x").is_none());
        assert_eq!(updater.table().get("x").unwrap().host.as_deref(), Some("h"));

        // no freshness window after a failure: the next call queries again
        client.recover();
        assert_eq!(updater.update_access_point("x").await, PollResult::UpToDate);
        assert!(updater.table().last_success_update("x").is_some());
        assert_eq!(client.health_queries().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_extractor() {
        let (updater, client, _bus) = setup(json!({"x": {"consulServiceName": "svc"}})).await;
        client.set_health("svc", vec![with_meta_port("h", "80")]);
        updater.table().set_extractor(
            "x",
            Arc::new(|_: &AccessPoint, service: &ServiceInfo| {
                AccessPointData::default()
                    .with_host(format!("{}.internal", service.address))
                    .with_protocol("https")
            }),
        );
        updater.update_all().await;
        let point = updater.table().get("x").unwrap();
        assert_eq!(point.host.as_deref(), Some("h.internal"));
        assert_eq!(point.protocol, "https");
        assert_eq!(point.port, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_and_wait_for_any_updated() {
        let (updater, client, _bus) = setup(json!({"x": {"consulServiceName": "svc"}})).await;
        assert_eq!(updater.start(), StartOutcome::Started);
        assert_eq!(updater.start(), StartOutcome::AlreadyRunning);
        assert!(!updater.wait_for_any_updated(Duration::from_secs(5)).await);

        client.set_health("svc", vec![with_meta_port("h", "80")]);
        assert!(updater.wait_for_any_updated(Duration::from_secs(30)).await);
        assert_eq!(updater.table().get("x").unwrap().port, Some(80));

        updater.stop();
        assert!(!updater.is_started());
    }
}
