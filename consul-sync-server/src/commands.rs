use anyhow::{Context, Result};
use consul_sync_core::access_points::{AccessPoints, AccessPointsUpdater, DEFAULT_POLL_INTERVAL};
use consul_sync_core::api::ConsulApi;
use consul_sync_core::events::{ConsulEvent, EventBus};
use consul_sync_core::register::StartOutcome;
use consul_sync_types::{ConsulSyncConfig, RegisterType};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};

fn build_updater(
    config: &ConsulSyncConfig,
    api: &ConsulApi,
    events: EventBus,
) -> Arc<AccessPointsUpdater> {
    let interval = config
        .access_points_update_interval_millis
        .map_or(DEFAULT_POLL_INTERVAL, Duration::from_millis);
    let table = Arc::new(AccessPoints::from_config(&config.access_points));
    AccessPointsUpdater::with_interval(table, Arc::clone(api.router()), events, interval)
}

/// Logs access point moves until the bus closes. Returns how many events were seen.
async fn log_access_point_events(mut rx: broadcast::Receiver<ConsulEvent>) -> usize {
    let mut seen = 0;
    loop {
        match rx.recv().await {
            Ok(event) => {
                seen += 1;
                if let ConsulEvent::AccessPointUpdated { point, .. } = event {
                    tracing::debug!("access point '{}' now at {:?}", point.id, point.url());
                }
            },
            Err(RecvError::Lagged(missed)) => {
                tracing::debug!("{} consul-sync event(s) missed", missed);
            },
            Err(RecvError::Closed) => return seen,
        }
    }
}

pub async fn run(
    config: &ConsulSyncConfig,
    api: Arc<ConsulApi>,
    events: EventBus,
    register_type: RegisterType,
    no_register: bool,
) -> Result<()> {
    let updater = build_updater(config, &api, events.clone());
    let watcher = tokio::spawn(log_access_point_events(events.subscribe()));

    if !no_register
        && api.cyclic().start(api.cyclic_options(register_type)) == StartOutcome::AlreadyRunning
    {
        tracing::warn!("Cyclic registration already running");
    }
    if !updater.table().is_empty() {
        updater.start();
    }
    tracing::info!("consul-sync running for '{}', press Ctrl-C to stop", api.service_id());

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutting down...");

    updater.stop();
    watcher.abort();
    if !no_register {
        api.cyclic().stop();
        if !api.deregister(None).await {
            anyhow::bail!("Failed to deregister '{}'", api.service_id());
        }
    }
    Ok(())
}

pub async fn register(api: &ConsulApi, register_type: RegisterType) -> Result<()> {
    let outcome = api.register_once(register_type).await?;
    if !outcome.is_registered() {
        anyhow::bail!("Service '{}' is NOT registered in Consul", api.service_id());
    }
    Ok(())
}

pub async fn deregister(api: &ConsulApi, id: Option<&str>) -> Result<()> {
    if !api.deregister(id).await {
        anyhow::bail!("Deregistration of '{}' failed", id.unwrap_or(api.service_id()));
    }
    Ok(())
}

pub async fn access_points(
    config: &ConsulSyncConfig,
    api: &ConsulApi,
    events: EventBus,
) -> Result<()> {
    let updater = build_updater(config, api, events);
    let updated = updater.update_all().await;
    tracing::info!("{} access point(s) updated", updated);
    println!("{}", serde_json::to_string_pretty(&updater.table().all())?);
    Ok(())
}
