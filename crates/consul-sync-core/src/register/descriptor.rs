//! Builds the registration descriptor from configuration.

use consul_sync_types::{ConsulSyncConfig, RegisterCheck, RegisterDescriptor};
use std::collections::BTreeMap;

use crate::error::{ConsulError, ConsulResult};
use crate::utils::parse::{parse_meta, parse_tags, remove_around_quotas, substitute_percent_bracket};

pub const DEFAULT_CHECK_TIMEOUT: &str = "5s";
pub const DEFAULT_CHECK_INTERVAL: &str = "10s";
pub const DEFAULT_DEREGISTER_AFTER: &str = "3m";

/// `{prd|dev}-{projectId}{r|e}01-{name}-{instance}`, lower-cased.
pub fn service_id(name: &str, instance: &str, project_id: Option<&str>, production: bool) -> String {
    let (env, kind) = if production { ("prd", "r") } else { ("dev", "e") };
    format!("{}-{}{}01-{}-{}", env, project_id.unwrap_or_default(), kind, name, instance)
        .to_lowercase()
}

/// The override when configured, otherwise the derived id.
pub fn resolve_service_id(config: &ConsulSyncConfig) -> String {
    if let Some(id) = config.service_id_override.as_deref().filter(|id| !id.trim().is_empty()) {
        return id.trim().to_string();
    }
    let service = &config.consul.service;
    service_id(
        &remove_around_quotas(&service.name),
        &remove_around_quotas(&service.instance),
        config.project_id.as_deref(),
        config.production,
    )
}

/// Link to the service instances page of the registry UI.
pub fn consul_ui_address(config: &ConsulSyncConfig, service_id: &str) -> Option<String> {
    let host = config.consul_ui_host.as_deref().filter(|h| !h.is_empty())?;
    let env = if config.production { "prod" } else { "dev" };
    Some(format!("https://{}/ui/dc-{}/services/{}/instances", host, env, service_id))
}

/// Canonical descriptor of the local service.
///
/// The address is the configured service host, else `local_fqdn`. Fails with
/// a configuration error when neither the service nor the web server declares
/// a port, or when no address can be resolved.
pub fn build_register_descriptor(
    config: &ConsulSyncConfig,
    local_fqdn: Option<&str>,
) -> ConsulResult<RegisterDescriptor> {
    let service = &config.consul.service;
    let name = remove_around_quotas(&service.name);
    let instance = remove_around_quotas(&service.instance);
    let version = remove_around_quotas(&service.version);
    let description = remove_around_quotas(&service.description);
    let project_id = config.project_id.as_deref().filter(|p| !p.is_empty());

    let port = service
        .port
        .as_ref()
        .and_then(|p| p.as_port())
        .or_else(|| config.web_server.port.as_ref().and_then(|p| p.as_port()))
        .ok_or_else(|| ConsulError::missing("Port"))?;

    let address = service
        .host
        .as_deref()
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .or_else(|| local_fqdn.map(str::trim).filter(|h| !h.is_empty()))
        .map(String::from)
        .ok_or_else(|| ConsulError::missing("Address"))?;

    let id = resolve_service_id(config);

    let mut tags: Vec<String> =
        [name.clone(), version.clone()].into_iter().filter(|t| !t.is_empty()).collect();
    if let Some(raw) = &service.tags {
        tags.extend(parse_tags(raw));
    }
    if let Some(project_id) = project_id {
        tags.push(project_id.to_string());
    }

    let mut meta = BTreeMap::new();
    meta.insert("host".to_string(), address.clone());
    meta.insert("port".to_string(), port.to_string());
    let node_env = if config.production { "production" } else { "development" };
    meta.insert("NODE_ENV".to_string(), node_env.to_string());
    for (key, value) in [
        ("name", &name),
        ("version", &version),
        ("description", &description),
        ("instance", &instance),
    ] {
        if !value.is_empty() {
            meta.insert(key.to_string(), value.clone());
        }
    }
    meta.insert("pkg_name".to_string(), env!("CARGO_PKG_NAME").to_string());
    meta.insert("pkg_version".to_string(), env!("CARGO_PKG_VERSION").to_string());

    if let Some(raw) = &service.meta {
        let placeholders = BTreeMap::from([
            ("serviceId", id.clone()),
            ("name", name.clone()),
            ("instance", instance.clone()),
            ("address", address.clone()),
            ("port", port.to_string()),
        ]);
        for (key, value) in parse_meta(raw) {
            meta.insert(key, substitute_percent_bracket(&value, &placeholders));
        }
    }

    let check = build_check(config.consul.check.as_ref(), &name, &instance, &address, port);

    Ok(RegisterDescriptor { id: id.clone(), name: id, address, port, tags, meta, check: Some(check) })
}

fn build_check(
    configured: Option<&RegisterCheck>,
    name: &str,
    instance: &str,
    address: &str,
    port: u16,
) -> RegisterCheck {
    let mut check = configured.cloned().unwrap_or_default();
    fill(&mut check.name, || format!("Service '{}-{}'", name, instance));
    fill(&mut check.timeout, || DEFAULT_CHECK_TIMEOUT.to_string());
    fill(&mut check.deregister_critical_service_after, || DEFAULT_DEREGISTER_AFTER.to_string());
    if !check.has_target() {
        check.http = Some(format!("http://{}:{}/health", address, port));
    }
    if check.http.is_some() || check.script.is_some() {
        fill(&mut check.interval, || DEFAULT_CHECK_INTERVAL.to_string());
    }
    check
}

fn fill(slot: &mut Option<String>, default: impl FnOnce() -> String) {
    if slot.as_deref().map_or(true, str::is_empty) {
        *slot = Some(default());
    }
}
