use async_trait::async_trait;
use consul_sync_types::{
    AgentMember, AgentOptions, ConfigError, HealthQuery, HealthServiceEntry, RegisterCheck,
    RegisterDescriptor, RegistryError, ServiceInfo,
};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::{AgentClient, AgentConnector};
use crate::error::ConsulResult;

const TOKEN_HEADER: &str = "X-Consul-Token";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Correlates request and response trace lines across all handles.
static REQUEST_SEQ: AtomicU64 = AtomicU64::new(0);

/// [`AgentClient`] over the agent HTTP API.
pub struct HttpAgentClient {
    client: Client,
    options: AgentOptions,
    base: Url,
}

impl HttpAgentClient {
    pub fn new(options: AgentOptions) -> ConsulResult<Self> {
        Self::with_timeout(options, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(options: AgentOptions, timeout: Duration) -> ConsulResult<Self> {
        let base = Url::parse(&options.base_url()).map_err(|e| {
            ConfigError::invalid(format!("consul.agent.{}.host", options.agent_type), e.to_string())
        })?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, options, base })
    }

    fn url(&self, call: &str, segments: &[&str]) -> Result<Url, RegistryError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| RegistryError::Transport {
                call: call.to_string(),
                message: format!("cannot build a path on {}", self.base),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Sends the request and traces it.
    ///
    /// Statuses in `skip_codes` are expected answers (e.g. 404 on lookups)
    /// and yield `Ok(None)` without an error log.
    async fn send(
        &self,
        call: &str,
        request: RequestBuilder,
        skip_codes: &[u16],
    ) -> Result<Option<Response>, RegistryError> {
        let seq = REQUEST_SEQ.fetch_add(1, Ordering::Relaxed) + 1;
        let request = match &self.options.token {
            Some(token) => request.header(TOKEN_HEADER, token),
            None => request,
        };
        tracing::debug!("[{}] consul.{} -> agent '{}' {}", seq, call, self.options.agent_type, self.base);

        let response = request.send().await.map_err(|e| RegistryError::Transport {
            call: call.to_string(),
            message: e.to_string(),
        })?;
        let status = response.status().as_u16();
        tracing::debug!("[{}] HTTP Status: {}", seq, status);

        if status < 300 {
            return Ok(Some(response));
        }
        if skip_codes.contains(&status) {
            return Ok(None);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::error!("[{}] [consul.{}] ERROR: HTTP {} {}", seq, call, status, body);
        Err(RegistryError::Status { call: call.to_string(), status, body })
    }

    async fn decode<T: DeserializeOwned>(call: &str, response: Response) -> Result<T, RegistryError> {
        response.json::<T>().await.map_err(|e| RegistryError::Decode {
            call: call.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    fn options(&self) -> &AgentOptions {
        &self.options
    }

    async fn service_list(&self) -> Result<HashMap<String, ServiceInfo>, RegistryError> {
        const CALL: &str = "agent.service.list";
        let url = self.url(CALL, &["v1", "agent", "services"])?;
        match self.send(CALL, self.client.get(url), &[]).await? {
            Some(response) => Self::decode(CALL, response).await,
            None => Ok(HashMap::new()),
        }
    }

    async fn catalog_service_list(
        &self,
        datacenter: &str,
    ) -> Result<HashMap<String, Vec<String>>, RegistryError> {
        const CALL: &str = "catalog.service.list";
        let mut url = self.url(CALL, &["v1", "catalog", "services"])?;
        if !datacenter.is_empty() {
            url.query_pairs_mut().append_pair("dc", datacenter);
        }
        match self.send(CALL, self.client.get(url), &[]).await? {
            Some(response) => Self::decode(CALL, response).await,
            None => Ok(HashMap::new()),
        }
    }

    async fn agent_members(&self) -> Result<Vec<AgentMember>, RegistryError> {
        const CALL: &str = "agent.members";
        let url = self.url(CALL, &["v1", "agent", "members"])?;
        match self.send(CALL, self.client.get(url), &[]).await? {
            Some(response) => Self::decode(CALL, response).await,
            None => Ok(Vec::new()),
        }
    }

    async fn health_service(
        &self,
        query: &HealthQuery,
    ) -> Result<Vec<HealthServiceEntry>, RegistryError> {
        const CALL: &str = "health.service";
        let mut url = self.url(CALL, &["v1", "health", "service", &query.service])?;
        {
            let mut pairs = url.query_pairs_mut();
            if query.passing {
                pairs.append_pair("passing", "true");
            }
            if let Some(dc) = query.datacenter.as_deref().filter(|dc| !dc.is_empty()) {
                pairs.append_pair("dc", dc);
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        match self.send(CALL, self.client.get(url), &[404]).await? {
            Some(response) => Self::decode(CALL, response).await,
            None => Ok(Vec::new()),
        }
    }

    async fn register(&self, descriptor: &RegisterDescriptor) -> Result<(), RegistryError> {
        const CALL: &str = "agent.service.register";
        let url = self.url(CALL, &["v1", "agent", "service", "register"])?;
        let body = RegisterBody::from(descriptor);
        self.send(CALL, self.client.put(url).json(&body), &[]).await?;
        Ok(())
    }

    async fn deregister(&self, service_id: &str) -> Result<(), RegistryError> {
        const CALL: &str = "agent.service.deregister";
        let url = self.url(CALL, &["v1", "agent", "service", "deregister", service_id])?;
        self.send(CALL, self.client.put(url), &[]).await?;
        Ok(())
    }
}

/// Builds [`HttpAgentClient`] handles.
#[derive(Debug, Clone, Default)]
pub struct HttpConnector {
    timeout: Option<Duration>,
}

impl HttpConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout: Some(timeout) }
    }
}

impl AgentConnector for HttpConnector {
    fn connect(&self, options: &AgentOptions) -> ConsulResult<Arc<dyn AgentClient>> {
        let client = match self.timeout {
            Some(timeout) => HttpAgentClient::with_timeout(options.clone(), timeout)?,
            None => HttpAgentClient::new(options.clone())?,
        };
        Ok(Arc::new(client))
    }
}

// Wire shapes of the register call (agent expects PascalCase keys).

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct RegisterBody<'a> {
    #[serde(rename = "ID")]
    id: &'a str,
    name: &'a str,
    address: &'a str,
    port: u16,
    tags: &'a [String],
    meta: &'a BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    check: Option<CheckBody<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CheckBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(rename = "HTTP", skip_serializing_if = "Option::is_none")]
    http: Option<&'a str>,
    #[serde(rename = "TCP", skip_serializing_if = "Option::is_none")]
    tcp: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<Vec<&'a str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    shell: Option<&'a str>,
    #[serde(rename = "DockerContainerID", skip_serializing_if = "Option::is_none")]
    docker_container_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    interval: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deregister_critical_service_after: Option<&'a str>,
}

impl<'a> From<&'a RegisterDescriptor> for RegisterBody<'a> {
    fn from(d: &'a RegisterDescriptor) -> Self {
        Self {
            id: &d.id,
            name: &d.name,
            address: &d.address,
            port: d.port,
            tags: &d.tags,
            meta: &d.meta,
            check: d.check.as_ref().map(CheckBody::from),
        }
    }
}

impl<'a> From<&'a RegisterCheck> for CheckBody<'a> {
    fn from(c: &'a RegisterCheck) -> Self {
        Self {
            name: c.name.as_deref(),
            http: c.http.as_deref(),
            tcp: c.tcp.as_deref(),
            args: c.script.as_deref().map(|s| s.split_whitespace().collect()),
            shell: c.shell.as_deref(),
            docker_container_id: c.docker_container_id.as_deref(),
            interval: c.interval.as_deref(),
            timeout: c.timeout.as_deref(),
            deregister_critical_service_after: c.deregister_critical_service_after.as_deref(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_register_body_shape() {
        let descriptor = RegisterDescriptor {
            id: "dev-e01-api-1".into(),
            name: "dev-e01-api-1".into(),
            address: "10.0.0.1".into(),
            port: 8080,
            tags: vec!["api".into()],
            meta: BTreeMap::from([("host".to_string(), "10.0.0.1".to_string())]),
            check: Some(RegisterCheck {
                http: Some("http://10.0.0.1:8080/health".into()),
                interval: Some("10s".into()),
                deregister_critical_service_after: Some("3m".into()),
                ..RegisterCheck::default()
            }),
        };
        let body = serde_json::to_value(RegisterBody::from(&descriptor)).unwrap();
        assert_eq!(body["ID"], json!("dev-e01-api-1"));
        assert_eq!(body["Port"], json!(8080));
        assert_eq!(body["Meta"]["host"], json!("10.0.0.1"));
        assert_eq!(body["Check"]["HTTP"], json!("http://10.0.0.1:8080/health"));
        assert_eq!(body["Check"]["DeregisterCriticalServiceAfter"], json!("3m"));
        assert!(body["Check"].get("TCP").is_none());
    }

    #[test]
    fn test_url_escapes_segments() {
        let client = HttpAgentClient::new(AgentOptions::new("reg", "consul.local", 8500)).unwrap();
        let url = client.url("t", &["v1", "agent", "service", "deregister", "a b/c"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://consul.local:8500/v1/agent/service/deregister/a%20b%2Fc"
        );
    }

    #[test]
    fn test_invalid_host_is_config_error() {
        let result = HttpAgentClient::new(AgentOptions::new("dev", "bad host", 8500));
        assert!(matches!(result, Err(e) if e.is_config()));
    }
}
