//! Fully qualified host names via forward and reverse DNS lookups.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::net::IpAddr;

/// Maps a host name or address to its fully qualified name.
#[async_trait]
pub trait HostResolver: Send + Sync {
    /// FQDN of `host`, or of the local machine when `host` is `None`.
    async fn fqdn(&self, host: Option<&str>) -> Option<String>;
}

/// [`HostResolver`] backed by the system resolver.
///
/// Successful lookups are memoized for the life of the resolver; failures
/// are retried on the next call.
#[derive(Default)]
pub struct DnsResolver {
    cache: Mutex<HashMap<String, String>>,
}

impl DnsResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cached(&self) -> usize {
        self.cache.lock().len()
    }
}

#[async_trait]
impl HostResolver for DnsResolver {
    async fn fqdn(&self, host: Option<&str>) -> Option<String> {
        let host = match host.map(str::trim).filter(|h| !h.is_empty()) {
            Some(h) => h.to_string(),
            None => local_hostname()?,
        };
        if let Some(name) = self.cache.lock().get(&host) {
            return Some(name.clone());
        }

        match lookup_fqdn(&host).await {
            Ok(name) => {
                self.cache.lock().insert(host, name.clone());
                Some(name)
            },
            Err(e) => {
                tracing::debug!("fqdn lookup for '{}' failed: {}", host, e);
                None
            },
        }
    }
}

async fn lookup_fqdn(host: &str) -> io::Result<String> {
    let ip: IpAddr = tokio::net::lookup_host((host, 0))
        .await?
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no address"))?;
    tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&ip))
        .await
        .map_err(io::Error::other)?
}

/// Short host name of this machine.
pub fn local_hostname() -> Option<String> {
    hostname::get()
        .ok()
        .map(|h| h.to_string_lossy().into_owned())
        .filter(|h| !h.is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_loopback_lookup_is_cached() {
        let resolver = DnsResolver::new();
        let first = resolver.fqdn(Some("127.0.0.1")).await;
        assert!(first.is_some());
        let second = resolver.fqdn(Some(" 127.0.0.1 ")).await;
        assert_eq!(first, second);
        assert_eq!(resolver.cached(), 1);
    }

    #[tokio::test]
    async fn test_unresolvable_host_is_not_cached() {
        let resolver = DnsResolver::new();
        assert!(resolver.fqdn(Some("no-such-host.invalid")).await.is_none());
        assert_eq!(resolver.cached(), 0);
    }
}
