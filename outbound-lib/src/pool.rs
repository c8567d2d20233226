use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

use crate::config::host_config;
use crate::host::{Host, HostKey, HostStats, HostStatsMap};
use crate::types::Result;
use crate::{CircuitBreakerConfig, CircuitState, Clock, HostConfigs, RateLimitConfig};

/// Registry of per-host state.
///
/// Hosts are created lazily on their first request and live as long as the
/// pool. Cloning the pool is cheap and clones share the same hosts.
#[derive(Debug, Clone)]
pub(crate) struct HostPool {
    /// Map of host keys to Host instances, created on-demand
    hosts: Arc<DashMap<HostKey, Arc<Host>>>,

    /// Default rate limit for hosts without an override
    rate_limit: RateLimitConfig,

    circuit_breaker: CircuitBreakerConfig,

    /// Per-host configuration overrides
    host_configs: Arc<HostConfigs>,

    clock: Arc<dyn Clock>,
}

impl HostPool {
    pub(crate) fn new(
        rate_limit: RateLimitConfig,
        circuit_breaker: CircuitBreakerConfig,
        host_configs: HostConfigs,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            hosts: Arc::new(DashMap::new()),
            rate_limit,
            circuit_breaker,
            host_configs: Arc::new(host_configs),
            clock,
        }
    }

    /// The pool's time source
    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Get the host for a URL, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL has no host.
    pub(crate) fn get_or_create_host(&self, url: &Url) -> Result<Arc<Host>> {
        let key = HostKey::try_from(url)?;

        if let Some(host) = self.hosts.get(&key) {
            return Ok(host.clone());
        }

        // Concurrent first requests race here; the entry API keeps exactly one
        match self.hosts.entry(key) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let key = entry.key().clone();
                let overrides = host_config(&self.host_configs, &key)
                    .cloned()
                    .unwrap_or_default();
                log::debug!("Tracking new host {key}");
                let host = Arc::new(Host::new(
                    key,
                    overrides.effective_rate_limit(&self.rate_limit),
                    self.circuit_breaker,
                    overrides.headers,
                    self.clock.now(),
                ));
                Ok(entry.insert(host).value().clone())
            }
        }
    }

    /// Statistics for a host, empty if it was never contacted
    #[must_use]
    pub(crate) fn host_stats(&self, key: &HostKey) -> HostStats {
        self.hosts
            .get(key)
            .map(|host| host.stats())
            .unwrap_or_default()
    }

    /// Statistics for every host contacted so far
    #[must_use]
    pub(crate) fn all_host_stats(&self) -> HostStatsMap {
        self.hosts
            .iter()
            .map(|entry| (entry.key().to_string(), entry.value().stats()))
            .collect::<HashMap<_, _>>()
            .into()
    }

    /// Circuit state of a host, `None` if it was never contacted
    #[must_use]
    pub(crate) fn circuit_state(&self, key: &HostKey) -> Option<CircuitState> {
        self.hosts.get(key).map(|host| host.circuit_state())
    }

    /// Number of hosts contacted so far
    #[must_use]
    pub(crate) fn active_host_count(&self) -> usize {
        self.hosts.len()
    }
}
