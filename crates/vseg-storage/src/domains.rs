//! Candidate endpoint domains and reachability probing.

use std::time::{Duration, Instant};

use tokio::net::{lookup_host, TcpStream};
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::StorageConfig;

/// Which endpoint family a candidate belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainKind {
    Accelerate,
    Regional,
    Backup,
    Custom,
}

/// An endpoint host to try, in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainCandidate {
    /// Host, optionally with an explicit `:port`
    pub hostname: String,
    /// Lower is tried first
    pub priority: u8,
    pub kind: DomainKind,
    /// Result of the last probe, if any
    pub reachable: Option<bool>,
}

impl DomainCandidate {
    pub fn new(hostname: impl Into<String>, priority: u8, kind: DomainKind) -> Self {
        Self {
            hostname: hostname.into(),
            priority,
            kind,
            reachable: None,
        }
    }
}

/// Build the ordered candidate list for a bucket.
pub fn candidate_domains(config: &StorageConfig) -> Vec<DomainCandidate> {
    if let Some(hosts) = config.domains_override.as_ref().filter(|h| !h.is_empty()) {
        return hosts
            .iter()
            .enumerate()
            .map(|(i, host)| DomainCandidate::new(host.clone(), i as u8, DomainKind::Custom))
            .collect();
    }

    let mut candidates = Vec::with_capacity(3);
    if config.accelerate {
        candidates.push(DomainCandidate::new(
            format!("{}.cos.accelerate.myqcloud.com", config.bucket),
            0,
            DomainKind::Accelerate,
        ));
    }
    candidates.push(DomainCandidate::new(config.regional_host(), 1, DomainKind::Regional));
    candidates.push(DomainCandidate::new(
        format!("{}.cos.{}.tencentcos.cn", config.bucket, config.region),
        2,
        DomainKind::Backup,
    ));
    candidates
}

fn socket_target(host: &str, default_port: u16) -> String {
    if host.rsplit_once(':').is_some_and(|(_, port)| port.parse::<u16>().is_ok()) {
        host.to_string()
    } else {
        format!("{}:{}", host, default_port)
    }
}

/// Resolve the host and open a TCP connection within `timeout`.
pub async fn probe_host(host: &str, default_port: u16, timeout: Duration) -> bool {
    let target = socket_target(host, default_port);
    let attempt = async {
        let addrs = lookup_host(target.as_str()).await?;
        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(_) => return Ok(true),
                Err(e) => last_err = Some(e),
            }
        }
        match last_err {
            Some(e) => Err(e),
            None => Ok(false),
        }
    };

    match tokio::time::timeout(timeout, attempt).await {
        Ok(Ok(reachable)) => reachable,
        Ok(Err(e)) => {
            debug!(domain = %host, "Domain probe failed: {}", e);
            false
        }
        Err(_) => {
            debug!(domain = %host, "Domain probe timed out");
            false
        }
    }
}

/// Chooses which domains a transfer walks, caching probe results.
///
/// Probe results are hints: a cached entry may be stale, and a domain that
/// probed fine can still fail the transfer itself.
#[derive(Debug)]
pub struct DomainSelector {
    candidates: Vec<DomainCandidate>,
    probe: bool,
    default_port: u16,
    probe_timeout: Duration,
    ttl: Duration,
    cache: RwLock<Option<(Instant, Vec<DomainCandidate>)>>,
}

impl DomainSelector {
    pub fn new(config: &StorageConfig) -> Self {
        let mut candidates = candidate_domains(config);
        candidates.sort_by_key(|c| c.priority);
        Self {
            candidates,
            probe: config.probe_domains,
            default_port: config.default_port(),
            probe_timeout: config.probe_timeout,
            ttl: config.domain_cache_ttl,
            cache: RwLock::new(None),
        }
    }

    pub fn candidates(&self) -> &[DomainCandidate] {
        &self.candidates
    }

    /// Domains to use for the next transfer, in priority order.
    ///
    /// Falls back to the full candidate list when nothing answers the probe.
    pub async fn usable(&self) -> Vec<DomainCandidate> {
        if !self.probe {
            return self.candidates.clone();
        }

        if let Some((at, cached)) = self.cache.read().await.as_ref() {
            if at.elapsed() < self.ttl {
                return cached.clone();
            }
        }

        let probed = self.probe_all().await;
        let reachable: Vec<DomainCandidate> = probed
            .iter()
            .filter(|c| c.reachable == Some(true))
            .cloned()
            .collect();

        let usable = if reachable.is_empty() {
            warn!("No storage domain answered the probe, trying all candidates");
            probed
        } else {
            info!(
                domains = ?reachable.iter().map(|c| c.hostname.as_str()).collect::<Vec<_>>(),
                "Reachable storage domains"
            );
            reachable
        };

        *self.cache.write().await = Some((Instant::now(), usable.clone()));
        usable
    }

    /// Drop cached probe results so the next transfer re-probes.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    async fn probe_all(&self) -> Vec<DomainCandidate> {
        let mut set = JoinSet::new();
        for (index, candidate) in self.candidates.iter().enumerate() {
            let host = candidate.hostname.clone();
            let port = self.default_port;
            let timeout = self.probe_timeout;
            set.spawn(async move { (index, probe_host(&host, port, timeout).await) });
        }

        let mut probed = self.candidates.clone();
        while let Some(joined) = set.join_next().await {
            if let Ok((index, reachable)) = joined {
                if let Some(candidate) = probed.get_mut(index) {
                    candidate.reachable = Some(reachable);
                }
            }
        }
        probed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::Credential;

    fn config() -> StorageConfig {
        StorageConfig::new(Credential::new("id", "key").unwrap(), "media-1250000000", "ap-beijing")
    }

    #[test]
    fn test_candidates_without_acceleration() {
        let hosts: Vec<String> = candidate_domains(&config()).into_iter().map(|c| c.hostname).collect();
        assert_eq!(
            hosts,
            vec![
                "media-1250000000.cos.ap-beijing.myqcloud.com",
                "media-1250000000.cos.ap-beijing.tencentcos.cn",
            ]
        );
    }

    #[test]
    fn test_acceleration_goes_first() {
        let mut cfg = config();
        cfg.accelerate = true;
        let candidates = candidate_domains(&cfg);
        assert_eq!(candidates[0].kind, DomainKind::Accelerate);
        assert_eq!(candidates[0].hostname, "media-1250000000.cos.accelerate.myqcloud.com");
        assert_eq!(candidates.len(), 3);
    }

    #[test]
    fn test_override_replaces_candidates() {
        let mut cfg = config();
        cfg.domains_override = Some(vec!["127.0.0.1:9000".into(), "localhost:9000".into()]);
        let candidates = candidate_domains(&cfg);
        assert_eq!(candidates.len(), 2);
        assert!(candidates.iter().all(|c| c.kind == DomainKind::Custom));
    }

    #[test]
    fn test_socket_target() {
        assert_eq!(socket_target("example.com", 443), "example.com:443");
        assert_eq!(socket_target("127.0.0.1:9000", 443), "127.0.0.1:9000");
    }

    #[tokio::test]
    async fn test_probe_reaches_local_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        assert!(probe_host(&addr, 80, Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_unreachable_falls_back_to_all() {
        let mut cfg = config();
        // Port 1 on loopback is closed on any sane test host.
        cfg.domains_override = Some(vec!["127.0.0.1:1".into()]);
        cfg.probe_timeout = Duration::from_millis(500);
        let selector = DomainSelector::new(&cfg);
        let usable = selector.usable().await;
        assert_eq!(usable.len(), 1);
        assert_eq!(usable[0].reachable, Some(false));
    }
}
