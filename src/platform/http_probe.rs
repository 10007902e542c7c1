//! A reference `PublicIpv6Probe` implementation, built on `ureq` to query a
//! small ordered list of HTTP endpoints for this host's public IPv6 address.
//! The core consumes the `PublicIpv6Probe` capability and never speaks HTTP
//! itself; this module is a default caller can wire in, the same way
//! `SystemTunDevice` is a default `TunDevice`.

use crate::discovery::{PublicIpv6Probe, DEFAULT_IPV6_PROBE_ENDPOINTS};
use async_trait::async_trait;
use std::net::Ipv6Addr;
use std::time::Duration;

const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Queries `DEFAULT_IPV6_PROBE_ENDPOINTS` in order; the first endpoint that
/// returns a parseable IPv6 address wins.
pub struct HttpIpv6Probe {
    endpoints: Vec<String>,
}

impl HttpIpv6Probe {
    pub fn new() -> Self {
        Self {
            endpoints: DEFAULT_IPV6_PROBE_ENDPOINTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    /// Overrides the default endpoint list.
    pub fn with_endpoints(endpoints: Vec<String>) -> Self {
        Self { endpoints }
    }

    fn fetch(url: &str) -> Option<String> {
        let response = ureq::get(url).timeout(HTTP_TIMEOUT).call().ok()?;
        let body = response.into_string().ok()?;
        let candidate = body.trim();
        candidate.parse::<Ipv6Addr>().ok()?;
        Some(candidate.to_string())
    }
}

impl Default for HttpIpv6Probe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PublicIpv6Probe for HttpIpv6Probe {
    async fn probe(&self) -> Option<String> {
        for endpoint in &self.endpoints {
            let endpoint = endpoint.clone();
            match tokio::task::spawn_blocking(move || Self::fetch(&endpoint)).await {
                Ok(Some(ip)) => return Some(ip),
                Ok(None) => continue,
                Err(e) => {
                    tracing::debug!("ipv6 probe task panicked: {}", e);
                    continue;
                }
            }
        }
        None
    }
}
