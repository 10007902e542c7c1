//! Periodically refreshes the IPv6 address this client advertises to peers.
//!
//! The core never speaks HTTP itself — per the capability boundary, it
//! consumes whatever implements `PublicIpv6Probe`. A documented default
//! endpoint list is provided for a host-side implementation to query.

use crate::peer::PeerTable;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A source of this client's current public IPv6 address. Implementations
/// typically query one or more HTTP endpoints; the core is agnostic to how.
#[async_trait]
pub trait PublicIpv6Probe: Send + Sync {
    /// Returns the discovered address, or `None` if no source answered.
    async fn probe(&self) -> Option<String>;
}

/// A documented default endpoint list, queried in order, for host-side
/// `PublicIpv6Probe` implementations. Not used by the core itself.
pub const DEFAULT_IPV6_PROBE_ENDPOINTS: [&str; 3] = [
    "https://api64.ipify.org",
    "https://ifconfig.co",
    "https://ipv6.icanhazip.com",
];

/// How often the discoverer re-probes after its initial run.
const REFRESH_INTERVAL: Duration = Duration::from_secs(300);

/// Runs `probe` immediately and then on `REFRESH_INTERVAL`, writing any
/// newly discovered and valid address into the shared peer table's
/// self-advertisement.
pub struct Discoverer {
    probe: Arc<dyn PublicIpv6Probe>,
    peers: Arc<PeerTable>,
    cancel: CancellationToken,
}

impl Discoverer {
    pub fn new(probe: Arc<dyn PublicIpv6Probe>, peers: Arc<PeerTable>) -> Arc<Self> {
        Arc::new(Self {
            probe,
            peers,
            cancel: CancellationToken::new(),
        })
    }

    pub fn spawn(self: &Arc<Self>) {
        let this = self.clone();
        tokio::spawn(async move { this.run().await });
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    async fn run(&self) {
        self.run_once().await;
        let mut ticker = tokio::time::interval(REFRESH_INTERVAL);
        ticker.tick().await; // consume the immediate first tick
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = ticker.tick() => self.run_once().await,
            }
        }
    }

    async fn run_once(&self) {
        match self.probe.probe().await {
            Some(ip) if is_valid_public_ipv6(&ip) => {
                tracing::info!("discovered public ipv6: {}", ip);
                self.peers.set_self_ipv6(ip);
            }
            Some(ip) => {
                tracing::debug!("rejecting discovered ipv6 candidate: {}", ip);
            }
            None => {
                // Soft failure: keep the last-known value (or empty) and
                // retry on the next cycle.
            }
        }
    }
}

/// Rejects addresses with no colon (not IPv6 at all), link-local (`fe80:`),
/// and loopback (`::1`).
fn is_valid_public_ipv6(addr: &str) -> bool {
    addr.contains(':') && !addr.starts_with("fe80:") && addr != "::1"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_link_local_and_loopback() {
        assert!(!is_valid_public_ipv6("fe80::1"));
        assert!(!is_valid_public_ipv6("::1"));
        assert!(!is_valid_public_ipv6("10.0.0.1"));
        assert!(is_valid_public_ipv6("2001:db8::1"));
    }
}
