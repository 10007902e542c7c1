//! Derives the routed CIDR set from the peer roster and pushes it to the
//! virtual interface only when it actually changed.

use crate::peer::PeerTable;
use crate::platform::TunDevice;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;

/// The tunnel's assigned address plus the CIDRs currently routed through it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSettings {
    pub local_ip: String,
    pub mask: String,
    pub gateway: String,
    pub cidrs: BTreeSet<String>,
}

/// Converts a subnet mask that may be given as dotted-decimal or as a
/// prefix length into dotted-decimal form.
pub fn normalize_mask(mask: &str) -> crate::Result<String> {
    if mask.contains('.') {
        return Ok(mask.to_string());
    }
    let prefix_len: u8 = mask
        .parse()
        .map_err(|_| format!("mask is neither dotted-decimal nor a prefix length: {}", mask))?;
    prefix_to_netmask(prefix_len)
}

/// Converts a CIDR prefix length (0-32) to its dotted-decimal netmask.
pub fn prefix_to_netmask(prefix_len: u8) -> crate::Result<String> {
    if prefix_len > 32 {
        return Err("invalid prefix length: must be 0-32".into());
    }
    let mask_int: u32 = if prefix_len == 0 { 0 } else { (!0u32) << (32 - prefix_len) };
    let octets = mask_int.to_be_bytes();
    Ok(format!("{}.{}.{}.{}", octets[0], octets[1], octets[2], octets[3]))
}

/// Watches the peer roster and reconciles the tunnel's routed CIDR set.
/// The first `HandshakeReply` fixes `local_ip`/`mask`/`gateway`; every
/// subsequent call recomputes `cidrs` from the roster and only calls
/// `TunDevice::apply_network_settings` when the set actually differs from
/// what was last applied.
pub struct RouteManager {
    peers: Arc<PeerTable>,
    tun: Arc<dyn TunDevice>,
    last_applied: Mutex<Option<NetworkSettings>>,
}

impl RouteManager {
    pub fn new(peers: Arc<PeerTable>, tun: Arc<dyn TunDevice>) -> Self {
        Self {
            peers,
            tun,
            last_applied: Mutex::new(None),
        }
    }

    /// Called with the fields from a `HandshakeReply`. Only the first call
    /// establishes the base network settings and applies them
    /// unconditionally; `local_ip`/`mask`/`gateway` are assigned once and
    /// every later `HandshakeReply` (e.g. after a reconnect builds a fresh
    /// session) falls through to the same diff-and-skip-if-unchanged
    /// behavior `reconcile` uses for CIDRs.
    pub async fn initialize(&self, local_ip: String, mask: String, gateway: String) -> crate::Result<()> {
        // Held across the apply call: route updates are serialized, never
        // concurrent, per the one-at-a-time contract on TunDevice.
        let mut last_applied = self.last_applied.lock().await;
        if last_applied.is_some() {
            return self.reconcile_locked(&mut last_applied).await;
        }

        let mask = normalize_mask(&mask)?;
        let cidrs = self.peers.all_cidrs();
        let settings = NetworkSettings {
            local_ip,
            mask,
            gateway,
            cidrs,
        };
        self.tun.apply_network_settings(&settings).await?;
        *last_applied = Some(settings);
        Ok(())
    }

    /// Recomputes `cidrs` from the current roster and applies only if the
    /// set changed since the last apply.
    pub async fn reconcile(&self) -> crate::Result<()> {
        let mut last_applied = self.last_applied.lock().await;
        self.reconcile_locked(&mut last_applied).await
    }

    /// Shared by `reconcile` and by every `initialize` call after the first:
    /// recomputes `cidrs` against the already-held `last_applied` guard and
    /// applies only if the set changed.
    async fn reconcile_locked(&self, last_applied: &mut Option<NetworkSettings>) -> crate::Result<()> {
        let cidrs = self.peers.all_cidrs();
        let Some(mut settings) = last_applied.clone() else {
            // No base settings yet: nothing to reconcile against until the
            // first HandshakeReply calls `initialize`.
            return Ok(());
        };
        if settings.cidrs == cidrs {
            return Ok(());
        }
        settings.cidrs = cidrs;
        self.tun.apply_network_settings(&settings).await?;
        *last_applied = Some(settings);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PeerDetail;
    use crate::peer::PeerTable;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn normalizes_prefix_length() {
        assert_eq!(normalize_mask("24").unwrap(), "255.255.255.0");
        assert_eq!(normalize_mask("255.255.255.0").unwrap(), "255.255.255.0");
        assert_eq!(normalize_mask("0").unwrap(), "0.0.0.0");
        assert_eq!(normalize_mask("32").unwrap(), "255.255.255.255");
    }

    #[test]
    fn rejects_bad_mask() {
        assert!(normalize_mask("not-a-mask").is_err());
    }

    #[derive(Default)]
    struct CountingTun {
        applies: AtomicUsize,
    }

    #[async_trait]
    impl TunDevice for CountingTun {
        async fn read_packet(&self) -> crate::Result<Vec<u8>> {
            unreachable!("not exercised by these tests")
        }

        async fn write_packet(&self, _packet: &[u8]) -> crate::Result<()> {
            unreachable!("not exercised by these tests")
        }

        async fn apply_network_settings(&self, _settings: &NetworkSettings) -> crate::Result<()> {
            self.applies.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    fn peer_detail(identity: &str, cidr: &str) -> PeerDetail {
        PeerDetail {
            identity: identity.to_string(),
            private_ip: "10.0.0.5".to_string(),
            ciders: vec![cidr.to_string()],
            ipv6: String::new(),
            port: 0,
            stun_ip: String::new(),
            stun_port: 0,
            last_active: 0,
        }
    }

    #[tokio::test]
    async fn second_handshake_reply_does_not_reapply_unchanged_settings() {
        let peers = Arc::new(PeerTable::new());
        let tun = Arc::new(CountingTun::default());
        let route = RouteManager::new(peers, tun.clone());

        route
            .initialize("10.0.0.2".to_string(), "24".to_string(), "10.0.0.1".to_string())
            .await
            .unwrap();
        assert_eq!(tun.applies.load(Ordering::Relaxed), 1);

        // A reconnect produces a fresh HandshakeReply with the same base
        // fields and no roster change; this must not trigger a re-apply.
        route
            .initialize("10.0.0.2".to_string(), "24".to_string(), "10.0.0.1".to_string())
            .await
            .unwrap();
        assert_eq!(tun.applies.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn second_handshake_reply_still_picks_up_roster_changes() {
        let peers = Arc::new(PeerTable::new());
        let tun = Arc::new(CountingTun::default());
        let route = RouteManager::new(peers.clone(), tun.clone());

        route
            .initialize("10.0.0.2".to_string(), "24".to_string(), "10.0.0.1".to_string())
            .await
            .unwrap();
        assert_eq!(tun.applies.load(Ordering::Relaxed), 1);

        peers.rewrite(vec![peer_detail("p2", "10.0.1.0/24")]);
        route
            .initialize("10.0.0.2".to_string(), "24".to_string(), "10.0.0.1".to_string())
            .await
            .unwrap();
        assert_eq!(tun.applies.load(Ordering::Relaxed), 2);
    }
}
