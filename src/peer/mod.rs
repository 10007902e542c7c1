//! Peer table: the authoritative roster and its per-peer reachability state.

use crate::codec::frame::PeerDetail;
use ipnet::IpNet;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddrV6};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A peer is considered reachable over P2P if a frame arrived from it within
/// this window.
pub const ACTIVE_THRESHOLD: Duration = Duration::from_secs(15);

/// One peer in the roster, with its reachability state.
#[derive(Debug, Clone)]
pub struct PeerEntry {
    pub identity: String,
    pub private_ip: String,
    /// CIDR ranges this peer serves as next-hop, in wire (string) form; a
    /// roster must not advertise overlapping CIDRs.
    pub cidrs: Vec<String>,
    pub ipv6: String,
    pub udp_port: u16,
    pub stun_ip: String,
    pub stun_port: u16,
    /// Set when any valid frame from this peer is received over UDP. `None`
    /// means P2P has not been proved alive.
    pub last_rx: Option<Instant>,
    pub last_remote_addr: Option<SocketAddrV6>,
}

impl PeerEntry {
    fn from_detail(detail: PeerDetail) -> Self {
        Self {
            identity: detail.identity,
            private_ip: detail.private_ip,
            cidrs: detail.ciders,
            ipv6: detail.ipv6,
            udp_port: detail.port,
            stun_ip: detail.stun_ip,
            stun_port: detail.stun_port,
            last_rx: None,
            last_remote_addr: None,
        }
    }

    /// True iff this peer is currently eligible for P2P delivery: liveness
    /// proved within `ACTIVE_THRESHOLD` and a usable advertised address.
    pub fn is_p2p_eligible(&self) -> bool {
        let active = match self.last_rx {
            Some(t) => t.elapsed() <= ACTIVE_THRESHOLD,
            None => false,
        };
        active && !self.ipv6.is_empty() && self.udp_port > 0
    }
}

/// This client's own advertised reachability, written by the public-IPv6
/// discoverer and read by the control session's keepalive task.
#[derive(Debug, Clone, Default)]
pub struct SelfAdvertisement {
    pub ipv6: String,
    pub udp_port: u16,
    pub stun_ip: String,
    pub stun_port: u16,
}

/// Thread-safe roster, keyed by identity. All operations take the single
/// internal mutex only for the duration of the map mutation — never across
/// an I/O suspension point.
pub struct PeerTable {
    peers: Mutex<HashMap<String, PeerEntry>>,
    self_advertisement: Mutex<SelfAdvertisement>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self {
            peers: Mutex::new(HashMap::new()),
            self_advertisement: Mutex::new(SelfAdvertisement::default()),
        }
    }

    /// Atomically replaces the whole table. Used when a `HandshakeReply`
    /// defines the authoritative roster.
    pub fn rewrite(&self, entries: Vec<PeerDetail>) {
        let mut map = HashMap::with_capacity(entries.len());
        for detail in entries {
            let entry = PeerEntry::from_detail(detail);
            map.insert(entry.identity.clone(), entry);
        }
        *self.peers.lock().unwrap() = map;
    }

    /// Merges incoming entries by identity. An existing peer has its
    /// `cidrs`, `private_ip`, `stun_*`, and `udp_port` overwritten; `ipv6`
    /// is updated only when the incoming value is non-empty and different,
    /// in which case liveness is reset (the old path is presumed dead). A
    /// new identity is inserted with no proved liveness.
    pub fn upsert(&self, entries: Vec<PeerDetail>) {
        let mut map = self.peers.lock().unwrap();
        for detail in entries {
            match map.get_mut(&detail.identity) {
                Some(existing) => {
                    existing.private_ip = detail.private_ip;
                    existing.cidrs = detail.ciders;
                    existing.stun_ip = detail.stun_ip;
                    existing.stun_port = detail.stun_port;
                    existing.udp_port = detail.port;
                    if !detail.ipv6.is_empty() && detail.ipv6 != existing.ipv6 {
                        existing.ipv6 = detail.ipv6;
                        existing.last_rx = None;
                        existing.last_remote_addr = None;
                    }
                }
                None => {
                    map.insert(detail.identity.clone(), PeerEntry::from_detail(detail));
                }
            }
        }
    }

    /// Marks `identity` as freshly seen over UDP at `src`.
    pub fn on_probe_received(&self, identity: &str, src: SocketAddrV6) {
        let mut map = self.peers.lock().unwrap();
        if let Some(peer) = map.get_mut(identity) {
            peer.last_rx = Some(Instant::now());
            peer.last_remote_addr = Some(src);
        }
    }

    /// Finds the peer that should carry traffic to `ip`: an exact
    /// `private_ip` match wins; otherwise the first CIDR match in iteration
    /// order. Returns a clone so callers never hold the table lock across
    /// an I/O suspension.
    pub fn find_by_destination_ip(&self, ip: Ipv4Addr) -> Option<PeerEntry> {
        let map = self.peers.lock().unwrap();
        let ip_str = ip.to_string();
        if let Some(peer) = map.values().find(|p| p.private_ip == ip_str) {
            return Some(peer.clone());
        }
        let addr = IpAddr::V4(ip);
        map.values()
            .find(|p| {
                p.cidrs
                    .iter()
                    .any(|c| c.parse::<IpNet>().map(|n| n.contains(&addr)).unwrap_or(false))
            })
            .cloned()
    }

    /// True iff a frame from `identity` was received within `ACTIVE_THRESHOLD`.
    pub fn is_active(&self, identity: &str) -> bool {
        self.peers
            .lock()
            .unwrap()
            .get(identity)
            .map(|p| matches!(p.last_rx, Some(t) if t.elapsed() <= ACTIVE_THRESHOLD))
            .unwrap_or(false)
    }

    /// Snapshot of the full roster, for probing and observation.
    pub fn peers(&self) -> Vec<PeerEntry> {
        self.peers.lock().unwrap().values().cloned().collect()
    }

    /// The union of every peer's CIDR set, as used by the route manager.
    pub fn all_cidrs(&self) -> std::collections::BTreeSet<String> {
        self.peers
            .lock()
            .unwrap()
            .values()
            .flat_map(|p| p.cidrs.iter().cloned())
            .collect()
    }

    pub fn set_self_ipv6(&self, ipv6: String) {
        self.self_advertisement.lock().unwrap().ipv6 = ipv6;
    }

    pub fn set_self_udp_port(&self, port: u16) {
        self.self_advertisement.lock().unwrap().udp_port = port;
    }

    pub fn set_self_stun(&self, stun_ip: String, stun_port: u16) {
        let mut adv = self.self_advertisement.lock().unwrap();
        adv.stun_ip = stun_ip;
        adv.stun_port = stun_port;
    }

    pub fn self_advertisement(&self) -> SelfAdvertisement {
        self.self_advertisement.lock().unwrap().clone()
    }
}

impl Default for PeerTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail(identity: &str, ipv6: &str) -> PeerDetail {
        PeerDetail {
            identity: identity.to_string(),
            private_ip: "10.0.0.5".to_string(),
            ciders: vec!["10.0.1.0/24".to_string()],
            ipv6: ipv6.to_string(),
            port: 51820,
            stun_ip: String::new(),
            stun_port: 0,
            last_active: 0,
        }
    }

    #[test]
    fn rewrite_replaces_whole_table() {
        let table = PeerTable::new();
        table.rewrite(vec![detail("p1", "fd00::1")]);
        assert_eq!(table.peers().len(), 1);
        table.rewrite(vec![detail("p2", "fd00::2")]);
        let peers = table.peers();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].identity, "p2");
    }

    #[test]
    fn ipv6_change_resets_liveness() {
        let table = PeerTable::new();
        table.rewrite(vec![detail("p1", "fd00::1")]);
        table.on_probe_received("p1", "[fd00::1]:9".parse().unwrap());
        assert!(table.is_active("p1"));

        table.upsert(vec![detail("p1", "fd00::2")]);
        assert!(!table.is_active("p1"));
        let peers = table.peers();
        assert!(peers[0].last_rx.is_none());
    }

    #[test]
    fn active_threshold() {
        let table = PeerTable::new();
        table.rewrite(vec![detail("p1", "fd00::1")]);
        assert!(!table.is_active("p1"));
        table.on_probe_received("p1", "[fd00::1]:9".parse().unwrap());
        assert!(table.is_active("p1"));
    }

    #[test]
    fn find_by_destination_prefers_exact_match() {
        let table = PeerTable::new();
        let mut d1 = detail("p1", "fd00::1");
        d1.private_ip = "10.0.1.5".to_string();
        d1.ciders = vec!["10.0.0.0/8".to_string()];
        table.rewrite(vec![d1]);
        let found = table
            .find_by_destination_ip("10.0.1.5".parse().unwrap())
            .unwrap();
        assert_eq!(found.identity, "p1");
    }

    #[test]
    fn find_by_destination_falls_back_to_cidr() {
        let table = PeerTable::new();
        table.rewrite(vec![detail("p1", "fd00::1")]);
        let found = table
            .find_by_destination_ip("10.0.1.7".parse().unwrap())
            .unwrap();
        assert_eq!(found.identity, "p1");
        assert!(table
            .find_by_destination_ip("192.168.1.1".parse().unwrap())
            .is_none());
    }
}
