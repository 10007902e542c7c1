//! Atomic traffic counters and the read-only snapshot handed to the host's
//! observation interface.

use crate::peer::PeerTable;
use crate::session::SessionState;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// One peer's observed reachability, as reported to the host. `is_p2p` is
/// computed at read time; it is never stored in the peer entry itself.
#[derive(Debug, Clone)]
pub struct PeerSnapshot {
    pub identity: String,
    pub private_ip: String,
    pub cidrs: Vec<String>,
    pub is_p2p: bool,
}

/// Read-only view of the engine's state, counters, and roster at one instant.
#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    pub state: SessionState,
    pub virtual_ip: String,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub p2p_sent: u64,
    pub relay_sent: u64,
    pub dropped_packets: u64,
    pub connect_time: Option<Instant>,
    pub peers: Vec<PeerSnapshot>,
}

/// Atomic counters plus the bits of mutable state (session state, assigned
/// IP, connect time) a snapshot needs but that don't belong in `PeerTable`.
pub struct Stats {
    peers: Arc<PeerTable>,
    rx_bytes: AtomicU64,
    tx_bytes: AtomicU64,
    rx_packets: AtomicU64,
    tx_packets: AtomicU64,
    p2p_sent: AtomicU64,
    relay_sent: AtomicU64,
    dropped_packets: AtomicU64,
    state: Mutex<SessionState>,
    virtual_ip: Mutex<String>,
    connect_time: Mutex<Option<Instant>>,
}

impl Stats {
    pub fn new(peers: Arc<PeerTable>) -> Arc<Self> {
        Arc::new(Self {
            peers,
            rx_bytes: AtomicU64::new(0),
            tx_bytes: AtomicU64::new(0),
            rx_packets: AtomicU64::new(0),
            tx_packets: AtomicU64::new(0),
            p2p_sent: AtomicU64::new(0),
            relay_sent: AtomicU64::new(0),
            dropped_packets: AtomicU64::new(0),
            state: Mutex::new(SessionState::Initialize),
            virtual_ip: Mutex::new(String::new()),
            connect_time: Mutex::new(None),
        })
    }

    /// Records a `Data` frame delivered into the virtual interface.
    pub fn record_rx(&self, bytes: usize) {
        self.tx_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
        self.tx_packets.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an outbound packet sent over the P2P path.
    pub fn record_p2p_sent(&self, bytes: usize) {
        self.rx_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
        self.rx_packets.fetch_add(1, Ordering::Relaxed);
        self.p2p_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an outbound packet sent over the relay (TCP control) path.
    pub fn record_relay_sent(&self, bytes: usize) {
        self.rx_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
        self.rx_packets.fetch_add(1, Ordering::Relaxed);
        self.relay_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a packet dropped by the dispatcher (malformed header, no
    /// route, or a failed relay send).
    pub fn record_dropped(&self) {
        self.dropped_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_state(&self, state: SessionState) {
        *self.state.lock().unwrap() = state;
        if state == SessionState::Connected {
            let mut ct = self.connect_time.lock().unwrap();
            if ct.is_none() {
                *ct = Some(Instant::now());
            }
        }
    }

    pub fn set_virtual_ip(&self, ip: String) {
        *self.virtual_ip.lock().unwrap() = ip;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let peers = self
            .peers
            .peers()
            .into_iter()
            .map(|p| PeerSnapshot {
                identity: p.identity.clone(),
                private_ip: p.private_ip.clone(),
                cidrs: p.cidrs.clone(),
                is_p2p: p.is_p2p_eligible(),
            })
            .collect();

        StatsSnapshot {
            state: *self.state.lock().unwrap(),
            virtual_ip: self.virtual_ip.lock().unwrap().clone(),
            rx_bytes: self.rx_bytes.load(Ordering::Relaxed),
            tx_bytes: self.tx_bytes.load(Ordering::Relaxed),
            rx_packets: self.rx_packets.load(Ordering::Relaxed),
            tx_packets: self.tx_packets.load(Ordering::Relaxed),
            p2p_sent: self.p2p_sent.load(Ordering::Relaxed),
            relay_sent: self.relay_sent.load(Ordering::Relaxed),
            dropped_packets: self.dropped_packets.load(Ordering::Relaxed),
            connect_time: *self.connect_time.lock().unwrap(),
            peers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = Stats::new(Arc::new(PeerTable::new()));
        stats.record_rx(100);
        stats.record_p2p_sent(50);
        stats.record_relay_sent(25);
        stats.record_dropped();

        let snap = stats.snapshot();
        assert_eq!(snap.tx_bytes, 100);
        assert_eq!(snap.tx_packets, 1);
        assert_eq!(snap.rx_bytes, 75);
        assert_eq!(snap.rx_packets, 2);
        assert_eq!(snap.p2p_sent, 1);
        assert_eq!(snap.relay_sent, 1);
        assert_eq!(snap.dropped_packets, 1);
    }

    #[test]
    fn connect_time_set_once() {
        let stats = Stats::new(Arc::new(PeerTable::new()));
        stats.set_state(SessionState::Connected);
        let first = stats.snapshot().connect_time;
        std::thread::sleep(std::time::Duration::from_millis(5));
        stats.set_state(SessionState::Connected);
        let second = stats.snapshot().connect_time;
        assert_eq!(first, second);
    }
}
