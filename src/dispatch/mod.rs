//! Destination-driven packet dispatch: P2P-or-relay on the way out, a single
//! sink back to the virtual interface on the way in.

use crate::codec::frame::{DataFrame, HandshakeReplyFrame, KeepAliveFrame};
use crate::p2p::P2pService;
use crate::peer::PeerTable;
use crate::platform::TunDevice;
use crate::route::RouteManager;
use crate::session::{ReconnectSupervisor, SessionSink, SessionState};
use crate::stats::Stats;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::Notify;

/// The single point both transports (TCP control session, UDP P2P service)
/// deliver decoded `Data` frames into. One implementation writes the payload
/// to the virtual interface; tests can substitute a recording stub.
pub trait PacketSink: Send + Sync {
    fn on_data_frame(&self, frame: &DataFrame);
}

/// Errors surfaced by the dispatcher's outbound path. Never propagated past
/// `dispatch_outbound` — every variant results in the packet being dropped
/// and `Stats::record_dropped` being incremented; this type exists to give
/// the log line a name instead of an ad-hoc string.
#[derive(Debug)]
pub enum DispatchError {
    MalformedPacket,
    NoRoute,
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::MalformedPacket => "malformed outbound IP packet".fmt(f),
            DispatchError::NoRoute => "no peer or relay route for destination".fmt(f),
        }
    }
}

impl std::error::Error for DispatchError {}

/// Chooses P2P vs relay for outbound packets and writes inbound `Data`
/// payloads to the virtual interface. Stateless beyond the peer table: every
/// decision is O(peers + cidrs_per_peer).
///
/// `p2p` and `control` are filled in by `wire()` after construction: both of
/// them take this dispatcher as their inbound sink, so the three can't be
/// built in a single straight line. `OnceLock` breaks the cycle without
/// giving the dispatcher a mutable-after-construction API surface.
pub struct PacketDispatcher {
    peers: Arc<PeerTable>,
    p2p: OnceLock<Arc<P2pService>>,
    control: OnceLock<Arc<ReconnectSupervisor>>,
    route: Arc<RouteManager>,
    tun: Arc<dyn TunDevice>,
    stats: Arc<Stats>,
    /// Fires once the very first `HandshakeReply`'s route apply has
    /// completed. `Engine::start` awaits `wait_for_initial_route_apply`
    /// before starting the tun-reader loop so inbound/outbound dispatch
    /// never races route installation.
    route_ready: Arc<Notify>,
    route_ready_fired: Arc<AtomicBool>,
}

impl PacketDispatcher {
    pub fn new(
        peers: Arc<PeerTable>,
        route: Arc<RouteManager>,
        tun: Arc<dyn TunDevice>,
        stats: Arc<Stats>,
    ) -> Arc<Self> {
        Arc::new(Self {
            peers,
            p2p: OnceLock::new(),
            control: OnceLock::new(),
            route,
            tun,
            stats,
            route_ready: Arc::new(Notify::new()),
            route_ready_fired: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Supplies the P2P service and control supervisor once both have been
    /// constructed with this dispatcher as their sink. Must be called
    /// exactly once, before `dispatch_outbound` is used.
    pub fn wire(&self, p2p: Arc<P2pService>, control: Arc<ReconnectSupervisor>) {
        let _ = self.p2p.set(p2p);
        let _ = self.control.set(control);
    }

    /// Resolves once the first `HandshakeReply`'s route apply has completed
    /// (successfully or not). The virtual interface's tun-reader loop must
    /// not start before this returns, so outbound packets are never read off
    /// the interface before the routes that decide where they go exist.
    pub async fn wait_for_initial_route_apply(&self) {
        self.route_ready.notified().await;
    }

    /// Handles one IP packet read from the virtual interface: validates the
    /// header, looks up the destination's peer, and tries P2P before
    /// falling back to the relay session.
    pub async fn dispatch_outbound(&self, packet: Vec<u8>) {
        let frame = DataFrame { payload: packet };
        if frame.invalid() {
            tracing::warn!("{}", DispatchError::MalformedPacket);
            self.stats.record_dropped();
            return;
        }

        let dest = match frame.dst().parse() {
            Ok(ip) => ip,
            Err(_) => {
                tracing::warn!("{}", DispatchError::MalformedPacket);
                self.stats.record_dropped();
                return;
            }
        };

        let p2p = self.p2p.get().expect("dispatcher used before wire()");
        let control = self.control.get().expect("dispatcher used before wire()");

        let peer = self.peers.find_by_destination_ip(dest);
        if let Some(peer) = &peer {
            if p2p.send_packet(frame.payload.clone(), peer).await {
                self.stats.record_p2p_sent(frame.payload.len());
                return;
            }
        }

        match control.send_data(frame.payload.clone()).await {
            Ok(()) => self.stats.record_relay_sent(frame.payload.len()),
            Err(e) => {
                tracing::warn!("relay send failed, dropping packet: {}", e);
                self.stats.record_dropped();
            }
        }
    }
}

impl PacketSink for PacketDispatcher {
    fn on_data_frame(&self, frame: &DataFrame) {
        self.stats.record_rx(frame.payload.len());
        let tun = self.tun.clone();
        let payload = frame.payload.clone();
        tokio::spawn(async move {
            if let Err(e) = tun.write_packet(&payload).await {
                tracing::warn!("failed to write inbound packet to tun device: {}", e);
            }
        });
    }
}

impl SessionSink for PacketDispatcher {
    /// Fixes the tunnel's base network settings and records the assigned
    /// virtual IP and connected state. Fired for every `HandshakeReply`
    /// decoded, not just the first; `RouteManager::initialize` tolerates
    /// repeat calls by diffing against what it already applied.
    fn on_handshake_reply(&self, reply: &HandshakeReplyFrame) {
        self.stats.set_virtual_ip(reply.private_ip.clone());
        self.stats.set_state(SessionState::Connected);

        let route = self.route.clone();
        let route_ready = self.route_ready.clone();
        let route_ready_fired = self.route_ready_fired.clone();
        let (local_ip, mask, gateway) = (
            reply.private_ip.clone(),
            reply.mask.clone(),
            reply.gateway.clone(),
        );
        tokio::spawn(async move {
            if let Err(e) = route.initialize(local_ip, mask, gateway).await {
                tracing::error!("failed to apply initial network settings: {}", e);
            }
            // Only the first call's completion gates the tun-reader loop;
            // later calls (reconnects) have nothing waiting on them.
            if !route_ready_fired.swap(true, Ordering::SeqCst) {
                route_ready.notify_one();
            }
        });
    }

    /// Reconciles the routed CIDR set against whatever the roster looks
    /// like after this keepalive's `PeerTable::upsert` has run.
    fn on_keep_alive(&self, _frame: &KeepAliveFrame) {
        let route = self.route.clone();
        tokio::spawn(async move {
            if let Err(e) = route.reconcile().await {
                tracing::error!("failed to reconcile routes: {}", e);
            }
        });
    }

    fn on_closed(&self) {
        self.stats.set_state(SessionState::Reconnect);
    }
}
