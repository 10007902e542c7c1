//! The composition root: wires codec, crypto, peer table, control session,
//! P2P service, route manager, and dispatcher into one running client,
//! built around typed trait objects (`PacketSink`/`SessionSink`) rather
//! than a closure graph.

use crate::config::{EngineConfig, DEFAULT_MTU};
use crate::crypto::{Block, CryptoSuite};
use crate::discovery::{Discoverer, PublicIpv6Probe};
use crate::dispatch::PacketDispatcher;
use crate::p2p::{P2pService, P2P_PORT};
use crate::peer::PeerTable;
use crate::platform::{SystemTunDevice, TunConfig, TunDevice};
use crate::route::RouteManager;
use crate::session::{ControlSessionConfig, ReconnectSupervisor};
use crate::stats::{Stats, StatsSnapshot};
use std::sync::Arc;

/// A running client: the tunnel, the control session, the P2P service, and
/// the background tasks that keep routes and self-advertisement current.
pub struct Engine {
    dispatcher: Arc<PacketDispatcher>,
    control: Arc<ReconnectSupervisor>,
    p2p: Arc<P2pService>,
    discoverer: Arc<Discoverer>,
    tun: Arc<dyn TunDevice>,
    stats: Arc<Stats>,
}

impl Engine {
    /// Builds and starts every component, then returns once the first
    /// control-session handshake has completed (`ControlSession::start`'s
    /// success *is* the engine's readiness signal) and the first route
    /// apply from that handshake's reply has finished. The tun-reader loop
    /// that feeds `PacketDispatcher::dispatch_outbound` only starts after
    /// that, so inbound/outbound dispatch never races route installation;
    /// it then runs in the background for the engine's lifetime.
    pub async fn start(cfg: EngineConfig, ipv6_probe: Arc<dyn PublicIpv6Probe>) -> crate::Result<Arc<Self>> {
        let crypto: Arc<dyn Block> = Arc::from(CryptoSuite::from_config(&cfg.crypto_config)?);
        let peers = Arc::new(PeerTable::new());
        let stats = Stats::new(peers.clone());

        let tun: Arc<dyn TunDevice> = Arc::new(SystemTunDevice::create(TunConfig { mtu: DEFAULT_MTU })?);
        let route = Arc::new(RouteManager::new(peers.clone(), tun.clone()));

        let dispatcher = PacketDispatcher::new(peers.clone(), route.clone(), tun.clone(), stats.clone());

        let p2p = P2pService::bind(
            peers.clone(),
            crypto.clone(),
            cfg.identity.clone(),
            dispatcher.clone(),
        )
        .await?;
        peers.set_self_udp_port(P2P_PORT);

        let session_cfg = ControlSessionConfig {
            server_addr: cfg.server_addr.clone(),
            identity: cfg.identity.clone(),
            keepalive_interval: cfg.keepalive_interval,
        };
        let control = ReconnectSupervisor::new(session_cfg, crypto.clone(), peers.clone(), dispatcher.clone());

        dispatcher.wire(p2p.clone(), control.clone());

        let discoverer = Discoverer::new(ipv6_probe, peers.clone());

        p2p.spawn();
        control.run().await?;
        // Starts the IPv6 discoverer's first probe cycle right after session
        // establishment, not concurrently with the handshake.
        discoverer.spawn();

        // The handshake reply that `control.run()` just processed already
        // queued a route apply on the dispatcher; wait for it to finish
        // before the tun-reader loop starts reading from the interface, so
        // outbound dispatch never races route installation.
        dispatcher.wait_for_initial_route_apply().await;

        let engine = Arc::new(Self {
            dispatcher,
            control,
            p2p,
            discoverer,
            tun: tun.clone(),
            stats,
        });
        engine.spawn_tun_reader();
        Ok(engine)
    }

    /// Reads packets off the virtual interface for as long as the engine
    /// runs and hands each one to the dispatcher's outbound path.
    fn spawn_tun_reader(self: &Arc<Self>) {
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                match this.tun.read_packet().await {
                    Ok(packet) => this.dispatcher.dispatch_outbound(packet).await,
                    Err(e) => {
                        tracing::error!("tun device read error, stopping tun reader: {}", e);
                        return;
                    }
                }
            }
        });
    }

    /// A read-only snapshot of state, counters, connect time, and the peer
    /// roster.
    pub fn snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Stops the P2P service, the IPv6 discoverer, and the control
    /// supervisor, in that order.
    pub async fn shutdown(&self) {
        self.p2p.stop();
        self.discoverer.stop();
        self.control.shutdown().await;
    }
}

// `Engine` never implements `PacketSink`/`SessionSink` directly — the
// dispatcher already does, and owns everything those callbacks need
// (tun device, stats, route manager).
