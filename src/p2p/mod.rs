//! The UDP/IPv6 direct path: one socket, a probe loop that proves liveness,
//! and a receive loop that feeds `Data` frames into the shared inbound sink.
//!
//! A single IPv6 socket is all this system needs — STUN hole-punch
//! initiation is out of scope, so there is no second socket and no per-peer
//! address bookkeeping beyond what `PeerTable` already holds.

use crate::codec::frame::{DataFrame, Frame, ProbeIpv6Frame};
use crate::codec::parser::Codec;
use crate::crypto::Block;
use crate::dispatch::PacketSink;
use crate::peer::{PeerEntry, PeerTable, ACTIVE_THRESHOLD};
use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

/// Fixed UDP port the direct path listens on and advertises.
pub const P2P_PORT: u16 = 51820;
/// How often every reachable peer is sent a liveness probe.
pub const PROBE_INTERVAL: Duration = Duration::from_secs(10);

const RECV_BUFFER_SIZE: usize = 2048;

/// Owns the IPv6 UDP socket used for direct peer-to-peer delivery.
pub struct P2pService {
    socket: UdpSocket,
    peers: Arc<PeerTable>,
    crypto: Arc<dyn Block>,
    identity: String,
    sink: Arc<dyn PacketSink>,
    cancel: CancellationToken,
}

impl P2pService {
    /// Binds `[::]:P2P_PORT` and returns the service, not yet running.
    pub async fn bind(
        peers: Arc<PeerTable>,
        crypto: Arc<dyn Block>,
        identity: String,
        sink: Arc<dyn PacketSink>,
    ) -> crate::Result<Arc<Self>> {
        let socket = UdpSocket::bind(("::", P2P_PORT)).await?;
        tracing::info!("P2P UDP listening on {}", socket.local_addr()?);
        Ok(Arc::new(Self {
            socket,
            peers,
            crypto,
            identity,
            sink,
            cancel: CancellationToken::new(),
        }))
    }

    /// Spawns the probe loop and the receive loop.
    pub fn spawn(self: &Arc<Self>) {
        let probe = self.clone();
        tokio::spawn(async move { probe.probe_loop().await });

        let recv = self.clone();
        tokio::spawn(async move { recv.recv_loop().await });
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    async fn probe_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(PROBE_INTERVAL);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = ticker.tick() => self.probe_once().await,
            }
        }
    }

    async fn probe_once(&self) {
        let frame = Frame::ProbeIpv6(ProbeIpv6Frame {
            identity: self.identity.clone(),
        });
        let encoded = match Codec::encode(frame, self.crypto.as_ref()) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!("failed to encode ipv6 probe: {}", e);
                return;
            }
        };

        for peer in self.peers.peers() {
            if peer.ipv6.is_empty() || peer.udp_port == 0 {
                continue;
            }
            let Some(addr) = parse_ipv6(&peer.ipv6) else {
                tracing::warn!("peer {} has unparseable ipv6 {}", peer.identity, peer.ipv6);
                continue;
            };
            let target = SocketAddr::V6(SocketAddrV6::new(addr, peer.udp_port, 0, 0));
            if let Err(e) = self.socket.send_to(&encoded, target).await {
                tracing::debug!("probe send to {} failed: {}", target, e);
            }
        }
    }

    async fn recv_loop(self: Arc<Self>) {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((len, SocketAddr::V6(src))) => self.handle_datagram(&buf[..len], src),
                        Ok((_, SocketAddr::V4(src))) => {
                            tracing::debug!("dropping unexpected IPv4 datagram from {}", src);
                        }
                        Err(e) => {
                            tracing::error!("p2p socket recv error: {}", e);
                            return;
                        }
                    }
                }
            }
        }
    }

    fn handle_datagram(&self, datagram: &[u8], src: SocketAddrV6) {
        let frame = match Codec::decode(datagram, self.crypto.as_ref()) {
            Ok((frame, _)) => frame,
            Err(e) => {
                tracing::debug!("dropping undecodable p2p datagram from {}: {}", src, e);
                return;
            }
        };

        match frame {
            Frame::ProbeIpv6(probe) => self.peers.on_probe_received(&probe.identity, src),
            Frame::Data(data) => self.sink.on_data_frame(&data),
            _ => {}
        }
    }

    /// Attempts direct delivery to `peer`. Returns `false` without sending
    /// if any precondition fails: liveness not proved, liveness stale, or
    /// the advertised address is incomplete.
    pub async fn send_packet(&self, packet: Vec<u8>, peer: &PeerEntry) -> bool {
        let Some(last_rx) = peer.last_rx else {
            return false;
        };
        if last_rx.elapsed() > ACTIVE_THRESHOLD {
            return false;
        }
        if peer.ipv6.is_empty() || peer.udp_port == 0 {
            return false;
        }
        let Some(addr) = parse_ipv6(&peer.ipv6) else {
            return false;
        };

        let frame = Frame::Data(DataFrame { payload: packet });
        let encoded = match Codec::encode(frame, self.crypto.as_ref()) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!("failed to encode data frame for p2p send: {}", e);
                return false;
            }
        };

        let target = SocketAddr::V6(SocketAddrV6::new(addr, peer.udp_port, 0, 0));
        match self.socket.send_to(&encoded, target).await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("p2p send to {} failed: {}", target, e);
                false
            }
        }
    }
}

/// Parses an IPv6 address in either bracketed (`[fd00::1]`) or bare
/// (`fd00::1`) form.
fn parse_ipv6(s: &str) -> Option<Ipv6Addr> {
    let trimmed = s.strip_prefix('[').and_then(|s| s.strip_suffix(']')).unwrap_or(s);
    trimmed.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bracketed_and_bare_ipv6() {
        assert_eq!(parse_ipv6("fd00::1"), Some("fd00::1".parse().unwrap()));
        assert_eq!(parse_ipv6("[fd00::1]"), Some("fd00::1".parse().unwrap()));
        assert_eq!(parse_ipv6("not-an-address"), None);
    }
}
