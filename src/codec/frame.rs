//! Frame definitions for the VPN protocol
//!
//! This module defines the frame structure and types used in the VPN protocol.
//! All frames follow a common header format and may contain encrypted payloads.
//!
//! # Frame Header Format (8 bytes)
//! ```text
//! +--------+--------+--------+--------+--------+--------+--------+--------+
//! |      Magic (4 bytes)      |Version|  Kind  |   Payload Length (2B)   |
//! +--------+--------+--------+--------+--------+--------+--------+--------+
//! ```
//!
//! - Magic: 0x91929394 (4 bytes) - Protocol identifier
//! - Version: 0x01 (1 byte) - Protocol version
//! - Kind: Frame kind identifier (1 byte)
//! - Payload Length: Length of the payload in bytes (2 bytes, big-endian)

pub(crate) use crate::codec::errors::FrameError;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Frame kind identifiers
///
/// Each frame kind serves a specific purpose in the VPN protocol lifecycle:
/// - Handshake: Initial client registration
/// - HandshakeReply: Server response with network configuration and peer roster
/// - KeepAlive: Connection health check and self-advertisement
/// - Data: Encrypted IP packet tunnel data
/// - ProbeIpv6 / ProbeHolePunch: one-shot UDP liveness probes
pub(crate) enum FrameKind {
    /// Client handshake request (kind 1)
    Handshake = 1,
    /// Connection keep-alive ping (kind 2)
    KeepAlive = 2,
    /// Tunneled data packet (kind 3)
    Data = 3,
    /// Server handshake response (kind 4)
    HandshakeReply = 4,
    // kind 5 is reserved (a peer-update push the server no longer sends).
    /// UDP reachability probe (kind 6)
    ProbeIpv6 = 6,
    /// Reverse-path hole-punch probe (kind 7), never originated by the client
    ProbeHolePunch = 7,
}

impl TryFrom<u8> for FrameKind {
    type Error = FrameError;

    /// Converts a byte value to a FrameKind
    ///
    /// # Returns
    /// * `Ok(FrameKind)` if the value is one of the defined kinds
    /// * `Err(FrameError::InvalidKind)` otherwise
    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(FrameKind::Handshake),
            2 => Ok(FrameKind::KeepAlive),
            3 => Ok(FrameKind::Data),
            4 => Ok(FrameKind::HandshakeReply),
            6 => Ok(FrameKind::ProbeIpv6),
            7 => Ok(FrameKind::ProbeHolePunch),
            _ => Err(FrameError::InvalidKind),
        }
    }
}

/// Frame header length in bytes
///
/// Header format: Magic(4) + Version(1) + Kind(1) + PayloadLen(2) = 8 bytes
pub(crate) const HDR_LEN: usize = 8;

/// Protocol frame enum
///
/// Represents all possible frames in the VPN protocol. Each variant carries
/// the frame-specific data. Frames are serialized/deserialized by the codec
/// module and AEAD-sealed according to the session's crypto suite.
#[derive(Debug, Clone)]
pub enum Frame {
    /// Client handshake request containing identity
    Handshake(HandshakeFrame),
    /// Server handshake response with network config and peer roster
    HandshakeReply(HandshakeReplyFrame),
    /// Connection keep-alive heartbeat and self-advertisement
    KeepAlive(KeepAliveFrame),
    /// Tunneled IP packet data
    Data(DataFrame),
    /// One-shot UDP reachability probe
    ProbeIpv6(ProbeIpv6Frame),
    /// Reverse-path hole-punch probe, decoded but never acted on
    ProbeHolePunch(ProbeHolePunchFrame),
}

impl Display for Frame {
    /// Formats the frame for logging and debugging
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Frame::Handshake(frame) => write!(f, "handshake from {}", frame.identity),
            Frame::HandshakeReply(frame) => {
                write!(f, "handshake reply with {} peers", frame.peer_details.len())
            }
            Frame::KeepAlive(frame) => write!(
                f,
                "keepalive from {}, ipv6 [{}]:{} stun {}:{}",
                frame.identity, frame.ipv6, frame.port, frame.stun_ip, frame.stun_port
            ),
            Frame::Data(frame) => write!(f, "data, {} bytes", frame.payload.len()),
            Frame::ProbeIpv6(frame) => write!(f, "probe ipv6 from {}", frame.identity),
            Frame::ProbeHolePunch(frame) => write!(f, "probe hole punch from {}", frame.identity),
        }
    }
}

/// Handshake frame sent by client during connection establishment
///
/// The client sends this frame as the first message after establishing a TCP
/// connection to the server. The identity is used for routing configuration
/// lookup; no further authentication is performed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeFrame {
    /// Client identity (unique identifier)
    pub identity: String,
}

/// Handshake reply frame sent by server in response to client handshake
///
/// Contains the network configuration for the client and the current roster
/// of peers in the deployment. This enables the client to set up routes and
/// communicate with other VPN nodes.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HandshakeReplyFrame {
    /// Private IP address assigned to this client
    pub private_ip: String,

    /// Subnet mask for the VPN network (dotted-decimal or prefix length)
    pub mask: String,

    /// Gateway IP address for the VPN network
    pub gateway: String,

    /// The authoritative peer roster at handshake time
    pub peer_details: Vec<PeerDetail>,
}

/// Wire representation of one peer in the roster.
///
/// The field is named `ciders`, not `cidrs` — a historical misspelling
/// preserved for server compatibility.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PeerDetail {
    /// Unique identifier of the peer
    pub identity: String,

    /// Private IP address of the peer within the VPN
    pub private_ip: String,

    /// CIDR ranges accessible through this peer (spelled `ciders` on the wire)
    pub ciders: Vec<String>,

    /// Peer's public IPv6 address, or empty if not yet known
    pub ipv6: String,

    /// Peer's UDP port for P2P delivery
    pub port: u16,

    pub stun_ip: String,
    pub stun_port: u16,
    pub last_active: u64,
}

/// Keep-alive frame for connection health monitoring and self-advertisement
///
/// Sent periodically by the client to detect connection failures and to
/// advertise its own reachability fields to the server. If no frames
/// (including keep-alives) are received within the timeout, the connection
/// is considered dead and will be closed.
///
/// `peer_details` is always empty on the client's outbound keepalive; the
/// field exists for wire symmetry with any future server push.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeepAliveFrame {
    /// Peer identity (unique identifier)
    pub identity: String,

    /// Public IPv6 address
    pub ipv6: String,

    /// UDP port for P2P connections
    pub port: u16,

    pub stun_ip: String,
    pub stun_port: u16,

    /// Always empty when emitted by the client
    pub peer_details: Vec<PeerDetail>,
}

/// One-shot UDP liveness probe. Receipt proves the sender reachable at its
/// advertised address; carries no other payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeIpv6Frame {
    pub identity: String,
}

/// Reverse-path hole-punch probe. Defined for wire compatibility; the client
/// never originates this frame, and it is ignored on receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeHolePunchFrame {
    pub identity: String,
}

/// Data frame containing a tunneled IP packet
///
/// Encapsulates a raw IP packet being tunneled through the VPN. The payload
/// is AEAD-sealed directly, with no JSON envelope.
#[derive(Debug, Clone)]
pub struct DataFrame {
    /// Raw IP packet data
    pub payload: Vec<u8>,
}

impl DataFrame {
    /// Checks if the IP packet is invalid: too short to hold an IPv4 header,
    /// or its declared header length exceeds the buffer.
    pub fn invalid(&self) -> bool {
        if self.payload.len() < 20 {
            return true;
        }
        let ihl = (self.payload[0] & 0x0f) as usize;
        ihl * 4 > self.payload.len()
    }

    /// Extracts the IP version from the packet header (top nibble).
    pub fn version(&self) -> i32 {
        (self.payload[0] >> 4) as i32
    }

    /// Extracts the destination IPv4 address from bytes 16..20.
    ///
    /// Caller must have already checked `!invalid()`.
    pub fn dst(&self) -> String {
        format!(
            "{}.{}.{}.{}",
            self.payload[16], self.payload[17], self.payload[18], self.payload[19]
        )
    }

    /// Extracts the source IPv4 address from bytes 12..16.
    ///
    /// Caller must have already checked `!invalid()`.
    pub fn src(&self) -> String {
        format!(
            "{}.{}.{}.{}",
            self.payload[12], self.payload[13], self.payload[14], self.payload[15]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ipv4_packet(ihl_words: u8, total_len: usize, dst: [u8; 4]) -> Vec<u8> {
        let mut pkt = vec![0u8; total_len.max(20)];
        pkt[0] = 0x40 | (ihl_words & 0x0f);
        pkt[16..20].copy_from_slice(&dst);
        pkt
    }

    #[test]
    fn rejects_packets_shorter_than_an_ipv4_header() {
        let frame = DataFrame {
            payload: vec![0x45; 19],
        };
        assert!(frame.invalid());
    }

    #[test]
    fn rejects_when_ihl_exceeds_buffer_length() {
        let mut payload = ipv4_packet(5, 20, [10, 0, 0, 1]);
        payload[0] = 0x4f; // IHL = 15 words = 60 bytes, buffer is 20
        let frame = DataFrame { payload };
        assert!(frame.invalid());
    }

    #[test]
    fn accepts_a_well_formed_header() {
        let frame = DataFrame {
            payload: ipv4_packet(5, 20, [10, 0, 0, 1]),
        };
        assert!(!frame.invalid());
        assert_eq!(frame.version(), 4);
        assert_eq!(frame.dst(), "10.0.0.1");
    }

    #[test]
    fn extracts_src_and_dst() {
        let mut payload = ipv4_packet(5, 20, [10, 0, 1, 5]);
        payload[12..16].copy_from_slice(&[10, 0, 1, 9]);
        let frame = DataFrame { payload };
        assert_eq!(frame.src(), "10.0.1.9");
        assert_eq!(frame.dst(), "10.0.1.5");
    }
}
