//! The thin callback surface a control session fires upward into: a trait
//! object the supervisor and the rest of the engine implement once, instead
//! of wiring a separate closure per event.

use crate::codec::frame::{HandshakeReplyFrame, KeepAliveFrame};
use crate::dispatch::PacketSink;

/// Receives the events a `ControlSession` produces. Implementations must be
/// safe to call from any of the session's tasks and must not block.
///
/// `Data` frames are delivered through the `PacketSink` supertrait — the
/// same sink the P2P service delivers into, per the single inbound path the
/// dispatcher owns.
pub trait SessionSink: PacketSink {
    /// Fired for every `HandshakeReply` decoded, not just the first;
    /// implementations that establish base state from it (e.g. route
    /// initialization) must be idempotent across repeat calls.
    fn on_handshake_reply(&self, reply: &HandshakeReplyFrame);

    /// Fired for every inbound `KeepAlive` pushed by the server.
    fn on_keep_alive(&self, frame: &KeepAliveFrame);

    /// Fired exactly once when the session closes, for any reason.
    fn on_closed(&self);
}
