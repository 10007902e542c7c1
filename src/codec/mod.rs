//! The framed, encrypted wire protocol shared by the TCP control channel and
//! the UDP peer channel.

pub mod errors;
pub mod frame;
pub mod parser;

pub(crate) use errors::FrameError;
pub use frame::{
    DataFrame, Frame, HandshakeFrame, HandshakeReplyFrame, KeepAliveFrame, PeerDetail,
    ProbeHolePunchFrame, ProbeIpv6Frame,
};
pub use parser::Codec;
