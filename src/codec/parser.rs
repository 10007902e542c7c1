//! Frame codec: encode and decode
//!
//! This module handles the serialization (encode) and deserialization (decode)
//! of VPN protocol frames. It manages the frame header format, payload
//! encryption/decryption, and JSON serialization of control-frame payloads.
//! A single codec serves both the TCP control channel and the UDP peer
//! channel: UDP datagrams are self-delimiting but still carry the header so
//! the decoder stays transport-agnostic.

use crate::codec::frame::*;
use crate::crypto::Block;
use anyhow::Context;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Protocol magic number for frame validation
const MAGIC: u32 = 0x91929394;
/// Protocol version
const VERSION: u8 = 0x01;

/// Stateless encoder/decoder for the wire protocol.
pub struct Codec;

impl Codec {
    /// Decodes one frame from the front of `buf`.
    ///
    /// `buf` may hold a partial frame (the caller is expected to keep
    /// accumulating bytes and retry on `TooShort`) or more than one frame
    /// (only the first is decoded; the caller advances past `consumed`).
    ///
    /// # Returns
    /// * `Ok((frame, consumed))` on success
    /// * `Err` wrapping a `FrameError` — `TooShort` is retryable, every
    ///   other variant is fatal to the containing session.
    pub fn decode(buf: &[u8], block: &dyn Block) -> crate::Result<(Frame, usize)> {
        if buf.len() < HDR_LEN {
            return Err(FrameError::TooShort.into());
        }

        let magic = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let version = buf[4];
        let kind_byte = buf[5];
        let payload_size = u16::from_be_bytes([buf[6], buf[7]]);

        if magic != MAGIC {
            return Err(FrameError::InvalidMagic.into());
        }
        if version != VERSION {
            return Err(FrameError::InvalidVersion.into());
        }

        let total_len = HDR_LEN + payload_size as usize;
        if buf.len() < total_len {
            return Err(FrameError::TooShort.into());
        }

        let kind = FrameKind::try_from(kind_byte)?;
        let mut payload = buf[HDR_LEN..total_len].to_vec();

        match kind {
            FrameKind::Handshake => {
                let hs: HandshakeFrame = Self::decrypt_and_deserialize(&mut payload, block)?;
                Ok((Frame::Handshake(hs), total_len))
            }

            FrameKind::HandshakeReply => {
                let reply: HandshakeReplyFrame =
                    Self::decrypt_and_deserialize(&mut payload, block)?;
                Ok((Frame::HandshakeReply(reply), total_len))
            }

            FrameKind::KeepAlive => {
                let keepalive: KeepAliveFrame =
                    Self::decrypt_and_deserialize(&mut payload, block)?;
                Ok((Frame::KeepAlive(keepalive), total_len))
            }

            FrameKind::Data => {
                block
                    .decrypt(&mut payload)
                    .map_err(FrameError::DecryptionFailed)?;
                Ok((Frame::Data(DataFrame { payload }), total_len))
            }

            FrameKind::ProbeIpv6 => {
                let probe: ProbeIpv6Frame = Self::decrypt_and_deserialize(&mut payload, block)?;
                Ok((Frame::ProbeIpv6(probe), total_len))
            }

            FrameKind::ProbeHolePunch => {
                let probe: ProbeHolePunchFrame =
                    Self::decrypt_and_deserialize(&mut payload, block)?;
                Ok((Frame::ProbeHolePunch(probe), total_len))
            }
        }
    }

    /// Decrypts and deserializes a control-frame JSON payload in place.
    fn decrypt_and_deserialize<T: DeserializeOwned>(
        payload: &mut Vec<u8>,
        block: &dyn Block,
    ) -> crate::Result<T> {
        block
            .decrypt(payload)
            .map_err(FrameError::DecryptionFailed)?;
        serde_json::from_slice(payload).map_err(|_| FrameError::DeserializationFailed.into())
    }

    /// Serializes `data` to JSON and encrypts it with `block`.
    fn serialize_and_encrypt<T: Serialize>(
        data: &T,
        block: &dyn Block,
        context_msg: &str,
    ) -> crate::Result<Vec<u8>> {
        let msg = context_msg.to_string();
        let json = serde_json::to_string(data).with_context(|| msg)?;
        let mut payload = json.into_bytes();
        block.encrypt(&mut payload)?;
        Ok(payload)
    }

    /// Builds the 8-byte frame header.
    fn build_header(kind: FrameKind, payload_len: u16) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HDR_LEN + payload_len as usize);
        buf.extend_from_slice(&MAGIC.to_be_bytes());
        buf.push(VERSION);
        buf.push(kind as u8);
        buf.extend_from_slice(&payload_len.to_be_bytes());
        buf
    }

    /// Encodes `frame` into a complete wire-format byte buffer: header plus
    /// AEAD-sealed payload.
    pub fn encode(frame: Frame, block: &dyn Block) -> crate::Result<Vec<u8>> {
        match frame {
            Frame::Handshake(hs) => {
                let payload =
                    Self::serialize_and_encrypt(&hs, block, "failed to encode handshake")?;
                let mut buf = Self::build_header(FrameKind::Handshake, payload.len() as u16);
                buf.extend_from_slice(&payload);
                Ok(buf)
            }

            Frame::HandshakeReply(reply) => {
                let payload = Self::serialize_and_encrypt(
                    &reply,
                    block,
                    "failed to encode handshake reply",
                )?;
                let mut buf = Self::build_header(FrameKind::HandshakeReply, payload.len() as u16);
                buf.extend_from_slice(&payload);
                Ok(buf)
            }

            Frame::KeepAlive(keepalive) => {
                let payload = Self::serialize_and_encrypt(
                    &keepalive,
                    block,
                    "failed to encode keepalive",
                )?;
                let mut buf = Self::build_header(FrameKind::KeepAlive, payload.len() as u16);
                buf.extend_from_slice(&payload);
                Ok(buf)
            }

            Frame::Data(mut data) => {
                block.encrypt(&mut data.payload)?;
                let mut buf = Self::build_header(FrameKind::Data, data.payload.len() as u16);
                buf.extend_from_slice(&data.payload);
                Ok(buf)
            }

            Frame::ProbeIpv6(frame) => {
                let payload =
                    Self::serialize_and_encrypt(&frame, block, "failed to encode probe ipv6")?;
                let mut buf = Self::build_header(FrameKind::ProbeIpv6, payload.len() as u16);
                buf.extend_from_slice(&payload);
                Ok(buf)
            }

            Frame::ProbeHolePunch(frame) => {
                let payload = Self::serialize_and_encrypt(
                    &frame,
                    block,
                    "failed to encode probe hole punch",
                )?;
                let mut buf = Self::build_header(FrameKind::ProbeHolePunch, payload.len() as u16);
                buf.extend_from_slice(&payload);
                Ok(buf)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::CryptoSuite;

    fn suite() -> Box<dyn Block> {
        CryptoSuite::from_config("chacha20:test-key").unwrap()
    }

    #[test]
    fn round_trip_handshake() {
        let block = suite();
        let frame = Frame::Handshake(HandshakeFrame {
            identity: "c1".to_string(),
        });
        let encoded = Codec::encode(frame, block.as_ref()).unwrap();
        let (decoded, consumed) = Codec::decode(&encoded, block.as_ref()).unwrap();
        assert_eq!(consumed, encoded.len());
        match decoded {
            Frame::Handshake(hs) => assert_eq!(hs.identity, "c1"),
            _ => panic!("wrong frame kind"),
        }
    }

    #[test]
    fn round_trip_data() {
        let block = suite();
        let payload = vec![0x45, 0x00, 0x00, 0x14, 1, 2, 3, 4];
        let frame = Frame::Data(DataFrame {
            payload: payload.clone(),
        });
        let encoded = Codec::encode(frame, block.as_ref()).unwrap();
        let (decoded, consumed) = Codec::decode(&encoded, block.as_ref()).unwrap();
        assert_eq!(consumed, encoded.len());
        match decoded {
            Frame::Data(data) => assert_eq!(data.payload, payload),
            _ => panic!("wrong frame kind"),
        }
    }

    #[test]
    fn boundary_too_short_header() {
        let block = suite();
        let frame = Frame::Handshake(HandshakeFrame {
            identity: "c1".to_string(),
        });
        let encoded = Codec::encode(frame, block.as_ref()).unwrap();
        for cut in 0..HDR_LEN {
            let err = Codec::decode(&encoded[..cut], block.as_ref()).unwrap_err();
            assert!(err.to_string().contains("stream ended early"));
        }
    }

    #[test]
    fn boundary_too_short_payload_is_retryable() {
        let block = suite();
        let frame = Frame::Handshake(HandshakeFrame {
            identity: "c1".to_string(),
        });
        let encoded = Codec::encode(frame, block.as_ref()).unwrap();
        let prefix = &encoded[..encoded.len() - 1];
        assert!(Codec::decode(prefix, block.as_ref()).is_err());
        let (decoded, consumed) = Codec::decode(&encoded, block.as_ref()).unwrap();
        assert_eq!(consumed, encoded.len());
        assert!(matches!(decoded, Frame::Handshake(_)));
    }

    #[test]
    fn reject_bad_magic() {
        let block = suite();
        let frame = Frame::Handshake(HandshakeFrame {
            identity: "c1".to_string(),
        });
        let mut encoded = Codec::encode(frame, block.as_ref()).unwrap();
        encoded[0] ^= 0xff;
        let err = Codec::decode(&encoded, block.as_ref()).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn reject_bad_version() {
        let block = suite();
        let frame = Frame::Handshake(HandshakeFrame {
            identity: "c1".to_string(),
        });
        let mut encoded = Codec::encode(frame, block.as_ref()).unwrap();
        encoded[4] = 0x02;
        let err = Codec::decode(&encoded, block.as_ref()).unwrap_err();
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn reject_tampered_ciphertext() {
        let block = suite();
        let frame = Frame::Handshake(HandshakeFrame {
            identity: "c1".to_string(),
        });
        let mut encoded = Codec::encode(frame, block.as_ref()).unwrap();
        let last = encoded.len() - 1;
        encoded[last] ^= 0xff;
        let err = Codec::decode(&encoded, block.as_ref()).unwrap_err();
        assert!(err.to_string().contains("decryption"));
    }
}
