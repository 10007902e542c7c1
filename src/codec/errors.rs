//! Frame parsing and validation errors
//!
//! This module defines error types that can occur during frame parsing,
//! validation, and decryption operations. All errors implement the standard
//! Error trait for proper error propagation and handling.

use std::fmt;
use std::fmt::Display;

/// Frame parsing and processing errors
///
/// Represents the failure modes that can occur when decoding frames from raw
/// byte streams. `TooShort` is non-fatal and retryable once more bytes
/// arrive; every other variant is fatal to the containing session.
#[derive(Debug)]
pub(crate) enum FrameError {
    /// Buffer holds fewer bytes than the frame currently needs.
    ///
    /// Occurs when:
    /// - Buffer length < 8 bytes (header incomplete)
    /// - Buffer length < header_size + payload_size (payload incomplete)
    ///
    /// Non-fatal: the caller keeps reading and retries the decode once more
    /// bytes have arrived.
    TooShort,

    /// Header magic did not match `0x91929394`.
    InvalidMagic,

    /// Header version did not match the supported protocol version.
    InvalidVersion,

    /// Header kind byte is outside the defined frame-kind set.
    InvalidKind,

    /// Payload decryption failed
    ///
    /// Wraps the underlying cryptographic error. This can occur when:
    /// - Authentication tag verification fails (AEAD ciphers)
    /// - Data was tampered with during transmission
    /// - The wrong key is in use
    DecryptionFailed(crate::Error),

    /// Payload decrypted but JSON deserialization failed.
    DeserializationFailed,
}

impl std::error::Error for FrameError {}

impl Display for FrameError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FrameError::TooShort => "stream ended early".fmt(fmt),
            FrameError::InvalidMagic => "invalid frame magic".fmt(fmt),
            FrameError::InvalidVersion => "invalid frame version".fmt(fmt),
            FrameError::InvalidKind => "invalid frame kind".fmt(fmt),
            FrameError::DecryptionFailed(e) => write!(fmt, "decryption failed: {}", e),
            FrameError::DeserializationFailed => "frame payload deserialization failed".fmt(fmt),
        }
    }
}
