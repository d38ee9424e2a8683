// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error taxonomy for the gateway wire backend.

use crate::frames::GatewayId;

/// Errors returned by lorabridge operations.
///
/// Wire decode failures (`MalformedPacket`, `InvalidPayload`) are normally
/// logged at the transport layer and the offending datagram dropped; they
/// surface to callers only through the codec API itself. Placement failures
/// (`ChannelDoesNotFit`, `SlotExhausted`) are fatal to the configuration
/// attempt that raised them and never produce a partial artifact.
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Wire decode errors
    // ========================================================================
    /// Binary packet framing is invalid (short datagram, unknown identifier,
    /// unsupported protocol version).
    MalformedPacket(String),
    /// The JSON sub-payload (or an embedded field such as base64 data) failed
    /// to decode.
    InvalidPayload(String),

    // ========================================================================
    // Session errors
    // ========================================================================
    /// A downlink was addressed to a gateway with no active pull session.
    GatewayUnknown(GatewayId),

    // ========================================================================
    // Channel placement errors
    // ========================================================================
    /// A channel's occupied bandwidth cannot be covered by any remaining
    /// radio chain window. Carries the offending center frequency in Hz.
    ChannelDoesNotFit(u32),
    /// All slots of the named kind ("multi_sf", "lora_std", "fsk") are taken.
    SlotExhausted(&'static str),

    // ========================================================================
    // Transport errors
    // ========================================================================
    /// I/O error with underlying cause.
    Io(std::io::Error),
    /// The backend has been closed; no further sends are accepted.
    Closed,
    /// A downlink frame carried no items.
    EmptyDownlink,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::MalformedPacket(msg) => write!(f, "Malformed packet: {}", msg),
            Error::InvalidPayload(msg) => write!(f, "Invalid payload: {}", msg),
            Error::GatewayUnknown(id) => write!(f, "Gateway unknown: {}", id),
            Error::ChannelDoesNotFit(freq) => {
                write!(f, "Channel does not fit in radio bandwidth: {} Hz", freq)
            }
            Error::SlotExhausted(kind) => write!(f, "Channel slot exhausted: {}", kind),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Closed => write!(f, "Backend is closed"),
            Error::EmptyDownlink => write!(f, "Downlink frame has no items"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::InvalidPayload(e.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(e: base64::DecodeError) -> Self {
        Error::InvalidPayload(e.to_string())
    }
}

/// Convenient alias for API results using the public `Error` type.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_contains_frequency() {
        let err = Error::ChannelDoesNotFit(868_100_000);
        assert!(err.to_string().contains("868100000"));
    }

    #[test]
    fn test_io_error_source() {
        use std::error::Error as _;
        let err = Error::from(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_json_error_maps_to_invalid_payload() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        match Error::from(json_err) {
            Error::InvalidPayload(_) => {}
            other => panic!("expected InvalidPayload, got {:?}", other),
        }
    }
}
