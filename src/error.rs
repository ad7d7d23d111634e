//! Voice engine error types.
//!
//! Malformed/authentication/codec failures raised while decoding an
//! inbound packet are never propagated to callers — the receive loop
//! (see [`crate::receiver`]) swallows them per-packet and only uses
//! this type to log why a packet was dropped.

use thiserror::Error;

/// Errors produced by the voice engine.
#[derive(Debug, Error)]
pub enum VoiceError {
    /// An operation that requires a ready connection was attempted too early.
    #[error("voice connection is not initialized")]
    NotInitialized,

    /// An RTP packet was shorter than the 12-byte header, or its header
    /// extension was malformed.
    #[error("malformed RTP packet: {0}")]
    MalformedPacket(&'static str),

    /// The secretbox authentication tag did not verify.
    #[error("secretbox authentication failed")]
    AuthenticationFailed,

    /// Opus encode or decode failed.
    #[error("opus codec failure: {0}")]
    CodecFailure(String),

    /// The signalling WebSocket was closed.
    #[error("transport closed: code={code}, reason={reason}")]
    TransportClosed {
        /// Close code, 0 if unknown.
        code: u16,
        /// Close reason text.
        reason: String,
    },

    /// A transport-level I/O error (WebSocket or UDP).
    #[error("transport error: {0}")]
    TransportError(String),

    /// The peer offered no mode we support, or selected an unexpected one.
    #[error("unsupported encryption mode: {0}")]
    UnsupportedMode(String),

    /// Timed out waiting for a handshake step.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    /// The endpoint string could not be turned into a WebSocket URL.
    #[error("invalid voice endpoint: {0}")]
    InvalidEndpoint(String),
}

impl From<std::io::Error> for VoiceError {
    fn from(err: std::io::Error) -> Self {
        VoiceError::TransportError(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for VoiceError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        VoiceError::TransportError(err.to_string())
    }
}

impl From<serde_json::Error> for VoiceError {
    fn from(err: serde_json::Error) -> Self {
        VoiceError::TransportError(format!("json: {err}"))
    }
}

impl From<url::ParseError> for VoiceError {
    fn from(err: url::ParseError) -> Self {
        VoiceError::InvalidEndpoint(err.to_string())
    }
}

impl From<audiopus::Error> for VoiceError {
    fn from(err: audiopus::Error) -> Self {
        VoiceError::CodecFailure(err.to_string())
    }
}

/// Convenience result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, VoiceError>;

/// Discord-style voice gateway close codes retained for diagnostics; the
/// signalling loop logs these and decides whether to reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum VoiceCloseCode {
    /// Unknown error.
    UnknownError = 4000,
    /// Unknown opcode.
    UnknownOpcode = 4001,
    /// Failed to decode payload.
    FailedToDecodePayload = 4002,
    /// Not authenticated.
    NotAuthenticated = 4003,
    /// Authentication failed.
    AuthenticationFailed = 4004,
    /// Already authenticated.
    AlreadyAuthenticated = 4005,
    /// Session is no longer valid.
    SessionNoLongerValid = 4006,
    /// Session timed out.
    SessionTimeout = 4009,
    /// Server not found.
    VoiceServerNotFound = 4011,
    /// Unknown protocol.
    UnknownProtocol = 4012,
    /// Disconnected.
    Disconnected = 4014,
    /// Voice server crashed.
    VoiceServerCrashed = 4015,
    /// Unknown encryption mode.
    UnknownEncryptionMode = 4016,
}

impl VoiceCloseCode {
    /// Whether reconnection is possible.
    pub fn can_reconnect(self) -> bool {
        matches!(
            self,
            VoiceCloseCode::UnknownError
                | VoiceCloseCode::SessionTimeout
                | VoiceCloseCode::VoiceServerCrashed
        )
    }

    /// Try to parse a close code.
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            4000 => Some(VoiceCloseCode::UnknownError),
            4001 => Some(VoiceCloseCode::UnknownOpcode),
            4002 => Some(VoiceCloseCode::FailedToDecodePayload),
            4003 => Some(VoiceCloseCode::NotAuthenticated),
            4004 => Some(VoiceCloseCode::AuthenticationFailed),
            4005 => Some(VoiceCloseCode::AlreadyAuthenticated),
            4006 => Some(VoiceCloseCode::SessionNoLongerValid),
            4009 => Some(VoiceCloseCode::SessionTimeout),
            4011 => Some(VoiceCloseCode::VoiceServerNotFound),
            4012 => Some(VoiceCloseCode::UnknownProtocol),
            4014 => Some(VoiceCloseCode::Disconnected),
            4015 => Some(VoiceCloseCode::VoiceServerCrashed),
            4016 => Some(VoiceCloseCode::UnknownEncryptionMode),
            _ => None,
        }
    }
}
