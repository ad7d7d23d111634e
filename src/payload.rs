//! Voice signalling payloads.

use crate::opcode::VoiceOpCode;
use serde::{Deserialize, Serialize};

/// The only encryption mode this engine negotiates.
pub const ENCRYPTION_MODE: &str = "xsalsa20_poly1305";

/// A voice signalling payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoicePayload<D> {
    /// Opcode.
    pub op: VoiceOpCode,
    /// Payload data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<D>,
}

impl<D: Serialize> VoicePayload<D> {
    /// Create a new payload.
    pub fn new(op: VoiceOpCode, data: D) -> Self {
        Self { op, d: Some(data) }
    }
}

/// Raw payload for initial parsing.
#[derive(Debug, Clone, Deserialize)]
pub struct RawVoicePayload {
    /// Opcode.
    pub op: VoiceOpCode,
    /// Raw payload data.
    pub d: Option<serde_json::Value>,
}

/// Identify payload (op 0).
#[derive(Debug, Clone, Serialize)]
pub struct IdentifyPayload {
    /// Guild id.
    pub server_id: u64,
    /// User id.
    pub user_id: u64,
    /// Session id from the voice-state payload.
    pub session_id: String,
    /// Token from the voice-server payload.
    pub token: String,
}

/// Ready payload (op 2).
#[derive(Debug, Clone, Deserialize)]
pub struct ReadyPayload {
    /// SSRC assigned to this connection.
    pub ssrc: u32,
    /// UDP port of the voice server, at the endpoint host already known
    /// from the voice-server payload.
    pub port: u16,
    /// Heartbeat interval in milliseconds.
    pub heartbeat_interval: f64,
}

/// Select Protocol payload (op 1).
#[derive(Debug, Clone, Serialize)]
pub struct SelectProtocolPayload {
    /// Always `"udp"`.
    pub protocol: String,
    /// Protocol data.
    pub data: SelectProtocolData,
}

/// Data for Select Protocol.
#[derive(Debug, Clone, Serialize)]
pub struct SelectProtocolData {
    /// Our externally discovered address.
    pub address: String,
    /// Our externally discovered port.
    pub port: u16,
    /// Encryption mode, always [`ENCRYPTION_MODE`].
    pub mode: String,
}

impl SelectProtocolPayload {
    /// Create a new Select Protocol payload for the discovered address.
    pub fn new(address: String, port: u16) -> Self {
        Self {
            protocol: "udp".to_string(),
            data: SelectProtocolData {
                address,
                port,
                mode: ENCRYPTION_MODE.to_string(),
            },
        }
    }
}

/// Session Description payload (op 4).
#[derive(Debug, Clone, Deserialize)]
pub struct SessionDescriptionPayload {
    /// Shared secret key, 32 bytes.
    pub secret_key: Vec<u8>,
}

/// Speaking payload (op 5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakingPayload {
    /// Whether the sender is speaking.
    pub speaking: bool,
    /// Always 0 on send; echoed back by the server otherwise.
    pub delay: u32,
    /// SSRC of the speaker, present on outbound frames.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ssrc: Option<u32>,
    /// User id of the speaker, present on inbound frames.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub user_id: Option<u64>,
}

/// Resume payload (op 7).
#[derive(Debug, Clone, Serialize)]
pub struct ResumePayload {
    /// Guild id.
    pub server_id: u64,
    /// Session id.
    pub session_id: String,
    /// Token.
    pub token: String,
}

/// Heartbeat payload (op 3): a bare 32-bit epoch-seconds timestamp, not an
/// object.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HeartbeatPayload(pub u32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identify_frame_matches_wire_shape() {
        let payload = VoicePayload::new(
            VoiceOpCode::Identify,
            IdentifyPayload {
                server_id: 1,
                user_id: 2,
                session_id: "sn".to_string(),
                token: "tk".to_string(),
            },
        );
        let json = serde_json::to_string(&payload).unwrap();
        assert_eq!(
            json,
            r#"{"op":0,"d":{"server_id":1,"user_id":2,"session_id":"sn","token":"tk"}}"#
        );
    }

    #[test]
    fn ready_payload_has_no_ip_or_modes_fields() {
        let d: ReadyPayload =
            serde_json::from_str(r#"{"ssrc":42,"port":50001,"heartbeat_interval":13750.0}"#)
                .unwrap();
        assert_eq!(d.ssrc, 42);
        assert_eq!(d.port, 50001);
        assert_eq!(d.heartbeat_interval, 13750.0);
    }

    #[test]
    fn heartbeat_payload_is_a_bare_integer() {
        let json = serde_json::to_string(&HeartbeatPayload(12345)).unwrap();
        assert_eq!(json, "12345");
    }

    #[test]
    fn select_protocol_uses_fixed_encryption_mode() {
        let payload = SelectProtocolPayload::new("1.2.3.4".to_string(), 1000);
        assert_eq!(payload.data.mode, "xsalsa20_poly1305");
    }
}
