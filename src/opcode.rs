//! Voice signalling opcodes.

use serde_repr::{Deserialize_repr, Serialize_repr};

/// Voice signalling operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum VoiceOpCode {
    /// Identify: `{server_id, user_id, session_id, token}`.
    Identify = 0,
    /// Select protocol: `{protocol, data}`.
    SelectProtocol = 1,
    /// Ready: `{ssrc, port, heartbeat_interval}`.
    Ready = 2,
    /// Heartbeat: epoch-seconds timestamp.
    Heartbeat = 3,
    /// Session description: `{secret_key}`.
    SessionDescription = 4,
    /// Speaking state update.
    Speaking = 5,
    /// Acknowledgment of a heartbeat.
    HeartbeatAck = 6,
    /// Resume: `{server_id, session_id, token}`.
    Resume = 7,
    /// Tolerated, ignored.
    Hello = 8,
    /// Session invalidated; restart identification.
    Resumed = 9,
}

impl VoiceOpCode {
    /// Whether this opcode is ever sent by the server.
    pub fn is_receive(self) -> bool {
        matches!(
            self,
            VoiceOpCode::Ready
                | VoiceOpCode::SessionDescription
                | VoiceOpCode::HeartbeatAck
                | VoiceOpCode::Hello
                | VoiceOpCode::Resumed
                | VoiceOpCode::Speaking
                | VoiceOpCode::Heartbeat
        )
    }

    /// Whether this opcode is ever sent by the client.
    pub fn is_send(self) -> bool {
        matches!(
            self,
            VoiceOpCode::Identify
                | VoiceOpCode::SelectProtocol
                | VoiceOpCode::Heartbeat
                | VoiceOpCode::Speaking
                | VoiceOpCode::Resume
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_serialization() {
        let json = serde_json::to_string(&VoiceOpCode::Hello).unwrap();
        assert_eq!(json, "8");

        let op: VoiceOpCode = serde_json::from_str("8").unwrap();
        assert_eq!(op, VoiceOpCode::Hello);
    }
}
