//! Voice engine client for a real-time voice service: signalling over
//! WebSocket, media over UDP/RTP, Opus audio carried inside XSalsa20-Poly1305
//! secretboxes.
#![deny(unsafe_code)]
//!
//! # Architecture
//!
//! - [`signalling`] drives identify/resume, heartbeat and IP discovery over
//!   the WebSocket.
//! - [`pacer`] encodes, encrypts, frames and paces outbound audio.
//! - [`receiver`] decrypts and decodes inbound audio and correlates it to a
//!   user via [`ssrc_map`].
//! - [`connection`] ties the above together behind the public
//!   [`VoiceConnection`] API.
//!
//! # Example
//!
//! ```ignore
//! use titanium_voice::{VoiceConfig, VoiceConnection, OpusApplication};
//!
//! let config = VoiceConfig {
//!     guild_id,
//!     channel_id,
//!     user_id,
//!     session_id: voice_state.session_id,
//!     endpoint: voice_server.endpoint.unwrap(),
//!     token: voice_server.token,
//!     opus_application: OpusApplication::Voip,
//!     enable_incoming: true,
//! };
//!
//! let connection = VoiceConnection::new(config);
//! connection.connect().await;
//! ```

pub mod connection;
pub mod crypto;
pub mod error;
pub mod events;
pub mod opcode;
pub mod opus_codec;
pub mod pacer;
pub mod payload;
pub mod receiver;
pub mod rtp;
pub mod signalling;
pub mod ssrc_map;
pub mod udp_transport;
pub mod ws_transport;

pub use connection::{VoiceConfig, VoiceConnection};
pub use crypto::SecretBox;
pub use error::{VoiceCloseCode, VoiceError};
pub use events::{VoiceConnectionEvent, VoiceUser};
pub use opcode::VoiceOpCode;
pub use opus_codec::OpusApplication;
pub use payload::{
    IdentifyPayload, ReadyPayload, ResumePayload, SelectProtocolPayload,
    SessionDescriptionPayload, SpeakingPayload, ENCRYPTION_MODE,
};
pub use ssrc_map::SsrcMap;
