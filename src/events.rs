//! Connection events, fanned out through a broadcast channel.
//!
//! Resolves the "events with add/remove subscription" design note as a
//! `tokio::sync::broadcast` channel: any number of subscribers call
//! [`VoiceConnection::subscribe`](crate::connection::VoiceConnection::subscribe)
//! and each gets every event published after that point.

use std::sync::Arc;

/// A resolved or synthesised user record attached to receive-path events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceUser {
    /// The user id. If no cache entry was found this is all that's known.
    pub id: u64,
}

/// Events published by a [`VoiceConnection`](crate::connection::VoiceConnection).
#[derive(Debug, Clone)]
pub enum VoiceConnectionEvent {
    /// A user's speaking state changed.
    UserSpeaking {
        /// SSRC of the speaker.
        ssrc: u32,
        /// Resolved user, if known.
        user: Option<VoiceUser>,
        /// New speaking state.
        speaking: bool,
    },
    /// A decoded inbound audio frame.
    VoiceReceived {
        /// SSRC of the sender.
        ssrc: u32,
        /// Decoded PCM bytes (16-bit signed LE, stereo).
        pcm: Arc<[u8]>,
        /// Frame duration in milliseconds.
        frame_ms: u32,
        /// Resolved user, if known.
        user: Option<VoiceUser>,
    },
    /// The underlying socket reported an error.
    VoiceSocketError {
        /// Human-readable description of the error.
        message: String,
    },
}

/// Channel capacity for the event broadcast; generous enough that a slow
/// subscriber lags rather than blocking publication.
pub const EVENT_CHANNEL_CAPACITY: usize = 128;
