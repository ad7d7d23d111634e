//! The send pacer: PCM → Opus → secretbox → RTP, transmitted at real-time
//! pace behind a single-permit serialisation token.

use crate::crypto::SecretBox;
use crate::error::VoiceError;
use crate::opus_codec::{OpusApplication, OpusPcmEncoder};
use crate::rtp::{build_header, frame_payload, make_nonce};
use crate::signalling::SignallingCommand;
use crate::udp_transport::UdpTransport;
use parking_lot::Mutex as SyncMutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex, Notify};

/// The outbound stream's running sequence/timestamp state.
#[derive(Debug, Clone, Copy, Default)]
struct MediaCursor {
    seq: u16,
    timestamp: u32,
}

impl MediaCursor {
    fn advance(&mut self, block_ms: u32) {
        self.seq = self.seq.wrapping_add(1);
        self.timestamp = self.timestamp.wrapping_add(48 * block_ms);
    }
}

struct PacerState {
    cursor: MediaCursor,
    /// Set on first use of a pacing epoch; cleared by `send_speaking(false)`.
    anchor: Option<Instant>,
}

/// Serialises and paces outbound audio frames for one connection.
pub struct SendPacer {
    udp: Arc<UdpTransport>,
    ssrc: u32,
    secretbox: SecretBox,
    encoder: SyncMutex<OpusPcmEncoder>,
    state: Mutex<PacerState>,
    speaking_tx: mpsc::Sender<SignallingCommand>,
    is_speaking: AtomicBool,
    is_playing: AtomicBool,
    playback_done: Notify,
}

impl SendPacer {
    /// Construct a pacer for a connection that has reached the ready state.
    pub fn new(
        udp: Arc<UdpTransport>,
        ssrc: u32,
        secret_key: [u8; 32],
        application: OpusApplication,
        speaking_tx: mpsc::Sender<SignallingCommand>,
    ) -> Result<Self, VoiceError> {
        Ok(Self {
            udp,
            ssrc,
            secretbox: SecretBox::new(&secret_key),
            encoder: SyncMutex::new(OpusPcmEncoder::new(application)?),
            state: Mutex::new(PacerState {
                cursor: MediaCursor::default(),
                anchor: None,
            }),
            speaking_tx,
            is_speaking: AtomicBool::new(false),
            is_playing: AtomicBool::new(false),
            playback_done: Notify::new(),
        })
    }

    /// Encode, encrypt, frame and transmit one PCM frame, pacing to real
    /// time. `block_ms` must match the duration of audio in `pcm`.
    pub async fn send(&self, pcm: &[u8], block_ms: u32, bitrate_kbps: u32) -> Result<(), VoiceError> {
        let mut state = self.state.lock().await;

        let header = build_header(state.cursor.seq, state.cursor.timestamp, self.ssrc);
        let opus = {
            let mut encoder = self.encoder.lock();
            encoder.encode(pcm, bitrate_kbps)?
        };
        let nonce = make_nonce(&header);
        let ciphertext = self.secretbox.encrypt(&nonce, &opus)?;
        let packet = frame_payload(&header, &ciphertext);

        self.ensure_speaking(true).await?;
        self.is_playing.store(true, Ordering::SeqCst);

        self.udp.send(&packet).await?;

        state.cursor.advance(block_ms);

        let tick = Duration::from_secs_f64(block_ms as f64 / 1000.0);
        let anchor = *state.anchor.get_or_insert_with(Instant::now);
        let target = anchor + tick;
        let now = Instant::now();
        if target > now {
            spin_sleep::sleep(target - now);
        }
        state.anchor = Some(target);

        Ok(())
    }

    /// Tell the server whether this sender is speaking. Setting `false`
    /// resets the pacing anchor so the next `send` starts a fresh epoch,
    /// and completes the playback-in-progress signal.
    pub async fn send_speaking(&self, speaking: bool) -> Result<(), VoiceError> {
        self.ensure_speaking(speaking).await?;
        if !speaking {
            self.is_playing.store(false, Ordering::SeqCst);
            self.playback_done.notify_waiters();
            self.state.lock().await.anchor = None;
        }
        Ok(())
    }

    async fn ensure_speaking(&self, speaking: bool) -> Result<(), VoiceError> {
        if self.is_speaking.swap(speaking, Ordering::SeqCst) == speaking {
            return Ok(());
        }
        self.speaking_tx
            .send(SignallingCommand::SetSpeaking(speaking))
            .await
            .map_err(|_| VoiceError::NotInitialized)
    }

    /// Whether a send is currently "in flight" (speaking has not been
    /// explicitly stopped since the last frame).
    pub fn is_playing(&self) -> bool {
        self.is_playing.load(Ordering::SeqCst)
    }

    /// Await completion of the current playback epoch; returns immediately
    /// if nothing is in flight.
    pub async fn wait_for_playback_finish(&self) {
        loop {
            if !self.is_playing() {
                return;
            }
            let notified = self.playback_done.notified();
            if !self.is_playing() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_wraps_sequence_and_advances_timestamp() {
        let mut cursor = MediaCursor {
            seq: u16::MAX,
            timestamp: 0,
        };
        cursor.advance(20);
        assert_eq!(cursor.seq, 0);
        assert_eq!(cursor.timestamp, 960);
    }
}
