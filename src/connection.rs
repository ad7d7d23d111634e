//! The public voice connection: construction, readiness, send/receive
//! orchestration, disconnect and disposal.

use crate::crypto::SecretBox;
use crate::error::VoiceError;
use crate::events::VoiceConnectionEvent;
use crate::opus_codec::OpusApplication;
use crate::pacer::SendPacer;
use crate::receiver;
use crate::signalling::{self, SignallingCommand, SignallingConfig, SignallingOutput};
use crate::ssrc_map::SsrcMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Notify, OnceCell};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Construction-time configuration for a voice connection.
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Guild id.
    pub guild_id: u64,
    /// Channel id being joined.
    pub channel_id: u64,
    /// User id of the local client.
    pub user_id: u64,
    /// Session id from the voice-state payload.
    pub session_id: String,
    /// Voice server endpoint, `host[:port]`, from the voice-server payload.
    pub endpoint: String,
    /// Auth token from the voice-server payload.
    pub token: String,
    /// Opus application profile to encode with.
    pub opus_application: OpusApplication,
    /// Whether to run the receive pipeline.
    pub enable_incoming: bool,
}

/// A single active voice connection: signalling session plus media pipeline.
pub struct VoiceConnection {
    config: VoiceConfig,
    cancel: CancellationToken,
    disposed: AtomicBool,
    ready: Notify,
    is_ready: AtomicBool,
    pacer: OnceCell<Arc<SendPacer>>,
    ssrc_map: Arc<SsrcMap>,
    ping_ms: Arc<AtomicU64>,
    events_tx: broadcast::Sender<VoiceConnectionEvent>,
    signalling_command_tx: OnceCell<mpsc::Sender<SignallingCommand>>,
}

impl VoiceConnection {
    /// Construct a connection in the disconnected state. Call [`connect`]
    /// to begin signalling.
    pub fn new(config: VoiceConfig) -> Arc<Self> {
        let (events_tx, _) = broadcast::channel(crate::events::EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            config,
            cancel: CancellationToken::new(),
            disposed: AtomicBool::new(false),
            ready: Notify::new(),
            is_ready: AtomicBool::new(false),
            pacer: OnceCell::new(),
            ssrc_map: Arc::new(SsrcMap::new()),
            ping_ms: Arc::new(AtomicU64::new(0)),
            events_tx,
            signalling_command_tx: OnceCell::new(),
        })
    }

    /// Open the signalling WebSocket and drive the handshake to readiness
    /// in the background.
    pub async fn connect(self: &Arc<Self>) {
        let signalling_config = SignallingConfig {
            guild_id: self.config.guild_id,
            user_id: self.config.user_id,
            session_id: self.config.session_id.clone(),
            endpoint: self.config.endpoint.clone(),
            token: self.config.token.clone(),
        };

        let (command_tx, command_rx) = mpsc::channel(32);
        let (output_tx, output_rx) = mpsc::channel(32);
        let resume = Arc::new(AtomicBool::new(false));

        let _ = self.signalling_command_tx.set(command_tx);

        let cancel = self.cancel.clone();
        let ping_ms = Arc::clone(&self.ping_ms);
        tokio::spawn(signalling::run(
            signalling_config,
            resume,
            ping_ms,
            output_tx,
            command_rx,
            cancel,
        ));

        let this = Arc::clone(self);
        tokio::spawn(this.drive_handshake(output_rx));
    }

    async fn drive_handshake(self: Arc<Self>, mut output_rx: mpsc::Receiver<SignallingOutput>) {
        let mut pending_ssrc = None;
        let mut pending_udp = None;
        let mut pending_key = None;

        while let Some(output) = output_rx.recv().await {
            match output {
                SignallingOutput::MediaReady { ssrc, udp } => {
                    pending_ssrc = Some(ssrc);
                    pending_udp = Some(udp);
                }
                SignallingOutput::SessionKey(key) => {
                    pending_key = Some(key);
                }
                SignallingOutput::UserSpeaking { ssrc, user_id, speaking } => {
                    if let (Some(ssrc), Some(user_id)) = (ssrc, user_id) {
                        self.ssrc_map.insert(ssrc, user_id);
                    }
                    let user = user_id.map(|id| crate::events::VoiceUser { id });
                    let _ = self.events_tx.send(VoiceConnectionEvent::UserSpeaking {
                        ssrc: ssrc.unwrap_or_default(),
                        user,
                        speaking,
                    });
                }
                SignallingOutput::SocketError(message) => {
                    let _ = self
                        .events_tx
                        .send(VoiceConnectionEvent::VoiceSocketError { message });
                }
                SignallingOutput::Closed => {
                    self.is_ready.store(false, Ordering::SeqCst);
                    return;
                }
            }

            if let (Some(ssrc), Some(udp), Some(key)) = (pending_ssrc, pending_udp.clone(), pending_key) {
                if self.pacer.initialized() {
                    continue;
                }
                let speaking_tx = match self.signalling_command_tx.get() {
                    Some(tx) => tx.clone(),
                    None => continue,
                };
                match SendPacer::new(Arc::clone(&udp), ssrc, key, self.config.opus_application, speaking_tx) {
                    Ok(pacer) => {
                        let _ = self.pacer.set(Arc::new(pacer));
                        self.is_ready.store(true, Ordering::SeqCst);
                        self.ready.notify_waiters();

                        if self.config.enable_incoming {
                            let secretbox = SecretBox::new(&key);
                            tokio::spawn(receiver::run(
                                udp,
                                secretbox,
                                Arc::clone(&self.ssrc_map),
                                self.events_tx.clone(),
                                self.cancel.clone(),
                            ));
                        }
                    }
                    Err(err) => {
                        error!(error = %err, "failed to build send pacer");
                    }
                }
            }
        }
    }

    /// Whether the connection has completed its handshake.
    pub fn is_ready(&self) -> bool {
        self.is_ready.load(Ordering::SeqCst)
    }

    /// Encode, encrypt and transmit one PCM frame, pacing to real time.
    pub async fn send(&self, pcm: &[u8], block_ms: u32, bitrate_kbps: u32) -> Result<(), VoiceError> {
        let pacer = self.pacer.get().ok_or(VoiceError::NotInitialized)?;
        pacer.send(pcm, block_ms, bitrate_kbps).await
    }

    /// Update the speaking state announced to the server.
    pub async fn send_speaking(&self, speaking: bool) -> Result<(), VoiceError> {
        let pacer = self.pacer.get().ok_or(VoiceError::NotInitialized)?;
        pacer.send_speaking(speaking).await
    }

    /// Await completion of the in-flight playback epoch.
    pub async fn wait_for_playback_finish(&self) {
        if let Some(pacer) = self.pacer.get() {
            pacer.wait_for_playback_finish().await;
        }
    }

    /// Whether a send is currently in flight.
    pub fn is_playing(&self) -> bool {
        self.pacer.get().map(|p| p.is_playing()).unwrap_or(false)
    }

    /// Most recent heartbeat round-trip time, in milliseconds.
    pub fn ping(&self) -> u64 {
        self.ping_ms.load(Ordering::SeqCst)
    }

    /// The connected channel id.
    pub fn channel(&self) -> u64 {
        self.config.channel_id
    }

    /// Subscribe to connection events.
    pub fn subscribe(&self) -> broadcast::Receiver<VoiceConnectionEvent> {
        self.events_tx.subscribe()
    }

    /// Cancel all tasks, close sockets and drop codec handles. Idempotent.
    pub fn disconnect(&self) {
        if self
            .disposed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        self.is_ready.store(false, Ordering::SeqCst);
        self.cancel.cancel();
    }
}

impl Drop for VoiceConnection {
    fn drop(&mut self) {
        if !self.disposed.load(Ordering::SeqCst) {
            warn!("VoiceConnection dropped without disconnecting");
            self.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> VoiceConfig {
        VoiceConfig {
            guild_id: 1,
            channel_id: 2,
            user_id: 3,
            session_id: "sn".to_string(),
            endpoint: "voice.example:443".to_string(),
            token: "tk".to_string(),
            opus_application: OpusApplication::Voip,
            enable_incoming: true,
        }
    }

    #[test]
    fn new_connection_is_not_ready_or_playing() {
        let conn = VoiceConnection::new(test_config());
        assert!(!conn.is_ready());
        assert!(!conn.is_playing());
        assert_eq!(conn.ping(), 0);
        assert_eq!(conn.channel(), 2);
    }

    #[tokio::test]
    async fn send_before_ready_fails_with_not_initialized() {
        let conn = VoiceConnection::new(test_config());
        let err = conn.send(&[0u8; 10], 20, 16).await.unwrap_err();
        assert!(matches!(err, VoiceError::NotInitialized));
    }

    #[test]
    fn disconnect_is_idempotent() {
        let conn = VoiceConnection::new(test_config());
        conn.disconnect();
        conn.disconnect();
    }
}
