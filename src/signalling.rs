//! The signalling state machine: identify/resume, heartbeat, IP discovery,
//! protocol selection and session description, and reconnect-on-close.
//!
//! Runs as a single long-lived task per connection, driven by a
//! `tokio::select!` loop over inbound WebSocket events, an (initially idle)
//! heartbeat timer, and a command channel the connection's public API uses
//! to request a speaking-state change.

use crate::error::VoiceError;
use crate::opcode::VoiceOpCode;
use crate::payload::{
    HeartbeatPayload, IdentifyPayload, ReadyPayload, ResumePayload, SelectProtocolPayload,
    SessionDescriptionPayload, SpeakingPayload, VoicePayload,
};
use crate::rtp::{build_discovery_probe, parse_discovery_response};
use crate::udp_transport::UdpTransport;
use crate::ws_transport::{WsEvent, WsTransport};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::Interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Configuration the signalling task needs to identify and reconnect.
#[derive(Debug, Clone)]
pub struct SignallingConfig {
    /// Guild id.
    pub guild_id: u64,
    /// User id.
    pub user_id: u64,
    /// Session id from the voice-state payload.
    pub session_id: String,
    /// Voice server endpoint, `host[:port]`.
    pub endpoint: String,
    /// Auth token from the voice-server payload.
    pub token: String,
}

impl SignallingConfig {
    fn websocket_url(&self) -> Result<String, VoiceError> {
        let host = self.endpoint.split(':').next().unwrap_or(&self.endpoint);
        Ok(format!("wss://{host}/?encoding=json&v=3"))
    }

    fn udp_host_port(&self) -> (String, u16) {
        let mut parts = self.endpoint.splitn(2, ':');
        let host = parts.next().unwrap_or(&self.endpoint).to_string();
        let port = parts.next().and_then(|p| p.parse().ok()).unwrap_or(80);
        (host, port)
    }
}

/// Commands the public API sends into the signalling task.
#[derive(Debug)]
pub enum SignallingCommand {
    /// Request a speaking-state update be sent to the server.
    SetSpeaking(bool),
}

/// Events the signalling task publishes back out.
#[derive(Debug)]
pub enum SignallingOutput {
    /// Op 2: SSRC assigned and the UDP media transport is connected.
    MediaReady { ssrc: u32, udp: Arc<UdpTransport> },
    /// Op 4: the shared secret key.
    SessionKey([u8; 32]),
    /// Op 5 from a peer: their speaking state changed.
    UserSpeaking {
        ssrc: Option<u32>,
        user_id: Option<u64>,
        speaking: bool,
    },
    /// The socket closed or errored.
    SocketError(String),
    /// Disposal was requested; the task is exiting for good.
    Closed,
}

/// Runs the signalling state machine until `cancel` fires, reconnecting on
/// unexpected close with the current resume flag.
pub async fn run(
    config: SignallingConfig,
    resume: Arc<AtomicBool>,
    ping_ms: Arc<AtomicU64>,
    output_tx: mpsc::Sender<SignallingOutput>,
    mut command_rx: mpsc::Receiver<SignallingCommand>,
    cancel: CancellationToken,
) {
    while !cancel.is_cancelled() {
        match run_once(&config, &resume, &ping_ms, &output_tx, &mut command_rx, &cancel).await {
            Ok(()) => break,
            Err(err) => {
                warn!(error = %err, "voice signalling connection ended, reconnecting");
                let _ = output_tx.send(SignallingOutput::SocketError(err.to_string())).await;
                if cancel.is_cancelled() {
                    break;
                }
            }
        }
    }
    let _ = output_tx.send(SignallingOutput::Closed).await;
}

async fn run_once(
    config: &SignallingConfig,
    resume: &Arc<AtomicBool>,
    ping_ms: &Arc<AtomicU64>,
    output_tx: &mpsc::Sender<SignallingOutput>,
    command_rx: &mut mpsc::Receiver<SignallingCommand>,
    cancel: &CancellationToken,
) -> Result<(), VoiceError> {
    let url = config.websocket_url()?;
    let mut ws = WsTransport::connect(&url).await?;
    info!(url = %url, "voice signalling connected");

    let resuming = resume.load(Ordering::SeqCst);
    if resuming {
        send_payload(
            &mut ws,
            VoiceOpCode::Resume,
            &ResumePayload {
                server_id: config.guild_id,
                session_id: config.session_id.clone(),
                token: config.token.clone(),
            },
        )
        .await?;
    } else {
        send_payload(
            &mut ws,
            VoiceOpCode::Identify,
            &IdentifyPayload {
                server_id: config.guild_id,
                user_id: config.user_id,
                session_id: config.session_id.clone(),
                token: config.token.clone(),
            },
        )
        .await?;
    }

    let mut heartbeat_timer: Option<Interval> = None;
    let mut last_heartbeat_sent: Option<Instant> = None;
    let mut current_ssrc: Option<u32> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),

            command = command_rx.recv() => {
                match command {
                    Some(SignallingCommand::SetSpeaking(speaking)) => {
                        if let Some(ssrc) = current_ssrc {
                            send_payload(&mut ws, VoiceOpCode::Speaking, &SpeakingPayload {
                                speaking,
                                delay: 0,
                                ssrc: Some(ssrc),
                                user_id: None,
                            }).await?;
                        }
                    }
                    None => return Ok(()),
                }
            }

            _ = tick(&mut heartbeat_timer) => {
                last_heartbeat_sent = Some(Instant::now());
                let epoch_secs = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs() as u32;
                send_payload(&mut ws, VoiceOpCode::Heartbeat, &HeartbeatPayload(epoch_secs)).await?;
                trace!(epoch_secs, "sent heartbeat");
            }

            event = ws.next_event() => {
                match event {
                    WsEvent::MessageText(text) => {
                        handle_message(
                            &text,
                            &mut ws,
                            config,
                            resume,
                            ping_ms,
                            output_tx,
                            &mut heartbeat_timer,
                            &mut last_heartbeat_sent,
                            &mut current_ssrc,
                        ).await?;
                    }
                    WsEvent::Closed { code, reason } => {
                        return Err(VoiceError::TransportClosed { code, reason });
                    }
                    WsEvent::Error(message) => {
                        return Err(VoiceError::TransportError(message));
                    }
                }
            }
        }
    }
}

/// Ticks the heartbeat timer if one has been armed, otherwise never resolves.
async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_message(
    text: &str,
    ws: &mut WsTransport,
    config: &SignallingConfig,
    resume: &Arc<AtomicBool>,
    ping_ms: &Arc<AtomicU64>,
    output_tx: &mpsc::Sender<SignallingOutput>,
    heartbeat_timer: &mut Option<Interval>,
    last_heartbeat_sent: &mut Option<Instant>,
    current_ssrc: &mut Option<u32>,
) -> Result<(), VoiceError> {
    let raw: crate::payload::RawVoicePayload = serde_json::from_str(text)?;

    match raw.op {
        VoiceOpCode::Ready => {
            let Some(data) = raw.d else { return Ok(()) };
            let ready: ReadyPayload = serde_json::from_value(data)?;
            resume.store(true, Ordering::SeqCst);
            *current_ssrc = Some(ready.ssrc);
            *heartbeat_timer = Some(tokio::time::interval(Duration::from_secs_f64(
                ready.heartbeat_interval / 1000.0,
            )));

            let (host, _) = config.udp_host_port();
            let udp = UdpTransport::setup(&host, ready.port).await?;
            let (address, port) = discover_ip(&udp, ready.ssrc).await?;

            send_payload(
                ws,
                VoiceOpCode::SelectProtocol,
                &SelectProtocolPayload::new(address, port),
            )
            .await?;

            let _ = output_tx
                .send(SignallingOutput::MediaReady {
                    ssrc: ready.ssrc,
                    udp: Arc::new(udp),
                })
                .await;
        }

        VoiceOpCode::SessionDescription => {
            let Some(data) = raw.d else { return Ok(()) };
            let desc: SessionDescriptionPayload = serde_json::from_value(data)?;
            if desc.secret_key.len() != 32 {
                return Err(VoiceError::CodecFailure(format!(
                    "secret key was {} bytes, expected 32",
                    desc.secret_key.len()
                )));
            }
            let mut key = [0u8; 32];
            key.copy_from_slice(&desc.secret_key);
            let _ = output_tx.send(SignallingOutput::SessionKey(key)).await;
        }

        VoiceOpCode::Heartbeat | VoiceOpCode::HeartbeatAck => {
            if let Some(sent) = last_heartbeat_sent.take() {
                let rtt = Instant::now().saturating_duration_since(sent);
                ping_ms.store(rtt.as_millis() as u64, Ordering::SeqCst);
            }
        }

        VoiceOpCode::Speaking => {
            let Some(data) = raw.d else { return Ok(()) };
            let speaking: SpeakingPayload = serde_json::from_value(data)?;
            let _ = output_tx
                .send(SignallingOutput::UserSpeaking {
                    ssrc: speaking.ssrc,
                    user_id: speaking.user_id,
                    speaking: speaking.speaking,
                })
                .await;
        }

        VoiceOpCode::Resumed => {
            resume.store(false, Ordering::SeqCst);
            send_payload(
                ws,
                VoiceOpCode::Identify,
                &IdentifyPayload {
                    server_id: config.guild_id,
                    user_id: config.user_id,
                    session_id: config.session_id.clone(),
                    token: config.token.clone(),
                },
            )
            .await?;
        }

        VoiceOpCode::Hello => {
            debug!("hello-like opcode, ignored");
        }

        other => {
            warn!(?other, "unhandled voice opcode");
        }
    }

    Ok(())
}

async fn discover_ip(udp: &UdpTransport, ssrc: u32) -> Result<(String, u16), VoiceError> {
    let probe = build_discovery_probe(ssrc);
    udp.send(&probe).await?;
    let response = udp.receive().await?;
    parse_discovery_response(&response)
}

async fn send_payload<D: Serialize>(
    ws: &mut WsTransport,
    op: VoiceOpCode,
    data: &D,
) -> Result<(), VoiceError> {
    let payload = VoicePayload::new(op, data);
    let json = serde_json::to_string(&payload)?;
    ws.send_text(json).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn websocket_url_strips_port_and_pins_version() {
        let config = SignallingConfig {
            guild_id: 1,
            user_id: 2,
            session_id: "sn".to_string(),
            endpoint: "voice.example:443".to_string(),
            token: "tk".to_string(),
        };
        assert_eq!(
            config.websocket_url().unwrap(),
            "wss://voice.example/?encoding=json&v=3"
        );
    }

    #[test]
    fn udp_host_port_defaults_to_80_when_omitted() {
        let config = SignallingConfig {
            guild_id: 1,
            user_id: 2,
            session_id: "sn".to_string(),
            endpoint: "voice.example".to_string(),
            token: "tk".to_string(),
        };
        assert_eq!(config.udp_host_port(), ("voice.example".to_string(), 80));
    }
}
