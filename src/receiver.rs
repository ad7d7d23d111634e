//! The receiver loop: inbound RTP → secretbox → Opus → SSRC correlation →
//! event emission. Runs only when `enable_incoming` is set.
//!
//! Individual packet failures are logged and dropped; only cancellation
//! stops the loop, per the lossy nature of the media stream.

use crate::crypto::SecretBox;
use crate::events::{VoiceConnectionEvent, VoiceUser};
use crate::opus_codec::OpusPcmDecoder;
use crate::rtp::{header_bytes, make_nonce, parse_header, strip_extension};
use crate::ssrc_map::SsrcMap;
use crate::udp_transport::UdpTransport;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Runs the receive loop until `cancel` fires.
pub async fn run(
    udp: Arc<UdpTransport>,
    secretbox: SecretBox,
    ssrc_map: Arc<SsrcMap>,
    events: broadcast::Sender<VoiceConnectionEvent>,
    cancel: CancellationToken,
) {
    let mut decoder = match OpusPcmDecoder::new() {
        Ok(decoder) => decoder,
        Err(err) => {
            warn!(error = %err, "failed to start opus decoder, receive loop not started");
            return;
        }
    };

    loop {
        let packet = tokio::select! {
            _ = cancel.cancelled() => return,
            result = udp.receive() => match result {
                Ok(packet) => packet,
                Err(err) => {
                    debug!(error = %err, "dropping unreadable packet");
                    continue;
                }
            },
        };

        if let Err(err) = process_packet(&packet, &secretbox, &mut decoder, &ssrc_map, &events) {
            debug!(error = %err, "dropping malformed voice packet");
        }
    }
}

fn process_packet(
    packet: &[u8],
    secretbox: &SecretBox,
    decoder: &mut OpusPcmDecoder,
    ssrc_map: &SsrcMap,
    events: &broadcast::Sender<VoiceConnectionEvent>,
) -> Result<(), crate::error::VoiceError> {
    let header = header_bytes(packet)?;
    let parsed = parse_header(packet)?;
    let nonce = make_nonce(&header);

    let decrypted = secretbox.decrypt(&nonce, &packet[header.len()..])?;
    let offset = strip_extension(&decrypted, parsed.has_extension);
    let pcm = decoder.decode(&decrypted[offset..])?;

    let user = ssrc_map.get(parsed.ssrc).map(|id| VoiceUser { id });

    let _ = events.send(VoiceConnectionEvent::VoiceReceived {
        ssrc: parsed.ssrc,
        pcm: Arc::from(pcm.into_boxed_slice()),
        frame_ms: 20,
        user,
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opus_codec::{OpusApplication, OpusPcmEncoder};
    use crate::rtp::{build_header, frame_payload, make_nonce};

    fn silence_frame() -> Vec<u8> {
        vec![0u8; 960 * 2 * 2]
    }

    #[test]
    fn process_packet_emits_voice_received_with_correlated_user() {
        let key = [7u8; 32];
        let secretbox = SecretBox::new(&key);
        let mut encoder = OpusPcmEncoder::new(OpusApplication::Voip).unwrap();
        let opus = encoder.encode(&silence_frame(), 16).unwrap();

        let header = build_header(1, 960, 42);
        let nonce = make_nonce(&header);
        let ciphertext = secretbox.encrypt(&nonce, &opus).unwrap();
        let packet = frame_payload(&header, &ciphertext);

        let ssrc_map = SsrcMap::new();
        ssrc_map.insert(42, 99);
        let (events_tx, mut events_rx) = broadcast::channel(4);
        let mut decoder = OpusPcmDecoder::new().unwrap();

        process_packet(&packet, &secretbox, &mut decoder, &ssrc_map, &events_tx).unwrap();

        match events_rx.try_recv().unwrap() {
            VoiceConnectionEvent::VoiceReceived { ssrc, user, .. } => {
                assert_eq!(ssrc, 42);
                assert_eq!(user, Some(VoiceUser { id: 99 }));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn process_packet_rejects_short_packets() {
        let secretbox = SecretBox::new(&[1u8; 32]);
        let ssrc_map = SsrcMap::new();
        let (events_tx, _rx) = broadcast::channel(4);
        let mut decoder = OpusPcmDecoder::new().unwrap();

        let err = process_packet(&[0u8; 4], &secretbox, &mut decoder, &ssrc_map, &events_tx)
            .unwrap_err();
        assert!(matches!(err, crate::error::VoiceError::MalformedPacket(_)));
    }
}
