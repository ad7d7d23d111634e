//! Opus encode/decode at a fixed 48 kHz, stereo, 16-bit signed little-endian
//! PCM format.
//!
//! Generalised from mono to stereo and from a fixed 20 ms frame to the
//! configurable block sizes the send pacer negotiates per call.

use crate::error::VoiceError;
use audiopus::coder::{Decoder, Encoder};
use audiopus::packet::Packet;
use audiopus::{Application, Bitrate, Channels, MutSignals, SampleRate};
use byteorder::{ByteOrder, LittleEndian};

/// Opus application profile, matching `spec.md`'s `{voip, audio,
/// low-latency}` construction option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpusApplication {
    /// Tuned for speech with background noise suppression.
    Voip,
    /// Tuned for music and general audio.
    Audio,
    /// Minimises algorithmic delay at the cost of quality.
    LowDelay,
}

impl From<OpusApplication> for Application {
    fn from(app: OpusApplication) -> Self {
        match app {
            OpusApplication::Voip => Application::Voip,
            OpusApplication::Audio => Application::Audio,
            OpusApplication::LowDelay => Application::LowDelay,
        }
    }
}

/// Default per-encode bitrate, in kbps.
pub const DEFAULT_BITRATE_KBPS: u32 = 16;

const CHANNELS: Channels = Channels::Stereo;
const SAMPLE_RATE: SampleRate = SampleRate::Hz48000;
const MAX_OPUS_PACKET_BYTES: usize = 4000;
/// 120 ms at 48 kHz stereo, the largest frame Opus supports.
const MAX_PCM_SAMPLES: usize = 48 * 120 * 2;

/// Encodes raw PCM into Opus packets.
pub struct OpusPcmEncoder {
    encoder: Encoder,
}

impl OpusPcmEncoder {
    /// Construct an encoder with the given application profile.
    pub fn new(application: OpusApplication) -> Result<Self, VoiceError> {
        let encoder = Encoder::new(SAMPLE_RATE, CHANNELS, application.into())?;
        Ok(Self { encoder })
    }

    /// Encode `pcm` (16-bit signed LE, stereo-interleaved) at `bitrate_kbps`.
    pub fn encode(&mut self, pcm: &[u8], bitrate_kbps: u32) -> Result<Vec<u8>, VoiceError> {
        self.encoder
            .set_bitrate(Bitrate::BitsPerSecond((bitrate_kbps * 1000) as i32))?;

        let samples = pcm_bytes_to_samples(pcm);
        let mut output = vec![0u8; MAX_OPUS_PACKET_BYTES];
        let len = self.encoder.encode(&samples, &mut output)?;
        output.truncate(len);
        Ok(output)
    }
}

/// Decodes Opus packets into raw PCM.
pub struct OpusPcmDecoder {
    decoder: Decoder,
}

impl OpusPcmDecoder {
    /// Construct a decoder.
    pub fn new() -> Result<Self, VoiceError> {
        let decoder = Decoder::new(SAMPLE_RATE, CHANNELS)?;
        Ok(Self { decoder })
    }

    /// Decode one Opus packet, returning 16-bit signed LE, stereo-interleaved
    /// PCM bytes.
    pub fn decode(&mut self, opus: &[u8]) -> Result<Vec<u8>, VoiceError> {
        let mut output = vec![0i16; MAX_PCM_SAMPLES];
        let packet = Packet::try_from(opus)
            .map_err(|e| VoiceError::CodecFailure(format!("invalid opus packet: {e}")))?;
        let signals = MutSignals::try_from(&mut output[..])
            .map_err(|e| VoiceError::CodecFailure(format!("invalid pcm buffer: {e}")))?;
        let samples = self.decoder.decode(Some(packet), signals, false)?;
        // `samples` is a per-channel sample count; the buffer is interleaved stereo.
        output.truncate(2 * samples);
        Ok(samples_to_pcm_bytes(&output))
    }

    /// Generate packet-loss-concealment samples for a dropped frame of
    /// `frame_samples_per_channel` samples per channel.
    pub fn decode_lost(&mut self, frame_samples_per_channel: usize) -> Result<Vec<u8>, VoiceError> {
        let mut output = vec![0i16; frame_samples_per_channel * 2];
        let signals = MutSignals::try_from(&mut output[..])
            .map_err(|e| VoiceError::CodecFailure(format!("invalid pcm buffer: {e}")))?;
        let samples = self.decoder.decode(None, signals, false)?;
        output.truncate(2 * samples);
        Ok(samples_to_pcm_bytes(&output))
    }
}

fn pcm_bytes_to_samples(pcm: &[u8]) -> Vec<i16> {
    pcm.chunks_exact(2).map(LittleEndian::read_i16).collect()
}

fn samples_to_pcm_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = vec![0u8; samples.len() * 2];
    LittleEndian::write_i16_into(samples, &mut bytes);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_pcm(frame_samples_per_channel: usize) -> Vec<u8> {
        let mut samples = Vec::with_capacity(frame_samples_per_channel * 2);
        for i in 0..frame_samples_per_channel {
            let v = ((i as f32 * 0.1).sin() * 10000.0) as i16;
            samples.push(v);
            samples.push(v);
        }
        samples_to_pcm_bytes(&samples)
    }

    #[test]
    fn encode_decode_round_trip_preserves_sample_count() {
        let mut encoder = OpusPcmEncoder::new(OpusApplication::Voip).unwrap();
        let mut decoder = OpusPcmDecoder::new().unwrap();

        let frame_samples = 48 * 20; // 20ms at 48kHz
        let pcm = sine_pcm(frame_samples);

        let opus = encoder.encode(&pcm, DEFAULT_BITRATE_KBPS).unwrap();
        assert!(!opus.is_empty());

        let decoded = decoder.decode(&opus).unwrap();
        assert_eq!(decoded.len(), pcm.len());
    }

    #[test]
    fn decode_lost_produces_concealment_samples() {
        let mut decoder = OpusPcmDecoder::new().unwrap();
        let concealed = decoder.decode_lost(48 * 20).unwrap();
        assert_eq!(concealed.len(), 48 * 20 * 2 * 2);
    }
}
