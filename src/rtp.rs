//! RTP framing: 12-byte header build/parse, nonce derivation, and header
//! extension stripping on receive.

use crate::error::VoiceError;
use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Size of an RTP header, in bytes.
pub const RTP_HEADER_SIZE: usize = 12;

/// Size of the secretbox nonce derived from the header.
pub const NONCE_SIZE: usize = 24;

const RTP_VERSION_BYTE: u8 = 0x80;
const RTP_PAYLOAD_TYPE_OPUS: u8 = 0x78;
const EXTENSION_MARKER: u16 = 0xBEDE;

/// Build a 12-byte RTP header: version/payload-type, sequence, timestamp,
/// SSRC, all big-endian.
pub fn build_header(seq: u16, timestamp: u32, ssrc: u32) -> [u8; RTP_HEADER_SIZE] {
    let mut header = [0u8; RTP_HEADER_SIZE];
    header[0] = RTP_VERSION_BYTE;
    header[1] = RTP_PAYLOAD_TYPE_OPUS;
    BigEndian::write_u16(&mut header[2..4], seq);
    BigEndian::write_u32(&mut header[4..8], timestamp);
    BigEndian::write_u32(&mut header[8..12], ssrc);
    header
}

/// Append ciphertext to a header to produce a full wire packet.
pub fn frame_payload(header: &[u8; RTP_HEADER_SIZE], ciphertext: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(RTP_HEADER_SIZE + ciphertext.len());
    packet.extend_from_slice(header);
    packet.extend_from_slice(ciphertext);
    packet
}

/// Parsed RTP header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    /// Sequence number.
    pub seq: u16,
    /// RTP timestamp.
    pub timestamp: u32,
    /// Synchronization source identifier.
    pub ssrc: u32,
    /// Whether the extension bit (bit 4 of byte 0) is set.
    pub has_extension: bool,
}

/// Parse the 12-byte header prefix of `packet`.
pub fn parse_header(packet: &[u8]) -> Result<RtpHeader, VoiceError> {
    if packet.len() < RTP_HEADER_SIZE {
        return Err(VoiceError::MalformedPacket("packet shorter than RTP header"));
    }
    let has_extension = packet[0] & 0x10 != 0;
    Ok(RtpHeader {
        seq: BigEndian::read_u16(&packet[2..4]),
        timestamp: BigEndian::read_u32(&packet[4..8]),
        ssrc: BigEndian::read_u32(&packet[8..12]),
        has_extension,
    })
}

/// The raw header bytes, as required by [`make_nonce`] and encryption.
pub fn header_bytes(packet: &[u8]) -> Result<[u8; RTP_HEADER_SIZE], VoiceError> {
    if packet.len() < RTP_HEADER_SIZE {
        return Err(VoiceError::MalformedPacket("packet shorter than RTP header"));
    }
    let mut header = [0u8; RTP_HEADER_SIZE];
    header.copy_from_slice(&packet[..RTP_HEADER_SIZE]);
    Ok(header)
}

/// Derive the secretbox nonce: the header, zero-padded on the right to
/// [`NONCE_SIZE`] bytes.
pub fn make_nonce(header: &[u8; RTP_HEADER_SIZE]) -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    nonce[..RTP_HEADER_SIZE].copy_from_slice(header);
    nonce
}

/// Given a decrypted payload, return the offset at which the Opus packet
/// begins, skipping a one-byte RFC 5285 header extension if present.
///
/// `has_extension` must come from the RTP header's extension bit; if unset,
/// the offset is always zero.
pub fn strip_extension(payload: &[u8], has_extension: bool) -> usize {
    if !has_extension || payload.len() < 4 {
        return 0;
    }
    if BigEndian::read_u16(&payload[0..2]) != EXTENSION_MARKER {
        return 0;
    }
    let element_count = BigEndian::read_u16(&payload[2..4]) as usize;
    let mut offset = 4;
    for _ in 0..element_count {
        if offset >= payload.len() {
            break;
        }
        let header_byte = payload[offset];
        offset += 1;
        // Skip any zero-byte padding between elements.
        if header_byte == 0 {
            continue;
        }
        let len = (header_byte & 0x0F) as usize + 1;
        offset += len;
    }
    // Skip trailing zero padding up to the next word boundary.
    while offset < payload.len() && payload[offset] == 0 {
        offset += 1;
    }
    offset.min(payload.len())
}

/// The 70-byte IP discovery probe: 66 zero bytes then the SSRC, little-endian.
pub fn build_discovery_probe(ssrc: u32) -> [u8; 70] {
    let mut probe = [0u8; 70];
    LittleEndian::write_u32(&mut probe[66..70], ssrc);
    probe
}

/// Parse an IP discovery response: nul-terminated ASCII address starting at
/// byte 4, big-endian port in the last two bytes.
pub fn parse_discovery_response(response: &[u8]) -> Result<(String, u16), VoiceError> {
    if response.len() < 6 {
        return Err(VoiceError::MalformedPacket("IP discovery response too short"));
    }
    let addr_bytes = &response[4..response.len() - 2];
    let addr_end = addr_bytes.iter().position(|&b| b == 0).unwrap_or(addr_bytes.len());
    let address = String::from_utf8_lossy(&addr_bytes[..addr_end]).into_owned();
    let port = BigEndian::read_u16(&response[response.len() - 2..]);
    Ok((address, port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn build_and_parse_round_trip() {
        let header = build_header(100, 48000, 12345);
        assert_eq!(header[0], 0x80);
        assert_eq!(header[1], 0x78);
        let parsed = parse_header(&header).unwrap();
        assert_eq!(parsed.seq, 100);
        assert_eq!(parsed.timestamp, 48000);
        assert_eq!(parsed.ssrc, 12345);
        assert!(!parsed.has_extension);
    }

    #[test]
    fn parse_header_rejects_short_packet() {
        let err = parse_header(&[0u8; 11]).unwrap_err();
        assert!(matches!(err, VoiceError::MalformedPacket(_)));
    }

    #[test]
    fn nonce_is_header_padded_with_zeros() {
        let header = build_header(1, 960, 42);
        let nonce = make_nonce(&header);
        assert_eq!(&nonce[..RTP_HEADER_SIZE], &header[..]);
        assert_eq!(&nonce[RTP_HEADER_SIZE..], &[0u8; 12][..]);
    }

    #[test]
    fn discovery_probe_has_ssrc_at_66_and_zeros_elsewhere() {
        let probe = build_discovery_probe(42);
        assert_eq!(probe.len(), 70);
        assert_eq!(&probe[66..70], &[42, 0, 0, 0]);
        assert!(probe[..66].iter().all(|&b| b == 0));
    }

    #[test]
    fn strip_extension_skips_bede_marker() {
        // marker, one element count, one element of length-nibble 2 (=> 3 bytes), then opus data
        let mut payload = vec![0xBE, 0xDE, 0x00, 0x01, 0x02, 0xAA, 0xBB, 0xCC];
        let opus = [0x11u8, 0x22, 0x33];
        payload.extend_from_slice(&opus);
        let offset = strip_extension(&payload, true);
        assert_eq!(&payload[offset..], &opus);
    }

    #[test]
    fn strip_extension_is_noop_without_extension_bit() {
        let payload = [0xBE, 0xDE, 0x00, 0x00];
        assert_eq!(strip_extension(&payload, false), 0);
    }

    proptest! {
        #[test]
        fn header_round_trips_for_any_fields(seq: u16, timestamp: u32, ssrc: u32) {
            let header = build_header(seq, timestamp, ssrc);
            let parsed = parse_header(&header).unwrap();
            prop_assert_eq!(parsed.seq, seq);
            prop_assert_eq!(parsed.timestamp, timestamp);
            prop_assert_eq!(parsed.ssrc, ssrc);
        }

        #[test]
        fn nonce_always_zero_pads_the_tail(seq: u16, timestamp: u32, ssrc: u32) {
            let header = build_header(seq, timestamp, ssrc);
            let nonce = make_nonce(&header);
            prop_assert_eq!(&nonce[RTP_HEADER_SIZE..], &[0u8; 12][..]);
        }

        #[test]
        fn discovery_probe_always_carries_ssrc_at_a_fixed_offset(ssrc: u32) {
            let probe = build_discovery_probe(ssrc);
            prop_assert_eq!(LittleEndian::read_u32(&probe[66..70]), ssrc);
            prop_assert!(probe[..66].iter().all(|&b| b == 0));
        }
    }
}
