use async_trait::async_trait;
use log::{debug, warn};

use super::{owning_track, DepayStats};
use crate::av::{AccessUnit, CodecType, Track};
use crate::pipeline::{Component, Envelope, Outputs};
use crate::Result;

/// Length in bytes of the RFC 3640 AU-header section at the start of
/// `payload`: the 16-bit AU-headers-length (in bits) plus the headers
/// themselves, padded to a whole byte.
///
/// `None` when the payload is too short to hold what the length announces.
pub fn au_header_section_len(payload: &[u8]) -> Option<usize> {
    let bits = u16::from_be_bytes([*payload.first()?, *payload.get(1)?]) as usize;
    let len = 2 + (bits + 7) / 8;
    (len <= payload.len()).then_some(len)
}

/// Depacketizer for `MPEG4-GENERIC` AAC (RFC 3640, AAC-hbr and AAC-lbr).
///
/// Everything after the AU-header section becomes one access unit.
#[derive(Debug, Default)]
pub struct AacDepacketizer {
    tracks: Vec<Track>,
    stats: DepayStats,
}

impl AacDepacketizer {
    /// Creates a depacketizer with no tracks yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters since creation.
    pub fn stats(&self) -> DepayStats {
        self.stats
    }

    fn wants(track: &Track) -> bool {
        track.codec() == CodecType::AAC
            && track
                .fmtp("mode")
                .map_or(true, |mode| mode.to_ascii_uppercase().starts_with("AAC"))
    }

    fn has_au_headers(track: &Track) -> bool {
        track
            .fmtp("sizelength")
            .and_then(|v| v.trim().parse::<u32>().ok())
            .map_or(false, |bits| bits > 0)
    }
}

#[async_trait]
impl Component for AacDepacketizer {
    fn name(&self) -> &str {
        "aac-depay"
    }

    async fn forward(&mut self, envelope: Envelope, out: &mut Outputs) -> Result<()> {
        match envelope {
            Envelope::Sdp { ref tracks, .. } => {
                self.tracks = tracks.iter().filter(|t| Self::wants(t)).cloned().collect();
                debug!("aac-depay owns {} track(s)", self.tracks.len());
                out.forward(envelope);
            }
            Envelope::Rtp {
                packet,
                channel,
                ntp_timestamp,
            } => {
                let Some(track) = owning_track(&self.tracks, &packet, channel) else {
                    out.forward(Envelope::Rtp {
                        packet,
                        channel,
                        ntp_timestamp,
                    });
                    return Ok(());
                };
                self.stats.packets += 1;

                let payload = packet.payload();
                let offset = if Self::has_au_headers(track) {
                    match au_header_section_len(&payload) {
                        Some(len) => len,
                        None => {
                            warn!(
                                "aac-depay: AU-header section overruns {}-byte payload (seq {})",
                                payload.len(),
                                packet.sequence_number()
                            );
                            self.stats.dropped += 1;
                            return Ok(());
                        }
                    }
                } else {
                    0
                };
                if offset >= payload.len() {
                    debug!("aac-depay: empty access unit (seq {})", packet.sequence_number());
                    self.stats.dropped += 1;
                    return Ok(());
                }

                let unit = AccessUnit::new(packet.payload_type(), packet.timestamp())
                    .with_part(payload.slice(offset..))
                    .with_ntp_timestamp(ntp_timestamp)
                    .with_ssrc(packet.ssrc())
                    .with_track(track.index)
                    .with_sync_flag(true);
                self.stats.units += 1;
                out.forward(Envelope::Elementary(unit));
            }
            other => out.forward(other),
        }
        Ok(())
    }

    async fn close(&mut self, _out: &mut Outputs) -> Result<()> {
        self.tracks.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::av::MediaKind;
    use crate::format::rtp::{RTPPacket, RtpView};
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    fn aac_track(sizelength: Option<&str>) -> Track {
        let mut track = Track::new(0, MediaKind::Audio, 97, "MPEG4-GENERIC", 48000)
            .with_fmtp("mode", "AAC-hbr")
            .with_fmtp("config", "1190");
        if let Some(bits) = sizelength {
            track = track.with_fmtp("sizelength", bits);
        }
        track.interleaved = Some((0, 1));
        track
    }

    fn sdp(track: Track) -> Envelope {
        Envelope::Sdp {
            text: String::new(),
            tracks: vec![track],
        }
    }

    fn rtp(pt: u8, ts: u32, payload: &'static [u8]) -> Envelope {
        let bytes = RTPPacket::new(pt, 1, ts, 0x55, true, Bytes::from_static(payload)).to_bytes();
        Envelope::Rtp {
            packet: RtpView::parse(bytes).unwrap(),
            channel: 0,
            ntp_timestamp: Some(1234),
        }
    }

    async fn run(depay: &mut AacDepacketizer, envelope: Envelope) -> Vec<Envelope> {
        let mut out = Outputs::default();
        depay.forward(envelope, &mut out).await.unwrap();
        out.take_forward()
    }

    #[test]
    fn test_header_section_length() {
        // One 16-bit AU header.
        assert_eq!(au_header_section_len(&[0x00, 0x10, 0x01, 0x40, 0xAA]), Some(4));
        // 13 bits round up to two bytes.
        assert_eq!(au_header_section_len(&[0x00, 0x0D, 0x01, 0x40]), Some(4));
        // 17 bits need three.
        assert_eq!(au_header_section_len(&[0x00, 0x11, 0, 0, 0]), Some(5));
        assert_eq!(au_header_section_len(&[0x00, 0x20, 0x01]), None);
        assert_eq!(au_header_section_len(&[0x00]), None);
    }

    #[tokio::test]
    async fn test_skips_au_header_section() {
        let mut depay = AacDepacketizer::new();
        let out = run(&mut depay, sdp(aac_track(Some("13")))).await;
        assert!(matches!(out.as_slice(), [Envelope::Sdp { .. }]));

        let out = run(&mut depay, rtp(97, 9000, &[0x00, 0x10, 0x01, 0x40, 0xDE, 0xAD])).await;
        match out.as_slice() {
            [Envelope::Elementary(unit)] => {
                assert_eq!(unit.parts, vec![Bytes::from_static(&[0xDE, 0xAD])]);
                assert_eq!(unit.timestamp, 9000);
                assert_eq!(unit.payload_type, 97);
                assert_eq!(unit.ntp_timestamp, Some(1234));
                assert_eq!(unit.ssrc, 0x55);
                assert_eq!(unit.track_index, Some(0));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(depay.stats().units, 1);
    }

    #[tokio::test]
    async fn test_without_header_section_payload_is_verbatim() {
        let mut depay = AacDepacketizer::new();
        run(&mut depay, sdp(aac_track(None))).await;

        let out = run(&mut depay, rtp(97, 0, &[0x00, 0x10, 0x01])).await;
        match out.as_slice() {
            [Envelope::Elementary(unit)] => assert_eq!(&unit.parts[0][..], &[0x00, 0x10, 0x01]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_truncated_and_foreign_packets() {
        let mut depay = AacDepacketizer::new();
        run(&mut depay, sdp(aac_track(Some("13")))).await;

        // Header section longer than the payload: dropped, nothing emitted.
        assert!(run(&mut depay, rtp(97, 0, &[0x00, 0x40, 0x01])).await.is_empty());
        assert_eq!(depay.stats().dropped, 1);

        // Another payload type passes through.
        let out = run(&mut depay, rtp(96, 0, &[0x65])).await;
        assert!(matches!(out.as_slice(), [Envelope::Rtp { .. }]));
        assert_eq!(depay.stats().packets, 1);
    }
}
