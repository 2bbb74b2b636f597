use async_trait::async_trait;
use log::debug;

use super::{owning_track, DepayStats};
use crate::av::{AccessUnit, Track};
use crate::pipeline::{Component, Envelope, Outputs};
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Selector {
    PayloadType(u8),
    Encoding(String),
}

/// Forwards RTP payloads verbatim, one access unit per packet.
///
/// Suits codecs that need no reassembly, such as G.711.
#[derive(Debug)]
pub struct BasicDepacketizer {
    selector: Selector,
    tracks: Vec<Track>,
    stats: DepayStats,
}

impl BasicDepacketizer {
    /// Owns tracks announced with this payload type.
    pub fn for_payload_type(payload_type: u8) -> Self {
        Self::with_selector(Selector::PayloadType(payload_type))
    }

    /// Owns tracks whose `rtpmap` encoding matches `name`, ignoring case.
    pub fn for_encoding(name: &str) -> Self {
        Self::with_selector(Selector::Encoding(name.to_ascii_uppercase()))
    }

    fn with_selector(selector: Selector) -> Self {
        Self {
            selector,
            tracks: Vec::new(),
            stats: DepayStats::default(),
        }
    }

    /// Counters since creation.
    pub fn stats(&self) -> DepayStats {
        self.stats
    }

    fn wants(&self, track: &Track) -> bool {
        match &self.selector {
            Selector::PayloadType(pt) => track.payload_type == *pt,
            Selector::Encoding(name) => track.encoding.eq_ignore_ascii_case(name),
        }
    }
}

#[async_trait]
impl Component for BasicDepacketizer {
    fn name(&self) -> &str {
        "basic-depay"
    }

    async fn forward(&mut self, envelope: Envelope, out: &mut Outputs) -> Result<()> {
        match envelope {
            Envelope::Sdp { ref tracks, .. } => {
                self.tracks = tracks.iter().filter(|t| self.wants(t)).cloned().collect();
                debug!("basic-depay owns {} track(s)", self.tracks.len());
                out.forward(envelope);
            }
            Envelope::Rtp {
                packet,
                channel,
                ntp_timestamp,
            } => {
                let owner = owning_track(&self.tracks, &packet, channel).map(|t| t.index);
                let Some(track_index) = owner else {
                    out.forward(Envelope::Rtp {
                        packet,
                        channel,
                        ntp_timestamp,
                    });
                    return Ok(());
                };
                self.stats.packets += 1;
                let payload = packet.payload();
                if payload.is_empty() {
                    self.stats.dropped += 1;
                    return Ok(());
                }
                let unit = AccessUnit::new(packet.payload_type(), packet.timestamp())
                    .with_part(payload)
                    .with_ntp_timestamp(ntp_timestamp)
                    .with_ssrc(packet.ssrc())
                    .with_track(track_index)
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

    fn sdp() -> Envelope {
        let mut pcmu = Track::new(0, MediaKind::Audio, 0, "PCMU", 8000);
        pcmu.interleaved = Some((0, 1));
        let mut video = Track::new(1, MediaKind::Video, 96, "H264", 90000);
        video.interleaved = Some((2, 3));
        Envelope::Sdp {
            text: String::new(),
            tracks: vec![pcmu, video],
        }
    }

    fn rtp(pt: u8, channel: u8) -> Envelope {
        let bytes = RTPPacket::new(pt, 5, 160, 9, false, Bytes::from_static(&[1, 2, 3])).to_bytes();
        Envelope::Rtp {
            packet: RtpView::parse(bytes).unwrap(),
            channel,
            ntp_timestamp: None,
        }
    }

    #[tokio::test]
    async fn test_matches_by_encoding() {
        let mut depay = BasicDepacketizer::for_encoding("pcmu");
        let mut out = Outputs::default();
        depay.forward(sdp(), &mut out).await.unwrap();
        depay.forward(rtp(0, 0), &mut out).await.unwrap();
        depay.forward(rtp(96, 2), &mut out).await.unwrap();

        match out.take_forward().as_slice() {
            [
                Envelope::Sdp { .. },
                Envelope::Elementary(unit),
                Envelope::Rtp { channel: 2, .. },
            ] => {
                assert_eq!(&unit.parts[0][..], &[1, 2, 3]);
                assert_eq!(unit.timestamp, 160);
                assert_eq!(unit.track_index, Some(0));
                assert!(unit.is_sync);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(depay.stats().units, 1);
    }

    #[tokio::test]
    async fn test_matches_by_payload_type() {
        let mut depay = BasicDepacketizer::for_payload_type(96);
        let mut out = Outputs::default();
        depay.forward(sdp(), &mut out).await.unwrap();
        // Right payload type on the wrong channel is not ours.
        depay.forward(rtp(96, 0), &mut out).await.unwrap();
        depay.forward(rtp(96, 2), &mut out).await.unwrap();

        let forwarded = out.take_forward();
        assert!(matches!(forwarded[1], Envelope::Rtp { channel: 0, .. }));
        match &forwarded[2] {
            Envelope::Elementary(unit) => assert_eq!(unit.track_index, Some(1)),
            other => panic!("unexpected {:?}", other),
        }
    }
}
