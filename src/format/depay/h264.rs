use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use log::{debug, warn};

use super::{owns, DepayStats};
use crate::av::{AccessUnit, CodecType, Track};
use crate::codec::h264::NALUnitType;
use crate::format::rtp::{is_next_sequence, RtpView};
use crate::pipeline::{Component, Envelope, Outputs};
use crate::Result;

const FU_START: u8 = 0x80;
const FU_END: u8 = 0x40;

/// Reassembly state for one H.264 track.
#[derive(Debug)]
struct TrackState {
    track: Track,
    /// In-progress FU-A NAL unit, reconstructed header first
    fragment: Option<BytesMut>,
    last_seq: Option<u16>,
    /// NAL units collected for the current RTP timestamp
    pending: Option<AccessUnit>,
}

impl TrackState {
    fn new(track: Track) -> Self {
        Self {
            track,
            fragment: None,
            last_seq: None,
            pending: None,
        }
    }
}

/// Depacketizer for H.264 (RFC 6184, single NAL, STAP-A and FU-A).
///
/// NAL units sharing an RTP timestamp are gathered into one access unit, which
/// is emitted when the marker bit is set, when the timestamp moves on, or on
/// close.
#[derive(Debug, Default)]
pub struct H264Depacketizer {
    tracks: Vec<TrackState>,
    stats: DepayStats,
}

impl H264Depacketizer {
    /// Creates a depacketizer with no tracks yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters since creation.
    pub fn stats(&self) -> DepayStats {
        self.stats
    }

    fn flush(state: &mut TrackState, stats: &mut DepayStats, out: &mut Outputs) {
        if let Some(unit) = state.pending.take() {
            if !unit.parts.is_empty() {
                stats.units += 1;
                out.forward(Envelope::Elementary(unit));
            }
        }
    }

    fn depacketize(
        state: &mut TrackState,
        stats: &mut DepayStats,
        packet: &RtpView,
        ntp_timestamp: Option<u64>,
        out: &mut Outputs,
    ) {
        stats.packets += 1;
        let seq = packet.sequence_number();
        if let Some(last) = state.last_seq {
            if !is_next_sequence(last, seq) && state.fragment.take().is_some() {
                debug!(
                    "h264-depay: sequence jumped {} -> {}, discarding partial NAL",
                    last, seq
                );
                stats.dropped += 1;
            }
        }
        state.last_seq = Some(seq);

        if state
            .pending
            .as_ref()
            .map_or(false, |unit| unit.timestamp != packet.timestamp())
        {
            Self::flush(state, stats, out);
        }

        let payload = packet.payload();
        let Some(&indicator) = payload.first() else {
            debug!("h264-depay: empty payload (seq {})", seq);
            stats.dropped += 1;
            return;
        };

        let nals = match NALUnitType::from(indicator) {
            NALUnitType::StapA => match split_stap_a(&payload) {
                Some(nals) => nals,
                None => {
                    warn!("h264-depay: malformed STAP-A (seq {}), dropped", seq);
                    stats.dropped += 1;
                    return;
                }
            },
            NALUnitType::FuA => {
                let Some(&header) = payload.get(1) else {
                    warn!("h264-depay: truncated FU-A (seq {}), dropped", seq);
                    stats.dropped += 1;
                    return;
                };
                let data = &payload[2..];
                if header & FU_START != 0 {
                    if state.fragment.is_some() {
                        debug!("h264-depay: FU-A restarted before its end (seq {})", seq);
                        stats.dropped += 1;
                    }
                    let mut nal = BytesMut::with_capacity(1 + data.len());
                    nal.put_u8((indicator & 0xE0) | (header & 0x1F));
                    nal.put_slice(data);
                    state.fragment = Some(nal);
                } else if let Some(ref mut nal) = state.fragment {
                    nal.put_slice(data);
                } else {
                    debug!("h264-depay: FU-A continuation without start (seq {})", seq);
                    stats.dropped += 1;
                    return;
                }

                if header & FU_END != 0 {
                    state
                        .fragment
                        .take()
                        .map(BytesMut::freeze)
                        .into_iter()
                        .collect()
                } else {
                    Vec::new()
                }
            }
            NALUnitType::Unsupported(kind) => {
                debug!("h264-depay: NAL type {} not supported (seq {})", kind, seq);
                stats.dropped += 1;
                return;
            }
            _ => vec![payload],
        };

        if !nals.is_empty() {
            let track_index = state.track.index;
            let unit = state.pending.get_or_insert_with(|| {
                AccessUnit::new(packet.payload_type(), packet.timestamp())
                    .with_ntp_timestamp(ntp_timestamp)
                    .with_ssrc(packet.ssrc())
                    .with_track(track_index)
            });
            for nal in nals {
                if nal.first().map_or(false, |&h| NALUnitType::from(h).is_idr()) {
                    unit.is_sync = true;
                }
                unit.parts.push(nal);
            }
        }

        if packet.marker() {
            Self::flush(state, stats, out);
        }
    }
}

/// Splits a STAP-A payload into its NAL units.
///
/// `None` when a length prefix runs past the end of the payload.
pub fn split_stap_a(payload: &Bytes) -> Option<Vec<Bytes>> {
    let mut nals = Vec::new();
    let mut offset = 1;
    while offset < payload.len() {
        let size = u16::from_be_bytes([*payload.get(offset)?, *payload.get(offset + 1)?]) as usize;
        offset += 2;
        if offset + size > payload.len() {
            return None;
        }
        if size > 0 {
            nals.push(payload.slice(offset..offset + size));
        }
        offset += size;
    }
    Some(nals)
}

#[async_trait]
impl Component for H264Depacketizer {
    fn name(&self) -> &str {
        "h264-depay"
    }

    async fn forward(&mut self, envelope: Envelope, out: &mut Outputs) -> Result<()> {
        match envelope {
            Envelope::Sdp { ref tracks, .. } => {
                for state in &mut self.tracks {
                    Self::flush(state, &mut self.stats, out);
                }
                self.tracks = tracks
                    .iter()
                    .filter(|t| t.codec() == CodecType::H264)
                    .cloned()
                    .map(TrackState::new)
                    .collect();
                debug!("h264-depay owns {} track(s)", self.tracks.len());
                out.forward(envelope);
            }
            Envelope::Rtp {
                packet,
                channel,
                ntp_timestamp,
            } => {
                let owner = self
                    .tracks
                    .iter()
                    .position(|s| owns(&s.track, &packet, channel));
                match owner {
                    Some(i) => Self::depacketize(
                        &mut self.tracks[i],
                        &mut self.stats,
                        &packet,
                        ntp_timestamp,
                        out,
                    ),
                    None => out.forward(Envelope::Rtp {
                        packet,
                        channel,
                        ntp_timestamp,
                    }),
                }
            }
            Envelope::EndOfStream => {
                for state in &mut self.tracks {
                    Self::flush(state, &mut self.stats, out);
                }
                out.forward(Envelope::EndOfStream);
            }
            other => out.forward(other),
        }
        Ok(())
    }

    async fn close(&mut self, out: &mut Outputs) -> Result<()> {
        for state in &mut self.tracks {
            if state.fragment.take().is_some() {
                self.stats.dropped += 1;
            }
            Self::flush(state, &mut self.stats, out);
        }
        self.tracks.clear();
        Ok(())
    }
}
