use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info, warn};

use super::boxes::BoxWriter;
use super::init::{init_segment, mime_type, TrackDescription};
use crate::av::{AccessUnit, CodecType, MediaKind, Track};
use crate::config::MuxConfig;
use crate::format::rtcp::RTCPPacket;
use crate::pipeline::{Component, Envelope, Outputs, Segment, SegmentKind};
use crate::{PipeError, Result};

const SYNC_SAMPLE_FLAGS: u32 = 0x0200_0000;
const NON_SYNC_SAMPLE_FLAGS: u32 = 0x0101_0000;

/// Counters kept by [`Mp4Muxer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MuxStats {
    /// Media fragments emitted
    pub fragments: u64,
    /// Samples written into fragments
    pub samples: u64,
    /// Units that arrived out of order and were sorted back in
    pub reordered: u64,
    /// Units that arrived too late to be reordered
    pub dropped_late: u64,
}

#[derive(Debug)]
struct Sample {
    /// Decode time relative to the track's first unit
    dts: i64,
    parts: Vec<Bytes>,
    is_sync: bool,
    duration: u32,
}

#[derive(Debug)]
struct TrackState {
    desc: TrackDescription,
    track_index: usize,
    rtcp_channel: Option<u8>,
    ssrc: Option<u32>,
    /// Last RTP timestamp seen and its extended value
    last_rtp: Option<(u32, i64)>,
    window: Vec<Sample>,
    last_released: Option<i64>,
    origin: Option<i64>,
    pending: Vec<Sample>,
    next_decode_time: u64,
    last_duration: Option<u32>,
    finalized: bool,
}

impl TrackState {
    fn new(desc: TrackDescription, track: &Track) -> Self {
        Self {
            desc,
            track_index: track.index,
            rtcp_channel: track.rtcp_channel(),
            ssrc: None,
            last_rtp: None,
            window: Vec::new(),
            last_released: None,
            origin: None,
            pending: Vec::new(),
            next_decode_time: 0,
            last_duration: None,
            finalized: false,
        }
    }

    /// Unwraps a 32-bit RTP timestamp against the last one seen.
    fn extend(&mut self, rtp: u32) -> i64 {
        let ext = match self.last_rtp {
            Some((last, last_ext)) => last_ext + rtp.wrapping_sub(last) as i32 as i64,
            None => 0,
        };
        self.last_rtp = Some((rtp, ext));
        ext
    }

    /// Whether `unit` belongs to this track. Units tagged by a depacketizer
    /// are matched on track index; untagged ones on payload type and, once
    /// the track has seen a sender, on SSRC.
    fn owns(&self, unit: &AccessUnit) -> bool {
        match unit.track_index {
            Some(index) => index == self.track_index,
            None => {
                self.desc.payload_type == unit.payload_type
                    && self.ssrc.map_or(true, |ssrc| ssrc == unit.ssrc)
            }
        }
    }

    fn pending_duration(&self) -> u64 {
        self.pending.iter().map(|s| s.duration as u64).sum()
    }
}

/// Fragmenting ISO-BMFF muxer.
///
/// Turns the tracks of the session description into one init segment, then
/// batches each track's access units into `moof`+`mdat` fragments whose decode
/// times are contiguous per track.
#[derive(Debug)]
pub struct Mp4Muxer {
    config: MuxConfig,
    tracks: Vec<TrackState>,
    sequence: u32,
    init_sent: bool,
    eos_sent: bool,
    stats: MuxStats,
}

impl Mp4Muxer {
    /// Creates a muxer that waits for a session description.
    pub fn new(config: MuxConfig) -> Self {
        Self {
            config,
            tracks: Vec::new(),
            sequence: 0,
            init_sent: false,
            eos_sent: false,
            stats: MuxStats::default(),
        }
    }

    /// Counters since creation.
    pub fn stats(&self) -> MuxStats {
        self.stats
    }

    fn on_description(&mut self, tracks: &[Track], out: &mut Outputs) {
        if self.init_sent {
            debug!("mp4: init segment already sent, ignoring new description");
            return;
        }
        let states: Vec<TrackState> = tracks
            .iter()
            .filter(|t| matches!(t.kind, MediaKind::Video | MediaKind::Audio))
            .map(|t| TrackState::new(TrackDescription::from_track(t), t))
            .collect();
        if states.is_empty() {
            warn!("mp4: no audio or video tracks to mux");
            return;
        }

        let descriptions: Vec<TrackDescription> = states.iter().map(|s| s.desc.clone()).collect();
        let mime = mime_type(&descriptions);
        info!("mp4: {} track(s), {}", descriptions.len(), mime);
        out.forward(Envelope::Isom(Segment::init(init_segment(&descriptions), mime)));

        self.tracks = states;
        self.init_sent = true;
    }

    fn on_unit(&mut self, unit: AccessUnit, out: &mut Outputs) {
        let reorder_window = self.config.reorder_window;
        let Some(index) = self.tracks.iter().position(|t| t.owns(&unit)) else {
            out.forward(Envelope::Elementary(unit));
            return;
        };
        let track = &mut self.tracks[index];
        if track.finalized {
            debug!("mp4: track {} already finalized, dropping unit", track.desc.track_id);
            return;
        }
        if track.ssrc.is_none() {
            track.ssrc = Some(unit.ssrc);
        }

        let dts = track.extend(unit.timestamp);
        if track.last_released.map_or(false, |last| dts < last) {
            self.stats.dropped_late += 1;
            out.error(PipeError::Mux(format!(
                "track {}: unit at {} is older than released sample at {}",
                track.desc.track_id,
                dts,
                track.last_released.unwrap_or_default()
            )));
            return;
        }

        let sample = Sample {
            dts,
            parts: unit.parts,
            is_sync: unit.is_sync,
            duration: 0,
        };
        let at = track.window.partition_point(|s| s.dts <= dts);
        if at < track.window.len() {
            self.stats.reordered += 1;
        }
        track.window.insert(at, sample);

        while self.tracks[index].window.len() > reorder_window {
            let sample = self.tracks[index].window.remove(0);
            self.release(index, sample, out);
        }
    }

    /// Appends a sample to the pending fragment, cutting the fragment first
    /// when it is full.
    fn release(&mut self, index: usize, mut sample: Sample, out: &mut Outputs) {
        let fragment_ms = self.config.fragment_duration.as_millis() as u64;
        let max_samples = self.config.max_samples_per_fragment.max(1);

        let track = &mut self.tracks[index];
        let origin = *track.origin.get_or_insert(sample.dts);
        sample.dts -= origin;
        track.last_released = Some(sample.dts + origin);

        if let Some(prev) = track.pending.last_mut() {
            prev.duration = (sample.dts - prev.dts).max(0) as u32;
        }

        let timescale = track.desc.timescale as u64;
        let elapsed_ms = track.pending_duration() * 1000 / timescale.max(1);
        let boundary = !track.desc.is_video() || sample.is_sync;
        let cut = track.pending.len() >= max_samples || (elapsed_ms >= fragment_ms && boundary);
        if cut && !track.pending.is_empty() {
            self.flush_track(index, out);
        }
        self.tracks[index].pending.push(sample);
    }

    /// Writes everything pending on a track as one fragment.
    fn flush_track(&mut self, index: usize, out: &mut Outputs) {
        let track = &mut self.tracks[index];
        if track.pending.is_empty() {
            return;
        }
        let samples = std::mem::take(&mut track.pending);
        let base = track.next_decode_time;
        let duration: u64 = samples.iter().map(|s| s.duration as u64).sum();
        track.next_decode_time += duration;
        track.last_duration = samples.last().map(|s| s.duration);

        self.sequence += 1;
        let data = write_fragment(self.sequence, &track.desc, base, &samples);
        self.stats.fragments += 1;
        self.stats.samples += samples.len() as u64;
        debug!(
            "mp4: fragment {} track {} base {} samples {}",
            self.sequence,
            track.desc.track_id,
            base,
            samples.len()
        );

        out.forward(Envelope::Isom(Segment {
            kind: SegmentKind::Fragment,
            data,
            sequence_number: self.sequence,
            track_id: track.desc.track_id,
            base_decode_time: base,
            timescale: track.desc.timescale,
            sample_count: samples.len() as u32,
            duration,
            mime_type: None,
        }));
    }

    /// Releases the reorder window and writes the last fragment of a track.
    fn finalize(&mut self, index: usize, out: &mut Outputs) {
        if self.tracks[index].finalized {
            return;
        }
        let window = std::mem::take(&mut self.tracks[index].window);
        for sample in window {
            self.release(index, sample, out);
        }

        let track = &mut self.tracks[index];
        let count = track.pending.len();
        if count > 0 {
            let estimate = match count {
                1 => track.last_duration.unwrap_or(track.desc.default_duration),
                n => track.pending[n - 2].duration,
            };
            track.pending[count - 1].duration = estimate;
        }
        self.flush_track(index, out);
        self.tracks[index].finalized = true;
        info!("mp4: track {} finalized", self.tracks[index].desc.track_id);
    }

    fn finalize_all(&mut self, out: &mut Outputs) {
        for index in 0..self.tracks.len() {
            self.finalize(index, out);
        }
    }

    fn end_of_stream(&mut self, out: &mut Outputs) {
        if !self.eos_sent {
            self.eos_sent = true;
            out.forward(Envelope::EndOfStream);
        }
    }

    fn on_rtcp(&mut self, data: &Bytes, channel: u8, out: &mut Outputs) {
        let packets = match RTCPPacket::parse_compound(data) {
            Ok(packets) => packets,
            Err(e) => {
                debug!("mp4: ignoring RTCP on channel {}: {}", channel, e);
                return;
            }
        };
        for packet in packets {
            let RTCPPacket::Goodbye { sources, reason } = packet else {
                continue;
            };
            for index in 0..self.tracks.len() {
                let track = &self.tracks[index];
                let leaving = match track.ssrc {
                    Some(ssrc) => sources.contains(&ssrc),
                    None => track.rtcp_channel == Some(channel),
                };
                if leaving && !track.finalized {
                    debug!(
                        "mp4: BYE for track {} ({})",
                        track.desc.track_id,
                        reason.as_deref().unwrap_or("no reason")
                    );
                    self.finalize(index, out);
                }
            }
        }
    }

    fn all_finalized(&self) -> bool {
        !self.tracks.is_empty() && self.tracks.iter().all(|t| t.finalized)
    }
}

#[async_trait]
impl Component for Mp4Muxer {
    fn name(&self) -> &str {
        "mp4-mux"
    }

    async fn forward(&mut self, envelope: Envelope, out: &mut Outputs) -> Result<()> {
        match envelope {
            Envelope::Sdp { ref tracks, .. } => {
                let tracks = tracks.clone();
                out.forward(envelope);
                self.on_description(&tracks, out);
            }
            Envelope::Elementary(unit) => {
                if self.init_sent {
                    self.on_unit(unit, out);
                } else {
                    out.forward(Envelope::Elementary(unit));
                }
            }
            Envelope::Rtcp { data, channel } => {
                self.on_rtcp(&data, channel, out);
                out.forward(Envelope::Rtcp { data, channel });
                if self.all_finalized() {
                    self.end_of_stream(out);
                }
            }
            Envelope::EndOfStream => {
                self.finalize_all(out);
                self.end_of_stream(out);
            }
            other => out.forward(other),
        }
        Ok(())
    }

    async fn close(&mut self, out: &mut Outputs) -> Result<()> {
        if !self.tracks.is_empty() {
            self.finalize_all(out);
            self.end_of_stream(out);
        }
        self.tracks.clear();
        Ok(())
    }
}

fn sample_size(codec: CodecType, sample: &Sample) -> usize {
    let body: usize = sample.parts.iter().map(Bytes::len).sum();
    match codec {
        CodecType::H264 => body + 4 * sample.parts.len(),
        _ => body,
    }
}

/// Serializes one `moof` + `mdat` pair for a single track.
fn write_fragment(sequence: u32, desc: &TrackDescription, base: u64, samples: &[Sample]) -> Bytes {
    let mut w = BoxWriter::new();
    w.begin(b"moof");
    w.begin_full(b"mfhd", 0, 0).u32(sequence).end();
    w.begin(b"traf");
    // default-base-is-moof
    w.begin_full(b"tfhd", 0, 0x02_0000).u32(desc.track_id).end();
    w.begin_full(b"tfdt", 1, 0).u64(base).end();
    // data offset, duration, size, flags, composition offset
    w.begin_full(b"trun", 0, 0x00_0F01).u32(samples.len() as u32);
    let data_offset_at = w.len();
    w.u32(0);
    for sample in samples {
        let flags = if sample.is_sync {
            SYNC_SAMPLE_FLAGS
        } else {
            NON_SYNC_SAMPLE_FLAGS
        };
        w.u32(sample.duration)
            .u32(sample_size(desc.codec, sample) as u32)
            .u32(flags)
            .u32(0);
    }
    w.end().end().end();
    let moof_size = w.len();
    w.patch_u32(data_offset_at, moof_size as u32 + 8);

    w.begin(b"mdat");
    for sample in samples {
        for part in &sample.parts {
            if desc.codec == CodecType::H264 {
                w.u32(part.len() as u32);
            }
            w.bytes(part);
        }
    }
    w.end();
    w.finish()
}
