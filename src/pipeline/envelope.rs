use bytes::Bytes;
use std::fmt;

use crate::av::{AccessUnit, Track};
use crate::format::rtp::RtpView;

/// Application command travelling toward the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Negotiate if needed, then start or resume playback
    Play,
    /// Pause a playing session
    Pause,
    /// Tear the session down
    Teardown,
}

/// Whether a segment initializes a stream or carries media.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// `ftyp` + `moov`
    Init,
    /// `moof` + `mdat`
    Fragment,
}

/// A chunk of fragmented ISO-BMFF output.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Init or media
    pub kind: SegmentKind,
    /// Serialized boxes
    pub data: Bytes,
    /// `mfhd` sequence number, 0 for the init segment
    pub sequence_number: u32,
    /// Track the fragment belongs to, 0 for the init segment
    pub track_id: u32,
    /// `tfdt` base media decode time in timescale units
    pub base_decode_time: u64,
    /// Track timescale (its RTP clock rate)
    pub timescale: u32,
    /// Samples in the fragment
    pub sample_count: u32,
    /// Summed sample durations in timescale units
    pub duration: u64,
    /// RFC 6381 MIME type, set on the init segment
    pub mime_type: Option<String>,
}

impl Segment {
    /// Builds an initialization segment.
    pub fn init(data: Bytes, mime_type: String) -> Self {
        Self {
            kind: SegmentKind::Init,
            data,
            sequence_number: 0,
            track_id: 0,
            base_decode_time: 0,
            timescale: 0,
            sample_count: 0,
            duration: 0,
            mime_type: Some(mime_type),
        }
    }

    /// Whether this is the initialization segment.
    pub fn is_init(&self) -> bool {
        self.kind == SegmentKind::Init
    }

    /// Presentation start, in seconds.
    pub fn start_seconds(&self) -> f64 {
        if self.timescale == 0 {
            return 0.0;
        }
        self.base_decode_time as f64 / self.timescale as f64
    }

    /// Presentation end, in seconds.
    pub fn end_seconds(&self) -> f64 {
        if self.timescale == 0 {
            return 0.0;
        }
        (self.base_decode_time + self.duration) as f64 / self.timescale as f64
    }
}

/// The unit of data passed between pipeline stages.
///
/// Ownership moves with the envelope: a stage that emits one no longer holds it.
#[derive(Debug, Clone)]
pub enum Envelope {
    /// Transport bytes, inbound in the forward direction and outbound in reverse
    Raw(Bytes),
    /// One RTP packet demultiplexed from an interleaved frame
    Rtp {
        /// Parsed header view over the frame
        packet: RtpView,
        /// Interleave channel it arrived on
        channel: u8,
        /// Wall-clock time in milliseconds since 1900, once a sender report mapped it
        ntp_timestamp: Option<u64>,
    },
    /// One (possibly compound) RTCP packet
    Rtcp {
        /// Raw compound packet
        data: Bytes,
        /// Interleave channel it arrived on
        channel: u8,
    },
    /// Session description and the tracks negotiated from it
    Sdp {
        /// Body of the DESCRIBE response
        text: String,
        /// Tracks with their interleave channels assigned
        tracks: Vec<Track>,
    },
    /// A reconstructed access unit
    Elementary(AccessUnit),
    /// Fragmented MP4 output
    Isom(Segment),
    /// No more media will follow
    EndOfStream,
    /// Application command
    Control(Command),
}

impl Envelope {
    /// The variant tag, used to index handler tables.
    pub fn message_type(&self) -> MessageType {
        match self {
            Envelope::Raw(_) => MessageType::Raw,
            Envelope::Rtp { .. } => MessageType::Rtp,
            Envelope::Rtcp { .. } => MessageType::Rtcp,
            Envelope::Sdp { .. } => MessageType::Sdp,
            Envelope::Elementary(_) => MessageType::Elementary,
            Envelope::Isom(_) => MessageType::Isom,
            Envelope::EndOfStream => MessageType::EndOfStream,
            Envelope::Control(_) => MessageType::Control,
        }
    }
}

/// Field-less mirror of [`Envelope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// [`Envelope::Raw`]
    Raw,
    /// [`Envelope::Rtp`]
    Rtp,
    /// [`Envelope::Rtcp`]
    Rtcp,
    /// [`Envelope::Sdp`]
    Sdp,
    /// [`Envelope::Elementary`]
    Elementary,
    /// [`Envelope::Isom`]
    Isom,
    /// [`Envelope::EndOfStream`]
    EndOfStream,
    /// [`Envelope::Control`]
    Control,
}

impl MessageType {
    /// Number of variants.
    pub const COUNT: usize = 8;

    /// Every variant, in table order.
    pub const ALL: [MessageType; MessageType::COUNT] = [
        MessageType::Raw,
        MessageType::Rtp,
        MessageType::Rtcp,
        MessageType::Sdp,
        MessageType::Elementary,
        MessageType::Isom,
        MessageType::EndOfStream,
        MessageType::Control,
    ];

    /// Slot in a handler table.
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::Raw => "raw",
            MessageType::Rtp => "rtp",
            MessageType::Rtcp => "rtcp",
            MessageType::Sdp => "sdp",
            MessageType::Elementary => "elementary",
            MessageType::Isom => "isom",
            MessageType::EndOfStream => "end-of-stream",
            MessageType::Control => "control",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_indices_are_dense() {
        for (i, ty) in MessageType::ALL.iter().enumerate() {
            assert_eq!(ty.index(), i);
        }
        assert_eq!(Envelope::EndOfStream.message_type(), MessageType::EndOfStream);
        assert_eq!(
            Envelope::Control(Command::Play).message_type().to_string(),
            "control"
        );
    }

    #[test]
    fn test_segment_times() {
        let seg = Segment {
            kind: SegmentKind::Fragment,
            data: Bytes::new(),
            sequence_number: 1,
            track_id: 1,
            base_decode_time: 90000,
            timescale: 90000,
            sample_count: 25,
            duration: 45000,
            mime_type: None,
        };
        assert_eq!(seg.start_seconds(), 1.0);
        assert_eq!(seg.end_seconds(), 1.5);
        assert!(!seg.is_init());
        assert_eq!(Segment::init(Bytes::new(), "video/mp4".into()).start_seconds(), 0.0);
    }
}
