//! # RTP depacketizers
//!
//! Pipeline stages that turn [`Envelope::Rtp`] into [`Envelope::Elementary`]
//! access units. Each stage learns the tracks it owns from the
//! [`Envelope::Sdp`] the session emits after SETUP and lets every other
//! envelope through untouched, so several depacketizers can be chained:
//!
//! ```rust
//! use rtspipe::format::depay::{AacDepacketizer, BasicDepacketizer, H264Depacketizer};
//! use rtspipe::pipeline::Pipeline;
//!
//! let pipeline = Pipeline::new()
//!     .then(H264Depacketizer::new())
//!     .then(AacDepacketizer::new())
//!     .then(BasicDepacketizer::for_encoding("PCMU"));
//! assert_eq!(pipeline.len(), 3);
//! ```
//!
//! Truncated or inconsistent payloads are dropped and counted; they never
//! stop the pipeline.

mod aac;
mod basic;
mod h264;

pub use aac::AacDepacketizer;
pub use basic::BasicDepacketizer;
pub use h264::H264Depacketizer;

use crate::av::Track;
use crate::format::rtp::RtpView;

/// Per-depacketizer counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DepayStats {
    /// RTP packets handled for owned tracks
    pub packets: u64,
    /// Access units emitted
    pub units: u64,
    /// Packets or partial NAL units thrown away
    pub dropped: u64,
}

/// Whether an RTP packet received on `channel` belongs to `track`.
///
/// Tracks are matched on payload type, and on interleave channel when the
/// track has one, so two tracks sharing a dynamic payload type stay apart.
fn owns(track: &Track, packet: &RtpView, channel: u8) -> bool {
    track.payload_type == packet.payload_type()
        && track.rtp_channel().map_or(true, |c| c == channel)
}

/// Finds the owned track an RTP packet belongs to.
fn owning_track<'a>(tracks: &'a [Track], packet: &RtpView, channel: u8) -> Option<&'a Track> {
    tracks.iter().find(|t| owns(t, packet, channel))
}
