//! Fragmented ISO-BMFF (fMP4) output.
//!
//! [`Mp4Muxer`] is the pipeline stage; it writes an `ftyp`+`moov` init
//! segment from the negotiated tracks and then one `moof`+`mdat` fragment per
//! batch of samples and track.

mod boxes;
mod init;
mod muxer;

pub use boxes::{find_box, iter_boxes, BoxWriter};
pub use init::{init_segment, mime_type, SampleEntry, TrackDescription};
pub use muxer::{Mp4Muxer, MuxStats};
