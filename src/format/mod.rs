//! Wire formats and the stages that translate between them.
//!
//! - [`rtp`] / [`rtcp`]: packet views and codecs
//! - [`rtsp`]: the session state machine, its collaborators and the client driver
//! - [`depay`]: RTP payload to access-unit depacketizers
//! - [`mp4`]: fragmented ISO-BMFF muxer

/// RTP payload to access-unit stages
pub mod depay;
/// Fragmented MP4 output
pub mod mp4;
/// RTCP packets
pub mod rtcp;
/// RTP packets
pub mod rtp;
/// RTSP session and client
pub mod rtsp;

pub use self::depay::{AacDepacketizer, BasicDepacketizer, H264Depacketizer};
pub use self::mp4::{Mp4Muxer, MuxStats};
pub use self::rtcp::{RTCPPacket, ReceptionReport};
pub use self::rtp::{RTPPacket, RtpView};
pub use self::rtsp::{RtspClient, RtspSession, SessionState, TransportInfo};
