use std::collections::HashMap;

mod unit;
pub use unit::*;

/// Codecs the depacketizers and the muxer know how to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecType {
    /// H.264/AVC
    H264,
    /// MPEG-4 AAC carried as RFC 3640 `MPEG4-GENERIC`
    AAC,
    /// G.711 mu-law
    PCMU,
    /// G.711 A-law
    PCMA,
    /// Anything else; forwarded verbatim
    Unknown,
}

impl CodecType {
    /// Maps an SDP `rtpmap` encoding name to a codec.
    pub fn from_encoding(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "H264" => CodecType::H264,
            "MPEG4-GENERIC" => CodecType::AAC,
            "PCMU" => CodecType::PCMU,
            "PCMA" => CodecType::PCMA,
            _ => CodecType::Unknown,
        }
    }
}

/// SDP media type of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// `m=video`
    Video,
    /// `m=audio`
    Audio,
    /// `m=application` or anything unrecognised
    Application,
}

impl MediaKind {
    /// Parses the first token of an `m=` line.
    pub fn parse(media: &str) -> Self {
        match media {
            "video" => MediaKind::Video,
            "audio" => MediaKind::Audio,
            _ => MediaKind::Application,
        }
    }
}

/// One negotiated media track.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    /// Position in the session description
    pub index: usize,
    /// Media type
    pub kind: MediaKind,
    /// RTP payload type
    pub payload_type: u8,
    /// Encoding name from `rtpmap`, e.g. `H264`
    pub encoding: String,
    /// RTP clock rate in Hz
    pub clock_rate: u32,
    /// Audio channel count, when announced
    pub channels: Option<u16>,
    /// `fmtp` parameters, keys lower-cased
    pub fmtp: HashMap<String, String>,
    /// Absolute control URL used for SETUP
    pub control: Option<String>,
    /// Interleaved RTP/RTCP channel pair assigned at SETUP
    pub interleaved: Option<(u8, u8)>,
}

impl Track {
    /// Creates a track with no format parameters.
    pub fn new(
        index: usize,
        kind: MediaKind,
        payload_type: u8,
        encoding: &str,
        clock_rate: u32,
    ) -> Self {
        Self {
            index,
            kind,
            payload_type,
            encoding: encoding.to_string(),
            clock_rate,
            channels: None,
            fmtp: HashMap::new(),
            control: None,
            interleaved: None,
        }
    }

    /// Adds a format parameter.
    pub fn with_fmtp(mut self, key: &str, value: &str) -> Self {
        self.fmtp.insert(key.to_ascii_lowercase(), value.to_string());
        self
    }

    /// Sets the control URL.
    pub fn with_control(mut self, control: &str) -> Self {
        self.control = Some(control.to_string());
        self
    }

    /// Codec derived from the encoding name.
    pub fn codec(&self) -> CodecType {
        CodecType::from_encoding(&self.encoding)
    }

    /// Looks up a format parameter, case-insensitively.
    pub fn fmtp(&self, key: &str) -> Option<&str> {
        self.fmtp.get(&key.to_ascii_lowercase()).map(String::as_str)
    }

    /// Channel carrying this track's RTP packets.
    pub fn rtp_channel(&self) -> Option<u8> {
        self.interleaved.map(|(rtp, _)| rtp)
    }

    /// Channel carrying this track's RTCP packets.
    pub fn rtcp_channel(&self) -> Option<u8> {
        self.interleaved.map(|(_, rtcp)| rtcp)
    }
}
