use bytes::Bytes;

/// One decodable unit of audio or video, as produced by a depacketizer.
///
/// H.264 access units hold one part per NAL unit; other codecs hold a single part.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessUnit {
    /// Payload, one entry per NAL unit or frame
    pub parts: Vec<Bytes>,
    /// RTP timestamp of the first packet
    pub timestamp: u32,
    /// Wall-clock time from the last sender report, NTP format
    pub ntp_timestamp: Option<u64>,
    /// RTP payload type the unit arrived with
    pub payload_type: u8,
    /// Index of the session track the unit belongs to, when known
    pub track_index: Option<usize>,
    /// Synchronization source of the sender
    pub ssrc: u32,
    /// Whether a decoder can start at this unit
    pub is_sync: bool,
}

impl AccessUnit {
    /// Creates an empty, non-sync unit.
    pub fn new(payload_type: u8, timestamp: u32) -> Self {
        Self {
            parts: Vec::new(),
            timestamp,
            ntp_timestamp: None,
            payload_type,
            track_index: None,
            ssrc: 0,
            is_sync: false,
        }
    }

    /// Appends a payload part.
    pub fn with_part(mut self, part: impl Into<Bytes>) -> Self {
        self.parts.push(part.into());
        self
    }

    /// Sets the wall-clock time.
    pub fn with_ntp_timestamp(mut self, ntp: Option<u64>) -> Self {
        self.ntp_timestamp = ntp;
        self
    }

    /// Sets the synchronization source.
    pub fn with_ssrc(mut self, ssrc: u32) -> Self {
        self.ssrc = ssrc;
        self
    }

    /// Ties the unit to a session track.
    pub fn with_track(mut self, index: usize) -> Self {
        self.track_index = Some(index);
        self
    }

    /// Marks the unit as a sync point.
    pub fn with_sync_flag(mut self, is_sync: bool) -> Self {
        self.is_sync = is_sync;
        self
    }

    /// Total payload bytes across all parts.
    pub fn len(&self) -> usize {
        self.parts.iter().map(Bytes::len).sum()
    }

    /// Whether every part is empty.
    pub fn is_empty(&self) -> bool {
        self.parts.iter().all(Bytes::is_empty)
    }
}
