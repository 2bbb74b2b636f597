/// MPEG-4 audio object types seen in RTSP cameras.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileType {
    /// AAC Main
    Main = 1,
    /// AAC Low Complexity
    LC = 2,
    /// AAC Scalable Sample Rate
    SSR = 3,
    /// AAC Long Term Prediction
    LTP = 4,
}

impl From<u8> for ProfileType {
    fn from(object_type: u8) -> Self {
        match object_type {
            1 => ProfileType::Main,
            3 => ProfileType::SSR,
            4 => ProfileType::LTP,
            _ => ProfileType::LC,
        }
    }
}

/// Decoded AudioSpecificConfig, the `config=` parameter of an RFC 3640 `fmtp` line.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSpecificConfig {
    /// Audio object type
    pub profile: ProfileType,
    /// Index into the sampling frequency table
    pub sample_rate_index: u8,
    /// Present when `sample_rate_index` is the explicit escape (15)
    pub explicit_sample_rate: Option<u32>,
    /// Channel configuration; 0 means defined elsewhere
    pub channel_configuration: u8,
    /// The raw bytes, copied verbatim into the `esds` descriptor
    pub raw: Vec<u8>,
}

impl AudioSpecificConfig {
    /// Sampling rate in Hz, from the explicit rate or the table.
    pub fn sample_rate(&self) -> Option<u32> {
        self.explicit_sample_rate
            .or_else(|| sample_rate_from_index(self.sample_rate_index))
    }
}

/// Sampling frequency table of ISO/IEC 14496-3.
pub fn sample_rate_from_index(index: u8) -> Option<u32> {
    const RATES: [u32; 13] = [
        96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
    ];
    RATES.get(index as usize).copied()
}

/// Reverse lookup used when a config has to be synthesised from SDP rate and channels.
pub fn index_from_sample_rate(rate: u32) -> Option<u8> {
    (0..13u8).find(|&i| sample_rate_from_index(i) == Some(rate))
}
