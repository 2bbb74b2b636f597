/// NAL unit types relevant to RTP carriage (RFC 6184 adds 24-29).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NALUnitType {
    /// Type 0
    Unspecified,
    /// Slice of a non-IDR picture
    CodedSliceNonIDR,
    /// Slice of an IDR picture
    CodedSliceIDR,
    /// Supplemental enhancement information
    SEI,
    /// Sequence parameter set
    SPS,
    /// Picture parameter set
    PPS,
    /// Access unit delimiter
    AccessUnitDelimiter,
    /// Other VCL/non-VCL types in 1..=23
    Other(u8),
    /// Single-time aggregation packet
    StapA,
    /// Fragmentation unit without DON
    FuA,
    /// Aggregation and fragmentation modes this crate does not reassemble
    Unsupported(u8),
}

impl From<u8> for NALUnitType {
    fn from(header: u8) -> Self {
        match header & 0x1F {
            0 => NALUnitType::Unspecified,
            1 => NALUnitType::CodedSliceNonIDR,
            5 => NALUnitType::CodedSliceIDR,
            6 => NALUnitType::SEI,
            7 => NALUnitType::SPS,
            8 => NALUnitType::PPS,
            9 => NALUnitType::AccessUnitDelimiter,
            24 => NALUnitType::StapA,
            28 => NALUnitType::FuA,
            t @ 2..=23 => NALUnitType::Other(t),
            t => NALUnitType::Unsupported(t),
        }
    }
}

impl NALUnitType {
    /// Whether a decoder can start from this NAL unit.
    pub fn is_idr(self) -> bool {
        self == NALUnitType::CodedSliceIDR
    }
}

/// Fields of a sequence parameter set the muxer needs for `avc1`/`tkhd`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SPSInfo {
    /// `profile_idc`
    pub profile_idc: u8,
    /// The constraint_set flags byte
    pub constraint_flags: u8,
    /// `level_idc`
    pub level_idc: u8,
    /// Cropped luma width in pixels
    pub width: u32,
    /// Cropped luma height in pixels
    pub height: u32,
}
