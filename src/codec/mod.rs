/// AAC AudioSpecificConfig handling
pub mod aac;
/// H.264 NAL and SPS handling
pub mod h264;

pub use h264::NALUnitType;
